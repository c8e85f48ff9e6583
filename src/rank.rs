// 🎖️ Rank - Penggalang proficiency levels
// PENGGALANG → RAMU → RAKIT → TERAP, strictly forward, TERAP terminal

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A member's scouting proficiency level.
///
/// Variant order is the progression order, so `Ord` compares ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rank {
    /// Base level, before any SKU certificate
    Penggalang,
    Ramu,
    Rakit,
    Terap,
}

impl Rank {
    pub const ALL: [Rank; 4] = [Rank::Penggalang, Rank::Ramu, Rank::Rakit, Rank::Terap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Penggalang => "PENGGALANG",
            Rank::Ramu => "RAMU",
            Rank::Rakit => "RAKIT",
            Rank::Terap => "TERAP",
        }
    }

    /// The rank whose curriculum a member at `self` is working towards.
    ///
    /// This is the only place the progression is spelled out; both the
    /// eligibility evaluator and the graduation transaction go through it.
    pub fn target(self) -> Option<Rank> {
        match self {
            Rank::Penggalang => Some(Rank::Ramu),
            Rank::Ramu => Some(Rank::Rakit),
            Rank::Rakit => Some(Rank::Terap),
            Rank::Terap => None,
        }
    }

    /// The rank whose graduation promotes a member into `self`
    pub fn previous(self) -> Option<Rank> {
        Rank::ALL.into_iter().find(|r| r.target() == Some(self))
    }

    /// Rank held after graduating from `self`. TERAP stays TERAP.
    pub fn promoted(self) -> Rank {
        self.target().unwrap_or(self)
    }

    pub fn is_terminal(self) -> bool {
        self.target().is_none()
    }

    /// Read a stored rank column; NULL or blank means the member never graduated.
    pub fn from_stored(value: Option<&str>) -> Result<Rank> {
        match value.map(str::trim) {
            None | Some("") => Ok(Rank::Penggalang),
            Some(s) => s.parse(),
        }
    }
}

impl Default for Rank {
    fn default() -> Self {
        Rank::Penggalang
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENGGALANG" => Ok(Rank::Penggalang),
            "RAMU" => Ok(Rank::Ramu),
            "RAKIT" => Ok(Rank::Rakit),
            "TERAP" => Ok(Rank::Terap),
            other => bail!("Unknown rank: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_progression() {
        assert_eq!(Rank::Penggalang.target(), Some(Rank::Ramu));
        assert_eq!(Rank::Ramu.target(), Some(Rank::Rakit));
        assert_eq!(Rank::Rakit.target(), Some(Rank::Terap));
        assert_eq!(Rank::Terap.target(), None);
    }

    #[test]
    fn test_terap_is_terminal() {
        assert_eq!(Rank::Terap.promoted(), Rank::Terap);
        assert!(Rank::Terap.is_terminal());
        assert!(!Rank::Rakit.is_terminal());
    }

    #[test]
    fn test_promotion_is_one_step_forward() {
        for rank in Rank::ALL {
            let next = rank.promoted();
            assert!(next >= rank, "{} must never regress", rank);
            if !rank.is_terminal() {
                let steps = Rank::ALL.iter().position(|r| *r == next).unwrap()
                    - Rank::ALL.iter().position(|r| *r == rank).unwrap();
                assert_eq!(steps, 1, "{} must advance exactly one step", rank);
            }
        }
    }

    #[test]
    fn test_previous_inverts_target() {
        assert_eq!(Rank::Penggalang.previous(), None);
        assert_eq!(Rank::Ramu.previous(), Some(Rank::Penggalang));
        assert_eq!(Rank::Terap.previous(), Some(Rank::Rakit));
    }

    #[test]
    fn test_display_honours_width() {
        assert_eq!(format!("{:<10}|", Rank::Ramu), "RAMU      |");
        assert_eq!(format!("{:>6}", Rank::Terap), " TERAP");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("ramu".parse::<Rank>().unwrap(), Rank::Ramu);
        assert_eq!(" Rakit ".parse::<Rank>().unwrap(), Rank::Rakit);
        assert!("PANDEGA".parse::<Rank>().is_err());
    }

    #[test]
    fn test_unset_rank_reads_as_penggalang() {
        assert_eq!(Rank::from_stored(None).unwrap(), Rank::Penggalang);
        assert_eq!(Rank::from_stored(Some("  ")).unwrap(), Rank::Penggalang);
        assert_eq!(Rank::from_stored(Some("TERAP")).unwrap(), Rank::Terap);
    }

    #[test]
    fn test_serde_uses_uppercase_names() {
        assert_eq!(serde_json::to_string(&Rank::Rakit).unwrap(), "\"RAKIT\"");
        let rank: Rank = serde_json::from_str("\"TERAP\"").unwrap();
        assert_eq!(rank, Rank::Terap);
    }
}
