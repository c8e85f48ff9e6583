// 👤 Member - Profile plus the per-rank graduation ledger
//
// rank and graduations change only through the graduation transaction.
// A graduation record, once written for a rank, is never rewritten or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::curriculum::normalize_religion;
use crate::rank::Rank;

/// Certificate issued for one completed rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraduationRecord {
    pub issued: bool,
    pub certificate_number: String,

    /// Counter value consumed by this certificate
    pub raw_counter: u64,

    /// Store-assigned issuance time
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub rank: Rank,

    #[serde(default)]
    pub religion: Option<String>,

    /// Experience points, maintained by activity flows outside this crate
    #[serde(default)]
    pub experience: i64,

    #[serde(default)]
    pub graduations: BTreeMap<Rank, GraduationRecord>,
}

impl Member {
    /// Enroll a new member at the base rank
    pub fn enroll(name: &str, religion: Option<&str>) -> Self {
        Member {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            rank: Rank::Penggalang,
            religion: normalize_religion(religion),
            experience: 0,
            graduations: BTreeMap::new(),
        }
    }

    pub fn target_rank(&self) -> Option<Rank> {
        self.rank.target()
    }

    pub fn has_graduated(&self, rank: Rank) -> bool {
        self.graduations.get(&rank).map_or(false, |g| g.issued)
    }

    pub fn certificate_for(&self, rank: Rank) -> Option<&str> {
        self.graduations
            .get(&rank)
            .map(|g| g.certificate_number.as_str())
    }
}
