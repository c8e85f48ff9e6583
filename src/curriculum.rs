// 📚 Curriculum - SKU master items and member progress records
//
// Master items are keyed by (rank, index). Item 4 in the SPIRITUAL category
// may exist once per religion; every other item is universal.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::rank::Rank;

/// Index of the one curriculum item that may carry religion variants.
pub const RELIGION_ITEM_INDEX: u32 = 4;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Spiritual,
    Emosional,
    Sosial,
    Intelektual,
    Fisik,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Spiritual => "SPIRITUAL",
            Category::Emosional => "EMOSIONAL",
            Category::Sosial => "SOSIAL",
            Category::Intelektual => "INTELEKTUAL",
            Category::Fisik => "FISIK",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "SPIRITUAL" => Ok(Category::Spiritual),
            "EMOSIONAL" => Ok(Category::Emosional),
            "SOSIAL" => Ok(Category::Sosial),
            "INTELEKTUAL" => Ok(Category::Intelektual),
            "FISIK" => Ok(Category::Fisik),
            other => bail!("Unknown curriculum category: {:?}", other),
        }
    }
}

// ============================================================================
// CURRICULUM ITEM (master list)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumItem {
    pub rank: Rank,
    pub index: u32,
    pub category: Category,

    /// Only set on religion-specific variants of item 4
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub religion: Option<String>,

    #[serde(default)]
    pub title: String,
}

impl CurriculumItem {
    pub fn new(rank: Rank, index: u32, category: Category, title: &str) -> Self {
        CurriculumItem {
            rank,
            index,
            category,
            religion: None,
            title: title.to_string(),
        }
    }

    pub fn with_religion(mut self, religion: &str) -> Self {
        self.religion = normalize_religion(Some(religion));
        self
    }

    /// Reject religion tags anywhere but the spiritual item 4.
    pub fn validate(&self) -> Result<()> {
        if self.religion.is_some()
            && (self.index != RELIGION_ITEM_INDEX || self.category != Category::Spiritual)
        {
            bail!(
                "{} item {} ({}) cannot be religion-specific",
                self.rank,
                self.index,
                self.category
            );
        }
        Ok(())
    }

    /// Whether this item counts towards a member with the given religion.
    pub fn applies_to(&self, religion: Option<&str>) -> bool {
        match (&self.religion, normalize_religion(religion)) {
            (None, _) => true,
            (Some(required), Some(member)) => required.eq_ignore_ascii_case(&member),
            (Some(_), None) => false,
        }
    }
}

/// Trim a religion tag, mapping blanks to None.
pub fn normalize_religion(religion: Option<&str>) -> Option<String> {
    religion
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

// ============================================================================
// PROGRESS RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Verified,
    Rejected,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::Verified => "verified",
            ProgressStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ProgressStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "pending" => Ok(ProgressStatus::Pending),
            "verified" => Ok(ProgressStatus::Verified),
            "rejected" => Ok(ProgressStatus::Rejected),
            other => bail!("Unknown progress status: {:?}", other),
        }
    }
}

/// Verifier decision on a pending record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn resulting_status(self) -> ProgressStatus {
        match self {
            ReviewDecision::Approve => ProgressStatus::Verified,
            ReviewDecision::Reject => ProgressStatus::Rejected,
        }
    }
}

/// Evidence that a member worked on one curriculum item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: String,
    pub member_id: String,
    pub rank: Rank,
    pub item_index: u32,
    pub category: Category,
    pub status: ProgressStatus,

    #[serde(default)]
    pub verifier: Option<String>,

    pub submitted_at: DateTime<Utc>,

    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// New pending submission
    pub fn submit(member_id: &str, rank: Rank, item_index: u32, category: Category) -> Self {
        ProgressRecord {
            id: uuid::Uuid::new_v4().to_string(),
            member_id: member_id.to_string(),
            rank,
            item_index,
            category,
            status: ProgressStatus::Pending,
            verifier: None,
            submitted_at: Utc::now(),
            reviewed_at: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == ProgressStatus::Verified
    }

    /// One submission per (member, rank, item). Used to skip re-imports.
    pub fn idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.member_id, self.rank, self.item_index
        ));
        format!("{:x}", hasher.finalize())
    }
}
