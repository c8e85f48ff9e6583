//! Error types for graduation and progress review

use thiserror::Error;

use crate::curriculum::ProgressStatus;
use crate::rank::Rank;

#[derive(Error, Debug)]
pub enum GraduationError {
    #[error("Certificate numbering is not configured; an administrator must set it up first")]
    ConfigurationMissing,

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Member {member_id} holds {current}, cannot graduate from {requested}")]
    RankMismatch {
        member_id: String,
        current: Rank,
        requested: Rank,
    },

    #[error("Member {member_id} is no longer ready for {rank}: {completed}/{required} items verified")]
    EligibilityStale {
        member_id: String,
        rank: Rank,
        required: usize,
        completed: usize,
    },

    #[error("Member {member_id} already holds a certificate for {rank}")]
    AlreadyGraduated { member_id: String, rank: Rank },

    /// The curriculum behind `rank` was already spent on the `spent_on` certificate
    #[error("Member {member_id} cannot graduate from {rank}: its curriculum already backed the {spent_on} certificate")]
    EvidenceConsumed {
        member_id: String,
        rank: Rank,
        spent_on: Rank,
    },

    #[error("Transaction conflict: gave up after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    /// Counter moved between read and write; retried like a busy database
    #[error("Certificate counter changed concurrently")]
    CounterRace,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl GraduationError {
    /// Whether retrying the whole transaction may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GraduationError::CounterRace => true,
            GraduationError::Database(err) => is_busy(err),
            GraduationError::Store(err) => err
                .downcast_ref::<rusqlite::Error>()
                .map_or(false, is_busy),
            _ => false,
        }
    }

    /// Whether the failure means the member's state moved under the caller
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            GraduationError::RankMismatch { .. }
                | GraduationError::EligibilityStale { .. }
                | GraduationError::AlreadyGraduated { .. }
                | GraduationError::EvidenceConsumed { .. }
        )
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED: another connection holds the write lock
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// SQLITE_CONSTRAINT on a primary or unique key
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Progress record not found: {0}")]
    NotFound(String),

    #[error("Progress record {record_id} was already {status:?}")]
    AlreadyReviewed {
        record_id: String,
        status: ProgressStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_and_locked_are_transient() {
        let busy = GraduationError::Database(sqlite_failure(rusqlite::ffi::SQLITE_BUSY));
        let locked = GraduationError::Database(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED));
        let wrapped = GraduationError::Store(anyhow::Error::new(sqlite_failure(
            rusqlite::ffi::SQLITE_BUSY,
        )));

        assert!(busy.is_transient());
        assert!(locked.is_transient());
        assert!(wrapped.is_transient());
        assert!(GraduationError::CounterRace.is_transient());
    }

    #[test]
    fn test_terminal_errors_are_not_retried() {
        assert!(!GraduationError::ConfigurationMissing.is_transient());
        assert!(!GraduationError::MemberNotFound("m".into()).is_transient());
        let constraint =
            GraduationError::Database(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT));
        assert!(!constraint.is_transient());
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = GraduationError::EligibilityStale {
            member_id: "m-1".into(),
            rank: Rank::Ramu,
            required: 10,
            completed: 9,
        };
        assert_eq!(
            err.to_string(),
            "Member m-1 is no longer ready for RAMU: 9/10 items verified"
        );
        assert!(err.is_stale());
    }
}
