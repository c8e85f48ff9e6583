// Scout Graduation - Core Library
// Rank progression and certificate issuance for a Penggalang troop.
// Exposes all modules for use in CLI, API server, and tests

pub mod rank;
pub mod certificate;
pub mod curriculum;
pub mod member;
pub mod eligibility;
pub mod error;
pub mod db;
pub mod numbering;
pub mod graduation;
pub mod feed;
pub mod config;

// Re-export commonly used types
pub use rank::Rank;
pub use certificate::{generate, generate_at, GeneratedNumber, DEFAULT_PATTERN};
pub use curriculum::{Category, CurriculumItem, ProgressRecord, ProgressStatus, ReviewDecision};
pub use member::{GraduationRecord, Member};
pub use eligibility::{completion, evaluate, Completion, EligibilityEntry, EligibilityReport};
pub use error::{GraduationError, ReviewError};
pub use db::{
    Event, Snapshot, SubmitOutcome,
    open_database, setup_database, store_now,
    upsert_members, get_member, list_members, get_graduations,
    insert_curriculum, list_curriculum, curriculum_for_rank,
    submit_progress, get_progress, review_progress, verified_progress, verified_progress_for,
    load_snapshot, insert_event, get_events_for_entity,
    load_members_csv, load_curriculum_csv, load_progress_csv,
};
pub use numbering::{
    CertificateSequence, CounterScope, GlobalSequence, IssuedNumber, NumberingConfig,
    PerRankSequence, init_config, load_config, update_config,
};
pub use graduation::{GraduationEngine, GraduationOutcome, RetryPolicy};
pub use feed::EligibilityFeed;
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
