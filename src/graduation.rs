// 🎓 Graduation - Issue a certificate and advance the member, atomically
//
// One IMMEDIATE transaction covers the counter, the member's ledger and rank,
// and the audit event. Dropping the transaction on any error rolls all of it
// back, so a failed graduation never consumes a number.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::{self, counter_param, Event};
use crate::eligibility;
use crate::error::{is_constraint_violation, GraduationError};
use crate::numbering::{self, CertificateSequence, CounterScope, GlobalSequence};
use crate::rank::Rank;

/// Bounded retry for busy databases and lost counter races
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(8);
        self.base_backoff.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraduationOutcome {
    pub member_id: String,
    pub rank_completed: Rank,
    pub new_rank: Rank,
    pub certificate_number: String,
    pub raw_counter: u64,
    pub issued_at: DateTime<Utc>,
}

pub struct GraduationEngine {
    sequence: Box<dyn CertificateSequence>,
    retry: RetryPolicy,
}

impl GraduationEngine {
    pub fn new(sequence: Box<dyn CertificateSequence>, retry: RetryPolicy) -> Self {
        GraduationEngine { sequence, retry }
    }

    pub fn with_scope(scope: CounterScope, retry: RetryPolicy) -> Self {
        Self::new(numbering::sequence_for(scope), retry)
    }

    pub fn scope(&self) -> CounterScope {
        self.sequence.scope()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn graduate(
        &self,
        conn: &mut Connection,
        member_id: &str,
        rank_completed: Rank,
    ) -> Result<GraduationOutcome, GraduationError> {
        self.graduate_as(conn, member_id, rank_completed, "system")
    }

    /// Graduate `member_id` from `rank_completed`, recording `actor` in the audit trail.
    ///
    /// Transient failures are retried per the engine's `RetryPolicy`; when
    /// they run out the caller gets `TransactionConflict`.
    pub fn graduate_as(
        &self,
        conn: &mut Connection,
        member_id: &str,
        rank_completed: Rank,
        actor: &str,
    ) -> Result<GraduationOutcome, GraduationError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.try_graduate(conn, member_id, rank_completed, actor) {
                Ok(outcome) => {
                    info!(
                        member_id,
                        from = %outcome.rank_completed,
                        to = %outcome.new_rank,
                        certificate = %outcome.certificate_number,
                        raw_counter = outcome.raw_counter,
                        "Member graduated"
                    );
                    return Ok(outcome);
                }
                Err(err) if err.is_transient() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(member_id, attempts = attempt, error = %err, "Graduation gave up");
                        return Err(GraduationError::TransactionConflict { attempts: attempt });
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(member_id, attempt, ?delay, error = %err, "Graduation conflict, retrying");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn try_graduate(
        &self,
        conn: &mut Connection,
        member_id: &str,
        rank_completed: Rank,
        actor: &str,
    ) -> Result<GraduationOutcome, GraduationError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let config = numbering::load_config(&tx)?.ok_or(GraduationError::ConfigurationMissing)?;

        let member = db::get_member(&tx, member_id)?
            .ok_or_else(|| GraduationError::MemberNotFound(member_id.to_string()))?;

        if member.rank != rank_completed {
            return Err(GraduationError::RankMismatch {
                member_id: member_id.to_string(),
                current: member.rank,
                requested: rank_completed,
            });
        }

        // Re-check readiness against committed data, not the caller's projection.
        // TERAP has no next rank and is measured against its own curriculum.
        let curriculum_rank = rank_completed.target().unwrap_or(rank_completed);

        // That curriculum already backed the promotion into TERAP
        if rank_completed.is_terminal() {
            if let Some(spent_on) = rank_completed.previous().filter(|r| member.has_graduated(*r)) {
                return Err(GraduationError::EvidenceConsumed {
                    member_id: member_id.to_string(),
                    rank: rank_completed,
                    spent_on,
                });
            }
        }
        let items = db::curriculum_for_rank(&tx, curriculum_rank)?;
        let verified = db::verified_progress_for(&tx, member_id, curriculum_rank)?;
        let status = eligibility::completion(&member, curriculum_rank, &items, &verified);
        if !status.is_ready() {
            return Err(GraduationError::EligibilityStale {
                member_id: member_id.to_string(),
                rank: curriculum_rank,
                required: status.required,
                completed: status.completed,
            });
        }

        let new_rank = rank_completed.promoted();
        let issued_at = db::store_now(&tx)?;
        let number = self
            .sequence
            .issue(&tx, &config, rank_completed, issued_at.date_naive())?;

        let recorded = tx.execute(
            "INSERT INTO graduations (
                member_id, rank, issued, certificate_number, raw_counter, issued_at
            ) VALUES (?1, ?2, 1, ?3, ?4, ?5)",
            params![
                member_id,
                rank_completed.as_str(),
                number.formatted,
                counter_param(number.raw_counter)?,
                issued_at.to_rfc3339(),
            ],
        );
        match recorded {
            Err(err) if is_constraint_violation(&err) => {
                return Err(GraduationError::AlreadyGraduated {
                    member_id: member_id.to_string(),
                    rank: rank_completed,
                });
            }
            Err(err) => return Err(err.into()),
            Ok(_) => {}
        }

        tx.execute(
            "UPDATE members SET rank = ?2 WHERE id = ?1",
            params![member_id, new_rank.as_str()],
        )?;

        let event = Event::new(
            "member_graduated",
            "member",
            member_id,
            serde_json::json!({
                "rank_completed": rank_completed,
                "new_rank": new_rank,
                "certificate_number": number.formatted,
                "raw_counter": number.raw_counter,
                "counter_scope": self.sequence.scope(),
            }),
            actor,
        )
        .at(issued_at);
        db::insert_event(&tx, &event)?;

        tx.commit()?;

        Ok(GraduationOutcome {
            member_id: member_id.to_string(),
            rank_completed,
            new_rank,
            certificate_number: number.formatted,
            raw_counter: number.raw_counter,
            issued_at,
        })
    }
}

impl Default for GraduationEngine {
    fn default() -> Self {
        Self::new(Box::new(GlobalSequence), RetryPolicy::default())
    }
}
