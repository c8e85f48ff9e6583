// 🔢 Certificate Numbering - Config singleton and counter sequences
//
// The counter lives behind CertificateSequence so the graduation transaction
// does not care whether numbering is global or per rank.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::certificate::{self, DEFAULT_PATTERN};
use crate::db::{self, counter_at, counter_param};
use crate::error::GraduationError;
use crate::rank::Rank;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingConfig {
    pub pattern: String,
    /// Free text set by the administrator, fills `{INDUK}`
    pub parent_series: String,
    pub last_counter: u64,
    pub updated_at: DateTime<Utc>,
}

/// Which counter a graduation consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CounterScope {
    /// One sequence shared by every rank and member
    #[default]
    Global,
    PerRank,
}

/// A certificate number together with the counter value it consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedNumber {
    pub formatted: String,
    pub raw_counter: u64,
}

// ============================================================================
// CONFIG ROW
// ============================================================================

pub fn load_config(conn: &Connection) -> Result<Option<NumberingConfig>> {
    let config = conn
        .query_row(
            "SELECT pattern, parent_series, last_counter, updated_at
             FROM numbering_config WHERE id = 1",
            [],
            |row| {
                let updated_at: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    counter_at(row, 2)?,
                    updated_at,
                ))
            },
        )
        .optional()?;

    config
        .map(|(pattern, parent_series, last_counter, updated_at)| -> Result<NumberingConfig> {
            Ok(NumberingConfig {
                pattern,
                parent_series,
                last_counter,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
            })
        })
        .transpose()
}

/// Create the config row with defaults unless it already exists
pub fn init_config(conn: &Connection, pattern: Option<&str>, parent_series: &str) -> Result<NumberingConfig> {
    let now = db::store_now(conn)?;
    let pattern = pattern
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PATTERN);

    let created = conn.execute(
        "INSERT INTO numbering_config (id, pattern, parent_series, last_counter, updated_at)
         VALUES (1, ?1, ?2, 0, ?3)
         ON CONFLICT(id) DO NOTHING",
        params![pattern, parent_series, now.to_rfc3339()],
    )?;

    if created == 1 {
        info!(pattern, parent_series, "Certificate numbering initialized");
    }

    load_config(conn)?.ok_or_else(|| anyhow::anyhow!("numbering config vanished after init"))
}

/// Administrator update. A new parent series starts numbering from zero again.
pub fn update_config(
    conn: &Connection,
    pattern: Option<&str>,
    parent_series: Option<&str>,
) -> Result<NumberingConfig, GraduationError> {
    let tx = conn.unchecked_transaction()?;
    let current = load_config(&tx)?.ok_or(GraduationError::ConfigurationMissing)?;
    let now = db::store_now(&tx)?;

    let pattern = pattern
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(&current.pattern)
        .to_string();
    let parent_series = parent_series
        .map(str::trim)
        .unwrap_or(&current.parent_series)
        .to_string();
    let series_changed = parent_series != current.parent_series;
    let last_counter = if series_changed { 0 } else { current.last_counter };

    tx.execute(
        "UPDATE numbering_config
         SET pattern = ?1, parent_series = ?2, last_counter = ?3, updated_at = ?4
         WHERE id = 1",
        params![pattern, parent_series, counter_param(last_counter)?, now.to_rfc3339()],
    )?;

    if series_changed {
        tx.execute("DELETE FROM rank_counters", [])?;
        info!(
            from = %current.parent_series,
            to = %parent_series,
            "Parent series changed, certificate counters reset"
        );
    }

    tx.commit()?;

    Ok(NumberingConfig {
        pattern,
        parent_series,
        last_counter,
        updated_at: now,
    })
}

// ============================================================================
// SEQUENCES
// ============================================================================

/// Consumes one counter value and formats the certificate number.
///
/// Called inside the graduation transaction. Implementations must write the
/// new counter with a compare-and-increment and report `CounterRace` when
/// the stored value is no longer the one they read.
pub trait CertificateSequence: Send + Sync {
    fn issue(
        &self,
        conn: &Connection,
        config: &NumberingConfig,
        rank: Rank,
        date: NaiveDate,
    ) -> Result<IssuedNumber, GraduationError>;

    fn scope(&self) -> CounterScope;
}

pub fn sequence_for(scope: CounterScope) -> Box<dyn CertificateSequence> {
    match scope {
        CounterScope::Global => Box::new(GlobalSequence),
        CounterScope::PerRank => Box::new(PerRankSequence),
    }
}

fn format_number(config: &NumberingConfig, last: u64, rank: Rank, date: NaiveDate) -> certificate::GeneratedNumber {
    let pattern = certificate::apply_series(&config.pattern, &config.parent_series);
    certificate::generate_at(&pattern, last, rank.as_str(), date)
}

/// Single counter in the config row, shared by all ranks
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalSequence;

impl CertificateSequence for GlobalSequence {
    fn issue(
        &self,
        conn: &Connection,
        config: &NumberingConfig,
        rank: Rank,
        date: NaiveDate,
    ) -> Result<IssuedNumber, GraduationError> {
        let number = format_number(config, config.last_counter, rank, date);

        let updated = conn.execute(
            "UPDATE numbering_config SET last_counter = ?1 WHERE id = 1 AND last_counter = ?2",
            params![
                counter_param(number.next_counter)?,
                counter_param(config.last_counter)?
            ],
        )?;
        if updated != 1 {
            return Err(GraduationError::CounterRace);
        }

        Ok(IssuedNumber {
            formatted: number.formatted,
            raw_counter: number.next_counter,
        })
    }

    fn scope(&self) -> CounterScope {
        CounterScope::Global
    }
}

/// One counter per rank; pattern and series still come from the config row
#[derive(Debug, Clone, Copy, Default)]
pub struct PerRankSequence;

impl PerRankSequence {
    pub fn last_counter(conn: &Connection, rank: Rank) -> Result<u64> {
        let last = conn
            .query_row(
                "SELECT last_counter FROM rank_counters WHERE rank = ?1",
                [rank.as_str()],
                |row| counter_at(row, 0),
            )
            .optional()?;
        Ok(last.unwrap_or(0))
    }
}

impl CertificateSequence for PerRankSequence {
    fn issue(
        &self,
        conn: &Connection,
        config: &NumberingConfig,
        rank: Rank,
        date: NaiveDate,
    ) -> Result<IssuedNumber, GraduationError> {
        conn.execute(
            "INSERT INTO rank_counters (rank, last_counter) VALUES (?1, 0)
             ON CONFLICT(rank) DO NOTHING",
            [rank.as_str()],
        )?;
        let last = Self::last_counter(conn, rank)?;
        let number = format_number(config, last, rank, date);

        let updated = conn.execute(
            "UPDATE rank_counters SET last_counter = ?1 WHERE rank = ?2 AND last_counter = ?3",
            params![
                counter_param(number.next_counter)?,
                rank.as_str(),
                counter_param(last)?
            ],
        )?;
        if updated != 1 {
            return Err(GraduationError::CounterRace);
        }

        Ok(IssuedNumber {
            formatted: number.formatted,
            raw_counter: number.next_counter,
        })
    }

    fn scope(&self) -> CounterScope {
        CounterScope::PerRank
    }
}
