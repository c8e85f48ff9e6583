use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::curriculum::{
    normalize_religion, Category, CurriculumItem, ProgressRecord, ProgressStatus, ReviewDecision,
};
use crate::eligibility::{self, EligibilityReport};
use crate::error::ReviewError;
use crate::member::{GraduationRecord, Member};
use crate::rank::Rank;

/// Event for audit trail. Every graduation and review leaves one behind.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// What happened to a submitted progress record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmitOutcome {
    Created,
    /// A rejected submission for the same item went back to pending
    Resubmitted,
    /// Already pending or verified; nothing written
    Duplicate,
}

/// Everything the eligibility evaluator reads, loaded in one go
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub items: Vec<CurriculumItem>,
    pub members: Vec<Member>,
    pub verified: Vec<ProgressRecord>,
}

impl Snapshot {
    pub fn report(&self) -> EligibilityReport {
        eligibility::report(&self.items, &self.members, &self.verified)
    }
}

/// Open (or create) the database file, ready for concurrent writers.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    conn.busy_timeout(busy_timeout)?;
    setup_database(&conn)?;
    debug!(path = %path.display(), "Database opened");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL keeps readers going while a graduation holds the write lock.
    // In-memory databases answer "memory" and that is fine.
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            rank TEXT,
            religion TEXT,
            experience INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- One row per (member, rank), never updated or deleted
        CREATE TABLE IF NOT EXISTS graduations (
            member_id TEXT NOT NULL REFERENCES members(id),
            rank TEXT NOT NULL,
            issued INTEGER NOT NULL DEFAULT 1,
            certificate_number TEXT NOT NULL,
            raw_counter INTEGER NOT NULL,
            issued_at TEXT NOT NULL,
            PRIMARY KEY (member_id, rank)
        );

        -- religion is '' for universal items so the unique key holds
        CREATE TABLE IF NOT EXISTS curriculum_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rank TEXT NOT NULL,
            item_index INTEGER NOT NULL,
            category TEXT NOT NULL,
            religion TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            UNIQUE (rank, item_index, religion)
        );

        CREATE TABLE IF NOT EXISTS progress_records (
            id TEXT PRIMARY KEY,
            idempotency_hash TEXT UNIQUE NOT NULL,
            member_id TEXT NOT NULL,
            rank TEXT NOT NULL,
            item_index INTEGER NOT NULL,
            category TEXT NOT NULL,
            status TEXT NOT NULL,
            verifier TEXT,
            submitted_at TEXT NOT NULL,
            reviewed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS numbering_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            pattern TEXT NOT NULL,
            parent_series TEXT NOT NULL DEFAULT '',
            last_counter INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rank_counters (
            rank TEXT PRIMARY KEY,
            last_counter INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_progress_member ON progress_records(member_id, rank, status);
        CREATE INDEX IF NOT EXISTS idx_curriculum_rank ON curriculum_items(rank);
        CREATE INDEX IF NOT EXISTS idx_graduations_number ON graduations(certificate_number);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )
    .context("Failed to create schema")?;

    Ok(())
}

// ============================================================================
// ROW CONVERSION HELPERS
// ============================================================================

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn optional_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn rank_at(row: &Row, idx: usize) -> rusqlite::Result<Rank> {
    let raw: Option<String> = row.get(idx)?;
    Rank::from_stored(raw.as_deref()).map_err(|e| conversion_err(idx, e))
}

fn category_at(row: &Row, idx: usize) -> rusqlite::Result<Category> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| conversion_err(idx, e))
}

fn status_at(row: &Row, idx: usize) -> rusqlite::Result<ProgressStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| conversion_err(idx, e))
}

/// Counters are stored as INTEGER (i64) and never negative
pub(crate) fn counter_at(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn counter_param(counter: u64) -> rusqlite::Result<i64> {
    i64::try_from(counter).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Current time according to the store, not the caller's clock
pub fn store_now(conn: &Connection) -> Result<DateTime<Utc>> {
    let now = conn.query_row("SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')", [], |row| {
        time_at(row, 0)
    })?;
    Ok(now)
}

// ============================================================================
// MEMBERS
// ============================================================================

fn member_from_row(row: &Row) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        rank: rank_at(row, 2)?,
        religion: normalize_religion(row.get::<_, Option<String>>(3)?.as_deref()),
        experience: row.get(4)?,
        graduations: BTreeMap::new(),
    })
}

fn graduation_from_row(row: &Row) -> rusqlite::Result<(String, Rank, GraduationRecord)> {
    Ok((
        row.get(0)?,
        rank_at(row, 1)?,
        GraduationRecord {
            issued: row.get(2)?,
            certificate_number: row.get(3)?,
            raw_counter: counter_at(row, 4)?,
            issued_at: time_at(row, 5)?,
        },
    ))
}

/// Insert members, or refresh profile fields of existing ones.
///
/// rank is only taken on first insert; after that it belongs to the
/// graduation transaction.
pub fn upsert_members(conn: &Connection, members: &[Member]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut written = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO members (id, name, rank, religion, experience)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                religion = excluded.religion,
                experience = excluded.experience",
        )?;

        for member in members {
            written += stmt.execute(params![
                member.id,
                member.name,
                member.rank.as_str(),
                member.religion,
                member.experience,
            ])?;
        }
    }

    tx.commit()?;
    info!(count = written, "Members written");
    Ok(written)
}

pub fn get_member(conn: &Connection, member_id: &str) -> Result<Option<Member>> {
    let member = conn
        .query_row(
            "SELECT id, name, rank, religion, experience FROM members WHERE id = ?1",
            [member_id],
            member_from_row,
        )
        .optional()?;

    let Some(mut member) = member else {
        return Ok(None);
    };

    for (_, rank, record) in get_graduations(conn, member_id)? {
        member.graduations.insert(rank, record);
    }

    Ok(Some(member))
}

pub fn list_members(conn: &Connection) -> Result<Vec<Member>> {
    let mut stmt =
        conn.prepare("SELECT id, name, rank, religion, experience FROM members ORDER BY name, id")?;
    let mut members = stmt
        .query_map([], member_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT member_id, rank, issued, certificate_number, raw_counter, issued_at
         FROM graduations",
    )?;
    let mut ledger: HashMap<String, BTreeMap<Rank, GraduationRecord>> = HashMap::new();
    for row in stmt.query_map([], graduation_from_row)? {
        let (member_id, rank, record) = row?;
        ledger.entry(member_id).or_default().insert(rank, record);
    }

    for member in &mut members {
        if let Some(graduations) = ledger.remove(&member.id) {
            member.graduations = graduations;
        }
    }

    Ok(members)
}

pub fn get_graduations(
    conn: &Connection,
    member_id: &str,
) -> Result<Vec<(String, Rank, GraduationRecord)>> {
    let mut stmt = conn.prepare(
        "SELECT member_id, rank, issued, certificate_number, raw_counter, issued_at
         FROM graduations
         WHERE member_id = ?1
         ORDER BY raw_counter",
    )?;

    let rows = stmt
        .query_map([member_id], graduation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

// ============================================================================
// CURRICULUM
// ============================================================================

fn item_from_row(row: &Row) -> rusqlite::Result<CurriculumItem> {
    let religion: String = row.get(3)?;
    Ok(CurriculumItem {
        rank: rank_at(row, 0)?,
        index: row.get(1)?,
        category: category_at(row, 2)?,
        religion: normalize_religion(Some(religion.as_str())),
        title: row.get(4)?,
    })
}

pub fn insert_curriculum(conn: &Connection, items: &[CurriculumItem]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut written = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO curriculum_items (rank, item_index, category, religion, title)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(rank, item_index, religion) DO UPDATE SET
                category = excluded.category,
                title = excluded.title",
        )?;

        for item in items {
            item.validate()?;
            written += stmt.execute(params![
                item.rank.as_str(),
                item.index,
                item.category.as_str(),
                item.religion.as_deref().unwrap_or(""),
                item.title,
            ])?;
        }
    }

    tx.commit()?;
    info!(count = written, "Curriculum items written");
    Ok(written)
}

pub fn list_curriculum(conn: &Connection) -> Result<Vec<CurriculumItem>> {
    let mut stmt = conn.prepare(
        "SELECT rank, item_index, category, religion, title
         FROM curriculum_items
         ORDER BY rank, item_index, religion",
    )?;

    let items = stmt
        .query_map([], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

pub fn curriculum_for_rank(conn: &Connection, rank: Rank) -> Result<Vec<CurriculumItem>> {
    let mut stmt = conn.prepare(
        "SELECT rank, item_index, category, religion, title
         FROM curriculum_items
         WHERE rank = ?1
         ORDER BY item_index, religion",
    )?;

    let items = stmt
        .query_map([rank.as_str()], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

// ============================================================================
// PROGRESS RECORDS
// ============================================================================

const PROGRESS_COLUMNS: &str = "id, member_id, rank, item_index, category, status, verifier, submitted_at, reviewed_at";

fn progress_from_row(row: &Row) -> rusqlite::Result<ProgressRecord> {
    Ok(ProgressRecord {
        id: row.get(0)?,
        member_id: row.get(1)?,
        rank: rank_at(row, 2)?,
        item_index: row.get(3)?,
        category: category_at(row, 4)?,
        status: status_at(row, 5)?,
        verifier: row.get(6)?,
        submitted_at: time_at(row, 7)?,
        reviewed_at: optional_time_at(row, 8)?,
    })
}

/// Store a submission. One live record per (member, rank, item).
pub fn submit_progress(conn: &Connection, record: &ProgressRecord) -> Result<SubmitOutcome> {
    let hash = record.idempotency_hash();

    let inserted = conn.execute(
        "INSERT INTO progress_records (
            id, idempotency_hash, member_id, rank, item_index, category,
            status, verifier, submitted_at, reviewed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(idempotency_hash) DO NOTHING",
        params![
            record.id,
            hash,
            record.member_id,
            record.rank.as_str(),
            record.item_index,
            record.category.as_str(),
            record.status.as_str(),
            record.verifier,
            record.submitted_at.to_rfc3339(),
            record.reviewed_at.map(|t| t.to_rfc3339()),
        ],
    )?;

    if inserted == 1 {
        return Ok(SubmitOutcome::Created);
    }

    let reopened = conn.execute(
        "UPDATE progress_records
         SET status = 'pending', verifier = NULL, reviewed_at = NULL, submitted_at = ?2
         WHERE idempotency_hash = ?1 AND status = 'rejected'",
        params![hash, record.submitted_at.to_rfc3339()],
    )?;

    if reopened == 1 {
        debug!(member_id = %record.member_id, item = record.item_index, "Rejected item resubmitted");
        Ok(SubmitOutcome::Resubmitted)
    } else {
        Ok(SubmitOutcome::Duplicate)
    }
}

pub fn get_progress(conn: &Connection, record_id: &str) -> Result<Option<ProgressRecord>> {
    let sql = format!("SELECT {} FROM progress_records WHERE id = ?1", PROGRESS_COLUMNS);
    let record = conn
        .query_row(&sql, [record_id], progress_from_row)
        .optional()?;
    Ok(record)
}

/// Verifier action: pending → verified | rejected. Reviewed records stay put.
pub fn review_progress(
    conn: &Connection,
    record_id: &str,
    verifier: &str,
    decision: ReviewDecision,
) -> Result<ProgressRecord, ReviewError> {
    let tx = conn.unchecked_transaction()?;

    let sql = format!("SELECT {} FROM progress_records WHERE id = ?1", PROGRESS_COLUMNS);
    let record = tx
        .query_row(&sql, [record_id], progress_from_row)
        .optional()?
        .ok_or_else(|| ReviewError::NotFound(record_id.to_string()))?;

    if record.status != ProgressStatus::Pending {
        return Err(ReviewError::AlreadyReviewed {
            record_id: record_id.to_string(),
            status: record.status,
        });
    }

    let status = decision.resulting_status();
    let reviewed_at = store_now(&tx)?;

    tx.execute(
        "UPDATE progress_records
         SET status = ?2, verifier = ?3, reviewed_at = ?4
         WHERE id = ?1 AND status = 'pending'",
        params![record_id, status.as_str(), verifier, reviewed_at.to_rfc3339()],
    )?;

    let event = Event::new(
        "progress_reviewed",
        "progress_record",
        record_id,
        serde_json::json!({
            "member_id": record.member_id,
            "rank": record.rank,
            "item_index": record.item_index,
            "status": status.as_str(),
        }),
        verifier,
    )
    .at(reviewed_at);
    insert_event(&tx, &event)?;

    tx.commit()?;

    Ok(ProgressRecord {
        status,
        verifier: Some(verifier.to_string()),
        reviewed_at: Some(reviewed_at),
        ..record
    })
}

pub fn verified_progress(conn: &Connection) -> Result<Vec<ProgressRecord>> {
    let sql = format!(
        "SELECT {} FROM progress_records WHERE status = 'verified' ORDER BY member_id, rank, item_index",
        PROGRESS_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], progress_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn verified_progress_for(
    conn: &Connection,
    member_id: &str,
    rank: Rank,
) -> Result<Vec<ProgressRecord>> {
    let sql = format!(
        "SELECT {} FROM progress_records
         WHERE member_id = ?1 AND rank = ?2 AND status = 'verified'
         ORDER BY item_index",
        PROGRESS_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params![member_id, rank.as_str()], progress_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn load_snapshot(conn: &Connection) -> Result<Snapshot> {
    Ok(Snapshot {
        items: list_curriculum(conn)?,
        members: list_members(conn)?,
        verified: verified_progress(conn)?,
    })
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: time_at(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_err(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

#[derive(Debug, Deserialize)]
struct MemberRow {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    rank: String,
    #[serde(default)]
    religion: String,
    #[serde(default)]
    experience: i64,
}

#[derive(Debug, Deserialize)]
struct CurriculumRow {
    rank: String,
    index: u32,
    category: String,
    #[serde(default)]
    religion: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ProgressRow {
    member_id: String,
    rank: String,
    item_index: u32,
    category: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    verifier: String,
}

/// Columns: id,name,rank,religion,experience (blank id gets a fresh UUID)
pub fn load_members_csv(csv_path: &Path) -> Result<Vec<Member>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open members CSV: {:?}", csv_path))?;

    let mut members = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: MemberRow =
            result.with_context(|| format!("Failed to read member row {}", line + 2))?;

        let mut member = Member::enroll(&row.name, Some(row.religion.as_str()));
        if !row.id.trim().is_empty() {
            member.id = row.id.trim().to_string();
        }
        member.rank = Rank::from_stored(Some(row.rank.as_str()))
            .with_context(|| format!("Member row {}", line + 2))?;
        member.experience = row.experience;
        members.push(member);
    }

    Ok(members)
}

/// Columns: rank,index,category,religion,title
pub fn load_curriculum_csv(csv_path: &Path) -> Result<Vec<CurriculumItem>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open curriculum CSV: {:?}", csv_path))?;

    let mut items = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: CurriculumRow =
            result.with_context(|| format!("Failed to read curriculum row {}", line + 2))?;

        let item = CurriculumItem {
            rank: row.rank.parse()?,
            index: row.index,
            category: row.category.parse()?,
            religion: normalize_religion(Some(row.religion.as_str())),
            title: row.title,
        };
        item.validate()
            .with_context(|| format!("Curriculum row {}", line + 2))?;
        items.push(item);
    }

    Ok(items)
}

/// Columns: member_id,rank,item_index,category,status,verifier
pub fn load_progress_csv(csv_path: &Path) -> Result<Vec<ProgressRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open progress CSV: {:?}", csv_path))?;

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: ProgressRow =
            result.with_context(|| format!("Failed to read progress row {}", line + 2))?;

        let mut record = ProgressRecord::submit(
            row.member_id.trim(),
            row.rank.parse()?,
            row.item_index,
            row.category.parse()?,
        );
        record.status = row.status.parse()?;
        if record.status != ProgressStatus::Pending {
            let verifier = row.verifier.trim();
            record.verifier = (!verifier.is_empty()).then(|| verifier.to_string());
            record.reviewed_at = Some(record.submitted_at);
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn member(id: &str, rank: Rank, religion: Option<&str>) -> Member {
        let mut m = Member::enroll(id, religion);
        m.id = id.to_string();
        m.rank = rank;
        m
    }

    #[test]
    fn test_member_roundtrip_and_rank_is_insert_only() {
        let conn = test_db();
        upsert_members(&conn, &[member("m-1", Rank::Ramu, Some("Islam"))]).unwrap();

        let mut changed = member("m-1", Rank::Terap, Some("Islam"));
        changed.name = "Sekar Ayu".to_string();
        upsert_members(&conn, &[changed]).unwrap();

        let stored = get_member(&conn, "m-1").unwrap().unwrap();
        assert_eq!(stored.name, "Sekar Ayu");
        assert_eq!(stored.rank, Rank::Ramu, "upsert must not move rank");
        assert_eq!(stored.religion.as_deref(), Some("Islam"));
        assert!(get_member(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_null_rank_reads_as_penggalang() {
        let conn = test_db();
        conn.execute("INSERT INTO members (id, name) VALUES ('m-1', 'Raka')", [])
            .unwrap();

        let stored = get_member(&conn, "m-1").unwrap().unwrap();
        assert_eq!(stored.rank, Rank::Penggalang);
    }

    #[test]
    fn test_curriculum_religion_variants_coexist() {
        let conn = test_db();
        let items = vec![
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Sholat").with_religion("Islam"),
            CurriculumItem::new(Rank::Ramu, 4, Category::Spiritual, "Doa").with_religion("Kristen"),
            CurriculumItem::new(Rank::Ramu, 1, Category::Sosial, "Gotong royong"),
        ];
        insert_curriculum(&conn, &items).unwrap();
        // Re-import is an update, not a duplicate
        insert_curriculum(&conn, &items).unwrap();

        let ramu = curriculum_for_rank(&conn, Rank::Ramu).unwrap();
        assert_eq!(ramu.len(), 3);
        assert_eq!(ramu[0].index, 1);
        assert_eq!(ramu[0].religion, None);
        assert!(curriculum_for_rank(&conn, Rank::Rakit).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_religion_tag_is_rejected() {
        let conn = test_db();
        let bad = CurriculumItem::new(Rank::Ramu, 2, Category::Emosional, "x").with_religion("Islam");
        assert!(insert_curriculum(&conn, &[bad]).is_err());
        assert!(list_curriculum(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_submission_dedup_and_resubmission() {
        let conn = test_db();
        let first = ProgressRecord::submit("m-1", Rank::Ramu, 2, Category::Emosional);

        assert_eq!(submit_progress(&conn, &first).unwrap(), SubmitOutcome::Created);
        let again = ProgressRecord::submit("m-1", Rank::Ramu, 2, Category::Emosional);
        assert_eq!(submit_progress(&conn, &again).unwrap(), SubmitOutcome::Duplicate);

        review_progress(&conn, &first.id, "kak-rina", ReviewDecision::Reject).unwrap();
        assert_eq!(submit_progress(&conn, &again).unwrap(), SubmitOutcome::Resubmitted);

        let stored = get_progress(&conn, &first.id).unwrap().unwrap();
        assert_eq!(stored.status, ProgressStatus::Pending);
        assert_eq!(stored.verifier, None);
    }

    #[test]
    fn test_review_is_one_way() {
        let conn = test_db();
        let record = ProgressRecord::submit("m-1", Rank::Ramu, 1, Category::Spiritual);
        submit_progress(&conn, &record).unwrap();

        let reviewed = review_progress(&conn, &record.id, "kak-rina", ReviewDecision::Approve).unwrap();
        assert_eq!(reviewed.status, ProgressStatus::Verified);
        assert_eq!(reviewed.verifier.as_deref(), Some("kak-rina"));
        assert!(reviewed.reviewed_at.is_some());

        let err = review_progress(&conn, &record.id, "kak-budi", ReviewDecision::Reject).unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyReviewed { status: ProgressStatus::Verified, .. }));

        let missing = review_progress(&conn, "nope", "kak-budi", ReviewDecision::Approve).unwrap_err();
        assert!(matches!(missing, ReviewError::NotFound(_)));

        let verified = verified_progress_for(&conn, "m-1", Rank::Ramu).unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].verifier.as_deref(), Some("kak-rina"));

        let events = get_events_for_entity(&conn, "progress_record", &record.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "kak-rina");
    }

    #[test]
    fn test_snapshot_feeds_evaluator() {
        let conn = test_db();
        upsert_members(&conn, &[member("m-1", Rank::Penggalang, None)]).unwrap();
        insert_curriculum(
            &conn,
            &[CurriculumItem::new(Rank::Ramu, 1, Category::Fisik, "Lari")],
        )
        .unwrap();
        let record = ProgressRecord::submit("m-1", Rank::Ramu, 1, Category::Fisik);
        submit_progress(&conn, &record).unwrap();

        assert!(load_snapshot(&conn).unwrap().report().ready.is_empty());

        review_progress(&conn, &record.id, "kak-rina", ReviewDecision::Approve).unwrap();
        let report = load_snapshot(&conn).unwrap().report();
        assert_eq!(report.ready.len(), 1);
        assert_eq!(report.ready[0].member_id, "m-1");
    }

    #[test]
    fn test_store_clock_is_utc_rfc3339() {
        let conn = test_db();
        let now = store_now(&conn).unwrap();
        let drift = (Utc::now() - now).num_seconds().abs();
        assert!(drift < 60, "store clock drift {}s", drift);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "member_graduated",
            "member",
            "m-1",
            serde_json::json!({"rank": "RAMU"}),
            "kak-pembina",
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "member", "m-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "member_graduated");
        assert_eq!(events[0].data["rank"], "RAMU");
    }

    #[test]
    fn test_csv_import() {
        let dir = tempfile::tempdir().unwrap();

        let members_path = dir.path().join("members.csv");
        let mut f = std::fs::File::create(&members_path).unwrap();
        writeln!(f, "id,name,rank,religion,experience").unwrap();
        writeln!(f, "m-1,Sekar,,Islam,10").unwrap();
        writeln!(f, ",Bayu,ramu,,0").unwrap();

        let curriculum_path = dir.path().join("curriculum.csv");
        let mut f = std::fs::File::create(&curriculum_path).unwrap();
        writeln!(f, "rank,index,category,religion,title").unwrap();
        writeln!(f, "RAMU,1,SOSIAL,,Gotong royong").unwrap();
        writeln!(f, "RAMU,4,SPIRITUAL,Islam,Sholat berjamaah").unwrap();

        let progress_path = dir.path().join("progress.csv");
        let mut f = std::fs::File::create(&progress_path).unwrap();
        writeln!(f, "member_id,rank,item_index,category,status,verifier").unwrap();
        writeln!(f, "m-1,RAMU,1,SOSIAL,verified,kak-rina").unwrap();
        writeln!(f, "m-1,RAMU,4,SPIRITUAL,,").unwrap();

        let members = load_members_csv(&members_path).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].id, "m-1");
        assert_eq!(members[0].rank, Rank::Penggalang);
        assert_eq!(members[1].rank, Rank::Ramu);
        assert!(!members[1].id.is_empty());
        assert_eq!(members[1].religion, None);

        let items = load_curriculum_csv(&curriculum_path).unwrap();
        assert_eq!(items[1].religion.as_deref(), Some("Islam"));

        let progress = load_progress_csv(&progress_path).unwrap();
        assert_eq!(progress[0].status, ProgressStatus::Verified);
        assert_eq!(progress[0].verifier.as_deref(), Some("kak-rina"));
        assert_eq!(progress[1].status, ProgressStatus::Pending);
    }

    #[test]
    fn test_csv_rejects_misplaced_religion_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curriculum.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "rank,index,category,religion,title").unwrap();
        writeln!(f, "RAMU,2,EMOSIONAL,Islam,x").unwrap();

        assert!(load_curriculum_csv(&path).is_err());
    }
}
