//! Eligibility feed
//!
//! Holds the latest promotion-center projection and pushes a new one to
//! subscribers whenever a refresh changes it. Writers call `refresh` after
//! every mutation; readers hold a `watch::Receiver` and never poll the store.

use std::sync::Arc;

use anyhow::Result;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::debug;

use crate::db;
use crate::eligibility::EligibilityReport;

pub struct EligibilityFeed {
    tx: watch::Sender<Arc<EligibilityReport>>,
}

impl EligibilityFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(EligibilityReport::default()));
        EligibilityFeed { tx }
    }

    /// Build a feed already holding the current projection
    pub fn load(conn: &Connection) -> Result<Self> {
        let feed = Self::new();
        feed.refresh(conn)?;
        Ok(feed)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EligibilityReport>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Arc<EligibilityReport> {
        self.tx.borrow().clone()
    }

    /// Recompute from a fresh snapshot. Returns true if subscribers were notified.
    pub fn refresh(&self, conn: &Connection) -> Result<bool> {
        let report = db::load_snapshot(conn)?.report();

        let changed = self.tx.send_if_modified(|current| {
            if **current == report {
                false
            } else {
                *current = Arc::new(report);
                true
            }
        });

        if changed {
            let current = self.current();
            debug!(
                ready = current.ready.len(),
                in_progress = current.in_progress.len(),
                "Eligibility projection updated"
            );
        }

        Ok(changed)
    }
}

impl Default for EligibilityFeed {
    fn default() -> Self {
        Self::new()
    }
}
