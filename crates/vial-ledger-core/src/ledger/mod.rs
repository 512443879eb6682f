//! Append-only usage ledger.
//!
//! Each entry carries the hash of its predecessor, so any edit or removal of
//! a past row breaks the chain from that point on.

mod chain;

pub use chain::*;

use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{NewUsageEvent, UsageEvent};

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Audit sink for usage events. Exposes no update or delete.
pub struct UsageRecorder<'a> {
    db: &'a Database,
}

impl<'a> UsageRecorder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an event to the ledger.
    ///
    /// Runs inside whatever transaction is open on the database, so a caller
    /// that rolls back also drops the entry.
    pub fn record(&self, event: NewUsageEvent) -> LedgerResult<UsageEvent> {
        let event_id = uuid::Uuid::new_v4().to_string();
        let prev_hash = self.db.last_usage_hash()?.unwrap_or_default();
        let body = event.canonical_body(&event_id)?;
        let entry_hash = chain_hash(&prev_hash, &body);

        let mut appended = UsageEvent {
            sequence: 0,
            event_id,
            drug_id: event.drug_id,
            lot_id: event.lot_id,
            context: event.context,
            usage_type: event.usage_type,
            quantity: event.quantity,
            wastage_quantity: event.wastage_quantity,
            unit: event.unit,
            remaining_after_usage: event.remaining_after_usage,
            opened_new_vial: event.opened_new_vial,
            recorded_at: event.recorded_at,
            prev_hash,
            entry_hash,
        };
        appended.sequence = self.db.insert_usage_event(&appended)?;

        tracing::debug!(
            sequence = appended.sequence,
            lot_id = %appended.lot_id,
            usage_type = appended.usage_type.as_str(),
            "usage event recorded"
        );
        Ok(appended)
    }

    /// Events for a lot, oldest first.
    pub fn history_for_lot(&self, lot_id: &str) -> LedgerResult<Vec<UsageEvent>> {
        Ok(self.db.list_usage_events_for_lot(lot_id)?)
    }

    /// Events for a drug across all its lots, oldest first.
    pub fn history_for_drug(&self, drug_id: &str) -> LedgerResult<Vec<UsageEvent>> {
        Ok(self.db.list_usage_events_for_drug(drug_id)?)
    }

    /// Recompute the hash chain over the whole ledger.
    pub fn verify_chain(&self) -> LedgerResult<ChainVerification> {
        let events = self.db.list_all_usage_events()?;
        verify_events(&events)
    }
}
