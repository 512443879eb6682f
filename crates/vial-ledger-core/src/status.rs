//! Read-only lot status snapshots for display and alerting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbResult};
use crate::models::{Drug, InventoryLot, VialType};

/// Point-in-time view of a lot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LotSnapshot {
    pub drug_id: String,
    pub drug_name: String,
    /// Vial type as stored on the catalog record.
    ///
    /// This is not the type the engine resolves: a drug classified only by
    /// an NDC prefix rule stays `Unknown` here while consumption treats it
    /// by the rule's type. Reporting never resolves, since resolution may
    /// write the heuristic cache.
    pub vial_type: VialType,
    pub lot_id: String,
    pub lot_number: String,
    pub on_hand: i64,
    pub partial_remaining: Option<f64>,
    pub partial_unit: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub expires_after_hours: Option<i64>,
    pub vial_size: Option<f64>,
    pub vial_size_unit: Option<String>,
    /// Whether the open remainder is past its beyond-use window
    pub partial_expired: bool,
}

impl LotSnapshot {
    fn new(drug: &Drug, lot: InventoryLot, now: DateTime<Utc>) -> Self {
        let partial_expired = lot.has_partial() && lot.is_partial_expired(now);
        Self {
            drug_id: drug.drug_id.clone(),
            drug_name: drug.name.clone(),
            vial_type: drug.vial_type,
            lot_id: lot.lot_id,
            lot_number: lot.lot_number,
            on_hand: lot.on_hand,
            partial_remaining: lot.partial_remaining,
            partial_unit: lot.partial_unit,
            opened_at: lot.opened_at,
            expires_after_hours: lot.expires_after_hours,
            vial_size: drug.vial_size,
            vial_size_unit: drug.vial_size_unit.clone(),
            partial_expired,
        }
    }
}

/// Read-only view over lots. Never writes.
pub struct StatusReporter<'a> {
    db: &'a Database,
}

impl<'a> StatusReporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Snapshot of the active lot, or `None` when the drug or lot is absent.
    pub fn status(&self, drug_id: &str, lot_number: &str) -> DbResult<Option<LotSnapshot>> {
        self.status_at(drug_id, lot_number, Utc::now())
    }

    /// Snapshot as of `now`.
    pub fn status_at(
        &self,
        drug_id: &str,
        lot_number: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<LotSnapshot>> {
        let Some(drug) = self.db.get_drug(drug_id)? else {
            return Ok(None);
        };
        let lot = self.db.get_active_lot(drug_id, lot_number)?;
        Ok(lot.map(|lot| LotSnapshot::new(&drug, lot, now)))
    }

    /// Snapshots of every active lot of a drug, by lot number.
    pub fn lots_for_drug(&self, drug_id: &str) -> DbResult<Vec<LotSnapshot>> {
        let Some(drug) = self.db.get_drug(drug_id)? else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        Ok(self
            .db
            .list_active_lots_for_drug(drug_id)?
            .into_iter()
            .map(|lot| LotSnapshot::new(&drug, lot, now))
            .collect())
    }
}
