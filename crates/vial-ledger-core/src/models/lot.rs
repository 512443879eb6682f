//! Inventory lot model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::units::{canonical_unit, units_match};

/// Stock record for one manufactured batch of a drug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryLot {
    /// Row identifier
    pub lot_id: String,
    pub drug_id: String,
    /// Manufacturer lot number
    pub lot_number: String,
    /// Intact, unopened vials
    pub on_hand: i64,
    /// Leftover amount in the currently opened multi-dose vial
    pub partial_remaining: Option<f64>,
    /// Unit of `partial_remaining`
    pub partial_unit: Option<String>,
    /// When the current partial vial was punctured
    pub opened_at: Option<DateTime<Utc>>,
    /// Beyond-use window for an opened vial, in hours
    pub expires_after_hours: Option<i64>,
    /// Manufacturer expiration date (informational)
    pub expiration_date: Option<String>,
    /// Destroyed lots are excluded from active lookups
    pub destroyed: bool,
    /// Optimistic concurrency counter
    pub version: i64,
}

impl InventoryLot {
    /// Create a closed lot with `on_hand` intact vials.
    pub fn new(drug_id: String, lot_number: String, on_hand: i64) -> Self {
        Self {
            lot_id: uuid::Uuid::new_v4().to_string(),
            drug_id,
            lot_number,
            on_hand,
            partial_remaining: None,
            partial_unit: None,
            opened_at: None,
            expires_after_hours: None,
            expiration_date: None,
            destroyed: false,
            version: 0,
        }
    }

    /// Builder-style beyond-use window.
    pub fn with_expires_after_hours(mut self, hours: i64) -> Self {
        self.expires_after_hours = Some(hours);
        self
    }

    /// Whether a partial vial is currently recorded on the lot.
    pub fn has_partial(&self) -> bool {
        self.partial_remaining.is_some()
    }

    /// Instant after which the open partial may no longer be reused.
    ///
    /// `None` also when the window reaches past the representable time range.
    pub fn partial_expires_at(&self) -> Option<DateTime<Utc>> {
        let opened_at = self.opened_at?;
        let hours = self.expires_after_hours?;
        Duration::try_hours(hours).and_then(|window| opened_at.checked_add_signed(window))
    }

    /// Whether the open partial has passed its beyond-use window at `now`.
    ///
    /// A partial with no configured window, or no opening time, never expires.
    pub fn is_partial_expired(&self, now: DateTime<Utc>) -> bool {
        match self.partial_expires_at() {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Remainder that may be drawn from for a dose in `unit` at `now`.
    ///
    /// `None` when there is no partial, its unit differs, or it has expired.
    pub fn reusable_partial(&self, unit: &str, now: DateTime<Utc>) -> Option<f64> {
        let remaining = self.partial_remaining?;
        let partial_unit = self.partial_unit.as_deref()?;
        if !units_match(partial_unit, unit) {
            return None;
        }
        if self.is_partial_expired(now) {
            return None;
        }
        Some(remaining)
    }

    /// Drop every partial-vial field.
    pub fn clear_partial(&mut self) {
        self.partial_remaining = None;
        self.partial_unit = None;
        self.opened_at = None;
    }

    /// Record a freshly punctured vial holding `remaining` of `unit`.
    pub fn open_partial(&mut self, remaining: f64, unit: &str, now: DateTime<Utc>) {
        self.partial_remaining = Some(remaining);
        self.partial_unit = Some(canonical_unit(unit));
        self.opened_at = Some(now);
    }
}
