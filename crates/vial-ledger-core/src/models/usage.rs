//! Usage ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of draw recorded against a lot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// A whole vial written off (single-dose accounting)
    FullVial,
    /// A draw from a multi-dose vial
    PartialVial,
    /// Any draw that included discarded product
    Wastage,
}

impl UsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::FullVial => "full_vial",
            UsageType::PartialVial => "partial_vial",
            UsageType::Wastage => "wastage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full_vial" => Some(UsageType::FullVial),
            "partial_vial" => Some(UsageType::PartialVial),
            "wastage" => Some(UsageType::Wastage),
            _ => None,
        }
    }
}

/// Caller identifiers stored verbatim with each usage event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageContext {
    pub patient_id: Option<String>,
    pub encounter_id: Option<String>,
    pub form_id: Option<String>,
    pub user_id: Option<String>,
}

/// A usage event before it is appended to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewUsageEvent {
    pub drug_id: String,
    pub lot_id: String,
    pub context: UsageContext,
    pub usage_type: UsageType,
    /// Used plus wasted
    pub quantity: f64,
    /// Portion of `quantity` that was discarded
    pub wastage_quantity: f64,
    pub unit: String,
    /// Partial remainder left on the lot after this draw, if any
    pub remaining_after_usage: Option<f64>,
    /// Whether this draw punctured a fresh vial
    pub opened_new_vial: bool,
    pub recorded_at: DateTime<Utc>,
}

/// An appended, immutable usage event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageEvent {
    /// Insertion order within the ledger
    pub sequence: i64,
    pub event_id: String,
    pub drug_id: String,
    pub lot_id: String,
    pub context: UsageContext,
    pub usage_type: UsageType,
    pub quantity: f64,
    pub wastage_quantity: f64,
    pub unit: String,
    pub remaining_after_usage: Option<f64>,
    pub opened_new_vial: bool,
    pub recorded_at: DateTime<Utc>,
    /// Hash of the previous entry (empty for the first)
    pub prev_hash: String,
    /// SHA-256 over `prev_hash` and the canonical entry body
    pub entry_hash: String,
}

/// Fields covered by an entry hash, in a fixed order.
#[derive(Serialize)]
struct HashedBody<'a> {
    event_id: &'a str,
    drug_id: &'a str,
    lot_id: &'a str,
    context: &'a UsageContext,
    usage_type: UsageType,
    quantity: f64,
    wastage_quantity: f64,
    unit: &'a str,
    remaining_after_usage: Option<f64>,
    opened_new_vial: bool,
    recorded_at: String,
}

impl NewUsageEvent {
    /// Canonical JSON of the hashed fields for an entry with `event_id`.
    pub fn canonical_body(&self, event_id: &str) -> Result<String, serde_json::Error> {
        serde_json::to_string(&HashedBody {
            event_id,
            drug_id: &self.drug_id,
            lot_id: &self.lot_id,
            context: &self.context,
            usage_type: self.usage_type,
            quantity: self.quantity,
            wastage_quantity: self.wastage_quantity,
            unit: &self.unit,
            remaining_after_usage: self.remaining_after_usage,
            opened_new_vial: self.opened_new_vial,
            recorded_at: self.recorded_at.to_rfc3339(),
        })
    }
}

impl UsageEvent {
    /// Canonical JSON of the hashed fields, identical to what was hashed on append.
    pub fn canonical_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&HashedBody {
            event_id: &self.event_id,
            drug_id: &self.drug_id,
            lot_id: &self.lot_id,
            context: &self.context,
            usage_type: self.usage_type,
            quantity: self.quantity,
            wastage_quantity: self.wastage_quantity,
            unit: &self.unit,
            remaining_after_usage: self.remaining_after_usage,
            opened_new_vial: self.opened_new_vial,
            recorded_at: self.recorded_at.to_rfc3339(),
        })
    }
}
