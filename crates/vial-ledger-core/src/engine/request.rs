//! Consumption request and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{UsageContext, UsageType, VialType};

use super::{ConsumeError, ConsumeResult};

/// One administration to deduct from a lot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumptionRequest {
    pub drug_id: String,
    pub lot_number: String,
    /// Amount administered
    pub quantity_used: f64,
    /// Amount drawn and discarded
    pub quantity_wasted: f64,
    pub unit: String,
    /// Caller identifiers, stored verbatim on the usage event
    pub context: UsageContext,
}

impl ConsumptionRequest {
    pub fn new(drug_id: &str, lot_number: &str, quantity_used: f64, unit: &str) -> Self {
        Self {
            drug_id: drug_id.to_string(),
            lot_number: lot_number.to_string(),
            quantity_used,
            quantity_wasted: 0.0,
            unit: unit.to_string(),
            context: UsageContext::default(),
        }
    }

    /// Builder-style wastage.
    pub fn with_wasted(mut self, quantity_wasted: f64) -> Self {
        self.quantity_wasted = quantity_wasted;
        self
    }

    /// Builder-style caller context.
    pub fn with_context(mut self, context: UsageContext) -> Self {
        self.context = context;
        self
    }

    /// Used plus wasted.
    pub fn total(&self) -> f64 {
        self.quantity_used + self.quantity_wasted
    }

    /// Reject requests the engine cannot account for.
    pub fn validate(&self) -> ConsumeResult<()> {
        if self.drug_id.trim().is_empty() {
            return Err(ConsumeError::Validation("drug id is required".into()));
        }
        if self.lot_number.trim().is_empty() {
            return Err(ConsumeError::Validation("lot number is required".into()));
        }
        if self.unit.trim().is_empty() {
            return Err(ConsumeError::Validation("unit is required".into()));
        }
        for (name, value) in [("quantity used", self.quantity_used), ("quantity wasted", self.quantity_wasted)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConsumeError::Validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(ConsumeError::Validation(
                "quantity used plus wasted must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Accounting path a consumption took.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionPath {
    /// Whole vial written off (single-dose or unclassified drug)
    SingleDose,
    /// Drawn from an existing open multi-dose vial
    MultiDoseReuse,
    /// A multi-dose vial was punctured for this draw
    MultiDoseNewVial,
}

impl ConsumptionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionPath::SingleDose => "single_dose",
            ConsumptionPath::MultiDoseReuse => "multi_dose_reuse",
            ConsumptionPath::MultiDoseNewVial => "multi_dose_new_vial",
        }
    }
}

/// Outcome of a successful consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumptionResult {
    pub drug_id: String,
    pub lot_id: String,
    pub lot_number: String,
    /// Vial type the drug resolved to (unknown is accounted as single-dose)
    pub vial_type: VialType,
    pub path: ConsumptionPath,
    /// Intact vials removed from `on_hand` (0 or 1)
    pub vials_deducted: u32,
    pub quantity_used: f64,
    pub wastage_quantity: f64,
    pub unit: String,
    /// `on_hand` after the deduction
    pub on_hand: i64,
    /// Open remainder after the deduction
    pub partial_remaining: Option<f64>,
    pub usage_event_id: String,
    pub usage_type: UsageType,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let request = ConsumptionRequest::new("D1", "LOT-A", 2.0, "mL").with_wasted(0.5);
        assert!(request.validate().is_ok());
        assert_eq!(request.total(), 2.5);
    }

    #[test]
    fn test_missing_identifiers() {
        let no_drug = ConsumptionRequest::new(" ", "LOT-A", 1.0, "mL");
        assert!(matches!(no_drug.validate(), Err(ConsumeError::Validation(_))));

        let no_lot = ConsumptionRequest::new("D1", "", 1.0, "mL");
        assert!(matches!(no_lot.validate(), Err(ConsumeError::Validation(_))));

        let no_unit = ConsumptionRequest::new("D1", "LOT-A", 1.0, "");
        assert!(matches!(no_unit.validate(), Err(ConsumeError::Validation(_))));
    }

    #[test]
    fn test_bad_quantities() {
        let negative = ConsumptionRequest::new("D1", "LOT-A", -1.0, "mL");
        assert!(negative.validate().is_err());

        let nan_waste = ConsumptionRequest::new("D1", "LOT-A", 1.0, "mL").with_wasted(f64::NAN);
        assert!(nan_waste.validate().is_err());

        let zero = ConsumptionRequest::new("D1", "LOT-A", 0.0, "mL");
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_waste_only_is_valid() {
        let request = ConsumptionRequest::new("D1", "LOT-A", 0.0, "mL").with_wasted(1.0);
        assert!(request.validate().is_ok());
    }
}
