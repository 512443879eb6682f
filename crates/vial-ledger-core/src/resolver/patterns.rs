//! Static NDC prefix rules.
//!
//! Some labeler/product ranges are known to ship only single-dose or only
//! multi-dose presentations. Rules are digit-only prefixes matched against
//! every NDC representation a drug carries; the longest matching prefix wins.

use crate::models::{ndc_digits, NdcCodes, VialType};

use super::NdcPatternSource;

/// One prefix → vial type rule.
#[derive(Debug, Clone, PartialEq)]
pub struct NdcPrefixRule {
    /// Digits-only prefix
    pub prefix: String,
    pub vial_type: VialType,
}

impl NdcPrefixRule {
    pub fn new(prefix: &str, vial_type: VialType) -> Self {
        Self {
            prefix: ndc_digits(prefix),
            vial_type,
        }
    }
}

/// Prefix rule table.
#[derive(Debug, Clone)]
pub struct StaticNdcPatterns {
    rules: Vec<NdcPrefixRule>,
}

impl Default for StaticNdcPatterns {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StaticNdcPatterns {
    /// Table with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Built-in manufacturer ranges. Each range is listed in both its
    /// 10-digit and 11-digit spelling.
    pub fn builtin() -> Self {
        let rules = vec![
            // Hospira lidocaine ampuls/vials, single-use presentations
            NdcPrefixRule::new("0409-4888", VialType::SingleDose),
            NdcPrefixRule::new("00409-4888", VialType::SingleDose),
            NdcPrefixRule::new("0409-4276", VialType::SingleDose),
            NdcPrefixRule::new("00409-4276", VialType::SingleDose),
            // Fresenius heparin multiple-dose vials
            NdcPrefixRule::new("63323-540", VialType::MultiDose),
            NdcPrefixRule::new("63323-0540", VialType::MultiDose),
            NdcPrefixRule::new("63323-047", VialType::MultiDose),
            NdcPrefixRule::new("63323-0047", VialType::MultiDose),
            // Novo Nordisk insulin vials
            NdcPrefixRule::new("0169-1833", VialType::MultiDose),
            NdcPrefixRule::new("00169-1833", VialType::MultiDose),
        ];
        Self { rules }
    }

    /// Add a rule; returns `self` for chaining.
    pub fn with_rule(mut self, prefix: &str, vial_type: VialType) -> Self {
        self.add_rule(prefix, vial_type);
        self
    }

    /// Add a rule. Empty prefixes are ignored.
    pub fn add_rule(&mut self, prefix: &str, vial_type: VialType) {
        let rule = NdcPrefixRule::new(prefix, vial_type);
        if !rule.prefix.is_empty() {
            self.rules.push(rule);
        }
    }

    pub fn rules(&self) -> &[NdcPrefixRule] {
        &self.rules
    }
}

impl NdcPatternSource for StaticNdcPatterns {
    fn classify(&self, ndc: &NdcCodes) -> Option<VialType> {
        let forms = ndc.digit_forms();

        self.rules
            .iter()
            .filter(|rule| rule.vial_type.is_known())
            .filter(|rule| forms.iter().any(|form| form.starts_with(&rule.prefix)))
            // max_by_key keeps the last maximum; reverse so the earliest rule wins ties
            .rev()
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| rule.vial_type)
    }
}
