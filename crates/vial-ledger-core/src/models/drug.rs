//! Drug catalog models.

use serde::{Deserialize, Serialize};

use super::units::{canonical_unit, units_match};

/// How a drug vial may be used once punctured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VialType {
    /// Single-dose vial: discarded after one access
    SingleDose,
    /// Multi-dose vial: remainder may be reused within its window
    MultiDose,
    /// Not classified
    Unknown,
}

impl VialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VialType::SingleDose => "single_dose",
            VialType::MultiDose => "multi_dose",
            VialType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single_dose" => Some(VialType::SingleDose),
            "multi_dose" => Some(VialType::MultiDose),
            "unknown" => Some(VialType::Unknown),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, VialType::Unknown)
    }
}

/// Where a drug's vial type came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VialTypeSource {
    /// Entered with the catalog record
    Explicit,
    /// Cached from NDC reference data
    Heuristic,
}

impl VialTypeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VialTypeSource::Explicit => "explicit",
            VialTypeSource::Heuristic => "heuristic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explicit" => Some(VialTypeSource::Explicit),
            "heuristic" => Some(VialTypeSource::Heuristic),
            _ => None,
        }
    }
}

/// The three NDC spellings a catalog record may carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NdcCodes {
    /// As printed on the package, any format
    pub raw: Option<String>,
    /// 10-digit form (4-4-2, 5-3-2 or 5-4-1)
    pub ndc_10: Option<String>,
    /// 11-digit billing form (5-4-2)
    pub ndc_11: Option<String>,
}

impl NdcCodes {
    /// Digits-only forms of every representation present, skipping empties.
    pub fn digit_forms(&self) -> Vec<String> {
        [&self.raw, &self.ndc_10, &self.ndc_11]
            .into_iter()
            .flatten()
            .map(|code| ndc_digits(code))
            .filter(|digits| !digits.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.digit_forms().is_empty()
    }
}

/// Strip separators from an NDC, keeping only ASCII digits.
pub fn ndc_digits(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// A drug in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    /// Catalog identifier
    pub drug_id: String,
    /// Display name
    pub name: String,
    pub vial_type: VialType,
    pub vial_type_source: VialTypeSource,
    /// Canonical vial size (e.g. 1000 for a 1000 mg vial)
    pub vial_size: Option<f64>,
    /// Unit of `vial_size`
    pub vial_size_unit: Option<String>,
    pub ndc: NdcCodes,
}

impl Drug {
    /// Create a drug with no classification, size or NDCs.
    pub fn new(drug_id: String, name: String) -> Self {
        Self {
            drug_id,
            name,
            vial_type: VialType::Unknown,
            vial_type_source: VialTypeSource::Explicit,
            vial_size: None,
            vial_size_unit: None,
            ndc: NdcCodes::default(),
        }
    }

    /// Builder-style explicit classification.
    pub fn with_vial_type(mut self, vial_type: VialType) -> Self {
        self.vial_type = vial_type;
        self.vial_type_source = VialTypeSource::Explicit;
        self
    }

    /// Builder-style vial size.
    pub fn with_vial_size(mut self, size: f64, unit: &str) -> Self {
        self.vial_size = Some(size);
        self.vial_size_unit = Some(canonical_unit(unit));
        self
    }

    /// Vial size expressed in `unit`, if the catalog declares one in that unit.
    ///
    /// Returns `None` when no size is declared or the declared unit differs;
    /// there is no fallback size.
    pub fn vial_size_in(&self, unit: &str) -> Option<f64> {
        let size = self.vial_size?;
        let size_unit = self.vial_size_unit.as_deref()?;
        if size > 0.0 && units_match(size_unit, unit) {
            Some(size)
        } else {
            None
        }
    }
}

/// Confidence attached to an NDC reference row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ConfidenceLevel::Low),
            "medium" => Some(ConfidenceLevel::Medium),
            "high" => Some(ConfidenceLevel::High),
            _ => None,
        }
    }

    /// Numeric rank used for ordering in SQL.
    pub fn rank(&self) -> i64 {
        match self {
            ConfidenceLevel::Low => 0,
            ConfidenceLevel::Medium => 1,
            ConfidenceLevel::High => 2,
        }
    }
}

/// NDC → vial type reference row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NdcVialTypeReference {
    pub ndc_10: Option<String>,
    pub ndc_11: Option<String>,
    pub vial_type: VialType,
    pub confidence: ConfidenceLevel,
}
