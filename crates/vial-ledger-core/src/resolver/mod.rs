//! Vial type resolution.
//!
//! Order: declared type → NDC reference data (cached back onto the drug) →
//! static NDC prefix rules → unknown. Resolution never fails; storage errors
//! degrade to [`VialType::Unknown`].

mod patterns;

pub use patterns::*;

use crate::db::{Database, DbResult};
use crate::models::{ConfidenceLevel, Drug, NdcCodes, NdcVialTypeReference, VialType};

/// Read-only NDC → vial type reference data.
pub trait VialTypeReference {
    /// Best row matching any representation of `ndc` at or above `min_confidence`.
    fn lookup(
        &self,
        ndc: &NdcCodes,
        min_confidence: ConfidenceLevel,
    ) -> DbResult<Option<NdcVialTypeReference>>;
}

/// Hard-coded classification by NDC shape.
pub trait NdcPatternSource {
    fn classify(&self, ndc: &NdcCodes) -> Option<VialType>;
}

impl VialTypeReference for Database {
    fn lookup(
        &self,
        ndc: &NdcCodes,
        min_confidence: ConfidenceLevel,
    ) -> DbResult<Option<NdcVialTypeReference>> {
        self.find_ndc_reference(ndc, min_confidence)
    }
}

/// Which step produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionBasis {
    /// The catalog record's own (explicit or previously cached) type
    Declared,
    /// NDC reference data; cached onto the drug
    Reference,
    /// Static prefix rule
    Pattern,
    /// Nothing matched
    Unresolved,
}

/// Outcome of resolving a drug's vial type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub vial_type: VialType,
    pub basis: ResolutionBasis,
}

impl Resolution {
    fn new(vial_type: VialType, basis: ResolutionBasis) -> Self {
        Self { vial_type, basis }
    }

    fn unresolved() -> Self {
        Self::new(VialType::Unknown, ResolutionBasis::Unresolved)
    }
}

/// Classifies drugs as single-dose, multi-dose or unknown.
pub struct VialTypeResolver<'a> {
    db: &'a Database,
    reference: &'a dyn VialTypeReference,
    patterns: Box<dyn NdcPatternSource + 'a>,
    min_confidence: ConfidenceLevel,
}

impl<'a> VialTypeResolver<'a> {
    /// Resolver backed by the database's reference table and the built-in
    /// prefix rules.
    pub fn new(db: &'a Database) -> Self {
        Self::with_sources(db, db, StaticNdcPatterns::builtin())
    }

    /// Resolver with injected reference data and prefix rules.
    pub fn with_sources(
        db: &'a Database,
        reference: &'a dyn VialTypeReference,
        patterns: impl NdcPatternSource + 'a,
    ) -> Self {
        Self {
            db,
            reference,
            patterns: Box::new(patterns),
            min_confidence: db.config().min_reference_confidence,
        }
    }

    /// Vial type for a drug ID. Missing drugs resolve to unknown.
    pub fn resolve(&self, drug_id: &str) -> VialType {
        match self.db.get_drug(drug_id) {
            Ok(Some(drug)) => self.resolve_drug(&drug).vial_type,
            Ok(None) => {
                tracing::debug!(drug_id, "vial type requested for missing drug");
                VialType::Unknown
            }
            Err(e) => {
                tracing::warn!(drug_id, error = %e, "drug lookup failed, vial type unknown");
                VialType::Unknown
            }
        }
    }

    /// Vial type for an already-loaded drug record.
    pub fn resolve_drug(&self, drug: &Drug) -> Resolution {
        if drug.vial_type.is_known() {
            return Resolution::new(drug.vial_type, ResolutionBasis::Declared);
        }

        if drug.ndc.is_empty() {
            return Resolution::unresolved();
        }

        match self.reference.lookup(&drug.ndc, self.min_confidence) {
            Ok(Some(reference)) if reference.vial_type.is_known() => {
                self.cache(drug, reference.vial_type);
                return Resolution::new(reference.vial_type, ResolutionBasis::Reference);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(drug_id = %drug.drug_id, error = %e, "NDC reference lookup failed");
            }
        }

        match self.patterns.classify(&drug.ndc) {
            Some(vial_type) if vial_type.is_known() => {
                tracing::debug!(
                    drug_id = %drug.drug_id,
                    vial_type = vial_type.as_str(),
                    "vial type from NDC prefix rule"
                );
                Resolution::new(vial_type, ResolutionBasis::Pattern)
            }
            _ => Resolution::unresolved(),
        }
    }

    fn cache(&self, drug: &Drug, vial_type: VialType) {
        match self.db.cache_heuristic_vial_type(&drug.drug_id, vial_type) {
            Ok(true) => tracing::info!(
                drug_id = %drug.drug_id,
                vial_type = vial_type.as_str(),
                "cached heuristic vial type"
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                drug_id = %drug.drug_id,
                error = %e,
                "failed to cache heuristic vial type"
            ),
        }
    }
}
