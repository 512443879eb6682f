//! NDC vial-type reference data operations.

use rusqlite::{params, params_from_iter, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{ndc_digits, ConfidenceLevel, NdcCodes, NdcVialTypeReference, VialType};

impl Database {
    /// Load one reference row. NDCs are stored digits-only.
    pub fn insert_ndc_reference(&self, reference: &NdcVialTypeReference) -> DbResult<()> {
        let ndc_10 = reference.ndc_10.as_deref().map(ndc_digits).filter(|d| !d.is_empty());
        let ndc_11 = reference.ndc_11.as_deref().map(ndc_digits).filter(|d| !d.is_empty());
        if ndc_10.is_none() && ndc_11.is_none() {
            return Err(DbError::Constraint(
                "NDC reference requires an ndc-10 or ndc-11".into(),
            ));
        }

        self.conn.execute(
            r#"
            INSERT INTO ndc_vial_type_reference (
                ndc_10, ndc_11, vial_type, confidence_level, confidence_rank
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                ndc_10,
                ndc_11,
                reference.vial_type.as_str(),
                reference.confidence.as_str(),
                reference.confidence.rank(),
            ],
        )?;
        Ok(())
    }

    /// Best reference row matching any representation of `ndc` at or above
    /// `min_confidence`. Rows classified `unknown` are ignored.
    pub fn find_ndc_reference(
        &self,
        ndc: &NdcCodes,
        min_confidence: ConfidenceLevel,
    ) -> DbResult<Option<NdcVialTypeReference>> {
        let forms = ndc.digit_forms();
        if forms.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; forms.len()].join(", ");
        let sql = format!(
            r#"
            SELECT ndc_10, ndc_11, vial_type, confidence_level
            FROM ndc_vial_type_reference
            WHERE (ndc_10 IN ({p}) OR ndc_11 IN ({p}))
              AND vial_type != 'unknown'
              AND confidence_rank >= {rank}
            ORDER BY confidence_rank DESC, id ASC
            LIMIT 1
            "#,
            p = placeholders,
            rank = min_confidence.rank(),
        );

        let bound = forms.iter().chain(forms.iter());
        self.conn
            .query_row(&sql, params_from_iter(bound), |row| {
                Ok(ReferenceRow {
                    ndc_10: row.get(0)?,
                    ndc_11: row.get(1)?,
                    vial_type: row.get(2)?,
                    confidence_level: row.get(3)?,
                })
            })
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct ReferenceRow {
    ndc_10: Option<String>,
    ndc_11: Option<String>,
    vial_type: String,
    confidence_level: String,
}

impl TryFrom<ReferenceRow> for NdcVialTypeReference {
    type Error = DbError;

    fn try_from(row: ReferenceRow) -> Result<Self, Self::Error> {
        let vial_type = VialType::parse(&row.vial_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown vial type: {}", row.vial_type)))?;
        let confidence = ConfidenceLevel::parse(&row.confidence_level).ok_or_else(|| {
            DbError::Constraint(format!("Unknown confidence level: {}", row.confidence_level))
        })?;

        Ok(NdcVialTypeReference {
            ndc_10: row.ndc_10,
            ndc_11: row.ndc_11,
            vial_type,
            confidence,
        })
    }
}
