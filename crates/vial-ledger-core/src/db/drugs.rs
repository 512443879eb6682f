//! Drug catalog database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{canonical_unit, Drug, NdcCodes, VialType, VialTypeSource};

impl Database {
    /// Insert or update a drug catalog record.
    pub fn upsert_drug(&self, drug: &Drug) -> DbResult<()> {
        let size_unit = drug.vial_size_unit.as_deref().map(canonical_unit);

        self.conn.execute(
            r#"
            INSERT INTO drugs (
                drug_id, name, vial_type, vial_type_source, vial_size, vial_size_unit,
                ndc_raw, ndc_10, ndc_11, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
            ON CONFLICT(drug_id) DO UPDATE SET
                name = excluded.name,
                vial_type = excluded.vial_type,
                vial_type_source = excluded.vial_type_source,
                vial_size = excluded.vial_size,
                vial_size_unit = excluded.vial_size_unit,
                ndc_raw = excluded.ndc_raw,
                ndc_10 = excluded.ndc_10,
                ndc_11 = excluded.ndc_11,
                updated_at = datetime('now')
            "#,
            params![
                drug.drug_id,
                drug.name,
                drug.vial_type.as_str(),
                drug.vial_type_source.as_str(),
                drug.vial_size,
                size_unit,
                drug.ndc.raw,
                drug.ndc.ndc_10,
                drug.ndc.ndc_11,
            ],
        )?;
        Ok(())
    }

    /// Get a drug by ID.
    pub fn get_drug(&self, drug_id: &str) -> DbResult<Option<Drug>> {
        self.conn
            .query_row(
                r#"
                SELECT drug_id, name, vial_type, vial_type_source, vial_size, vial_size_unit,
                       ndc_raw, ndc_10, ndc_11
                FROM drugs
                WHERE drug_id = ?
                "#,
                [drug_id],
                |row| {
                    Ok(DrugRow {
                        drug_id: row.get(0)?,
                        name: row.get(1)?,
                        vial_type: row.get(2)?,
                        vial_type_source: row.get(3)?,
                        vial_size: row.get(4)?,
                        vial_size_unit: row.get(5)?,
                        ndc_raw: row.get(6)?,
                        ndc_10: row.get(7)?,
                        ndc_11: row.get(8)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Cache a heuristic classification onto a drug that is still unknown.
    ///
    /// Returns `false` when the drug already carries a known type, in which
    /// case nothing is written.
    pub fn cache_heuristic_vial_type(&self, drug_id: &str, vial_type: VialType) -> DbResult<bool> {
        if !vial_type.is_known() {
            return Ok(false);
        }
        let rows_affected = self.conn.execute(
            r#"
            UPDATE drugs SET
                vial_type = ?2,
                vial_type_source = 'heuristic',
                updated_at = datetime('now')
            WHERE drug_id = ?1 AND vial_type = 'unknown'
            "#,
            params![drug_id, vial_type.as_str()],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct DrugRow {
    drug_id: String,
    name: String,
    vial_type: String,
    vial_type_source: String,
    vial_size: Option<f64>,
    vial_size_unit: Option<String>,
    ndc_raw: Option<String>,
    ndc_10: Option<String>,
    ndc_11: Option<String>,
}

impl TryFrom<DrugRow> for Drug {
    type Error = DbError;

    fn try_from(row: DrugRow) -> Result<Self, Self::Error> {
        let vial_type = VialType::parse(&row.vial_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown vial type: {}", row.vial_type)))?;
        let vial_type_source = VialTypeSource::parse(&row.vial_type_source).ok_or_else(|| {
            DbError::Constraint(format!("Unknown vial type source: {}", row.vial_type_source))
        })?;

        Ok(Drug {
            drug_id: row.drug_id,
            name: row.name,
            vial_type,
            vial_type_source,
            vial_size: row.vial_size,
            vial_size_unit: row.vial_size_unit,
            ndc: NdcCodes {
                raw: row.ndc_raw,
                ndc_10: row.ndc_10,
                ndc_11: row.ndc_11,
            },
        })
    }
}
