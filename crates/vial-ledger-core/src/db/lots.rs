//! Inventory lot database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::InventoryLot;

const LOT_COLUMNS: &str = r#"
    lot_id, drug_id, lot_number, on_hand, partial_remaining, partial_unit,
    opened_at, expires_after_hours, expiration_date, destroyed, version
"#;

impl Database {
    /// Insert a lot record as received into stock.
    pub fn insert_lot(&self, lot: &InventoryLot) -> DbResult<()> {
        if lot.on_hand < 0 {
            return Err(DbError::Constraint(format!(
                "Lot {} cannot start with negative on_hand {}",
                lot.lot_number, lot.on_hand
            )));
        }

        self.conn.execute(
            r#"
            INSERT INTO inventory_lots (
                lot_id, drug_id, lot_number, on_hand, partial_remaining, partial_unit,
                opened_at, expires_after_hours, expiration_date, destroyed, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                lot.lot_id,
                lot.drug_id,
                lot.lot_number,
                lot.on_hand,
                lot.partial_remaining,
                lot.partial_unit,
                lot.opened_at.map(|t| t.to_rfc3339()),
                lot.expires_after_hours,
                lot.expiration_date,
                lot.destroyed,
                lot.version,
            ],
        )?;
        Ok(())
    }

    /// Get the active (non-destroyed) lot for a drug and lot number.
    pub fn get_active_lot(&self, drug_id: &str, lot_number: &str) -> DbResult<Option<InventoryLot>> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM inventory_lots WHERE drug_id = ?1 AND lot_number = ?2 AND destroyed = 0"
        );
        self.conn
            .query_row(&sql, params![drug_id, lot_number], map_lot_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a lot by ID, destroyed or not.
    pub fn get_lot(&self, lot_id: &str) -> DbResult<Option<InventoryLot>> {
        let sql = format!("SELECT {LOT_COLUMNS} FROM inventory_lots WHERE lot_id = ?");
        self.conn
            .query_row(&sql, [lot_id], map_lot_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List active lots of a drug, ordered by lot number.
    pub fn list_active_lots_for_drug(&self, drug_id: &str) -> DbResult<Vec<InventoryLot>> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM inventory_lots WHERE drug_id = ? AND destroyed = 0 ORDER BY lot_number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([drug_id], map_lot_row)?;

        let mut lots = Vec::new();
        for row in rows {
            lots.push(row?.try_into()?);
        }
        Ok(lots)
    }

    /// Write back stock and partial-vial fields if the lot is still at
    /// `expected_version`. Returns the new version.
    ///
    /// A version mismatch means another writer changed the lot since it was
    /// read and yields [`DbError::Conflict`].
    pub fn update_lot_stock(&self, lot: &InventoryLot, expected_version: i64) -> DbResult<i64> {
        if lot.on_hand < 0 {
            return Err(DbError::Constraint(format!(
                "Lot {} on_hand would become {}",
                lot.lot_number, lot.on_hand
            )));
        }

        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_lots SET
                on_hand = ?3,
                partial_remaining = ?4,
                partial_unit = ?5,
                opened_at = ?6,
                version = version + 1,
                updated_at = datetime('now')
            WHERE lot_id = ?1 AND version = ?2 AND destroyed = 0
            "#,
            params![
                lot.lot_id,
                expected_version,
                lot.on_hand,
                lot.partial_remaining,
                lot.partial_unit,
                lot.opened_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        if rows_affected == 0 {
            return Err(DbError::Conflict(format!(
                "lot {} changed since version {}",
                lot.lot_id, expected_version
            )));
        }
        Ok(expected_version + 1)
    }
}

fn map_lot_row(row: &Row<'_>) -> rusqlite::Result<LotRow> {
    Ok(LotRow {
        lot_id: row.get(0)?,
        drug_id: row.get(1)?,
        lot_number: row.get(2)?,
        on_hand: row.get(3)?,
        partial_remaining: row.get(4)?,
        partial_unit: row.get(5)?,
        opened_at: row.get(6)?,
        expires_after_hours: row.get(7)?,
        expiration_date: row.get(8)?,
        destroyed: row.get(9)?,
        version: row.get(10)?,
    })
}

/// Intermediate row struct for database mapping.
struct LotRow {
    lot_id: String,
    drug_id: String,
    lot_number: String,
    on_hand: i64,
    partial_remaining: Option<f64>,
    partial_unit: Option<String>,
    opened_at: Option<String>,
    expires_after_hours: Option<i64>,
    expiration_date: Option<String>,
    destroyed: bool,
    version: i64,
}

impl TryFrom<LotRow> for InventoryLot {
    type Error = DbError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        let opened_at = row
            .opened_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
            .transpose()?;

        Ok(InventoryLot {
            lot_id: row.lot_id,
            drug_id: row.drug_id,
            lot_number: row.lot_number,
            on_hand: row.on_hand,
            partial_remaining: row.partial_remaining,
            partial_unit: row.partial_unit,
            opened_at,
            expires_after_hours: row.expires_after_hours,
            expiration_date: row.expiration_date,
            destroyed: row.destroyed,
            version: row.version,
        })
    }
}
