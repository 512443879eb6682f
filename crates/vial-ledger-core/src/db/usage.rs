//! Usage event database operations (append-only).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{UsageContext, UsageEvent, UsageType};

const USAGE_COLUMNS: &str = r#"
    sequence, event_id, drug_id, lot_id, context, usage_type, quantity, wastage_quantity,
    unit, remaining_after_usage, opened_new_vial, recorded_at, prev_hash, entry_hash
"#;

impl Database {
    /// Append a usage event row. Returns the assigned sequence number.
    ///
    /// The `sequence` field of `event` is ignored.
    pub fn insert_usage_event(&self, event: &UsageEvent) -> DbResult<i64> {
        let context_json = serde_json::to_string(&event.context)?;

        self.conn.execute(
            r#"
            INSERT INTO usage_events (
                event_id, drug_id, lot_id, context, usage_type, quantity, wastage_quantity,
                unit, remaining_after_usage, opened_new_vial, recorded_at, prev_hash, entry_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                event.event_id,
                event.drug_id,
                event.lot_id,
                context_json,
                event.usage_type.as_str(),
                event.quantity,
                event.wastage_quantity,
                event.unit,
                event.remaining_after_usage,
                event.opened_new_vial,
                event.recorded_at.to_rfc3339(),
                event.prev_hash,
                event.entry_hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Hash of the most recent ledger entry, if any.
    pub fn last_usage_hash(&self) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT entry_hash FROM usage_events ORDER BY sequence DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Usage events for a lot, oldest first.
    pub fn list_usage_events_for_lot(&self, lot_id: &str) -> DbResult<Vec<UsageEvent>> {
        let sql = format!("SELECT {USAGE_COLUMNS} FROM usage_events WHERE lot_id = ? ORDER BY sequence");
        self.query_usage_events(&sql, [lot_id])
    }

    /// Usage events for a drug across all lots, oldest first.
    pub fn list_usage_events_for_drug(&self, drug_id: &str) -> DbResult<Vec<UsageEvent>> {
        let sql = format!("SELECT {USAGE_COLUMNS} FROM usage_events WHERE drug_id = ? ORDER BY sequence");
        self.query_usage_events(&sql, [drug_id])
    }

    /// The whole ledger, oldest first.
    pub fn list_all_usage_events(&self) -> DbResult<Vec<UsageEvent>> {
        let sql = format!("SELECT {USAGE_COLUMNS} FROM usage_events ORDER BY sequence");
        self.query_usage_events(&sql, [])
    }

    fn query_usage_events<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<UsageEvent>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_usage_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.try_into()?);
        }
        Ok(events)
    }
}

fn map_usage_row(row: &Row<'_>) -> rusqlite::Result<UsageRow> {
    Ok(UsageRow {
        sequence: row.get(0)?,
        event_id: row.get(1)?,
        drug_id: row.get(2)?,
        lot_id: row.get(3)?,
        context: row.get(4)?,
        usage_type: row.get(5)?,
        quantity: row.get(6)?,
        wastage_quantity: row.get(7)?,
        unit: row.get(8)?,
        remaining_after_usage: row.get(9)?,
        opened_new_vial: row.get(10)?,
        recorded_at: row.get(11)?,
        prev_hash: row.get(12)?,
        entry_hash: row.get(13)?,
    })
}

/// Intermediate row struct for database mapping.
struct UsageRow {
    sequence: i64,
    event_id: String,
    drug_id: String,
    lot_id: String,
    context: String,
    usage_type: String,
    quantity: f64,
    wastage_quantity: f64,
    unit: String,
    remaining_after_usage: Option<f64>,
    opened_new_vial: bool,
    recorded_at: String,
    prev_hash: String,
    entry_hash: String,
}

impl TryFrom<UsageRow> for UsageEvent {
    type Error = DbError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        let context: UsageContext = serde_json::from_str(&row.context)?;
        let usage_type = UsageType::parse(&row.usage_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown usage type: {}", row.usage_type)))?;
        let recorded_at = DateTime::parse_from_rfc3339(&row.recorded_at)?.with_timezone(&Utc);

        Ok(UsageEvent {
            sequence: row.sequence,
            event_id: row.event_id,
            drug_id: row.drug_id,
            lot_id: row.lot_id,
            context,
            usage_type,
            quantity: row.quantity,
            wastage_quantity: row.wastage_quantity,
            unit: row.unit,
            remaining_after_usage: row.remaining_after_usage,
            opened_new_vial: row.opened_new_vial,
            recorded_at,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}
