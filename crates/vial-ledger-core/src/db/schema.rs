//! SQLite schema definition.

/// Complete database schema for the vial ledger.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Drug Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS drugs (
    drug_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    vial_type TEXT NOT NULL DEFAULT 'unknown'
        CHECK (vial_type IN ('single_dose', 'multi_dose', 'unknown')),
    vial_type_source TEXT NOT NULL DEFAULT 'explicit'
        CHECK (vial_type_source IN ('explicit', 'heuristic')),
    vial_size REAL CHECK (vial_size IS NULL OR vial_size > 0),
    vial_size_unit TEXT,
    ndc_raw TEXT,
    ndc_10 TEXT,
    ndc_11 TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- NDC Vial Type Reference (Read-only lookup data)
-- ============================================================================

CREATE TABLE IF NOT EXISTS ndc_vial_type_reference (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ndc_10 TEXT,                                 -- digits only
    ndc_11 TEXT,                                 -- digits only
    vial_type TEXT NOT NULL CHECK (vial_type IN ('single_dose', 'multi_dose', 'unknown')),
    confidence_level TEXT NOT NULL CHECK (confidence_level IN ('low', 'medium', 'high')),
    confidence_rank INTEGER NOT NULL,
    CHECK (ndc_10 IS NOT NULL OR ndc_11 IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_ndc_ref_10 ON ndc_vial_type_reference(ndc_10);
CREATE INDEX IF NOT EXISTS idx_ndc_ref_11 ON ndc_vial_type_reference(ndc_11);

-- ============================================================================
-- Inventory Lots (Mutated only by consumption)
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_lots (
    lot_id TEXT PRIMARY KEY,
    drug_id TEXT NOT NULL REFERENCES drugs(drug_id),
    lot_number TEXT NOT NULL,
    on_hand INTEGER NOT NULL CHECK (on_hand >= 0),
    partial_remaining REAL,
    partial_unit TEXT,
    opened_at TEXT,                              -- RFC 3339
    expires_after_hours INTEGER CHECK (expires_after_hours IS NULL OR expires_after_hours >= 0),
    expiration_date TEXT,
    destroyed INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (partial_remaining IS NULL OR (partial_remaining >= 0 AND partial_unit IS NOT NULL))
);

-- At most one active lot per (drug, lot number)
CREATE UNIQUE INDEX IF NOT EXISTS idx_lots_active
    ON inventory_lots(drug_id, lot_number) WHERE destroyed = 0;

-- ============================================================================
-- Usage Events (Append-only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS usage_events (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    drug_id TEXT NOT NULL,
    lot_id TEXT NOT NULL REFERENCES inventory_lots(lot_id),
    context TEXT NOT NULL DEFAULT '{}',          -- JSON UsageContext, stored verbatim
    usage_type TEXT NOT NULL CHECK (usage_type IN ('full_vial', 'partial_vial', 'wastage')),
    quantity REAL NOT NULL CHECK (quantity >= 0),
    wastage_quantity REAL NOT NULL DEFAULT 0 CHECK (wastage_quantity >= 0),
    unit TEXT NOT NULL,
    remaining_after_usage REAL,
    opened_new_vial INTEGER NOT NULL DEFAULT 0,
    recorded_at TEXT NOT NULL,                   -- RFC 3339
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_usage_lot ON usage_events(lot_id);
CREATE INDEX IF NOT EXISTS idx_usage_drug ON usage_events(drug_id);

CREATE TRIGGER IF NOT EXISTS usage_events_no_update BEFORE UPDATE ON usage_events
BEGIN
    SELECT RAISE(ABORT, 'usage_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS usage_events_no_delete BEFORE DELETE ON usage_events
BEGIN
    SELECT RAISE(ABORT, 'usage_events is append-only');
END;
"#;
