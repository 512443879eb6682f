//! Vial Ledger Core Library
//!
//! Lot-level inventory accounting for administered infusions and injections.
//!
//! # Architecture
//!
//! ```text
//!   Save-administration workflow (caller)
//!                  │
//!                  ▼
//!        ConsumptionEngine::consume()
//!                  │
//!                  ├──► VialTypeResolver ──► declared type
//!                  │                     ──► NDC reference (cached onto drug)
//!                  │                     ──► NDC prefix rules
//!                  │
//!      ┌───────────┴────────────┐
//!      │   one IMMEDIATE tx     │
//!      │  InventoryLot update   │
//!      │  UsageRecorder append  │
//!      └───────────┬────────────┘
//!                  ▼
//!          ConsumptionResult
//!
//!   StatusReporter ──► read-only LotSnapshot (independent of the engine)
//! ```
//!
//! # Core Principle
//!
//! **A lot mutation and its usage event commit together or not at all.**
//! Single-dose and unclassified drugs always write off a whole vial;
//! multi-dose vials carry a reusable remainder until it runs out, its unit
//! no longer matches, or its beyond-use window passes.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Drug, InventoryLot, UsageEvent, etc.)
//! - [`resolver`]: Vial type resolution with injectable reference data
//! - [`engine`]: Consumption engine
//! - [`ledger`]: Append-only, hash-chained usage ledger
//! - [`status`]: Read-only lot snapshots
//! - [`config`]: Ledger configuration
//! - [`logging`]: Tracing setup for host applications

pub mod config;
pub mod db;
pub mod engine;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod resolver;
pub mod status;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use db::Database;
pub use engine::{ConsumeError, ConsumptionEngine, ConsumptionPath, ConsumptionRequest, ConsumptionResult};
pub use ledger::{ChainVerification, UsageRecorder};
pub use models::{
    ConfidenceLevel, Drug, InventoryLot, NdcCodes, NdcVialTypeReference, UsageContext, UsageEvent,
    UsageType, VialType, VialTypeSource,
};
pub use resolver::{StaticNdcPatterns, VialTypeResolver};
pub use status::{LotSnapshot, StatusReporter};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum VialLedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Unknown vial size: {0}")]
    UnknownVialSize(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for VialLedgerError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::Constraint(reason) => VialLedgerError::InvalidInput(reason),
            other => VialLedgerError::DatabaseError(other.to_string()),
        }
    }
}

impl From<ConsumeError> for VialLedgerError {
    fn from(e: ConsumeError) -> Self {
        match e {
            ConsumeError::Validation(_) => VialLedgerError::InvalidInput(e.to_string()),
            ConsumeError::DrugNotFound(_) | ConsumeError::LotNotFound { .. } => {
                VialLedgerError::NotFound(e.to_string())
            }
            ConsumeError::InsufficientStock { .. } | ConsumeError::ExceedsVialCapacity { .. } => {
                VialLedgerError::InsufficientStock(e.to_string())
            }
            ConsumeError::UnknownVialSize { .. } => VialLedgerError::UnknownVialSize(e.to_string()),
            ConsumeError::Database(db) => db.into(),
            ConsumeError::Ledger(ledger) => ledger.into(),
        }
    }
}

impl From<ledger::LedgerError> for VialLedgerError {
    fn from(e: ledger::LedgerError) -> Self {
        match e {
            ledger::LedgerError::Database(db) => db.into(),
            ledger::LedgerError::Json(json) => json.into(),
        }
    }
}

impl From<serde_json::Error> for VialLedgerError {
    fn from(e: serde_json::Error) -> Self {
        VialLedgerError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for VialLedgerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        VialLedgerError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install the tracing subscriber (RUST_LOG filter, default info).
#[uniffi::export]
pub fn init_logging() {
    logging::init();
}

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<VialLedger>, VialLedgerError> {
    let db = Database::open(&path)?;
    Ok(VialLedger::wrap(db))
}

/// Open or create a database with a JSON configuration document.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<VialLedger>, VialLedgerError> {
    let config = LedgerConfig::from_json(&config_json)?;
    let db = Database::open_with_config(&path, config)?;
    Ok(VialLedger::wrap(db))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<VialLedger>, VialLedgerError> {
    let db = Database::open_in_memory()?;
    Ok(VialLedger::wrap(db))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct VialLedger {
    db: Arc<Mutex<Database>>,
}

impl VialLedger {
    fn wrap(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

#[uniffi::export]
impl VialLedger {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Add or update a drug record.
    pub fn upsert_drug(&self, drug: FfiDrug) -> Result<(), VialLedgerError> {
        let db = self.db.lock()?;
        db.upsert_drug(&drug.into())?;
        Ok(())
    }

    /// Load an NDC → vial type reference row.
    pub fn add_ndc_reference(&self, reference: FfiNdcReference) -> Result<(), VialLedgerError> {
        let db = self.db.lock()?;
        db.insert_ndc_reference(&reference.into())?;
        Ok(())
    }

    /// Register a closed lot. Returns the new lot ID.
    pub fn insert_lot(&self, lot: FfiNewLot) -> Result<String, VialLedgerError> {
        let db = self.db.lock()?;
        let lot: InventoryLot = lot.into();
        db.insert_lot(&lot)?;
        Ok(lot.lot_id)
    }

    // =========================================================================
    // Consumption Operations
    // =========================================================================

    /// Resolve a drug's vial type. Never fails; unknown drugs resolve to unknown.
    pub fn resolve_vial_type(&self, drug_id: String) -> Result<FfiVialType, VialLedgerError> {
        let db = self.db.lock()?;
        let resolver = VialTypeResolver::new(&db);
        Ok(resolver.resolve(&drug_id).into())
    }

    /// Deduct an administration from its lot.
    pub fn consume(
        &self,
        request: FfiConsumptionRequest,
    ) -> Result<FfiConsumptionResult, VialLedgerError> {
        let db = self.db.lock()?;
        let engine = ConsumptionEngine::new(&db);
        let result = engine.consume(&request.into())?;
        Ok(result.into())
    }

    // =========================================================================
    // Reporting Operations
    // =========================================================================

    /// Current snapshot of an active lot.
    pub fn lot_status(
        &self,
        drug_id: String,
        lot_number: String,
    ) -> Result<Option<FfiLotSnapshot>, VialLedgerError> {
        let db = self.db.lock()?;
        let snapshot = StatusReporter::new(&db).status(&drug_id, &lot_number)?;
        Ok(snapshot.map(|s| s.into()))
    }

    /// Usage events recorded against an active lot, oldest first.
    pub fn lot_usage_history(
        &self,
        drug_id: String,
        lot_number: String,
    ) -> Result<Vec<FfiUsageEvent>, VialLedgerError> {
        let db = self.db.lock()?;
        let lot = db
            .get_active_lot(&drug_id, &lot_number)?
            .ok_or_else(|| VialLedgerError::NotFound(format!("lot {lot_number} of {drug_id}")))?;
        let events = UsageRecorder::new(&db).history_for_lot(&lot.lot_id)?;
        Ok(events.into_iter().map(|e| e.into()).collect())
    }

    /// Recompute the usage ledger hash chain.
    pub fn verify_usage_ledger(&self) -> Result<FfiChainVerification, VialLedgerError> {
        let db = self.db.lock()?;
        let verification = UsageRecorder::new(&db).verify_chain()?;
        Ok(verification.into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe vial type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiVialType {
    SingleDose,
    MultiDose,
    Unknown,
}

impl From<VialType> for FfiVialType {
    fn from(vial_type: VialType) -> Self {
        match vial_type {
            VialType::SingleDose => FfiVialType::SingleDose,
            VialType::MultiDose => FfiVialType::MultiDose,
            VialType::Unknown => FfiVialType::Unknown,
        }
    }
}

impl From<FfiVialType> for VialType {
    fn from(vial_type: FfiVialType) -> Self {
        match vial_type {
            FfiVialType::SingleDose => VialType::SingleDose,
            FfiVialType::MultiDose => VialType::MultiDose,
            FfiVialType::Unknown => VialType::Unknown,
        }
    }
}

/// FFI-safe reference confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiConfidenceLevel {
    Low,
    Medium,
    High,
}

impl From<FfiConfidenceLevel> for ConfidenceLevel {
    fn from(level: FfiConfidenceLevel) -> Self {
        match level {
            FfiConfidenceLevel::Low => ConfidenceLevel::Low,
            FfiConfidenceLevel::Medium => ConfidenceLevel::Medium,
            FfiConfidenceLevel::High => ConfidenceLevel::High,
        }
    }
}

/// FFI-safe drug record. Vial types set here are explicit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDrug {
    pub drug_id: String,
    pub name: String,
    pub vial_type: FfiVialType,
    pub vial_size: Option<f64>,
    pub vial_size_unit: Option<String>,
    pub ndc_raw: Option<String>,
    pub ndc_10: Option<String>,
    pub ndc_11: Option<String>,
}

impl From<FfiDrug> for Drug {
    fn from(drug: FfiDrug) -> Self {
        Drug {
            drug_id: drug.drug_id,
            name: drug.name,
            vial_type: drug.vial_type.into(),
            vial_type_source: VialTypeSource::Explicit,
            vial_size: drug.vial_size,
            vial_size_unit: drug.vial_size_unit,
            ndc: NdcCodes {
                raw: drug.ndc_raw,
                ndc_10: drug.ndc_10,
                ndc_11: drug.ndc_11,
            },
        }
    }
}

/// FFI-safe NDC reference row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNdcReference {
    pub ndc_10: Option<String>,
    pub ndc_11: Option<String>,
    pub vial_type: FfiVialType,
    pub confidence: FfiConfidenceLevel,
}

impl From<FfiNdcReference> for NdcVialTypeReference {
    fn from(reference: FfiNdcReference) -> Self {
        NdcVialTypeReference {
            ndc_10: reference.ndc_10,
            ndc_11: reference.ndc_11,
            vial_type: reference.vial_type.into(),
            confidence: reference.confidence.into(),
        }
    }
}

/// FFI-safe new lot.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewLot {
    pub drug_id: String,
    pub lot_number: String,
    pub on_hand: i64,
    pub expires_after_hours: Option<i64>,
    pub expiration_date: Option<String>,
}

impl From<FfiNewLot> for InventoryLot {
    fn from(lot: FfiNewLot) -> Self {
        let mut new_lot = InventoryLot::new(lot.drug_id, lot.lot_number, lot.on_hand);
        new_lot.expires_after_hours = lot.expires_after_hours;
        new_lot.expiration_date = lot.expiration_date;
        new_lot
    }
}

/// FFI-safe consumption request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConsumptionRequest {
    pub drug_id: String,
    pub lot_number: String,
    pub quantity_used: f64,
    pub quantity_wasted: f64,
    pub unit: String,
    pub patient_id: Option<String>,
    pub encounter_id: Option<String>,
    pub form_id: Option<String>,
    pub user_id: Option<String>,
}

impl From<FfiConsumptionRequest> for ConsumptionRequest {
    fn from(request: FfiConsumptionRequest) -> Self {
        ConsumptionRequest {
            drug_id: request.drug_id,
            lot_number: request.lot_number,
            quantity_used: request.quantity_used,
            quantity_wasted: request.quantity_wasted,
            unit: request.unit,
            context: UsageContext {
                patient_id: request.patient_id,
                encounter_id: request.encounter_id,
                form_id: request.form_id,
                user_id: request.user_id,
            },
        }
    }
}

/// FFI-safe consumption result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConsumptionResult {
    pub lot_id: String,
    pub vial_type: FfiVialType,
    pub path: String,
    pub vials_deducted: u32,
    pub quantity_used: f64,
    pub wastage_quantity: f64,
    pub unit: String,
    pub on_hand: i64,
    pub partial_remaining: Option<f64>,
    pub usage_event_id: String,
    pub usage_type: String,
}

impl From<ConsumptionResult> for FfiConsumptionResult {
    fn from(result: ConsumptionResult) -> Self {
        Self {
            lot_id: result.lot_id,
            vial_type: result.vial_type.into(),
            path: result.path.as_str().to_string(),
            vials_deducted: result.vials_deducted,
            quantity_used: result.quantity_used,
            wastage_quantity: result.wastage_quantity,
            unit: result.unit,
            on_hand: result.on_hand,
            partial_remaining: result.partial_remaining,
            usage_event_id: result.usage_event_id,
            usage_type: result.usage_type.as_str().to_string(),
        }
    }
}

/// FFI-safe lot snapshot.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLotSnapshot {
    pub drug_id: String,
    pub drug_name: String,
    pub vial_type: FfiVialType,
    pub lot_number: String,
    pub on_hand: i64,
    pub partial_remaining: Option<f64>,
    pub partial_unit: Option<String>,
    pub opened_at: Option<String>,
    pub expires_after_hours: Option<i64>,
    pub vial_size: Option<f64>,
    pub vial_size_unit: Option<String>,
    pub partial_expired: bool,
}

impl From<LotSnapshot> for FfiLotSnapshot {
    fn from(snapshot: LotSnapshot) -> Self {
        Self {
            drug_id: snapshot.drug_id,
            drug_name: snapshot.drug_name,
            vial_type: snapshot.vial_type.into(),
            lot_number: snapshot.lot_number,
            on_hand: snapshot.on_hand,
            partial_remaining: snapshot.partial_remaining,
            partial_unit: snapshot.partial_unit,
            opened_at: snapshot.opened_at.map(|t| t.to_rfc3339()),
            expires_after_hours: snapshot.expires_after_hours,
            vial_size: snapshot.vial_size,
            vial_size_unit: snapshot.vial_size_unit,
            partial_expired: snapshot.partial_expired,
        }
    }
}

/// FFI-safe usage event.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUsageEvent {
    pub sequence: i64,
    pub event_id: String,
    pub usage_type: String,
    pub quantity: f64,
    pub wastage_quantity: f64,
    pub unit: String,
    pub remaining_after_usage: Option<f64>,
    pub opened_new_vial: bool,
    pub user_id: Option<String>,
    pub recorded_at: String,
}

impl From<UsageEvent> for FfiUsageEvent {
    fn from(event: UsageEvent) -> Self {
        Self {
            sequence: event.sequence,
            event_id: event.event_id,
            usage_type: event.usage_type.as_str().to_string(),
            quantity: event.quantity,
            wastage_quantity: event.wastage_quantity,
            unit: event.unit,
            remaining_after_usage: event.remaining_after_usage,
            opened_new_vial: event.opened_new_vial,
            user_id: event.context.user_id,
            recorded_at: event.recorded_at.to_rfc3339(),
        }
    }
}

/// FFI-safe chain verification result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChainVerification {
    pub checked: u32,
    pub intact: bool,
    pub first_broken_sequence: Option<i64>,
}

impl From<ChainVerification> for FfiChainVerification {
    fn from(verification: ChainVerification) -> Self {
        Self {
            checked: verification.checked,
            intact: verification.is_intact(),
            first_broken_sequence: verification.first_broken_sequence,
        }
    }
}
