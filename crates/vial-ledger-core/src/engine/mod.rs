//! Vial consumption engine.
//!
//! One `consume()` call is one read-modify-write on one lot:
//!
//! ```text
//! request ─► validate ─► resolve vial type ─► BEGIN IMMEDIATE
//!                                                  │
//!                                         load active lot
//!                                                  │
//!                          ┌───────────────────────┴───────────────────────┐
//!                 single-dose / unknown                               multi-dose
//!                 on_hand - 1, clear partial          reuse open remainder, or open a new vial
//!                          └───────────────────────┬───────────────────────┘
//!                                                  │
//!                          versioned lot UPDATE + usage event append
//!                                                  │
//!                                               COMMIT
//! ```
//!
//! A version conflict rolls the transaction back and the attempt is retried.

mod request;

pub use request::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::ledger::{LedgerError, UsageRecorder};
use crate::models::{canonical_unit, Drug, InventoryLot, NewUsageEvent, UsageType, VialType};
use crate::resolver::VialTypeResolver;

/// Consumption errors. Every variant leaves the lot untouched.
#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Drug not found: {0}")]
    DrugNotFound(String),

    #[error("No active lot {lot_number} for drug {drug_id}")]
    LotNotFound { drug_id: String, lot_number: String },

    #[error("Insufficient stock in lot {lot_number}: {on_hand} intact vials")]
    InsufficientStock { lot_number: String, on_hand: i64 },

    #[error("Drug {drug_id} has no vial size declared in {unit}")]
    UnknownVialSize { drug_id: String, unit: String },

    #[error("Requested {requested} {unit} exceeds one vial of {capacity} {unit}")]
    ExceedsVialCapacity {
        requested: f64,
        capacity: f64,
        unit: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type ConsumeResult<T> = Result<T, ConsumeError>;

/// How a lot was changed, before it is written back.
struct Deduction {
    path: ConsumptionPath,
    vials_deducted: u32,
    usage_type: UsageType,
    remaining_after_usage: Option<f64>,
    opened_new_vial: bool,
}

/// Deducts administered doses from lot-level stock.
pub struct ConsumptionEngine<'a> {
    db: &'a Database,
    resolver: VialTypeResolver<'a>,
    recorder: UsageRecorder<'a>,
}

impl<'a> ConsumptionEngine<'a> {
    /// Engine with the default resolver.
    pub fn new(db: &'a Database) -> Self {
        Self::with_resolver(db, VialTypeResolver::new(db))
    }

    /// Engine with an injected resolver.
    pub fn with_resolver(db: &'a Database, resolver: VialTypeResolver<'a>) -> Self {
        Self {
            db,
            resolver,
            recorder: UsageRecorder::new(db),
        }
    }

    /// Deduct an administration from its lot, timestamped now.
    pub fn consume(&self, request: &ConsumptionRequest) -> ConsumeResult<ConsumptionResult> {
        self.consume_at(request, Utc::now())
    }

    /// Deduct an administration from its lot as of `now`.
    pub fn consume_at(
        &self,
        request: &ConsumptionRequest,
        now: DateTime<Utc>,
    ) -> ConsumeResult<ConsumptionResult> {
        request.validate()?;

        let drug = self
            .db
            .get_drug(&request.drug_id)?
            .ok_or_else(|| ConsumeError::DrugNotFound(request.drug_id.clone()))?;
        let resolution = self.resolver.resolve_drug(&drug);

        let max_attempts = self.db.config().max_consume_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.consume_once(request, &drug, resolution.vial_type, now) {
                Err(ConsumeError::Database(DbError::Conflict(reason))) if attempt < max_attempts => {
                    tracing::warn!(
                        drug_id = %request.drug_id,
                        lot_number = %request.lot_number,
                        attempt,
                        %reason,
                        "lot changed during consumption, retrying"
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// One transactional attempt. Any error drops the transaction, rolling
    /// back both the lot update and the usage event.
    fn consume_once(
        &self,
        request: &ConsumptionRequest,
        drug: &Drug,
        vial_type: VialType,
        now: DateTime<Utc>,
    ) -> ConsumeResult<ConsumptionResult> {
        let tx = self.db.begin_immediate()?;

        let mut lot = self
            .db
            .get_active_lot(&request.drug_id, &request.lot_number)?
            .ok_or_else(|| ConsumeError::LotNotFound {
                drug_id: request.drug_id.clone(),
                lot_number: request.lot_number.clone(),
            })?;
        let expected_version = lot.version;

        let deduction = match vial_type {
            VialType::SingleDose => deduct_single_dose(&mut lot, request)?,
            // Unclassified drugs are written off a whole vial at a time. A
            // remainder from a vial that may be single-use must never be
            // offered for reuse.
            VialType::Unknown => deduct_single_dose(&mut lot, request)?,
            VialType::MultiDose => deduct_multi_dose(&mut lot, drug, request, now)?,
        };

        lot.version = self.db.update_lot_stock(&lot, expected_version)?;

        let unit = canonical_unit(&request.unit);
        let event = self.recorder.record(NewUsageEvent {
            drug_id: request.drug_id.clone(),
            lot_id: lot.lot_id.clone(),
            context: request.context.clone(),
            usage_type: deduction.usage_type,
            quantity: request.total(),
            wastage_quantity: request.quantity_wasted,
            unit: unit.clone(),
            remaining_after_usage: deduction.remaining_after_usage,
            opened_new_vial: deduction.opened_new_vial,
            recorded_at: now,
        })?;

        tx.commit().map_err(DbError::from)?;

        tracing::info!(
            drug_id = %request.drug_id,
            lot_number = %lot.lot_number,
            vial_type = vial_type.as_str(),
            path = deduction.path.as_str(),
            vials_deducted = deduction.vials_deducted,
            on_hand = lot.on_hand,
            partial_remaining = ?lot.partial_remaining,
            "vial consumption recorded"
        );

        Ok(ConsumptionResult {
            drug_id: request.drug_id.clone(),
            lot_id: lot.lot_id,
            lot_number: lot.lot_number,
            vial_type,
            path: deduction.path,
            vials_deducted: deduction.vials_deducted,
            quantity_used: request.quantity_used,
            wastage_quantity: request.quantity_wasted,
            unit,
            on_hand: lot.on_hand,
            partial_remaining: lot.partial_remaining,
            usage_event_id: event.event_id,
            usage_type: event.usage_type,
            recorded_at: now,
        })
    }
}

fn usage_type_for(request: &ConsumptionRequest, otherwise: UsageType) -> UsageType {
    if request.quantity_wasted > 0.0 {
        UsageType::Wastage
    } else {
        otherwise
    }
}

/// Remove exactly one intact vial regardless of the amount drawn.
fn deduct_single_dose(lot: &mut InventoryLot, request: &ConsumptionRequest) -> ConsumeResult<Deduction> {
    if lot.on_hand < 1 {
        return Err(ConsumeError::InsufficientStock {
            lot_number: lot.lot_number.clone(),
            on_hand: lot.on_hand,
        });
    }

    lot.on_hand -= 1;
    if lot.has_partial() {
        tracing::debug!(lot_id = %lot.lot_id, "clearing partial fields on single-dose lot");
    }
    lot.clear_partial();

    Ok(Deduction {
        path: ConsumptionPath::SingleDose,
        vials_deducted: 1,
        usage_type: usage_type_for(request, UsageType::FullVial),
        remaining_after_usage: None,
        opened_new_vial: false,
    })
}

/// Draw from the open remainder when it is reusable and large enough,
/// otherwise puncture a new vial.
fn deduct_multi_dose(
    lot: &mut InventoryLot,
    drug: &Drug,
    request: &ConsumptionRequest,
    now: DateTime<Utc>,
) -> ConsumeResult<Deduction> {
    let total = request.total();

    if let Some(remaining) = lot.reusable_partial(&request.unit, now) {
        if remaining >= total {
            let left = remaining - total;
            lot.partial_remaining = Some(left);
            return Ok(Deduction {
                path: ConsumptionPath::MultiDoseReuse,
                vials_deducted: 0,
                usage_type: usage_type_for(request, UsageType::PartialVial),
                remaining_after_usage: Some(left),
                opened_new_vial: false,
            });
        }
        tracing::debug!(
            lot_id = %lot.lot_id,
            remaining,
            requested = total,
            "open remainder too small, opening a new vial"
        );
    } else if lot.has_partial() {
        tracing::debug!(
            lot_id = %lot.lot_id,
            expired = lot.is_partial_expired(now),
            "open remainder not reusable, opening a new vial"
        );
    }

    if lot.on_hand < 1 {
        return Err(ConsumeError::InsufficientStock {
            lot_number: lot.lot_number.clone(),
            on_hand: lot.on_hand,
        });
    }

    let capacity = drug
        .vial_size_in(&request.unit)
        .ok_or_else(|| ConsumeError::UnknownVialSize {
            drug_id: drug.drug_id.clone(),
            unit: canonical_unit(&request.unit),
        })?;
    if total > capacity {
        return Err(ConsumeError::ExceedsVialCapacity {
            requested: total,
            capacity,
            unit: canonical_unit(&request.unit),
        });
    }

    let left = capacity - total;
    lot.on_hand -= 1;
    lot.open_partial(left, &request.unit, now);

    Ok(Deduction {
        path: ConsumptionPath::MultiDoseNewVial,
        vials_deducted: 1,
        usage_type: usage_type_for(request, UsageType::PartialVial),
        remaining_after_usage: Some(left),
        opened_new_vial: true,
    })
}
