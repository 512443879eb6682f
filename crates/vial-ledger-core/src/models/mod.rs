//! Domain models for the vial ledger.

mod drug;
mod lot;
mod units;
mod usage;

pub use drug::*;
pub use lot::*;
pub use units::*;
pub use usage::*;
