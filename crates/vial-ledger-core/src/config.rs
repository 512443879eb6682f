//! Ledger configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::ConfidenceLevel;

/// Tunables for storage and consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Attempts per `consume()` when the lot version changes underneath it
    pub max_consume_attempts: u32,
    /// Lowest NDC reference confidence the resolver will accept
    pub min_reference_confidence: ConfidenceLevel,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            max_consume_attempts: 3,
            min_reference_confidence: ConfidenceLevel::Medium,
        }
    }
}

impl LedgerConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger config {}", path.display()))?;
        let config = Self::from_json(&json)
            .with_context(|| format!("parsing ledger config {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamp values that would disable consumption outright.
    pub fn sanitized(mut self) -> Self {
        if self.max_consume_attempts == 0 {
            self.max_consume_attempts = 1;
        }
        if self.min_reference_confidence == ConfidenceLevel::Low {
            tracing::warn!("min_reference_confidence=low is not allowed, using medium");
            self.min_reference_confidence = ConfidenceLevel::Medium;
        }
        self
    }
}
