//! Hash chain over usage events.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::UsageEvent;

use super::LedgerResult;

/// Result of walking the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Entries examined
    pub checked: u32,
    /// First entry whose link or hash does not match, if any
    pub first_broken_sequence: Option<i64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken_sequence.is_none()
    }
}

/// SHA-256 of the previous hash followed by the entry body, hex encoded.
pub fn chain_hash(prev_hash: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check that `events` (in sequence order) form an unbroken chain.
pub fn verify_events(events: &[UsageEvent]) -> LedgerResult<ChainVerification> {
    let mut expected_prev = String::new();

    for (checked, event) in events.iter().enumerate() {
        let recomputed = chain_hash(&event.prev_hash, &event.canonical_body()?);
        if event.prev_hash != expected_prev || recomputed != event.entry_hash {
            tracing::warn!(sequence = event.sequence, "usage ledger chain broken");
            return Ok(ChainVerification {
                checked: checked as u32 + 1,
                first_broken_sequence: Some(event.sequence),
            });
        }
        expected_prev = event.entry_hash.clone();
    }

    Ok(ChainVerification {
        checked: events.len() as u32,
        first_broken_sequence: None,
    })
}
