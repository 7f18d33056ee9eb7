//! Ledger entry structure and block hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// One immutable audit row. `block` is the digest of this entry's own
/// fields; `prev_block` is the previous entry's `block` (empty string
/// for the genesis entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub entity: String,
    pub by: String,
    pub hospital: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub block: String,
    #[serde(rename = "prevBlock")]
    pub prev_block: String,
}

/// Fields supplied by a mutation handler. Timestamp, chain link, and
/// digest are assigned at append time.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub entry_type: String,
    pub entity: String,
    pub by: String,
    pub hospital: String,
    pub details: Option<String>,
}

impl NewLedgerEntry {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.entry_type.is_empty()
            || self.entity.is_empty()
            || self.by.is_empty()
            || self.hospital.is_empty()
        {
            return Err(AppError::Validation(
                "type, entity, by, and hospital are required".to_string(),
            ));
        }
        Ok(())
    }
}

impl LedgerEntry {
    /// Seal a new entry: stamp it, link it to the chain tip, and compute
    /// its block digest.
    pub fn seal(new: NewLedgerEntry, prev_block: String, timestamp: DateTime<Utc>) -> Self {
        let mut entry = LedgerEntry {
            entry_type: new.entry_type,
            entity: new.entity,
            by: new.by,
            hospital: new.hospital,
            details: new.details,
            timestamp,
            block: String::new(),
            prev_block,
        };
        entry.block = entry.compute_block();
        entry
    }

    /// Canonical serialization hashed into `block`. Field order is fixed;
    /// verification recomputes exactly this string.
    pub fn canonical_string(&self) -> String {
        format!(
            "type:{}|entity:{}|by:{}|hospital:{}|timestamp:{}|prev_block:{}|details:{}",
            self.entry_type,
            self.entity,
            self.by,
            self.hospital,
            self.timestamp.to_rfc3339(),
            self.prev_block,
            self.details.as_deref().unwrap_or("")
        )
    }

    /// SHA256 over the canonical string.
    pub fn compute_block(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_string().as_bytes());
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    /// Recompute the digest and compare against the stored one.
    pub fn verify_block(&self) -> bool {
        self.block == self.compute_block()
    }
}
