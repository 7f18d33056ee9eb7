//! Append and verification over the persisted chain.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::database::Database;
use crate::error::AppError;
use crate::ledger::entry::{LedgerEntry, NewLedgerEntry};

/// Result of walking the full chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub length: usize,
}

#[derive(Clone)]
pub struct Ledger {
    db: Database,
    // Serializes read-tip-then-insert. Two concurrent appends must not
    // both claim the same prev_block; that would fork the chain without
    // any error being raised. A multi-process deployment would need a
    // storage-level optimistic check instead of this in-process lock.
    append_lock: Arc<Mutex<()>>,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Ledger {
            db,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append one entry to the chain. The first-ever entry links to the
    /// empty string. Nothing is persisted if validation fails.
    pub async fn append(&self, new: NewLedgerEntry) -> Result<LedgerEntry, AppError> {
        new.validate()?;

        let _guard = self.append_lock.lock().await;

        let prev_block: Option<String> =
            sqlx::query_scalar("SELECT block FROM ledger ORDER BY id DESC LIMIT 1")
                .fetch_optional(self.db.pool())
                .await?;

        let entry = LedgerEntry::seal(new, prev_block.unwrap_or_default(), Utc::now());

        sqlx::query(
            "INSERT INTO ledger (entry_type, entity, actor, hospital, details, timestamp, prev_block, block) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.entry_type)
        .bind(&entry.entity)
        .bind(&entry.by)
        .bind(&entry.hospital)
        .bind(&entry.details)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.prev_block)
        .bind(&entry.block)
        .execute(self.db.pool())
        .await?;

        debug!(
            entry_type = %entry.entry_type,
            entity = %entry.entity,
            "appended ledger entry"
        );

        Ok(entry)
    }

    /// Walk the chain in creation order, recomputing each block digest
    /// and checking the link to the previous entry. Stops at the first
    /// mismatch; `length` always reports the total entries read. A chain
    /// of length 0 is valid. Diagnostic only, repairs nothing.
    pub async fn verify_chain(&self) -> Result<ChainVerification, AppError> {
        let rows = sqlx::query(
            "SELECT entry_type, entity, actor, hospital, details, timestamp, prev_block, block \
             FROM ledger ORDER BY id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        let length = rows.len();
        let mut expected_prev = String::new();
        let mut valid = true;

        for row in &rows {
            let entry = entry_from_row(row)?;
            if !entry.verify_block() || entry.prev_block != expected_prev {
                valid = false;
                break;
            }
            expected_prev = entry.block;
        }

        Ok(ChainVerification { valid, length })
    }

    /// All entries, newest first.
    pub async fn list_all(&self) -> Result<Vec<LedgerEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT entry_type, entity, actor, hospital, details, timestamp, prev_block, block \
             FROM ledger ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Entries for one entity (patient identifier), newest first.
    pub async fn list_by_entity(&self, entity: &str) -> Result<Vec<LedgerEntry>, AppError> {
        let rows = sqlx::query(
            "SELECT entry_type, entity, actor, hospital, details, timestamp, prev_block, block \
             FROM ledger WHERE entity = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(entity)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, AppError> {
    let timestamp: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| AppError::Database(format!("bad timestamp in ledger row: {}", e)))?
        .with_timezone(&Utc);

    Ok(LedgerEntry {
        entry_type: row.get("entry_type"),
        entity: row.get("entity"),
        by: row.get("actor"),
        hospital: row.get("hospital"),
        details: row.get("details"),
        timestamp,
        block: row.get("block"),
        prev_block: row.get("prev_block"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger() -> (Ledger, Database) {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        (Ledger::new(db.clone()), db)
    }

    fn entry(entry_type: &str, entity: &str, by: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            entry_type: entry_type.to_string(),
            entity: entity.to_string(),
            by: by.to_string(),
            hospital: "Bir Hospital".to_string(),
            details: None,
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_valid() {
        let (ledger, _db) = ledger().await;
        let result = ledger.verify_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.length, 0);
    }

    #[tokio::test]
    async fn test_genesis_entry_links_to_empty_string() {
        let (ledger, _db) = ledger().await;
        let first = ledger
            .append(entry("Consent Grant", "sitasharma", "Dr. Anil Thapa"))
            .await
            .unwrap();
        assert_eq!(first.prev_block, "");

        let result = ledger.verify_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.length, 1);
    }

    #[tokio::test]
    async fn test_chain_links_across_appends() {
        let (ledger, _db) = ledger().await;
        for i in 0..5 {
            ledger
                .append(entry("Record Created", &format!("patient{}", i), "anilthapa"))
                .await
                .unwrap();
        }

        let result = ledger.verify_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.length, 5);

        // list_all is newest-first: each entry's block is its successor's
        // prev_block.
        let entries = ledger.list_all().await.unwrap();
        for pair in entries.windows(2) {
            assert_eq!(pair[0].prev_block, pair[1].block);
        }
    }

    #[tokio::test]
    async fn test_grant_then_record_scenario() {
        let (ledger, _db) = ledger().await;
        ledger
            .append(entry("Consent Grant", "sitasharma", "Dr. Anil Thapa"))
            .await
            .unwrap();
        ledger
            .append(entry("Record Created", "sitasharma", "anilthapa"))
            .await
            .unwrap();

        let result = ledger.verify_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.length, 2);

        let entries = ledger.list_by_entity("sitasharma").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, "Record Created");
        assert_eq!(entries[0].prev_block, entries[1].block);
    }

    #[tokio::test]
    async fn test_tampered_details_detected() {
        let (ledger, db) = ledger().await;
        ledger
            .append(entry("Consent Grant", "sitasharma", "Dr. Anil Thapa"))
            .await
            .unwrap();
        ledger
            .append(entry("Record Created", "sitasharma", "anilthapa"))
            .await
            .unwrap();

        sqlx::query("UPDATE ledger SET details = 'rewritten after the fact' WHERE id = 1")
            .execute(db.pool())
            .await
            .unwrap();

        let result = ledger.verify_chain().await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.length, 2);
    }

    #[tokio::test]
    async fn test_broken_link_detected() {
        let (ledger, db) = ledger().await;
        for i in 0..3 {
            ledger
                .append(entry("Record Created", &format!("p{}", i), "anilthapa"))
                .await
                .unwrap();
        }

        sqlx::query("UPDATE ledger SET prev_block = 'sha256:bogus' WHERE id = 2")
            .execute(db.pool())
            .await
            .unwrap();

        let result = ledger.verify_chain().await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.length, 3);
    }

    #[tokio::test]
    async fn test_append_rejects_missing_fields() {
        let (ledger, _db) = ledger().await;
        let bad = NewLedgerEntry {
            entry_type: "Consent Grant".to_string(),
            entity: String::new(),
            by: "Dr. Anil Thapa".to_string(),
            hospital: "Bir Hospital".to_string(),
            details: None,
        };
        assert!(matches!(
            ledger.append(bad).await,
            Err(AppError::Validation(_))
        ));

        // nothing persisted
        let result = ledger.verify_chain().await.unwrap();
        assert_eq!(result.length, 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_chain_valid() {
        let (ledger, _db) = ledger().await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .append(NewLedgerEntry {
                        entry_type: "Record Created".to_string(),
                        entity: format!("patient{}", i),
                        by: "anilthapa".to_string(),
                        hospital: "Bir Hospital".to_string(),
                        details: None,
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let result = ledger.verify_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.length, 8);
    }
}
