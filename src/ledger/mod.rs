//! Hash-chained audit ledger.
//!
//! Every sensitive action (consent change, history record) appends one
//! immutable entry whose hash covers its own fields plus the hash of the
//! previous entry, making after-the-fact edits detectable.

pub mod chain;
pub mod entry;

pub use chain::{ChainVerification, Ledger};
pub use entry::{LedgerEntry, NewLedgerEntry};
