//! txvm_ledger - reference state layer for the txvm engine
//!
//! Holds unspent outputs and committed nonces, answers the engine's
//! prevout and nonce queries, and applies accepted effects atomically.

pub mod error;
pub mod ledger;
pub mod tx;

pub use error::{LedgerError, Result};
pub use ledger::{AddOutcome, Ledger, Snapshot, TxCallback};
pub use tx::{Transaction, TxId, TX_CONTEXT};
