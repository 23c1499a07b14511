use std::sync::PoisonError;
use thiserror::Error;
use txvm::{Fault, OutputRef, Rejection};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transaction rejected: {0}")]
    Rejected(Rejection),
    #[error("transaction faulted: {0}")]
    Faulted(Fault),
    /// Validated effects no longer apply to the current state.
    #[error("conflict applying effects: {0}")]
    Conflict(String),
    #[error("unknown output {0}")]
    UnknownOutput(OutputRef),
    #[error("ledger lock poisoned")]
    Poisoned,
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Rejected(r) => r.code(),
            LedgerError::Faulted(f) => f.code(),
            LedgerError::Conflict(_) => "conflict",
            LedgerError::UnknownOutput(_) => "unknown_output",
            LedgerError::Poisoned => "poisoned",
        }
    }
}

impl<T> From<PoisonError<T>> for LedgerError {
    fn from(_: PoisonError<T>) -> Self {
        LedgerError::Poisoned
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
