use crate::bank::{Role, StackId};
use crate::opcode::Opcode;
use crate::record::OutputRef;
use crate::stack::StackError;
use crate::value::Kind;
use serde::Serialize;
use thiserror::Error;

/// The transaction is invalid. Expected outcome of adversarial or
/// malformed input; never retried by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Rejection {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Kind, found: Kind },
    #[error("illegal stack access: {op:?} on {stack:?}")]
    IllegalStackAccess { op: Opcode, stack: StackId },
    #[error("transaction header already set")]
    DuplicateHeader,
    #[error("nonce conflict")]
    NonceConflict,
    #[error("condition not satisfied: {reason}")]
    UnsatisfiedCondition { reason: String },
    #[error("unbalanced run: {role:?} holds {len} item(s) at termination")]
    UnbalancedRun { role: Role, len: usize },
    #[error("invalid value proof")]
    InvalidProof,
    #[error("verify failed")]
    VerifyFailed,
    #[error("integer overflow in {0:?}")]
    IntegerOverflow(Opcode),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("invalid amount {0}")]
    InvalidAmount(i64),
    #[error("asset mismatch")]
    AssetMismatch,
    #[error("previous output not found")]
    PrevoutNotFound,
    #[error("confidential value must be revealed first")]
    Unrevealed,
    #[error("malformed public key or signature")]
    BadSignature,
    #[error("header time bounds [{min_time}, {max_time}] exclude {now}")]
    HeaderTimeBounds { min_time: i64, max_time: i64, now: i64 },
    #[error("nonce expiry {expiry} precedes header max time {max_time}")]
    NonceWindow { expiry: i64, max_time: i64 },
    #[error("output {0} spent twice in one run")]
    DuplicateSpend(OutputRef),
}

impl Rejection {
    /// Stable reason code for logs and the state layer.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::StackUnderflow => "stack_underflow",
            Rejection::TypeMismatch { .. } => "type_mismatch",
            Rejection::IllegalStackAccess { .. } => "illegal_stack_access",
            Rejection::DuplicateHeader => "duplicate_header",
            Rejection::NonceConflict => "nonce_conflict",
            Rejection::UnsatisfiedCondition { .. } => "unsatisfied_condition",
            Rejection::UnbalancedRun { .. } => "unbalanced_run",
            Rejection::InvalidProof => "invalid_proof",
            Rejection::VerifyFailed => "verify_failed",
            Rejection::IntegerOverflow(_) => "integer_overflow",
            Rejection::InvalidRecord(_) => "invalid_record",
            Rejection::InvalidAmount(_) => "invalid_amount",
            Rejection::AssetMismatch => "asset_mismatch",
            Rejection::PrevoutNotFound => "prevout_not_found",
            Rejection::Unrevealed => "unrevealed",
            Rejection::BadSignature => "bad_signature",
            Rejection::HeaderTimeBounds { .. } => "header_time_bounds",
            Rejection::NonceWindow { .. } => "nonce_window",
            Rejection::DuplicateSpend(_) => "duplicate_spend",
        }
    }
}

/// Resource or policy exhaustion. Not a validity judgment: counts as a
/// rejection for acceptance purposes but may point at an engine or
/// compiler bug.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Fault {
    #[error("stack index {depth} out of range (len {len})")]
    StackIndexOutOfRange { depth: usize, len: usize },
    #[error("condition recursion limit {limit} exceeded")]
    RecursionLimitExceeded { limit: usize },
    #[error("fuel exhausted")]
    FuelExhausted,
    #[error("stack length limit {limit} exceeded")]
    StackOverflow { limit: usize },
    #[error("value nesting limit {limit} exceeded")]
    ValueTooDeep { limit: usize },
    #[error("value size limit {limit} exceeded")]
    ValueTooLarge { limit: usize },
}

impl Fault {
    pub fn code(&self) -> &'static str {
        match self {
            Fault::StackIndexOutOfRange { .. } => "stack_index_out_of_range",
            Fault::RecursionLimitExceeded { .. } => "recursion_limit_exceeded",
            Fault::FuelExhausted => "fuel_exhausted",
            Fault::StackOverflow { .. } => "stack_overflow",
            Fault::ValueTooDeep { .. } => "value_too_deep",
            Fault::ValueTooLarge { .. } => "value_too_large",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("faulted: {0}")]
    Faulted(#[from] Fault),
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Rejected(r) => r.code(),
            ExecError::Faulted(f) => f.code(),
        }
    }
}

impl From<StackError> for ExecError {
    fn from(e: StackError) -> Self {
        match e {
            StackError::Underflow => Rejection::StackUnderflow.into(),
            StackError::TypeMismatch { expected, found } => {
                Rejection::TypeMismatch { expected, found }.into()
            }
            StackError::IndexOutOfRange { depth, len } => {
                Fault::StackIndexOutOfRange { depth, len }.into()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
