//! txvm - stack-machine execution engine for ledger transaction validation
//!
//! A transaction is a program. Running it against a fresh [`StackBank`]
//! either accepts, producing [`Effects`] for the state layer to apply,
//! or rejects with a reason code.
//!
//! - No IO: prior outputs and nonce history come in through [`StateView`]
//! - Deterministic: same seed and program, same outcome and effects
//! - Conserving: value moves only through value-class opcodes
//! - Fuel-metered, with bounded condition recursion, stack length and
//!   value size

pub mod bank;
pub mod config;
pub mod effects;
pub mod error;
pub mod exec;
pub mod opcode;
pub mod providers;
pub mod record;
pub mod stack;
pub mod value;

pub use bank::{Current, Legacy, Protocol, Role, StackBank, StackId, Version};
pub use config::{EngineConfig, Fuel};
pub use effects::{CreatedOutput, Effects};
pub use error::{ExecError, Fault, Rejection};
pub use exec::{run, Engine, Outcome, RunReport, RunState, Seed};
pub use opcode::{Instr, Opcode, Program};
pub use providers::{NoConfidential, NonceStatus, StateView, ValueClaim, ValueProofVerifier};
pub use record::{Anchor, AssetId, OutputRecord, OutputRef, Quantity, TxHeader, ValueItem};
pub use stack::{Stack, StackError, TupleStack};
pub use value::{Footprint, Kind, Tuple, Value};
