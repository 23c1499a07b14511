//! Transactions as the ledger sees them: a version, the outputs they
//! consume and the program that moves the value.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use txvm::{OutputRef, Program, Seed, Tuple, Value, Version};

pub const TX_CONTEXT: &str = "txvm 2024 transaction id v1";

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: Version,
    pub inputs: Vec<OutputRef>,
    pub program: Program,
}

impl Transaction {
    pub fn new(version: Version, inputs: Vec<OutputRef>, program: Program) -> Self {
        Self { version, inputs, program }
    }

    /// Quoted form `(version, (input refs...), program)`.
    pub fn to_tuple(&self) -> Tuple {
        let inputs: Tuple = self.inputs.iter().map(|r| Value::Bytes(r.0.to_vec())).collect();
        Tuple::new(vec![
            Value::Int64(self.version.as_i64()),
            Value::Tuple(inputs),
            self.program.to_value(),
        ])
    }

    pub fn id(&self) -> TxId {
        TxId(self.to_tuple().digest_in(TX_CONTEXT))
    }

    /// Engine seed; the run id is the transaction id.
    pub fn seed(&self, now: i64) -> Seed {
        Seed { version: self.version, inputs: self.inputs.clone(), run_id: self.id().0, now }
    }
}
