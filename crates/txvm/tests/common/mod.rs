#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use txvm::*;

pub const RUN_ID: [u8; 32] = [0xAB; 32];
pub const NOW: i64 = 1_000;
pub const MAX_TIME: i64 = 2_000;

/// In-memory state layer: unspent outputs plus committed nonce tokens.
#[derive(Default)]
pub struct MemState {
    pub outputs: HashMap<OutputRef, OutputRecord>,
    pub nonces: HashSet<Vec<u8>>,
}

impl MemState {
    pub fn add(&mut self, record: OutputRecord) -> OutputRef {
        let id = record.id();
        self.outputs.insert(id, record);
        id
    }
}

impl StateView for MemState {
    fn resolve_prevout(&self, output: &OutputRef) -> Option<OutputRecord> {
        self.outputs.get(output).cloned()
    }

    fn check_nonce(&self, token: &[u8], _expiry: i64) -> NonceStatus {
        if self.nonces.contains(token) {
            NonceStatus::Conflict
        } else {
            NonceStatus::Fresh
        }
    }
}

pub fn asset_x() -> AssetId {
    AssetId([0x58; 32])
}

/// Condition that always succeeds; `tag` tells owners apart.
pub fn owner(tag: i64) -> Program {
    Program::new(vec![Instr::Push(Value::Int64(tag))])
}

pub fn truthy() -> Program {
    owner(1)
}

pub fn push<V: Into<Value>>(v: V) -> Instr {
    Instr::Push(v.into())
}

pub fn quote(p: &Program) -> Instr {
    Instr::Push(p.to_value())
}

pub fn header_with(version: i64, min_time: i64, max_time: i64) -> Vec<Instr> {
    vec![push(version), push(min_time), push(max_time), Instr::MakeTuple(3), Instr::Header]
}

pub fn header(version: i64) -> Vec<Instr> {
    header_with(version, 0, MAX_TIME)
}

pub fn seed(version: Version, inputs: Vec<OutputRef>) -> Seed {
    Seed { version, inputs, run_id: RUN_ID, now: NOW }
}

pub fn clear_output(asset: AssetId, amount: i64, condition: &Program, anchor: &[u8]) -> OutputRecord {
    let item = ValueItem::clear(asset, amount, Anchor::seed(anchor.to_vec())).unwrap();
    OutputRecord::new(item, condition.to_tuple())
}

pub fn exec_with(cfg: &EngineConfig, seed: Seed, instrs: Vec<Instr>, state: &MemState) -> RunReport {
    txvm::run(cfg, seed, &Program::new(instrs), state, NoConfidential)
}

pub fn exec(seed: Seed, instrs: Vec<Instr>, state: &MemState) -> RunReport {
    exec_with(&EngineConfig::default(), seed, instrs, state)
}

pub fn effects(report: &RunReport) -> &Effects {
    match &report.outcome {
        Outcome::Accepted(fx) => fx,
        other => panic!("expected acceptance, got {other:?}"),
    }
}

pub fn rejection(report: &RunReport) -> &Rejection {
    match &report.outcome {
        Outcome::Rejected(r) => r,
        other => panic!("expected rejection, got {other:?}"),
    }
}

pub fn fault(report: &RunReport) -> &Fault {
    match &report.outcome {
        Outcome::Faulted(f) => f,
        other => panic!("expected fault, got {other:?}"),
    }
}

pub fn with_header(mut instrs: Vec<Instr>, version: i64) -> Vec<Instr> {
    instrs.extend(header(version));
    instrs
}
