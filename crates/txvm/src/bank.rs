//! The Stack Bank: every stack one run can address.
//!
//! Opcodes name stacks by [`StackId`]. A [`Protocol`] maps ids to the
//! [`Role`] they play; the legacy (VM1) id set is a second, statically
//! distinct bank type, picked once per run by [`Version`].

use crate::error::Rejection;
use crate::record::{AssetId, NonceRecord, OutputRef};
use crate::stack::{Stack, StackError, TupleStack};
use crate::value::{Tuple, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum StackId {
    Data = 0,
    Alt = 1,
    Input = 2,
    Value = 3,
    Output = 4,
    Cond = 5,
    Nonce = 6,
    Anchor = 7,
    Retirement = 8,
    TxHeader = 9,
    Vm1Input = 10,
    Vm1Value = 11,
    Vm1Mux = 12,
    Vm1Result = 13,
    Vm1Cond = 14,
    Vm1Nonce = 15,
    Vm1Anchor = 16,
    Vm1TxHeader = 17,
}

impl StackId {
    pub const ALL: [StackId; 18] = [
        StackId::Data,
        StackId::Alt,
        StackId::Input,
        StackId::Value,
        StackId::Output,
        StackId::Cond,
        StackId::Nonce,
        StackId::Anchor,
        StackId::Retirement,
        StackId::TxHeader,
        StackId::Vm1Input,
        StackId::Vm1Value,
        StackId::Vm1Mux,
        StackId::Vm1Result,
        StackId::Vm1Cond,
        StackId::Vm1Nonce,
        StackId::Vm1Anchor,
        StackId::Vm1TxHeader,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for StackId {
    type Error = Rejection;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        usize::try_from(n)
            .ok()
            .and_then(|i| StackId::ALL.get(i).copied())
            .ok_or_else(|| Rejection::InvalidRecord(format!("unknown stack id {n}")))
    }
}

/// What a stack is for. Admission rules are attached to roles, not ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Data,
    Alt,
    Input,
    Value,
    Output,
    Cond,
    Nonce,
    Anchor,
    Retirement,
    TxHeader,
    Mux,
}

impl Role {
    /// Scratch roles are writable by plain data opcodes and are private
    /// to each condition scope.
    pub fn is_scratch(self) -> bool {
        matches!(self, Role::Data | Role::Alt | Role::Cond)
    }

    /// Id reported when an opcode reaches for a role the protocol lacks.
    pub fn canonical_id(self) -> StackId {
        match self {
            Role::Data => StackId::Data,
            Role::Alt => StackId::Alt,
            Role::Input => StackId::Input,
            Role::Value => StackId::Value,
            Role::Output => StackId::Output,
            Role::Cond => StackId::Cond,
            Role::Nonce => StackId::Nonce,
            Role::Anchor => StackId::Anchor,
            Role::Retirement => StackId::Retirement,
            Role::TxHeader => StackId::TxHeader,
            Role::Mux => StackId::Vm1Mux,
        }
    }
}

// ── Protocol versions ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    V1 = 1,
    V2 = 2,
}

impl Version {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_i64())
    }
}

/// Static stack layout of one protocol version.
pub trait Protocol: 'static {
    const VERSION: Version;

    /// Role addressed by `id`, or `None` if this protocol has no such stack.
    fn role(id: StackId) -> Option<Role>;

    /// Inverse of [`Protocol::role`].
    fn stack_id(role: Role) -> Option<StackId> {
        StackId::ALL.iter().copied().find(|id| Self::role(*id) == Some(role))
    }

    fn has(role: Role) -> bool {
        Self::stack_id(role).is_some()
    }
}

/// Current protocol: ids 0..=9.
#[derive(Debug)]
pub enum Current {}

/// Prior protocol: Data/Alt plus the VM1 set. No retirement stack.
#[derive(Debug)]
pub enum Legacy {}

impl Protocol for Current {
    const VERSION: Version = Version::V2;

    fn role(id: StackId) -> Option<Role> {
        Some(match id {
            StackId::Data => Role::Data,
            StackId::Alt => Role::Alt,
            StackId::Input => Role::Input,
            StackId::Value => Role::Value,
            StackId::Output => Role::Output,
            StackId::Cond => Role::Cond,
            StackId::Nonce => Role::Nonce,
            StackId::Anchor => Role::Anchor,
            StackId::Retirement => Role::Retirement,
            StackId::TxHeader => Role::TxHeader,
            _ => return None,
        })
    }
}

impl Protocol for Legacy {
    const VERSION: Version = Version::V1;

    fn role(id: StackId) -> Option<Role> {
        Some(match id {
            StackId::Data => Role::Data,
            StackId::Alt => Role::Alt,
            StackId::Vm1Input => Role::Input,
            StackId::Vm1Value => Role::Value,
            StackId::Vm1Mux => Role::Mux,
            StackId::Vm1Result => Role::Output,
            StackId::Vm1Cond => Role::Cond,
            StackId::Vm1Nonce => Role::Nonce,
            StackId::Vm1Anchor => Role::Anchor,
            StackId::Vm1TxHeader => Role::TxHeader,
            _ => return None,
        })
    }
}

// ── Stack handles ───────────────────────────────────────────────

/// Mutable handle on one addressed stack, whatever its element type.
pub enum StackRef<'a> {
    Values(&'a mut Stack),
    Tuples(&'a mut TupleStack),
}

impl StackRef<'_> {
    pub fn len(&self) -> usize {
        match self {
            StackRef::Values(s) => s.len(),
            StackRef::Tuples(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn roll(&mut self, depth: usize) -> Result<(), StackError> {
        match self {
            StackRef::Values(s) => s.roll(depth),
            StackRef::Tuples(s) => s.roll(depth),
        }
    }

    pub fn bury(&mut self, depth: usize) -> Result<(), StackError> {
        match self {
            StackRef::Values(s) => s.bury(depth),
            StackRef::Tuples(s) => s.bury(depth),
        }
    }
}

/// Read-only handle on one addressed stack.
#[derive(Clone, Copy)]
pub enum StackView<'a> {
    Values(&'a Stack),
    Tuples(&'a TupleStack),
}

impl StackView<'_> {
    pub fn len(&self) -> usize {
        match self {
            StackView::Values(s) => s.len(),
            StackView::Tuples(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the element at `depth`, tuples lifted into `Value`.
    pub fn value_at(&self, depth: usize) -> Result<Value, StackError> {
        match self {
            StackView::Values(s) => s.peek_at(depth).cloned(),
            StackView::Tuples(s) => s.peek_at(depth).map(|t| Value::Tuple(t.clone())),
        }
    }
}

// ── Bank ────────────────────────────────────────────────────────

/// Per-scope scratch. The root scope's scratch lives in the bank; each
/// condition invocation gets a fresh one.
#[derive(Debug, Default)]
pub struct Scratch {
    pub data: Stack,
    pub alt: Stack,
    pub cond: TupleStack,
}

impl Scratch {
    pub fn stack(&self, role: Role) -> Option<StackView<'_>> {
        match role {
            Role::Data => Some(StackView::Values(&self.data)),
            Role::Alt => Some(StackView::Values(&self.alt)),
            Role::Cond => Some(StackView::Tuples(&self.cond)),
            _ => None,
        }
    }

    pub fn stack_mut(&mut self, role: Role) -> Option<StackRef<'_>> {
        match role {
            Role::Data => Some(StackRef::Values(&mut self.data)),
            Role::Alt => Some(StackRef::Values(&mut self.alt)),
            Role::Cond => Some(StackRef::Tuples(&mut self.cond)),
            _ => None,
        }
    }

    pub(crate) fn max_len(&self) -> usize {
        self.data.len().max(self.alt.len()).max(self.cond.len())
    }
}

/// Run-level bookkeeping that is not itself a stack.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Journal {
    pub spent: Vec<OutputRef>,
    pub nonces: Vec<NonceRecord>,
    pub issued: BTreeMap<AssetId, u128>,
    pub retired: BTreeMap<AssetId, u128>,
}

/// Record stacks, shared read-only with condition scopes.
#[derive(Debug)]
pub struct Records<P: Protocol> {
    pub input: TupleStack,
    pub value: TupleStack,
    pub output: TupleStack,
    pub nonce: TupleStack,
    pub anchor: TupleStack,
    pub retirement: TupleStack,
    pub header: TupleStack,
    pub mux: TupleStack,
    pub journal: Journal,
    _protocol: PhantomData<P>,
}

impl<P: Protocol> Default for Records<P> {
    fn default() -> Self {
        Self {
            input: TupleStack::new(),
            value: TupleStack::new(),
            output: TupleStack::new(),
            nonce: TupleStack::new(),
            anchor: TupleStack::new(),
            retirement: TupleStack::new(),
            header: TupleStack::new(),
            mux: TupleStack::new(),
            journal: Journal::default(),
            _protocol: PhantomData,
        }
    }
}

impl<P: Protocol> Records<P> {
    /// Record stack for `role`; `None` for scratch roles and for roles
    /// this protocol does not have.
    pub fn get(&self, role: Role) -> Option<&TupleStack> {
        if !P::has(role) {
            return None;
        }
        match role {
            Role::Input => Some(&self.input),
            Role::Value => Some(&self.value),
            Role::Output => Some(&self.output),
            Role::Nonce => Some(&self.nonce),
            Role::Anchor => Some(&self.anchor),
            Role::Retirement => Some(&self.retirement),
            Role::TxHeader => Some(&self.header),
            Role::Mux => Some(&self.mux),
            Role::Data | Role::Alt | Role::Cond => None,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> Option<&mut TupleStack> {
        if !P::has(role) {
            return None;
        }
        match role {
            Role::Input => Some(&mut self.input),
            Role::Value => Some(&mut self.value),
            Role::Output => Some(&mut self.output),
            Role::Nonce => Some(&mut self.nonce),
            Role::Anchor => Some(&mut self.anchor),
            Role::Retirement => Some(&mut self.retirement),
            Role::TxHeader => Some(&mut self.header),
            Role::Mux => Some(&mut self.mux),
            Role::Data | Role::Alt | Role::Cond => None,
        }
    }

    pub(crate) fn max_len(&self) -> usize {
        [
            &self.input,
            &self.value,
            &self.output,
            &self.nonce,
            &self.anchor,
            &self.retirement,
            &self.header,
            &self.mux,
        ]
        .iter()
        .map(|s| s.len())
        .max()
        .unwrap_or(0)
    }
}

/// One execution's entire addressable state. Created fresh per run,
/// owned exclusively by the engine, discarded after effect extraction.
#[derive(Debug)]
pub struct StackBank<P: Protocol> {
    pub scratch: Scratch,
    pub records: Records<P>,
}

impl<P: Protocol> Default for StackBank<P> {
    fn default() -> Self {
        Self { scratch: Scratch::default(), records: Records::default() }
    }
}

impl<P: Protocol> StackBank<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds Input (first element consumed first) and the sole anchor.
    pub fn seeded(inputs: impl IntoIterator<Item = Tuple>, anchor: Tuple) -> Self {
        let mut bank = Self::new();
        let inputs: Vec<Tuple> = inputs.into_iter().collect();
        for input in inputs.into_iter().rev() {
            bank.records.input.push(input);
        }
        bank.records.anchor.push(anchor);
        bank
    }

    pub fn version(&self) -> Version {
        P::VERSION
    }

    /// Stack addressed by `id` under this bank's protocol.
    pub fn stack(&self, id: StackId) -> Option<StackView<'_>> {
        let role = P::role(id)?;
        if role.is_scratch() {
            return self.scratch.stack(role);
        }
        self.records.get(role).map(StackView::Tuples)
    }

    pub fn stack_mut(&mut self, id: StackId) -> Option<StackRef<'_>> {
        let role = P::role(id)?;
        if role.is_scratch() {
            return self.scratch.stack_mut(role);
        }
        self.records.get_mut(role).map(StackRef::Tuples)
    }

    pub fn len(&self, id: StackId) -> Option<usize> {
        self.stack(id).map(|s| s.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: i64) -> Tuple {
        Tuple::new(vec![Value::Int64(n)])
    }

    #[test]
    fn stack_id_codes_round_trip() {
        for id in StackId::ALL {
            assert_eq!(StackId::try_from(id.code() as i64).unwrap(), id);
        }
        assert!(StackId::try_from(18).is_err());
        assert!(StackId::try_from(-1).is_err());
    }

    #[test]
    fn current_protocol_addresses_zero_to_nine() {
        for id in StackId::ALL {
            let addressable = Current::role(id).is_some();
            assert_eq!(addressable, id.code() <= 9, "{id:?}");
        }
        assert!(Current::has(Role::Retirement));
        assert!(!Current::has(Role::Mux));
    }

    #[test]
    fn legacy_protocol_is_isolated() {
        assert_eq!(Legacy::role(StackId::Input), None);
        assert_eq!(Legacy::role(StackId::Vm1Input), Some(Role::Input));
        assert_eq!(Legacy::role(StackId::Vm1Result), Some(Role::Output));
        assert_eq!(Legacy::role(StackId::Data), Some(Role::Data));
        assert!(!Legacy::has(Role::Retirement));
        assert_eq!(Legacy::stack_id(Role::Mux), Some(StackId::Vm1Mux));
    }

    #[test]
    fn seeded_bank_consumes_inputs_left_to_right() {
        let bank: StackBank<Current> = StackBank::seeded(vec![t(1), t(2)], t(99));
        let input = bank.stack(StackId::Input).unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input.value_at(0).unwrap(), Value::Tuple(t(1)));
        assert_eq!(bank.len(StackId::Anchor), Some(1));
        assert_eq!(bank.len(StackId::Vm1Input), None);
    }

    #[test]
    fn legacy_bank_routes_vm1_ids() {
        let mut bank: StackBank<Legacy> = StackBank::seeded(vec![t(1)], t(99));
        assert_eq!(bank.len(StackId::Vm1Input), Some(1));
        assert_eq!(bank.len(StackId::Input), None);
        assert!(bank.stack_mut(StackId::Retirement).is_none());
        assert_eq!(bank.version(), Version::V1);
    }

    #[test]
    fn stack_ref_roll_on_tuples() {
        let mut bank: StackBank<Current> = StackBank::seeded(vec![t(1), t(2), t(3)], t(0));
        let mut input = bank.stack_mut(StackId::Input).unwrap();
        input.roll(2).unwrap();
        let view = bank.stack(StackId::Input).unwrap();
        assert_eq!(view.value_at(0).unwrap(), Value::Tuple(t(3)));
    }
}
