use crate::bank::{
    Current, Journal, Legacy, Protocol, Records, Role, Scratch, StackBank, StackId, StackRef,
    StackView, Version,
};
use crate::config::{EngineConfig, Fuel};
use crate::effects::Effects;
use crate::error::{ExecError, Fault, Rejection, Result};
use crate::opcode::{Instr, Opcode, Program};
use crate::providers::{NonceStatus, StateView, ValueClaim, ValueProofVerifier};
use crate::record::{
    Anchor, AssetId, Condition, InputRecord, NonceRecord, OutputRecord, OutputRef, Quantity,
    TxHeader, ValueItem,
};
use crate::stack::TupleStack;
use crate::value::{Tuple, Value};
use serde::Serialize;
use tracing::{debug, trace, warn};

/// Everything the state layer hands the engine for one run.
#[derive(Debug, Clone)]
pub struct Seed {
    pub version: Version,
    /// Resolved-at-admission references, consumed first to last.
    pub inputs: Vec<OutputRef>,
    /// Transaction-unique identifier; also seeds the sole anchor.
    pub run_id: [u8; 32],
    /// Validation time checked against the header's time bounds.
    pub now: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Initialized,
    Executing,
    Accepted,
    Rejected,
    Faulted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    Accepted(Effects),
    Rejected(Rejection),
    Faulted(Fault),
}

impl Outcome {
    pub fn state(&self) -> RunState {
        match self {
            Outcome::Accepted(_) => RunState::Accepted,
            Outcome::Rejected(_) => RunState::Rejected,
            Outcome::Faulted(_) => RunState::Faulted,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    pub fn effects(&self) -> Option<&Effects> {
        match self {
            Outcome::Accepted(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_effects(self) -> Option<Effects> {
        match self {
            Outcome::Accepted(e) => Some(e),
            _ => None,
        }
    }

    /// Reason code of a non-accepted outcome.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Outcome::Accepted(_) => None,
            Outcome::Rejected(r) => Some(r.code()),
            Outcome::Faulted(f) => Some(f.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub steps: u64,
    pub fuel_used: Fuel,
}

/// Runs `program` on a fresh bank of the layout selected by
/// `seed.version`.
pub fn run<S: StateView, V: ValueProofVerifier>(
    cfg: &EngineConfig,
    seed: Seed,
    program: &Program,
    state: S,
    verifier: V,
) -> RunReport {
    match seed.version {
        Version::V1 => Engine::<Legacy, S, V>::new(cfg.clone(), seed, state, verifier).run(program),
        Version::V2 => Engine::<Current, S, V>::new(cfg.clone(), seed, state, verifier).run(program),
    }
}

// ── Metering ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Meter {
    limit: Fuel,
    fuel_used: Fuel,
    steps: u64,
}

impl Meter {
    fn charge(&mut self, units: Fuel) -> Result<()> {
        let next = self.fuel_used.saturating_add(units);
        if next > self.limit {
            return Err(Fault::FuelExhausted.into());
        }
        self.fuel_used = next;
        Ok(())
    }
}

// ── Scopes ──────────────────────────────────────────────────────

enum Access<'a, P: Protocol> {
    Write(&'a mut Records<P>),
    Read(&'a Records<P>),
}

/// One level of execution: the root program or a condition invocation.
/// Condition scopes get fresh scratch and a read-only view of the
/// parent's record stacks.
struct Scope<'a, P: Protocol> {
    scratch: &'a mut Scratch,
    records: Access<'a, P>,
    depth: usize,
}

fn illegal<P: Protocol>(op: Opcode, role: Role) -> ExecError {
    let stack = P::stack_id(role).unwrap_or(role.canonical_id());
    Rejection::IllegalStackAccess { op, stack }.into()
}

fn illegal_id(op: Opcode, stack: StackId) -> ExecError {
    Rejection::IllegalStackAccess { op, stack }.into()
}

impl<'a, P: Protocol> Scope<'a, P> {
    fn is_read_only(&self) -> bool {
        matches!(self.records, Access::Read(_))
    }

    fn records(&self) -> &Records<P> {
        match &self.records {
            Access::Write(r) => &**r,
            Access::Read(r) => &**r,
        }
    }

    /// Fails unless `role` exists under `P` and this scope may mutate it.
    fn require(&self, op: Opcode, role: Role) -> Result<()> {
        if self.is_read_only() || !P::has(role) {
            return Err(illegal::<P>(op, role));
        }
        Ok(())
    }

    fn rec(&mut self, op: Opcode, role: Role) -> Result<&mut TupleStack> {
        match &mut self.records {
            Access::Write(r) => r.get_mut(role).ok_or_else(|| illegal::<P>(op, role)),
            Access::Read(_) => Err(illegal::<P>(op, role)),
        }
    }

    fn journal(&mut self, op: Opcode) -> Result<&mut Journal> {
        match &mut self.records {
            Access::Write(r) => Ok(&mut r.journal),
            Access::Read(_) => Err(illegal::<P>(op, Role::Value)),
        }
    }

    /// Stack introspection may read. Value and Mux admit only `Len`.
    fn view(&self, op: Opcode, id: StackId) -> Result<StackView<'_>> {
        let role = P::role(id).ok_or_else(|| illegal_id(op, id))?;
        if holds_value(role) && op != Opcode::Len {
            return Err(illegal_id(op, id));
        }
        let view = if role.is_scratch() {
            self.scratch.stack(role)
        } else {
            self.records().get(role).map(StackView::Tuples)
        };
        view.ok_or_else(|| illegal_id(op, id))
    }

    /// Stack that roll/bury may permute. The header is set once and
    /// never rearranged, live value moves only through value-class
    /// opcodes, and a condition scope may only permute its own scratch.
    fn reorderable(&mut self, op: Opcode, id: StackId) -> Result<StackRef<'_>> {
        let role = P::role(id).ok_or_else(|| illegal_id(op, id))?;
        if role == Role::TxHeader || holds_value(role) {
            return Err(illegal_id(op, id));
        }
        if role.is_scratch() {
            return self.scratch.stack_mut(role).ok_or_else(|| illegal_id(op, id));
        }
        match &mut self.records {
            Access::Write(r) => r.get_mut(role).map(StackRef::Tuples).ok_or_else(|| illegal_id(op, id)),
            Access::Read(_) => Err(illegal_id(op, id)),
        }
    }

    fn max_len(&self) -> usize {
        self.scratch.max_len().max(self.records().max_len())
    }
}

fn holds_value(role: Role) -> bool {
    matches!(role, Role::Value | Role::Mux)
}

/// Record stack each value-class opcode writes first; named in the
/// rejection when a condition scope tries one.
fn primary_role(op: Opcode) -> Role {
    match op {
        Opcode::Spend => Role::Input,
        Opcode::Retire => Role::Retirement,
        Opcode::Output => Role::Output,
        Opcode::SplitAnchor => Role::Anchor,
        Opcode::Nonce => Role::Nonce,
        Opcode::Header => Role::TxHeader,
        Opcode::Mux | Opcode::Demux => Role::Mux,
        _ => Role::Value,
    }
}

// ── Engine ──────────────────────────────────────────────────────

/// One transaction-validation attempt. Owns its bank exclusively;
/// nothing is shared with other runs.
pub struct Engine<P: Protocol, S: StateView, V: ValueProofVerifier> {
    cfg: EngineConfig,
    view: S,
    verifier: V,
    bank: StackBank<P>,
    run_id: [u8; 32],
    now: i64,
    meter: Meter,
    state: RunState,
}

impl<P: Protocol, S: StateView, V: ValueProofVerifier> Engine<P, S, V> {
    /// The bank layout is fixed by `P`; see [`run`] for dispatch on
    /// `seed.version`.
    pub fn new(cfg: EngineConfig, seed: Seed, view: S, verifier: V) -> Self {
        let inputs = seed.inputs.iter().map(|r| InputRecord { output: *r }.to_tuple());
        let anchor = Anchor::seed(seed.run_id.to_vec()).to_tuple();
        let meter = Meter { limit: cfg.fuel_limit, ..Meter::default() };
        Self {
            cfg,
            view,
            verifier,
            bank: StackBank::seeded(inputs, anchor),
            run_id: seed.run_id,
            now: seed.now,
            meter,
            state: RunState::Initialized,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn bank(&self) -> &StackBank<P> {
        &self.bank
    }

    /// Executes to a terminal outcome. The bank is consumed by effect
    /// extraction; nothing is surfaced from a non-accepted run.
    pub fn run(mut self, program: &Program) -> RunReport {
        self.state = RunState::Executing;
        let version = P::VERSION;
        debug!(
            %version,
            run_id = %hex::encode(self.run_id),
            instrs = program.len(),
            "run start"
        );

        let result = self.execute(program).and_then(|()| finalize(&self.bank));
        let outcome = match result {
            Ok(()) => match Effects::extract(self.bank) {
                Ok(effects) => Outcome::Accepted(effects),
                Err(r) => Outcome::Rejected(r),
            },
            Err(ExecError::Rejected(r)) => Outcome::Rejected(r),
            Err(ExecError::Faulted(f)) => Outcome::Faulted(f),
        };
        self.state = outcome.state();

        match &outcome {
            Outcome::Accepted(e) => debug!(outputs = e.outputs.len(), steps = self.meter.steps, "run accepted"),
            Outcome::Rejected(r) => debug!(code = r.code(), reason = %r, "run rejected"),
            Outcome::Faulted(f) => warn!(code = f.code(), reason = %f, "run faulted"),
        }

        RunReport { outcome, steps: self.meter.steps, fuel_used: self.meter.fuel_used }
    }

    fn execute(&mut self, program: &Program) -> Result<()> {
        let StackBank { scratch, records } = &mut self.bank;
        let mut scope = Scope { scratch, records: Access::Write(records), depth: 0 };
        let mut machine = Machine {
            cfg: &self.cfg,
            view: &self.view,
            verifier: &self.verifier,
            meter: &mut self.meter,
            run_id: &self.run_id,
            now: self.now,
        };
        machine.exec(&mut scope, program)
    }
}

/// Accepted iff nothing is left pending and exactly one header was set.
fn finalize<P: Protocol>(bank: &StackBank<P>) -> Result<()> {
    let r = &bank.records;
    let pending = [
        (Role::Input, r.input.len()),
        (Role::Value, r.value.len()),
        (Role::Mux, r.mux.len()),
        (Role::Cond, bank.scratch.cond.len()),
        (Role::Nonce, r.nonce.len()),
    ];
    for (role, len) in pending {
        if len > 0 {
            return Err(Rejection::UnbalancedRun { role, len }.into());
        }
    }
    if r.header.len() != 1 {
        return Err(Rejection::UnbalancedRun { role: Role::TxHeader, len: r.header.len() }.into());
    }
    Ok(())
}

// ── Machine ─────────────────────────────────────────────────────

struct Machine<'m, S, V> {
    cfg: &'m EngineConfig,
    view: &'m S,
    verifier: &'m V,
    meter: &'m mut Meter,
    run_id: &'m [u8; 32],
    now: i64,
}

impl<S: StateView, V: ValueProofVerifier> Machine<'_, S, V> {
    /// Admits a value a program pushes or builds: bounds its nesting and
    /// size, and charges for the bytes it spans.
    fn admit(&mut self, v: &Value) -> Result<()> {
        let limit = self.cfg.max_value_depth;
        let fp = v.footprint(limit).ok_or(Fault::ValueTooDeep { limit })?;
        if fp.size > self.cfg.max_value_size {
            return Err(Fault::ValueTooLarge { limit: self.cfg.max_value_size }.into());
        }
        self.meter.charge(EngineConfig::byte_fuel(fp.size))
    }

    /// Charges for copying, hashing or comparing `v`.
    fn touch(&mut self, v: &Value) -> Result<()> {
        let size = v.footprint(usize::MAX).map_or(0, |fp| fp.size);
        self.meter.charge(EngineConfig::byte_fuel(size))
    }

    /// Decodes a quoted program, charging for the copy.
    fn decode(&mut self, quoted: &Tuple) -> Result<Program> {
        let size = quoted.footprint(usize::MAX).map_or(0, |fp| fp.size);
        self.meter.charge(EngineConfig::byte_fuel(size))?;
        Ok(Program::from_tuple(quoted)?)
    }

    fn exec<P: Protocol>(&mut self, scope: &mut Scope<'_, P>, program: &Program) -> Result<()> {
        for ins in program {
            self.meter.charge(1)?;
            self.meter.steps += 1;
            trace!(depth = scope.depth, op = ?ins.opcode(), "step");
            self.step(scope, ins)?;
            if scope.max_len() > self.cfg.max_stack_len {
                return Err(Fault::StackOverflow { limit: self.cfg.max_stack_len }.into());
            }
        }
        Ok(())
    }

    fn step<P: Protocol>(&mut self, scope: &mut Scope<'_, P>, ins: &Instr) -> Result<()> {
        let op = ins.opcode();
        if op.is_value_class() && scope.is_read_only() {
            return Err(illegal::<P>(op, primary_role(op)));
        }
        match ins {
            // ── scratch ──
            Instr::Push(v) => {
                self.admit(v)?;
                scope.scratch.data.push(v.clone());
            }
            Instr::Drop => {
                scope.scratch.data.pop()?;
            }
            Instr::Dup => {
                self.touch(scope.scratch.data.peek()?)?;
                let v = scope.scratch.data.peek()?.clone();
                scope.scratch.data.push(v);
            }
            Instr::ToAlt => {
                let v = scope.scratch.data.pop()?;
                scope.scratch.alt.push(v);
            }
            Instr::FromAlt => {
                let v = scope.scratch.alt.pop()?;
                scope.scratch.data.push(v);
            }

            // ── reordering and introspection ──
            Instr::Roll { stack, depth } => scope.reorderable(op, *stack)?.roll(*depth)?,
            Instr::Bury { stack, depth } => scope.reorderable(op, *stack)?.bury(*depth)?,
            Instr::Inspect { stack, depth } => {
                let v = scope.view(op, *stack)?.value_at(*depth)?;
                self.touch(&v)?;
                scope.scratch.data.push(v);
            }
            Instr::Len { stack } => {
                let n = scope.view(op, *stack)?.len();
                scope.scratch.data.push_int64(n as i64);
            }

            // ── computation ──
            Instr::Add | Instr::Sub => {
                let data = &mut scope.scratch.data;
                let b = data.pop_int64()?;
                let a = data.pop_int64()?;
                let r = if op == Opcode::Add { a.checked_add(b) } else { a.checked_sub(b) };
                data.push_int64(r.ok_or(Rejection::IntegerOverflow(op))?);
            }
            Instr::Eq => {
                let b = scope.scratch.data.pop()?;
                let a = scope.scratch.data.pop()?;
                self.touch(&a)?;
                self.touch(&b)?;
                scope.scratch.data.push_int64((a == b) as i64);
            }
            Instr::Verify => {
                if scope.scratch.data.pop_int64()? == 0 {
                    return Err(Rejection::VerifyFailed.into());
                }
            }
            Instr::MakeTuple(n) => {
                let fields = scope.scratch.data.pop_n(*n)?;
                let v = Value::Tuple(Tuple::new(fields));
                self.admit(&v)?;
                scope.scratch.data.push(v);
            }
            Instr::Untuple => {
                let data = &mut scope.scratch.data;
                let t = data.pop_tuple()?;
                let n = t.len();
                for field in t.into_fields() {
                    data.push(field);
                }
                data.push_int64(n as i64);
            }
            Instr::Field(i) => {
                let t = scope.scratch.data.pop_tuple()?;
                let v = t.get(*i).ok_or_else(|| {
                    Rejection::InvalidRecord(format!("field {i} of {}-tuple", t.len()))
                })?;
                self.touch(v)?;
                scope.scratch.data.push(v.clone());
            }
            Instr::Hash => {
                let v = scope.scratch.data.pop()?;
                self.touch(&v)?;
                scope.scratch.data.push_bytes(v.digest().to_vec());
            }
            Instr::CheckSig => {
                let data = &mut scope.scratch.data;
                let sig = data.pop_bytes()?;
                let pubkey = data.pop_bytes()?;
                let msg = data.pop_bytes()?;
                self.meter.charge(EngineConfig::byte_fuel(msg.len()))?;
                let ok = check_sig(&msg, &pubkey, &sig)?;
                data.push_int64(ok as i64);
            }
            Instr::RunId => scope.scratch.data.push_bytes(self.run_id.to_vec()),

            // ── conditions ──
            Instr::Defer => {
                let program = scope.scratch.data.pop_tuple()?;
                self.decode(&program)?;
                scope.scratch.cond.push(Condition { program }.to_tuple());
            }
            Instr::Satisfy { args } => self.satisfy(scope, *args)?,

            // ── value class ──
            Instr::Spend => self.spend(scope)?,
            Instr::Issue => {
                let amount = scope.scratch.data.pop_int64()?;
                let program = scope.scratch.data.pop_tuple()?;
                self.decode(&program)?;
                let anchor = Anchor::from_tuple(&scope.rec(op, Role::Anchor)?.pop()?)?;
                let asset = AssetId::from_issuance_program(&program);
                let item = ValueItem::clear(asset, amount, anchor)?;
                scope.rec(op, Role::Value)?.push(item.to_tuple());
                scope.scratch.cond.push(Condition { program }.to_tuple());
                *scope.journal(op)?.issued.entry(asset).or_insert(0) += amount as u128;
            }
            Instr::Split => {
                let amount = scope.scratch.data.pop_int64()?;
                let item = pop_item(scope, op, Role::Value)?;
                let (asset, total) = item.as_clear()?;
                if amount < 0 || amount > total {
                    return Err(Rejection::InvalidAmount(amount).into());
                }
                let (left, right) = item.anchor.split();
                let values = scope.rec(op, Role::Value)?;
                values.push(ValueItem::clear(asset, total - amount, right)?.to_tuple());
                values.push(ValueItem::clear(asset, amount, left)?.to_tuple());
            }
            Instr::Merge => {
                let b = pop_item(scope, op, Role::Value)?;
                let a = pop_item(scope, op, Role::Value)?;
                let (asset, sum) = combine(op, &a, &b)?;
                let merged = ValueItem::clear(asset, sum, a.anchor)?;
                scope.rec(op, Role::Value)?.push(merged.to_tuple());
            }
            Instr::Retire => {
                scope.require(op, Role::Retirement)?;
                let item = pop_item(scope, op, Role::Value)?;
                let (asset, amount) = item.as_clear()?;
                scope.rec(op, Role::Retirement)?.push(item.to_tuple());
                *scope.journal(op)?.retired.entry(asset).or_insert(0) += amount as u128;
            }
            Instr::Output => {
                scope.require(op, Role::Output)?;
                let condition = scope.scratch.data.pop_tuple()?;
                self.decode(&condition)?;
                let item = pop_item(scope, op, Role::Value)?;
                item.as_clear()?;
                let record = OutputRecord::new(item, condition);
                scope.rec(op, Role::Output)?.push(record.to_tuple());
            }
            Instr::Reveal => self.reveal(scope)?,
            Instr::SplitAnchor => {
                let anchors = scope.rec(op, Role::Anchor)?;
                let parent = Anchor::from_tuple(&anchors.pop()?)?;
                let (left, right) = parent.split();
                anchors.push(right.to_tuple());
                anchors.push(left.to_tuple());
            }
            Instr::Nonce => self.nonce(scope)?,
            Instr::Header => self.header(scope)?,
            Instr::Mux(n) => {
                scope.require(op, Role::Mux)?;
                if *n == 0 {
                    return Err(Rejection::InvalidRecord("mux of zero items".into()).into());
                }
                let items = scope
                    .rec(op, Role::Value)?
                    .pop_n(*n)?
                    .iter()
                    .map(ValueItem::from_tuple)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let mut acc = items[0].clone();
                for item in &items[1..] {
                    let (asset, sum) = combine(op, &acc, item)?;
                    acc = ValueItem::clear(asset, sum, acc.anchor)?;
                }
                acc.as_clear()?;
                scope.rec(op, Role::Mux)?.push(acc.to_tuple());
            }
            Instr::Demux => {
                let item = scope.rec(op, Role::Mux)?.pop()?;
                scope.rec(op, Role::Value)?.push(item);
            }
        }
        Ok(())
    }

    fn satisfy<P: Protocol>(&mut self, scope: &mut Scope<'_, P>, args: usize) -> Result<()> {
        let cond = Condition::from_tuple(&scope.scratch.cond.pop()?)?;
        self.meter.charge(args as Fuel)?;
        let moved = scope.scratch.data.pop_n(args)?;

        let depth = scope.depth + 1;
        if depth > self.cfg.max_condition_depth {
            return Err(Fault::RecursionLimitExceeded { limit: self.cfg.max_condition_depth }.into());
        }
        let program = match self.decode(&cond.program) {
            Ok(p) => p,
            Err(ExecError::Rejected(r)) => return Err(unsatisfied(r)),
            Err(fault) => return Err(fault),
        };
        debug!(depth, args, instrs = program.len(), "condition");

        let mut child_scratch = Scratch::default();
        for v in moved {
            child_scratch.data.push(v);
        }
        let mut child = Scope { scratch: &mut child_scratch, records: Access::Read(scope.records()), depth };
        match self.exec(&mut child, &program) {
            Ok(()) => {}
            Err(ExecError::Rejected(r)) => return Err(unsatisfied(r)),
            Err(fault) => return Err(fault),
        }

        if !child_scratch.cond.is_empty() {
            return Err(unsatisfied_reason("conditions left pending"));
        }
        match child_scratch.data.peek() {
            Ok(v) if v.is_truthy() => Ok(()),
            _ => Err(unsatisfied_reason("no success value on data stack")),
        }
    }

    fn spend<P: Protocol>(&mut self, scope: &mut Scope<'_, P>) -> Result<()> {
        let op = Opcode::Spend;
        let input = InputRecord::from_tuple(&scope.rec(op, Role::Input)?.pop()?)?;
        if scope.journal(op)?.spent.contains(&input.output) {
            return Err(Rejection::DuplicateSpend(input.output).into());
        }
        let prev = self
            .view
            .resolve_prevout(&input.output)
            .ok_or(Rejection::PrevoutNotFound)?;
        if prev.id() != input.output {
            return Err(Rejection::InvalidRecord("prevout does not match its reference".into()).into());
        }
        let item = ValueItem { quantity: prev.value.quantity, anchor: Anchor::seed(input.output.0.to_vec()) };
        scope.rec(op, Role::Value)?.push(item.to_tuple());
        scope.scratch.cond.push(Condition { program: prev.condition }.to_tuple());
        scope.journal(op)?.spent.push(input.output);
        Ok(())
    }

    fn reveal<P: Protocol>(&mut self, scope: &mut Scope<'_, P>) -> Result<()> {
        let op = Opcode::Reveal;
        let data = &mut scope.scratch.data;
        let proof = data.pop_bytes()?;
        let amount = data.pop_int64()?;
        let asset = AssetId::from_slice(&data.pop_bytes()?)?;
        if amount < 0 {
            return Err(Rejection::InvalidAmount(amount).into());
        }
        let item = pop_item(scope, op, Role::Value)?;
        let Quantity::Confidential { asset_commitment, value_commitment } = &item.quantity else {
            return Err(Rejection::InvalidRecord("reveal of a clear value".into()).into());
        };
        let context = item.anchor.digest();
        let claim = ValueClaim {
            asset: &asset,
            amount,
            asset_commitment,
            value_commitment,
            proof: &proof,
            context: &context,
        };
        if !self.verifier.verify_value_proof(&claim) {
            return Err(Rejection::InvalidProof.into());
        }
        let clear = ValueItem::clear(asset, amount, item.anchor.clone())?;
        scope.rec(op, Role::Value)?.push(clear.to_tuple());
        Ok(())
    }

    fn nonce<P: Protocol>(&mut self, scope: &mut Scope<'_, P>) -> Result<()> {
        let op = Opcode::Nonce;
        let expiry = scope.scratch.data.pop_int64()?;
        let token = scope.scratch.data.pop_bytes()?;

        let pending = scope.rec(op, Role::Nonce)?;
        let mut seen = false;
        for t in pending.iter() {
            if NonceRecord::from_tuple(t)?.token == token {
                seen = true;
            }
        }
        seen |= scope.journal(op)?.nonces.iter().any(|n| n.token == token);
        if seen || self.view.check_nonce(&token, expiry) == NonceStatus::Conflict {
            return Err(Rejection::NonceConflict.into());
        }
        scope.rec(op, Role::Nonce)?.push(NonceRecord { token, expiry }.to_tuple());
        Ok(())
    }

    fn header<P: Protocol>(&mut self, scope: &mut Scope<'_, P>) -> Result<()> {
        let op = Opcode::Header;
        if !scope.rec(op, Role::TxHeader)?.is_empty() {
            return Err(Rejection::DuplicateHeader.into());
        }
        let t = scope.scratch.data.pop_tuple()?;
        let field = |i: usize| {
            t.get(i).and_then(Value::as_int64).ok_or_else(|| {
                Rejection::InvalidRecord(format!("header field {i} must be int64"))
            })
        };
        if t.len() != 3 {
            return Err(Rejection::InvalidRecord("header takes (version, min_time, max_time)".into()).into());
        }
        let (version, min_time, max_time) = (field(0)?, field(1)?, field(2)?);
        if version != P::VERSION.as_i64() {
            return Err(Rejection::InvalidRecord(format!(
                "header version {version} under protocol {}",
                P::VERSION
            ))
            .into());
        }
        if min_time > max_time || self.now < min_time || self.now > max_time {
            return Err(Rejection::HeaderTimeBounds { min_time, max_time, now: self.now }.into());
        }

        let nonces = scope
            .rec(op, Role::Nonce)?
            .drain()
            .map(|t| NonceRecord::from_tuple(&t))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if let Some(n) = nonces.iter().find(|n| n.expiry < max_time) {
            return Err(Rejection::NonceWindow { expiry: n.expiry, max_time }.into());
        }
        scope.journal(op)?.nonces.extend(nonces);

        let header = TxHeader { version, min_time, max_time, run_id: *self.run_id };
        scope.rec(op, Role::TxHeader)?.push(header.to_tuple());
        Ok(())
    }
}

fn pop_item<P: Protocol>(scope: &mut Scope<'_, P>, op: Opcode, role: Role) -> Result<ValueItem> {
    let t = scope.rec(op, role)?.pop()?;
    Ok(ValueItem::from_tuple(&t)?)
}

/// Same-asset sum of two clear items.
fn combine(op: Opcode, a: &ValueItem, b: &ValueItem) -> Result<(AssetId, i64)> {
    let (asset_a, amount_a) = a.as_clear()?;
    let (asset_b, amount_b) = b.as_clear()?;
    if asset_a != asset_b {
        return Err(Rejection::AssetMismatch.into());
    }
    let sum = amount_a.checked_add(amount_b).ok_or(Rejection::IntegerOverflow(op))?;
    Ok((asset_a, sum))
}

fn check_sig(msg: &[u8], pubkey: &[u8], sig: &[u8]) -> Result<bool> {
    use ed25519_dalek::{Signature, VerifyingKey};
    let key: [u8; 32] = pubkey.try_into().map_err(|_| Rejection::BadSignature)?;
    let key = VerifyingKey::from_bytes(&key).map_err(|_| Rejection::BadSignature)?;
    let sig = Signature::from_slice(sig).map_err(|_| Rejection::BadSignature)?;
    Ok(key.verify_strict(msg, &sig).is_ok())
}

fn unsatisfied(r: Rejection) -> ExecError {
    Rejection::UnsatisfiedCondition { reason: r.to_string() }.into()
}

fn unsatisfied_reason(reason: &str) -> ExecError {
    Rejection::UnsatisfiedCondition { reason: reason.into() }.into()
}
