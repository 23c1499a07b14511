//! In-memory unspent-output set with nonce history and issuance totals.
//!
//! Validation runs against a read snapshot; application takes the write
//! lock, re-checks what the run relied on and then commits every effect
//! or none.

use crate::error::{LedgerError, Result};
use crate::tx::{Transaction, TxId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use txvm::{
    AssetId, Effects, EngineConfig, NoConfidential, NonceStatus, Outcome, OutputRecord, OutputRef,
    StateView, ValueProofVerifier,
};

pub type TxCallback = Arc<dyn Fn(&TxId, &Effects) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Applied(Effects),
    /// The transaction was applied before; nothing changed.
    AlreadyApplied,
}

#[derive(Default)]
struct State {
    utxos: HashMap<OutputRef, OutputRecord>,
    spent: HashSet<OutputRef>,
    /// Committed nonce token → expiry.
    nonces: HashMap<Vec<u8>, i64>,
    issued: HashMap<AssetId, u128>,
    retired: HashMap<AssetId, u128>,
    applied: HashSet<TxId>,
}

impl StateView for State {
    fn resolve_prevout(&self, output: &OutputRef) -> Option<OutputRecord> {
        self.utxos.get(output).cloned()
    }

    /// A committed token conflicts until [`Ledger::prune_nonces`] drops
    /// it, whatever expiry the new claim carries. The stored expiry only
    /// decides when pruning may forget it.
    fn check_nonce(&self, token: &[u8], _expiry: i64) -> NonceStatus {
        if self.nonces.contains_key(token) {
            NonceStatus::Conflict
        } else {
            NonceStatus::Fresh
        }
    }
}

impl State {
    fn apply(&mut self, id: TxId, fx: &Effects) -> Result<bool> {
        if self.applied.contains(&id) {
            return Ok(false);
        }
        let mut seen = HashSet::with_capacity(fx.spent.len());
        for r in &fx.spent {
            if !seen.insert(r) {
                return Err(LedgerError::Conflict(format!("output {r} spent twice")));
            }
            if !self.utxos.contains_key(r) {
                return Err(LedgerError::Conflict(format!("output {r} is no longer unspent")));
            }
        }
        for n in &fx.nonces {
            if self.nonces.contains_key(&n.token) {
                return Err(LedgerError::Conflict(format!("nonce {} already committed", hex::encode(&n.token))));
            }
        }
        for out in &fx.outputs {
            if self.utxos.contains_key(&out.id) || self.spent.contains(&out.id) {
                return Err(LedgerError::Conflict(format!("output {} already exists", out.id)));
            }
        }

        for r in &fx.spent {
            self.utxos.remove(r);
            self.spent.insert(*r);
        }
        for out in &fx.outputs {
            self.utxos.insert(out.id, out.record.clone());
        }
        for n in &fx.nonces {
            self.nonces.insert(n.token.clone(), n.expiry);
        }
        for (asset, amount) in &fx.issued {
            *self.issued.entry(*asset).or_insert(0) += amount;
        }
        for (asset, amount) in &fx.retired {
            *self.retired.entry(*asset).or_insert(0) += amount;
        }
        self.applied.insert(id);
        Ok(true)
    }
}

/// Consistent read view for one validation run.
pub struct Snapshot<'a> {
    state: RwLockReadGuard<'a, State>,
}

impl StateView for Snapshot<'_> {
    fn resolve_prevout(&self, output: &OutputRef) -> Option<OutputRecord> {
        self.state.resolve_prevout(output)
    }

    fn check_nonce(&self, token: &[u8], expiry: i64) -> NonceStatus {
        self.state.check_nonce(token, expiry)
    }
}

/// Shared handle; clones see the same state.
#[derive(Clone)]
pub struct Ledger {
    state: Arc<RwLock<State>>,
    callbacks: Arc<RwLock<Vec<TxCallback>>>,
    verifier: Arc<dyn ValueProofVerifier + Send + Sync>,
    cfg: EngineConfig,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Ledger {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            callbacks: Arc::new(RwLock::new(Vec::new())),
            verifier: Arc::new(NoConfidential),
            cfg,
        }
    }

    /// Engine limits from the process environment.
    pub fn from_env() -> Self {
        Self::new(EngineConfig::global().clone())
    }

    pub fn with_verifier(mut self, verifier: impl ValueProofVerifier + Send + Sync + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Registers a callback fired once per newly applied transaction,
    /// after the write lock is released.
    pub fn on_tx(&self, cb: impl Fn(&TxId, &Effects) + Send + Sync + 'static) -> Result<()> {
        self.callbacks.write()?.push(Arc::new(cb));
        Ok(())
    }

    /// Seeds an output directly, bypassing validation.
    pub fn insert_output(&self, record: OutputRecord) -> Result<OutputRef> {
        let id = record.id();
        self.state.write()?.utxos.insert(id, record);
        Ok(id)
    }

    pub fn output(&self, id: &OutputRef) -> Result<OutputRecord> {
        self.state.read()?.utxos.get(id).cloned().ok_or(LedgerError::UnknownOutput(*id))
    }

    pub fn is_spent(&self, id: &OutputRef) -> Result<bool> {
        Ok(self.state.read()?.spent.contains(id))
    }

    pub fn is_applied(&self, id: &TxId) -> Result<bool> {
        Ok(self.state.read()?.applied.contains(id))
    }

    pub fn unspent_count(&self) -> Result<usize> {
        Ok(self.state.read()?.utxos.len())
    }

    pub fn nonce_count(&self) -> Result<usize> {
        Ok(self.state.read()?.nonces.len())
    }

    /// Total ever issued of `asset`.
    pub fn issued(&self, asset: &AssetId) -> Result<u128> {
        Ok(self.state.read()?.issued.get(asset).copied().unwrap_or(0))
    }

    pub fn retired(&self, asset: &AssetId) -> Result<u128> {
        Ok(self.state.read()?.retired.get(asset).copied().unwrap_or(0))
    }

    /// Forgets nonces that expired before `now`; returns how many.
    pub fn prune_nonces(&self, now: i64) -> Result<usize> {
        let mut state = self.state.write()?;
        let before = state.nonces.len();
        state.nonces.retain(|_, expiry| *expiry >= now);
        Ok(before - state.nonces.len())
    }

    pub fn snapshot(&self) -> Result<Snapshot<'_>> {
        Ok(Snapshot { state: self.state.read()? })
    }

    /// Runs `tx` against a snapshot without applying anything.
    pub fn validate(&self, tx: &Transaction, now: i64) -> Result<Effects> {
        let id = tx.id();
        let report = {
            let snapshot = self.snapshot()?;
            txvm::run(&self.cfg, tx.seed(now), &tx.program, &snapshot, &*self.verifier)
        };
        match report.outcome {
            Outcome::Accepted(fx) => Ok(fx),
            Outcome::Rejected(r) => {
                debug!(tx = %id, code = r.code(), reason = %r, "tx rejected");
                Err(LedgerError::Rejected(r))
            }
            Outcome::Faulted(f) => {
                warn!(tx = %id, code = f.code(), reason = %f, "tx faulted");
                Err(LedgerError::Faulted(f))
            }
        }
    }

    /// Commits validated effects all-or-nothing. Returns `false` if `id`
    /// was already applied.
    pub fn apply_effects(&self, id: TxId, fx: &Effects) -> Result<bool> {
        let applied = self.state.write()?.apply(id, fx)?;
        if applied {
            let callbacks = self.callbacks.read()?.clone();
            for cb in &callbacks {
                cb(&id, fx);
            }
        }
        Ok(applied)
    }

    /// Validates and applies `tx`. Adding the same transaction again is
    /// a no-op.
    pub fn add_tx(&self, tx: &Transaction, now: i64) -> Result<AddOutcome> {
        let id = tx.id();
        if self.is_applied(&id)? {
            debug!(tx = %id, "tx already applied");
            return Ok(AddOutcome::AlreadyApplied);
        }
        let fx = self.validate(tx, now)?;
        if !self.apply_effects(id, &fx)? {
            return Ok(AddOutcome::AlreadyApplied);
        }
        info!(
            tx = %id,
            spent = fx.spent.len(),
            outputs = fx.outputs.len(),
            nonces = fx.nonces.len(),
            "tx applied"
        );
        Ok(AddOutcome::Applied(fx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txvm::{Anchor, Instr, Program, Value, ValueItem, Version};

    fn owner(tag: i64) -> Program {
        Program::new(vec![Instr::Push(Value::Int64(tag))])
    }

    fn genesis(ledger: &Ledger, amount: i64) -> OutputRef {
        let item = ValueItem::clear(AssetId([5; 32]), amount, Anchor::seed(b"genesis".to_vec())).unwrap();
        ledger.insert_output(OutputRecord::new(item, owner(1).to_tuple())).unwrap()
    }

    fn transfer(input: OutputRef, to: i64) -> Transaction {
        Transaction::new(
            Version::V2,
            vec![input],
            Program::new(vec![
                Instr::Spend,
                Instr::Satisfy { args: 0 },
                Instr::Push(owner(to).to_value()),
                Instr::Output,
                Instr::Push(Value::Int64(2)),
                Instr::Push(Value::Int64(0)),
                Instr::Push(Value::Int64(100)),
                Instr::MakeTuple(3),
                Instr::Header,
            ]),
        )
    }

    // ── Apply ───────────────────────────────────────────────────

    #[test]
    fn apply_moves_outputs() {
        let ledger = Ledger::default();
        let prev = genesis(&ledger, 10);
        let tx = transfer(prev, 2);
        let AddOutcome::Applied(fx) = ledger.add_tx(&tx, 50).unwrap() else {
            panic!("expected applied");
        };
        assert!(ledger.is_spent(&prev).unwrap());
        assert_eq!(ledger.output(&prev), Err(LedgerError::UnknownOutput(prev)));
        let created = fx.outputs[0].id;
        assert_eq!(ledger.output(&created).unwrap().condition, owner(2).to_tuple());
        assert_eq!(fx.run_id(), tx.id().0);
    }

    #[test]
    fn conflicting_effects_apply_nothing() {
        let ledger = Ledger::default();
        let prev = genesis(&ledger, 10);
        let a = transfer(prev, 2);
        let b = transfer(prev, 3);
        let fx_a = ledger.validate(&a, 50).unwrap();
        let fx_b = ledger.validate(&b, 50).unwrap();

        assert!(ledger.apply_effects(a.id(), &fx_a).unwrap());
        let count = ledger.unspent_count().unwrap();
        assert!(matches!(ledger.apply_effects(b.id(), &fx_b), Err(LedgerError::Conflict(_))));
        assert_eq!(ledger.unspent_count().unwrap(), count);
        assert!(!ledger.is_applied(&b.id()).unwrap());
    }

    #[test]
    fn effects_spending_one_output_twice_apply_nothing() {
        let ledger = Ledger::default();
        let prev = genesis(&ledger, 10);
        let tx = transfer(prev, 2);
        let mut fx = ledger.validate(&tx, 50).unwrap();
        fx.spent.push(prev);

        assert!(matches!(ledger.apply_effects(tx.id(), &fx), Err(LedgerError::Conflict(_))));
        assert!(!ledger.is_spent(&prev).unwrap());
        assert_eq!(ledger.unspent_count().unwrap(), 1);
    }

    #[test]
    fn reapplying_same_id_is_noop() {
        let ledger = Ledger::default();
        let prev = genesis(&ledger, 10);
        let tx = transfer(prev, 2);
        let fx = ledger.validate(&tx, 50).unwrap();
        assert!(ledger.apply_effects(tx.id(), &fx).unwrap());
        assert!(!ledger.apply_effects(tx.id(), &fx).unwrap());
    }

    // ── Nonces ──────────────────────────────────────────────────

    #[test]
    fn prune_drops_expired_only() {
        let ledger = Ledger::default();
        {
            let mut state = ledger.state.write().unwrap();
            state.nonces.insert(b"old".to_vec(), 10);
            state.nonces.insert(b"new".to_vec(), 100);
        }
        assert_eq!(ledger.prune_nonces(50).unwrap(), 1);
        assert_eq!(ledger.nonce_count().unwrap(), 1);
        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(snapshot.check_nonce(b"new", 200), NonceStatus::Conflict);
        assert_eq!(snapshot.check_nonce(b"old", 200), NonceStatus::Fresh);
    }

    #[test]
    fn committed_nonce_conflicts_for_any_claimed_expiry() {
        let ledger = Ledger::default();
        ledger.state.write().unwrap().nonces.insert(b"n".to_vec(), 100);
        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(snapshot.check_nonce(b"n", 50), NonceStatus::Conflict);
        assert_eq!(snapshot.check_nonce(b"n", 1_000), NonceStatus::Conflict);
    }

    #[test]
    fn error_codes() {
        assert_eq!(LedgerError::Poisoned.code(), "poisoned");
        assert_eq!(LedgerError::Rejected(txvm::Rejection::NonceConflict).code(), "nonce_conflict");
    }
}
