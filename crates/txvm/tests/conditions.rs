mod common;

use common::*;
use ed25519_dalek::{Signer, SigningKey};
use txvm::*;

fn spend_guarded_by(condition: &Program, args: Vec<Instr>, nargs: usize) -> (MemState, OutputRef, Vec<Instr>) {
    let mut state = MemState::default();
    let prev_id = state.add(clear_output(asset_x(), 10, condition, b"genesis"));
    let mut prog = vec![Instr::Spend];
    prog.extend(args);
    prog.extend([Instr::Satisfy { args: nargs }, quote(&owner(2)), Instr::Output]);
    (state, prev_id, with_header(prog, 2))
}

fn unsatisfied_reason(report: &RunReport) -> &str {
    match rejection(report) {
        Rejection::UnsatisfiedCondition { reason } => reason,
        other => panic!("expected unsatisfied condition, got {other:?}"),
    }
}

// ── Success terminal ────────────────────────────────────────────

#[test]
fn falsy_terminal_is_unsatisfied() {
    let (state, id, prog) = spend_guarded_by(&owner(0), vec![], 0);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(unsatisfied_reason(&report).contains("no success value"));
}

#[test]
fn empty_condition_is_unsatisfied() {
    let (state, id, prog) = spend_guarded_by(&Program::default(), vec![], 0);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert_eq!(report.outcome.code(), Some("unsatisfied_condition"));
}

#[test]
fn rejection_inside_condition_is_wrapped() {
    let cond = Program::new(vec![Instr::Push(Value::Int64(0)), Instr::Verify]);
    let (state, id, prog) = spend_guarded_by(&cond, vec![], 0);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(unsatisfied_reason(&report).contains("verify failed"));
}

// ── Arguments ───────────────────────────────────────────────────

fn expects_seven() -> Program {
    Program::new(vec![Instr::Push(Value::Int64(7)), Instr::Eq])
}

#[test]
fn arguments_move_into_condition() {
    let (state, id, prog) = spend_guarded_by(&expects_seven(), vec![push(7i64)], 1);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(report.outcome.is_accepted(), "{:?}", report.outcome);
}

#[test]
fn wrong_argument_fails_condition() {
    let (state, id, prog) = spend_guarded_by(&expects_seven(), vec![push(8i64)], 1);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert_eq!(report.outcome.code(), Some("unsatisfied_condition"));
}

#[test]
fn missing_arguments_underflow_in_caller() {
    let (state, id, prog) = spend_guarded_by(&expects_seven(), vec![], 1);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert_eq!(rejection(&report), &Rejection::StackUnderflow);
}

// ── Record access from conditions ───────────────────────────────

#[test]
fn condition_may_read_parent_records() {
    let cond = Program::new(vec![
        Instr::Len { stack: StackId::Value },
        Instr::Push(Value::Int64(1)),
        Instr::Eq,
    ]);
    let (state, id, prog) = spend_guarded_by(&cond, vec![], 0);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(report.outcome.is_accepted(), "{:?}", report.outcome);
}

#[test]
fn condition_may_not_reorder_parent_records() {
    let cond = Program::new(vec![
        Instr::Roll { stack: StackId::Output, depth: 0 },
        Instr::Push(Value::Int64(1)),
    ]);
    let (state, id, prog) = spend_guarded_by(&cond, vec![], 0);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(unsatisfied_reason(&report).contains("illegal stack access"));
}

#[test]
fn condition_may_not_move_value() {
    let cond = Program::new(vec![Instr::Retire, Instr::Push(Value::Int64(1))]);
    let (state, id, prog) = spend_guarded_by(&cond, vec![], 0);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(unsatisfied_reason(&report).contains("illegal stack access"));
}

// ── Nesting ─────────────────────────────────────────────────────

/// Condition that defers and satisfies `levels` nested conditions.
fn nested(levels: usize) -> Program {
    let mut p = owner(1);
    for _ in 0..levels {
        p = Program::new(vec![
            Instr::Push(p.to_value()),
            Instr::Defer,
            Instr::Satisfy { args: 0 },
            Instr::Push(Value::Int64(1)),
        ]);
    }
    p
}

fn run_nested(levels: usize, max_depth: usize) -> RunReport {
    let cfg = EngineConfig { max_condition_depth: max_depth, ..EngineConfig::default() };
    let prog = with_header(vec![quote(&nested(levels)), Instr::Defer, Instr::Satisfy { args: 0 }], 2);
    exec_with(&cfg, seed(Version::V2, vec![]), prog, &MemState::default())
}

#[test]
fn nesting_within_limit_accepted() {
    let report = run_nested(2, 3);
    assert!(report.outcome.is_accepted(), "{:?}", report.outcome);
}

#[test]
fn nesting_past_limit_faults() {
    let report = run_nested(3, 3);
    assert_eq!(fault(&report), &Fault::RecursionLimitExceeded { limit: 3 });
}

#[test]
fn satisfy_charges_per_argument() {
    let (state, id, prog) = spend_guarded_by(&expects_seven(), vec![push(7i64)], 1);
    let base = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(base.outcome.is_accepted());
    assert_eq!(base.fuel_used, base.steps + 1);
}

// ── Signatures ──────────────────────────────────────────────────

fn key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// Condition taking one argument, a signature over the run id.
fn signed_by(key: &SigningKey) -> Program {
    Program::new(vec![
        Instr::RunId,
        Instr::Push(Value::Bytes(key.verifying_key().to_bytes().to_vec())),
        Instr::Roll { stack: StackId::Data, depth: 2 },
        Instr::CheckSig,
    ])
}

#[test]
fn signature_condition_accepts_valid_signature() {
    let k = key();
    let sig = k.sign(&RUN_ID).to_bytes().to_vec();
    let (state, id, prog) = spend_guarded_by(&signed_by(&k), vec![push(sig)], 1);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(report.outcome.is_accepted(), "{:?}", report.outcome);
}

#[test]
fn signature_by_other_key_fails_condition() {
    let other = SigningKey::from_bytes(&[8u8; 32]);
    let sig = other.sign(&RUN_ID).to_bytes().to_vec();
    let (state, id, prog) = spend_guarded_by(&signed_by(&key()), vec![push(sig)], 1);
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert!(unsatisfied_reason(&report).contains("no success value"));
}

#[test]
fn malformed_public_key_rejected() {
    let sig = key().sign(b"m").to_bytes().to_vec();
    let prog = vec![push(b"m".to_vec()), push(vec![1u8; 31]), push(sig), Instr::CheckSig];
    let report = exec(seed(Version::V2, vec![]), prog, &MemState::default());
    assert_eq!(rejection(&report), &Rejection::BadSignature);
}

// ── Confidential values ─────────────────────────────────────────

struct AcceptsProof {
    amount: i64,
}

impl ValueProofVerifier for AcceptsProof {
    fn verify_value_proof(&self, claim: &ValueClaim<'_>) -> bool {
        claim.proof == b"proof"
            && claim.amount == self.amount
            && claim.asset == &asset_x()
            && claim.asset_commitment == b"ac"
            && claim.value_commitment == b"vc"
            && claim.context.len() == 32
    }
}

fn confidential_spend(reveal: bool, proof: &[u8]) -> (MemState, Vec<Instr>, OutputRef) {
    let mut state = MemState::default();
    let item = ValueItem::confidential(b"ac".to_vec(), b"vc".to_vec(), Anchor::seed(b"c".to_vec()));
    let prev_id = state.add(OutputRecord::new(item, truthy().to_tuple()));
    let mut prog = vec![Instr::Spend, Instr::Satisfy { args: 0 }];
    if reveal {
        prog.extend([
            push(asset_x().as_bytes().to_vec()),
            push(10i64),
            push(proof.to_vec()),
            Instr::Reveal,
        ]);
    }
    prog.extend([quote(&owner(2)), Instr::Output]);
    (state, with_header(prog, 2), prev_id)
}

#[test]
fn revealed_value_can_be_output() {
    let (state, prog, id) = confidential_spend(true, b"proof");
    let report = txvm::run(
        &EngineConfig::default(),
        seed(Version::V2, vec![id]),
        &Program::new(prog),
        &state,
        AcceptsProof { amount: 10 },
    );
    let fx = effects(&report);
    assert_eq!(fx.outputs[0].record.value.as_clear().unwrap(), (asset_x(), 10));
}

#[test]
fn bad_proof_rejected() {
    let (state, prog, id) = confidential_spend(true, b"forged");
    let report = txvm::run(
        &EngineConfig::default(),
        seed(Version::V2, vec![id]),
        &Program::new(prog),
        &state,
        AcceptsProof { amount: 10 },
    );
    assert_eq!(rejection(&report), &Rejection::InvalidProof);
}

#[test]
fn unrevealed_value_cannot_be_output() {
    let (state, prog, id) = confidential_spend(false, b"");
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert_eq!(rejection(&report), &Rejection::Unrevealed);
}

#[test]
fn no_confidential_verifier_rejects_every_proof() {
    let (state, prog, id) = confidential_spend(true, b"proof");
    let report = exec(seed(Version::V2, vec![id]), prog, &state);
    assert_eq!(rejection(&report), &Rejection::InvalidProof);
}
