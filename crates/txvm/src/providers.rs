//! Collaborators consumed by the engine.
//!
//! The engine holds no durable state and knows nothing about commitment
//! cryptography. Both are reached through these traits, synchronously,
//! from inside opcode execution.

use crate::record::{AssetId, OutputRecord, OutputRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    Fresh,
    Conflict,
}

/// Read/check view of the external state layer. Must be an already
/// consistent snapshot for the duration of one run.
pub trait StateView {
    /// Unspent output named by `output`, or `None`.
    fn resolve_prevout(&self, output: &OutputRef) -> Option<OutputRecord>;

    /// Whether `token` is unused among committed nonces within its
    /// expiry window.
    fn check_nonce(&self, token: &[u8], expiry: i64) -> NonceStatus;
}

impl<T: StateView + ?Sized> StateView for &T {
    fn resolve_prevout(&self, output: &OutputRef) -> Option<OutputRecord> {
        (**self).resolve_prevout(output)
    }

    fn check_nonce(&self, token: &[u8], expiry: i64) -> NonceStatus {
        (**self).check_nonce(token, expiry)
    }
}

/// Claim that `proof` attests `amount` of `asset` under the two
/// commitments, bound to `context`.
#[derive(Debug, Clone, Copy)]
pub struct ValueClaim<'a> {
    pub asset: &'a AssetId,
    pub amount: i64,
    pub asset_commitment: &'a [u8],
    pub value_commitment: &'a [u8],
    pub proof: &'a [u8],
    pub context: &'a [u8],
}

pub trait ValueProofVerifier {
    fn verify_value_proof(&self, claim: &ValueClaim<'_>) -> bool;
}

impl<T: ValueProofVerifier + ?Sized> ValueProofVerifier for &T {
    fn verify_value_proof(&self, claim: &ValueClaim<'_>) -> bool {
        (**self).verify_value_proof(claim)
    }
}

/// Verifier for deployments without confidential assets: every proof
/// is invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfidential;

impl ValueProofVerifier for NoConfidential {
    fn verify_value_proof(&self, _claim: &ValueClaim<'_>) -> bool {
        false
    }
}
