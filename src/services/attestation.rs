//! Attestation signing.
//!
//! The digest must match what the contract recomputes on `respondToTask`:
//! `keccak256(abi.encodePacked(isSafe, contents))`, signed as an Ethereum
//! personal message over the 32 raw digest bytes.

use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::error::SigningError;
use crate::models::{Attestation, Verdict};

/// `byte(is_safe) ++ utf8(contents)`, no length prefix or padding.
pub fn packed_message(is_safe: bool, contents: &str) -> Vec<u8> {
    let mut packed = Vec::with_capacity(1 + contents.len());
    packed.push(u8::from(is_safe));
    packed.extend_from_slice(contents.as_bytes());
    packed
}

pub fn attestation_digest(is_safe: bool, contents: &str) -> B256 {
    keccak256(packed_message(is_safe, contents))
}

/// Signs verdicts with the operator key. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AttestationSigner {
    signer: PrivateKeySigner,
}

impl AttestationSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn sign(&self, verdict: Verdict, contents: &str) -> Result<Attestation, SigningError> {
        let digest = attestation_digest(verdict.is_safe, contents);
        let signature = self
            .signer
            .sign_message_sync(digest.as_slice())
            .map_err(|e| SigningError(e.to_string()))?;

        Ok(Attestation {
            verdict,
            digest,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
        })
    }
}
