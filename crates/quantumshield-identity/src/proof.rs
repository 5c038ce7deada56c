//! Self-contained signature proofs
//!
//! A [`SignatureProof`] carries everything an external verifier (for example
//! an append-only ledger) needs to check a signature without consulting the
//! identity manager: the algorithm, the signer's public key, and the
//! signature with its payload hash and timestamp.

use quantumshield_crypto::{Algorithm, CryptoError, PrimitiveProvider, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::error::IdentityResult;
use crate::identity::IdentityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProof {
    /// Signing identity, when produced by a manager
    pub signer: Option<IdentityId>,
    pub algorithm: Algorithm,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl SignatureProof {
    pub fn new(signer: Option<IdentityId>, public_key: PublicKey, signature: Signature) -> Self {
        Self {
            signer,
            algorithm: public_key.algorithm(),
            public_key,
            signature,
        }
    }

    /// Check the proof over `payload`
    ///
    /// Inconsistent algorithm labels and keys that do not fit their level
    /// verify as `false`.
    pub fn verify(&self, provider: &dyn PrimitiveProvider, payload: &[u8]) -> IdentityResult<bool> {
        if self.public_key.algorithm() != self.algorithm
            || self.signature.algorithm() != self.algorithm
        {
            return Ok(false);
        }
        match provider.verify(&self.public_key, payload, &self.signature) {
            Ok(valid) => Ok(valid),
            Err(CryptoError::InvalidParameters(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check the proof and that it was made by `expected_key`
    pub fn verify_signer(
        &self,
        provider: &dyn PrimitiveProvider,
        payload: &[u8],
        expected_key: &PublicKey,
    ) -> IdentityResult<bool> {
        if &self.public_key != expected_key {
            return Ok(false);
        }
        self.verify(provider, payload)
    }

    pub fn to_json(&self) -> IdentityResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> IdentityResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
