//! Post-quantum primitive provider
//!
//! [`PrimitiveProvider`] is the seam between the identity layer and the
//! lattice primitives. [`PqcryptoProvider`] implements it over the
//! `pqcrypto` Dilithium (ML-DSA) and Kyber (ML-KEM) parameter sets, and
//! optionally delegates signing-key custody to an [`ExternalSigner`].
//!
//! ## Error policy
//!
//! - A key of the wrong kind or level, or with the wrong size, is
//!   [`CryptoError::InvalidParameters`].
//! - A malformed signature (wrong size, wrong level, payload hash that does
//!   not match) verifies as `false`, never as an error.

use std::fmt;
use std::sync::Arc;

use pqcrypto_dilithium::{dilithium2, dilithium3, dilithium5};
use pqcrypto_kyber::{kyber1024, kyber512, kyber768};
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};
use tracing::{debug, trace};

use crate::algorithm::{Algorithm, AlgorithmKind, AlgorithmParams};
use crate::error::{CryptoError, CryptoResult};
use crate::external::ExternalSigner;
use crate::keys::{
    KemCiphertext, Keypair, PrivateKey, PublicKey, SecureBytes, SharedSecret, Signature,
};

/// The six primitive operations plus parameter lookup
///
/// Implementations must be pure with respect to each other: every method may
/// be called concurrently from any thread.
pub trait PrimitiveProvider: Send + Sync {
    /// Byte sizes of a parameter set
    fn params(&self, algorithm: Algorithm) -> AlgorithmParams {
        parameter_set(algorithm)
    }

    fn generate_signing_keypair(&self, algorithm: Algorithm) -> CryptoResult<Keypair>;

    fn sign(&self, private: &PrivateKey, message: &[u8]) -> CryptoResult<Signature>;

    fn verify(
        &self,
        public: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> CryptoResult<bool>;

    fn generate_kem_keypair(&self, algorithm: Algorithm) -> CryptoResult<Keypair>;

    fn encapsulate(&self, public: &PublicKey) -> CryptoResult<(KemCiphertext, SharedSecret)>;

    fn decapsulate(
        &self,
        private: &PrivateKey,
        ciphertext: &KemCiphertext,
    ) -> CryptoResult<SharedSecret>;

    /// Check that a keypair's sizes match its declared parameter set
    fn validate_keypair(&self, keypair: &Keypair) -> CryptoResult<()> {
        let params = self.params(keypair.algorithm());
        check_size("public key", params.public_key_size, keypair.public_key().len())?;
        if let PrivateKey::Local { key, .. } = keypair.private_key() {
            check_size("private key", params.private_key_size, key.len())?;
        }
        Ok(())
    }
}

/// Fixed sizes of every supported parameter set
pub fn parameter_set(algorithm: Algorithm) -> AlgorithmParams {
    let base = AlgorithmParams {
        algorithm,
        public_key_size: 0,
        private_key_size: 0,
        signature_size: 0,
        ciphertext_size: 0,
        shared_secret_size: 0,
    };
    match algorithm {
        Algorithm::MlDsa44 => AlgorithmParams {
            public_key_size: dilithium2::public_key_bytes(),
            private_key_size: dilithium2::secret_key_bytes(),
            signature_size: dilithium2::signature_bytes(),
            ..base
        },
        Algorithm::MlDsa65 => AlgorithmParams {
            public_key_size: dilithium3::public_key_bytes(),
            private_key_size: dilithium3::secret_key_bytes(),
            signature_size: dilithium3::signature_bytes(),
            ..base
        },
        Algorithm::MlDsa87 => AlgorithmParams {
            public_key_size: dilithium5::public_key_bytes(),
            private_key_size: dilithium5::secret_key_bytes(),
            signature_size: dilithium5::signature_bytes(),
            ..base
        },
        Algorithm::MlKem512 => AlgorithmParams {
            public_key_size: kyber512::public_key_bytes(),
            private_key_size: kyber512::secret_key_bytes(),
            ciphertext_size: kyber512::ciphertext_bytes(),
            shared_secret_size: kyber512::shared_secret_bytes(),
            ..base
        },
        Algorithm::MlKem768 => AlgorithmParams {
            public_key_size: kyber768::public_key_bytes(),
            private_key_size: kyber768::secret_key_bytes(),
            ciphertext_size: kyber768::ciphertext_bytes(),
            shared_secret_size: kyber768::shared_secret_bytes(),
            ..base
        },
        Algorithm::MlKem1024 => AlgorithmParams {
            public_key_size: kyber1024::public_key_bytes(),
            private_key_size: kyber1024::secret_key_bytes(),
            ciphertext_size: kyber1024::ciphertext_bytes(),
            shared_secret_size: kyber1024::shared_secret_bytes(),
            ..base
        },
    }
}

fn check_size(what: &str, expected: usize, got: usize) -> CryptoResult<()> {
    if expected != got {
        return Err(CryptoError::invalid(format!(
            "Invalid {} size: expected {}, got {}",
            what, expected, got
        )));
    }
    Ok(())
}

/// Run `$body` with `$m` bound to the Dilithium module for `$alg`
macro_rules! with_dsa {
    ($alg:expr, $m:ident => $body:expr) => {
        match $alg {
            Algorithm::MlDsa44 => {
                use pqcrypto_dilithium::dilithium2 as $m;
                $body
            }
            Algorithm::MlDsa65 => {
                use pqcrypto_dilithium::dilithium3 as $m;
                $body
            }
            Algorithm::MlDsa87 => {
                use pqcrypto_dilithium::dilithium5 as $m;
                $body
            }
            other => Err(CryptoError::invalid(format!(
                "{} is not a signature algorithm",
                other
            ))),
        }
    };
}

/// Run `$body` with `$m` bound to the Kyber module for `$alg`
macro_rules! with_kem {
    ($alg:expr, $m:ident => $body:expr) => {
        match $alg {
            Algorithm::MlKem512 => {
                use pqcrypto_kyber::kyber512 as $m;
                $body
            }
            Algorithm::MlKem768 => {
                use pqcrypto_kyber::kyber768 as $m;
                $body
            }
            Algorithm::MlKem1024 => {
                use pqcrypto_kyber::kyber1024 as $m;
                $body
            }
            other => Err(CryptoError::invalid(format!("{} is not a KEM algorithm", other))),
        }
    };
}

/// Generate a raw Dilithium keypair as (public, secret)
pub(crate) fn dsa_keypair(algorithm: Algorithm) -> CryptoResult<(Vec<u8>, SecureBytes)> {
    with_dsa!(algorithm, m => {
        let (pk, sk) = m::keypair();
        Ok((pk.as_bytes().to_vec(), SecureBytes::from_slice(sk.as_bytes())))
    })
}

/// Produce a detached Dilithium signature from raw secret key bytes
pub(crate) fn dsa_sign(
    algorithm: Algorithm,
    secret: &[u8],
    message: &[u8],
) -> CryptoResult<Vec<u8>> {
    let params = parameter_set(algorithm);
    algorithm.expect_kind(AlgorithmKind::Signature)?;
    check_size("signing key", params.private_key_size, secret.len())?;
    with_dsa!(algorithm, m => {
        let sk = m::SecretKey::from_bytes(secret)
            .map_err(|e| CryptoError::invalid(format!("Invalid signing key: {:?}", e)))?;
        Ok(m::detached_sign(message, &sk).as_bytes().to_vec())
    })
}

fn dsa_verify(
    algorithm: Algorithm,
    public: &[u8],
    message: &[u8],
    sig: &[u8],
) -> CryptoResult<bool> {
    with_dsa!(algorithm, m => {
        let pk = m::PublicKey::from_bytes(public)
            .map_err(|e| CryptoError::invalid(format!("Invalid verifying key: {:?}", e)))?;
        Ok(match m::DetachedSignature::from_bytes(sig) {
            Ok(sig) => m::verify_detached_signature(&sig, message, &pk).is_ok(),
            Err(_) => false,
        })
    })
}

fn kem_keypair(algorithm: Algorithm) -> CryptoResult<(Vec<u8>, SecureBytes)> {
    with_kem!(algorithm, m => {
        let (pk, sk) = m::keypair();
        Ok((pk.as_bytes().to_vec(), SecureBytes::from_slice(sk.as_bytes())))
    })
}

fn kem_encapsulate(algorithm: Algorithm, public: &[u8]) -> CryptoResult<(Vec<u8>, SharedSecret)> {
    with_kem!(algorithm, m => {
        let pk = m::PublicKey::from_bytes(public)
            .map_err(|e| CryptoError::invalid(format!("Invalid encapsulation key: {:?}", e)))?;
        let (ss, ct) = m::encapsulate(&pk);
        Ok((ct.as_bytes().to_vec(), SharedSecret::new(ss.as_bytes().to_vec())))
    })
}

fn kem_decapsulate(
    algorithm: Algorithm,
    secret: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<SharedSecret> {
    with_kem!(algorithm, m => {
        let sk = m::SecretKey::from_bytes(secret)
            .map_err(|e| CryptoError::invalid(format!("Invalid decapsulation key: {:?}", e)))?;
        let ct = m::Ciphertext::from_bytes(ciphertext)
            .map_err(|e| CryptoError::invalid(format!("Invalid ciphertext: {:?}", e)))?;
        let ss = m::decapsulate(&ct, &sk);
        Ok(SharedSecret::new(ss.as_bytes().to_vec()))
    })
}

/// Default provider backed by the `pqcrypto` crates
///
/// In local mode private keys are generated and held in process. With an
/// external signer attached, signing keypairs are created by the signer and
/// only a [`PrivateKey::External`] handle is returned; KEM keys always stay
/// local.
#[derive(Clone, Default)]
pub struct PqcryptoProvider {
    signer: Option<Arc<dyn ExternalSigner>>,
}

impl PqcryptoProvider {
    /// Provider that keeps all private keys in process memory
    pub fn new() -> Self {
        Self { signer: None }
    }

    /// Provider that delegates signing-key custody to `signer`
    pub fn external(signer: Arc<dyn ExternalSigner>) -> Self {
        Self {
            signer: Some(signer),
        }
    }

    /// Whether signing keys are created by an external signer
    pub fn is_external(&self) -> bool {
        self.signer.is_some()
    }

    fn signer(&self) -> CryptoResult<&Arc<dyn ExternalSigner>> {
        self.signer.as_ref().ok_or_else(|| {
            CryptoError::invalid("externally managed key used without an external signer")
        })
    }
}

impl fmt::Debug for PqcryptoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PqcryptoProvider")
            .field("external", &self.is_external())
            .finish()
    }
}

impl PrimitiveProvider for PqcryptoProvider {
    fn generate_signing_keypair(&self, algorithm: Algorithm) -> CryptoResult<Keypair> {
        algorithm.expect_kind(AlgorithmKind::Signature)?;
        let keypair = match &self.signer {
            Some(signer) => {
                let (handle, public) = signer.create_key(algorithm)?;
                check_size(
                    "public key",
                    parameter_set(algorithm).public_key_size,
                    public.len(),
                )?;
                Keypair::new(
                    PublicKey::new(algorithm, public),
                    PrivateKey::External { algorithm, handle },
                )?
            }
            None => {
                let (public, secret) = dsa_keypair(algorithm)?;
                Keypair::new(
                    PublicKey::new(algorithm, public),
                    PrivateKey::Local {
                        algorithm,
                        key: secret,
                    },
                )?
            }
        };
        debug!(
            algorithm = %algorithm,
            external = keypair.is_external(),
            "signing keypair generated"
        );
        Ok(keypair)
    }

    fn sign(&self, private: &PrivateKey, message: &[u8]) -> CryptoResult<Signature> {
        let algorithm = private.algorithm();
        algorithm.expect_kind(AlgorithmKind::Signature)?;
        let bytes = match private {
            PrivateKey::Local { key, .. } => dsa_sign(algorithm, key.as_slice(), message)?,
            PrivateKey::External { handle, .. } => {
                let bytes = self.signer()?.sign(handle, message)?;
                check_size(
                    "signature",
                    parameter_set(algorithm).signature_size,
                    bytes.len(),
                )
                .map_err(|_| {
                    CryptoError::permanent(format!(
                        "external signer returned {} bytes for {}",
                        bytes.len(),
                        algorithm
                    ))
                })?;
                bytes
            }
        };
        trace!(algorithm = %algorithm, size = bytes.len(), "message signed");
        Ok(Signature::new(algorithm, bytes, message))
    }

    fn verify(
        &self,
        public: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> CryptoResult<bool> {
        let algorithm = public.algorithm();
        algorithm.expect_kind(AlgorithmKind::Signature)?;
        let params = parameter_set(algorithm);
        check_size("verifying key", params.public_key_size, public.len())?;

        if signature.algorithm() != algorithm
            || signature.size() != params.signature_size
            || !signature.covers(message)
        {
            trace!(algorithm = %algorithm, "malformed signature rejected");
            return Ok(false);
        }
        dsa_verify(algorithm, public.as_bytes(), message, signature.as_bytes())
    }

    fn generate_kem_keypair(&self, algorithm: Algorithm) -> CryptoResult<Keypair> {
        algorithm.expect_kind(AlgorithmKind::Kem)?;
        let (public, secret) = kem_keypair(algorithm)?;
        debug!(algorithm = %algorithm, "KEM keypair generated");
        Keypair::new(
            PublicKey::new(algorithm, public),
            PrivateKey::Local {
                algorithm,
                key: secret,
            },
        )
    }

    fn encapsulate(&self, public: &PublicKey) -> CryptoResult<(KemCiphertext, SharedSecret)> {
        let algorithm = public.algorithm();
        algorithm.expect_kind(AlgorithmKind::Kem)?;
        check_size(
            "encapsulation key",
            parameter_set(algorithm).public_key_size,
            public.len(),
        )?;
        let (ciphertext, secret) = kem_encapsulate(algorithm, public.as_bytes())?;
        Ok((KemCiphertext::new(algorithm, ciphertext), secret))
    }

    fn decapsulate(
        &self,
        private: &PrivateKey,
        ciphertext: &KemCiphertext,
    ) -> CryptoResult<SharedSecret> {
        let algorithm = private.algorithm();
        algorithm.expect_kind(AlgorithmKind::Kem)?;
        if ciphertext.algorithm() != algorithm {
            return Err(CryptoError::invalid(format!(
                "ciphertext level {} does not match key level {}",
                ciphertext.algorithm(),
                algorithm
            )));
        }
        let key = match private {
            PrivateKey::Local { key, .. } => key,
            PrivateKey::External { .. } => {
                return Err(CryptoError::invalid(
                    "KEM decapsulation requires a locally held key",
                ));
            }
        };
        let params = parameter_set(algorithm);
        check_size("decapsulation key", params.private_key_size, key.len())?;
        check_size("ciphertext", params.ciphertext_size, ciphertext.len())?;
        kem_decapsulate(algorithm, key.as_slice(), ciphertext.as_bytes())
    }
}
