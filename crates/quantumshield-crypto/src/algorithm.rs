//! Named security levels for the post-quantum primitives
//!
//! Algorithm identifiers travel with every key, signature and ciphertext so
//! that a primitive provider can reject mismatched inputs. Byte sizes are
//! not defined here; they belong to the provider (see
//! [`PrimitiveProvider::params`](crate::provider::PrimitiveProvider::params)).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// What an algorithm is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Digital signatures (ML-DSA, NIST FIPS 204)
    Signature,
    /// Key encapsulation (ML-KEM, NIST FIPS 203)
    Kem,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Signature => write!(f, "signature"),
            AlgorithmKind::Kem => write!(f, "kem"),
        }
    }
}

/// A named post-quantum parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "ML-DSA-44")]
    MlDsa44,
    #[serde(rename = "ML-DSA-65")]
    MlDsa65,
    #[serde(rename = "ML-DSA-87")]
    MlDsa87,
    #[serde(rename = "ML-KEM-512")]
    MlKem512,
    #[serde(rename = "ML-KEM-768")]
    MlKem768,
    #[serde(rename = "ML-KEM-1024")]
    MlKem1024,
}

impl Algorithm {
    /// Every supported algorithm
    pub const ALL: [Algorithm; 6] = [
        Algorithm::MlDsa44,
        Algorithm::MlDsa65,
        Algorithm::MlDsa87,
        Algorithm::MlKem512,
        Algorithm::MlKem768,
        Algorithm::MlKem1024,
    ];

    /// Canonical name, e.g. `ML-DSA-65`
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::MlDsa44 => "ML-DSA-44",
            Algorithm::MlDsa65 => "ML-DSA-65",
            Algorithm::MlDsa87 => "ML-DSA-87",
            Algorithm::MlKem512 => "ML-KEM-512",
            Algorithm::MlKem768 => "ML-KEM-768",
            Algorithm::MlKem1024 => "ML-KEM-1024",
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Algorithm::MlDsa44 | Algorithm::MlDsa65 | Algorithm::MlDsa87 => {
                AlgorithmKind::Signature
            }
            Algorithm::MlKem512 | Algorithm::MlKem768 | Algorithm::MlKem1024 => AlgorithmKind::Kem,
        }
    }

    /// NIST security category of the parameter set
    pub fn security_category(&self) -> u8 {
        match self {
            Algorithm::MlDsa44 => 2,
            Algorithm::MlKem512 => 1,
            Algorithm::MlDsa65 | Algorithm::MlKem768 => 3,
            Algorithm::MlDsa87 | Algorithm::MlKem1024 => 5,
        }
    }

    /// Fail with `InvalidParameters` unless this algorithm is of `kind`
    pub fn expect_kind(&self, kind: AlgorithmKind) -> Result<(), CryptoError> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(CryptoError::invalid(format!(
                "{} is a {} algorithm, expected {}",
                self,
                self.kind(),
                kind
            )))
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CryptoError::invalid(format!("unknown algorithm: {}", s)))
    }
}

/// Fixed byte sizes of a parameter set
///
/// Sizes that do not apply to the algorithm's kind are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmParams {
    pub algorithm: Algorithm,
    pub public_key_size: usize,
    pub private_key_size: usize,
    pub signature_size: usize,
    pub ciphertext_size: usize,
    pub shared_secret_size: usize,
}
