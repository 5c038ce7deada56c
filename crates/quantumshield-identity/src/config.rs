//! Startup configuration for QuantumShield identities
//!
//! All values are fixed for the lifetime of an [`IdentityManager`](crate::IdentityManager);
//! there is no renegotiation.

use std::path::PathBuf;
use std::time::Duration;

use quantumshield_crypto::{Algorithm, AlgorithmKind, CryptoError};
use serde::{Deserialize, Serialize};

use crate::error::IdentityResult;

/// Env var overriding the signature level (e.g. `ML-DSA-87`)
pub const ENV_SIGNATURE_LEVEL: &str = "QSHIELD_SIGNATURE_LEVEL";
/// Env var overriding the KEM level (e.g. `ML-KEM-1024`)
pub const ENV_KEM_LEVEL: &str = "QSHIELD_KEM_LEVEL";
/// Env var enabling external signing-key custody
pub const ENV_EXTERNAL_SIGNING: &str = "QSHIELD_EXTERNAL_SIGNING";
/// Env var overriding the rotation threshold in days
pub const ENV_ROTATION_DAYS: &str = "QSHIELD_ROTATION_DAYS";
/// Env var overriding the key-store directory
pub const ENV_KEY_STORE: &str = "QSHIELD_KEY_STORE";

/// Configuration for identities and their key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Signature security level for new identities
    pub signature_algorithm: Algorithm,
    /// KEM security level for new identities
    pub kem_algorithm: Algorithm,
    /// Create signing keys through an external signer
    pub external_signing: bool,
    /// Age in days after which an identity needs rotation
    pub rotation_days: u32,
    /// Directory for persisted identity snapshots
    pub key_store_path: PathBuf,
    /// Retry policy for transient signer failures
    pub retry: RetryPolicy,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            signature_algorithm: Algorithm::MlDsa65,
            kem_algorithm: Algorithm::MlKem768,
            external_signing: false,
            rotation_days: 365,
            key_store_path: PathBuf::from("./quantum-keys"),
            retry: RetryPolicy::default(),
        }
    }
}

impl ShieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `QSHIELD_*` environment variables
    pub fn from_env() -> IdentityResult<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_env_overrides<F>(mut self, lookup: F) -> IdentityResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_SIGNATURE_LEVEL) {
            self.signature_algorithm = level.parse()?;
        }
        if let Some(level) = lookup(ENV_KEM_LEVEL) {
            self.kem_algorithm = level.parse()?;
        }
        if let Some(flag) = lookup(ENV_EXTERNAL_SIGNING) {
            self.external_signing = parse_flag(ENV_EXTERNAL_SIGNING, &flag)?;
        }
        if let Some(days) = lookup(ENV_ROTATION_DAYS) {
            self.rotation_days = days.trim().parse().map_err(|_| {
                CryptoError::invalid(format!(
                    "{ENV_ROTATION_DAYS} must be a whole number of days, got {days:?}"
                ))
            })?;
        }
        if let Some(path) = lookup(ENV_KEY_STORE) {
            self.key_store_path = PathBuf::from(path);
        }
        Ok(self)
    }

    pub fn with_signature_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    pub fn with_kem_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.kem_algorithm = algorithm;
        self
    }

    pub fn with_external_signing(mut self, enabled: bool) -> Self {
        self.external_signing = enabled;
        self
    }

    pub fn with_rotation_days(mut self, days: u32) -> Self {
        self.rotation_days = days;
        self
    }

    pub fn with_key_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_store_path = path.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reject configurations that can never work
    pub fn validate(&self) -> IdentityResult<()> {
        self.signature_algorithm.expect_kind(AlgorithmKind::Signature)?;
        self.kem_algorithm.expect_kind(AlgorithmKind::Kem)?;
        if self.rotation_days == 0 {
            return Err(CryptoError::invalid("rotation threshold must be at least one day").into());
        }
        if self.retry.max_attempts == 0 {
            return Err(CryptoError::invalid("retry policy must allow at least one attempt").into());
        }
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, CryptoError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CryptoError::invalid(format!("{} must be a boolean, got {:?}", name, other))),
    }
}

/// Exponential backoff for transient signer failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}
