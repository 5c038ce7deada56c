//! Identity types
//!
//! An [`Identity`] owns a signing keypair and a KEM keypair. Only the
//! [`IdentityManager`](crate::IdentityManager) holds full identities; other
//! components see an [`IdentityHandle`] with public keys only.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use quantumshield_crypto::{Algorithm, Keypair, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentityError;

/// Unique identity id (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdentityId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdentityError::IdentityNotFound(s.to_string()))
    }
}

/// A hybrid post-quantum identity
///
/// This is also the persisted snapshot format: byte fields are hex strings,
/// timestamps are ISO-8601, and an externally custodied signing key appears
/// only as its handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    id: IdentityId,
    name: String,
    created_at: DateTime<Utc>,
    rotation_days: u32,
    #[serde(default)]
    rotation_due: bool,
    signing_keys: Keypair,
    kem_keys: Keypair,
}

impl Identity {
    pub(crate) fn new(
        id: IdentityId,
        name: String,
        created_at: DateTime<Utc>,
        rotation_days: u32,
        signing_keys: Keypair,
        kem_keys: Keypair,
    ) -> Self {
        Self {
            id,
            name,
            created_at,
            rotation_days,
            rotation_due: false,
            signing_keys,
            kem_keys,
        }
    }

    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn rotation_days(&self) -> u32 {
        self.rotation_days
    }

    pub fn is_rotation_due(&self) -> bool {
        self.rotation_due
    }

    pub fn signing_public_key(&self) -> &PublicKey {
        self.signing_keys.public_key()
    }

    pub fn kem_public_key(&self) -> &PublicKey {
        self.kem_keys.public_key()
    }

    pub fn signature_algorithm(&self) -> Algorithm {
        self.signing_keys.algorithm()
    }

    pub fn kem_algorithm(&self) -> Algorithm {
        self.kem_keys.algorithm()
    }

    /// Whether the signing key is held by an external signer
    pub fn is_externally_managed(&self) -> bool {
        self.signing_keys.is_external()
    }

    pub(crate) fn signing_keys(&self) -> &Keypair {
        &self.signing_keys
    }

    pub(crate) fn kem_keys(&self) -> &Keypair {
        &self.kem_keys
    }

    pub(crate) fn signing_private(&self) -> &PrivateKey {
        self.signing_keys.private_key()
    }

    pub(crate) fn kem_private(&self) -> &PrivateKey {
        self.kem_keys.private_key()
    }

    pub(crate) fn mark_rotation_due(&mut self) {
        self.rotation_due = true;
    }

    /// Age has reached the rotation threshold, or rotation was marked due
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        self.rotation_due || now - self.created_at >= Duration::days(i64::from(self.rotation_days))
    }

    /// Public view of this identity
    pub fn handle(&self) -> IdentityHandle {
        IdentityHandle {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            signing_key: self.signing_public_key().clone(),
            kem_key: self.kem_public_key().clone(),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> IdentityStatus {
        IdentityStatus {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            needs_rotation: self.needs_rotation(now),
            signature_algorithm: self.signature_algorithm(),
            kem_algorithm: self.kem_algorithm(),
            externally_managed: self.is_externally_managed(),
        }
    }
}

/// Public view of an identity: id, name and public keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHandle {
    pub id: IdentityId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub signing_key: PublicKey,
    pub kem_key: PublicKey,
}

/// Summary of an identity's lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStatus {
    pub id: IdentityId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub needs_rotation: bool,
    pub signature_algorithm: Algorithm,
    pub kem_algorithm: Algorithm,
    pub externally_managed: bool,
}
