//! Authenticated one-shot key exchange
//!
//! The initiator encapsulates against the responder's public KEM key,
//! derives a symmetric key with a fresh salt, and signs a transcript of
//! every field of the channel except the key and signature themselves. The
//! responder checks that signature, and that a known initiator's key is the
//! one that made it, before it decapsulates anything. It then derives the
//! same key from the transmitted salt.
//!
//! ```text
//! initiator                                responder
//!   encapsulate(responder KEM key)
//!   derive(secret, salt)
//!   sign(id . initiator . created_at . ciphertext . salt)
//!   ---------------- Channel ---------------->
//!                                            check initiator key (else Rejected)
//!                                            verify signature (else Rejected)
//!                                            decapsulate
//!                                            derive(secret, salt)
//! ```
//!
//! There is no renegotiation or resumption; abandoning a handshake is simply
//! not calling [`ChannelProtocol::accept`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use quantumshield_crypto::codec::{self, hex_array};
use quantumshield_crypto::{
    aead, kdf, CryptoError, KemCiphertext, PublicKey, Salt, SealedPayload, SharedSecret,
    Signature, SymmetricKey, KDF_CONTEXT,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{IdentityError, IdentityResult};
use crate::identity::IdentityId;
use crate::manager::IdentityManager;

/// Handshake states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Channel emitted by the initiator
    Initiated,
    /// Signature verified and key derived by the responder
    Accepted,
    /// Signature check failed; nothing was decapsulated
    Rejected,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Initiated => write!(f, "initiated"),
            ChannelState::Accepted => write!(f, "accepted"),
            ChannelState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Handshake message sent from initiator to responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: Uuid,
    pub initiator: IdentityId,
    pub ciphertext: KemCiphertext,
    pub signature: Signature,
    pub initiator_signing_key: PublicKey,
    #[serde(with = "hex_array")]
    pub salt: Salt,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// Bytes covered by the initiator's signature
    pub fn transcript(&self) -> Vec<u8> {
        Transcript {
            channel_id: &self.channel_id,
            initiator: self.initiator,
            created_at: &self.created_at,
            ciphertext: &self.ciphertext,
            salt: &self.salt,
        }
        .to_bytes()
    }

    pub fn to_json(&self) -> IdentityResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> IdentityResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Every channel field except the signature and the signing key
///
/// Encoded as `"{channel_id}.{initiator}.{created_at}.{ciphertext}.{salt}"`
/// with RFC 3339 nanosecond timestamps and hex byte fields.
struct Transcript<'a> {
    channel_id: &'a Uuid,
    initiator: IdentityId,
    created_at: &'a DateTime<Utc>,
    ciphertext: &'a KemCiphertext,
    salt: &'a Salt,
}

impl Transcript<'_> {
    fn to_bytes(&self) -> Vec<u8> {
        format!(
            "{}.{}.{}.{}.{}",
            self.channel_id,
            self.initiator,
            self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.ciphertext.to_hex(),
            codec::encode(self.salt)
        )
        .into_bytes()
    }
}

fn channel_aad(channel_id: &Uuid) -> &[u8] {
    channel_id.as_bytes()
}

/// Initiator side of a channel: the message to send plus the local secret
pub struct InitiatedChannel {
    channel: Channel,
    shared_secret: SharedSecret,
    key: SymmetricKey,
}

impl InitiatedChannel {
    /// The message to hand to the responder
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_id(&self) -> Uuid {
        self.channel.channel_id
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::Initiated
    }

    /// KEM shared secret held only by the initiator
    pub fn shared_secret(&self) -> &SharedSecret {
        &self.shared_secret
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Encrypt a message for the responder under the channel key
    pub fn seal(&self, plaintext: &[u8]) -> IdentityResult<SealedPayload> {
        Ok(aead::seal(&self.key, plaintext, channel_aad(&self.channel.channel_id))?)
    }

    /// Decrypt a message from the responder
    pub fn open(&self, sealed: &SealedPayload) -> IdentityResult<Vec<u8>> {
        Ok(aead::open(&self.key, sealed, channel_aad(&self.channel.channel_id))?)
    }
}

impl fmt::Debug for InitiatedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitiatedChannel")
            .field("channel_id", &self.channel.channel_id)
            .field("initiator", &self.channel.initiator)
            .finish_non_exhaustive()
    }
}

/// Responder side of an accepted channel
pub struct EstablishedChannel {
    channel_id: Uuid,
    initiator: IdentityId,
    initiator_signing_key: PublicKey,
    responder: IdentityId,
    key: SymmetricKey,
    established_at: DateTime<Utc>,
}

impl EstablishedChannel {
    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::Accepted
    }

    pub fn initiator(&self) -> IdentityId {
        self.initiator
    }

    /// Key that signed the handshake
    pub fn initiator_signing_key(&self) -> &PublicKey {
        &self.initiator_signing_key
    }

    pub fn responder(&self) -> IdentityId {
        self.responder
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Encrypt a message for the initiator under the channel key
    pub fn seal(&self, plaintext: &[u8]) -> IdentityResult<SealedPayload> {
        Ok(aead::seal(&self.key, plaintext, channel_aad(&self.channel_id))?)
    }

    /// Decrypt a message from the initiator
    pub fn open(&self, sealed: &SealedPayload) -> IdentityResult<Vec<u8>> {
        Ok(aead::open(&self.key, sealed, channel_aad(&self.channel_id))?)
    }
}

impl fmt::Debug for EstablishedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstablishedChannel")
            .field("channel_id", &self.channel_id)
            .field("initiator", &self.initiator)
            .field("responder", &self.responder)
            .finish_non_exhaustive()
    }
}

/// Two-party handshake over identities of one manager
pub struct ChannelProtocol<'a> {
    manager: &'a IdentityManager,
}

impl<'a> ChannelProtocol<'a> {
    pub fn new(manager: &'a IdentityManager) -> Self {
        Self { manager }
    }

    /// Start a handshake from `initiator` to the holder of `responder_kem_key`
    pub fn initiate(
        &self,
        initiator: IdentityId,
        responder_kem_key: &PublicKey,
    ) -> IdentityResult<InitiatedChannel> {
        let initiator_handle = self.manager.handle(initiator)?;

        let (ciphertext, shared_secret) = self.manager.provider().encapsulate(responder_kem_key)?;
        let derived = kdf::derive(shared_secret.as_bytes(), KDF_CONTEXT, None)?;

        let channel_id = Uuid::new_v4();
        let created_at = self.manager.clock().now_utc();
        let transcript = Transcript {
            channel_id: &channel_id,
            initiator,
            created_at: &created_at,
            ciphertext: &ciphertext,
            salt: &derived.salt,
        }
        .to_bytes();
        let signature = self.manager.sign(initiator, &transcript)?;

        let channel = Channel {
            channel_id,
            initiator,
            ciphertext,
            signature,
            initiator_signing_key: initiator_handle.signing_key,
            salt: derived.salt,
            created_at,
        };
        info!(
            channel_id = %channel.channel_id,
            initiator = %initiator,
            kem = %responder_kem_key.algorithm(),
            state = %ChannelState::Initiated,
            "channel initiated"
        );

        Ok(InitiatedChannel {
            channel,
            shared_secret,
            key: derived.key,
        })
    }

    /// Verify and complete a handshake as `responder`
    ///
    /// Fails with [`IdentityError::ChannelTampered`] without decapsulating
    /// when the signature does not verify.
    ///
    /// When the claimed initiator is an identity of this manager, its signing
    /// key must also match the key carried by the channel.
    pub fn accept(
        &self,
        responder: IdentityId,
        channel: Channel,
    ) -> IdentityResult<EstablishedChannel> {
        if !self.manager.contains(responder) {
            return Err(IdentityError::not_found(responder));
        }

        if let Ok(known) = self.manager.handle(channel.initiator) {
            if known.signing_key != channel.initiator_signing_key {
                warn!(
                    channel_id = %channel.channel_id,
                    initiator = %channel.initiator,
                    state = %ChannelState::Rejected,
                    "channel signing key does not belong to the claimed initiator"
                );
                return Err(IdentityError::ChannelTampered(format!(
                    "channel {} was not signed by identity {}",
                    channel.channel_id, channel.initiator
                )));
            }
        }

        let verified = match self.manager.provider().verify(
            &channel.initiator_signing_key,
            &channel.transcript(),
            &channel.signature,
        ) {
            Ok(valid) => valid,
            Err(CryptoError::InvalidParameters(reason)) => {
                warn!(channel_id = %channel.channel_id, %reason, "malformed channel signature");
                false
            }
            Err(e) => return Err(e.into()),
        };
        if !verified {
            warn!(
                channel_id = %channel.channel_id,
                initiator = %channel.initiator,
                state = %ChannelState::Rejected,
                "channel signature rejected"
            );
            return Err(IdentityError::ChannelTampered(format!(
                "signature on channel {} does not verify",
                channel.channel_id
            )));
        }

        let shared_secret = self.manager.decapsulate(responder, &channel.ciphertext)?;
        let derived = kdf::derive(shared_secret.as_bytes(), KDF_CONTEXT, Some(&channel.salt))?;

        info!(
            channel_id = %channel.channel_id,
            initiator = %channel.initiator,
            responder = %responder,
            state = %ChannelState::Accepted,
            "channel accepted"
        );
        Ok(EstablishedChannel {
            channel_id: channel.channel_id,
            initiator: channel.initiator,
            initiator_signing_key: channel.initiator_signing_key,
            responder,
            key: derived.key,
            established_at: self.manager.clock().now_utc(),
        })
    }
}
