//! # QuantumShield Identity
//!
//! Hybrid post-quantum identities and the protocols built on them.
//!
//! An identity pairs an ML-DSA signing keypair with an ML-KEM keypair. The
//! [`IdentityManager`] owns every identity and its private keys; everything
//! else works from public handles.
//!
//! ## Features
//!
//! - Identity lifecycle: create, sign, verify, rotation checks, delete
//! - Persistence through a pluggable [`IdentityStore`] (in-memory or JSON files)
//! - Authenticated one-shot channels ([`ChannelProtocol`])
//! - Hybrid KEM + ChaCha20-Poly1305 packages with optional sender proofs
//!   ([`HybridCipher`])
//! - Self-contained [`SignatureProof`]s for external verifiers
//!
//! ## Example
//!
//! ```rust,ignore
//! use quantumshield_identity::{IdentityManager, ShieldConfig};
//!
//! let manager = IdentityManager::new(ShieldConfig::default())?;
//! let alice = manager.create("Alice")?;
//! let bob = manager.create("Bob")?;
//!
//! // Alice signs, anyone can verify
//! let sig = manager.sign(alice.id, b"ping")?;
//! assert!(manager.verify(&alice.signing_key, b"ping", &sig)?);
//! assert!(!manager.verify(&bob.signing_key, b"ping", &sig)?);
//!
//! // Alice encrypts to Bob and signs the package
//! let package = manager.hybrid().encrypt(&bob.kem_key, b"secret-42", Some(alice.id))?;
//! assert_eq!(manager.hybrid().decrypt(bob.id, &package)?, b"secret-42");
//! assert!(manager.hybrid().verify_sender(&package, &alice.signing_key)?);
//!
//! // Or agree on a channel key
//! let initiated = manager.channels().initiate(alice.id, &bob.kem_key)?;
//! let established = manager.channels().accept(bob.id, initiated.channel().clone())?;
//! assert_eq!(initiated.key(), established.key());
//! ```

pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod hybrid;
pub mod identity;
pub mod manager;
pub mod proof;
pub mod store;

// Re-exports
pub use channel::{Channel, ChannelProtocol, ChannelState, EstablishedChannel, InitiatedChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryPolicy, ShieldConfig};
pub use error::{IdentityError, IdentityResult};
pub use hybrid::{EncryptedPackage, HybridCipher};
pub use identity::{Identity, IdentityHandle, IdentityId, IdentityStatus};
pub use manager::{IdentityManager, IdentityManagerBuilder};
pub use proof::SignatureProof;
pub use store::{FileIdentityStore, IdentityStore, InMemoryIdentityStore};
