//! Identity context injection for logging
//!
//! This module provides thread-local storage for the identity an operation
//! acts on, so every span opened within a scope carries that identity.

use std::cell::RefCell;
use std::fmt::Display;

use uuid::Uuid;

/// Identity context data stored in thread-local storage
#[derive(Debug, Clone)]
pub struct IdentityContextData {
    /// The identity id as a string
    pub identity_id: String,
    /// Display name, when known
    pub label: Option<String>,
    /// Unique id for this scope
    pub scope_id: Uuid,
}

thread_local! {
    static IDENTITY_CONTEXT: RefCell<Option<IdentityContextData>> = const { RefCell::new(None) };
}

/// RAII guard for identity context
///
/// When this guard is created, it sets the identity context for the current
/// thread. When it's dropped, it restores the previous context (if any).
///
/// # Example
///
/// ```ignore
/// use quantumshield_logging::context::IdentityContextGuard;
///
/// let _guard = IdentityContextGuard::new(&identity_id);
///
/// // Spans opened in this scope carry identity_id
/// tracing::info!("signing payload");
/// ```
pub struct IdentityContextGuard {
    previous: Option<IdentityContextData>,
}

impl IdentityContextGuard {
    /// Set the identity context for the current scope
    pub fn new(identity_id: impl Display) -> Self {
        Self::install(IdentityContextData {
            identity_id: identity_id.to_string(),
            label: None,
            scope_id: Uuid::new_v4(),
        })
    }

    /// Set the identity context together with a display name
    pub fn with_label(identity_id: impl Display, label: impl Into<String>) -> Self {
        Self::install(IdentityContextData {
            identity_id: identity_id.to_string(),
            label: Some(label.into()),
            scope_id: Uuid::new_v4(),
        })
    }

    fn install(data: IdentityContextData) -> Self {
        let previous = IDENTITY_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current identity context (if any)
    pub fn current() -> Option<IdentityContextData> {
        IDENTITY_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current identity id (if set)
    pub fn current_identity_id() -> Option<String> {
        Self::current().map(|ctx| ctx.identity_id)
    }
}

impl Drop for IdentityContextGuard {
    fn drop(&mut self) {
        IDENTITY_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Convenience macro to run a block inside an identity context
///
/// # Example
///
/// ```ignore
/// with_identity_context!(id, {
///     tracing::info!("rotating keys");
/// });
/// ```
#[macro_export]
macro_rules! with_identity_context {
    ($identity:expr, $body:block) => {{
        let _guard = $crate::context::IdentityContextGuard::new($identity);
        $body
    }};
}
