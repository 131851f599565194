//! Operator authentication.
//!
//! Participants are anonymous: they join with a display name and the
//! server-issued participant id is their only credential. Operators are
//! different. Creating, running, and deleting rooms requires an
//! [`OperatorCapability`], and the only way a connection obtains one is by
//! presenting a token that an [`Authenticator`] accepts during the
//! handshake.
//!
//! The server ships with [`SharedSecretAuthenticator`]. Deployments that
//! want something else (signed tokens, an auth service) implement the
//! trait themselves.

use std::fmt;

use crate::SessionError;

/// Proof that a connection authenticated as an operator.
///
/// Handlers require a `&OperatorCapability` before touching operator
/// commands, so the check can't be forgotten at a call site.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorCapability {
    issuer: String,
}

impl OperatorCapability {
    /// Issues a capability. Authenticators call this once a token checks
    /// out; `issuer` names the authenticator for logs.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

impl fmt::Debug for OperatorCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCapability")
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Validates an operator token.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use quizroom_session::{Authenticator, OperatorCapability, SessionError};
///
/// /// Grants operator rights to anyone whose token starts with "op-".
/// struct PrefixAuthenticator;
///
/// impl Authenticator for PrefixAuthenticator {
///     async fn authenticate(
///         &self,
///         token: &str,
///     ) -> Result<OperatorCapability, SessionError> {
///         if token.starts_with("op-") {
///             Ok(OperatorCapability::new("prefix"))
///         } else {
///             Err(SessionError::AuthFailed("unknown operator".into()))
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Checks `token` and returns a capability if it grants operator rights.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthFailed`] if the token is rejected.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<OperatorCapability, SessionError>> + Send;
}

/// Accepts exactly one configured secret.
///
/// The comparison touches every byte regardless of where the first
/// mismatch is.
pub struct SharedSecretAuthenticator {
    secret: Vec<u8>,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        if secret.is_empty() {
            tracing::warn!("operator secret is empty; every operator login will be rejected");
        }
        Self {
            secret: secret.into_bytes(),
        }
    }
}

impl fmt::Debug for SharedSecretAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecretAuthenticator")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<OperatorCapability, SessionError> {
        if !self.secret.is_empty() && constant_time_eq(&self.secret, token.as_bytes()) {
            Ok(OperatorCapability::new("shared-secret"))
        } else {
            Err(SessionError::AuthFailed("invalid operator token".into()))
        }
    }
}

fn constant_time_eq(expected: &[u8], given: &[u8]) -> bool {
    // Fold the length difference in so a short token still costs a full pass.
    let mut diff = expected.len() ^ given.len();
    for (i, &b) in expected.iter().enumerate() {
        let g = given.get(i).copied().unwrap_or(0);
        diff |= usize::from(b ^ g);
    }
    diff == 0
}
