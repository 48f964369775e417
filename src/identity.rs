//! Identity context: who is making a request.
//!
//! Credentials are checked by an external identity provider (password
//! hashing, JWT issuance and so on live elsewhere). This module only carries
//! the verified result, an [`Identity`], into the operations that enforce
//! ownership.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PushError, PushResult};

/// Opaque user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a provider-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (no caller).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Authenticated caller handle for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: UserId,
}

impl Identity {
    /// Identity for a user the provider has already verified.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// The caller's user id.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the caller's id, or `Unauthorized` when there is no caller.
    pub fn require(&self) -> PushResult<&UserId> {
        if self.user_id.is_empty() {
            return Err(PushError::unauthorized("caller identity is required"));
        }
        Ok(&self.user_id)
    }
}

/// Source of verified identities (the external identity provider).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer credential into an identity.
    ///
    /// Fails with [`PushError::Unauthorized`] when the credential is unknown.
    async fn authenticate(&self, credential: &str) -> PushResult<Identity>;
}

/// Fixed token → user mapping.
///
/// Useful for embedding the service behind a gateway that has already done
/// the real authentication, and for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, UserId>,
}

impl StaticIdentityProvider {
    /// Empty provider; every credential is rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user.
    pub fn with_token(mut self, token: impl Into<String>, user: impl Into<UserId>) -> Self {
        self.tokens.insert(token.into(), user.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, credential: &str) -> PushResult<Identity> {
        let token = credential
            .strip_prefix("Bearer ")
            .unwrap_or(credential)
            .trim();
        self.tokens
            .get(token)
            .map(|user| Identity::new(user.clone()))
            .ok_or_else(|| PushError::unauthorized("unknown or expired credential"))
    }
}
