use std::sync::Arc;

use crate::error::AuthError;
use crate::token::AccessToken;

/// Source of access tokens for gateway requests.
pub trait AuthProvider: Send + Sync {
    /// Whether the gateway requires a token. May contact the gateway.
    fn is_auth_enabled(&self) -> Result<bool, AuthError>;

    /// A currently valid token. Fails with [`AuthError::Disabled`] when
    /// authentication is off.
    fn access_token(&self) -> Result<AccessToken, AuthError>;

    /// Forget any cached token so the next call fetches a fresh one.
    fn invalidate_token(&self);
}

impl<P: AuthProvider + ?Sized> AuthProvider for Arc<P> {
    fn is_auth_enabled(&self) -> Result<bool, AuthError> {
        (**self).is_auth_enabled()
    }

    fn access_token(&self) -> Result<AccessToken, AuthError> {
        (**self).access_token()
    }

    fn invalidate_token(&self) {
        (**self).invalidate_token()
    }
}

/// Always enabled; always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    /// A `Bearer` token that never expires.
    pub fn bearer(value: impl Into<String>) -> Self {
        Self::new(AccessToken::new(value, "Bearer", u64::MAX))
    }

    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

impl AuthProvider for StaticTokenProvider {
    fn is_auth_enabled(&self) -> Result<bool, AuthError> {
        Ok(true)
    }

    fn access_token(&self) -> Result<AccessToken, AuthError> {
        Ok(self.token.clone())
    }

    fn invalidate_token(&self) {}
}
