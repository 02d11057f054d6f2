//! Username/password authentication against the gateway's token server.
//!
//! Flow:
//! 1. `GET {gateway}`. A `401` whose body is `{"auth_uri": [...]}` means
//!    authentication is enabled and names the token server. Any other
//!    status means it is disabled.
//! 2. `GET {auth_uri}` with `Authorization: Basic base64(user:pass)`. A `200`
//!    body carries `access_token`, `token_type` and `expires_in`.
//! 3. The token is reused until five seconds before it expires.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use base64::Engine;
use serde::Deserialize;
use streamclient_http::{HttpRequest, HttpTransport};

use crate::error::AuthError;
use crate::provider::AuthProvider;
use crate::token::{AccessToken, Credential};

pub const USERNAME_PROPERTY: &str = "security.auth.client.username";
pub const PASSWORD_PROPERTY: &str = "security.auth.client.password";

/// Margin subtracted from a token's lifetime so it is never sent stale.
const SPARE_TIME: Duration = Duration::from_secs(5);

const UNAUTHORIZED: u16 = 401;
const OK: u16 = 200;

#[derive(Deserialize)]
struct AuthUriList {
    #[serde(default)]
    auth_uri: Vec<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<serde_json::Value>,
}

struct CachedToken {
    token: AccessToken,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    /// `Some(None)` once discovery found authentication disabled.
    auth_url: Option<Option<String>>,
    token: Option<CachedToken>,
}

/// Fetches tokens from the gateway's authentication server using basic
/// credentials.
///
/// Connection info and credentials can each be set once.
pub struct BasicAuthenticationClient<T> {
    transport: T,
    state: Mutex<State>,
}

impl<T: HttpTransport> BasicAuthenticationClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point the client at the gateway. Fails if already set.
    pub fn set_connection_info(&self, host: &str, port: u16, ssl: bool) -> Result<(), AuthError> {
        let mut state = self.lock();
        if state.base_url.is_some() {
            return Err(AuthError::AlreadyConfigured("connection info"));
        }
        let scheme = if ssl { "https" } else { "http" };
        state.base_url = Some(format!("{scheme}://{host}:{port}"));
        Ok(())
    }

    /// Read the username and password properties. Fails if already set.
    pub fn configure(&self, properties: &HashMap<String, String>) -> Result<(), AuthError> {
        let mut state = self.lock();
        if state.username.is_some() || state.password.is_some() {
            return Err(AuthError::AlreadyConfigured("client"));
        }

        let username = required_property(properties, USERNAME_PROPERTY)?;
        let password = required_property(properties, PASSWORD_PROPERTY)?;
        state.username = Some(username);
        state.password = Some(password);
        Ok(())
    }

    /// Properties [`configure`](Self::configure) expects.
    pub fn required_credentials(&self) -> Vec<Credential> {
        vec![
            Credential::new(USERNAME_PROPERTY, "Username for basic authentication.", false),
            Credential::new(PASSWORD_PROPERTY, "Password for basic authentication.", true),
        ]
    }

    /// The token server found by discovery, if any.
    pub fn auth_url(&self) -> Option<String> {
        self.lock().auth_url.clone().flatten()
    }

    /// Find the token server, or `None` if authentication is disabled.
    ///
    /// The lock is not held while the gateway is queried. Concurrent first
    /// calls may each query it; the first answer stored wins.
    fn discover(&self) -> Result<Option<String>, AuthError> {
        let base_url = {
            let state = self.lock();
            if let Some(cached) = &state.auth_url {
                return Ok(cached.clone());
            }
            state
                .base_url
                .clone()
                .ok_or_else(|| AuthError::NotConfigured {
                    message: "connection info is not set".to_string(),
                })?
        };

        tracing::debug!(gateway = %base_url, "discovering authentication server");
        let response = self.transport.execute(&HttpRequest::get(base_url))?;

        let auth_url = if response.status == UNAUTHORIZED {
            let list: AuthUriList = response.json()?;
            let first = list
                .auth_uri
                .into_iter()
                .next()
                .ok_or(AuthError::EmptyAuthServerList)?;
            Some(first)
        } else {
            None
        };

        Ok(self.lock().auth_url.get_or_insert(auth_url).clone())
    }

    fn fetch_token(
        &self,
        auth_url: &str,
        username: &str,
        password: &str,
    ) -> Result<AccessToken, AuthError> {
        tracing::debug!(auth_url, "fetching access token");

        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        let request =
            HttpRequest::get(auth_url).with_header("Authorization", format!("Basic {encoded}"));
        let response = self.transport.execute(&request)?;

        if response.status != OK {
            return Err(AuthError::RequestFailed {
                status: response.status,
                body: response.body_text,
            });
        }

        let body: TokenResponse = response.json()?;
        let (Some(value), Some(token_type), Some(expires_in)) =
            (body.access_token, body.token_type, body.expires_in)
        else {
            return Err(unexpected("missing access_token, token_type or expires_in"));
        };

        Ok(AccessToken::new(value, token_type, parse_expires_in(&expires_in)?))
    }
}

impl<T: HttpTransport> AuthProvider for BasicAuthenticationClient<T> {
    fn is_auth_enabled(&self) -> Result<bool, AuthError> {
        Ok(self.discover()?.is_some())
    }

    /// Return the cached token, fetching a new one once it is within five
    /// seconds of expiry.
    ///
    /// Token requests run without holding the client's lock, so a slow
    /// token server blocks only the callers that need a fresh token.
    fn access_token(&self) -> Result<AccessToken, AuthError> {
        let auth_url = self.discover()?.ok_or(AuthError::Disabled)?;

        let (username, password) = {
            let state = self.lock();
            if let Some(cached) = &state.token {
                if Instant::now() < cached.expires_at {
                    return Ok(cached.token.clone());
                }
            }
            match (&state.username, &state.password) {
                (Some(username), Some(password)) => (username.clone(), password.clone()),
                _ => {
                    return Err(AuthError::NotConfigured {
                        message: "credentials are not set".to_string(),
                    })
                }
            }
        };

        let requested_at = Instant::now();
        let token = self.fetch_token(&auth_url, &username, &password)?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(SPARE_TIME);
        let expires_at = requested_at
            .checked_add(lifetime)
            .unwrap_or(requested_at);

        tracing::debug!(expires_in = token.expires_in, "received access token");
        self.lock().token = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    fn invalidate_token(&self) {
        self.lock().token = None;
    }
}

fn required_property(
    properties: &HashMap<String, String>,
    name: &str,
) -> Result<String, AuthError> {
    match properties.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(AuthError::MissingProperty {
            name: name.to_string(),
        }),
    }
}

fn parse_expires_in(value: &serde_json::Value) -> Result<u64, AuthError> {
    let seconds = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    seconds.ok_or_else(|| unexpected("expires_in is not a non-negative integer"))
}

fn unexpected(message: &str) -> AuthError {
    AuthError::UnexpectedResponse {
        message: message.to_string(),
    }
}
