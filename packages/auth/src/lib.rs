//! # streamclient-auth
//!
//! Access tokens for requests to the gateway.
//!
//! An [`AuthProvider`] answers two questions for the client: is
//! authentication enabled on this gateway, and which token should be sent.
//! The client turns the token into an `Authorization: {type} {value}` header.
//!
//! - [`StaticTokenProvider`] hands out a token the caller already has.
//! - [`BasicAuthenticationClient`] discovers the authentication server from
//!   the gateway and exchanges a username and password for a token, caching
//!   it until shortly before it expires.

pub mod basic;
pub mod error;
pub mod provider;
pub mod token;

pub use basic::BasicAuthenticationClient;
pub use error::AuthError;
pub use provider::{AuthProvider, StaticTokenProvider};
pub use token::{AccessToken, Credential};
