//! # streamclient-http
//!
//! The HTTP capability the stream client is built on.
//!
//! [`HttpTransport`] executes one [`HttpRequest`] and returns the
//! [`HttpResponse`], whatever its status. Only faults inside the HTTP stack
//! itself (connection refused, malformed header, invalid URL) are reported
//! as [`TransportError`]. Callers decide which statuses count as failures.
//!
//! ```ignore
//! use streamclient_http::{HttpRequest, HttpTransport, ReqwestTransport};
//!
//! let transport = ReqwestTransport::with_default_timeout()?;
//! let response = transport.execute(
//!     &HttpRequest::post("http://localhost:10000/v2/streams/clicks").with_body("hello"),
//! )?;
//! assert!(response.is_success());
//! ```
//!
//! Enable the `mock` feature for [`mock::MockTransport`], an in-memory
//! transport that records requests and replays canned responses.

pub mod error;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::TransportError;
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{HttpRequest, HttpResponse, Method};
