use std::fmt;

use streamclient_auth::AuthError;
use streamclient_executor::ExecutorError;
use streamclient_http::TransportError;

/// A gateway answered with a status other than `200 OK`.
///
/// This is the rejection reason of every write handle and the only error
/// callers are expected to handle per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailed {
    pub status: u16,
    pub body: String,
}

impl RequestFailed {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Human-readable explanation of the status.
    pub fn reason(&self) -> &'static str {
        match self.status {
            400 => "Bad request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not found",
            405 => "Method not allowed",
            406 => "Not acceptable",
            409 => "Conflict",
            500 => "Internal server error",
            _ => "Operation is not supported by gateway server",
        }
    }
}

impl fmt::Display for RequestFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.reason(), self.status)?;
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

impl std::error::Error for RequestFailed {}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Request failed: {0}")]
    RequestFailed(#[from] RequestFailed),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_reason_per_status() {
        assert_eq!(RequestFailed::new(404, "").reason(), "Not found");
        assert_eq!(RequestFailed::new(409, "").reason(), "Conflict");
        assert_eq!(RequestFailed::new(500, "").reason(), "Internal server error");
        assert_eq!(
            RequestFailed::new(502, "").reason(),
            "Operation is not supported by gateway server"
        );
    }

    #[test]
    fn request_failed_display_includes_body() {
        assert_eq!(
            RequestFailed::new(400, "bad ttl").to_string(),
            "Bad request (status 400): bad ttl"
        );
        assert_eq!(
            RequestFailed::new(401, "").to_string(),
            "Unauthorized (status 401)"
        );
    }

    #[test]
    fn lower_layer_errors_convert() {
        let err: Error = ExecutorError::Shutdown.into();
        assert!(matches!(err, Error::Executor(ExecutorError::Shutdown)));

        let err: Error = RequestFailed::new(404, "").into();
        assert!(err.to_string().contains("Not found"));
    }
}
