use std::fmt;

use serde::{Deserialize, Serialize};

/// A token issued by the authentication server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub token_type: String,
    /// Lifetime in seconds from the moment it was issued.
    pub expires_in: u64,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, token_type: impl Into<String>, expires_in: u64) -> Self {
        Self {
            value: value.into(),
            token_type: token_type.into(),
            expires_in,
        }
    }

    /// Value of the `Authorization` header carrying this token.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.value)
    }
}

// Keeps token values out of logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A configuration property an authentication client needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub description: String,
    /// Whether the value should be masked when prompted for or displayed.
    pub secret: bool,
}

impl Credential {
    pub fn new(name: impl Into<String>, description: impl Into<String>, secret: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            secret,
        }
    }
}
