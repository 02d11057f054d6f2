use streamclient_http::TransportError;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Authentication is disabled in the gateway server")]
    Disabled,

    #[error("Authentication client is not configured: {message}")]
    NotConfigured { message: String },

    #[error("The {name} property cannot be empty")]
    MissingProperty { name: String },

    #[error("{0} is already configured")]
    AlreadyConfigured(&'static str),

    #[error("Gateway returned an empty list of authentication servers")]
    EmptyAuthServerList,

    #[error("Unexpected response from the authentication server: {message}")]
    UnexpectedResponse { message: String },

    #[error("Authentication request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
