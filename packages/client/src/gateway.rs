//! Request plumbing shared by the stream client and its writers.
//!
//! A [`Gateway`] knows where the gateway lives and which headers every
//! request carries. It turns relative endpoints into URLs, stamps
//! authentication and API-key headers, and hands requests to the transport.

use std::collections::HashMap;
use std::sync::Arc;

use streamclient_auth::AuthProvider;
use streamclient_deferred::Deferred;
use streamclient_http::{HttpRequest, HttpResponse, HttpTransport};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, RequestFailed};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const API_KEY_HEADER: &str = "X-Continuuity-ApiKey";

const OK: u16 = 200;
const UNAUTHORIZED: u16 = 401;

/// Merge two header maps. Entries in `overrides` win, and header names
/// compare ignoring ASCII case.
pub fn merge_headers(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (name, value) in overrides {
        set_header(&mut merged, name, value.clone());
    }
    merged
}

/// Insert a header, replacing any existing entry regardless of case.
fn set_header(headers: &mut HashMap<String, String>, name: &str, value: String) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

#[derive(Clone)]
pub struct Gateway {
    base_url: Url,
    base_segments: Vec<String>,
    api_key: Option<String>,
    default_headers: HashMap<String, String>,
    transport: Arc<dyn HttpTransport>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl Gateway {
    pub fn new(config: &ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, Error> {
        Ok(Self {
            base_url: Url::parse(&config.base_url())?,
            base_segments: config.base_segments(),
            api_key: config.api_key.clone(),
            default_headers: config.default_headers.clone(),
            transport,
            auth: None,
        })
    }

    /// Attach tokens from `auth` to every request while it reports
    /// authentication as enabled.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// `http(s)://host:port` without a trailing path.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Absolute URL for the given path segments below the versioned base path.
    ///
    /// Segments are percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<String, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config {
                message: format!("{} cannot be used as a base URL", self.base_url),
            })?
            .clear()
            .extend(self.base_segments.iter().map(String::as_str))
            .extend(segments);
        Ok(url.into())
    }

    /// `{base}/streams/{stream}`: create (PUT) and event ingestion (POST).
    pub fn stream_url(&self, stream: &str) -> Result<String, Error> {
        self.url(&["streams", stream])
    }

    pub fn config_url(&self, stream: &str) -> Result<String, Error> {
        self.url(&["streams", stream, "config"])
    }

    pub fn info_url(&self, stream: &str) -> Result<String, Error> {
        self.url(&["streams", stream, "info"])
    }

    pub fn truncate_url(&self, stream: &str) -> Result<String, Error> {
        self.url(&["streams", stream, "truncate"])
    }

    /// Send `request` with default, authentication and API-key headers.
    ///
    /// Any status is returned as a response. Only transport and
    /// authentication faults are errors.
    pub fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse, Error> {
        request.headers = merge_headers(&self.default_headers, &request.headers);

        if let Some(auth) = &self.auth {
            if auth.is_auth_enabled()? {
                let token = auth.access_token()?;
                set_header(&mut request.headers, AUTHORIZATION_HEADER, token.header_value());
            }
        }
        if let Some(api_key) = &self.api_key {
            set_header(&mut request.headers, API_KEY_HEADER, api_key.clone());
        }

        tracing::debug!(method = %request.method, url = %request.url, "executing gateway request");
        let response = self.transport.execute(&request)?;
        tracing::debug!(method = %request.method, url = %request.url, status = response.status, "gateway responded");

        if response.status == UNAUTHORIZED {
            if let Some(auth) = &self.auth {
                auth.invalidate_token();
            }
        }

        Ok(response)
    }

    /// Accept `200 OK`; anything else becomes [`RequestFailed`].
    pub fn check_response(response: HttpResponse) -> Result<HttpResponse, RequestFailed> {
        if response.status == OK {
            Ok(response)
        } else {
            Err(RequestFailed::new(response.status, response.body_text))
        }
    }

    /// Execute `request` and return its outcome as an already-settled
    /// deferred value: resolved with the body on `200`, rejected otherwise.
    pub fn request_deferred(
        &self,
        request: HttpRequest,
    ) -> Result<Deferred<String, RequestFailed>, Error> {
        let response = self.execute(request)?;
        Ok(match Self::check_response(response) {
            Ok(response) => Deferred::resolved(response.body_text),
            Err(failed) => Deferred::rejected(failed),
        })
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url.as_str())
            .field("base_segments", &self.base_segments)
            .field("auth", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}
