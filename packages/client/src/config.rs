//! Client configuration.
//!
//! Every field has a default, so a JSON file only needs the keys it changes:
//!
//! ```json
//! { "host": "gateway.example.com", "port": 10000, "api_key": "k-123" }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_VERSION: &str = "v2";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_WRITER_POOL_SIZE: usize = 5;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub verify_ssl_cert: bool,
    /// Gateway API version, e.g. `v2`.
    pub version: String,
    /// Namespace used in paths for API versions other than `v2`.
    pub namespace: String,
    /// Sent as the `X-Continuuity-ApiKey` header when set.
    pub api_key: Option<String>,
    /// Concurrent requests per pooled writer.
    pub writer_pool_size: usize,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Send per-write event headers as `{stream}.{name}`.
    pub prefix_event_headers: bool,
    /// Headers added to every request. Per-request headers override them.
    pub default_headers: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ssl: false,
            verify_ssl_cert: true,
            version: DEFAULT_VERSION.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_key: None,
            writer_pool_size: DEFAULT_WRITER_POOL_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            prefix_event_headers: false,
            default_headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Start a configuration for the gateway at `host:port`.
    pub fn builder(host: impl Into<String>, port: u16) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                host: host.into(),
                port,
                ..Default::default()
            },
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig =
            serde_json::from_str(&contents).map_err(|err| Error::Config {
                message: format!("{}: {}", path.display(), err),
            })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), host = %config.host, port = config.port, "loaded client configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::invalid_argument("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::invalid_argument("port must not be 0"));
        }
        if self.version.trim().is_empty() {
            return Err(Error::invalid_argument("version must not be empty"));
        }
        if self.writer_pool_size == 0 {
            return Err(Error::invalid_argument("writer_pool_size must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::invalid_argument("timeout must be at least 1ms"));
        }
        Ok(())
    }

    /// `http://host:port` or `https://host:port`.
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Path segments every endpoint starts with.
    pub fn base_segments(&self) -> Vec<String> {
        if self.version == DEFAULT_VERSION {
            vec![self.version.clone()]
        } else {
            vec![
                self.version.clone(),
                "namespaces".to_string(),
                self.namespace.clone(),
            ]
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Builder returned by [`ClientConfig::builder`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn ssl(mut self, ssl: bool) -> Self {
        self.config.ssl = ssl;
        self
    }

    pub fn verify_ssl_cert(mut self, verify: bool) -> Self {
        self.config.verify_ssl_cert = verify;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn writer_pool_size(mut self, size: usize) -> Self {
        self.config.writer_pool_size = size;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn prefix_event_headers(mut self, prefix: bool) -> Self {
        self.config.prefix_event_headers = prefix;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ClientConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}
