use std::sync::Arc;

use serde::Deserialize;
use streamclient_auth::AuthProvider;
use streamclient_http::{HttpRequest, HttpTransport, ReqwestTransport};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::sync_writer::SyncStreamWriter;
use crate::writer::StreamWriter;

#[derive(Deserialize)]
struct StreamInfo {
    ttl: u64,
}

/// Stream lifecycle calls and writer construction.
#[derive(Debug, Clone)]
pub struct StreamClient {
    config: ClientConfig,
    gateway: Gateway,
}

impl StreamClient {
    /// Connect over HTTP using the configured timeout and certificate policy.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        config.validate()?;
        let transport = ReqwestTransport::with_options(config.timeout(), config.verify_ssl_cert)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let gateway = Gateway::new(&config, transport)?;
        Ok(Self { config, gateway })
    }

    /// Authenticate every request, including those made by writers created
    /// afterwards.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.gateway = self.gateway.with_auth(auth);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Create `stream`. Creating an existing stream is not an error.
    pub fn create(&self, stream: &str) -> Result<(), Error> {
        let request = HttpRequest::put(self.gateway.stream_url(check_stream(stream)?)?);
        self.send(request, "create")?;
        Ok(())
    }

    /// Set the time-to-live of events in `stream`, in seconds.
    pub fn set_ttl(&self, stream: &str, ttl: u64) -> Result<(), Error> {
        let request = HttpRequest::put(self.gateway.config_url(check_stream(stream)?)?)
            .with_json(&serde_json::json!({ "ttl": ttl }))?;
        self.send(request, "set ttl")?;
        Ok(())
    }

    /// Time-to-live of events in `stream`, in seconds.
    pub fn get_ttl(&self, stream: &str) -> Result<u64, Error> {
        let request = HttpRequest::get(self.gateway.info_url(check_stream(stream)?)?);
        let info: StreamInfo = serde_json::from_str(&self.send(request, "get ttl")?)?;
        Ok(info.ttl)
    }

    /// Delete every event in `stream`.
    pub fn truncate(&self, stream: &str) -> Result<(), Error> {
        let request = HttpRequest::post(self.gateway.truncate_url(check_stream(stream)?)?);
        self.send(request, "truncate")?;
        Ok(())
    }

    /// Create a pooled writer with `writer_pool_size` workers.
    ///
    /// Fails if the stream does not exist.
    pub fn create_writer(&self, stream: &str) -> Result<StreamWriter, Error> {
        self.get_ttl(stream)?;
        StreamWriter::new(
            stream,
            self.gateway.clone(),
            self.config.writer_pool_size,
            self.config.prefix_event_headers,
        )
    }

    /// Create a writer that sends on the calling thread.
    ///
    /// Fails if the stream does not exist.
    pub fn create_sync_writer(&self, stream: &str) -> Result<SyncStreamWriter, Error> {
        self.get_ttl(stream)?;
        SyncStreamWriter::new(
            stream,
            self.gateway.clone(),
            self.config.prefix_event_headers,
        )
    }

    /// Send a lifecycle request and return the body of a `200` response.
    fn send(&self, request: HttpRequest, operation: &str) -> Result<String, Error> {
        let outcome = self.gateway.request_deferred(request)?.wait();
        if let Err(failed) = &outcome {
            tracing::debug!(operation, status = failed.status, "stream lifecycle request failed");
        }
        Ok(outcome?)
    }
}

fn check_stream(stream: &str) -> Result<&str, Error> {
    if stream.is_empty() {
        return Err(Error::invalid_argument("stream id must not be empty"));
    }
    Ok(stream)
}
