//! Pooled stream writer.
//!
//! Each write is one job on the writer's own [`BoundedExecutor`]. The job
//! POSTs the event and settles the returned [`WriteHandle`]:
//!
//! - `200` resolves it with the response body,
//! - any other status rejects it with [`RequestFailed`],
//! - a transport or authentication fault leaves it pending and is sent to
//!   the writer's fatal-error handler instead.
//!
//! [`StreamWriter::send_file`] sends a whole file as one event through the
//! same path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use streamclient_deferred::Deferred;
use streamclient_executor::BoundedExecutor;
use streamclient_http::{HttpRequest, HttpResponse};

use crate::charset::Charset;
use crate::error::{Error, RequestFailed};
use crate::gateway::{merge_headers, Gateway};

/// Progress reported on a [`WriteHandle`] while the write is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// A worker picked up the write.
    Started,
    /// The request is being sent.
    Sending,
    /// The gateway answered.
    ResponseReceived { status: u16 },
}

/// Outcome of one write: the response body, or the failed status.
pub type WriteHandle = Deferred<String, RequestFailed, WriteProgress>;

/// Receives faults that are not HTTP-level failures.
pub type FatalErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

type SharedHandler = Arc<Mutex<Option<FatalErrorHandler>>>;

/// Content type sent with string bodies.
pub(crate) fn text_headers(charset: Charset) -> HashMap<String, String> {
    HashMap::from([(
        "Content-Type".to_string(),
        format!("text/plain; charset={}", charset.name()),
    )])
}

/// Content type sent with files when the caller names none.
pub(crate) const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Caller headers for one event, renamed to `{stream}.{name}` when `prefix`
/// is set.
pub(crate) fn event_headers(
    stream: &str,
    headers: HashMap<String, String>,
    prefix: bool,
) -> HashMap<String, String> {
    if !prefix {
        return headers;
    }
    headers
        .into_iter()
        .map(|(name, value)| (format!("{stream}.{name}"), value))
        .collect()
}

/// Read `path` as one event body with its `Content-Type` header.
pub(crate) fn file_event(
    path: &Path,
    content_type: Option<&str>,
) -> Result<(Bytes, HashMap<String, String>), Error> {
    let body = std::fs::read(path)?;
    if body.is_empty() {
        return Err(Error::invalid_argument(format!(
            "{} is empty",
            path.display()
        )));
    }
    let headers = HashMap::from([(
        "Content-Type".to_string(),
        content_type.unwrap_or(DEFAULT_FILE_CONTENT_TYPE).to_string(),
    )]);
    Ok((Bytes::from(body), headers))
}

/// Build the ingestion request, rejecting empty bodies.
pub(crate) fn event_request(
    url: &str,
    body: Bytes,
    headers: HashMap<String, String>,
) -> Result<HttpRequest, Error> {
    if body.is_empty() {
        return Err(Error::invalid_argument("event body must not be empty"));
    }
    Ok(HttpRequest::post(url).with_body(body).with_headers(headers))
}

/// Settle `handle` from a gateway response.
pub(crate) fn settle(handle: &WriteHandle, stream: &str, response: HttpResponse) {
    let status = response.status;
    handle.notify(WriteProgress::ResponseReceived { status });
    match Gateway::check_response(response) {
        Ok(response) => {
            tracing::debug!(stream, status, "event written");
            handle.resolve(response.body_text);
        }
        Err(failed) => {
            tracing::debug!(stream, status, "event rejected by gateway");
            handle.reject(failed);
        }
    }
}

/// Writes events to one stream through a fixed pool of workers.
///
/// `write` never blocks on the network. At most `writer_pool_size` requests
/// are in flight; further writes queue and start in submission order.
pub struct StreamWriter {
    stream: String,
    url: String,
    gateway: Arc<Gateway>,
    executor: BoundedExecutor,
    fatal_handler: SharedHandler,
    prefix_headers: bool,
}

impl StreamWriter {
    pub(crate) fn new(
        stream: &str,
        gateway: Gateway,
        pool_size: usize,
        prefix_headers: bool,
    ) -> Result<Self, Error> {
        let url = gateway.stream_url(stream)?;
        let executor = BoundedExecutor::with_name(pool_size, format!("stream-writer-{stream}"))?;

        tracing::debug!(stream, pool_size, "created stream writer");

        Ok(Self {
            stream: stream.to_string(),
            url,
            gateway: Arc::new(gateway),
            executor,
            fatal_handler: Arc::new(Mutex::new(None)),
            prefix_headers,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Route fatal faults to `handler`, replacing any previous handler.
    ///
    /// Applies to writes already queued. Without a handler, faults are
    /// logged at error level.
    pub fn on_fatal_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        *self
            .fatal_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
        self
    }

    /// Install a handler that forwards fatal faults to the returned channel.
    pub fn fatal_channel(&self) -> mpsc::Receiver<Error> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        self.on_fatal_error(move |error| {
            // The receiver may be gone; the fault is then dropped.
            let _ = tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(error);
        });
        rx
    }

    /// Write a UTF-8 event with no extra headers.
    pub fn write(&self, body: &str) -> Result<WriteHandle, Error> {
        self.write_with(body, Charset::Utf8, HashMap::new())
    }

    /// Write a string event encoded as `charset`, with extra headers.
    ///
    /// With `prefix_event_headers` configured, each extra header is sent as
    /// `{stream}.{name}`.
    pub fn write_with(
        &self,
        body: &str,
        charset: Charset,
        headers: HashMap<String, String>,
    ) -> Result<WriteHandle, Error> {
        let encoded = charset.encode(body)?;
        let headers = event_headers(&self.stream, headers, self.prefix_headers);
        self.write_bytes(encoded, merge_headers(&text_headers(charset), &headers))
    }

    /// Send the contents of the file at `path` as one event.
    ///
    /// The file is read before this returns, so a missing or empty file
    /// fails immediately. `content_type` defaults to
    /// `application/octet-stream`.
    pub fn send_file(
        &self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<WriteHandle, Error> {
        let (body, headers) = file_event(path.as_ref(), content_type)?;
        self.write_bytes(body, headers)
    }

    /// Write a raw event. `headers` are sent as given.
    ///
    /// Fails immediately for an empty body or a closed writer; otherwise
    /// returns a pending handle.
    pub fn write_bytes(
        &self,
        body: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<WriteHandle, Error> {
        let request = event_request(&self.url, body, headers)?;
        let handle = WriteHandle::new();

        let job_handle = handle.clone();
        let gateway = Arc::clone(&self.gateway);
        let fatal_handler = Arc::clone(&self.fatal_handler);
        let stream = self.stream.clone();

        self.executor.submit(move || {
            job_handle.notify(WriteProgress::Started);
            job_handle.notify(WriteProgress::Sending);
            match gateway.execute(request) {
                Ok(response) => settle(&job_handle, &stream, response),
                Err(error) => escalate(&fatal_handler, &stream, error),
            }
        })?;

        Ok(handle)
    }

    /// Stop accepting writes. Queued and in-flight writes still complete.
    pub fn close(&self) {
        tracing::debug!(stream = %self.stream, "closing stream writer");
        self.executor.shutdown();
    }

    /// Close, then wait up to `timeout` for outstanding writes.
    ///
    /// Returns `false` if writes were still running at the deadline.
    pub fn close_and_wait(&self, timeout: Duration) -> bool {
        self.close();
        self.executor.await_termination(timeout)
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_shutdown()
    }

    /// Writes currently executing or queued.
    pub fn pending_writes(&self) -> usize {
        self.executor.active_count() + self.executor.queued_count()
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("stream", &self.stream)
            .field("url", &self.url)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

fn escalate(handler: &Mutex<Option<FatalErrorHandler>>, stream: &str, error: Error) {
    let handler = handler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    match handler {
        Some(handler) => handler(error),
        None => tracing::error!(stream, error = %error, "fatal fault while writing event"),
    }
}
