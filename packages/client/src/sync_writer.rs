use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::charset::Charset;
use crate::error::Error;
use crate::gateway::{merge_headers, Gateway};
use crate::writer::{
    event_headers, event_request, file_event, settle, text_headers, WriteHandle, WriteProgress,
};

/// Writes events on the calling thread.
///
/// Each write blocks until the gateway answers and returns a handle that is
/// already settled. Transport faults are returned directly as `Err`.
#[derive(Debug, Clone)]
pub struct SyncStreamWriter {
    stream: String,
    url: String,
    gateway: Arc<Gateway>,
    prefix_headers: bool,
}

impl SyncStreamWriter {
    pub(crate) fn new(stream: &str, gateway: Gateway, prefix_headers: bool) -> Result<Self, Error> {
        Ok(Self {
            stream: stream.to_string(),
            url: gateway.stream_url(stream)?,
            gateway: Arc::new(gateway),
            prefix_headers,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn write(&self, body: &str) -> Result<WriteHandle, Error> {
        self.write_with(body, Charset::Utf8, HashMap::new())
    }

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
    pub fn send_file(
        &self,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<WriteHandle, Error> {
        let (body, headers) = file_event(path.as_ref(), content_type)?;
        self.write_bytes(body, headers)
    }

    pub fn write_bytes(
        &self,
        body: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<WriteHandle, Error> {
        let request = event_request(&self.url, body, headers)?;
        let handle = WriteHandle::new();

        handle.notify(WriteProgress::Started);
        handle.notify(WriteProgress::Sending);
        let response = self.gateway.execute(request)?;
        settle(&handle, &self.stream, response);

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::RequestFailed;
    use std::sync::Mutex;
    use streamclient_deferred::DeferredState;
    use streamclient_http::mock::MockTransport;
    use streamclient_http::{HttpResponse, Method};

    const STREAM_URL: &str = "http://gateway:10000/v2/streams/clicks";

    fn writer(transport: &MockTransport) -> SyncStreamWriter {
        let config = ClientConfig::builder("gateway", 10000).build().unwrap();
        let gateway = Gateway::new(&config, Arc::new(transport.clone())).unwrap();
        SyncStreamWriter::new("clicks", gateway, false).unwrap()
    }

    #[test]
    fn handle_is_settled_on_return() {
        let transport = MockTransport::new()
            .with_response(Method::POST, STREAM_URL, HttpResponse::new(200, "{}"));
        let handle = writer(&transport).write("event").unwrap();

        assert_eq!(handle.state(), DeferredState::Resolved);

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        handle.on_success(move |body| *sink.lock().unwrap() = Some(body.clone()));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn failed_status_rejects() {
        let transport = MockTransport::new()
            .with_response(Method::POST, STREAM_URL, HttpResponse::new(500, "boom"));
        let handle = writer(&transport).write("event").unwrap();

        assert_eq!(handle.wait(), Err(RequestFailed::new(500, "boom")));
        assert_eq!(
            handle.progress_history(),
            vec![
                WriteProgress::Started,
                WriteProgress::Sending,
                WriteProgress::ResponseReceived { status: 500 },
            ]
        );
    }

    #[test]
    fn transport_fault_is_returned_directly() {
        let transport = MockTransport::new().fail_with("connection refused");
        assert!(matches!(
            writer(&transport).write("event"),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn send_file_settles_before_returning() {
        let transport = MockTransport::new()
            .with_response(Method::POST, STREAM_URL, HttpResponse::new(200, "{}"));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, r#"{"clicks": 3}"#).unwrap();

        let handle = writer(&transport)
            .send_file(&path, Some("application/json"))
            .unwrap();
        assert_eq!(handle.state(), DeferredState::Resolved);

        let sent = &transport.recorded_requests()[0];
        assert_eq!(&sent.body[..], br#"{"clicks": 3}"#);
        assert_eq!(sent.header("content-type"), Some("application/json"));

        assert!(matches!(
            writer(&transport).send_file(dir.path().join("missing"), None),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn empty_body_is_invalid() {
        let transport = MockTransport::new();
        assert!(matches!(
            writer(&transport).write(""),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(transport.recorded_requests().is_empty());
    }
}
