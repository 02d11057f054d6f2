use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use streamclient::{
    AuthProvider, BasicAuthenticationClient, ClientConfig, DeferredState, Error, RequestFailed,
    StaticTokenProvider, StreamClient, WriteProgress,
};
use streamclient_auth::{AccessToken, AuthError};
use streamclient_http::ReqwestTransport;

const WAIT: Duration = Duration::from_secs(5);

fn config_for(server: &MockServer) -> ClientConfig {
    let address = server.address();
    ClientConfig::builder(address.ip().to_string(), address.port())
        .writer_pool_size(2)
        .build()
        .unwrap()
}

async fn mount_stream_info(server: &MockServer, ttl: u64) {
    Mock::given(method("GET"))
        .and(path("/v2/streams/clicks/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "clicks",
            "ttl": ttl
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_stream_lifecycle() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/streams/clicks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v2/streams/clicks/config"))
        .and(body_json(serde_json::json!({"ttl": 3600})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks/truncate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    mount_stream_info(&server, 3600).await;

    let config = config_for(&server);

    let ttl = tokio::task::spawn_blocking(move || {
        let client = StreamClient::new(config).unwrap();
        client.create("clicks").unwrap();
        client.set_ttl("clicks", 3600).unwrap();
        client.truncate("clicks").unwrap();
        client.get_ttl("clicks").unwrap()
    })
    .await
    .unwrap();

    assert_eq!(ttl, 3600);
}

#[tokio::test]
async fn test_lifecycle_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v2/streams/clicks/config"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid ttl"))
        .mount(&server)
        .await;

    let config = config_for(&server);

    let result = tokio::task::spawn_blocking(move || {
        StreamClient::new(config).unwrap().set_ttl("clicks", 0)
    })
    .await
    .unwrap();

    match result {
        Err(Error::RequestFailed(failed)) => {
            assert_eq!(failed, RequestFailed::new(400, "invalid ttl"));
            assert_eq!(failed.reason(), "Bad request");
        }
        other => panic!("expected bad request, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pooled_writer_resolves_and_rejects() {
    let server = MockServer::start().await;
    mount_stream_info(&server, 60).await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks"))
        .and(body_string("good event"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks"))
        .and(body_string("bad event"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let config = config_for(&server);

    let (good, bad, progress) = tokio::task::spawn_blocking(move || {
        let client = StreamClient::new(config).unwrap();
        let writer = client.create_writer("clicks").unwrap();

        let good = writer.write("good event").unwrap();
        let bad = writer.write("bad event").unwrap();

        let good_outcome = good.wait_timeout(WAIT);
        let bad_outcome = bad.wait_timeout(WAIT);
        assert!(writer.close_and_wait(WAIT));
        (good_outcome, bad_outcome, good.progress_history())
    })
    .await
    .unwrap();

    assert_eq!(good, Some(Ok("{}".to_string())));
    assert_eq!(bad, Some(Err(RequestFailed::new(503, "overloaded"))));
    assert_eq!(
        progress.last(),
        Some(&WriteProgress::ResponseReceived { status: 200 })
    );
}

#[tokio::test]
async fn test_writer_sends_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/streams/clicks/info"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ttl": 1})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks"))
        .and(header("Authorization", "Bearer tok"))
        .and(header("X-Continuuity-ApiKey", "key-1"))
        .and(header("X-Event-Kind", "click"))
        .and(header("Content-Type", "text/plain; charset=UTF-8"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let address = *server.address();

    let outcome = tokio::task::spawn_blocking(move || {
        let config = ClientConfig::builder(address.ip().to_string(), address.port())
            .api_key("key-1")
            .build()
            .unwrap();
        let client = StreamClient::new(config)
            .unwrap()
            .with_auth(Arc::new(StaticTokenProvider::bearer("tok")));

        let writer = client.create_sync_writer("clicks").unwrap();
        let headers = HashMap::from([("X-Event-Kind".to_string(), "click".to_string())]);
        writer
            .write_with("event", Default::default(), headers)
            .unwrap()
            .state()
    })
    .await
    .unwrap();

    assert_eq!(outcome, DeferredState::Resolved);
}

#[tokio::test]
async fn test_basic_authentication_flow() {
    let server = MockServer::start().await;
    let token_url = format!("{}/token", server.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"auth_uri": [token_url]})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(header("Authorization", "Basic YWxpY2U6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "issued",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/streams/clicks/info"))
        .and(header("Authorization", "Bearer issued"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ttl": 7})))
        .expect(2)
        .mount(&server)
        .await;

    let address = *server.address();
    let config = config_for(&server);

    let ttls = tokio::task::spawn_blocking(move || {
        let auth = BasicAuthenticationClient::new(ReqwestTransport::with_default_timeout().unwrap());
        auth.set_connection_info(&address.ip().to_string(), address.port(), false)
            .unwrap();
        auth.configure(&HashMap::from([
            (
                "security.auth.client.username".to_string(),
                "alice".to_string(),
            ),
            (
                "security.auth.client.password".to_string(),
                "secret".to_string(),
            ),
        ]))
        .unwrap();

        let client = StreamClient::new(config).unwrap().with_auth(Arc::new(auth));
        (
            client.get_ttl("clicks").unwrap(),
            client.get_ttl("clicks").unwrap(),
        )
    })
    .await
    .unwrap();

    assert_eq!(ttls, (7, 7));
}

#[tokio::test]
async fn test_namespaced_version_paths() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v3/namespaces/sales/streams/orders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let address = *server.address();

    let result = tokio::task::spawn_blocking(move || {
        let config = ClientConfig::builder(address.ip().to_string(), address.port())
            .version("v3")
            .namespace("sales")
            .build()
            .unwrap();
        StreamClient::new(config).unwrap().create("orders")
    })
    .await
    .unwrap();

    assert!(result.is_ok());
}

/// Issues one token, then fails every later request for one.
struct OneShotAuth {
    issued: AtomicUsize,
}

impl AuthProvider for OneShotAuth {
    fn is_auth_enabled(&self) -> Result<bool, AuthError> {
        Ok(true)
    }

    fn access_token(&self) -> Result<AccessToken, AuthError> {
        if self.issued.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(AccessToken::new("once", "Bearer", 3600))
        } else {
            Err(AuthError::UnexpectedResponse {
                message: "token server unavailable".to_string(),
            })
        }
    }

    fn invalidate_token(&self) {}
}

#[tokio::test]
async fn test_pooled_writer_escalates_auth_fault() {
    let server = MockServer::start().await;
    mount_stream_info(&server, 60).await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);

    let (fault, state) = tokio::task::spawn_blocking(move || {
        let auth = OneShotAuth {
            issued: AtomicUsize::new(0),
        };
        let writer = StreamClient::new(config)
            .unwrap()
            .with_auth(Arc::new(auth))
            .create_writer("clicks")
            .unwrap();

        let faults = writer.fatal_channel();
        let handle = writer.write("event").unwrap();
        let fault = faults.recv_timeout(WAIT).unwrap();
        assert!(writer.close_and_wait(WAIT));
        (fault, handle.state())
    })
    .await
    .unwrap();

    assert!(matches!(fault, Error::Auth(AuthError::UnexpectedResponse { .. })));
    assert_eq!(state, DeferredState::Pending);
}

#[tokio::test]
async fn test_send_file_with_prefixed_headers() {
    let server = MockServer::start().await;
    mount_stream_info(&server, 60).await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks"))
        .and(header("Content-Type", "text/csv"))
        .and(body_string("a,b\n1,2\n"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stored"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/streams/clicks"))
        .and(header("clicks.kind", "click"))
        .and(body_string("event"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let address = *server.address();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.csv");
    std::fs::write(&path, "a,b\n1,2\n").unwrap();

    let (file_outcome, event_outcome) = tokio::task::spawn_blocking(move || {
        let config = ClientConfig::builder(address.ip().to_string(), address.port())
            .prefix_event_headers(true)
            .timeout(Duration::from_millis(2500))
            .build()
            .unwrap();
        let writer = StreamClient::new(config)
            .unwrap()
            .create_writer("clicks")
            .unwrap();

        let file = writer.send_file(&path, Some("text/csv")).unwrap();
        let headers = HashMap::from([("kind".to_string(), "click".to_string())]);
        let event = writer
            .write_with("event", Default::default(), headers)
            .unwrap();

        let outcomes = (file.wait_timeout(WAIT), event.wait_timeout(WAIT));
        assert!(writer.close_and_wait(WAIT));
        outcomes
    })
    .await
    .unwrap();

    assert_eq!(file_outcome, Some(Ok("stored".to_string())));
    assert_eq!(event_outcome, Some(Ok(String::new())));
}
