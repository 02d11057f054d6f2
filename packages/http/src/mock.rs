//! Mock HTTP transport for testing.
//!
//! Returns predefined responses keyed by method and URL, records every
//! request, and can inject faults and latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::HttpTransport;
use crate::types::{HttpRequest, HttpResponse, Method};

type RouteKey = (Method, String);

/// An in-memory transport. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Responses keyed by method and URL.
    responses: Arc<Mutex<HashMap<RouteKey, HttpResponse>>>,
    /// Default response when no route matches.
    default_response: Arc<Mutex<Option<HttpResponse>>>,
    /// Faults keyed by method and URL.
    faults: Arc<Mutex<HashMap<RouteKey, String>>>,
    /// Fault returned for every request, if set.
    fail_all: Arc<Mutex<Option<String>>>,
    /// Sleep before answering each request.
    delay: Arc<Mutex<Option<Duration>>>,
    recorded_requests: Arc<Mutex<Vec<HttpRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a specific method and URL.
    pub fn with_response(
        self,
        method: Method,
        url: impl Into<String>,
        response: HttpResponse,
    ) -> Self {
        self.set_response(method, url, response);
        self
    }

    /// Set a default response when no route matches.
    pub fn with_default_response(self, response: HttpResponse) -> Self {
        *self.default_response.lock().unwrap() = Some(response);
        self
    }

    /// Fail requests to one route with a transport fault.
    pub fn with_fault(self, method: Method, url: impl Into<String>, message: &str) -> Self {
        self.faults
            .lock()
            .unwrap()
            .insert((method, url.into()), message.to_string());
        self
    }

    /// Configure to fail all requests with a transport fault.
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        *self.fail_all.lock().unwrap() = Some(message.into());
        self
    }

    /// Sleep for `delay` inside every request.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Replace the response for a route on a shared transport.
    pub fn set_response(&self, method: Method, url: impl Into<String>, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert((method, url.into()), response);
    }

    /// Get all recorded requests.
    pub fn recorded_requests(&self) -> Vec<HttpRequest> {
        self.recorded_requests.lock().unwrap().clone()
    }

    /// Recorded requests for one route.
    pub fn requests_to(&self, method: Method, url: &str) -> Vec<HttpRequest> {
        self.recorded_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .cloned()
            .collect()
    }

    pub fn clear_recorded(&self) {
        self.recorded_requests.lock().unwrap().clear();
    }

    /// Highest number of requests observed executing at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Create a 200 response with a JSON body.
    pub fn success_response(body: serde_json::Value) -> HttpResponse {
        HttpResponse::new(200, body.to_string())
    }

    /// Create a response with a plain body.
    pub fn error_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(status, body)
    }

    /// Create a 404 Not Found response.
    pub fn not_found() -> HttpResponse {
        Self::error_response(404, "Not Found")
    }

    fn answer(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if let Some(message) = self.fail_all.lock().unwrap().clone() {
            return Err(TransportError::Other { message });
        }

        let key = (request.method, request.url.clone());
        if let Some(message) = self.faults.lock().unwrap().get(&key) {
            return Err(TransportError::Other {
                message: message.clone(),
            });
        }

        if let Some(response) = self.responses.lock().unwrap().get(&key) {
            return Ok(response.clone());
        }

        if let Some(ref response) = *self.default_response.lock().unwrap() {
            return Ok(response.clone());
        }

        Ok(Self::not_found())
    }
}

impl HttpTransport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.recorded_requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let result = self.answer(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
