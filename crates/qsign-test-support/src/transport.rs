//! Routing in-memory transport

use qsign_transport::{Error, HttpResponse, HttpTransport, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// HTTP method of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Method used
    pub method: Method,
    /// Requested URL
    pub url: String,
    /// Content type of the body
    pub content_type: Option<String>,
    /// Request body
    pub body: Vec<u8>,
}

/// Something answering requests for one URL
pub trait Endpoint: Send + Sync + std::fmt::Debug {
    /// Produce the response to `request`
    fn handle(&self, request: &RecordedRequest) -> Result<HttpResponse>;
}

impl Endpoint for HttpResponse {
    fn handle(&self, _request: &RecordedRequest) -> Result<HttpResponse> {
        Ok(self.clone())
    }
}

/// An endpoint whose connection always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct Unreachable;

impl Endpoint for Unreachable {
    fn handle(&self, request: &RecordedRequest) -> Result<HttpResponse> {
        Err(Error::Http(format!("connection to {} refused", request.url)))
    }
}

/// An endpoint that always times out
#[derive(Debug, Clone, Copy, Default)]
pub struct TimesOut;

impl Endpoint for TimesOut {
    fn handle(&self, request: &RecordedRequest) -> Result<HttpResponse> {
        Err(Error::Timeout(request.url.clone()))
    }
}

impl<T: Endpoint + ?Sized> Endpoint for Arc<T> {
    fn handle(&self, request: &RecordedRequest) -> Result<HttpResponse> {
        (**self).handle(request)
    }
}

/// [`HttpTransport`] dispatching on exact URLs and recording every request
///
/// Unknown URLs fail like an unreachable host.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: RwLock<HashMap<String, Arc<dyn Endpoint>>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// A transport without routes
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, builder style
    pub fn with_route(self, url: impl Into<String>, endpoint: impl Endpoint + 'static) -> Self {
        self.route(url, endpoint);
        self
    }

    /// Add or replace a route
    pub fn route(&self, url: impl Into<String>, endpoint: impl Endpoint + 'static) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), Arc::new(endpoint));
    }

    /// Remove a route
    pub fn unroute(&self, url: &str) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of requests sent to `url`
    pub fn count(&self, url: &str) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.url == url)
            .count()
    }

    /// Forget the recorded requests
    pub fn clear_requests(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn dispatch(&self, request: RecordedRequest) -> Result<HttpResponse> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let endpoint = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.url)
            .cloned();
        match endpoint {
            Some(endpoint) => endpoint.handle(&request),
            None => Err(Error::Http(format!("no route to {}", request.url))),
        }
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse> {
        self.dispatch(RecordedRequest {
            method: Method::Get,
            url: url.to_string(),
            content_type: None,
            body: Vec::new(),
        })
    }

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<HttpResponse> {
        self.dispatch(RecordedRequest {
            method: Method::Post,
            url: url.to_string(),
            content_type: Some(content_type.to_string()),
            body,
        })
    }
}
