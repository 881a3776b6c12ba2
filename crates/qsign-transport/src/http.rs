//! HTTP transport trait and its reqwest implementation

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// A response from a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the Content-Type header, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response with the given content type and body
    pub fn ok(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.into()),
            body,
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Return the body, or a [`Error::Status`] for non-success responses
    pub fn into_success_body(self, url: &str) -> Result<Vec<u8>> {
        if !self.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: self.status,
            });
        }
        Ok(self.body)
    }
}

/// Blocking HTTP operations used by the protocol clients
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// GET `url`
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;

    /// POST `body` to `url` with the given content type
    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        (**self).get(url, timeout)
    }

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        (**self).post(url, content_type, body, timeout)
    }
}

/// [`HttpTransport`] over a blocking reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("qsign/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }

    fn execute(&self, url: &str, request: reqwest::blocking::RequestBuilder) -> Result<HttpResponse> {
        let response = request.send().map_err(|e| map_error(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().map_err(|e| map_error(url, e))?.to_vec();

        tracing::debug!("{} answered {} with {} bytes", url, status, body.len());
        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

fn map_error(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(url.to_string())
    } else {
        Error::Http(format!("{}: {}", url, e))
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        self.execute(url, self.client.get(url).timeout(timeout))
    }

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        tracing::debug!("POST {} ({} bytes, {})", url, body.len(), content_type);
        self.execute(
            url,
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body)
                .timeout(timeout),
        )
    }
}
