// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! HTTP transport abstraction for the DSPS client SDK.
//!
//! The SDK core talks to the DSPS server exclusively through the
//! [`HttpTransport`] trait, so applications can substitute their own HTTP
//! stack (custom TLS, proxies, instrumented clients). [`ReqwestTransport`]
//! is the default implementation.
//!
//! A transport is deliberately dumb: it performs one request, validates the
//! response status against the caller-supplied expected set, and parses JSON
//! bodies. Retry, backoff, and error reporting live in the SDK core.

mod error;
mod reqwest_transport;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use error::HttpError;
pub use reqwest_transport::{ReqwestTransport, ReqwestTransportConfig};

/// HTTP methods used by the DSPS protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fetch messages
    Get,
    /// Publish a message, create a subscription
    Put,
    /// Acknowledge messages, end a subscription
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a 2xx response body must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedBody {
    /// Any body (including none) is acceptable
    Any,
    /// Body must be parseable JSON
    Json,
}

/// A single request against the DSPS server.
///
/// `expected_status_codes` lists every status the caller knows how to handle;
/// a response outside that set fails with [`HttpError::UnexpectedStatus`].
/// This lets callers receive "expected" error statuses (401/403/404 during
/// polling) as ordinary responses instead of errors.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the transport's base URL, always starting with "/".
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body_json: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub expected_status_codes: Vec<u16>,
    pub expected_2xx_body: ExpectedBody,
    /// Extra time budget on top of the transport's base timeout
    /// (long-polling requests must outlive the requested poll duration).
    pub timeout_offset: Option<Duration>,
    /// When set, the transport aborts the in-flight request as soon as the
    /// token is canceled and fails with [`HttpError::Canceled`].
    pub cancel: Option<CancellationToken>,
}

impl HttpRequest {
    /// Create a request expecting a 200 JSON response.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body_json: None,
            headers: Vec::new(),
            expected_status_codes: vec![200],
            expected_2xx_body: ExpectedBody::Json,
            timeout_offset: None,
            cancel: None,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body_json(mut self, body: Value) -> Self {
        self.body_json = Some(body);
        self
    }

    pub fn with_expected_status_codes(mut self, codes: impl Into<Vec<u16>>) -> Self {
        self.expected_status_codes = codes.into();
        self
    }

    pub fn with_expected_2xx_body(mut self, expected: ExpectedBody) -> Self {
        self.expected_2xx_body = expected;
        self
    }

    pub fn with_timeout_offset(mut self, offset: Duration) -> Self {
        self.timeout_offset = Some(offset);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A response whose status was in the request's expected set.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    /// Raw body text, if the response carried one.
    pub text: Option<String>,
    /// Body parsed as JSON, present when the response had an
    /// `application/json` content type.
    pub json: Option<Value>,
}

impl HttpResponse {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One-shot HTTP capability injected into the SDK core.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform the request.
    ///
    /// Fails with [`HttpError`] on network failure, cancellation, a status
    /// outside `expected_status_codes`, or a body violating
    /// `expected_2xx_body`.
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_as_str() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Put.as_str(), "PUT");
        assert_eq!(Method::Delete.as_str(), "DELETE");
    }

    #[test]
    fn test_request_builder_defaults() {
        let req = HttpRequest::new(Method::Get, "/channel/c1");
        assert_eq!(req.expected_status_codes, vec![200]);
        assert_eq!(req.expected_2xx_body, ExpectedBody::Json);
        assert!(req.query.is_empty());
        assert!(req.cancel.is_none());
    }

    #[test]
    fn test_request_builder_overrides() {
        let req = HttpRequest::new(Method::Delete, "/x")
            .with_expected_status_codes([204])
            .with_expected_2xx_body(ExpectedBody::Any)
            .with_query("ackHandle", "h-1");
        assert_eq!(req.expected_status_codes, vec![204]);
        assert_eq!(req.expected_2xx_body, ExpectedBody::Any);
        assert_eq!(req.query, vec![("ackHandle".to_string(), "h-1".to_string())]);
    }

    #[test]
    fn test_response_is_success() {
        let mut res = HttpResponse {
            status: 204,
            headers: HashMap::new(),
            text: None,
            json: None,
        };
        assert!(res.is_success());
        res.status = 404;
        assert!(!res.is_success());
    }
}
