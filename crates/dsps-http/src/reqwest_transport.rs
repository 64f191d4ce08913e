// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Default [`HttpTransport`] implementation backed by reqwest.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use crate::{ExpectedBody, HttpError, HttpRequest, HttpResponse, HttpTransport, Method};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Configuration for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransportConfig {
    /// URL of the DSPS server (e.g. "https://dsps.example.com"). If the
    /// server is configured with a path prefix, include it here.
    pub base_url: String,
    /// Headers sent with every request (per-request headers take precedence).
    pub headers: Vec<(String, String)>,
    /// Base timeout in milliseconds (default: 15_000). Long-polling requests
    /// extend this by their timeout offset.
    pub timeout_ms: u64,
}

impl ReqwestTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`].
pub struct ReqwestTransport {
    base_url: String,
    default_headers: Vec<(String, String)>,
    base_timeout: Duration,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: ReqwestTransportConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HttpError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_headers: config.headers,
            base_timeout: Duration::from_millis(config.timeout_ms),
            client,
        })
    }

    fn header_map(&self, req: &HttpRequest) -> Result<HeaderMap, HttpError> {
        let mut map = HeaderMap::new();
        map.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in self.default_headers.iter().chain(req.headers.iter()) {
            let name = HeaderName::from_bytes(name.to_lowercase().as_bytes())
                .map_err(|e| HttpError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HttpError::Config(format!("invalid header value: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = format!("{}{}", self.base_url, req.path);
        let timeout = self.base_timeout + req.timeout_offset.unwrap_or(Duration::ZERO);
        trace!(method = %req.method, url = %url, timeout_ms = timeout.as_millis() as u64, "sending request");

        // Cache buster defeats intermediary GET caching, same for every method
        // for simplicity.
        let mut query = vec![("_".to_string(), cache_buster())];
        query.extend(req.query.iter().cloned());

        let mut builder = self
            .client
            .request(to_reqwest_method(req.method), &url)
            .headers(self.header_map(&req)?)
            .query(&query)
            .timeout(timeout);
        if let Some(body) = &req.body_json {
            builder = builder.json(body);
        }

        let send = builder.send();
        let result = match &req.cancel {
            Some(token) => {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        return Err(HttpError::Canceled {
                            method: req.method,
                            path: req.path,
                        });
                    }

                    result = send => result,
                }
            }
            None => send.await,
        };

        let response = result.map_err(|e| {
            // A canceled token can also tear the connection down under us;
            // report that as cancellation, not as a network failure.
            if req.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                HttpError::Canceled {
                    method: req.method,
                    path: req.path.clone(),
                }
            } else {
                HttpError::Network {
                    method: req.method,
                    path: req.path.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        trace!(method = %req.method, path = %req.path, status, "received response");
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }

        let text = response.text().await.map_err(|e| HttpError::Network {
            method: req.method,
            path: req.path.clone(),
            message: format!("failed to read response body: {e}"),
        })?;
        let text = if text.is_empty() { None } else { Some(text) };

        // Status assertion first: a garbled error-page body must not mask an
        // unexpected status.
        if !req.expected_status_codes.contains(&status) {
            return Err(HttpError::UnexpectedStatus {
                method: req.method,
                path: req.path,
                status,
                body: text.unwrap_or_else(|| "(none)".to_string()),
            });
        }

        let json = match (&text, headers.get("content-type")) {
            (Some(text), Some(content_type)) if is_json_content_type(content_type) => Some(
                serde_json::from_str(text)
                    .map_err(|e| HttpError::Body(format!("failed to parse response JSON: {e}")))?,
            ),
            _ => None,
        };

        if (200..300).contains(&status)
            && req.expected_2xx_body == ExpectedBody::Json
            && json.is_none()
        {
            return Err(HttpError::Body(format!(
                "expected JSON body but none returned: {} {} (status {status})",
                req.method, req.path
            )));
        }

        Ok(HttpResponse {
            status,
            headers,
            text,
            json,
        })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type == "application/json" || content_type.starts_with("application/json;")
}

fn cache_buster() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{millis}-{}", rand::random::<u32>())
}
