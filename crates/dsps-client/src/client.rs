// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! The client entry point and the shared API-call layer.

use std::sync::Arc;

use async_trait::async_trait;
use dsps_http::{HttpError, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use tracing::debug;

use crate::channel::Channel;
use crate::config::{DspsConfig, TransportProvider};
use crate::error::{DspsError, Result};
use crate::events::{EventTarget, ListenerHandle};
use crate::retry::Retry;
use crate::types::SubscriptionCallbackError;

/// Whether an API call goes through the retry wrapper.
///
/// Polling fetches and acknowledgments are `No`: the polling loop already
/// backs off on errors, and a stale acknowledgment must not be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retrying {
    Yes,
    No,
}

/// Shared state behind every [`DspsClient`], [`Channel`], and subscription.
pub(crate) struct ClientCore {
    pub(crate) transport: Arc<dyn HttpTransport>,
    retry: Retry,
    pub(crate) events: EventTarget,
}

impl ClientCore {
    /// Run one API call, optionally retried. Every failure except
    /// cancellation is reported through the api-failed event before being
    /// returned.
    pub(crate) async fn api_call(
        &self,
        req: HttpRequest,
        retrying: Retrying,
    ) -> Result<HttpResponse> {
        debug!(method = %req.method, path = %req.path, "DSPS API call");
        let result = match retrying {
            Retrying::Yes => {
                let description = format!("{} {}", req.method, req.path);
                self.retry
                    .perform(&description, || self.transport.request(req.clone()))
                    .await
            }
            Retrying::No => self.transport.request(req).await,
        };
        match result {
            Ok(res) => Ok(res),
            Err(e) => {
                let err = DspsError::from(e);
                if !err.is_canceled() {
                    self.events.api_failed(&err);
                }
                Err(err)
            }
        }
    }
}

/// Transport decorator that attaches a JWT bearer token to every request.
struct BearerAuthTransport {
    inner: Arc<dyn HttpTransport>,
    header_value: String,
}

#[async_trait]
impl HttpTransport for BearerAuthTransport {
    async fn request(&self, mut req: HttpRequest) -> std::result::Result<HttpResponse, HttpError> {
        req.headers
            .push(("authorization".to_string(), self.header_value.clone()));
        self.inner.request(req).await
    }
}

/// DSPS client. Cheap to clone; all clones share one transport, retry
/// policy, and event registry.
#[derive(Clone)]
pub struct DspsClient {
    core: Arc<ClientCore>,
}

impl DspsClient {
    /// Build a client from configuration.
    ///
    /// Fails when the reqwest transport cannot be constructed from the
    /// given configuration.
    pub fn new(config: DspsConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = match config.transport {
            TransportProvider::Reqwest(transport_config) => {
                Arc::new(ReqwestTransport::new(transport_config)?)
            }
            TransportProvider::Instance(instance) => instance,
        };
        let transport: Arc<dyn HttpTransport> = match config.jwt {
            Some(jwt) => Arc::new(BearerAuthTransport {
                inner: transport,
                header_value: format!("Bearer {jwt}"),
            }),
            None => transport,
        };
        Ok(Self {
            core: Arc::new(ClientCore {
                transport,
                retry: Retry::new(config.api_retry),
                events: EventTarget::new(),
            }),
        })
    }

    /// Get a handle to a channel. Channels need not be created in advance;
    /// the server materializes them on first use.
    pub fn channel(&self, channel_id: impl Into<String>) -> Channel {
        Channel::new(self.core.clone(), channel_id.into())
    }

    /// Listen for API/communication failures (after retries, when
    /// applicable). Cancellation is not reported.
    pub fn add_api_failed_listener(
        &self,
        listener: impl Fn(&DspsError) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.core.events.add_api_failed_listener(listener)
    }

    /// Listen for user message-callback failures.
    pub fn add_callback_error_listener(
        &self,
        listener: impl Fn(&SubscriptionCallbackError) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.core.events.add_callback_error_listener(listener)
    }

    /// Remove a listener registered through either `add_*_listener` method.
    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.core.events.remove_listener(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsps_http::{ExpectedBody, Method};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingTransport {
        requests: Mutex<Vec<HttpRequest>>,
        failures_before_success: AtomicU32,
    }

    impl RecordingTransport {
        fn new(failures_before_success: u32) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                failures_before_success: AtomicU32::new(failures_before_success),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn request(
            &self,
            req: HttpRequest,
        ) -> std::result::Result<HttpResponse, HttpError> {
            self.requests.lock().unwrap().push(req.clone());
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err(HttpError::Network {
                    method: req.method,
                    path: req.path,
                    message: "connection refused".to_string(),
                });
            }
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                text: Some("{}".to_string()),
                json: Some(serde_json::json!({})),
            })
        }
    }

    fn client_with(transport: Arc<dyn HttpTransport>) -> DspsClient {
        DspsClient::new(
            DspsConfig::new(TransportProvider::Instance(transport))
                .with_api_retry(crate::retry::RetryConfig::new(3, 0.001, 1.0, 0.0)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_api_call_retries_transient_failures() {
        let transport = RecordingTransport::new(2);
        let client = client_with(transport.clone());
        let req = HttpRequest::new(Method::Put, "/channel/c1/message/m1");
        let res = client.core.api_call(req, Retrying::Yes).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(transport.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_api_call_without_retry_fails_fast() {
        let transport = RecordingTransport::new(1);
        let client = client_with(transport.clone());
        let req = HttpRequest::new(Method::Delete, "/x")
            .with_expected_status_codes([204])
            .with_expected_2xx_body(ExpectedBody::Any);
        let result = client.core.api_call(req, Retrying::No).await;
        assert!(result.is_err());
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_api_failure_reported_to_listeners() {
        let transport = RecordingTransport::new(u32::MAX);
        let client = client_with(transport);
        let reported = Arc::new(AtomicU32::new(0));
        let counter = reported.clone();
        client.add_api_failed_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let req = HttpRequest::new(Method::Get, "/y");
        let result = client.core.api_call(req, Retrying::No).await;
        assert!(result.is_err());
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_jwt_attached_as_bearer_header() {
        let transport = RecordingTransport::new(0);
        let client = DspsClient::new(
            DspsConfig::new(TransportProvider::Instance(transport.clone()))
                .with_jwt("tok-1"),
        )
        .unwrap();
        let req = HttpRequest::new(Method::Get, "/z");
        client.core.api_call(req, Retrying::No).await.unwrap();
        let recorded = transport.requests.lock().unwrap();
        assert_eq!(
            recorded[0].headers,
            vec![("authorization".to_string(), "Bearer tok-1".to_string())]
        );
    }
}
