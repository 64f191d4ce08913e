// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Client configuration.

use std::fmt;
use std::sync::Arc;

use dsps_http::{HttpTransport, ReqwestTransportConfig};

use crate::retry::RetryConfig;

/// How the client obtains its HTTP transport.
#[derive(Clone)]
pub enum TransportProvider {
    /// Build a reqwest-backed transport from the given configuration.
    Reqwest(ReqwestTransportConfig),
    /// Use a caller-supplied transport. Useful for tests and for callers
    /// that need custom connection handling.
    Instance(Arc<dyn HttpTransport>),
}

impl fmt::Debug for TransportProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProvider::Reqwest(config) => {
                f.debug_tuple("Reqwest").field(config).finish()
            }
            TransportProvider::Instance(_) => f.debug_tuple("Instance").finish(),
        }
    }
}

/// Configuration for [`DspsClient`](crate::DspsClient).
#[derive(Debug, Clone)]
pub struct DspsConfig {
    pub transport: TransportProvider,
    pub api_retry: RetryConfig,
    /// Bearer token attached to every request as an `Authorization` header.
    pub jwt: Option<String>,
}

impl DspsConfig {
    pub fn new(transport: TransportProvider) -> Self {
        Self {
            transport,
            api_retry: RetryConfig::default(),
            jwt: None,
        }
    }

    /// Shorthand for a reqwest-backed client talking to `base_url`.
    pub fn reqwest(base_url: impl Into<String>) -> Self {
        Self::new(TransportProvider::Reqwest(ReqwestTransportConfig::new(
            base_url,
        )))
    }

    pub fn with_api_retry(mut self, retry: RetryConfig) -> Self {
        self.api_retry = retry;
        self
    }

    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = Some(jwt.into());
        self
    }
}
