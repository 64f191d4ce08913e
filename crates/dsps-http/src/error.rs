// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Transport-level error types.

use thiserror::Error;

use crate::Method;

/// Errors raised by an [`HttpTransport`](crate::HttpTransport) implementation.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network-level failure (connect, I/O, client-side timeout)
    #[error("{method} {path} failed: {message}")]
    Network {
        /// Request method
        method: Method,
        /// Request path
        path: String,
        /// Underlying failure description
        message: String,
    },

    /// Response status was not in the request's expected set
    #[error("unexpected HTTP status {status} ({method} {path}, body: {body})")]
    UnexpectedStatus {
        /// Request method
        method: Method,
        /// Request path
        path: String,
        /// Response status code
        status: u16,
        /// Response body text, or "(none)"
        body: String,
    },

    /// The request was canceled through its cancellation token
    #[error("{method} {path} has been canceled")]
    Canceled {
        /// Request method
        method: Method,
        /// Request path
        path: String,
    },

    /// Response body did not satisfy the request's body expectation
    #[error("response body error: {0}")]
    Body(String),

    /// Transport could not be constructed from its configuration
    #[error("transport configuration error: {0}")]
    Config(String),
}

impl HttpError {
    /// True when this error represents a cancellation rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, HttpError::Canceled { .. })
    }
}
