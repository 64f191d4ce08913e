// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! SDK-specific error types.

use thiserror::Error;

use crate::types::UnrecoverableErrorCode;

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum DspsError {
    /// Transport-level failure (network, cancellation, unexpected status)
    #[error(transparent)]
    Transport(#[from] dsps_http::HttpError),

    /// Protocol-level condition that terminates a subscription
    #[error("subscription unrecoverable error: {code}")]
    Unrecoverable {
        /// The matched wire error code
        code: UnrecoverableErrorCode,
    },

    /// Invalid argument detected before any network I/O
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Message content could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DspsError {
    /// True when this error is a cancellation, which is a clean loop exit
    /// rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, DspsError::Transport(e) if e.is_canceled())
    }
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, DspsError>;
