// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Public data types of the SDK.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default long-polling duration. Pass `0` to use short-polling.
pub const DEFAULT_LONG_POLLING_SEC: f64 = 30.0;
/// Default inter-poll interval in long-polling mode (small, for best latency).
pub const DEFAULT_LONG_POLLING_INTERVAL_SEC: f64 = 0.05;
/// Default jitter around the long-polling interval.
pub const DEFAULT_LONG_POLLING_INTERVAL_JITTER_SEC: f64 = 0.1;
/// Default inter-poll interval in short-polling mode.
pub const DEFAULT_SHORT_POLLING_INTERVAL_SEC: f64 = 5.0;
/// Default jitter around the short-polling interval.
pub const DEFAULT_SHORT_POLLING_INTERVAL_JITTER_SEC: f64 = 0.5;
/// Default interval after a paginated response (more messages queued
/// server-side, fetch again almost immediately).
pub const DEFAULT_POLLING_PAGING_INTERVAL_SEC: f64 = 0.05;
/// Default backoff after a polling API failure.
pub const DEFAULT_POLLING_ERROR_INTERVAL_SEC: f64 = 5.0;
/// Default jitter around the error backoff.
pub const DEFAULT_POLLING_ERROR_INTERVAL_JITTER_SEC: f64 = 2.5;
/// Default maximum number of messages per fetch.
pub const DEFAULT_POLLING_BULK_SIZE: u32 = 32;

/// A message on a channel. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Channel this message belongs to
    #[serde(rename = "channelID")]
    pub channel_id: String,
    /// Globally unique ID within the channel
    #[serde(rename = "messageID")]
    pub message_id: String,
    /// Opaque JSON content
    pub content: serde_json::Value,
}

/// Optional parameters of [`Channel::subscribe`](crate::Channel::subscribe).
///
/// Every `None` falls back to the matching `DEFAULT_*` constant; interval
/// defaults depend on the polling mode selected by `long_polling_sec`.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Subscriber ID; generated (`s-{uuid}`) when absent. Must not be empty.
    pub subscriber_id: Option<String>,
    /// Messages per fetch (no guarantee; each callback may see fewer or more).
    pub bulk_size: Option<u32>,
    /// Long-polling timeout in seconds; `0` selects short-polling.
    pub long_polling_sec: Option<f64>,
    /// Interval between polls. Must be > 0 in short-polling mode.
    pub polling_interval_sec: Option<f64>,
    /// Random offset added to or subtracted from `polling_interval_sec`.
    /// Not applied after a paginated response.
    pub polling_interval_jitter_sec: Option<f64>,
    /// Interval applied right after a response indicating queued messages.
    pub polling_paging_interval_sec: Option<f64>,
    /// Backoff after a polling API failure.
    pub polling_error_interval_sec: Option<f64>,
    /// Random offset around `polling_error_interval_sec`.
    pub polling_error_interval_jitter_sec: Option<f64>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriber_id(mut self, id: impl Into<String>) -> Self {
        self.subscriber_id = Some(id.into());
        self
    }

    pub fn with_bulk_size(mut self, bulk_size: u32) -> Self {
        self.bulk_size = Some(bulk_size);
        self
    }

    pub fn with_long_polling_sec(mut self, sec: f64) -> Self {
        self.long_polling_sec = Some(sec);
        self
    }

    pub fn with_polling_interval_sec(mut self, sec: f64) -> Self {
        self.polling_interval_sec = Some(sec);
        self
    }

    pub fn with_polling_interval_jitter_sec(mut self, sec: f64) -> Self {
        self.polling_interval_jitter_sec = Some(sec);
        self
    }

    pub fn with_polling_paging_interval_sec(mut self, sec: f64) -> Self {
        self.polling_paging_interval_sec = Some(sec);
        self
    }

    pub fn with_polling_error_interval_sec(mut self, sec: f64) -> Self {
        self.polling_error_interval_sec = Some(sec);
        self
    }

    pub fn with_polling_error_interval_jitter_sec(mut self, sec: f64) -> Self {
        self.polling_error_interval_jitter_sec = Some(sec);
        self
    }
}

/// Wire error codes that cannot be resolved by retrying and terminate the
/// subscription. This set may grow in future protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecoverableErrorCode {
    /// Credentials rejected by the server
    InvalidCredentials,
    /// Access to the channel is forbidden
    ChannelForbidden,
    /// Subscription deleted or expired server-side
    SubscriptionNotFound,
    /// Channel does not exist or is invalid
    InvalidChannel,
}

impl UnrecoverableErrorCode {
    /// The wire representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnrecoverableErrorCode::InvalidCredentials => "dsps.auth.invalid-credentials",
            UnrecoverableErrorCode::ChannelForbidden => "dsps.auth.channel-forbidden",
            UnrecoverableErrorCode::SubscriptionNotFound => "dsps.storage.subscription-not-found",
            UnrecoverableErrorCode::InvalidChannel => "dsps.storage.invalid-channel",
        }
    }

    /// Match a wire code against the known unrecoverable set.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "dsps.auth.invalid-credentials" => Some(UnrecoverableErrorCode::InvalidCredentials),
            "dsps.auth.channel-forbidden" => Some(UnrecoverableErrorCode::ChannelForbidden),
            "dsps.storage.subscription-not-found" => {
                Some(UnrecoverableErrorCode::SubscriptionNotFound)
            }
            "dsps.storage.invalid-channel" => Some(UnrecoverableErrorCode::InvalidChannel),
            _ => None,
        }
    }
}

impl fmt::Display for UnrecoverableErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error delivered to a subscription's abnormal-end callback, exactly
/// once, when polling hits an unrecoverable condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUnrecoverableError {
    /// Which subscription aborted
    pub channel_id: String,
    /// Subscriber whose polling loop terminated
    pub subscription_id: String,
    /// The matched wire error code
    pub code: UnrecoverableErrorCode,
}

impl fmt::Display for SubscriptionUnrecoverableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subscription {} on channel {} aborted: {}",
            self.subscription_id, self.channel_id, self.code
        )
    }
}

impl std::error::Error for SubscriptionUnrecoverableError {}

/// Error type returned by user message callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked at most once when a subscription aborts.
pub type AbnormalEndCallback =
    Box<dyn FnOnce(SubscriptionUnrecoverableError) + Send + Sync + 'static>;

/// Payload of the subscription-callback-error event: a user callback failed
/// for a delivered batch. The batch is considered delivered and is not
/// reprocessed.
#[derive(Debug)]
pub struct SubscriptionCallbackError {
    pub channel_id: String,
    pub subscriber_id: String,
    pub messages: Vec<Message>,
    pub error: CallbackError,
}

/// User-supplied message callback.
///
/// Implemented for any `Fn(Vec<Message>) -> impl Future<Output = Result<(),
/// CallbackError>>` closure. Returning `Err` reports the batch through the
/// subscription-callback-error event; it never disrupts polling or
/// acknowledgment.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, messages: Vec<Message>) -> std::result::Result<(), CallbackError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), CallbackError>> + Send,
{
    async fn handle(&self, messages: Vec<Message>) -> std::result::Result<(), CallbackError> {
        (self)(messages).await
    }
}
