// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Rust client SDK for DSPS (Durable & Simple PubSub).
//!
//! DSPS delivers messages over plain HTTP polling: publishers PUT messages
//! onto channels, subscribers create server-side polling subscriptions and
//! fetch/acknowledge batches from them. This crate wraps that protocol in a
//! typed API with automatic retries, long-polling, duplicate suppression,
//! and a cancelable background polling loop per subscription.
//!
//! ```no_run
//! use dsps_client::{DspsClient, DspsConfig, SubscribeOptions};
//! use serde_json::json;
//!
//! # async fn example() -> dsps_client::Result<()> {
//! let client = DspsClient::new(DspsConfig::reqwest("http://localhost:3000"))?;
//! let channel = client.channel("my-channel");
//!
//! channel.publish(None, &json!({"hello": "world"})).await?;
//!
//! let subscription = channel
//!     .subscribe(
//!         SubscribeOptions::new(),
//!         |messages: Vec<dsps_client::Message>| async move {
//!             for message in messages {
//!                 println!("{}: {}", message.message_id, message.content);
//!             }
//!             Ok(())
//!         },
//!         |err| eprintln!("subscription aborted: {err}"),
//!     )
//!     .await?;
//!
//! // ... later
//! subscription.close().await?;
//! # Ok(())
//! # }
//! ```

mod channel;
mod client;
mod config;
mod dedup;
mod error;
mod events;
mod retry;
mod subscription;
mod types;

pub use channel::Channel;
pub use client::DspsClient;
pub use config::{DspsConfig, TransportProvider};
pub use error::{DspsError, Result};
pub use events::{EventTarget, ListenerHandle};
pub use retry::{Retry, RetryConfig};
pub use subscription::Subscription;
pub use types::{
    AbnormalEndCallback, CallbackError, Message, MessageHandler, SubscribeOptions,
    SubscriptionCallbackError, SubscriptionUnrecoverableError, UnrecoverableErrorCode,
};
pub use types::{
    DEFAULT_LONG_POLLING_INTERVAL_JITTER_SEC, DEFAULT_LONG_POLLING_INTERVAL_SEC,
    DEFAULT_LONG_POLLING_SEC, DEFAULT_POLLING_BULK_SIZE, DEFAULT_POLLING_ERROR_INTERVAL_JITTER_SEC,
    DEFAULT_POLLING_ERROR_INTERVAL_SEC, DEFAULT_POLLING_PAGING_INTERVAL_SEC,
    DEFAULT_SHORT_POLLING_INTERVAL_JITTER_SEC, DEFAULT_SHORT_POLLING_INTERVAL_SEC,
};

pub use dsps_http::{
    ExpectedBody, HttpError, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport,
    ReqwestTransportConfig,
};
