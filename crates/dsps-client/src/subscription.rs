// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Subscription lifecycle and the background polling loop.
//!
//! One tokio task per subscription runs fetch/deliver/acknowledge cycles
//! until the subscription is closed or an unrecoverable protocol error is
//! reported by the server. Delivered batches are acknowledged even when the
//! subscription is being closed, so the server does not redeliver them to a
//! later subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dsps_http::{ExpectedBody, HttpError, HttpRequest, Method};
use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::{ClientCore, Retrying};
use crate::dedup::Dedup;
use crate::error::{DspsError, Result};
use crate::types::{
    AbnormalEndCallback, Message, MessageHandler, SubscribeOptions, SubscriptionCallbackError,
    SubscriptionUnrecoverableError, UnrecoverableErrorCode,
};
use crate::types::{
    DEFAULT_LONG_POLLING_INTERVAL_JITTER_SEC, DEFAULT_LONG_POLLING_INTERVAL_SEC,
    DEFAULT_LONG_POLLING_SEC, DEFAULT_POLLING_BULK_SIZE, DEFAULT_POLLING_ERROR_INTERVAL_JITTER_SEC,
    DEFAULT_POLLING_ERROR_INTERVAL_SEC, DEFAULT_POLLING_PAGING_INTERVAL_SEC,
    DEFAULT_SHORT_POLLING_INTERVAL_JITTER_SEC, DEFAULT_SHORT_POLLING_INTERVAL_SEC,
};

/// The dedup window holds this many times `bulk_size` message IDs.
const DEDUP_WINDOW_SIZE_MULTIPLIER: u32 = 3;

fn dedup_window_size(bulk_size: u32) -> usize {
    bulk_size.saturating_mul(DEDUP_WINDOW_SIZE_MULTIPLIER) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollingMode {
    LongPolling,
    ShortPolling,
}

/// Which interval applies before the next fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalMode {
    /// Last fetch returned nothing
    NoMessages,
    /// Last fetch returned messages and drained the queue
    NoMoreMessages,
    /// Server reported more messages queued; fetch again promptly, without
    /// jitter
    Paginated,
    /// Last fetch (or its acknowledgment) failed; back off
    Error,
}

/// Fully resolved subscription parameters. Defaults depend on the polling
/// mode, which is why resolution happens in one place.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionParams {
    channel_id: String,
    subscription_id: String,
    polling_mode: PollingMode,
    long_polling_sec: f64,
    bulk_size: u32,
    interval_sec: f64,
    interval_jitter_sec: f64,
    paging_interval_sec: f64,
    error_interval_sec: f64,
    error_interval_jitter_sec: f64,
}

impl SubscriptionParams {
    pub(crate) fn resolve(channel_id: String, options: SubscribeOptions) -> Result<Self> {
        let subscription_id = match options.subscriber_id {
            Some(id) if id.is_empty() => {
                return Err(DspsError::Validation(
                    "subscriber ID must not be empty".to_string(),
                ));
            }
            Some(id) => id,
            None => format!("s-{}", Uuid::new_v4()),
        };

        let long_polling_sec = options.long_polling_sec.unwrap_or(DEFAULT_LONG_POLLING_SEC);
        if long_polling_sec < 0.0 || !long_polling_sec.is_finite() {
            return Err(DspsError::Validation(format!(
                "long polling duration must be >= 0, got {long_polling_sec}"
            )));
        }
        let polling_mode = if long_polling_sec == 0.0 {
            PollingMode::ShortPolling
        } else {
            PollingMode::LongPolling
        };

        let bulk_size = options.bulk_size.unwrap_or(DEFAULT_POLLING_BULK_SIZE);
        if bulk_size == 0 {
            return Err(DspsError::Validation(
                "bulk size must be > 0".to_string(),
            ));
        }

        let (default_interval, default_jitter) = match polling_mode {
            PollingMode::LongPolling => (
                DEFAULT_LONG_POLLING_INTERVAL_SEC,
                DEFAULT_LONG_POLLING_INTERVAL_JITTER_SEC,
            ),
            PollingMode::ShortPolling => (
                DEFAULT_SHORT_POLLING_INTERVAL_SEC,
                DEFAULT_SHORT_POLLING_INTERVAL_JITTER_SEC,
            ),
        };
        let interval_sec = options.polling_interval_sec.unwrap_or(default_interval);
        if polling_mode == PollingMode::ShortPolling && interval_sec <= 0.0 {
            return Err(DspsError::Validation(format!(
                "short-polling interval must be > 0, got {interval_sec}"
            )));
        }

        Ok(Self {
            channel_id,
            subscription_id,
            polling_mode,
            long_polling_sec,
            bulk_size,
            interval_sec,
            interval_jitter_sec: options
                .polling_interval_jitter_sec
                .unwrap_or(default_jitter),
            paging_interval_sec: options
                .polling_paging_interval_sec
                .unwrap_or(DEFAULT_POLLING_PAGING_INTERVAL_SEC),
            error_interval_sec: options
                .polling_error_interval_sec
                .unwrap_or(DEFAULT_POLLING_ERROR_INTERVAL_SEC),
            error_interval_jitter_sec: options
                .polling_error_interval_jitter_sec
                .unwrap_or(DEFAULT_POLLING_ERROR_INTERVAL_JITTER_SEC),
        })
    }

    fn subscription_path(&self) -> String {
        format!(
            "/channel/{}/subscription/polling/{}",
            self.channel_id, self.subscription_id
        )
    }

    fn message_path(&self) -> String {
        format!("{}/message", self.subscription_path())
    }

    /// Interval before the next fetch. `jitter` is drawn uniformly from
    /// `[-1, +1]`; the paginated interval never has jitter applied.
    fn next_interval(&self, mode: IntervalMode, jitter: f64) -> Duration {
        let secs = match mode {
            IntervalMode::NoMessages | IntervalMode::NoMoreMessages => {
                self.interval_sec + jitter * self.interval_jitter_sec
            }
            IntervalMode::Paginated => self.paging_interval_sec,
            IntervalMode::Error => {
                self.error_interval_sec + jitter * self.error_interval_jitter_sec
            }
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// A live subscription, polled by a background task.
///
/// Dropping a `Subscription` without calling [`close`](Self::close) leaves
/// the server-side subscription in place and the polling task running until
/// the runtime shuts down.
pub struct Subscription {
    channel_id: String,
    subscription_id: String,
    core: Arc<ClientCore>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Subscription {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn id(&self) -> &str {
        &self.subscription_id
    }

    /// Create the server-side subscription, then spawn the polling task.
    pub(crate) async fn start<H>(
        core: Arc<ClientCore>,
        params: SubscriptionParams,
        handler: H,
        abnormal_end: AbnormalEndCallback,
    ) -> Result<Self>
    where
        H: MessageHandler + 'static,
    {
        let req = HttpRequest::new(Method::Put, params.subscription_path());
        core.api_call(req, Retrying::Yes).await?;
        info!(
            channel_id = %params.channel_id,
            subscription_id = %params.subscription_id,
            "subscription created",
        );

        let cancel = CancellationToken::new();
        let poller = Poller {
            core: core.clone(),
            params: params.clone(),
            handler,
            abnormal_end: Some(abnormal_end),
            cancel: cancel.clone(),
            dedup: Dedup::new(dedup_window_size(params.bulk_size)),
        };
        let task = tokio::spawn(poller.run());

        Ok(Self {
            channel_id: params.channel_id,
            subscription_id: params.subscription_id,
            core,
            cancel,
            task: tokio::sync::Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Stop polling and delete the server-side subscription.
    ///
    /// An in-flight fetch is aborted immediately; a batch that was already
    /// delivered is still acknowledged before the task exits. The deletion
    /// runs at most once even if `close` is called repeatedly; a deletion
    /// failure is returned (and reported through the api-failed event), but
    /// polling is stopped regardless.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(
                    channel_id = %self.channel_id,
                    subscription_id = %self.subscription_id,
                    error = %e,
                    "polling task ended abnormally",
                );
            }
        }

        let path = format!(
            "/channel/{}/subscription/polling/{}",
            self.channel_id, self.subscription_id
        );
        let req = HttpRequest::new(Method::Delete, path);
        self.core.api_call(req, Retrying::Yes).await?;
        info!(
            channel_id = %self.channel_id,
            subscription_id = %self.subscription_id,
            "subscription closed",
        );
        Ok(())
    }
}

#[derive(Deserialize)]
struct FetchedMessage {
    #[serde(rename = "messageID")]
    message_id: String,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct FetchResponseBody {
    messages: Vec<FetchedMessage>,
    #[serde(rename = "ackHandle", default)]
    ack_handle: Option<String>,
    #[serde(rename = "moreMessages", default)]
    more_messages: bool,
}

enum CycleOutcome {
    Continue(IntervalMode),
    Stopped,
    Aborted(UnrecoverableErrorCode),
}

enum FetchOutcome {
    Batch {
        mode: IntervalMode,
        messages: Vec<Message>,
        ack_handle: Option<String>,
    },
    Stopped,
    Failed,
    Aborted(UnrecoverableErrorCode),
}

struct Poller<H> {
    core: Arc<ClientCore>,
    params: SubscriptionParams,
    handler: H,
    abnormal_end: Option<AbnormalEndCallback>,
    cancel: CancellationToken,
    dedup: Dedup,
}

impl<H: MessageHandler> Poller<H> {
    async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.poll_cycle().await {
                CycleOutcome::Continue(mode) => {
                    let jitter = rand::thread_rng().gen_range(-1.0..=1.0);
                    let interval = self.params.next_interval(mode, jitter);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                CycleOutcome::Stopped => break,
                CycleOutcome::Aborted(code) => {
                    error!(
                        channel_id = %self.params.channel_id,
                        subscription_id = %self.params.subscription_id,
                        code = %code,
                        "subscription aborted by unrecoverable error",
                    );
                    if let Some(callback) = self.abnormal_end.take() {
                        callback(SubscriptionUnrecoverableError {
                            channel_id: self.params.channel_id.clone(),
                            subscription_id: self.params.subscription_id.clone(),
                            code,
                        });
                    }
                    break;
                }
            }
        }
    }

    /// One fetch/deliver/acknowledge cycle. The acknowledgment runs even
    /// when delivery detects a stop request, so already-fetched messages are
    /// not redelivered later.
    async fn poll_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        let (mode, messages, ack_handle) = match self.fetch_messages().await {
            FetchOutcome::Batch {
                mode,
                messages,
                ack_handle,
            } => (mode, messages, ack_handle),
            FetchOutcome::Stopped => return CycleOutcome::Stopped,
            FetchOutcome::Failed => return CycleOutcome::Continue(IntervalMode::Error),
            FetchOutcome::Aborted(code) => return CycleOutcome::Aborted(code),
        };

        let mut outcome = self.deliver(mode, messages, started.elapsed()).await;
        if let Some(handle) = ack_handle {
            if !self.ack_messages(&handle).await {
                if let CycleOutcome::Continue(_) = outcome {
                    outcome = CycleOutcome::Continue(IntervalMode::Error);
                }
            }
        }
        outcome
    }

    async fn fetch_messages(&self) -> FetchOutcome {
        let mut req = HttpRequest::new(Method::Get, self.params.subscription_path())
            .with_query("max", self.params.bulk_size.to_string())
            .with_expected_status_codes([200, 401, 403, 404])
            .with_cancel(self.cancel.clone());
        if self.params.polling_mode == PollingMode::LongPolling {
            req = req
                .with_query("timeout", format!("{}s", self.params.long_polling_sec))
                .with_timeout_offset(Duration::from_secs_f64(self.params.long_polling_sec));
        }

        let res = match self.core.api_call(req, Retrying::No).await {
            Ok(res) => res,
            Err(e) if e.is_canceled() || self.cancel.is_cancelled() => {
                return FetchOutcome::Stopped;
            }
            Err(_) => return FetchOutcome::Failed,
        };

        if res.status == 200 {
            let body: FetchResponseBody = match crate::channel::parse_json_body(&res) {
                Ok(body) => body,
                Err(e) => {
                    self.core.events.api_failed(&e);
                    return FetchOutcome::Failed;
                }
            };
            let mode = if body.messages.is_empty() {
                IntervalMode::NoMessages
            } else if body.more_messages {
                IntervalMode::Paginated
            } else {
                IntervalMode::NoMoreMessages
            };
            let messages = body
                .messages
                .into_iter()
                .map(|m| Message {
                    channel_id: self.params.channel_id.clone(),
                    message_id: m.message_id,
                    content: m.content,
                })
                .collect();
            return FetchOutcome::Batch {
                mode,
                messages,
                ack_handle: body.ack_handle,
            };
        }

        // 401/403/404: unrecoverable when the body carries a known code.
        if let Some(code) = error_code_of(&res) {
            return FetchOutcome::Aborted(code);
        }
        let err = DspsError::Transport(HttpError::UnexpectedStatus {
            method: Method::Get,
            path: self.params.subscription_path(),
            status: res.status,
            body: res.text.unwrap_or_default(),
        });
        self.core.events.api_failed(&err);
        FetchOutcome::Failed
    }

    async fn deliver(
        &mut self,
        mode: IntervalMode,
        messages: Vec<Message>,
        elapsed: Duration,
    ) -> CycleOutcome {
        if self.cancel.is_cancelled() {
            return CycleOutcome::Stopped;
        }

        // A long poll that returns empty well before its deadline suggests a
        // server or proxy that does not hold the request open. Sleeping out
        // the remainder keeps the request rate at the configured level.
        if self.params.polling_mode == PollingMode::LongPolling
            && mode == IntervalMode::NoMessages
            && elapsed.as_secs_f64() < self.params.long_polling_sec
        {
            let remaining =
                Duration::from_secs_f64(self.params.long_polling_sec - elapsed.as_secs_f64());
            info!(
                channel_id = %self.params.channel_id,
                subscription_id = %self.params.subscription_id,
                "empty long poll returned after {}ms, sleeping {}ms",
                elapsed.as_millis(),
                remaining.as_millis(),
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return CycleOutcome::Stopped,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        let fresh = self.dedup.filter(messages);
        if !fresh.is_empty() {
            if let Err(e) = self.handler.handle(fresh.clone()).await {
                self.core
                    .events
                    .subscription_callback_error(&SubscriptionCallbackError {
                        channel_id: self.params.channel_id.clone(),
                        subscriber_id: self.params.subscription_id.clone(),
                        messages: fresh,
                        error: e,
                    });
            }
        }
        CycleOutcome::Continue(mode)
    }

    /// Acknowledge a delivered batch. Never retried and never canceled: a
    /// handle is only valid for the fetch that produced it, and skipping the
    /// acknowledgment would cause redelivery.
    async fn ack_messages(&self, ack_handle: &str) -> bool {
        let req = HttpRequest::new(Method::Delete, self.params.message_path())
            .with_query("ackHandle", ack_handle)
            .with_expected_status_codes([204])
            .with_expected_2xx_body(ExpectedBody::Any);
        match self.core.api_call(req, Retrying::No).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    channel_id = %self.params.channel_id,
                    subscription_id = %self.params.subscription_id,
                    error = %e,
                    "failed to acknowledge messages, they may be redelivered",
                );
                false
            }
        }
    }
}

fn error_code_of(res: &dsps_http::HttpResponse) -> Option<UnrecoverableErrorCode> {
    let json = match &res.json {
        Some(json) => json.clone(),
        None => serde_json::from_str(res.text.as_deref()?).ok()?,
    };
    UnrecoverableErrorCode::from_code(json.get("code")?.as_str()?)
}
