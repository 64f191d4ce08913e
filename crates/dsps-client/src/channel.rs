// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Channel handle: publish and subscribe.

use std::sync::Arc;

use dsps_http::{HttpRequest, Method};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{ClientCore, Retrying};
use crate::error::{DspsError, Result};
use crate::subscription::{Subscription, SubscriptionParams};
use crate::types::{Message, MessageHandler, SubscribeOptions, SubscriptionUnrecoverableError};

#[derive(Deserialize)]
struct PublishResponseBody {
    #[serde(rename = "channelID")]
    channel_id: String,
    #[serde(rename = "messageID")]
    message_id: String,
}

/// A handle to one channel. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    core: Arc<ClientCore>,
    channel_id: String,
}

impl Channel {
    pub(crate) fn new(core: Arc<ClientCore>, channel_id: String) -> Self {
        Self { core, channel_id }
    }

    pub fn id(&self) -> &str {
        &self.channel_id
    }

    /// Publish a message.
    ///
    /// `message_id` controls server-side idempotency: republishing the same
    /// ID is a no-op, so callers can safely retry. When `None`, a fresh
    /// `msg-{uuid}` is generated (each call is then a distinct message).
    /// The call is retried on transient failures.
    pub async fn publish<T: Serialize>(
        &self,
        message_id: Option<&str>,
        content: &T,
    ) -> Result<Message> {
        let message_id = match message_id {
            Some("") => {
                return Err(DspsError::Validation(
                    "message ID must not be empty".to_string(),
                ));
            }
            Some(id) => id.to_string(),
            None => format!("msg-{}", Uuid::new_v4()),
        };
        let content =
            serde_json::to_value(content).map_err(|e| DspsError::Serialization(e.to_string()))?;

        let req = HttpRequest::new(
            Method::Put,
            format!("/channel/{}/message/{}", self.channel_id, message_id),
        )
        .with_body_json(content.clone());
        let res = self.core.api_call(req, Retrying::Yes).await?;
        let body: PublishResponseBody = parse_json_body(&res)?;
        Ok(Message {
            channel_id: body.channel_id,
            message_id: body.message_id,
            content,
        })
    }

    /// Create a subscription and start polling it in a background task.
    ///
    /// `handler` receives each deduplicated batch; `abnormal_end` fires at
    /// most once if polling hits an unrecoverable condition (invalid
    /// credentials, forbidden channel, subscription expired). The returned
    /// [`Subscription`] keeps polling until
    /// [`close`](Subscription::close) is called.
    pub async fn subscribe<H>(
        &self,
        options: SubscribeOptions,
        handler: H,
        abnormal_end: impl FnOnce(SubscriptionUnrecoverableError) + Send + Sync + 'static,
    ) -> Result<Subscription>
    where
        H: MessageHandler + 'static,
    {
        let params = SubscriptionParams::resolve(self.channel_id.clone(), options)?;
        Subscription::start(self.core.clone(), params, handler, Box::new(abnormal_end)).await
    }
}

pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(
    res: &dsps_http::HttpResponse,
) -> Result<T> {
    let json = res
        .json
        .as_ref()
        .ok_or_else(|| DspsError::Serialization("response body is not JSON".to_string()))?;
    serde_json::from_value(json.clone()).map_err(|e| DspsError::Serialization(e.to_string()))
}
