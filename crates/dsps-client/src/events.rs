// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Client-wide event notifications.
//!
//! A notification-only side channel: listeners observe API failures and user
//! callback failures but can never cancel or alter the triggering operation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

use crate::error::DspsError;
use crate::types::SubscriptionCallbackError;

type ApiFailedListener = Arc<dyn Fn(&DspsError) + Send + Sync>;
type CallbackErrorListener = Arc<dyn Fn(&SubscriptionCallbackError) + Send + Sync>;

/// Handle returned by listener registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Registry of event listeners, dispatched synchronously in registration
/// order. A panicking listener is caught and logged; it does not prevent
/// subsequent listeners from running.
pub struct EventTarget {
    next_handle: AtomicU64,
    api_failed: Mutex<Vec<(ListenerHandle, ApiFailedListener)>>,
    callback_error: Mutex<Vec<(ListenerHandle, CallbackErrorListener)>>,
}

impl EventTarget {
    pub(crate) fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            api_failed: Mutex::new(Vec::new()),
            callback_error: Mutex::new(Vec::new()),
        }
    }

    fn allocate_handle(&self) -> ListenerHandle {
        ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a listener for API/communication failures. Safe to call from
    /// within a listener; the new listener sees subsequent events only.
    pub fn add_api_failed_listener(
        &self,
        listener: impl Fn(&DspsError) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let handle = self.allocate_handle();
        self.api_failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, Arc::new(listener)));
        handle
    }

    /// Register a listener for user-callback failures. Safe to call from
    /// within a listener; the new listener sees subsequent events only.
    pub fn add_callback_error_listener(
        &self,
        listener: impl Fn(&SubscriptionCallbackError) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let handle = self.allocate_handle();
        self.callback_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, Arc::new(listener)));
        handle
    }

    /// Remove a previously registered listener. Unknown handles are ignored.
    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.api_failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(h, _)| *h != handle);
        self.callback_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(h, _)| *h != handle);
    }

    pub(crate) fn api_failed(&self, err: &DspsError) {
        error!(error = %err, "DSPS client event: apiFailed");
        let listeners = self
            .api_failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        dispatch("apiFailed", &listeners, err);
    }

    pub(crate) fn subscription_callback_error(&self, info: &SubscriptionCallbackError) {
        error!(
            channel_id = %info.channel_id,
            subscriber_id = %info.subscriber_id,
            error = %info.error,
            "DSPS client event: subscriptionCallbackError",
        );
        let listeners = self
            .callback_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        dispatch("subscriptionCallbackError", &listeners, info);
    }
}

// Dispatch runs over a snapshot taken outside the registry lock, so a
// listener may add or remove listeners; registry changes take effect from
// the next event.
fn dispatch<T: ?Sized>(name: &str, listeners: &[(ListenerHandle, Arc<dyn Fn(&T) + Send + Sync>)], arg: &T) {
    for (handle, listener) in listeners {
        if std::panic::catch_unwind(AssertUnwindSafe(|| listener(arg))).is_err() {
            error!(
                handle = handle.0,
                event = name,
                "event listener panicked; listeners must not panic",
            );
        }
    }
}
