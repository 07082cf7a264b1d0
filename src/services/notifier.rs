// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Context change notifications.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: a lagging subscriber skips what it missed
//! - **In-memory only**: nothing is persisted or sent to other processes
//! - **No replay**: subscribers only see changes made after they subscribed
//!
//! Dropping a [`ContextSubscription`] unsubscribes it.

use crate::models::{Context, ContextKey};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Buffered events per subscriber before it starts lagging.
const DEFAULT_CAPACITY: usize = 64;

/// Emitted once per `set_active_context` call.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChanged {
    pub context_key: ContextKey,
    pub context: Context,
    pub changed_at: DateTime<Utc>,
}

/// Broadcasts active-context switches to any number of views.
#[derive(Clone)]
pub struct ContextChangeNotifier {
    sender: broadcast::Sender<ContextChanged>,
}

impl ContextChangeNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Fire-and-forget. Returns how many subscribers were reached.
    pub fn emit(&self, context: Context) -> usize {
        let event = ContextChanged {
            context_key: context.identity_key(),
            context,
            changed_at: Utc::now(),
        };
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> ContextSubscription {
        ContextSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ContextChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to context changes.
pub struct ContextSubscription {
    receiver: broadcast::Receiver<ContextChanged>,
}

impl ContextSubscription {
    /// Wait for the next change. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<ContextChanged> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Context change subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next change if one is already queued.
    pub fn try_recv(&mut self) -> Option<ContextChanged> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Context change subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ContextChanged> + Send + 'static {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}
