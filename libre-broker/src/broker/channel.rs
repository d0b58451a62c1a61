//! Token-consumption announcements shared between broker instances.
//!
//! Every broker that spends a token announces it on a named channel. Other
//! brokers attached to the same channel drain those notices before their
//! next consumption and decrement their own budget, so the whole group
//! roughly shares one rate limit.
//!
//! ## Architecture
//!
//! - `LocalTokenChannel` wraps a tokio broadcast channel
//! - `ChannelRegistry` hands out one channel per name, so brokers built
//!   against the same name share it
//! - `NullTokenChannel` is the degraded mode: announcements go nowhere
//!   and nothing is ever received

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

/// Message carried on the token channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    /// A broker spent one token.
    TokenConsumed {
        /// Identifies the announcing broker so it can skip its own notice.
        origin: Uuid,
        /// Sender's clock reading when the token was spent. Not carried over
        /// the wire; a notice without it counts against the receiver's
        /// current window.
        #[serde(skip)]
        sent_at: Option<Instant>,
    },
}

impl ChannelMessage {
    /// Notice of a token spent at an unknown time.
    pub fn consumed(origin: Uuid) -> Self {
        Self::TokenConsumed {
            origin,
            sent_at: None,
        }
    }

    /// Notice of a token spent at `sent_at`.
    pub fn consumed_at(origin: Uuid, sent_at: Instant) -> Self {
        Self::TokenConsumed {
            origin,
            sent_at: Some(sent_at),
        }
    }

    pub fn origin(&self) -> Uuid {
        match self {
            Self::TokenConsumed { origin, .. } => *origin,
        }
    }

    pub fn sent_at(&self) -> Option<Instant> {
        match self {
            Self::TokenConsumed { sent_at, .. } => *sent_at,
        }
    }
}

/// Best-effort fan-out of token notices.
pub trait TokenChannel: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Publish a notice to every subscriber. Never fails.
    fn announce(&self, message: ChannelMessage);

    /// New receiver for future notices, or `None` when unavailable.
    fn subscribe(&self) -> Option<broadcast::Receiver<ChannelMessage>>;
}

/// In-process channel backed by `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub struct LocalTokenChannel {
    name: String,
    tx: broadcast::Sender<ChannelMessage>,
}

impl LocalTokenChannel {
    /// Create a channel buffering up to `capacity` notices per subscriber.
    ///
    /// Slow subscribers that fall further behind lose the oldest notices.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl TokenChannel for LocalTokenChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn announce(&self, message: ChannelMessage) {
        match self.tx.send(message) {
            Ok(receivers) => {
                trace!(channel = %self.name, receivers, "Announced token consumption");
            }
            Err(_) => {
                // No subscribers; nothing to tell.
                trace!(channel = %self.name, "No receivers for token notice");
            }
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ChannelMessage>> {
        Some(self.tx.subscribe())
    }
}

/// Channel used when no shared channel is available.
#[derive(Debug, Clone, Default)]
pub struct NullTokenChannel;

impl TokenChannel for NullTokenChannel {
    fn name(&self) -> &str {
        ""
    }

    fn announce(&self, _message: ChannelMessage) {}

    fn subscribe(&self) -> Option<broadcast::Receiver<ChannelMessage>> {
        None
    }
}

/// Named channels shared within a process.
#[derive(Debug, Default, Clone)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<HashMap<String, Arc<LocalTokenChannel>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel registered under `name`, created on first use.
    ///
    /// A poisoned registry degrades to a private channel rather than
    /// failing broker construction.
    pub fn channel(&self, name: &str, capacity: usize) -> Arc<dyn TokenChannel> {
        match self.channels.lock() {
            Ok(mut channels) => {
                let channel = channels
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        debug!(channel = %name, capacity, "Creating token channel");
                        Arc::new(LocalTokenChannel::new(name, capacity))
                    })
                    .clone();
                channel
            }
            Err(_) => Arc::new(LocalTokenChannel::new(name, capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
