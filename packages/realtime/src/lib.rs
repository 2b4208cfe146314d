#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Realtime event feed subscription.
//!
//! The pub/sub transport is external and sits behind
//! [`RealtimeTransport`]. A [`ConnectionManager`] owns one channel
//! subscription, forwards row changes to registered handlers, and
//! re-subscribes with backoff when the channel errors, times out, or
//! closes while still wanted.

pub mod backoff;
pub mod manager;

use async_trait::async_trait;
use safety_map_event_models::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use manager::ConnectionManager;

/// Channel carrying changes to the `events` table.
pub const EVENTS_CHANNEL: &str = "events-feed";

/// Errors reported by a realtime transport.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The transport failed to (un)subscribe.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of what went wrong.
        message: String,
    },
}

/// Lifecycle status of a channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    /// The subscription is live.
    Subscribed,
    /// The server rejected or dropped the subscription.
    ChannelError,
    /// The subscription handshake timed out.
    TimedOut,
    /// The channel was closed.
    Closed,
}

/// A row change on the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    /// A new event was reported.
    Insert {
        /// The new row.
        event: Event,
    },
    /// An event was modified.
    Update {
        /// The row after the change.
        event: Event,
    },
    /// An event was removed.
    Delete {
        /// ID of the removed row.
        id: String,
    },
}

/// Anything a subscription can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// The subscription changed state.
    Status(ChannelStatus),
    /// A row changed.
    Change(ChangeEvent),
}

/// A live subscription. The transport closes `receiver` when it drops
/// the channel.
#[derive(Debug)]
pub struct Subscription {
    /// Messages in delivery order.
    pub receiver: mpsc::Receiver<ChannelMessage>,
}

/// A pub/sub transport.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Opens a subscription to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, RealtimeError>;

    /// Releases a subscription to `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), RealtimeError>;
}
