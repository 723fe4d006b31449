//! Broker abstraction and the in-process implementation.
//!
//! `MemoryBus` mirrors Redis pub/sub semantics over per-channel
//! `tokio::sync::broadcast` senders: publishing to a channel with no
//! subscribers drops the message, and a subscriber that falls behind is
//! told how many events it missed.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use ha_domain::stream::BoxStream;
use ha_domain::Result;

/// Capacity of each per-channel broadcast ring.
const CHANNEL_CAPACITY: usize = 256;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A publish/subscribe broker carrying opaque JSON payloads.
///
/// Per-channel ordering is FIFO; cross-channel ordering is undefined.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload. Non-blocking; a channel with no subscribers
    /// swallows the message.
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// Subscribe to a channel. Only payloads published after this call are
    /// delivered.
    async fn subscribe(&self, channel: &str) -> BoxStream<'static, String>;

    /// Drop the channel's broadcast state once its stream is finished.
    fn cleanup_channel(&self, channel: &str);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory broker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-process broker with Redis-pub/sub-shaped behaviour.
pub struct MemoryBus {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.write();
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Number of live channels (for introspection).
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Number of active subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let tx = {
            let channels = self.channels.read();
            channels.get(channel).cloned()
        };
        match tx {
            // send() fails only when every receiver is gone, which is
            // equivalent to publishing to an unsubscribed Redis channel.
            Some(tx) => {
                let _ = tx.send(payload);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn subscribe(&self, channel: &str) -> BoxStream<'static, String> {
        let mut rx = self.sender(channel).subscribe();
        let channel = channel.to_owned();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(payload) => yield payload,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(channel = %channel, missed = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn cleanup_channel(&self, channel: &str) {
        self.channels.write().remove(channel);
    }
}
