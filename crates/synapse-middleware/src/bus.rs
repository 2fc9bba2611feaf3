//! Headless publish/subscribe bus for [`Activity`] records.
//!
//! Uses a [`tokio::sync::broadcast`] channel so every subscriber sees every
//! record without any subscriber blocking the publisher.  Nothing in the
//! decision path depends on anyone listening: publishing with no subscribers
//! is a no-op.

use synapse_types::{Activity, ActivityKind};
use tokio::sync::broadcast;
use tracing::warn;

/// Default number of buffered records before slow subscribers lag.
const DEFAULT_CAPACITY: usize = 256;

/// Shared activity bus.  Clones share the same channel.
#[derive(Clone, Debug)]
pub struct ActivityBus {
    sender: broadcast::Sender<Activity>,
}

impl ActivityBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `activity`.  Returns the number of subscribers reached.
    pub fn publish(&self, activity: Activity) -> usize {
        self.sender.send(activity).unwrap_or(0)
    }

    /// Shorthand for publishing a freshly stamped record.
    pub fn emit(&self, source: &str, kind: ActivityKind) -> usize {
        self.publish(Activity::new(source, kind))
    }

    /// Receive every record.
    pub fn subscribe(&self) -> broadcast::Receiver<Activity> {
        self.sender.subscribe()
    }

    /// Receive only records whose `source` starts with `prefix`.
    pub fn subscribe_source(&self, prefix: impl Into<String>) -> SourceSubscriber {
        SourceSubscriber {
            prefix: prefix.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A subscriber filtered by source prefix.
pub struct SourceSubscriber {
    prefix: String,
    receiver: broadcast::Receiver<Activity>,
}

impl SourceSubscriber {
    /// Next matching record, or `None` once the bus is gone.  Lag is logged
    /// and skipped.
    pub async fn recv(&mut self) -> Option<Activity> {
        loop {
            match self.receiver.recv().await {
                Ok(activity) if activity.source.starts_with(&self.prefix) => return Some(activity),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(prefix = %self.prefix, lagged_by = n, "activity subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
