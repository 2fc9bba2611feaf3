//! Trigger plumbing between capability modules and the dispatcher.
//!
//! [`TriggerSink`] is the submit half handed to every module at wiring time;
//! [`TriggerQueue`] is the receive half owned by the dispatcher.  Submitting
//! never blocks: the queue is unbounded and admission control happens later,
//! at the decision lock.

use synapse_types::{SynapseError, Trigger};
use tokio::sync::mpsc;

/// Non-blocking submit handle.  Clone it freely.
#[derive(Debug, Clone)]
pub struct TriggerSink {
    sender: mpsc::UnboundedSender<Trigger>,
}

impl TriggerSink {
    /// Create a connected sink/queue pair.
    pub fn channel() -> (TriggerSink, TriggerQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (TriggerSink { sender }, TriggerQueue { receiver })
    }

    /// Enqueue `trigger` without waiting.
    ///
    /// # Errors
    ///
    /// [`SynapseError::Channel`] once the queue has been dropped.
    pub fn submit(&self, trigger: Trigger) -> Result<(), SynapseError> {
        self.sender.send(trigger).map_err(|e| {
            SynapseError::Channel(format!(
                "trigger queue closed: dropped trigger from `{}`",
                e.0.source
            ))
        })
    }

    /// `true` once the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receive half of the trigger channel.
#[derive(Debug)]
pub struct TriggerQueue {
    receiver: mpsc::UnboundedReceiver<Trigger>,
}

impl TriggerQueue {
    /// Wait for the next trigger.  `None` once every sink is dropped.
    pub async fn next(&mut self) -> Option<Trigger> {
        self.receiver.recv().await
    }

    /// Triggers currently buffered.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
