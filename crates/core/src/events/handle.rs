use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::PipelineEvent;

/// Envelope wrapping a pipeline event with its emission timestamp
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

/// Handle for emitting pipeline events
///
/// Cheaply cloneable and shareable across tasks. Events flow through a
/// bounded async channel to the background writer; a full or closed channel
/// drops the event with a log line, never an error to the caller.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    /// Create a new event handle from a channel sender
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event asynchronously
    ///
    /// Waits for channel capacity but never fails the caller; a closed
    /// channel is logged and ignored.
    pub async fn emit(&self, event: PipelineEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit pipeline event: {}", e);
        }
    }

    /// Try to emit an event without blocking
    ///
    /// Returns true if the event was accepted.
    pub fn try_emit(&self, event: PipelineEvent) -> bool {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit pipeline event: {}", e);
                false
            }
        }
    }
}
