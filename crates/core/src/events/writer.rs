use std::sync::Arc;

use tokio::sync::mpsc;

use super::{EventEnvelope, EventHandle, EventRecord, EventStore};

/// Background task that receives pipeline events and writes them to storage
pub struct EventWriter {
    rx: mpsc::Receiver<EventEnvelope>,
    store: Arc<dyn EventStore>,
}

impl EventWriter {
    /// Create a new event writer
    pub fn new(rx: mpsc::Receiver<EventEnvelope>, store: Arc<dyn EventStore>) -> Self {
        Self { rx, store }
    }

    /// Run the writer, consuming events until the channel is closed
    ///
    /// This should be spawned as a background task. Storage failures are
    /// logged and swallowed; the writer keeps going.
    pub async fn run(mut self) {
        tracing::info!("Event writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = EventRecord {
                id: 0, // Will be set by the store
                timestamp: envelope.timestamp,
                level: envelope.event.level(),
                event_type: envelope.event.event_type().to_string(),
                request_id: envelope.event.request_id().map(String::from),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write pipeline event: {}", e);
            }
        }

        tracing::info!("Event writer shutting down");
    }
}

/// Create a complete event system
///
/// Returns:
/// - `EventHandle` - for emitting events (clone this to share across tasks)
/// - `EventWriter` - spawn this as a background task with `tokio::spawn(writer.run())`
pub fn create_event_system(
    store: Arc<dyn EventStore>,
    buffer_size: usize,
) -> (EventHandle, EventWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = EventHandle::new(tx);
    let writer = EventWriter::new(rx, store);
    (handle, writer)
}
