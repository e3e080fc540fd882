use tokio::sync::broadcast;

use fame_domain::trace::TraceEvent;

/// Process-wide event bus handed to plugins at init.
///
/// Events are also logged through `tracing`; the bus exists so plugins and
/// the gateway can observe decisions without polling.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TraceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to subscribers and the structured log.
    pub fn publish(&self, event: TraceEvent) {
        event.emit();
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(TraceEvent::SingleFlightJoined { query_hash: 42 });

        match rx.recv().await.unwrap() {
            TraceEvent::SingleFlightJoined { query_hash } => assert_eq!(query_hash, 42),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(TraceEvent::SingleFlightJoined { query_hash: 1 });
    }
}
