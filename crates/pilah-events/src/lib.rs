//! In-process event bus carrying cycle events to adapters.

use async_trait::async_trait;
use futures::{future, stream::BoxStream, StreamExt};
use pilah_types::{
    classification::{ClassificationFailure, ClassificationResult},
    events::{CycleEvent, EventPayload},
    Result,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CycleEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, CycleEvent>;

    /// Stream of successful classifications only.
    fn on_result(&self) -> BoxStream<'static, ClassificationResult> {
        self.subscribe()
            .filter_map(|event| {
                future::ready(match event.payload {
                    EventPayload::Result(result) => Some(result),
                    _ => None,
                })
            })
            .boxed()
    }

    /// Stream of failures only.
    fn on_failure(&self) -> BoxStream<'static, ClassificationFailure> {
        self.subscribe()
            .filter_map(|event| {
                future::ready(match event.payload {
                    EventPayload::Failure(failure) => Some(failure),
                    _ => None,
                })
            })
            .boxed()
    }
}

/// Broadcast-channel bus. Publishing without subscribers is not an error.
#[derive(Clone)]
pub struct LocalEventBus {
    tx: broadcast::Sender<CycleEvent>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, event: CycleEvent) -> Result<()> {
        debug!("Publishing {:?} event {}", event.kind(), event.id);
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, CycleEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged; {} event(s) dropped", skipped);
                        None
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilah_types::{classification::WasteCategory, ErrorKind};

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = LocalEventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(CycleEvent::new(EventPayload::Status("hello".into())))
            .await
            .expect("publish");
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = LocalEventBus::new(8);
        let mut events = bus.subscribe();
        bus.publish(CycleEvent::new(EventPayload::Status("one".into())))
            .await
            .expect("publish");
        bus.publish(CycleEvent::new(EventPayload::Notice("two".into())))
            .await
            .expect("publish");

        let first = events.next().await.expect("first");
        let second = events.next().await.expect("second");
        assert!(matches!(first.payload, EventPayload::Status(ref s) if s == "one"));
        assert!(matches!(second.payload, EventPayload::Notice(ref s) if s == "two"));
    }

    #[tokio::test]
    async fn result_and_failure_streams_filter_payloads() {
        let bus = LocalEventBus::new(8);
        let mut results = bus.on_result();
        let mut failures = bus.on_failure();

        bus.publish(CycleEvent::new(EventPayload::Status("classifying".into())))
            .await
            .expect("publish");
        let result = ClassificationResult::new(WasteCategory::Anorganik, 0.9).expect("result");
        bus.publish(CycleEvent::new(EventPayload::Result(result.clone())))
            .await
            .expect("publish");
        let failure = ClassificationFailure::new(ErrorKind::ModelNotReady, "model not loaded");
        bus.publish(CycleEvent::new(EventPayload::Failure(failure.clone())))
            .await
            .expect("publish");

        assert_eq!(results.next().await.expect("result"), result);
        assert_eq!(failures.next().await.expect("failure"), failure);
    }
}
