use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::event::CanonicalEvent;

pub trait EventHandler: Send + Sync {
    /// Delivery must not fail the caller; implementations log their own errors.
    fn handle(&self, event: CanonicalEvent) -> BoxFuture<'static, ()>;
}

/// Used when no bus is configured so alarms at least end up in the log.
pub struct LostEventLogger;

impl EventHandler for LostEventLogger {
    fn handle(&self, event: CanonicalEvent) -> BoxFuture<'static, ()> {
        tracing::warn!(
            "Lost alarm from {}: {} {}",
            event.source_name,
            event.event_type,
            event.message
        );
        futures::future::ready(()).boxed()
    }
}

pub struct EventDispatcher {
    rx: mpsc::Receiver<CanonicalEvent>,
    handler: Arc<dyn EventHandler>,
}

impl EventDispatcher {
    pub fn new(rx: mpsc::Receiver<CanonicalEvent>, handler: Option<Arc<dyn EventHandler>>) -> Self {
        let handler = handler.unwrap_or_else(|| {
            tracing::warn!("No event bus configured, alarms will only be logged");
            Arc::new(LostEventLogger)
        });

        Self { rx, handler }
    }

    /// Each delivery runs in its own task so a slow bus does not stall the queue.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            let handler = self.handler.clone();
            tokio::spawn(async move {
                handler.handle(event).await;
            });
        }

        tracing::info!("Event queue closed, dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;
    use crate::core::event::{EVENT_QUEUE_CAPACITY, event_queue};

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<CanonicalEvent>>>,
    }

    impl EventHandler for Recorder {
        fn handle(&self, event: CanonicalEvent) -> BoxFuture<'static, ()> {
            let events = self.events.clone();
            async move {
                events.lock().await.push(event);
            }
            .boxed()
        }
    }

    fn event(n: usize) -> CanonicalEvent {
        CanonicalEvent::new("cam", format!("code{}", n), "Start")
    }

    #[tokio::test]
    async fn producer_blocks_when_queue_is_full() {
        let (sender, rx) = event_queue(EVENT_QUEUE_CAPACITY);

        for n in 0..EVENT_QUEUE_CAPACITY {
            sender.emit(event(n)).await.unwrap();
        }

        let blocked = tokio::time::timeout(Duration::from_millis(100), sender.emit(event(99))).await;
        assert!(blocked.is_err(), "emit must wait while the queue is full");

        let recorder = Recorder::default();
        let events = recorder.events.clone();
        let dispatcher = EventDispatcher::new(rx, Some(Arc::new(recorder)));
        let dispatcher_task = tokio::spawn(dispatcher.run());

        tokio::time::timeout(Duration::from_secs(1), sender.emit(event(EVENT_QUEUE_CAPACITY)))
            .await
            .expect("emit must resume once the dispatcher drains")
            .unwrap();

        drop(sender);
        dispatcher_task.await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while events.lock().await.len() < EVENT_QUEUE_CAPACITY + 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("all events delivered");

        let mut types: Vec<String> = events.lock().await.iter().map(|e| e.event_type.clone()).collect();
        types.sort();
        let mut expected: Vec<String> = (0..=EVENT_QUEUE_CAPACITY).map(|n| format!("code{}", n)).collect();
        expected.sort();
        assert_eq!(types, expected);
    }

    #[tokio::test]
    async fn falls_back_to_logger_without_handler() {
        let (sender, rx) = event_queue(EVENT_QUEUE_CAPACITY);
        let dispatcher = EventDispatcher::new(rx, None);
        let task = tokio::spawn(dispatcher.run());

        sender.emit(event(1)).await.unwrap();
        drop(sender);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("dispatcher stops when queue closes")
            .unwrap();
    }
}
