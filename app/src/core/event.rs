use tokio::sync::mpsc;

use super::error::StreamError;

pub const EVENT_QUEUE_CAPACITY: usize = 5;

/// Vendor-neutral alarm handed to the buses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub source_name: String,
    pub event_type: String,
    pub message: String,
}

impl CanonicalEvent {
    pub fn new(source_name: impl Into<String>, event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            event_type: event_type.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Active,
    Inactive,
    Other,
}

/// One decoded frame of a vendor event stream, before edge detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub code: String,
    pub action: String,
    pub state: EventState,
    pub index: Option<u32>,
    pub data: Option<String>,
}

impl RawEvent {
    pub fn message(&self) -> &str {
        match &self.data {
            Some(data) if !data.is_empty() => data,
            _ => &self.action,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<CanonicalEvent>,
}

pub fn event_queue(capacity: usize) -> (EventSender, mpsc::Receiver<CanonicalEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, rx)
}

impl EventSender {
    /// Waits while the queue is full. Fails only once the dispatcher is gone.
    pub async fn emit(&self, event: CanonicalEvent) -> Result<(), StreamError> {
        tracing::info!(
            "Event {} from {}: {}",
            event.event_type,
            event.source_name,
            event.message
        );
        infrastructure::meter::increment(
            "alarm_events_emitted",
            &[("source", event.source_name.as_str()), ("event", event.event_type.as_str())],
        );

        self.tx.send(event).await.map_err(|_| StreamError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_falls_back_to_action() {
        let mut event = RawEvent {
            code: "VideoMotion".to_string(),
            action: "Start".to_string(),
            state: EventState::Active,
            index: Some(0),
            data: None,
        };
        assert_eq!(event.message(), "Start");

        event.data = Some(String::new());
        assert_eq!(event.message(), "Start");

        event.data = Some("{\"Id\": [0]}".to_string());
        assert_eq!(event.message(), "{\"Id\": [0]}");
    }

    #[tokio::test]
    async fn emit_fails_when_queue_closed() {
        let (sender, rx) = event_queue(1);
        drop(rx);

        let result = sender.emit(CanonicalEvent::new("cam", "VideoMotion", "Start")).await;
        assert!(matches!(result, Err(StreamError::QueueClosed)));
    }
}
