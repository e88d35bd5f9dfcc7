use std::collections::HashSet;

use super::error::StreamError;
use super::event::{CanonicalEvent, EventSender, EventState, RawEvent};

/// Per-session record of which event codes are currently active.
#[derive(Debug, Default)]
pub struct EdgeState {
    active: HashSet<String>,
}

impl EdgeState {
    /// Returns true only on an inactive to active transition of `code`.
    pub fn observe(&mut self, code: &str, state: EventState) -> bool {
        match state {
            EventState::Active => self.active.insert(code.to_string()),
            EventState::Inactive => {
                self.active.remove(code);
                false
            }
            EventState::Other => false,
        }
    }
}

/// Turns a session's raw frames into canonical events on rising edges only.
pub struct EdgeTriggeredEmitter<'a> {
    source_name: &'a str,
    state: EdgeState,
    events: &'a EventSender,
}

impl<'a> EdgeTriggeredEmitter<'a> {
    pub fn new(source_name: &'a str, events: &'a EventSender) -> Self {
        Self {
            source_name,
            state: EdgeState::default(),
            events,
        }
    }

    pub async fn process(&mut self, raw: RawEvent) -> Result<(), StreamError> {
        tracing::debug!(
            "{} frame {} {} (index {:?})",
            self.source_name,
            raw.code,
            raw.action,
            raw.index
        );

        if !self.state.observe(&raw.code, raw.state) {
            return Ok(());
        }

        let event = CanonicalEvent::new(self.source_name, raw.code.clone(), raw.message());
        self.events.emit(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::event_queue;

    fn raw(code: &str, state: EventState) -> RawEvent {
        RawEvent {
            code: code.to_string(),
            action: format!("{:?}", state),
            state,
            index: None,
            data: None,
        }
    }

    #[test]
    fn emits_only_on_rising_edge() {
        let mut state = EdgeState::default();

        assert!(state.observe("VMD", EventState::Active));
        assert!(!state.observe("VMD", EventState::Active));
        assert!(!state.observe("VMD", EventState::Inactive));
        assert!(state.observe("VMD", EventState::Active));
    }

    #[test]
    fn tracks_codes_independently() {
        let mut state = EdgeState::default();

        assert!(state.observe("VMD", EventState::Active));
        assert!(state.observe("linedetection", EventState::Active));
        assert!(!state.observe("VMD", EventState::Active));
        assert!(!state.observe("tamper", EventState::Other));
    }

    #[test]
    fn inactive_first_does_not_emit() {
        let mut state = EdgeState::default();

        assert!(!state.observe("VMD", EventState::Inactive));
        assert!(state.observe("VMD", EventState::Active));
    }

    #[tokio::test]
    async fn emitter_forwards_rising_edges() {
        let (sender, mut rx) = event_queue(8);
        let mut emitter = EdgeTriggeredEmitter::new("garage", &sender);

        for state in [
            EventState::Active,
            EventState::Active,
            EventState::Inactive,
            EventState::Active,
        ] {
            emitter.process(raw("VideoMotion", state)).await.unwrap();
        }
        drop(emitter);
        drop(sender);

        let mut received = vec![];
        while let Some(event) = rx.recv().await {
            received.push(event);
        }

        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|e| e.source_name == "garage" && e.event_type == "VideoMotion"));
    }
}
