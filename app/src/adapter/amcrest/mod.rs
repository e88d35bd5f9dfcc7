use super::EventDialect;
use super::dahua::parse_frame;
use crate::core::RawEvent;

pub const STREAM_PATH: &str = "/cgi-bin/eventManager.cgi?action=attach&codes=All";

/// Amcrest speaks the Dahua key/value format with `"; "` between fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmcrestDialect;

impl EventDialect for AmcrestDialect {
    fn stream_path(&self) -> String {
        STREAM_PATH.to_string()
    }

    fn parse(&self, body: &str) -> anyhow::Result<Option<RawEvent>> {
        parse_frame(body, "; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventState;

    #[test]
    fn parses_spaced_frames() {
        let event = AmcrestDialect
            .parse("Code=VideoMotion; action=Start; index=0")
            .unwrap()
            .unwrap();

        assert_eq!(event.code, "VideoMotion");
        assert_eq!(event.state, EventState::Active);
        assert_eq!(event.index, Some(0));
    }

    #[test]
    fn stop_frame_is_inactive() {
        let event = AmcrestDialect
            .parse("Code=AlarmLocal; action=Stop; index=3")
            .unwrap()
            .unwrap();

        assert_eq!(event.state, EventState::Inactive);
        assert_eq!(event.message(), "Stop");
    }
}
