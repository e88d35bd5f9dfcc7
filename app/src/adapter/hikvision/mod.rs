pub mod raw_tcp;

use serde::Deserialize;

use super::EventDialect;
use crate::core::{EventState, RawEvent};

pub const PROBE_PATH: &str = "System/status";
pub const STREAM_PATH: &str = "Event/notification/alertStream";

#[derive(Debug, Deserialize)]
struct EventNotificationAlert {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "eventState", default)]
    event_state: String,
    #[serde(rename = "eventDescription", default)]
    event_description: String,
    #[serde(rename = "channelID", default)]
    channel_id: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HikvisionDialect;

impl EventDialect for HikvisionDialect {
    fn stream_path(&self) -> String {
        STREAM_PATH.to_string()
    }

    fn requires_mixed(&self) -> bool {
        true
    }

    fn parse(&self, body: &str) -> anyhow::Result<Option<RawEvent>> {
        parse_alert(body).map(Some)
    }
}

pub fn parse_alert(xml: &str) -> anyhow::Result<RawEvent> {
    let alert: EventNotificationAlert = quick_xml::de::from_str(xml)?;

    let state = match alert.event_state.as_str() {
        "active" => EventState::Active,
        "inactive" => EventState::Inactive,
        _ => EventState::Other,
    };

    Ok(RawEvent {
        code: alert.event_type,
        action: alert.event_state,
        state,
        index: alert.channel_id,
        data: Some(alert.event_description).filter(|d| !d.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOTION_ALERT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<EventNotificationAlert version="2.0" xmlns="http://www.hikvision.com/ver20/XMLSchema">
<ipAddress>192.168.1.64</ipAddress>
<portNo>80</portNo>
<protocol>HTTP</protocol>
<channelID>1</channelID>
<dateTime>2024-03-01T10:15:00+01:00</dateTime>
<activePostCount>1</activePostCount>
<eventType>VMD</eventType>
<eventState>active</eventState>
<eventDescription>Motion alarm</eventDescription>
</EventNotificationAlert>"#;

    #[test]
    fn parses_motion_alert() {
        let event = parse_alert(MOTION_ALERT).unwrap();

        assert_eq!(event.code, "VMD");
        assert_eq!(event.state, EventState::Active);
        assert_eq!(event.index, Some(1));
        assert_eq!(event.message(), "Motion alarm");
    }

    #[test]
    fn parses_inactive_heartbeat() {
        let event = parse_alert(
            "<EventNotificationAlert><eventType>videoloss</eventType><eventState>inactive</eventState></EventNotificationAlert>",
        )
        .unwrap();

        assert_eq!(event.code, "videoloss");
        assert_eq!(event.state, EventState::Inactive);
        assert_eq!(event.data, None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_alert("not xml at all").is_err());
        assert!(HikvisionDialect.parse("<EventNotificationAlert></EventNotificationAlert>").is_err());
    }
}
