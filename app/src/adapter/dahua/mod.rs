mod key_value;

pub use key_value::parse_frame;

use super::EventDialect;
use crate::core::RawEvent;

pub const PROBE_PATH: &str = "/cgi-bin/configManager.cgi?action=getConfig&name=General";

const HEARTBEAT: &str = "Heartbeat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DahuaDialect {
    channel: Option<String>,
    events: Vec<String>,
}

impl DahuaDialect {
    pub fn new(channel: Option<String>, events: Vec<String>) -> Self {
        Self {
            channel: channel.filter(|c| !c.is_empty()),
            events,
        }
    }
}

impl EventDialect for DahuaDialect {
    fn stream_path(&self) -> String {
        let codes = if self.events.is_empty() {
            "All".to_string()
        } else {
            self.events.join(",")
        };

        let mut path = format!("/cgi-bin/eventManager.cgi?action=attach&codes=[{}]", codes);
        if let Some(channel) = &self.channel {
            path.push_str(&format!("&channel={}", channel));
        }
        path.push_str("&heartbeat=10");

        path
    }

    fn parse(&self, body: &str) -> anyhow::Result<Option<RawEvent>> {
        if body == HEARTBEAT {
            return Ok(None);
        }

        parse_frame(body, ";")
    }
}
