use infrastructure::MqttSender;

use crate::core::CanonicalEvent;

pub const STATUS_UP: &str = r#"{ "status": "up" }"#;
pub const STATUS_DOWN: &str = r#"{ "status": "down" }"#;

pub fn status_topic(topic_root: &str) -> String {
    format!("{}/alarmserver", topic_root)
}

fn event_topic(topic_root: &str, event: &CanonicalEvent) -> String {
    format!("{}/{}/{}", topic_root, event.source_name, event.event_type)
}

#[derive(Clone)]
pub struct MqttBus {
    sender: MqttSender,
    topic_root: String,
}

impl MqttBus {
    pub fn new(sender: MqttSender, topic_root: impl Into<String>) -> Self {
        Self {
            sender,
            topic_root: topic_root.into(),
        }
    }

    /// Counterpart of the last will registered on connect.
    pub async fn announce(&self) {
        if let Err(e) = self.sender.send_transient(status_topic(&self.topic_root), STATUS_UP).await {
            tracing::error!("Error announcing gateway status: {:?}", e);
        }
    }

    pub async fn publish(&self, event: &CanonicalEvent) {
        let topic = event_topic(&self.topic_root, event);

        match self.sender.send_transient(topic.clone(), event.message.clone()).await {
            Ok(()) => infrastructure::meter::increment("alarm_deliveries", &[("bus", "mqtt"), ("result", "ok")]),
            Err(e) => {
                tracing::error!("Error publishing alarm to {}: {:?}", topic, e);
                infrastructure::meter::increment("alarm_deliveries", &[("bus", "mqtt"), ("result", "error")]);
            }
        }
    }
}
