use std::sync::Arc;
use std::time::Duration;

use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{ConnectProperties, LastWill, Packet};
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};

use super::{MqttConfig, MqttSender};

pub struct Mqtt {
    client: Arc<AsyncClient>,
    event_loop: EventLoop,
    host: String,
}

impl Mqtt {
    pub(super) fn connect(config: &MqttConfig, will_topic: &str, will_payload: &str) -> Self {
        let mut mqttoptions = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        mqttoptions.set_clean_start(true);

        if let Some(username) = &config.username {
            mqttoptions.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        mqttoptions.set_last_will(LastWill::new(
            will_topic.to_owned(),
            will_payload.to_owned(),
            QoS::AtMostOnce,
            false,
            None,
        ));

        let mut connect_props = ConnectProperties::new();
        connect_props.max_packet_size = Some(1024 * 1024);
        mqttoptions.set_connect_properties(connect_props);

        let (client, event_loop) = AsyncClient::new(mqttoptions, 10);

        Mqtt {
            client: Arc::new(client),
            event_loop,
            host: config.host.clone(),
        }
    }

    pub fn sender(&self) -> MqttSender {
        MqttSender::new(self.client.clone())
    }

    /// Drives the connection. rumqttc reconnects on the next poll after an error.
    pub async fn run(mut self) {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("MQTT connected to {}", self.host);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("MQTT error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
