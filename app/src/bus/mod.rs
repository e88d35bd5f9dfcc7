pub mod mqtt;
pub mod webhooks;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::core::{CanonicalEvent, EventHandler};
use mqtt::MqttBus;
use webhooks::WebhookBus;

/// Every enabled bus gets every event.
#[derive(Clone, Default)]
pub struct Buses {
    mqtt: Option<MqttBus>,
    webhooks: Option<WebhookBus>,
}

impl Buses {
    pub fn new(mqtt: Option<MqttBus>, webhooks: Option<WebhookBus>) -> Self {
        Self { mqtt, webhooks }
    }

    pub fn is_empty(&self) -> bool {
        self.mqtt.is_none() && self.webhooks.is_none()
    }
}

impl EventHandler for Buses {
    fn handle(&self, event: CanonicalEvent) -> BoxFuture<'static, ()> {
        let buses = self.clone();

        async move {
            let mqtt = async {
                if let Some(mqtt) = &buses.mqtt {
                    mqtt.publish(&event).await;
                }
            };
            let webhooks = async {
                if let Some(webhooks) = &buses.webhooks {
                    webhooks.deliver(&event).await;
                }
            };

            tokio::join!(mqtt, webhooks);
        }
        .boxed()
    }
}
