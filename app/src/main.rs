use std::sync::Arc;

use alarm_gateway::adapter::hisilicon::LegacyListener;
use alarm_gateway::bus::Buses;
use alarm_gateway::bus::mqtt::{MqttBus, STATUS_DOWN, status_topic};
use alarm_gateway::bus::webhooks::WebhookBus;
use alarm_gateway::core::event::EVENT_QUEUE_CAPACITY;
use alarm_gateway::core::{EventDispatcher, EventHandler, Lifecycle, event_queue};
use alarm_gateway::settings::Settings;
use alarm_gateway::supervisor::DeviceSupervisor;
use infrastructure::Mqtt;
use reqwest_middleware::ClientWithMiddleware;

struct Infrastructure {
    http_client: ClientWithMiddleware,
    mqtt_client: Option<Mqtt>,
}

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let mut settings = Settings::new().expect("Error reading configuration");

    let infrastructure = Infrastructure::init(&mut settings).expect("Error initializing infrastructure");

    let (events, queue) = event_queue(EVENT_QUEUE_CAPACITY);
    let mut lifecycle = Lifecycle::new();

    let mqtt_bus = infrastructure
        .mqtt_client
        .as_ref()
        .map(|mqtt| MqttBus::new(mqtt.sender(), settings.mqtt.topic_root.clone()));
    let webhook_bus = settings
        .webhooks
        .enabled
        .then(|| WebhookBus::new(infrastructure.http_client.clone(), settings.webhooks()));

    let buses = Buses::new(mqtt_bus.clone(), webhook_bus);
    let handler = (!buses.is_empty()).then(|| Arc::new(buses) as Arc<dyn EventHandler>);

    tracing::info!("Starting event dispatcher");
    lifecycle.spawn("event dispatcher", EventDispatcher::new(queue, handler).run());

    if let Some(mqtt_client) = infrastructure.mqtt_client {
        lifecycle.spawn("mqtt client", mqtt_client.run());
    }
    if let Some(mqtt_bus) = mqtt_bus {
        lifecycle.spawn("mqtt status", async move { mqtt_bus.announce().await });
    }

    if settings.hisilicon.enabled {
        let listener = LegacyListener::bind(settings.hisilicon.port, events.clone())
            .await
            .expect("Error starting HiSilicon listener");
        lifecycle.spawn("hisilicon listener", listener.run());
    }

    tracing::info!("Starting cameras");
    let supervisor = DeviceSupervisor::new(infrastructure.http_client, settings.reconnect.clone());
    let started = supervisor.start(settings.devices(), &events, &mut lifecycle);
    tracing::info!("Started {} cameras", started);
    drop(events);

    tracing::info!("Starting main loop with {} tasks", lifecycle.task_count());

    tokio::select!(
        _ = lifecycle.wait() => tracing::info!("All tasks finished"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Received interrupt"),
    );

    lifecycle.shutdown().await;
}

impl Infrastructure {
    fn init(settings: &mut Settings) -> anyhow::Result<Self> {
        settings.monitoring.init().expect("Error initializing monitoring");
        settings.validate()?;

        let http_client = settings.http_client.new_tracing_client()?;

        let mqtt_client = settings.mqtt.enabled.then(|| {
            settings
                .broker()
                .new_client(&status_topic(&settings.mqtt.topic_root), STATUS_DOWN)
        });

        Ok(Self {
            http_client,
            mqtt_client,
        })
    }
}
