use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::adapter::StreamReader;
use crate::adapter::http::{DeviceConnection, negotiate};
use crate::core::resilience::ReconnectBackoff;
use crate::core::{AuthMethod, Device, EventSender, Lifecycle};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// 0 reconnects immediately after every session.
    #[serde(default)]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// A camera that does not answer the auth probe in time is abandoned.
    #[serde(default = "default_negotiate_timeout_secs")]
    pub negotiate_timeout_secs: u64,
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_negotiate_timeout_secs() -> u64 {
    10
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 0,
            max_delay_secs: default_max_delay_secs(),
            negotiate_timeout_secs: default_negotiate_timeout_secs(),
        }
    }
}

impl ReconnectConfig {
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            Duration::from_secs(self.base_delay_secs),
            Duration::from_secs(self.max_delay_secs),
        )
    }

    fn negotiate_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiate_timeout_secs)
    }
}

pub struct DeviceSupervisor {
    client: ClientWithMiddleware,
    reconnect: ReconnectConfig,
}

impl DeviceSupervisor {
    pub fn new(client: ClientWithMiddleware, reconnect: ReconnectConfig) -> Self {
        Self { client, reconnect }
    }

    /// Spawns one task per device. Each task negotiates auth on its own before its reader starts,
    /// so a silent camera never delays the others. Returns the number of spawned devices.
    pub fn start(&self, devices: Vec<Device>, events: &EventSender, lifecycle: &mut Lifecycle) -> usize {
        let count = devices.len();

        for device in devices {
            lifecycle.spawn(
                format!("{} camera {}", device.vendor.family(), device.name),
                run_device(self.client.clone(), device, events.clone(), self.reconnect.clone()),
            );
        }

        count
    }
}

#[tracing::instrument(skip_all, fields(device = %device.name))]
async fn run_device(client: ClientWithMiddleware, device: Device, events: EventSender, reconnect: ReconnectConfig) {
    let reader = StreamReader::for_device(&device);
    let name = device.name.clone();
    let family = device.vendor.family();

    let timeout = reconnect.negotiate_timeout();
    let conn = match tokio::time::timeout(timeout, negotiate(&client, device, reader.probe_path())).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::error!("Skipping {} camera {}: {}", family, name, e);
            return;
        }
        Err(_) => {
            tracing::error!("Skipping {} camera {}: no answer to auth probe within {:?}", family, name, timeout);
            return;
        }
    };

    if reader == StreamReader::HikvisionRawTcp && conn.auth_method() == AuthMethod::Digest {
        tracing::warn!(
            "Camera {} requires Digest auth which raw TCP streaming does not support, sending Basic anyway",
            name
        );
    }

    tracing::info!("Adding {} camera {} ({} auth)", family, name, conn.auth_method());
    supervise(reader, conn, events, reconnect.backoff()).await;
}

/// Restarts the reader until it fails permanently.
async fn supervise(reader: StreamReader, mut conn: DeviceConnection, events: EventSender, mut backoff: ReconnectBackoff) {
    let name = conn.device().name.clone();

    loop {
        match reader.read_events(&mut conn, &events).await {
            Ok(()) => {
                tracing::info!("Event stream of {} ended, reconnecting", name);
                backoff.reset();
            }
            Err(e) if e.is_permanent() => {
                tracing::error!("Giving up on camera {}: {}", name, e);
                break;
            }
            Err(e) => {
                tracing::warn!("Event stream of {} failed, reconnecting: {}", name, e);
            }
        }

        infrastructure::meter::increment("alarm_session_restarts", &[("device", name.as_str())]);

        let delay = backoff.next_delay();
        if !delay.is_zero() {
            tracing::debug!("Waiting {:?} before reconnecting to {}", delay, name);
            tokio::time::sleep(delay).await;
        }
    }

    tracing::info!("Closed connection to camera {}", name);
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use tokio::net::TcpListener;

    use super::*;
    use crate::core::{Vendor, event_queue};

    fn client() -> ClientWithMiddleware {
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build()
    }

    fn device(name: &str, base_url: String, vendor: Vendor) -> Device {
        Device {
            name: name.to_string(),
            base_url,
            username: "admin".to_string(),
            password: "secret".to_string(),
            vendor,
        }
    }

    #[tokio::test]
    async fn missing_boundary_abandons_device() {
        let mut server = Server::new_async().await;
        let stream = server
            .mock("GET", "/ISAPI/Event/notification/alertStream")
            .with_status(200)
            .with_header("content-type", "multipart/mixed")
            .expect(1)
            .create_async()
            .await;

        let hik = device(
            "porch",
            format!("{}/ISAPI/", server.url()),
            Vendor::Hikvision { raw_tcp: false },
        );
        let conn = DeviceConnection::basic(hik, client());
        let (sender, _rx) = event_queue(1);

        tokio::time::timeout(
            Duration::from_secs(2),
            supervise(StreamReader::HikvisionHttp, conn, sender, ReconnectConfig::default().backoff()),
        )
        .await
        .expect("supervision stops on non-conformant camera");

        stream.assert_async().await;
    }

    #[tokio::test]
    async fn reconnects_with_fresh_edge_state() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/cgi-bin/eventManager\.cgi".into()))
            .with_status(200)
            .with_header("content-type", "multipart/x-mixed-replace; boundary=myboundary")
            .with_body("--myboundary\r\n\r\nCode=VideoMotion; action=Start; index=0\r\n--myboundary--\r\n")
            .create_async()
            .await;

        let amcrest = device("driveway", server.url(), Vendor::Amcrest);
        let conn = DeviceConnection::basic(amcrest, client());
        let (sender, mut rx) = event_queue(1);

        let task = tokio::spawn(supervise(
            StreamReader::Amcrest,
            conn,
            sender,
            ReconnectConfig::default().backoff(),
        ));

        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("event after reconnect")
                .unwrap();
            assert_eq!(event.source_name, "driveway");
            assert_eq!(event.event_type, "VideoMotion");
        }

        task.abort();
    }

    #[tokio::test]
    async fn abandons_devices_failing_negotiation() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/ISAPI/System/status")
            .with_status(401)
            .with_header("www-authenticate", r#"Basic realm="cam""#)
            .create_async()
            .await;
        let stream = server
            .mock("GET", "/ISAPI/Event/notification/alertStream")
            .expect(0)
            .create_async()
            .await;

        let supervisor = DeviceSupervisor::new(client(), ReconnectConfig::default());
        let (sender, _rx) = event_queue(1);
        let mut lifecycle = Lifecycle::new();

        let started = supervisor.start(
            vec![device(
                "yard",
                format!("{}/ISAPI/", server.url()),
                Vendor::Hikvision { raw_tcp: false },
            )],
            &sender,
            &mut lifecycle,
        );
        assert_eq!(started, 1);

        tokio::time::timeout(Duration::from_secs(2), lifecycle.wait())
            .await
            .expect("device task ends after failed negotiation");
        stream.assert_async().await;
    }

    #[tokio::test]
    async fn silent_camera_does_not_block_others() {
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_url = format!("http://{}/ISAPI/", silent.local_addr().unwrap());
        let accepted = tokio::spawn(async move {
            let (socket, _) = silent.accept().await.unwrap();
            futures::future::pending::<()>().await;
            drop(socket);
        });

        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"^/cgi-bin/eventManager\.cgi".into()))
            .with_status(200)
            .with_header("content-type", "multipart/x-mixed-replace; boundary=myboundary")
            .with_body("--myboundary\r\n\r\nCode=VideoMotion; action=Start; index=0\r\n--myboundary--\r\n")
            .create_async()
            .await;

        let reconnect = ReconnectConfig {
            base_delay_secs: 1,
            negotiate_timeout_secs: 1,
            ..ReconnectConfig::default()
        };
        let supervisor = DeviceSupervisor::new(client(), reconnect);
        let (sender, mut rx) = event_queue(1);
        let mut lifecycle = Lifecycle::new();

        let started = supervisor.start(
            vec![
                device("doorbell", silent_url, Vendor::Hikvision { raw_tcp: false }),
                device("driveway", server.url(), Vendor::Amcrest),
            ],
            &sender,
            &mut lifecycle,
        );
        assert_eq!(started, 2);
        assert_eq!(lifecycle.task_count(), 2);

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("healthy camera streams while the silent one is still probed")
            .unwrap();
        assert_eq!(event.source_name, "driveway");

        lifecycle.shutdown().await;
        accepted.abort();
    }

    #[tokio::test]
    async fn silent_camera_is_abandoned_after_timeout() {
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_url = format!("http://{}/ISAPI/", silent.local_addr().unwrap());
        let accepted = tokio::spawn(async move {
            let (socket, _) = silent.accept().await.unwrap();
            futures::future::pending::<()>().await;
            drop(socket);
        });

        let reconnect = ReconnectConfig {
            negotiate_timeout_secs: 1,
            ..ReconnectConfig::default()
        };
        let (sender, _rx) = event_queue(1);

        tokio::time::timeout(
            Duration::from_secs(3),
            run_device(
                client(),
                device("doorbell", silent_url, Vendor::Hikvision { raw_tcp: false }),
                sender,
                reconnect,
            ),
        )
        .await
        .expect("negotiation gives up on a silent camera");

        accepted.abort();
    }
}
