use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::core::{CanonicalEvent, EventSender};

pub const DEFAULT_PORT: u16 = 15002;

const MAX_PAYLOAD: u64 = 64 * 1024;

/// Accepts pushes from HiSilicon based DVRs/NVRs. One connection carries one message.
pub struct LegacyListener {
    listener: TcpListener,
    events: EventSender,
}

impl LegacyListener {
    pub async fn bind(port: u16, events: EventSender) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Error binding legacy listener to port {}", port))?;

        Ok(Self { listener, events })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => tracing::info!("Listening for HiSilicon alarms on {}", addr),
            Err(e) => tracing::warn!("Listening for HiSilicon alarms on unknown address: {}", e),
        }

        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    tokio::spawn(handle_connection(socket, peer, self.events.clone()));
                }
                Err(e) => {
                    tracing::error!("Error accepting HiSilicon connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

#[tracing::instrument(skip(socket, events))]
async fn handle_connection(socket: TcpStream, peer: SocketAddr, events: EventSender) {
    let mut payload = Vec::new();
    if let Err(e) = socket.take(MAX_PAYLOAD).read_to_end(&mut payload).await {
        tracing::warn!("Error reading HiSilicon message from {}: {}", peer, e);
        return;
    }

    let event = match decode_payload(&payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Dropping HiSilicon message from {}: {:?}", peer, e);
            infrastructure::meter::increment("alarm_legacy_messages_dropped", &[]);
            return;
        }
    };

    if let Err(e) = events.emit(event).await {
        tracing::error!("Error queueing HiSilicon alarm from {}: {}", peer, e);
    }
}

/// Decodes `<framing bytes>{json}` into an event keyed by the device serial.
pub fn decode_payload(payload: &[u8]) -> anyhow::Result<CanonicalEvent> {
    let text = String::from_utf8_lossy(payload);
    let start = text.find('{').ok_or_else(|| anyhow!("no JSON object in payload"))?;

    let mut fields: Map<String, Value> = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Map<String, Value>>()
        .next()
        .ok_or_else(|| anyhow!("empty JSON payload"))?
        .context("Error parsing JSON payload")?;

    if let Some(address) = fields.get("Address").map(value_to_string) {
        match hex_ip_to_dotted(&address) {
            Some(ip) => {
                fields.insert("ipAddr".to_string(), Value::String(ip));
            }
            None => tracing::warn!("Cannot decode HiSilicon address {}", address),
        }
    }

    let serial_id = fields
        .get("SerialID")
        .map(value_to_string)
        .ok_or_else(|| anyhow!("message without SerialID"))?;
    let event_type = fields.get("Event").map(value_to_string).unwrap_or_default();

    Ok(CanonicalEvent::new(serial_id, event_type, serde_json::to_string(&fields)?))
}

/// `0x1704A8C0` is `192.168.4.23`: the octets come little-endian.
pub fn hex_ip_to_dotted(hex: &str) -> Option<String> {
    let hex = hex.trim();
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);

    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }

    let octets = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect::<Option<Vec<u8>>>()?;

    Some(
        octets
            .iter()
            .rev()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join("."),
    )
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::core::event_queue;

    const ALARM: &str = r#"{ "Address" : "0x1704A8C0", "Channel" : 0, "Descrip" : "", "Event" : "HumanDetect", "SerialID" : "b1c2d3e4f5a6", "StartTime" : "2024-02-11 19:03:45", "Status" : "Start", "Type" : "Alarm" }"#;

    #[test]
    fn decodes_reversed_hex_ip() {
        assert_eq!(hex_ip_to_dotted("0x1704A8C0").as_deref(), Some("192.168.4.23"));
        assert_eq!(hex_ip_to_dotted("0101A8C0").as_deref(), Some("192.168.1.1"));
        assert_eq!(hex_ip_to_dotted("0x123"), None);
        assert_eq!(hex_ip_to_dotted("0xZZ04A8C0"), None);
    }

    #[test]
    fn decodes_framed_payload() {
        let mut payload = vec![0xff, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe4, 0x05];
        payload.extend_from_slice(ALARM.as_bytes());
        payload.push(b'\n');

        let event = decode_payload(&payload).unwrap();

        assert_eq!(event.source_name, "b1c2d3e4f5a6");
        assert_eq!(event.event_type, "HumanDetect");

        let message: Value = serde_json::from_str(&event.message).unwrap();
        assert_json_eq!(
            message,
            json!({
                "Address": "0x1704A8C0",
                "Channel": 0,
                "Descrip": "",
                "Event": "HumanDetect",
                "SerialID": "b1c2d3e4f5a6",
                "StartTime": "2024-02-11 19:03:45",
                "Status": "Start",
                "Type": "Alarm",
                "ipAddr": "192.168.4.23"
            })
        );
    }

    #[test]
    fn event_defaults_to_empty() {
        let event = decode_payload(br#"{"SerialID": 4711}"#).unwrap();

        assert_eq!(event.source_name, "4711");
        assert_eq!(event.event_type, "");
    }

    #[test]
    fn rejects_payload_without_serial() {
        assert!(decode_payload(br#"{"Event": "MotionDetect"}"#).is_err());
        assert!(decode_payload(b"no json here").is_err());
        assert!(decode_payload(b"{broken").is_err());
    }

    #[tokio::test]
    async fn bad_message_does_not_affect_other_connections() {
        let (sender, mut rx) = event_queue(4);
        let listener = LegacyListener::bind(0, sender).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(listener.run());

        let mut bad = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        bad.write_all(br#"{"Event": "MotionDetect"}"#).await.unwrap();
        bad.shutdown().await.unwrap();

        let mut good = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        good.write_all(ALARM.as_bytes()).await.unwrap();
        good.shutdown().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event delivered")
            .unwrap();
        assert_eq!(event.source_name, "b1c2d3e4f5a6");

        let nothing_else = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(nothing_else.is_err());

        server.abort();
    }
}
