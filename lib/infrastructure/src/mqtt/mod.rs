mod client;
mod sender;

pub use client::Mqtt;
pub use sender::MqttSender;

#[derive(Debug, Clone)]
pub struct MqttConfig {
    host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
}

impl MqttConfig {
    pub fn new(host: String, port: u16, client_id: String, username: Option<String>, password: Option<String>) -> Self {
        Self {
            host,
            port,
            client_id,
            username: username.filter(|u| !u.is_empty()),
            password,
        }
    }

    /// Creates a client whose broker-side last will is `will_payload` on `will_topic`.
    pub fn new_client(&self, will_topic: &str, will_payload: &str) -> Mqtt {
        Mqtt::connect(self, will_topic, will_payload)
    }
}
