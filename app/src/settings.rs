use std::collections::BTreeMap;

use anyhow::bail;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState};
use infrastructure::{HttpClientConfig, MonitoringConfig, MqttConfig};
use serde::Deserialize;

use crate::adapter::hisilicon;
use crate::bus::webhooks::WebhookConfig;
use crate::core::{Device, Vendor};
use crate::supervisor::ReconnectConfig;

pub const CONFIG_PATH_VAR: &str = "ALARM_CONFIG";

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub http_client: HttpClientConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub webhooks: WebhooksSettings,
    #[serde(default)]
    pub hikvision: CameraFamily,
    #[serde(default)]
    pub dahua: CameraFamily,
    #[serde(default)]
    pub amcrest: CameraFamily,
    #[serde(default)]
    pub hisilicon: HisiliconSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_topic_root")]
    pub topic_root: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhooksSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub items: Vec<WebhookConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CameraFamily {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cams: BTreeMap<String, CameraSettings>,
}

/// `raw_tcp` applies to Hikvision, `channel` and `events` to Dahua.
#[derive(Debug, Deserialize, Clone)]
pub struct CameraSettings {
    pub address: String,
    #[serde(default)]
    pub https: bool,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub raw_tcp: bool,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HisiliconSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hisilicon_port")]
    pub port: u16,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "alarm-gateway".to_string()
}

fn default_topic_root() -> String {
    "camera-alerts".to_string()
}

fn default_true() -> bool {
    true
}

fn default_hisilicon_port() -> u16 {
    hisilicon::DEFAULT_PORT
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_mqtt_client_id(),
            username: None,
            password: None,
            topic_root: default_topic_root(),
        }
    }
}

impl Default for HisiliconSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_hisilicon_port(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let (path, required) = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => (path, true),
            Err(_) => ("config.toml".to_string(), false),
        };

        Self::build(
            Config::builder().add_source(File::with_name(&path).required(required)),
            environment(),
        )
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::build(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
            environment(),
        )
    }

    fn build(builder: ConfigBuilder<DefaultState>, environment: Environment) -> Result<Self, ConfigError> {
        builder.add_source(environment).build()?.try_deserialize()
    }

    /// Disables camera families without cameras and fails when nothing would be delivered or ingested.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        if !self.mqtt.enabled && !self.webhooks.enabled {
            bail!("Both MQTT and webhook buses are disabled, nothing would receive alarms");
        }

        for (family, settings) in [
            ("hikvision", &mut self.hikvision),
            ("dahua", &mut self.dahua),
            ("amcrest", &mut self.amcrest),
        ] {
            if settings.enabled && settings.cams.is_empty() {
                tracing::warn!("No {} cameras configured, disabling {}", family, family);
                settings.enabled = false;
            }
        }

        if !self.hikvision.enabled && !self.dahua.enabled && !self.amcrest.enabled && !self.hisilicon.enabled {
            bail!("All alarm sources are disabled");
        }

        Ok(())
    }

    pub fn broker(&self) -> MqttConfig {
        MqttConfig::new(
            self.mqtt.host.clone(),
            self.mqtt.port,
            self.mqtt.client_id.clone(),
            self.mqtt.username.clone(),
            self.mqtt.password.clone(),
        )
    }

    pub fn webhooks(&self) -> Vec<WebhookConfig> {
        let mut hooks = self.webhooks.items.clone();
        hooks.extend(self.webhooks.urls.iter().map(WebhookConfig::post));
        hooks
    }

    pub fn devices(&self) -> Vec<Device> {
        let mut devices = vec![];

        if self.hikvision.enabled {
            devices.extend(self.hikvision.cams.iter().map(|(name, cam)| {
                cam.to_device(name, "/ISAPI/", Vendor::Hikvision { raw_tcp: cam.raw_tcp })
            }));
        }

        if self.dahua.enabled {
            devices.extend(self.dahua.cams.iter().map(|(name, cam)| {
                let vendor = Vendor::Dahua {
                    channel: cam.channel.clone(),
                    events: cam.events.clone(),
                };
                cam.to_device(name, "", vendor)
            }));
        }

        if self.amcrest.enabled {
            devices.extend(
                self.amcrest
                    .cams
                    .iter()
                    .map(|(name, cam)| cam.to_device(name, "", Vendor::Amcrest)),
            );
        }

        devices
    }
}

/// `ALARM__MQTT__HOST=broker` style overrides. `ALARM__WEBHOOKS__URLS` takes a comma separated list.
fn environment() -> Environment {
    Environment::with_prefix("ALARM")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("webhooks.urls")
}

impl CameraSettings {
    fn to_device(&self, name: &str, base_path: &str, vendor: Vendor) -> Device {
        let scheme = if self.https { "https" } else { "http" };

        Device {
            name: name.to_string(),
            base_url: format!("{}://{}{}", scheme, self.address.trim_end_matches('/'), base_path),
            username: self.username.clone(),
            password: self.password.clone(),
            vendor,
        }
    }
}
