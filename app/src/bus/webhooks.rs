use std::sync::Arc;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::core::CanonicalEvent;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// `"Name: value"` pairs.
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub body_template: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl WebhookConfig {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: vec![],
            body_template: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    camera_name: &'a str,
    event_type: &'a str,
    extra: &'a str,
}

#[derive(Clone)]
pub struct WebhookBus {
    client: ClientWithMiddleware,
    hooks: Arc<Vec<WebhookConfig>>,
}

impl WebhookBus {
    pub fn new(client: ClientWithMiddleware, hooks: Vec<WebhookConfig>) -> Self {
        Self {
            client,
            hooks: Arc::new(hooks),
        }
    }

    /// Calls every hook concurrently. Failures are logged, never retried.
    pub async fn deliver(&self, event: &CanonicalEvent) {
        let calls = self.hooks.iter().map(|hook| self.call(hook, event));
        futures::future::join_all(calls).await;
    }

    #[tracing::instrument(skip_all, fields(url = %hook.url))]
    async fn call(&self, hook: &WebhookConfig, event: &CanonicalEvent) {
        match self.send(hook, event).await {
            Ok(()) => infrastructure::meter::increment("alarm_deliveries", &[("bus", "webhook"), ("result", "ok")]),
            Err(e) => {
                tracing::error!("Error delivering alarm to webhook {}: {:?}", hook.url, e);
                infrastructure::meter::increment("alarm_deliveries", &[("bus", "webhook"), ("result", "error")]);
            }
        }
    }

    async fn send(&self, hook: &WebhookConfig, event: &CanonicalEvent) -> anyhow::Result<()> {
        let url = render(&hook.url, event);
        let method = Method::from_bytes(hook.method.to_ascii_uppercase().as_bytes())?;

        let body = match &hook.body_template {
            Some(template) => render(template, event),
            None => serde_json::to_string(&WebhookPayload {
                camera_name: &event.source_name,
                event_type: &event.event_type,
                extra: &event.message,
            })?,
        };

        let mut request = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        for header in &hook.headers {
            match header.split_once(": ") {
                Some((name, value)) => request = request.header(name, value),
                None => tracing::warn!("Ignoring malformed webhook header {:?}", header),
            }
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook answered {}", response.status());
        }

        Ok(())
    }
}

/// Substitutes `{{.Camera}}`, `{{.Event}}` and `{{.Extra}}`.
fn render(template: &str, event: &CanonicalEvent) -> String {
    let vars = [
        ("Camera", event.source_name.as_str()),
        ("Event", event.event_type.as_str()),
        ("Extra", event.message.as_str()),
    ];

    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{{.{}}}}}", name), value)
            .replace(&format!("{{{{ .{} }}}}", name), value)
    })
}
