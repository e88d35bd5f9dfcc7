use reqwest::StatusCode;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest_middleware::ClientWithMiddleware;

use super::connection::DeviceConnection;
use super::digest::{DigestChallenge, auth_scheme};
use crate::core::{Device, StreamError};

/// Probes `probe_path` with Basic credentials and settles on Basic or Digest.
/// Without a probe path the device is assumed to accept Basic.
#[tracing::instrument(skip_all, fields(device = %device.name))]
pub async fn negotiate(
    client: &ClientWithMiddleware,
    device: Device,
    probe_path: Option<&str>,
) -> Result<DeviceConnection, StreamError> {
    let Some(probe_path) = probe_path else {
        return Ok(DeviceConnection::basic(device, client.clone()));
    };

    let url = device.endpoint(probe_path);
    let response = client
        .get(&url)
        .basic_auth(&device.username, Some(&device.password))
        .send()
        .await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        tracing::info!("Camera {} accepted Basic auth", device.name);
        return Ok(DeviceConnection::basic(device, client.clone()));
    }

    let challenges: Vec<String> = response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect();

    if challenges.is_empty() {
        return Err(StreamError::authentication("unknown auth method"));
    }

    let Some(challenge) = challenges.iter().find_map(|c| DigestChallenge::parse(c)) else {
        if challenges
            .iter()
            .any(|c| auth_scheme(c).eq_ignore_ascii_case("basic"))
        {
            return Err(StreamError::authentication("bad password"));
        }
        return Err(StreamError::authentication(format!(
            "unsupported auth method: {}",
            challenges.join(", ")
        )));
    };

    let mut connection = DeviceConnection::digest(device, client.clone(), challenge);
    match connection.get(&url).await {
        Ok(response) if response.status() != StatusCode::UNAUTHORIZED => {
            tracing::info!("Camera {} accepted Digest auth", connection.device().name);
            Ok(connection)
        }
        Ok(_) => Err(StreamError::authentication("bad password")),
        Err(e) => Err(StreamError::authentication(format!("digest probe failed: {}", e))),
    }
}
