use reqwest::header::AUTHORIZATION;
use reqwest::{Response, StatusCode, Url};
use reqwest_middleware::ClientWithMiddleware;

use super::digest::{DigestChallenge, DigestSession, digest_challenge};
use crate::core::{AuthMethod, Device, StreamError};

enum HttpAuth {
    Basic,
    Digest(DigestSession),
}

/// A device together with the authentication scheme it accepted at startup.
pub struct DeviceConnection {
    device: Device,
    client: ClientWithMiddleware,
    auth: HttpAuth,
}

impl DeviceConnection {
    pub fn basic(device: Device, client: ClientWithMiddleware) -> Self {
        Self {
            device,
            client,
            auth: HttpAuth::Basic,
        }
    }

    pub fn digest(device: Device, client: ClientWithMiddleware, challenge: DigestChallenge) -> Self {
        Self {
            device,
            client,
            auth: HttpAuth::Digest(DigestSession::new(challenge)),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn auth_method(&self) -> AuthMethod {
        match self.auth {
            HttpAuth::Basic => AuthMethod::Basic,
            HttpAuth::Digest(_) => AuthMethod::Digest,
        }
    }

    /// Authenticated GET. With Digest a 401 carrying a fresh challenge is retried once.
    pub async fn get(&mut self, url: &str) -> Result<Response, StreamError> {
        let session = match &mut self.auth {
            HttpAuth::Basic => {
                let response = self
                    .client
                    .get(url)
                    .basic_auth(&self.device.username, Some(&self.device.password))
                    .send()
                    .await?;
                return Ok(response);
            }
            HttpAuth::Digest(session) => session,
        };

        let uri = request_uri(url)?;
        let header = session.authorization(&self.device.username, &self.device.password, "GET", &uri);
        let response = self.client.get(url).header(AUTHORIZATION, header).send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(challenge) = digest_challenge(response.headers()) else {
            return Ok(response);
        };

        tracing::debug!("Renewing digest challenge for {}", self.device.name);
        session.renew(challenge);
        let header = session.authorization(&self.device.username, &self.device.password, "GET", &uri);
        Ok(self.client.get(url).header(AUTHORIZATION, header).send().await?)
    }
}

fn request_uri(url: &str) -> Result<String, StreamError> {
    let url = Url::parse(url).map_err(|e| StreamError::configuration(format!("invalid url {}: {}", url, e)))?;

    Ok(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::core::Vendor;

    fn device(base_url: &str) -> Device {
        Device {
            name: "porch".to_string(),
            base_url: base_url.to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            vendor: Vendor::Amcrest,
        }
    }

    fn client() -> ClientWithMiddleware {
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build()
    }

    #[test]
    fn request_uri_keeps_query() {
        assert_eq!(
            request_uri("http://cam/cgi-bin/eventManager.cgi?action=attach&codes=[All]").unwrap(),
            "/cgi-bin/eventManager.cgi?action=attach&codes=[All]"
        );
        assert_eq!(request_uri("http://cam/ISAPI/System/status").unwrap(), "/ISAPI/System/status");
        assert!(request_uri("not a url").is_err());
    }

    #[tokio::test]
    async fn basic_get_sends_credentials() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/status")
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .create_async()
            .await;

        let mut conn = DeviceConnection::basic(device(&server.url()), client());
        let response = conn.get(&format!("{}/status", server.url())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(conn.auth_method(), AuthMethod::Basic);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn digest_get_retries_with_renewed_challenge() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/status")
            .match_header("authorization", Matcher::Regex(r#"nonce="old""#.into()))
            .with_status(401)
            .with_header("www-authenticate", r#"Digest realm="cam", nonce="fresh", qop="auth""#)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/status")
            .match_header("authorization", Matcher::Regex(r#"nonce="fresh""#.into()))
            .with_status(200)
            .create_async()
            .await;

        let challenge = DigestChallenge::parse(r#"Digest realm="cam", nonce="old", qop="auth""#).unwrap();
        let mut conn = DeviceConnection::digest(device(&server.url()), client(), challenge);
        let response = conn.get(&format!("{}/status", server.url())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(conn.auth_method(), AuthMethod::Digest);
        stale.assert_async().await;
        fresh.assert_async().await;
    }
}
