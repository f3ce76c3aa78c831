//! HTTP clients for the broker bridge and token refresh endpoints.

use async_trait::async_trait;
use relaylink_core::{BrokerClient, BrokerError, RefreshError, TokenRefresher};
use reqwest::{StatusCode, header::CONTENT_TYPE};

use crate::{
    config::ClientConfig,
    protocol::{CONNECT_PATH, DISCONNECT_PATH, ErrorBody, REFRESH_PATH, RefreshRequest, RefreshResponse},
};

fn build_http(config: &ClientConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
}

/// Broker bridge client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBrokerClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpBrokerClient {
    /// Create a client with its own connection pool.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> reqwest::Result<Self> {
        let http = build_http(&config)?;
        Ok(Self::with_client(config, http))
    }

    /// Create a client sharing an existing connection pool.
    #[must_use]
    pub const fn with_client(config: ClientConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    async fn call(&self, path: &str, access_token: &str) -> Result<(), BrokerError> {
        let url = self.config.endpoint(path);
        let response = self
            .http
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BrokerError::Transport {
                message: format!("{path}: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(%status, path, "Broker request succeeded");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = ErrorBody::message_from(&body);

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            Err(BrokerError::Unauthorized { message })
        } else {
            Err(BrokerError::Transport {
                message: format!("{path} returned {status}: {message}"),
            })
        }
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn connect(&self, access_token: &str) -> Result<(), BrokerError> {
        self.call(CONNECT_PATH, access_token).await
    }

    async fn disconnect(&self, access_token: &str) -> Result<(), BrokerError> {
        self.call(DISCONNECT_PATH, access_token).await
    }
}

/// Token refresh client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpTokenRefresher {
    /// Create a refresher with its own connection pool.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> reqwest::Result<Self> {
        let http = build_http(&config)?;
        Ok(Self::with_client(config, http))
    }

    /// Create a refresher sharing an existing connection pool.
    #[must_use]
    pub const fn with_client(config: ClientConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError> {
        if refresh_token.is_empty() {
            return Err(RefreshError::MissingToken);
        }

        let response = self
            .http
            .post(self.config.endpoint(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_owned(),
            })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: ErrorBody::message_from(&body),
            });
        }

        let data: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))?;

        if data.access_token.is_empty() {
            return Err(RefreshError::Decode("empty accessToken".to_owned()));
        }
        Ok(data.access_token)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;

    async fn clients(server: &MockServer) -> (HttpBrokerClient, HttpTokenRefresher) {
        let config = ClientConfig::new(&server.uri()).unwrap();
        (
            HttpBrokerClient::new(config.clone()).unwrap(),
            HttpTokenRefresher::new(config).unwrap(),
        )
    }

    #[tokio::test]
    async fn connect_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mqtt/connect"))
            .and(header("authorization", "Bearer A"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "Connected to MQTT"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = clients(&server).await;
        assert_eq!(broker.connect("A").await, Ok(()));
    }

    #[tokio::test]
    async fn forbidden_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mqtt/connect"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(serde_json::json!({"message": "jwt expired"})),
            )
            .mount(&server)
            .await;

        let (broker, _) = clients(&server).await;
        assert_eq!(
            broker.connect("A").await,
            Err(BrokerError::Unauthorized {
                message: "jwt expired".into()
            })
        );
    }

    #[tokio::test]
    async fn disconnect_uses_backend_path_and_maps_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mqtt/disconect"))
            .and(header("authorization", "Bearer A"))
            .respond_with(ResponseTemplate::new(500).set_body_string("MQTT client not connected"))
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = clients(&server).await;
        let err = broker.disconnect("A").await.unwrap_err();
        match err {
            BrokerError::Transport { message } => {
                assert!(message.contains("500"), "{message}");
                assert!(message.contains("MQTT client not connected"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let broker = HttpBrokerClient::new(ClientConfig::new(&uri).unwrap()).unwrap();
        assert!(matches!(
            broker.connect("A").await,
            Err(BrokerError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_exchanges_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refresh-token"))
            .and(body_json(serde_json::json!({"refreshToken": "R"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "B"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (_, refresher) = clients(&server).await;
        assert_eq!(refresher.refresh("R").await, Ok("B".to_owned()));
    }

    #[tokio::test]
    async fn refresh_rejection_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refresh-token"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"message": "Invalid refresh token"})),
            )
            .mount(&server)
            .await;

        let (_, refresher) = clients(&server).await;
        assert_eq!(
            refresher.refresh("R").await,
            Err(RefreshError::Rejected {
                status: 403,
                message: "Invalid refresh token".into()
            })
        );
    }

    #[tokio::test]
    async fn refresh_with_malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "B"})))
            .mount(&server)
            .await;

        let (_, refresher) = clients(&server).await;
        assert!(matches!(
            refresher.refresh("R").await,
            Err(RefreshError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn empty_refresh_token_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (_, refresher) = clients(&server).await;
        assert_eq!(refresher.refresh("").await, Err(RefreshError::MissingToken));
    }
}
