use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::SignedRequest;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, trace};

/// HTTP transport.
///
/// Receives a fully built request (URL, headers, body) and returns the
/// parsed JSON body. Signing, routing and throttling happen before this
/// point, so test doubles only need to record what they are handed.
#[async_trait]
pub trait RestClient: Send + Sync {
    async fn send(&self, request: SignedRequest) -> Result<Value, ExchangeError>;
}

#[async_trait]
impl<T: RestClient + ?Sized> RestClient for std::sync::Arc<T> {
    async fn send(&self, request: SignedRequest) -> Result<Value, ExchangeError> {
        (**self).send(request).await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(exchange_name: String) -> Self {
        Self {
            exchange_name,
            timeout_seconds: 30,
            user_agent: "gatewayx/0.1".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self { config }
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| ExchangeError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ReqwestRest {
            client,
            config: self.config,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Error body shape shared by most venues: `{"code": -2015, "msg": "..."}`
#[derive(Debug, Deserialize)]
struct VenueErrorBody {
    code: i64,
    #[serde(alias = "message")]
    msg: String,
}

impl ReqwestRest {
    pub fn new(exchange_name: String) -> Result<Self, ExchangeError> {
        RestClientBuilder::new(RestClientConfig::new(exchange_name)).build()
    }

    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        trace!("Response body: {}", response_text);

        if status.is_success() {
            if response_text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&response_text).map_err(ExchangeError::from);
        }

        Err(api_error(status.as_u16(), response_text))
    }
}

/// Prefer the venue's own error code over the HTTP status when it sent one.
pub(crate) fn api_error(status: u16, body: String) -> ExchangeError {
    match serde_json::from_str::<VenueErrorBody>(&body) {
        Ok(parsed) => ExchangeError::ApiError {
            code: i32::try_from(parsed.code).unwrap_or(i32::from(status)),
            message: parsed.msg,
        },
        Err(_) => ExchangeError::ApiError {
            code: i32::from(status),
            message: body,
        },
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, request), fields(exchange = %self.config.exchange_name, method = %request.method, path = %request.path()))]
    async fn send(&self, request: SignedRequest) -> Result<Value, ExchangeError> {
        let mut builder = self.client.request(request.method, &request.url);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if !request.body.is_empty() {
            builder = builder
                .header("Content-Type", "application/json")
                .body(request.body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Request failed: {}", e)))?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_error_code_wins_over_status() {
        let err = api_error(400, r#"{"code":-1021,"msg":"Timestamp outside recvWindow"}"#.into());
        match err {
            ExchangeError::ApiError { code, message } => {
                assert_eq!(code, -1021);
                assert_eq!(message, "Timestamp outside recvWindow");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn plain_body_keeps_http_status() {
        let err = api_error(502, "Bad Gateway".into());
        assert!(matches!(err, ExchangeError::ApiError { code: 502, .. }));
    }

    #[test]
    fn debug_hides_client_internals() {
        let rest = ReqwestRest::new("binance".into()).unwrap();
        let rendered = format!("{:?}", rest);
        assert!(rendered.contains("binance"));
    }
}
