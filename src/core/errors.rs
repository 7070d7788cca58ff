use crate::core::config::ConfigError;
use crate::core::kernel::router::{Endpoint, EndpointClass};
use crate::core::types::AssetClass;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Asset class {asset} is not supported by endpoint {endpoint}")]
    UnsupportedAsset {
        asset: AssetClass,
        endpoint: Endpoint,
    },

    #[error("Timed out waiting for a {class} rate limit token")]
    RateLimitTimeout { class: EndpointClass },

    #[error("Rate limit queue for {class} is full ({capacity} pending)")]
    RateLimitQueueFull { class: EndpointClass, capacity: usize },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Decode error: {message}")]
    DecodeError { message: String, raw: String },

    #[error("Listen key renewal failed: {0}")]
    ListenKeyRenewalError(String),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// Builds a [`ExchangeError::DecodeError`] that keeps the offending frame.
    #[cold]
    #[inline(never)]
    pub fn decode(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::DecodeError {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Raw payload attached to a decode failure, if any.
    pub fn raw_frame(&self) -> Option<&str> {
        match self {
            Self::DecodeError { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Rate limit failures are the caller's to retry; nothing else is.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::RateLimitTimeout { .. } | Self::RateLimitQueueFull { .. }
        )
    }
}
