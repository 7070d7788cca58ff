use crate::core::errors::ExchangeError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

/// Transport settings for one stream connection
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Client ping interval in milliseconds, `None` to only answer server pings
    pub ping_interval_ms: Option<u64>,
    /// Capacity of the outbound event channel
    pub message_buffer_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ping_interval_ms: Some(180_000),
            message_buffer_size: 1024,
        }
    }
}

impl WsConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Scheme, host and port of `url`. Private stream URLs carry the listen key
/// in the path, so only this part is ever logged.
pub fn endpoint_of(url: &str) -> String {
    reqwest::Url::parse(url).map_or_else(
        |_| "<invalid url>".to_string(),
        |parsed| {
            let host = parsed.host_str().unwrap_or_default();
            parsed.port().map_or_else(
                || format!("{}://{}", parsed.scheme(), host),
                |port| format!("{}://{}:{}", parsed.scheme(), host, port),
            )
        },
    )
}

/// Dial `url` within the configured timeout and split the socket.
#[instrument(skip_all, fields(endpoint = %endpoint_of(url)))]
pub async fn connect(url: &str, config: &WsConfig) -> Result<(WsSink, WsSource), ExchangeError> {
    let (stream, response) = tokio::time::timeout(config.connect_timeout(), connect_async(url))
        .await
        .map_err(|_| {
            ExchangeError::ConnectionError(format!(
                "WebSocket connection to {} timed out after {}ms",
                endpoint_of(url),
                config.connect_timeout_ms
            ))
        })?
        .map_err(|e| ExchangeError::ConnectionError(format!("WebSocket connection failed: {}", e)))?;

    debug!(status = %response.status(), "WebSocket connected");
    Ok(stream.split())
}

pub async fn send(sink: &mut WsSink, message: Message) -> Result<(), ExchangeError> {
    sink.send(message)
        .await
        .map_err(|e| ExchangeError::ConnectionError(format!("Failed to send WebSocket message: {}", e)))
}

/// Best-effort close handshake.
pub async fn close(sink: &mut WsSink) {
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(error = %e, "Close frame not delivered");
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ping_interval_disables_pings() {
        let config = WsConfig {
            ping_interval_ms: Some(0),
            ..WsConfig::default()
        };
        assert_eq!(config.ping_interval(), None);
        assert_eq!(
            WsConfig::default().connect_timeout(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn endpoint_drops_the_path() {
        assert_eq!(
            endpoint_of("wss://fstream.binance.com/ws/pqia91ma19a5s61cv6a81va65sdf19v8a65a1"),
            "wss://fstream.binance.com"
        );
        assert_eq!(endpoint_of("ws://127.0.0.1:9443/stream"), "ws://127.0.0.1:9443");
        assert_eq!(endpoint_of("not a url"), "<invalid url>");
    }

    #[tokio::test]
    async fn refused_dial_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&format!("ws://{}", addr), &WsConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ConnectionError(_)));
    }
}
