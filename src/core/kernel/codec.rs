use crate::core::errors::ExchangeError;
use crate::core::types::NormalizedEvent;
use tokio_tungstenite::tungstenite::Message;

/// Venue-specific stream codec: builds control frames and demultiplexes
/// inbound frames into [`NormalizedEvent`]s.
pub trait WsCodec: Send + Sync + 'static {
    /// Encode a subscription request into a WebSocket message
    fn encode_subscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError>;

    /// Encode an unsubscription request into a WebSocket message
    fn encode_unsubscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError>;

    /// Classify and decode one text frame.
    ///
    /// - `Ok(Some(event))`: decoded, including `Unrecognized` for unknown types
    /// - `Ok(None)`: control traffic such as subscription acks, nothing to emit
    /// - `Err(DecodeError)`: a known event type whose payload did not decode
    fn handle(&self, raw: &str) -> Result<Option<NormalizedEvent>, ExchangeError>;

    /// Decode a transport message. Control frames (ping, pong, close) never
    /// reach this point.
    fn decode_message(&self, message: Message) -> Result<Option<NormalizedEvent>, ExchangeError> {
        match message {
            Message::Text(text) => self.handle(&text),
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.handle(text),
                Err(e) => Err(ExchangeError::decode(
                    format!("binary frame is not UTF-8: {}", e),
                    String::from_utf8_lossy(&bytes),
                )),
            },
            _ => Ok(None),
        }
    }
}
