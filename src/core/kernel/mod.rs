/// `GatewayX` Kernel - venue-agnostic REST and streaming machinery
///
/// Venue adapters plug tables and codecs into these components; nothing in
/// this module knows a venue's wire format.
///
/// # Architecture
///
/// ## REST path
/// - `AssetRouter`: (asset class, logical endpoint) to base URL and versioned path
/// - `Signer`: pluggable request signing with a caller-supplied timestamp
/// - `RateLimiter`: per endpoint-class token buckets with bounded waiting
/// - `Dispatcher`: resolve, throttle, sign and send through a `RestClient`
///
/// ## Streaming path
/// - `StreamSession`: connection lifecycle, listen key renewal, subscriptions
/// - `WsCodec`: venue-specific control frames and frame demultiplexing
///
/// # Usage
///
/// ```rust,no_run
/// use gatewayx::core::kernel::*;
/// use gatewayx::core::types::AssetClass;
/// use gatewayx::exchanges::binance::{self, BinanceCodec};
///
/// # async fn example() -> Result<(), gatewayx::ExchangeError> {
/// let config = binance::stream_config(AssetClass::UsdMargined, false);
/// let (session, mut events) = StreamSession::new(config, BinanceCodec::default(), None);
/// session.start().await?;
/// while let Some(event) = events.recv().await {
///     if let SessionEvent::ConnectionClosed { .. } = event {
///         break;
///     }
/// }
/// session.stop().await;
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod dispatch;
pub mod rate_limit;
pub mod rest;
pub mod router;
pub mod session;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::WsCodec;
pub use dispatch::{now_millis, params, Dispatcher, Params};
pub use rate_limit::{BucketConfig, RateLimitConfig, RateLimiter};
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use router::{AssetRouter, AuthLevel, Endpoint, EndpointClass, EndpointDescriptor, Route};
pub use session::{ListenKey, SessionEvent, SessionState, StreamConfig, StreamSession};
pub use signer::{SignedRequest, Signer, UnsignedRequest};
pub use ws::WsConfig;
