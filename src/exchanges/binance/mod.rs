pub mod builder;
pub mod codec;
pub mod connector;
pub mod conversions;
pub mod endpoints;
pub mod rest;
pub mod signer;
pub mod types;

// Re-export main types for easier importing
pub use builder::{
    build_connector, build_connector_with_rest, default_subscriptions, stream_config,
};
pub use codec::BinanceCodec;
pub use connector::BinanceConnector;
pub use endpoints::pair_formats;
pub use rest::BinanceRestClient;
pub use signer::BinanceSigner;
