pub mod connector;
pub mod conversions;
pub mod endpoints;
pub mod rest;
pub mod signer;
pub mod types;

pub use connector::{build_connector, build_connector_with_rest, HuobiConnector};
pub use rest::HuobiRestClient;
pub use signer::HuobiSigner;
