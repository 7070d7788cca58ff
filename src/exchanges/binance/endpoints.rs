//! Binance route table for spot, USD-M futures (`fapi`) and COIN-M futures (`dapi`).
//!
//! The same logical endpoint is not always on the same API version: USD-M
//! account and position risk live under `v2`, COIN-M stays on `v1`.

use crate::core::config::ExchangeConfig;
use crate::core::kernel::{AssetRouter, AuthLevel, Endpoint, EndpointClass, EndpointDescriptor};
use crate::core::pairs::{EnabledPairs, PairFormat};
use crate::core::types::AssetClass;
use reqwest::Method;
use std::collections::HashMap;

pub const SPOT_URL: &str = "https://api.binance.com";
pub const USDM_URL: &str = "https://fapi.binance.com";
pub const COINM_URL: &str = "https://dapi.binance.com";

pub const SPOT_TESTNET_URL: &str = "https://testnet.binance.vision";
pub const USDM_TESTNET_URL: &str = "https://testnet.binancefuture.com";
pub const COINM_TESTNET_URL: &str = "https://testnet.binancefuture.com";

pub const SPOT_WS_URL: &str = "wss://stream.binance.com:9443";
pub const USDM_WS_URL: &str = "wss://fstream.binance.com";
pub const COINM_WS_URL: &str = "wss://dstream.binance.com";

pub const SPOT_TESTNET_WS_URL: &str = "wss://testnet.binance.vision";
pub const USDM_TESTNET_WS_URL: &str = "wss://stream.binancefuture.com";
pub const COINM_TESTNET_WS_URL: &str = "wss://dstream.binancefuture.com";

/// REST base URL for `asset`, honouring testnet and explicit overrides.
pub fn rest_base_url(config: &ExchangeConfig, asset: AssetClass) -> String {
    if let Some(url) = config.base_url_for(asset) {
        return url.to_string();
    }
    match (asset, config.testnet) {
        (AssetClass::Spot, false) => SPOT_URL,
        (AssetClass::Spot, true) => SPOT_TESTNET_URL,
        (AssetClass::UsdMargined, false) => USDM_URL,
        (AssetClass::UsdMargined, true) => USDM_TESTNET_URL,
        (AssetClass::CoinMargined, false) => COINM_URL,
        (AssetClass::CoinMargined, true) => COINM_TESTNET_URL,
    }
    .to_string()
}

/// WebSocket base (scheme, host and port) for `asset`.
pub const fn ws_base_url(asset: AssetClass, testnet: bool) -> &'static str {
    match (asset, testnet) {
        (AssetClass::Spot, false) => SPOT_WS_URL,
        (AssetClass::Spot, true) => SPOT_TESTNET_WS_URL,
        (AssetClass::UsdMargined, false) => USDM_WS_URL,
        (AssetClass::UsdMargined, true) => USDM_TESTNET_WS_URL,
        (AssetClass::CoinMargined, false) => COINM_WS_URL,
        (AssetClass::CoinMargined, true) => COINM_TESTNET_WS_URL,
    }
}

pub fn base_urls(config: &ExchangeConfig) -> HashMap<AssetClass, String> {
    AssetClass::ALL
        .into_iter()
        .map(|asset| (asset, rest_base_url(config, asset)))
        .collect()
}

pub fn router(config: &ExchangeConfig) -> AssetRouter {
    AssetRouter::new(&base_urls(config), descriptors())
}

#[allow(clippy::too_many_lines)]
pub fn descriptors() -> Vec<EndpointDescriptor> {
    use AssetClass::{CoinMargined, Spot, UsdMargined};
    use AuthLevel::{ApiKey, Public, Signed};
    use EndpointClass::{Default, MarketData, Order};

    vec![
        EndpointDescriptor::new(Endpoint::Ping, Method::GET, Public, Default)
            .path(Spot, "/api/v3/ping")
            .path(UsdMargined, "/fapi/v1/ping")
            .path(CoinMargined, "/dapi/v1/ping"),
        EndpointDescriptor::new(Endpoint::ExchangeInfo, Method::GET, Public, Default)
            .path(Spot, "/api/v3/exchangeInfo")
            .path(UsdMargined, "/fapi/v1/exchangeInfo")
            .path(CoinMargined, "/dapi/v1/exchangeInfo"),
        EndpointDescriptor::new(Endpoint::AccountInfo, Method::GET, Signed, Default)
            .path(Spot, "/api/v3/account")
            .path(UsdMargined, "/fapi/v2/account")
            .path(CoinMargined, "/dapi/v1/account"),
        EndpointDescriptor::new(Endpoint::PositionRisk, Method::GET, Signed, Default)
            .path(UsdMargined, "/fapi/v2/positionRisk")
            .path(CoinMargined, "/dapi/v1/positionRisk"),
        EndpointDescriptor::new(Endpoint::OpenOrders, Method::GET, Signed, Order)
            .path(Spot, "/api/v3/openOrders")
            .path(UsdMargined, "/fapi/v1/openOrders")
            .path(CoinMargined, "/dapi/v1/openOrders"),
        EndpointDescriptor::new(Endpoint::NewOrder, Method::POST, Signed, Order)
            .path(Spot, "/api/v3/order")
            .path(UsdMargined, "/fapi/v1/order")
            .path(CoinMargined, "/dapi/v1/order"),
        EndpointDescriptor::new(Endpoint::QueryOrder, Method::GET, Signed, Order)
            .path(Spot, "/api/v3/order")
            .path(UsdMargined, "/fapi/v1/order")
            .path(CoinMargined, "/dapi/v1/order"),
        EndpointDescriptor::new(Endpoint::CancelOrder, Method::DELETE, Signed, Order)
            .path(Spot, "/api/v3/order")
            .path(UsdMargined, "/fapi/v1/order")
            .path(CoinMargined, "/dapi/v1/order"),
        EndpointDescriptor::new(Endpoint::IncomeHistory, Method::GET, Signed, Default)
            .path(UsdMargined, "/fapi/v1/income")
            .path(CoinMargined, "/dapi/v1/income"),
        EndpointDescriptor::new(Endpoint::Leverage, Method::POST, Signed, Order)
            .path(UsdMargined, "/fapi/v1/leverage")
            .path(CoinMargined, "/dapi/v1/leverage"),
        EndpointDescriptor::new(Endpoint::MarginType, Method::POST, Signed, Order)
            .path(UsdMargined, "/fapi/v1/marginType")
            .path(CoinMargined, "/dapi/v1/marginType"),
        EndpointDescriptor::new(Endpoint::FundingRate, Method::GET, Public, MarketData)
            .path(UsdMargined, "/fapi/v1/fundingRate")
            .path(CoinMargined, "/dapi/v1/fundingRate"),
        EndpointDescriptor::new(Endpoint::MarkPrice, Method::GET, Public, MarketData)
            .path(UsdMargined, "/fapi/v1/premiumIndex")
            .path(CoinMargined, "/dapi/v1/premiumIndex"),
        EndpointDescriptor::new(Endpoint::Klines, Method::GET, Public, MarketData)
            .path(Spot, "/api/v3/klines")
            .path(UsdMargined, "/fapi/v1/klines")
            .path(CoinMargined, "/dapi/v1/klines"),
        EndpointDescriptor::new(Endpoint::ForceOrders, Method::GET, Signed, Default)
            .path(UsdMargined, "/fapi/v1/forceOrders")
            .path(CoinMargined, "/dapi/v1/forceOrders"),
        EndpointDescriptor::new(Endpoint::CommissionRate, Method::GET, Signed, Default)
            .path(Spot, "/sapi/v1/asset/tradeFee")
            .path(UsdMargined, "/fapi/v1/commissionRate")
            .path(CoinMargined, "/dapi/v1/commissionRate"),
        EndpointDescriptor::new(Endpoint::PositionMargin, Method::POST, Signed, Order)
            .path(UsdMargined, "/fapi/v1/positionMargin")
            .path(CoinMargined, "/dapi/v1/positionMargin"),
        EndpointDescriptor::new(Endpoint::AdlQuantile, Method::GET, Signed, Default)
            .path(UsdMargined, "/fapi/v1/adlQuantile")
            .path(CoinMargined, "/dapi/v1/adlQuantile"),
        // wallet level, served from the spot host whatever the product
        EndpointDescriptor::new(Endpoint::AccountSnapshot, Method::GET, Signed, Default)
            .path(Spot, "/sapi/v1/accountSnapshot"),
        EndpointDescriptor::new(Endpoint::Transfer, Method::POST, Signed, Default)
            .path(Spot, "/sapi/v1/asset/transfer"),
        EndpointDescriptor::new(Endpoint::CreateListenKey, Method::POST, ApiKey, Default)
            .path(Spot, "/api/v3/userDataStream")
            .path(UsdMargined, "/fapi/v1/listenKey")
            .path(CoinMargined, "/dapi/v1/listenKey"),
        EndpointDescriptor::new(Endpoint::KeepAliveListenKey, Method::PUT, ApiKey, Default)
            .path(Spot, "/api/v3/userDataStream")
            .path(UsdMargined, "/fapi/v1/listenKey")
            .path(CoinMargined, "/dapi/v1/listenKey"),
        EndpointDescriptor::new(Endpoint::CloseListenKey, Method::DELETE, ApiKey, Default)
            .path(Spot, "/api/v3/userDataStream")
            .path(UsdMargined, "/fapi/v1/listenKey")
            .path(CoinMargined, "/dapi/v1/listenKey"),
    ]
}

/// Symbol formats: `BTCUSDT` on spot and USD-M, `BTCUSD_PERP` on COIN-M.
pub fn pair_formats() -> EnabledPairs {
    EnabledPairs::new()
        .with_format(AssetClass::Spot, PairFormat::default())
        .with_format(AssetClass::UsdMargined, PairFormat::default())
        .with_format(
            AssetClass::CoinMargined,
            PairFormat::new("", true).with_suffix("_PERP"),
        )
}

/// Name of the query parameter position risk filters on.
pub const fn position_risk_filter(asset: AssetClass) -> &'static str {
    match asset {
        AssetClass::CoinMargined => "pair",
        AssetClass::Spot | AssetClass::UsdMargined => "symbol",
    }
}
