//! Huobi route table: spot on `api.huobi.pro`, USD-M swaps (`linear-swap-api`)
//! and coin-M swaps (`swap-api`) on `api.hbdm.com`.

use crate::core::config::ExchangeConfig;
use crate::core::kernel::{AssetRouter, AuthLevel, Endpoint, EndpointClass, EndpointDescriptor};
use crate::core::pairs::{EnabledPairs, PairFormat};
use crate::core::types::AssetClass;
use reqwest::Method;
use std::collections::HashMap;

pub const SPOT_URL: &str = "https://api.huobi.pro";
pub const SWAP_URL: &str = "https://api.hbdm.com";

pub fn rest_base_url(config: &ExchangeConfig, asset: AssetClass) -> String {
    config.base_url_for(asset).map_or_else(
        || match asset {
            AssetClass::Spot => SPOT_URL.to_string(),
            AssetClass::UsdMargined | AssetClass::CoinMargined => SWAP_URL.to_string(),
        },
        str::to_string,
    )
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

/// Spot balances need an account id in the path, so spot only routes
/// order entry, market data and the user-level `v2` endpoints here.
pub fn descriptors() -> Vec<EndpointDescriptor> {
    use AssetClass::{CoinMargined, Spot, UsdMargined};
    use AuthLevel::{Public, Signed};
    use EndpointClass::{Default, MarketData, Order};

    vec![
        EndpointDescriptor::new(Endpoint::Ping, Method::GET, Public, Default)
            .path(Spot, "/v1/common/timestamp")
            .path(UsdMargined, "/api/v1/timestamp")
            .path(CoinMargined, "/api/v1/timestamp"),
        EndpointDescriptor::new(Endpoint::AccountInfo, Method::POST, Signed, Default)
            .path(UsdMargined, "/linear-swap-api/v1/swap_account_info")
            .path(CoinMargined, "/swap-api/v1/swap_account_info"),
        EndpointDescriptor::new(Endpoint::PositionRisk, Method::POST, Signed, Default)
            .path(UsdMargined, "/linear-swap-api/v1/swap_position_info")
            .path(CoinMargined, "/swap-api/v1/swap_position_info"),
        EndpointDescriptor::new(Endpoint::OpenOrders, Method::POST, Signed, Order)
            .path_with_method(Spot, "/v1/order/openOrders", Method::GET)
            .path(UsdMargined, "/linear-swap-api/v1/swap_openorders")
            .path(CoinMargined, "/swap-api/v1/swap_openorders"),
        EndpointDescriptor::new(Endpoint::NewOrder, Method::POST, Signed, Order)
            .path(Spot, "/v1/order/orders/place")
            .path(UsdMargined, "/linear-swap-api/v1/swap_order")
            .path(CoinMargined, "/swap-api/v1/swap_order"),
        EndpointDescriptor::new(Endpoint::QueryOrder, Method::GET, Signed, Order)
            .path(Spot, "/v1/order/orders/{order-id}"),
        EndpointDescriptor::new(Endpoint::UserId, Method::GET, Signed, Default)
            .path(Spot, "/v2/user/uid"),
        EndpointDescriptor::new(Endpoint::AssetValuation, Method::GET, Signed, Default)
            .path(Spot, "/v2/account/asset-valuation"),
        EndpointDescriptor::new(Endpoint::FundingRate, Method::GET, Public, MarketData)
            .path(UsdMargined, "/linear-swap-api/v1/swap_funding_rate")
            .path(CoinMargined, "/swap-api/v1/swap_funding_rate"),
        EndpointDescriptor::new(Endpoint::IncomeHistory, Method::POST, Signed, Default)
            .path(UsdMargined, "/linear-swap-api/v1/swap_financial_record")
            .path(CoinMargined, "/swap-api/v1/swap_financial_record"),
        EndpointDescriptor::new(Endpoint::Klines, Method::GET, Public, MarketData)
            .path(Spot, "/market/history/kline")
            .path(UsdMargined, "/linear-swap-ex/market/history/kline")
            .path(CoinMargined, "/swap-ex/market/history/kline"),
    ]
}

/// Spot symbols are `btcusdt`, swap contract codes `BTC-USDT` / `BTC-USD`.
pub fn pair_formats() -> EnabledPairs {
    EnabledPairs::new()
        .with_format(AssetClass::Spot, PairFormat::new("", false))
        .with_format(AssetClass::UsdMargined, PairFormat::new("-", true))
        .with_format(AssetClass::CoinMargined, PairFormat::new("-", true))
}
