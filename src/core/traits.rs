use crate::core::{
    errors::ExchangeError,
    types::{
        AssetClass, Balance, FundingRate, Income, IncomeQuery, Kline, KlineInterval, Leverage,
        MarginType, OrderRequest, OrderResponse, Pair, Position,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Maps venue wire symbols to canonical pairs and back.
pub trait PairFormatter: Send + Sync {
    /// Resolve a wire symbol such as `BTCUSDT` against the enabled pairs.
    fn resolve(&self, wire_symbol: &str, asset: AssetClass) -> Result<Pair, ExchangeError>;

    /// Render a canonical pair in the venue's wire format.
    fn format(&self, pair: &Pair, asset: AssetClass) -> String;
}

/// REST operations backing an authenticated user-data stream.
#[async_trait]
pub trait ListenKeyApi: Send + Sync {
    async fn create_listen_key(&self, asset: AssetClass) -> Result<String, ExchangeError>;

    /// Extend the key's validity. Returns the key the venue handed back when
    /// it differs from the one renewed.
    async fn keepalive_listen_key(
        &self,
        asset: AssetClass,
        listen_key: &str,
    ) -> Result<Option<String>, ExchangeError>;

    async fn close_listen_key(
        &self,
        _asset: AssetClass,
        _listen_key: &str,
    ) -> Result<(), ExchangeError> {
        Ok(())
    }
}

#[async_trait]
pub trait MarketDataSource {
    async fn get_klines(
        &self,
        asset: AssetClass,
        pair: &Pair,
        interval: KlineInterval,
        limit: Option<u32>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Kline>, ExchangeError>;
}

#[async_trait]
pub trait FundingRateSource {
    /// Current mark price, index price and upcoming funding for one pair
    async fn get_mark_price(
        &self,
        asset: AssetClass,
        pair: &Pair,
    ) -> Result<FundingRate, ExchangeError>;

    async fn get_funding_rate_history(
        &self,
        asset: AssetClass,
        pair: &Pair,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Vec<FundingRate>, ExchangeError>;
}

#[async_trait]
pub trait OrderPlacer {
    async fn place_order(
        &self,
        asset: AssetClass,
        order: OrderRequest,
    ) -> Result<OrderResponse, ExchangeError>;

    async fn cancel_order(
        &self,
        asset: AssetClass,
        pair: &Pair,
        order_id: &str,
    ) -> Result<OrderResponse, ExchangeError>;

    async fn get_open_orders(
        &self,
        asset: AssetClass,
        pair: Option<&Pair>,
    ) -> Result<Vec<OrderResponse>, ExchangeError>;
}

#[async_trait]
pub trait AccountInfo {
    async fn get_account_balance(&self, asset: AssetClass) -> Result<Vec<Balance>, ExchangeError>;
    async fn get_positions(&self, asset: AssetClass) -> Result<Vec<Position>, ExchangeError>;
}

/// Derivatives-only account controls
#[async_trait]
pub trait FuturesAccount {
    async fn get_income_history(
        &self,
        asset: AssetClass,
        query: IncomeQuery,
    ) -> Result<Vec<Income>, ExchangeError>;

    async fn set_leverage(
        &self,
        asset: AssetClass,
        pair: &Pair,
        leverage: u32,
    ) -> Result<Leverage, ExchangeError>;

    async fn set_margin_type(
        &self,
        asset: AssetClass,
        pair: &Pair,
        margin_type: MarginType,
    ) -> Result<(), ExchangeError>;
}

// Composite trait for callers that need the whole REST surface
#[async_trait]
pub trait ExchangeConnector:
    MarketDataSource + FundingRateSource + OrderPlacer + AccountInfo + FuturesAccount
{
}
