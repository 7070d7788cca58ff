use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{RestClient, SessionEvent, StreamSession};
use crate::core::traits::{
    AccountInfo, ExchangeConnector, FundingRateSource, FuturesAccount, ListenKeyApi,
    MarketDataSource, OrderPlacer, PairFormatter,
};
use crate::core::types::{
    AssetClass, Balance, FundingRate, Income, IncomeQuery, Kline, KlineInterval, Leverage,
    MarginType, OrderRequest, OrderResponse, Pair, Position, Subscription,
};
use crate::exchanges::binance::builder::{default_subscriptions, stream_config};
use crate::exchanges::binance::codec::BinanceCodec;
use crate::exchanges::binance::rest::BinanceRestClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod account;
pub mod market_data;
pub mod trading;

pub use account::Account;
pub use market_data::MarketData;
pub use trading::Trading;

/// Binance connector composing the spot, USD-M and COIN-M REST surface with
/// stream session construction.
pub struct BinanceConnector<R: RestClient> {
    pub market: MarketData<R>,
    pub trading: Trading<R>,
    pub account: Account<R>,
    rest: Arc<BinanceRestClient<R>>,
    pairs: Arc<dyn PairFormatter>,
    config: ExchangeConfig,
}

impl<R: RestClient> BinanceConnector<R> {
    pub fn new(rest: BinanceRestClient<R>, pairs: Arc<dyn PairFormatter>, config: ExchangeConfig) -> Self {
        let rest = Arc::new(rest);
        Self {
            market: MarketData::new(Arc::clone(&rest), Arc::clone(&pairs)),
            trading: Trading::new(Arc::clone(&rest), Arc::clone(&pairs)),
            account: Account::new(Arc::clone(&rest), Arc::clone(&pairs)),
            rest,
            pairs,
            config,
        }
    }

    /// Check if authentication is available
    pub fn can_authenticate(&self) -> bool {
        self.rest.dispatcher().has_signer()
    }

    pub const fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn rest(&self) -> &BinanceRestClient<R> {
        &self.rest
    }

    pub fn pairs(&self) -> &dyn PairFormatter {
        self.pairs.as_ref()
    }

    pub async fn ping(&self, asset: AssetClass) -> Result<(), ExchangeError> {
        self.rest.ping(asset).await
    }

    pub fn codec(&self, asset: AssetClass) -> BinanceCodec {
        BinanceCodec::new(asset, Arc::clone(&self.pairs))
    }

    /// Default channels for `pairs` on `asset`.
    pub fn default_subscriptions(&self, asset: AssetClass, pairs: &[Pair]) -> Vec<Subscription> {
        default_subscriptions(asset, pairs, self.pairs.as_ref())
    }
}

impl<R: RestClient + 'static> BinanceConnector<R> {
    pub fn listen_keys(&self) -> Arc<dyn ListenKeyApi> {
        Arc::clone(&self.rest) as Arc<dyn ListenKeyApi>
    }

    /// Build a disconnected stream session for `asset`. User data is
    /// requested when the connector holds credentials.
    pub fn stream_session(
        &self,
        asset: AssetClass,
        subscriptions: Vec<Subscription>,
    ) -> (StreamSession<BinanceCodec>, mpsc::Receiver<SessionEvent>) {
        let authenticate = self.can_authenticate();
        let config = stream_config(asset, self.config.testnet).with_authentication(authenticate);
        let listen_keys = authenticate.then(|| self.listen_keys());
        let (session, events) = StreamSession::new(config, self.codec(asset), listen_keys);
        (session.with_subscriptions(subscriptions), events)
    }
}

#[async_trait]
impl<R: RestClient> ListenKeyApi for BinanceConnector<R> {
    async fn create_listen_key(&self, asset: AssetClass) -> Result<String, ExchangeError> {
        self.rest.create_listen_key(asset).await
    }

    async fn keepalive_listen_key(
        &self,
        asset: AssetClass,
        listen_key: &str,
    ) -> Result<Option<String>, ExchangeError> {
        self.rest.keepalive_listen_key(asset, listen_key).await
    }

    async fn close_listen_key(&self, asset: AssetClass, listen_key: &str) -> Result<(), ExchangeError> {
        self.rest.close_listen_key(asset, listen_key).await
    }
}

// Delegate MarketDataSource methods to the market component
#[async_trait]
impl<R: RestClient> MarketDataSource for BinanceConnector<R> {
    async fn get_klines(
        &self,
        asset: AssetClass,
        pair: &Pair,
        interval: KlineInterval,
        limit: Option<u32>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Kline>, ExchangeError> {
        self.market
            .get_klines(asset, pair, interval, limit, start_time, end_time)
            .await
    }
}

#[async_trait]
impl<R: RestClient> FundingRateSource for BinanceConnector<R> {
    async fn get_mark_price(&self, asset: AssetClass, pair: &Pair) -> Result<FundingRate, ExchangeError> {
        self.market.get_mark_price(asset, pair).await
    }

    async fn get_funding_rate_history(
        &self,
        asset: AssetClass,
        pair: &Pair,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Vec<FundingRate>, ExchangeError> {
        self.market
            .get_funding_rate_history(asset, pair, start_time, end_time, limit)
            .await
    }
}

// Delegate OrderPlacer methods to the trading component
#[async_trait]
impl<R: RestClient> OrderPlacer for BinanceConnector<R> {
    async fn place_order(
        &self,
        asset: AssetClass,
        order: OrderRequest,
    ) -> Result<OrderResponse, ExchangeError> {
        self.trading.place_order(asset, order).await
    }

    async fn cancel_order(
        &self,
        asset: AssetClass,
        pair: &Pair,
        order_id: &str,
    ) -> Result<OrderResponse, ExchangeError> {
        self.trading.cancel_order(asset, pair, order_id).await
    }

    async fn get_open_orders(
        &self,
        asset: AssetClass,
        pair: Option<&Pair>,
    ) -> Result<Vec<OrderResponse>, ExchangeError> {
        self.trading.get_open_orders(asset, pair).await
    }
}

// Delegate AccountInfo and FuturesAccount methods to the account component
#[async_trait]
impl<R: RestClient> AccountInfo for BinanceConnector<R> {
    async fn get_account_balance(&self, asset: AssetClass) -> Result<Vec<Balance>, ExchangeError> {
        self.account.get_account_balance(asset).await
    }

    async fn get_positions(&self, asset: AssetClass) -> Result<Vec<Position>, ExchangeError> {
        self.account.get_positions(asset).await
    }
}

#[async_trait]
impl<R: RestClient> FuturesAccount for BinanceConnector<R> {
    async fn get_income_history(
        &self,
        asset: AssetClass,
        query: IncomeQuery,
    ) -> Result<Vec<Income>, ExchangeError> {
        self.account.get_income_history(asset, query).await
    }

    async fn set_leverage(
        &self,
        asset: AssetClass,
        pair: &Pair,
        leverage: u32,
    ) -> Result<Leverage, ExchangeError> {
        self.account.set_leverage(asset, pair, leverage).await
    }

    async fn set_margin_type(
        &self,
        asset: AssetClass,
        pair: &Pair,
        margin_type: MarginType,
    ) -> Result<(), ExchangeError> {
        self.account.set_margin_type(asset, pair, margin_type).await
    }
}

impl<R: RestClient> ExchangeConnector for BinanceConnector<R> {}
