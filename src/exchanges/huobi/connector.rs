use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Dispatcher, Params, RateLimitConfig, RateLimiter, ReqwestRest, RestClient, RestClientBuilder,
    RestClientConfig,
};
use crate::core::traits::{AccountInfo, MarketDataSource, PairFormatter};
use crate::core::types::{
    AssetClass, Balance, FundingRate, Income, Kline, KlineInterval, OrderResponse, Pair, Position,
};
use crate::exchanges::huobi::types::HuobiAssetValuation;
use crate::exchanges::huobi::{conversions, endpoints, rest::HuobiRestClient, signer::HuobiSigner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Huobi connector for the swap account surface, candles and raw order entry.
pub struct HuobiConnector<R: RestClient> {
    rest: HuobiRestClient<R>,
    pairs: Arc<dyn PairFormatter>,
    config: ExchangeConfig,
}

impl<R: RestClient> HuobiConnector<R> {
    pub fn new(rest: HuobiRestClient<R>, pairs: Arc<dyn PairFormatter>, config: ExchangeConfig) -> Self {
        Self { rest, pairs, config }
    }

    pub fn can_authenticate(&self) -> bool {
        self.rest.dispatcher().has_signer()
    }

    pub const fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub const fn rest(&self) -> &HuobiRestClient<R> {
        &self.rest
    }

    pub async fn ping(&self, asset: AssetClass) -> Result<(), ExchangeError> {
        self.rest.ping(asset).await
    }

    /// Current funding rate, or the estimate when none is settled yet.
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset, pair = %pair))]
    pub async fn get_funding_rate(&self, asset: AssetClass, pair: &Pair) -> Result<FundingRate, ExchangeError> {
        let contract = self.pairs.format(pair, asset);
        let row = self.rest.get_funding_rate(asset, &contract).await?;
        conversions::funding_rate(asset, pair, row)
    }

    /// One page of financial records. `account` is the margin account on
    /// USD-M (`USDT`) and the coin on coin-M (`BTC`).
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_income_history(
        &self,
        asset: AssetClass,
        account: &str,
        record_type: Option<&str>,
        page_index: u32,
    ) -> Result<Vec<Income>, ExchangeError> {
        let records = self
            .rest
            .get_financial_records(asset, account, record_type, page_index)
            .await?;
        let margin_asset = if asset == AssetClass::UsdMargined { account } else { "" };
        records
            .financial_record
            .into_iter()
            .map(|row| conversions::income(asset, self.pairs.as_ref(), margin_asset, row))
            .collect()
    }

    pub async fn get_uid(&self) -> Result<i64, ExchangeError> {
        self.rest.get_uid().await
    }

    pub async fn get_asset_valuation(
        &self,
        account_type: &str,
        valuation_currency: Option<&str>,
    ) -> Result<HuobiAssetValuation, ExchangeError> {
        self.rest.get_asset_valuation(account_type, valuation_currency).await
    }

    #[instrument(skip(self), fields(exchange = "huobi"))]
    pub async fn get_spot_order(&self, order_id: u64) -> Result<OrderResponse, ExchangeError> {
        let row = self.rest.get_spot_order(order_id).await?;
        conversions::spot_order(self.pairs.as_ref(), row)
    }

    pub async fn get_open_orders(&self, asset: AssetClass, filters: Params) -> Result<Value, ExchangeError> {
        self.rest.get_open_orders(asset, filters).await
    }

    pub async fn place_order(&self, asset: AssetClass, order: Value) -> Result<Value, ExchangeError> {
        self.rest.place_order(asset, order).await
    }
}

#[async_trait]
impl<R: RestClient> AccountInfo for HuobiConnector<R> {
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    async fn get_account_balance(&self, asset: AssetClass) -> Result<Vec<Balance>, ExchangeError> {
        let rows = self.rest.get_account_info(asset, None).await?;
        Ok(conversions::balances(rows))
    }

    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    async fn get_positions(&self, asset: AssetClass) -> Result<Vec<Position>, ExchangeError> {
        let rows = self.rest.get_position_info(asset, None).await?;
        conversions::positions(asset, self.pairs.as_ref(), rows)
    }
}

#[async_trait]
impl<R: RestClient> MarketDataSource for HuobiConnector<R> {
    /// Huobi serves either the latest `limit` bars or a `[start, end]`
    /// window, not both; a full window wins.
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset, pair = %pair, interval = %interval))]
    async fn get_klines(
        &self,
        asset: AssetClass,
        pair: &Pair,
        interval: KlineInterval,
        limit: Option<u32>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let period = conversions::period(interval).ok_or_else(|| {
            ExchangeError::InvalidParameters(format!("huobi has no {} bars", interval))
        })?;
        let symbol = self.pairs.format(pair, asset);
        let window = start_time.zip(end_time).map(|(start, end)| (start.timestamp(), end.timestamp()));
        let rows = self
            .rest
            .get_klines(asset, &symbol, period, limit, window)
            .await?;
        rows.into_iter()
            .map(|row| conversions::kline(pair, interval, row))
            .collect()
    }
}

pub fn build_connector(config: ExchangeConfig) -> Result<HuobiConnector<ReqwestRest>, ExchangeError> {
    let rest = RestClientBuilder::new(RestClientConfig::new("huobi".to_string()).with_timeout(30))
        .build()?;
    build_connector_with_rest(config, rest, &RateLimitConfig::default())
}

pub fn build_connector_with_rest<R: RestClient>(
    config: ExchangeConfig,
    rest: R,
    rate_limits: &RateLimitConfig,
) -> Result<HuobiConnector<R>, ExchangeError> {
    let mut dispatcher = Dispatcher::new(
        "huobi",
        endpoints::router(&config),
        RateLimiter::new(rate_limits)?,
        rest,
    );
    if let Some(credentials) = config.credentials() {
        dispatcher = dispatcher.with_signer(Arc::new(HuobiSigner::new(credentials.clone())));
    }
    let pairs = config
        .enabled_pairs
        .iter()
        .fold(endpoints::pair_formats(), |formats, (asset, pairs)| {
            formats.enable(*asset, pairs.iter().cloned())
        });
    Ok(HuobiConnector::new(HuobiRestClient::new(dispatcher), Arc::new(pairs), config))
}
