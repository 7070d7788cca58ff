use crate::core::{
    errors::ExchangeError,
    kernel::RestClient,
    traits::{FundingRateSource, MarketDataSource, PairFormatter},
    types::{AssetClass, FundingRate, Kline, KlineInterval, Pair},
};
use crate::exchanges::binance::{conversions, rest::BinanceRestClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

/// Market data implementation for Binance
pub struct MarketData<R: RestClient> {
    rest: Arc<BinanceRestClient<R>>,
    pairs: Arc<dyn PairFormatter>,
}

impl<R: RestClient> MarketData<R> {
    pub fn new(rest: Arc<BinanceRestClient<R>>, pairs: Arc<dyn PairFormatter>) -> Self {
        Self { rest, pairs }
    }
}

fn derivatives_only(asset: AssetClass) -> Result<(), ExchangeError> {
    if asset.is_derivative() {
        Ok(())
    } else {
        Err(ExchangeError::UnsupportedAsset {
            asset,
            endpoint: crate::core::kernel::Endpoint::FundingRate,
        })
    }
}

#[async_trait]
impl<R: RestClient> MarketDataSource for MarketData<R> {
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, pair = %pair, interval = %interval))]
    async fn get_klines(
        &self,
        asset: AssetClass,
        pair: &Pair,
        interval: KlineInterval,
        limit: Option<u32>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let symbol = self.pairs.format(pair, asset);
        let rows = self
            .rest
            .get_klines(
                asset,
                &symbol,
                interval,
                limit,
                start_time.map(|t| t.timestamp_millis()),
                end_time.map(|t| t.timestamp_millis()),
            )
            .await?;

        rows.into_iter()
            .map(|row| conversions::kline(pair, interval, row))
            .collect()
    }
}

#[async_trait]
impl<R: RestClient> FundingRateSource for MarketData<R> {
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, pair = %pair))]
    async fn get_mark_price(&self, asset: AssetClass, pair: &Pair) -> Result<FundingRate, ExchangeError> {
        let symbol = self.pairs.format(pair, asset);
        let index = self.rest.get_premium_index(asset, &symbol).await?;
        conversions::mark_price(asset, pair, index)
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, pair = %pair))]
    async fn get_funding_rate_history(
        &self,
        asset: AssetClass,
        pair: &Pair,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Vec<FundingRate>, ExchangeError> {
        derivatives_only(asset)?;
        let symbol = self.pairs.format(pair, asset);
        let rows = self
            .rest
            .get_funding_rate_history(
                asset,
                &symbol,
                start_time.map(|t| t.timestamp_millis()),
                end_time.map(|t| t.timestamp_millis()),
                limit,
            )
            .await?;

        rows.into_iter()
            .map(|row| conversions::funding_rate(asset, pair, row))
            .collect()
    }
}
