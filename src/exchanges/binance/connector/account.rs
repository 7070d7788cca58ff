use crate::core::{
    errors::ExchangeError,
    kernel::{Params, RestClient},
    traits::{AccountInfo, FuturesAccount, PairFormatter},
    types::{AssetClass, Balance, Income, IncomeQuery, Leverage, MarginType, Pair, Position},
};
use crate::exchanges::binance::{conversions, rest::BinanceRestClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Account implementation for Binance
pub struct Account<R: RestClient> {
    rest: Arc<BinanceRestClient<R>>,
    pairs: Arc<dyn PairFormatter>,
}

impl<R: RestClient> Account<R> {
    pub fn new(rest: Arc<BinanceRestClient<R>>, pairs: Arc<dyn PairFormatter>) -> Self {
        Self { rest, pairs }
    }

    fn income_params(&self, asset: AssetClass, query: &IncomeQuery) -> Params {
        let mut params = Params::new();
        if let Some(pair) = &query.pair {
            params.push(("symbol".to_string(), self.pairs.format(pair, asset)));
        }
        if let Some(kind) = &query.income_type {
            params.push(("incomeType".to_string(), kind.clone()));
        }
        if let Some(start) = query.start_time {
            params.push(("startTime".to_string(), start.timestamp_millis().to_string()));
        }
        if let Some(end) = query.end_time {
            params.push(("endTime".to_string(), end.timestamp_millis().to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

#[async_trait]
impl<R: RestClient> AccountInfo for Account<R> {
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    async fn get_account_balance(&self, asset: AssetClass) -> Result<Vec<Balance>, ExchangeError> {
        match asset {
            AssetClass::Spot => {
                let account = self.rest.get_account_info().await?;
                conversions::spot_balances(account)
            }
            AssetClass::UsdMargined | AssetClass::CoinMargined => {
                let account = self.rest.get_futures_account_info(asset).await?;
                conversions::futures_balances(account)
            }
        }
    }

    /// Spot has no positions; the router rejects it with `UnsupportedAsset`.
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    async fn get_positions(&self, asset: AssetClass) -> Result<Vec<Position>, ExchangeError> {
        let rows = self.rest.get_position_risk(asset, None).await?;
        conversions::positions(asset, self.pairs.as_ref(), rows)
    }
}

#[async_trait]
impl<R: RestClient> FuturesAccount for Account<R> {
    #[instrument(skip(self, query), fields(exchange = "binance", asset = %asset))]
    async fn get_income_history(
        &self,
        asset: AssetClass,
        query: IncomeQuery,
    ) -> Result<Vec<Income>, ExchangeError> {
        let params = self.income_params(asset, &query);
        let rows = self.rest.get_income_history(asset, params).await?;
        rows.into_iter()
            .map(|row| conversions::income(asset, self.pairs.as_ref(), row))
            .collect()
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, pair = %pair))]
    async fn set_leverage(
        &self,
        asset: AssetClass,
        pair: &Pair,
        leverage: u32,
    ) -> Result<Leverage, ExchangeError> {
        if leverage == 0 {
            return Err(ExchangeError::InvalidParameters(
                "leverage must be at least 1".to_string(),
            ));
        }
        let symbol = self.pairs.format(pair, asset);
        let response = self.rest.set_leverage(asset, &symbol, leverage).await?;
        conversions::leverage(pair, response)
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, pair = %pair))]
    async fn set_margin_type(
        &self,
        asset: AssetClass,
        pair: &Pair,
        margin_type: MarginType,
    ) -> Result<(), ExchangeError> {
        let symbol = self.pairs.format(pair, asset);
        self.rest
            .set_margin_type(asset, &symbol, margin_type.as_str())
            .await
    }
}
