use super::types::{
    HuobiAssetValuation, HuobiFinancialRecords, HuobiFundingRate, HuobiKline, HuobiPosition,
    HuobiResponse, HuobiSpotOrder, HuobiSwapAccount,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{params, Dispatcher, Endpoint, Params, RestClient};
use crate::core::types::AssetClass;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::instrument;

/// Typed wrapper around the dispatcher for the Huobi spot and swap APIs.
///
/// Every response is unwrapped from the `{status, data}` (or `v2`
/// `{code, data}`) envelope before decoding; a failed envelope becomes
/// [`ExchangeError::ApiError`].
pub struct HuobiRestClient<R: RestClient> {
    dispatcher: Dispatcher<R>,
}

fn data<T: DeserializeOwned>(endpoint: Endpoint, value: Value) -> Result<T, ExchangeError> {
    let envelope = HuobiResponse::deserialize(&value).map_err(|e| {
        ExchangeError::decode(
            format!("unexpected {} envelope: {}", endpoint, e),
            value.to_string(),
        )
    })?;
    let data = envelope.into_data()?;
    T::deserialize(&data).map_err(|e| {
        ExchangeError::decode(
            format!("unexpected {} response: {}", endpoint, e),
            value.to_string(),
        )
    })
}

fn contract_body(contract_code: Option<&str>) -> Value {
    let mut body = Map::new();
    if let Some(code) = contract_code {
        body.insert("contract_code".to_string(), Value::String(code.to_string()));
    }
    Value::Object(body)
}

impl<R: RestClient> HuobiRestClient<R> {
    pub const fn new(dispatcher: Dispatcher<R>) -> Self {
        Self { dispatcher }
    }

    pub const fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }

    pub async fn ping(&self, asset: AssetClass) -> Result<(), ExchangeError> {
        let value = self.dispatcher.call(asset, Endpoint::Ping, Vec::new()).await?;
        data::<Value>(Endpoint::Ping, value).map(|_| ())
    }

    /// Swap margin accounts, optionally narrowed to one contract.
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_account_info(
        &self,
        asset: AssetClass,
        contract_code: Option<&str>,
    ) -> Result<Vec<HuobiSwapAccount>, ExchangeError> {
        let value = self
            .dispatcher
            .call_with_body(asset, Endpoint::AccountInfo, Vec::new(), contract_body(contract_code))
            .await?;
        data(Endpoint::AccountInfo, value)
    }

    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_position_info(
        &self,
        asset: AssetClass,
        contract_code: Option<&str>,
    ) -> Result<Vec<HuobiPosition>, ExchangeError> {
        let value = self
            .dispatcher
            .call_with_body(asset, Endpoint::PositionRisk, Vec::new(), contract_body(contract_code))
            .await?;
        data(Endpoint::PositionRisk, value)
    }

    /// Spot takes its filters as query parameters, swaps as a JSON body.
    #[instrument(skip(self, filters), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_open_orders(
        &self,
        asset: AssetClass,
        filters: Params,
    ) -> Result<Value, ExchangeError> {
        let value = match asset {
            AssetClass::Spot => {
                self.dispatcher
                    .call(asset, Endpoint::OpenOrders, filters)
                    .await?
            }
            AssetClass::UsdMargined | AssetClass::CoinMargined => {
                let body: Map<String, Value> = filters
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                self.dispatcher
                    .call_with_body(asset, Endpoint::OpenOrders, Vec::new(), Value::Object(body))
                    .await?
            }
        };
        data(Endpoint::OpenOrders, value)
    }

    /// `order` is the venue's order body; the returned data is the spot
    /// order id string or the swap `{order_id, order_id_str}` object.
    #[instrument(skip(self, order), fields(exchange = "huobi", asset = %asset))]
    pub async fn place_order(&self, asset: AssetClass, order: Value) -> Result<Value, ExchangeError> {
        let value = self
            .dispatcher
            .call_with_body(asset, Endpoint::NewOrder, Vec::new(), order)
            .await?;
        data(Endpoint::NewOrder, value)
    }

    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_funding_rate(
        &self,
        asset: AssetClass,
        contract_code: &str,
    ) -> Result<HuobiFundingRate, ExchangeError> {
        let value = self
            .dispatcher
            .call(
                asset,
                Endpoint::FundingRate,
                params([("contract_code", contract_code.to_string())]),
            )
            .await?;
        data(Endpoint::FundingRate, value)
    }

    /// Candles for a spot `symbol` (`btcusdt`) or a swap contract code
    /// (`BTC-USDT`). A time window in epoch seconds replaces `size`.
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_klines(
        &self,
        asset: AssetClass,
        symbol: &str,
        period: &str,
        size: Option<u32>,
        window: Option<(i64, i64)>,
    ) -> Result<Vec<HuobiKline>, ExchangeError> {
        let symbol_field = if asset == AssetClass::Spot {
            "symbol"
        } else {
            "contract_code"
        };
        let mut query = params([(symbol_field, symbol.to_string()), ("period", period.to_string())]);
        match window {
            Some((from, to)) => {
                query.push(("from".to_string(), from.to_string()));
                query.push(("to".to_string(), to.to_string()));
            }
            None => {
                if let Some(size) = size {
                    query.push(("size".to_string(), size.to_string()));
                }
            }
        }
        let value = self.dispatcher.call(asset, Endpoint::Klines, query).await?;
        data(Endpoint::Klines, value)
    }

    /// Spot order by venue id.
    #[instrument(skip(self), fields(exchange = "huobi"))]
    pub async fn get_spot_order(&self, order_id: u64) -> Result<HuobiSpotOrder, ExchangeError> {
        let value = self
            .dispatcher
            .call(
                AssetClass::Spot,
                Endpoint::QueryOrder,
                params([("order-id", order_id.to_string())]),
            )
            .await?;
        data(Endpoint::QueryOrder, value)
    }

    /// Numeric user id of the key's owner.
    #[instrument(skip(self), fields(exchange = "huobi"))]
    pub async fn get_uid(&self) -> Result<i64, ExchangeError> {
        let value = self
            .dispatcher
            .call(AssetClass::Spot, Endpoint::UserId, Vec::new())
            .await?;
        data(Endpoint::UserId, value)
    }

    /// Value of one account type (`spot`, `margin`, `otc`, `super-margin`)
    /// in `valuation_currency` (`BTC` when omitted). The currency code is
    /// case sensitive.
    #[instrument(skip(self), fields(exchange = "huobi"))]
    pub async fn get_asset_valuation(
        &self,
        account_type: &str,
        valuation_currency: Option<&str>,
    ) -> Result<HuobiAssetValuation, ExchangeError> {
        let mut query = params([("accountType", account_type.to_string())]);
        if let Some(currency) = valuation_currency {
            query.push(("valuationCurrency".to_string(), currency.to_string()));
        }
        let value = self
            .dispatcher
            .call(AssetClass::Spot, Endpoint::AssetValuation, query)
            .await?;
        data(Endpoint::AssetValuation, value)
    }

    /// Financial records for a margin account (`USDT`, `BTC-USDT`) on USD-M
    /// or a coin symbol (`BTC`) on coin-M.
    #[instrument(skip(self), fields(exchange = "huobi", asset = %asset))]
    pub async fn get_financial_records(
        &self,
        asset: AssetClass,
        account: &str,
        record_type: Option<&str>,
        page_index: u32,
    ) -> Result<HuobiFinancialRecords, ExchangeError> {
        let account_field = if asset == AssetClass::UsdMargined {
            "margin_account"
        } else {
            "symbol"
        };
        let mut body = Map::new();
        body.insert(account_field.to_string(), json!(account));
        body.insert("page_index".to_string(), json!(page_index));
        if let Some(kind) = record_type {
            body.insert("type".to_string(), json!(kind));
        }
        let value = self
            .dispatcher
            .call_with_body(asset, Endpoint::IncomeHistory, Vec::new(), Value::Object(body))
            .await?;
        data(Endpoint::IncomeHistory, value)
    }
}
