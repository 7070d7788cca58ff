use super::endpoints::position_risk_filter;
use super::types::{
    BinanceAccountInfo, BinanceAccountSnapshot, BinanceAdlQuantile, BinanceFundingRate,
    BinanceFuturesAccountInfo, BinanceIncome, BinanceLeverageResponse, BinanceListenKeyRenewal,
    BinanceListenKeyResponse, BinanceOrderResponse, BinancePositionMarginResponse,
    BinancePositionRisk, BinancePremiumIndex, BinanceRestKline, BinanceTransferResponse,
    MarginChange, SnapshotKind, TransferKind,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{params, Dispatcher, Endpoint, Params, RestClient};
use crate::core::traits::ListenKeyApi;
use crate::core::types::{AssetClass, KlineInterval};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// Thin typed wrapper around the dispatcher for the Binance REST APIs.
///
/// Methods return wire types; conversion to domain types happens in the
/// connector.
pub struct BinanceRestClient<R: RestClient> {
    dispatcher: Dispatcher<R>,
}

fn push_opt(params: &mut Params, key: &str, value: Option<impl ToString>) {
    if let Some(value) = value {
        params.push((key.to_string(), value.to_string()));
    }
}

impl<R: RestClient> BinanceRestClient<R> {
    pub const fn new(dispatcher: Dispatcher<R>) -> Self {
        Self { dispatcher }
    }

    pub const fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }

    pub async fn ping(&self, asset: AssetClass) -> Result<(), ExchangeError> {
        self.dispatcher.call(asset, Endpoint::Ping, Vec::new()).await?;
        Ok(())
    }

    pub async fn exchange_info(&self, asset: AssetClass) -> Result<Value, ExchangeError> {
        self.dispatcher
            .call(asset, Endpoint::ExchangeInfo, Vec::new())
            .await
    }

    /// Spot account snapshot
    #[instrument(skip(self), fields(exchange = "binance"))]
    pub async fn get_account_info(&self) -> Result<BinanceAccountInfo, ExchangeError> {
        self.dispatcher
            .call_json(AssetClass::Spot, Endpoint::AccountInfo, Vec::new())
            .await
    }

    /// USD-M (`v2`) or COIN-M (`v1`) account snapshot
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_futures_account_info(
        &self,
        asset: AssetClass,
    ) -> Result<BinanceFuturesAccountInfo, ExchangeError> {
        self.dispatcher
            .call_json(asset, Endpoint::AccountInfo, Vec::new())
            .await
    }

    /// `filter` is a symbol on USD-M and a pair (e.g. `BTCUSD`) on COIN-M.
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_position_risk(
        &self,
        asset: AssetClass,
        filter: Option<&str>,
    ) -> Result<Vec<BinancePositionRisk>, ExchangeError> {
        let mut params = Params::new();
        push_opt(&mut params, position_risk_filter(asset), filter);
        self.dispatcher
            .call_json(asset, Endpoint::PositionRisk, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_open_orders(
        &self,
        asset: AssetClass,
        symbol: Option<&str>,
    ) -> Result<Vec<BinanceOrderResponse>, ExchangeError> {
        let mut params = Params::new();
        push_opt(&mut params, "symbol", symbol);
        self.dispatcher
            .call_json(asset, Endpoint::OpenOrders, params)
            .await
    }

    #[instrument(skip(self, params), fields(exchange = "binance", asset = %asset))]
    pub async fn place_order(
        &self,
        asset: AssetClass,
        params: Params,
    ) -> Result<BinanceOrderResponse, ExchangeError> {
        self.dispatcher
            .call_json(asset, Endpoint::NewOrder, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn query_order(
        &self,
        asset: AssetClass,
        symbol: &str,
        order_id: &str,
    ) -> Result<BinanceOrderResponse, ExchangeError> {
        let params = params([
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ]);
        self.dispatcher
            .call_json(asset, Endpoint::QueryOrder, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn cancel_order(
        &self,
        asset: AssetClass,
        symbol: &str,
        order_id: &str,
    ) -> Result<BinanceOrderResponse, ExchangeError> {
        let params = params([
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ]);
        self.dispatcher
            .call_json(asset, Endpoint::CancelOrder, params)
            .await
    }

    #[instrument(skip(self, params), fields(exchange = "binance", asset = %asset))]
    pub async fn get_income_history(
        &self,
        asset: AssetClass,
        params: Params,
    ) -> Result<Vec<BinanceIncome>, ExchangeError> {
        self.dispatcher
            .call_json(asset, Endpoint::IncomeHistory, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn set_leverage(
        &self,
        asset: AssetClass,
        symbol: &str,
        leverage: u32,
    ) -> Result<BinanceLeverageResponse, ExchangeError> {
        let params = params([
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ]);
        self.dispatcher
            .call_json(asset, Endpoint::Leverage, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn set_margin_type(
        &self,
        asset: AssetClass,
        symbol: &str,
        margin_type: &str,
    ) -> Result<(), ExchangeError> {
        let params = params([
            ("symbol", symbol.to_string()),
            ("marginType", margin_type.to_string()),
        ]);
        self.dispatcher
            .call(asset, Endpoint::MarginType, params)
            .await?;
        Ok(())
    }

    /// Current mark price and funding. COIN-M answers with an array even
    /// for a single symbol.
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_premium_index(
        &self,
        asset: AssetClass,
        symbol: &str,
    ) -> Result<BinancePremiumIndex, ExchangeError> {
        let value = self
            .dispatcher
            .call(asset, Endpoint::MarkPrice, params([("symbol", symbol.to_string())]))
            .await?;
        let entry = match value {
            Value::Array(entries) => entries
                .into_iter()
                .find(|e| e.get("symbol").and_then(Value::as_str) == Some(symbol))
                .ok_or_else(|| {
                    ExchangeError::decode(format!("no premium index for {}", symbol), "[]")
                })?,
            other => other,
        };
        BinancePremiumIndex::deserialize(&entry).map_err(|e| {
            ExchangeError::decode(format!("unexpected premium index: {}", e), entry.to_string())
        })
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_funding_rate_history(
        &self,
        asset: AssetClass,
        symbol: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<BinanceFundingRate>, ExchangeError> {
        let mut params = params([("symbol", symbol.to_string())]);
        push_opt(&mut params, "startTime", start_time);
        push_opt(&mut params, "endTime", end_time);
        push_opt(&mut params, "limit", limit);
        self.dispatcher
            .call_json(asset, Endpoint::FundingRate, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, interval = %interval))]
    pub async fn get_klines(
        &self,
        asset: AssetClass,
        symbol: &str,
        interval: KlineInterval,
        limit: Option<u32>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<BinanceRestKline>, ExchangeError> {
        let mut params = params([
            ("symbol", symbol.to_string()),
            ("interval", interval.to_binance_format().to_string()),
        ]);
        push_opt(&mut params, "limit", limit);
        push_opt(&mut params, "startTime", start_time);
        push_opt(&mut params, "endTime", end_time);
        self.dispatcher.call_json(asset, Endpoint::Klines, params).await
    }

    /// The account's own liquidation orders
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_force_orders(
        &self,
        asset: AssetClass,
        symbol: Option<&str>,
    ) -> Result<Vec<BinanceOrderResponse>, ExchangeError> {
        let mut params = Params::new();
        push_opt(&mut params, "symbol", symbol);
        self.dispatcher
            .call_json(asset, Endpoint::ForceOrders, params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_commission_rate(
        &self,
        asset: AssetClass,
        symbol: &str,
    ) -> Result<Value, ExchangeError> {
        self.dispatcher
            .call(asset, Endpoint::CommissionRate, params([("symbol", symbol.to_string())]))
            .await
    }

    /// Universal transfer between wallets; returns the venue's transfer id.
    #[instrument(skip(self), fields(exchange = "binance", kind = kind.as_str()))]
    pub async fn transfer(
        &self,
        kind: TransferKind,
        coin: &str,
        amount: Decimal,
    ) -> Result<u64, ExchangeError> {
        let params = params([
            ("type", kind.as_str().to_string()),
            ("asset", coin.to_string()),
            ("amount", amount.normalize().to_string()),
        ]);
        let response: BinanceTransferResponse = self
            .dispatcher
            .call_json(AssetClass::Spot, Endpoint::Transfer, params)
            .await?;
        Ok(response.tran_id)
    }

    /// Add or remove isolated margin on a position. `position_side` is
    /// required in hedge mode (`LONG`/`SHORT`).
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn adjust_position_margin(
        &self,
        asset: AssetClass,
        symbol: &str,
        amount: Decimal,
        change: MarginChange,
        position_side: Option<&str>,
    ) -> Result<BinancePositionMarginResponse, ExchangeError> {
        let mut params = params([
            ("symbol", symbol.to_string()),
            ("amount", amount.normalize().to_string()),
            ("type", change.code().to_string()),
        ]);
        push_opt(&mut params, "positionSide", position_side);
        let response: BinancePositionMarginResponse = self
            .dispatcher
            .call_json(asset, Endpoint::PositionMargin, params)
            .await?;
        if response.code != 200 {
            return Err(ExchangeError::ApiError {
                code: i32::try_from(response.code).unwrap_or(i32::MAX),
                message: response.msg,
            });
        }
        Ok(response)
    }

    /// Auto-deleverage queue estimate. The venue answers with a list, or a
    /// single object when filtered by symbol on some deployments.
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    pub async fn get_adl_quantile(
        &self,
        asset: AssetClass,
        symbol: Option<&str>,
    ) -> Result<Vec<BinanceAdlQuantile>, ExchangeError> {
        let mut params = Params::new();
        push_opt(&mut params, "symbol", symbol);
        let value = self
            .dispatcher
            .call(asset, Endpoint::AdlQuantile, params)
            .await?;
        let rows = match value {
            Value::Array(rows) => rows,
            Value::Object(ref fields) if fields.is_empty() => Vec::new(),
            other => vec![other],
        };
        rows.into_iter()
            .map(|row| {
                BinanceAdlQuantile::deserialize(&row).map_err(|e| {
                    ExchangeError::decode(format!("unexpected adl quantile: {}", e), row.to_string())
                })
            })
            .collect()
    }

    /// Daily wallet snapshots, newest last.
    #[instrument(skip(self), fields(exchange = "binance", kind = kind.as_str()))]
    pub async fn get_account_snapshot(
        &self,
        kind: SnapshotKind,
        limit: Option<u32>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<BinanceAccountSnapshot, ExchangeError> {
        let mut params = params([("type", kind.as_str().to_string())]);
        push_opt(&mut params, "limit", limit);
        push_opt(&mut params, "startTime", start_time);
        push_opt(&mut params, "endTime", end_time);
        let snapshot: BinanceAccountSnapshot = self
            .dispatcher
            .call_json(AssetClass::Spot, Endpoint::AccountSnapshot, params)
            .await?;
        if snapshot.code != 200 {
            return Err(ExchangeError::ApiError {
                code: i32::try_from(snapshot.code).unwrap_or(i32::MAX),
                message: snapshot.msg,
            });
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl<R: RestClient> ListenKeyApi for BinanceRestClient<R> {
    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    async fn create_listen_key(&self, asset: AssetClass) -> Result<String, ExchangeError> {
        let response: BinanceListenKeyResponse = self
            .dispatcher
            .call_json(asset, Endpoint::CreateListenKey, Vec::new())
            .await?;
        debug!("Listen key created");
        Ok(response.listen_key)
    }

    #[instrument(skip(self, listen_key), fields(exchange = "binance", asset = %asset))]
    async fn keepalive_listen_key(
        &self,
        asset: AssetClass,
        listen_key: &str,
    ) -> Result<Option<String>, ExchangeError> {
        let value = self
            .dispatcher
            .call(
                asset,
                Endpoint::KeepAliveListenKey,
                params([("listenKey", listen_key.to_string())]),
            )
            .await?;
        let renewal = match value {
            Value::Object(_) => BinanceListenKeyRenewal::deserialize(&value).map_err(|e| {
                ExchangeError::decode(format!("unexpected keep-alive response: {}", e), value.to_string())
            })?,
            _ => BinanceListenKeyRenewal::default(),
        };
        Ok(renewal.listen_key.filter(|key| key != listen_key))
    }

    #[instrument(skip(self, listen_key), fields(exchange = "binance", asset = %asset))]
    async fn close_listen_key(&self, asset: AssetClass, listen_key: &str) -> Result<(), ExchangeError> {
        self.dispatcher
            .call(
                asset,
                Endpoint::CloseListenKey,
                params([("listenKey", listen_key.to_string())]),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Credentials, ExchangeConfig};
    use crate::core::kernel::{RateLimitConfig, RateLimiter, SignedRequest};
    use crate::exchanges::binance::{endpoints, signer::BinanceSigner};
    use std::sync::{Arc, Mutex};

    struct CannedRest {
        response: Value,
        seen: Mutex<Vec<SignedRequest>>,
    }

    #[async_trait]
    impl RestClient for CannedRest {
        async fn send(&self, request: SignedRequest) -> Result<Value, ExchangeError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn client(response: Value) -> (BinanceRestClient<Arc<CannedRest>>, Arc<CannedRest>) {
        let rest = Arc::new(CannedRest {
            response,
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::new(
            "binance",
            endpoints::router(&ExchangeConfig::read_only()),
            RateLimiter::new(&RateLimitConfig::unlimited()).unwrap(),
            Arc::clone(&rest),
        )
        .with_signer(Arc::new(BinanceSigner::new(Credentials::new("key", "secret"))));
        (BinanceRestClient::new(dispatcher), rest)
    }

    #[tokio::test]
    async fn coin_margined_premium_index_picks_matching_entry() {
        let (client, _) = client(serde_json::json!([
            {"symbol":"ETHUSD_PERP","markPrice":"3000","indexPrice":"3001","lastFundingRate":"0.0001","nextFundingTime":1,"time":1},
            {"symbol":"BTCUSD_PERP","markPrice":"60000","indexPrice":"60001","lastFundingRate":"0.0001","nextFundingTime":1,"time":1}
        ]));
        let index = client
            .get_premium_index(AssetClass::CoinMargined, "BTCUSD_PERP")
            .await
            .unwrap();
        assert_eq!(index.mark_price, "60000");
    }

    #[tokio::test]
    async fn position_risk_filters_by_pair_on_coin_margined() {
        let (client, rest) = client(serde_json::json!([]));
        client
            .get_position_risk(AssetClass::CoinMargined, Some("BTCUSD"))
            .await
            .unwrap();
        let seen = rest.seen.lock().unwrap();
        assert!(seen[0].url.starts_with("https://dapi.binance.com/dapi/v1/positionRisk?pair=BTCUSD&timestamp="));
    }

    #[tokio::test]
    async fn transfer_posts_to_the_spot_wallet_api() {
        let (client, rest) = client(serde_json::json!({"tranId": 13526853623u64}));
        let id = client
            .transfer(TransferKind::MainToUsdMargined, "USDT", Decimal::new(2500, 2))
            .await
            .unwrap();
        assert_eq!(id, 13_526_853_623);

        let seen = rest.seen.lock().unwrap();
        assert_eq!(seen[0].method, reqwest::Method::POST);
        assert!(seen[0]
            .url
            .starts_with("https://api.binance.com/sapi/v1/asset/transfer?type=MAIN_UMFUTURE&asset=USDT&amount=25&timestamp="));
    }

    #[tokio::test]
    async fn position_margin_sends_direction_code() {
        let (client, rest) = client(serde_json::json!({
            "amount": 100.0, "code": 200, "msg": "Successfully modify position margin.", "type": 2
        }));
        let response = client
            .adjust_position_margin(AssetClass::UsdMargined, "BTCUSDT", Decimal::new(100, 0), MarginChange::Reduce, Some("LONG"))
            .await
            .unwrap();
        assert_eq!(response.change, 2);
        assert!(rest.seen.lock().unwrap()[0]
            .url
            .starts_with("https://fapi.binance.com/fapi/v1/positionMargin?symbol=BTCUSDT&amount=100&type=2&positionSide=LONG&timestamp="));

        let (rejected, _) = self::client(serde_json::json!({
            "amount": 0, "code": -4046, "msg": "No need to change margin type.", "type": 1
        }));
        let err = rejected
            .adjust_position_margin(AssetClass::CoinMargined, "BTCUSD_PERP", Decimal::ONE, MarginChange::Add, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ApiError { code: -4046, .. }));
    }

    #[tokio::test]
    async fn adl_quantile_accepts_list_or_single_entry() {
        let (list, _) = client(serde_json::json!([
            {"symbol": "ETHUSDT", "adlQuantile": {"LONG": 3, "SHORT": 3, "HEDGE": 0}},
            {"symbol": "BTCUSDT", "adlQuantile": {"LONG": 1, "SHORT": 2, "BOTH": 0}}
        ]));
        let rows = list.get_adl_quantile(AssetClass::UsdMargined, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].adl_quantile.long, Some(3));
        assert_eq!(rows[1].adl_quantile.both, Some(0));

        let (single, _) = client(serde_json::json!(
            {"symbol": "BTCUSD_PERP", "adlQuantile": {"BOTH": 4}}
        ));
        let rows = single
            .get_adl_quantile(AssetClass::CoinMargined, Some("BTCUSD_PERP"))
            .await
            .unwrap();
        assert_eq!(rows[0].symbol, "BTCUSD_PERP");
        assert_eq!(rows[0].adl_quantile.both, Some(4));
        assert!(rows[0].adl_quantile.long.is_none());
    }

    #[tokio::test]
    async fn account_snapshot_decodes_spot_balances() {
        let (client, rest) = client(serde_json::json!({
            "code": 200, "msg": "",
            "snapshotVos": [{
                "type": "spot", "updateTime": 1576281599000i64,
                "data": {"totalAssetOfBtc": "0.09942700",
                         "balances": [{"asset": "BTC", "free": "0.09905021", "locked": "0.00000000"}]}
            }]
        }));
        let snapshot = client
            .get_account_snapshot(SnapshotKind::Spot, Some(5), None, None)
            .await
            .unwrap();
        let entry = &snapshot.snapshot_vos[0];
        assert_eq!(entry.data.balances[0].free, "0.09905021");
        assert_eq!(entry.data.total_asset_of_btc.as_deref(), Some("0.09942700"));
        assert!(entry.data.assets.is_empty());
        assert!(rest.seen.lock().unwrap()[0]
            .url
            .starts_with("https://api.binance.com/sapi/v1/accountSnapshot?type=SPOT&limit=5&timestamp="));
    }

    #[tokio::test]
    async fn keepalive_reports_only_a_changed_key() {
        let (same, _) = client(serde_json::json!({"listenKey": "abc"}));
        assert_eq!(
            same.keepalive_listen_key(AssetClass::UsdMargined, "abc").await.unwrap(),
            None
        );

        let (changed, rest) = client(serde_json::json!({"listenKey": "def"}));
        assert_eq!(
            changed
                .keepalive_listen_key(AssetClass::UsdMargined, "abc")
                .await
                .unwrap()
                .as_deref(),
            Some("def")
        );
        let seen = rest.seen.lock().unwrap();
        assert_eq!(seen[0].method, reqwest::Method::PUT);
        assert!(seen[0].signature.is_none());

        let (spot, _) = client(serde_json::json!({}));
        assert_eq!(spot.keepalive_listen_key(AssetClass::Spot, "abc").await.unwrap(), None);
    }
}
