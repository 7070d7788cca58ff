use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Event times arrive as numbers on futures streams and as strings on some
/// spot user data events.
fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

// Stream payloads

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceMarkPriceEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: String,
    #[serde(rename = "i")]
    pub index_price: String,
    #[serde(rename = "P")]
    pub estimated_settle_price: Option<String>,
    #[serde(rename = "r")]
    pub funding_rate: String,
    #[serde(rename = "T")]
    pub next_funding_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceKlineEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: BinanceKlineData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceKlineData {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open_price: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "c")]
    pub close_price: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "n")]
    pub number_of_trades: i64,
    #[serde(rename = "x")]
    pub final_bar: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceForceOrderEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: BinanceForceOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceForceOrder {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap")]
    pub average_price: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "l")]
    pub last_filled_quantity: String,
    #[serde(rename = "z")]
    pub cumulative_filled_quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
}

/// Futures `ACCOUNT_UPDATE`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountUpdateEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "a")]
    pub update: BinanceAccountUpdateData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountUpdateData {
    #[serde(rename = "m")]
    pub reason: String,
    #[serde(rename = "B", default)]
    pub balances: Vec<BinanceAccountUpdateBalance>,
    #[serde(rename = "P", default)]
    pub positions: Vec<BinanceAccountUpdatePosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountUpdateBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    pub wallet_balance: String,
    #[serde(rename = "cw")]
    pub cross_wallet_balance: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountUpdatePosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub position_amount: String,
    #[serde(rename = "ep")]
    pub entry_price: String,
    #[serde(rename = "up")]
    pub unrealized_pnl: String,
    #[serde(rename = "mt")]
    pub margin_type: String,
    #[serde(rename = "ps")]
    pub position_side: String,
}

/// Futures `ORDER_TRADE_UPDATE`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderTradeUpdateEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "o")]
    pub order: BinanceOrderTradeUpdate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderTradeUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap")]
    pub average_price: Option<String>,
    #[serde(rename = "sp")]
    pub stop_price: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l")]
    pub last_filled_quantity: String,
    #[serde(rename = "z")]
    pub cumulative_filled_quantity: String,
    #[serde(rename = "L")]
    pub last_filled_price: String,
    #[serde(rename = "N")]
    pub commission_asset: Option<String>,
    #[serde(rename = "n")]
    pub commission: Option<String>,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "m")]
    pub is_maker: bool,
    #[serde(rename = "R", default)]
    pub reduce_only: bool,
    #[serde(rename = "ps")]
    pub position_side: Option<String>,
    #[serde(rename = "rp")]
    pub realized_profit: Option<String>,
}

/// Spot `executionReport`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceExecutionReport {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "P")]
    pub stop_price: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l")]
    pub last_filled_quantity: String,
    #[serde(rename = "z")]
    pub cumulative_filled_quantity: String,
    #[serde(rename = "L")]
    pub last_filled_price: String,
    #[serde(rename = "n")]
    pub commission: Option<String>,
    #[serde(rename = "N")]
    pub commission_asset: Option<String>,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "m")]
    pub is_maker: bool,
}

/// Spot `outboundAccountPosition`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOutboundAccountPosition {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "u")]
    pub last_update_time: Option<i64>,
    #[serde(rename = "B", default)]
    pub balances: Vec<BinanceSpotBalanceUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceSpotBalanceUpdate {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: String,
    #[serde(rename = "l")]
    pub locked: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceListenKeyExpiredEvent {
    #[serde(rename = "E", deserialize_with = "millis")]
    pub event_time: i64,
}

// REST payloads

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceListenKeyResponse {
    pub listen_key: String,
}

/// Keep-alive answers `{}` on spot and `{"listenKey": ...}` on futures.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceListenKeyRenewal {
    pub listen_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BinanceBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAccountInfo {
    pub balances: Vec<BinanceBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFuturesAsset {
    pub asset: String,
    pub wallet_balance: String,
    pub unrealized_profit: Option<String>,
    pub available_balance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFuturesAccountInfo {
    pub assets: Vec<BinanceFuturesAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePositionRisk {
    pub symbol: String,
    pub position_amt: String,
    pub entry_price: String,
    pub un_realized_profit: String,
    pub liquidation_price: Option<String>,
    pub leverage: String,
    pub margin_type: Option<String>,
    pub position_side: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePremiumIndex {
    pub symbol: String,
    pub mark_price: String,
    pub index_price: String,
    pub last_funding_rate: Option<String>,
    pub next_funding_time: Option<i64>,
    pub time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFundingRate {
    pub symbol: String,
    pub funding_rate: String,
    pub funding_time: i64,
    pub mark_price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderResponse {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub orig_qty: String,
    pub executed_qty: String,
    pub price: String,
    pub avg_price: Option<String>,
    pub status: String,
    pub update_time: Option<i64>,
    pub transact_time: Option<i64>,
    pub time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceIncome {
    #[serde(default)]
    pub symbol: String,
    pub income_type: String,
    pub income: String,
    pub asset: String,
    pub time: i64,
    pub tran_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceLeverageResponse {
    pub symbol: String,
    pub leverage: u32,
    pub max_notional_value: Option<String>,
    pub max_qty: Option<String>,
}

/// Wallet pair of a universal transfer (`/sapi/v1/asset/transfer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    MainToUsdMargined,
    UsdMarginedToMain,
    MainToCoinMargined,
    CoinMarginedToMain,
    MainToMargin,
    MarginToMain,
    MainToFunding,
    FundingToMain,
}

impl TransferKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MainToUsdMargined => "MAIN_UMFUTURE",
            Self::UsdMarginedToMain => "UMFUTURE_MAIN",
            Self::MainToCoinMargined => "MAIN_CMFUTURE",
            Self::CoinMarginedToMain => "CMFUTURE_MAIN",
            Self::MainToMargin => "MAIN_MARGIN",
            Self::MarginToMain => "MARGIN_MAIN",
            Self::MainToFunding => "MAIN_FUNDING",
            Self::FundingToMain => "FUNDING_MAIN",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTransferResponse {
    pub tran_id: u64,
}

/// Direction of an isolated margin adjustment; the venue wants `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginChange {
    Add,
    Reduce,
}

impl MarginChange {
    pub const fn code(self) -> u8 {
        match self {
            Self::Add => 1,
            Self::Reduce => 2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BinancePositionMarginResponse {
    pub amount: Decimal,
    pub code: i64,
    pub msg: String,
    #[serde(rename = "type")]
    pub change: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAdlQuantile {
    pub symbol: String,
    pub adl_quantile: BinanceAdlLevels,
}

/// Queue position 0..=4 per side. One-way mode reports `BOTH`, hedge mode
/// `LONG`/`SHORT` plus the `HEDGE` aggregate.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct BinanceAdlLevels {
    pub long: Option<u8>,
    pub short: Option<u8>,
    pub hedge: Option<u8>,
    pub both: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Spot,
    Margin,
    Futures,
}

impl SnapshotKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "SPOT",
            Self::Margin => "MARGIN",
            Self::Futures => "FUTURES",
        }
    }
}

/// Daily account snapshots. `code` is 200 on success.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAccountSnapshot {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub snapshot_vos: Vec<BinanceSnapshotEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceSnapshotEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub update_time: i64,
    pub data: BinanceSnapshotData,
}

/// Spot snapshots fill `balances`, futures snapshots `assets`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceSnapshotData {
    #[serde(default)]
    pub total_asset_of_btc: Option<String>,
    #[serde(default)]
    pub balances: Vec<BinanceBalance>,
    #[serde(default)]
    pub assets: Vec<BinanceSnapshotAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceSnapshotAsset {
    pub asset: String,
    pub wallet_balance: String,
    #[serde(default)]
    pub margin_balance: Option<String>,
}

// REST K-line rows are positional arrays
#[derive(Debug, Deserialize)]
pub struct BinanceRestKline {
    pub open_time: i64,
    pub open_price: String,
    pub high_price: String,
    pub low_price: String,
    pub close_price: String,
    pub volume: String,
    pub close_time: i64,
    pub quote_asset_volume: String,
    pub number_of_trades: i64,
    pub taker_buy_base_asset_volume: String,
    pub taker_buy_quote_asset_volume: String,
    pub ignore: String,
}
