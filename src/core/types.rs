use crate::core::errors::ExchangeError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market segment of a venue. Picks the base URL, the path version and the
/// wire symbol format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Spot,
    UsdMargined,
    CoinMargined,
}

impl AssetClass {
    pub const ALL: [Self; 3] = [Self::Spot, Self::UsdMargined, Self::CoinMargined];

    pub const fn is_derivative(self) -> bool {
        !matches!(self, Self::Spot)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::UsdMargined => "usd_margined",
            Self::CoinMargined => "coin_margined",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "usd_margined" | "usdm" | "future" | "futures" => Ok(Self::UsdMargined),
            "coin_margined" | "coinm" | "perp" | "perpetual" => Ok(Self::CoinMargined),
            other => Err(ExchangeError::InvalidParameters(format!(
                "unknown asset class: {}",
                other
            ))),
        }
    }
}

/// Canonical currency pair, always upper case. Displays as `BASE/QUOTE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Result<Self, ExchangeError> {
        let base = base.as_ref().trim().to_uppercase();
        let quote = quote.as_ref().trim().to_uppercase();

        if base.is_empty() || quote.is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "Base and quote assets cannot be empty".to_string(),
            ));
        }

        Ok(Self { base, quote })
    }

    /// Parses `BTC/USDT`, `BTC-USDT` or `BTC_USDT`.
    pub fn parse(pair: &str) -> Result<Self, ExchangeError> {
        pair.split_once(|c| matches!(c, '/' | '-' | '_'))
            .ok_or_else(|| {
                ExchangeError::InvalidParameters(format!("pair {} has no delimiter", pair))
            })
            .and_then(|(base, quote)| Self::new(base, quote))
    }

    /// Base and quote joined with `delimiter`.
    pub fn join(&self, delimiter: &str) -> String {
        format!("{}{}{}", self.base, delimiter, self.quote)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Exact price used for order entry and REST results
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(#[serde(with = "rust_decimal::serde::str")] pub Decimal);

impl Price {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(#[serde(with = "rust_decimal::serde::str")] pub Decimal);

impl Quantity {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fallible wire-string conversions shared by the venue adapters
pub mod conversion {
    use super::{Decimal, ExchangeError, Price, Quantity};
    use chrono::{DateTime, Utc};

    #[inline]
    pub fn string_to_decimal(field: &str, s: &str) -> Result<Decimal, ExchangeError> {
        s.parse::<Decimal>().map_err(|e| {
            ExchangeError::decode(format!("field {} is not a decimal: {}", field, e), s)
        })
    }

    #[inline]
    pub fn string_to_price(field: &str, s: &str) -> Result<Price, ExchangeError> {
        string_to_decimal(field, s).map(Price::new)
    }

    #[inline]
    pub fn string_to_quantity(field: &str, s: &str) -> Result<Quantity, ExchangeError> {
        string_to_decimal(field, s).map(Quantity::new)
    }

    /// Epoch milliseconds to an absolute UTC time.
    #[inline]
    pub fn millis_to_time(field: &str, millis: i64) -> Result<DateTime<Utc>, ExchangeError> {
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            ExchangeError::decode(
                format!("field {} is not a valid epoch millisecond value", field),
                millis.to_string(),
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl FromStr for OrderSide {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(ExchangeError::InvalidParameters(format!(
                "unknown order side {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    TakeProfitMarket,
    TakeProfitLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC, // Good Till Canceled
    IOC, // Immediate or Cancel
    FOK, // Fill or Kill
    GTX, // Post only
}

impl TimeInForce {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GTC => "GTC",
            Self::IOC => "IOC",
            Self::FOK => "FOK",
            Self::GTX => "GTX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub pair: Pair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    pub position_side: Option<PositionSide>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(pair: Pair, side: OrderSide, quantity: Quantity) -> Self {
        Self {
            pair,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            position_side: None,
            client_order_id: None,
        }
    }

    pub fn limit(pair: Pair, side: OrderSide, quantity: Quantity, price: Price) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::market(pair, side, quantity)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub client_order_id: String,
    pub pair: Pair,
    pub asset: AssetClass,
    pub side: OrderSide,
    pub order_type: String,
    pub quantity: Quantity,
    pub executed_quantity: Quantity,
    pub price: Option<Price>,
    pub average_price: Option<Price>,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub wallet_balance: Quantity,
    pub available: Quantity,
    pub unrealized_pnl: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub pair: Pair,
    pub asset: AssetClass,
    pub position_side: PositionSide,
    pub entry_price: Price,
    pub position_amount: Quantity,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Option<Price>,
    pub leverage: Decimal,
    pub margin_type: Option<String>,
}

/// Funding rate information for perpetual futures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub pair: Pair,
    pub asset: AssetClass,
    pub funding_rate: Option<Decimal>,
    pub funding_time: Option<DateTime<Utc>>,
    pub next_funding_time: Option<DateTime<Utc>>,
    pub mark_price: Option<Price>,
    pub index_price: Option<Price>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub pair: Pair,
    pub interval: KlineInterval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open_price: Price,
    pub high_price: Price,
    pub low_price: Price,
    pub close_price: Price,
    pub volume: Quantity,
    pub number_of_trades: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Income {
    pub pair: Option<Pair>,
    pub income_type: String,
    pub amount: Decimal,
    pub asset: String,
    pub time: DateTime<Utc>,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct IncomeQuery {
    pub pair: Option<Pair>,
    pub income_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leverage {
    pub pair: Pair,
    pub leverage: u32,
    pub max_notional: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginType {
    Isolated,
    Crossed,
}

impl MarginType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isolated => "ISOLATED",
            Self::Crossed => "CROSSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    Minutes1,
    Minutes3,
    Minutes5,
    Minutes15,
    Minutes30,
    Hours1,
    Hours2,
    Hours4,
    Hours6,
    Hours8,
    Hours12,
    Days1,
    Days3,
    Weeks1,
    Months1,
}

impl KlineInterval {
    /// Convert to Binance format (e.g., "1m", "1h", "1d")
    pub const fn to_binance_format(self) -> &'static str {
        match self {
            Self::Minutes1 => "1m",
            Self::Minutes3 => "3m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hours1 => "1h",
            Self::Hours2 => "2h",
            Self::Hours4 => "4h",
            Self::Hours6 => "6h",
            Self::Hours8 => "8h",
            Self::Hours12 => "12h",
            Self::Days1 => "1d",
            Self::Days3 => "3d",
            Self::Weeks1 => "1w",
            Self::Months1 => "1M",
        }
    }

    /// Inverse of [`KlineInterval::to_binance_format`].
    pub fn from_binance_format(s: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|interval| interval.to_binance_format() == s)
    }

    pub fn all() -> [Self; 15] {
        [
            Self::Minutes1,
            Self::Minutes3,
            Self::Minutes5,
            Self::Minutes15,
            Self::Minutes30,
            Self::Hours1,
            Self::Hours2,
            Self::Hours4,
            Self::Hours6,
            Self::Hours8,
            Self::Hours12,
            Self::Days1,
            Self::Days3,
            Self::Weeks1,
            Self::Months1,
        ]
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_binance_format())
    }
}

/// One channel on a multiplexed stream, mirrored client-side so it can be
/// replayed after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: String,
    pub pair: Option<Pair>,
    pub asset: AssetClass,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, pair: Option<Pair>, asset: AssetClass) -> Self {
        Self {
            channel: channel.into(),
            pair,
            asset,
        }
    }
}

// Normalized streaming events. Numbers are f64 and times are absolute UTC.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPriceUpdate {
    pub exchange: String,
    pub asset: AssetClass,
    pub pair: Pair,
    pub event_time: DateTime<Utc>,
    pub mark_price: f64,
    pub index_price: f64,
    pub estimated_settle_price: Option<f64>,
    pub funding_rate: f64,
    pub next_funding_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineUpdate {
    pub exchange: String,
    pub asset: AssetClass,
    pub pair: Pair,
    pub event_time: DateTime<Utc>,
    pub interval: String,
    pub start_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: i64,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub asset: String,
    pub wallet_balance: f64,
    pub cross_wallet_balance: Option<f64>,
    pub locked: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChange {
    pub pair: Pair,
    pub position_amount: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    pub margin_type: String,
    pub position_side: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub exchange: String,
    pub asset: AssetClass,
    pub event_time: DateTime<Utc>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub balances: Vec<BalanceChange>,
    pub positions: Vec<PositionChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTradeUpdate {
    pub exchange: String,
    pub asset: AssetClass,
    pub pair: Pair,
    pub event_time: DateTime<Utc>,
    pub transaction_time: DateTime<Utc>,
    pub order_id: i64,
    pub client_order_id: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub execution_type: String,
    pub status: String,
    pub quantity: f64,
    pub price: f64,
    pub average_price: Option<f64>,
    pub stop_price: f64,
    pub last_filled_quantity: f64,
    pub cumulative_filled_quantity: f64,
    pub last_filled_price: f64,
    pub commission: Option<f64>,
    pub commission_asset: Option<String>,
    pub trade_id: i64,
    pub is_maker: bool,
    pub reduce_only: bool,
    pub position_side: Option<String>,
    pub realized_profit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceOrderUpdate {
    pub exchange: String,
    pub asset: AssetClass,
    pub pair: Pair,
    pub event_time: DateTime<Utc>,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub quantity: f64,
    pub price: f64,
    pub average_price: f64,
    pub status: String,
    pub last_filled_quantity: f64,
    pub cumulative_filled_quantity: f64,
    pub trade_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenKeyExpired {
    pub exchange: String,
    pub asset: AssetClass,
    pub event_time: DateTime<Utc>,
}

/// Venue-agnostic event produced by a stream demultiplexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NormalizedEvent {
    MarkPriceUpdate(MarkPriceUpdate),
    KlineUpdate(KlineUpdate),
    AccountUpdate(AccountUpdate),
    OrderTradeUpdate(OrderTradeUpdate),
    ForceOrderUpdate(ForceOrderUpdate),
    ListenKeyExpired(ListenKeyExpired),
    Unrecognized {
        exchange: String,
        asset: AssetClass,
        event_type: Option<String>,
        raw: String,
    },
}

impl NormalizedEvent {
    pub fn exchange(&self) -> &str {
        match self {
            Self::MarkPriceUpdate(e) => &e.exchange,
            Self::KlineUpdate(e) => &e.exchange,
            Self::AccountUpdate(e) => &e.exchange,
            Self::OrderTradeUpdate(e) => &e.exchange,
            Self::ForceOrderUpdate(e) => &e.exchange,
            Self::ListenKeyExpired(e) => &e.exchange,
            Self::Unrecognized { exchange, .. } => exchange,
        }
    }

    pub const fn asset(&self) -> AssetClass {
        match self {
            Self::MarkPriceUpdate(e) => e.asset,
            Self::KlineUpdate(e) => e.asset,
            Self::AccountUpdate(e) => e.asset,
            Self::OrderTradeUpdate(e) => e.asset,
            Self::ForceOrderUpdate(e) => e.asset,
            Self::ListenKeyExpired(e) => e.asset,
            Self::Unrecognized { asset, .. } => *asset,
        }
    }

    pub const fn pair(&self) -> Option<&Pair> {
        match self {
            Self::MarkPriceUpdate(e) => Some(&e.pair),
            Self::KlineUpdate(e) => Some(&e.pair),
            Self::OrderTradeUpdate(e) => Some(&e.pair),
            Self::ForceOrderUpdate(e) => Some(&e.pair),
            Self::AccountUpdate(_) | Self::ListenKeyExpired(_) | Self::Unrecognized { .. } => None,
        }
    }

    pub const fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized { .. })
    }
}
