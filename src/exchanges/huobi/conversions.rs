use crate::core::errors::ExchangeError;
use crate::core::traits::PairFormatter;
use crate::core::types::{
    conversion, AssetClass, Balance, FundingRate, Income, Kline, KlineInterval, OrderResponse,
    OrderSide, Pair, Position, PositionSide, Price, Quantity,
};
use crate::exchanges::huobi::types::{
    HuobiFinancialRecord, HuobiFundingRate, HuobiKline, HuobiPosition, HuobiSpotOrder,
    HuobiSwapAccount,
};
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;

/// One balance per margin account. Isolated USD-M accounts repeat the margin
/// asset once per contract.
pub fn balances(rows: Vec<HuobiSwapAccount>) -> Vec<Balance> {
    rows.into_iter()
        .map(|row| {
            let wallet = row.margin_balance;
            Balance {
                asset: row.margin_asset.unwrap_or(row.symbol),
                wallet_balance: Quantity::new(wallet),
                available: Quantity::new(row.withdraw_available.unwrap_or(wallet)),
                unrealized_pnl: row.profit_unreal,
            }
        })
        .collect()
}

/// Short positions carry a negative amount, matching the signed amounts
/// reported by one-way venues.
pub fn positions(
    asset: AssetClass,
    pairs: &dyn PairFormatter,
    rows: Vec<HuobiPosition>,
) -> Result<Vec<Position>, ExchangeError> {
    rows.into_iter()
        .filter(|row| !row.volume.is_zero())
        .map(|row| {
            let (side, amount) = match row.direction.as_str() {
                "buy" => (PositionSide::Long, row.volume),
                "sell" => (PositionSide::Short, -row.volume),
                other => {
                    return Err(ExchangeError::decode(
                        format!("unknown position direction {}", other),
                        row.contract_code,
                    ))
                }
            };
            Ok(Position {
                pair: pairs.resolve(&row.contract_code, asset)?,
                asset,
                position_side: side,
                entry_price: Price::new(row.cost_open),
                position_amount: Quantity::new(amount),
                unrealized_pnl: row.profit_unreal.unwrap_or_default(),
                liquidation_price: None,
                leverage: row.lever_rate,
                margin_type: row.margin_mode,
            })
        })
        .collect()
}

fn optional_decimal(field: &str, raw: Option<&str>) -> Result<Option<Decimal>, ExchangeError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| conversion::string_to_decimal(field, s))
        .transpose()
}

fn optional_time(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<chrono::DateTime<Utc>>, ExchangeError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            let millis = s
                .parse::<i64>()
                .map_err(|e| ExchangeError::decode(format!("field {}: {}", field, e), s))?;
            conversion::millis_to_time(field, millis)
        })
        .transpose()
}

pub fn funding_rate(
    asset: AssetClass,
    pair: &Pair,
    row: HuobiFundingRate,
) -> Result<FundingRate, ExchangeError> {
    let rate = optional_decimal("funding_rate", row.funding_rate.as_deref())?;
    Ok(FundingRate {
        pair: pair.clone(),
        asset,
        funding_rate: match rate {
            Some(rate) => Some(rate),
            None => optional_decimal("estimated_rate", row.estimated_rate.as_deref())?,
        },
        funding_time: optional_time("funding_time", row.funding_time.as_deref())?,
        next_funding_time: optional_time("next_funding_time", row.next_funding_time.as_deref())?,
        mark_price: None,
        index_price: None,
        timestamp: Utc::now(),
    })
}

/// Financial record type codes the connector names; others keep the code.
fn record_type(code: i64) -> String {
    match code {
        3 => "CLOSE_FEE".to_string(),
        4 => "OPEN_FEE".to_string(),
        5 | 6 => "REALIZED_PNL".to_string(),
        30 | 31 => "FUNDING_FEE".to_string(),
        34 | 35 | 36 | 37 => "TRANSFER".to_string(),
        other => other.to_string(),
    }
}

pub fn income(
    asset: AssetClass,
    pairs: &dyn PairFormatter,
    margin_asset: &str,
    row: HuobiFinancialRecord,
) -> Result<Income, ExchangeError> {
    let pair = row
        .contract_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .map(|code| pairs.resolve(code, asset))
        .transpose()?;
    Ok(Income {
        pair,
        income_type: record_type(row.record_type),
        amount: row.amount,
        asset: if margin_asset.is_empty() {
            row.symbol
        } else {
            margin_asset.to_string()
        },
        time: conversion::millis_to_time("ts", row.ts)?,
        transaction_id: row.id.to_string(),
    })
}

/// Huobi `period` for `interval`. Huobi has no 3m, 2h, 6h, 8h, 12h or 3d bars.
pub const fn period(interval: KlineInterval) -> Option<&'static str> {
    match interval {
        KlineInterval::Minutes1 => Some("1min"),
        KlineInterval::Minutes5 => Some("5min"),
        KlineInterval::Minutes15 => Some("15min"),
        KlineInterval::Minutes30 => Some("30min"),
        KlineInterval::Hours1 => Some("60min"),
        KlineInterval::Hours4 => Some("4hour"),
        KlineInterval::Days1 => Some("1day"),
        KlineInterval::Weeks1 => Some("1week"),
        KlineInterval::Months1 => Some("1mon"),
        _ => None,
    }
}

/// Last millisecond of the bar opened at `open`.
fn bar_close(open: DateTime<Utc>, interval: KlineInterval) -> Option<DateTime<Utc>> {
    let seconds = match interval {
        KlineInterval::Minutes1 => 60,
        KlineInterval::Minutes5 => 300,
        KlineInterval::Minutes15 => 900,
        KlineInterval::Minutes30 => 1_800,
        KlineInterval::Hours1 => 3_600,
        KlineInterval::Hours4 => 14_400,
        KlineInterval::Days1 => 86_400,
        KlineInterval::Weeks1 => 604_800,
        _ => {
            return open
                .checked_add_months(Months::new(1))
                .map(|next| next - chrono::Duration::milliseconds(1))
        }
    };
    Some(open + chrono::Duration::seconds(seconds) - chrono::Duration::milliseconds(1))
}

pub fn kline(pair: &Pair, interval: KlineInterval, row: HuobiKline) -> Result<Kline, ExchangeError> {
    let open_time = row
        .id
        .checked_mul(1_000)
        .ok_or_else(|| ExchangeError::decode("field id overflows", row.id.to_string()))
        .and_then(|millis| conversion::millis_to_time("id", millis))?;
    let close_time = bar_close(open_time, interval)
        .ok_or_else(|| ExchangeError::decode("bar close is out of range", row.id.to_string()))?;
    Ok(Kline {
        pair: pair.clone(),
        interval,
        open_time,
        close_time,
        open_price: Price::new(row.open),
        high_price: Price::new(row.high),
        low_price: Price::new(row.low),
        close_price: Price::new(row.close),
        volume: Quantity::new(row.amount),
        number_of_trades: row.count,
    })
}

fn spot_order_status(state: &str) -> String {
    match state {
        "created" | "submitted" => "NEW".to_string(),
        "partial-filled" => "PARTIALLY_FILLED".to_string(),
        "filled" => "FILLED".to_string(),
        "canceled" | "partial-canceled" => "CANCELED".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// Spot `type` is `<side>-<kind>`, e.g. `buy-limit` or `sell-ioc`.
pub fn spot_order(pairs: &dyn PairFormatter, row: HuobiSpotOrder) -> Result<OrderResponse, ExchangeError> {
    let (side, kind) = row
        .order_type
        .split_once('-')
        .ok_or_else(|| ExchangeError::decode("order type has no side", row.order_type.clone()))?;
    let average_price = (!row.filled_amount.is_zero())
        .then(|| Price::new(row.filled_cash_amount / row.filled_amount));
    let updated = if row.finished_at > 0 { row.finished_at } else { row.created_at };
    Ok(OrderResponse {
        order_id: row.id.to_string(),
        client_order_id: row.client_order_id.unwrap_or_default(),
        pair: pairs.resolve(&row.symbol, AssetClass::Spot)?,
        asset: AssetClass::Spot,
        side: side.parse::<OrderSide>()?,
        order_type: kind.to_ascii_uppercase(),
        quantity: Quantity::new(row.amount),
        executed_quantity: Quantity::new(row.filled_amount),
        price: (!row.price.is_zero()).then(|| Price::new(row.price)),
        average_price,
        status: spot_order_status(&row.state),
        updated_at: conversion::millis_to_time("finished-at", updated)?,
    })
}
