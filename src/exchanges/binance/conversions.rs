use super::types as wire;
use crate::core::errors::ExchangeError;
use crate::core::traits::PairFormatter;
use crate::core::types::{
    conversion, AccountUpdate, AssetClass, Balance, BalanceChange, ForceOrderUpdate, FundingRate,
    Income, Kline, KlineInterval, KlineUpdate, Leverage, ListenKeyExpired, MarkPriceUpdate,
    NormalizedEvent, OrderResponse, OrderSide, OrderTradeUpdate, OrderType, Pair, Position,
    PositionChange, PositionSide, Price, Quantity,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// What every stream conversion needs besides the payload itself.
pub struct EventContext<'a> {
    pub exchange: &'a str,
    pub asset: AssetClass,
    pub pairs: &'a dyn PairFormatter,
    /// Frame the payload came from, attached to every decode failure
    pub raw: &'a str,
}

impl EventContext<'_> {
    fn number(&self, field: &str, value: &str) -> Result<f64, ExchangeError> {
        value.trim().parse::<f64>().map_err(|e| {
            ExchangeError::decode(format!("field {} is not a number: {}", field, e), self.raw)
        })
    }

    fn optional_number(&self, field: &str, value: Option<&str>) -> Result<Option<f64>, ExchangeError> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => self.number(field, v).map(Some),
        }
    }

    fn time(&self, field: &str, millis: i64) -> Result<DateTime<Utc>, ExchangeError> {
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            ExchangeError::decode(format!("field {} is not a valid timestamp", field), self.raw)
        })
    }

    fn pair(&self, symbol: &str) -> Result<Pair, ExchangeError> {
        self.pairs
            .resolve(symbol, self.asset)
            .map_err(|e| ExchangeError::decode(e.to_string(), self.raw))
    }
}

pub fn mark_price_update(
    ctx: &EventContext<'_>,
    event: wire::BinanceMarkPriceEvent,
) -> Result<NormalizedEvent, ExchangeError> {
    Ok(NormalizedEvent::MarkPriceUpdate(MarkPriceUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        pair: ctx.pair(&event.symbol)?,
        event_time: ctx.time("E", event.event_time)?,
        mark_price: ctx.number("p", &event.mark_price)?,
        index_price: ctx.number("i", &event.index_price)?,
        estimated_settle_price: ctx.optional_number("P", event.estimated_settle_price.as_deref())?,
        funding_rate: ctx.number("r", &event.funding_rate)?,
        next_funding_time: ctx.time("T", event.next_funding_time)?,
    }))
}

pub fn kline_update(
    ctx: &EventContext<'_>,
    event: wire::BinanceKlineEvent,
) -> Result<NormalizedEvent, ExchangeError> {
    let k = event.kline;
    Ok(NormalizedEvent::KlineUpdate(KlineUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        pair: ctx.pair(&event.symbol)?,
        event_time: ctx.time("E", event.event_time)?,
        interval: k.interval,
        start_time: ctx.time("t", k.open_time)?,
        close_time: ctx.time("T", k.close_time)?,
        open: ctx.number("o", &k.open_price)?,
        high: ctx.number("h", &k.high_price)?,
        low: ctx.number("l", &k.low_price)?,
        close: ctx.number("c", &k.close_price)?,
        volume: ctx.number("v", &k.volume)?,
        quote_volume: ctx.number("q", &k.quote_volume)?,
        trade_count: k.number_of_trades,
        is_closed: k.final_bar,
    }))
}

pub fn force_order_update(
    ctx: &EventContext<'_>,
    event: wire::BinanceForceOrderEvent,
) -> Result<NormalizedEvent, ExchangeError> {
    let o = event.order;
    Ok(NormalizedEvent::ForceOrderUpdate(ForceOrderUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        pair: ctx.pair(&o.symbol)?,
        event_time: ctx.time("E", event.event_time)?,
        side: o.side,
        order_type: o.order_type,
        time_in_force: o.time_in_force,
        quantity: ctx.number("q", &o.quantity)?,
        price: ctx.number("p", &o.price)?,
        average_price: ctx.number("ap", &o.average_price)?,
        status: o.status,
        last_filled_quantity: ctx.number("l", &o.last_filled_quantity)?,
        cumulative_filled_quantity: ctx.number("z", &o.cumulative_filled_quantity)?,
        trade_time: ctx.time("T", o.trade_time)?,
    }))
}

pub fn account_update(
    ctx: &EventContext<'_>,
    event: wire::BinanceAccountUpdateEvent,
) -> Result<NormalizedEvent, ExchangeError> {
    let balances = event
        .update
        .balances
        .iter()
        .map(|b| {
            Ok(BalanceChange {
                asset: b.asset.clone(),
                wallet_balance: ctx.number("wb", &b.wallet_balance)?,
                cross_wallet_balance: ctx.optional_number("cw", b.cross_wallet_balance.as_deref())?,
                locked: None,
            })
        })
        .collect::<Result<Vec<_>, ExchangeError>>()?;

    let positions = event
        .update
        .positions
        .iter()
        .map(|p| {
            Ok(PositionChange {
                pair: ctx.pair(&p.symbol)?,
                position_amount: ctx.number("pa", &p.position_amount)?,
                entry_price: ctx.number("ep", &p.entry_price)?,
                unrealized_pnl: ctx.number("up", &p.unrealized_pnl)?,
                margin_type: p.margin_type.clone(),
                position_side: p.position_side.clone(),
            })
        })
        .collect::<Result<Vec<_>, ExchangeError>>()?;

    Ok(NormalizedEvent::AccountUpdate(AccountUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        event_time: ctx.time("E", event.event_time)?,
        transaction_time: Some(ctx.time("T", event.transaction_time)?),
        reason: Some(event.update.reason),
        balances,
        positions,
    }))
}

/// Spot balances arrive as free/locked; the wallet balance is their sum.
pub fn outbound_account_position(
    ctx: &EventContext<'_>,
    event: wire::BinanceOutboundAccountPosition,
) -> Result<NormalizedEvent, ExchangeError> {
    let balances = event
        .balances
        .iter()
        .map(|b| {
            let free = ctx.number("f", &b.free)?;
            let locked = ctx.number("l", &b.locked)?;
            Ok(BalanceChange {
                asset: b.asset.clone(),
                wallet_balance: free + locked,
                cross_wallet_balance: None,
                locked: Some(locked),
            })
        })
        .collect::<Result<Vec<_>, ExchangeError>>()?;

    Ok(NormalizedEvent::AccountUpdate(AccountUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        event_time: ctx.time("E", event.event_time)?,
        transaction_time: event
            .last_update_time
            .map(|u| ctx.time("u", u))
            .transpose()?,
        reason: None,
        balances,
        positions: Vec::new(),
    }))
}

pub fn order_trade_update(
    ctx: &EventContext<'_>,
    event: wire::BinanceOrderTradeUpdateEvent,
) -> Result<NormalizedEvent, ExchangeError> {
    let o = event.order;
    Ok(NormalizedEvent::OrderTradeUpdate(OrderTradeUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        pair: ctx.pair(&o.symbol)?,
        event_time: ctx.time("E", event.event_time)?,
        transaction_time: ctx.time("T", event.transaction_time)?,
        order_id: o.order_id,
        client_order_id: o.client_order_id,
        side: o.side,
        order_type: o.order_type,
        time_in_force: o.time_in_force,
        execution_type: o.execution_type,
        status: o.status,
        quantity: ctx.number("q", &o.quantity)?,
        price: ctx.number("p", &o.price)?,
        average_price: ctx.optional_number("ap", o.average_price.as_deref())?,
        stop_price: ctx.number("sp", &o.stop_price)?,
        last_filled_quantity: ctx.number("l", &o.last_filled_quantity)?,
        cumulative_filled_quantity: ctx.number("z", &o.cumulative_filled_quantity)?,
        last_filled_price: ctx.number("L", &o.last_filled_price)?,
        commission: ctx.optional_number("n", o.commission.as_deref())?,
        commission_asset: o.commission_asset,
        trade_id: o.trade_id,
        is_maker: o.is_maker,
        reduce_only: o.reduce_only,
        position_side: o.position_side,
        realized_profit: ctx.optional_number("rp", o.realized_profit.as_deref())?,
    }))
}

/// Spot execution reports share the futures order update shape.
pub fn execution_report(
    ctx: &EventContext<'_>,
    event: wire::BinanceExecutionReport,
) -> Result<NormalizedEvent, ExchangeError> {
    Ok(NormalizedEvent::OrderTradeUpdate(OrderTradeUpdate {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        pair: ctx.pair(&event.symbol)?,
        event_time: ctx.time("E", event.event_time)?,
        transaction_time: ctx.time("T", event.transaction_time)?,
        order_id: event.order_id,
        client_order_id: event.client_order_id,
        side: event.side,
        order_type: event.order_type,
        time_in_force: event.time_in_force,
        execution_type: event.execution_type,
        status: event.status,
        quantity: ctx.number("q", &event.quantity)?,
        price: ctx.number("p", &event.price)?,
        average_price: None,
        stop_price: ctx.number("P", &event.stop_price)?,
        last_filled_quantity: ctx.number("l", &event.last_filled_quantity)?,
        cumulative_filled_quantity: ctx.number("z", &event.cumulative_filled_quantity)?,
        last_filled_price: ctx.number("L", &event.last_filled_price)?,
        commission: ctx.optional_number("n", event.commission.as_deref())?,
        commission_asset: event.commission_asset,
        trade_id: event.trade_id,
        is_maker: event.is_maker,
        reduce_only: false,
        position_side: None,
        realized_profit: None,
    }))
}

pub fn listen_key_expired(
    ctx: &EventContext<'_>,
    event: wire::BinanceListenKeyExpiredEvent,
) -> Result<NormalizedEvent, ExchangeError> {
    Ok(NormalizedEvent::ListenKeyExpired(ListenKeyExpired {
        exchange: ctx.exchange.to_string(),
        asset: ctx.asset,
        event_time: ctx.time("E", event.event_time)?,
    }))
}

// REST conversions keep exact decimals

fn optional_decimal(field: &str, value: Option<&str>) -> Result<Option<Decimal>, ExchangeError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => conversion::string_to_decimal(field, v).map(Some),
    }
}

pub fn spot_balances(account: wire::BinanceAccountInfo) -> Result<Vec<Balance>, ExchangeError> {
    account
        .balances
        .into_iter()
        .map(|b| {
            let free = conversion::string_to_decimal("free", &b.free)?;
            let locked = conversion::string_to_decimal("locked", &b.locked)?;
            Ok(Balance {
                asset: b.asset,
                wallet_balance: Quantity::new(free + locked),
                available: Quantity::new(free),
                unrealized_pnl: None,
            })
        })
        .filter(|balance: &Result<Balance, ExchangeError>| {
            balance
                .as_ref()
                .map_or(true, |b| !b.wallet_balance.value().is_zero())
        })
        .collect()
}

pub fn futures_balances(account: wire::BinanceFuturesAccountInfo) -> Result<Vec<Balance>, ExchangeError> {
    account
        .assets
        .into_iter()
        .map(|a| {
            let wallet = conversion::string_to_decimal("walletBalance", &a.wallet_balance)?;
            let available = optional_decimal("availableBalance", a.available_balance.as_deref())?
                .unwrap_or(wallet);
            Ok(Balance {
                asset: a.asset,
                wallet_balance: Quantity::new(wallet),
                available: Quantity::new(available),
                unrealized_pnl: optional_decimal("unrealizedProfit", a.unrealized_profit.as_deref())?,
            })
        })
        .collect()
}

fn position_side(raw: Option<&str>, amount: Decimal) -> PositionSide {
    match raw {
        Some("LONG") => PositionSide::Long,
        Some("SHORT") => PositionSide::Short,
        _ if amount.is_sign_negative() => PositionSide::Short,
        _ => PositionSide::Both,
    }
}

/// Open positions only; flat rows are dropped.
pub fn positions(
    asset: AssetClass,
    pairs: &dyn PairFormatter,
    rows: Vec<wire::BinancePositionRisk>,
) -> Result<Vec<Position>, ExchangeError> {
    let mut positions = Vec::with_capacity(rows.len());
    for row in rows {
        let amount = conversion::string_to_decimal("positionAmt", &row.position_amt)?;
        if amount.is_zero() {
            continue;
        }
        positions.push(Position {
            pair: pairs.resolve(&row.symbol, asset)?,
            asset,
            position_side: position_side(row.position_side.as_deref(), amount),
            entry_price: conversion::string_to_price("entryPrice", &row.entry_price)?,
            position_amount: Quantity::new(amount),
            unrealized_pnl: conversion::string_to_decimal("unRealizedProfit", &row.un_realized_profit)?,
            liquidation_price: optional_decimal("liquidationPrice", row.liquidation_price.as_deref())?
                .filter(|p| !p.is_zero())
                .map(Price::new),
            leverage: conversion::string_to_decimal("leverage", &row.leverage)?,
            margin_type: row.margin_type,
        });
    }
    Ok(positions)
}

pub fn mark_price(
    asset: AssetClass,
    pair: &Pair,
    index: wire::BinancePremiumIndex,
) -> Result<FundingRate, ExchangeError> {
    Ok(FundingRate {
        pair: pair.clone(),
        asset,
        funding_rate: optional_decimal("lastFundingRate", index.last_funding_rate.as_deref())?,
        funding_time: None,
        next_funding_time: index
            .next_funding_time
            .filter(|t| *t > 0)
            .map(|t| conversion::millis_to_time("nextFundingTime", t))
            .transpose()?,
        mark_price: Some(conversion::string_to_price("markPrice", &index.mark_price)?),
        index_price: Some(conversion::string_to_price("indexPrice", &index.index_price)?),
        timestamp: conversion::millis_to_time("time", index.time)?,
    })
}

pub fn funding_rate(
    asset: AssetClass,
    pair: &Pair,
    row: wire::BinanceFundingRate,
) -> Result<FundingRate, ExchangeError> {
    let funding_time = conversion::millis_to_time("fundingTime", row.funding_time)?;
    Ok(FundingRate {
        pair: pair.clone(),
        asset,
        funding_rate: Some(conversion::string_to_decimal("fundingRate", &row.funding_rate)?),
        funding_time: Some(funding_time),
        next_funding_time: None,
        mark_price: optional_decimal("markPrice", row.mark_price.as_deref())?
            .map(Price::new),
        index_price: None,
        timestamp: funding_time,
    })
}

pub fn kline(pair: &Pair, interval: KlineInterval, row: wire::BinanceRestKline) -> Result<Kline, ExchangeError> {
    Ok(Kline {
        pair: pair.clone(),
        interval,
        open_time: conversion::millis_to_time("openTime", row.open_time)?,
        close_time: conversion::millis_to_time("closeTime", row.close_time)?,
        open_price: conversion::string_to_price("open", &row.open_price)?,
        high_price: conversion::string_to_price("high", &row.high_price)?,
        low_price: conversion::string_to_price("low", &row.low_price)?,
        close_price: conversion::string_to_price("close", &row.close_price)?,
        volume: conversion::string_to_quantity("volume", &row.volume)?,
        number_of_trades: row.number_of_trades,
    })
}

pub fn order_response(
    asset: AssetClass,
    pairs: &dyn PairFormatter,
    order: wire::BinanceOrderResponse,
) -> Result<OrderResponse, ExchangeError> {
    let price = conversion::string_to_decimal("price", &order.price)?;
    let updated = order
        .update_time
        .or(order.transact_time)
        .or(order.time)
        .unwrap_or_default();
    Ok(OrderResponse {
        order_id: order.order_id.to_string(),
        client_order_id: order.client_order_id,
        pair: pairs.resolve(&order.symbol, asset)?,
        asset,
        side: order.side.parse::<OrderSide>()?,
        order_type: order.order_type,
        quantity: conversion::string_to_quantity("origQty", &order.orig_qty)?,
        executed_quantity: conversion::string_to_quantity("executedQty", &order.executed_qty)?,
        price: (!price.is_zero()).then(|| Price::new(price)),
        average_price: optional_decimal("avgPrice", order.avg_price.as_deref())?
            .filter(|p| !p.is_zero())
            .map(Price::new),
        status: order.status,
        updated_at: conversion::millis_to_time("updateTime", updated)?,
    })
}

pub fn income(
    asset: AssetClass,
    pairs: &dyn PairFormatter,
    row: wire::BinanceIncome,
) -> Result<Income, ExchangeError> {
    let pair = if row.symbol.is_empty() {
        None
    } else {
        Some(pairs.resolve(&row.symbol, asset)?)
    };
    let transaction_id = match row.tran_id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(Income {
        pair,
        income_type: row.income_type,
        amount: conversion::string_to_decimal("income", &row.income)?,
        asset: row.asset,
        time: conversion::millis_to_time("time", row.time)?,
        transaction_id,
    })
}

pub fn leverage(pair: &Pair, response: wire::BinanceLeverageResponse) -> Result<Leverage, ExchangeError> {
    let max_notional = response
        .max_notional_value
        .as_deref()
        .or(response.max_qty.as_deref());
    Ok(Leverage {
        pair: pair.clone(),
        leverage: response.leverage,
        max_notional: optional_decimal("maxNotionalValue", max_notional)?,
    })
}

pub const fn order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopMarket => "STOP_MARKET",
        OrderType::StopLimit => "STOP",
        OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        OrderType::TakeProfitLimit => "TAKE_PROFIT",
    }
}

/// Spot names its stop orders differently from the futures APIs.
pub const fn spot_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::StopMarket => "STOP_LOSS",
        OrderType::StopLimit => "STOP_LOSS_LIMIT",
        OrderType::TakeProfitMarket => "TAKE_PROFIT",
        OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
    }
}
