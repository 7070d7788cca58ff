use super::conversions::{self, EventContext};
use super::endpoints;
use crate::core::errors::ExchangeError;
use crate::core::kernel::WsCodec;
use crate::core::traits::PairFormatter;
use crate::core::types::{AssetClass, NormalizedEvent};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

/// Combined-stream codec for one Binance asset class.
///
/// Control frames are `{"method": "SUBSCRIBE" | "UNSUBSCRIBE", "params": [...], "id": n}`.
/// Inbound frames may be wrapped as `{"stream": ..., "data": ...}`; the event
/// type is read from `data.e`.
pub struct BinanceCodec {
    exchange: String,
    asset: AssetClass,
    pairs: Arc<dyn PairFormatter>,
    next_id: AtomicU64,
}

impl BinanceCodec {
    pub fn new(asset: AssetClass, pairs: Arc<dyn PairFormatter>) -> Self {
        Self {
            exchange: "binance".to_string(),
            asset,
            pairs,
            next_id: AtomicU64::new(1),
        }
    }

    pub const fn asset(&self) -> AssetClass {
        self.asset
    }

    fn control(&self, method: &str, streams: &[impl AsRef<str> + Send + Sync]) -> Message {
        let params: Vec<&str> = streams.iter().map(AsRef::as_ref).collect();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Message::Text(
            json!({
                "method": method,
                "params": params,
                "id": id
            })
            .to_string(),
        )
    }

    fn unrecognized(&self, event_type: Option<&str>, raw: &str) -> NormalizedEvent {
        NormalizedEvent::Unrecognized {
            exchange: self.exchange.clone(),
            asset: self.asset,
            event_type: event_type.map(str::to_string),
            raw: raw.to_string(),
        }
    }
}

impl Default for BinanceCodec {
    fn default() -> Self {
        Self::new(AssetClass::UsdMargined, Arc::new(endpoints::pair_formats()))
    }
}

impl std::fmt::Debug for BinanceCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceCodec")
            .field("asset", &self.asset)
            .finish_non_exhaustive()
    }
}

fn payload<T: DeserializeOwned>(data: &Value, event_type: &str, raw: &str) -> Result<T, ExchangeError> {
    T::deserialize(data)
        .map_err(|e| ExchangeError::decode(format!("malformed {} event: {}", event_type, e), raw))
}

impl WsCodec for BinanceCodec {
    fn encode_subscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError> {
        Ok(self.control("SUBSCRIBE", streams))
    }

    fn encode_unsubscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError> {
        Ok(self.control("UNSUBSCRIBE", streams))
    }

    fn handle(&self, raw: &str) -> Result<Option<NormalizedEvent>, ExchangeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ExchangeError::decode(format!("frame is not JSON: {}", e), raw))?;

        // Subscription acknowledgements: {"result": null, "id": 1}
        if value.get("method").is_some() || (value.get("result").is_some() && value.get("id").is_some()) {
            return Ok(None);
        }
        if let Some(error) = value.get("error") {
            return Err(ExchangeError::SubscriptionError(error.to_string()));
        }

        let data = if value.get("stream").is_some() {
            value
                .get("data")
                .ok_or_else(|| ExchangeError::decode("combined frame without data", raw))?
        } else {
            &value
        };

        let Some(event_type) = data.get("e").and_then(Value::as_str) else {
            return Ok(Some(self.unrecognized(None, raw)));
        };

        let ctx = EventContext {
            exchange: &self.exchange,
            asset: self.asset,
            pairs: self.pairs.as_ref(),
            raw,
        };
        let event = match event_type {
            "markPriceUpdate" => conversions::mark_price_update(&ctx, payload(data, event_type, raw)?)?,
            "kline" => conversions::kline_update(&ctx, payload(data, event_type, raw)?)?,
            "forceOrder" => conversions::force_order_update(&ctx, payload(data, event_type, raw)?)?,
            "ACCOUNT_UPDATE" => conversions::account_update(&ctx, payload(data, event_type, raw)?)?,
            "ORDER_TRADE_UPDATE" => {
                conversions::order_trade_update(&ctx, payload(data, event_type, raw)?)?
            }
            "executionReport" => conversions::execution_report(&ctx, payload(data, event_type, raw)?)?,
            "outboundAccountPosition" => {
                conversions::outbound_account_position(&ctx, payload(data, event_type, raw)?)?
            }
            "listenKeyExpired" => conversions::listen_key_expired(&ctx, payload(data, event_type, raw)?)?,
            other => return Ok(Some(self.unrecognized(Some(other), raw))),
        };
        Ok(Some(event))
    }
}
