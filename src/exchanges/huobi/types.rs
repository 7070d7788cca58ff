use crate::core::errors::ExchangeError;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// `{status, data, err_code, err_msg, ts}` on v1 routes and
/// `{code, data, message, ok}` on v2 routes. Spot answers with dashed error
/// field names, swaps with underscores.
#[derive(Debug, Deserialize)]
pub struct HuobiResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, alias = "err-code")]
    pub err_code: Option<Value>,
    #[serde(default, alias = "err-msg")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub ts: Option<i64>,
}

impl HuobiResponse {
    fn is_ok(&self) -> bool {
        match (&self.status, self.code) {
            (Some(status), _) => status == "ok",
            (None, Some(code)) => code == 200,
            (None, None) => false,
        }
    }

    /// The `data` member of a successful response, an `ApiError` otherwise.
    pub fn into_data(self) -> Result<Value, ExchangeError> {
        if self.is_ok() {
            return Ok(self.data);
        }
        let code = match &self.err_code {
            Some(Value::Number(n)) => n.as_i64().and_then(|c| i32::try_from(c).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .or_else(|| self.code.and_then(|c| i32::try_from(c).ok()));
        let fallback = match (&self.status, self.code) {
            (Some(status), _) => format!("request failed with status {}", status),
            (None, Some(code)) => format!("request failed with code {}", code),
            (None, None) => "response carries neither status nor code".to_string(),
        };
        Err(ExchangeError::ApiError {
            code: code.unwrap_or(0),
            message: self
                .err_msg
                .or(self.message)
                .or_else(|| match self.err_code {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                })
                .unwrap_or(fallback),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HuobiSwapAccount {
    pub symbol: String,
    pub contract_code: Option<String>,
    pub margin_asset: Option<String>,
    pub margin_balance: Decimal,
    #[serde(default)]
    pub margin_frozen: Option<Decimal>,
    #[serde(default)]
    pub withdraw_available: Option<Decimal>,
    #[serde(default)]
    pub profit_unreal: Option<Decimal>,
    #[serde(default)]
    pub liquidation_price: Option<Decimal>,
    #[serde(default)]
    pub lever_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HuobiPosition {
    pub symbol: String,
    pub contract_code: String,
    pub volume: Decimal,
    #[serde(default)]
    pub available: Option<Decimal>,
    pub cost_open: Decimal,
    #[serde(default)]
    pub profit_unreal: Option<Decimal>,
    pub lever_rate: Decimal,
    /// `buy` or `sell`
    pub direction: String,
    #[serde(default)]
    pub margin_mode: Option<String>,
}

/// Funding fields arrive as strings and may be null between settlements.
#[derive(Debug, Clone, Deserialize)]
pub struct HuobiFundingRate {
    pub contract_code: String,
    pub funding_rate: Option<String>,
    pub estimated_rate: Option<String>,
    pub funding_time: Option<String>,
    pub next_funding_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HuobiFinancialRecords {
    pub financial_record: Vec<HuobiFinancialRecord>,
    #[serde(default)]
    pub total_page: Option<u32>,
    #[serde(default)]
    pub current_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HuobiFinancialRecord {
    pub id: i64,
    pub ts: i64,
    pub symbol: String,
    pub contract_code: Option<String>,
    #[serde(rename = "type")]
    pub record_type: i64,
    pub amount: Decimal,
}

/// One candle of `market/history/kline`. `id` is the open time in epoch
/// seconds; `amount` is base volume on spot and swaps alike.
#[derive(Debug, Clone, Deserialize)]
pub struct HuobiKline {
    pub id: i64,
    pub open: Decimal,
    pub close: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub vol: Option<Decimal>,
    #[serde(default)]
    pub count: i64,
}

/// Total account value in the requested currency; `timestamp` in millis.
#[derive(Debug, Clone, Deserialize)]
pub struct HuobiAssetValuation {
    pub balance: Decimal,
    pub timestamp: i64,
}

/// Spot order detail. The venue still spells the fill fields `field-*`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HuobiSpotOrder {
    pub id: i64,
    pub symbol: String,
    pub account_id: i64,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub amount: Decimal,
    pub price: Decimal,
    pub created_at: i64,
    /// `buy-limit`, `sell-market`, `buy-limit-maker`, ...
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(alias = "field-amount")]
    pub filled_amount: Decimal,
    #[serde(alias = "field-cash-amount")]
    pub filled_cash_amount: Decimal,
    #[serde(default, alias = "field-fees")]
    pub filled_fees: Decimal,
    #[serde(default)]
    pub finished_at: i64,
    pub state: String,
}
