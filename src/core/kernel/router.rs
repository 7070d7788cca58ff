use crate::core::errors::ExchangeError;
use crate::core::types::AssetClass;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Logical REST operation, independent of venue and asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Ping,
    ExchangeInfo,
    AccountInfo,
    PositionRisk,
    OpenOrders,
    NewOrder,
    QueryOrder,
    CancelOrder,
    IncomeHistory,
    Leverage,
    MarginType,
    FundingRate,
    MarkPrice,
    Klines,
    ForceOrders,
    CommissionRate,
    CreateListenKey,
    KeepAliveListenKey,
    CloseListenKey,
    PositionMargin,
    AdlQuantile,
    AccountSnapshot,
    Transfer,
    UserId,
    AssetValuation,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ExchangeInfo => "exchange_info",
            Self::AccountInfo => "account_info",
            Self::PositionRisk => "position_risk",
            Self::OpenOrders => "open_orders",
            Self::NewOrder => "new_order",
            Self::QueryOrder => "query_order",
            Self::CancelOrder => "cancel_order",
            Self::IncomeHistory => "income_history",
            Self::Leverage => "leverage",
            Self::MarginType => "margin_type",
            Self::FundingRate => "funding_rate",
            Self::MarkPrice => "mark_price",
            Self::Klines => "klines",
            Self::ForceOrders => "force_orders",
            Self::CommissionRate => "commission_rate",
            Self::CreateListenKey => "create_listen_key",
            Self::KeepAliveListenKey => "keep_alive_listen_key",
            Self::CloseListenKey => "close_listen_key",
            Self::PositionMargin => "position_margin",
            Self::AdlQuantile => "adl_quantile",
            Self::AccountSnapshot => "account_snapshot",
            Self::Transfer => "transfer",
            Self::UserId => "user_id",
            Self::AssetValuation => "asset_valuation",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limit grouping. Venues meter coarse classes, not individual paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Default,
    Order,
    MarketData,
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Order => "order",
            Self::MarketData => "market_data",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthLevel {
    Public,
    /// API key header, no signature
    ApiKey,
    Signed,
}

impl AuthLevel {
    pub const fn requires_auth(self) -> bool {
        !matches!(self, Self::Public)
    }
}

/// Static description of a logical endpoint: one path per supported asset
/// class, plus method, auth and rate class shared by all of them.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub endpoint: Endpoint,
    pub method: Method,
    pub auth: AuthLevel,
    pub class: EndpointClass,
    paths: Vec<(AssetClass, &'static str, Option<Method>)>,
}

impl EndpointDescriptor {
    pub fn new(
        endpoint: Endpoint,
        method: Method,
        auth: AuthLevel,
        class: EndpointClass,
    ) -> Self {
        Self {
            endpoint,
            method,
            auth,
            class,
            paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn path(mut self, asset: AssetClass, path: &'static str) -> Self {
        self.paths.push((asset, path, None));
        self
    }

    /// Path whose method differs from the descriptor default.
    #[must_use]
    pub fn path_with_method(mut self, asset: AssetClass, path: &'static str, method: Method) -> Self {
        self.paths.push((asset, path, Some(method)));
        self
    }

    pub fn assets(&self) -> impl Iterator<Item = AssetClass> + '_ {
        self.paths.iter().map(|(asset, _, _)| *asset)
    }
}

/// Fully resolved endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub endpoint: Endpoint,
    pub asset: AssetClass,
    pub base_url: String,
    pub path: &'static str,
    pub method: Method,
    pub auth: AuthLevel,
    pub class: EndpointClass,
}

impl Route {
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// Fill `{name}` placeholders in the path from `params`. Parameters used
    /// in the path are left out of the returned query.
    pub fn expand(
        &self,
        params: &[(String, String)],
    ) -> Result<(String, Vec<(String, String)>), ExchangeError> {
        if !self.path.contains('{') {
            return Ok((self.path.to_string(), params.to_vec()));
        }
        let mut path = self.path.to_string();
        let mut query = Vec::with_capacity(params.len());
        for (key, value) in params {
            let placeholder = format!("{{{}}}", key);
            if path.contains(&placeholder) {
                path = path.replace(&placeholder, value);
            } else {
                query.push((key.clone(), value.clone()));
            }
        }
        if path.contains('{') {
            return Err(ExchangeError::InvalidParameters(format!(
                "{} needs a value for every path segment in {}",
                self.endpoint, self.path
            )));
        }
        Ok((path, query))
    }
}

/// `(asset class, endpoint) -> Route` lookup. Built once per connector and
/// immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct AssetRouter {
    routes: HashMap<(AssetClass, Endpoint), Route>,
}

impl AssetRouter {
    /// Expands `descriptors` against the per-asset base URLs. Paths for asset
    /// classes without a base URL are skipped.
    pub fn new(
        base_urls: &HashMap<AssetClass, String>,
        descriptors: impl IntoIterator<Item = EndpointDescriptor>,
    ) -> Self {
        let mut routes = HashMap::new();
        for descriptor in descriptors {
            for (asset, path, method) in &descriptor.paths {
                let Some(base_url) = base_urls.get(asset) else {
                    continue;
                };
                routes.insert(
                    (*asset, descriptor.endpoint),
                    Route {
                        endpoint: descriptor.endpoint,
                        asset: *asset,
                        base_url: base_url.trim_end_matches('/').to_string(),
                        path: *path,
                        method: method.clone().unwrap_or_else(|| descriptor.method.clone()),
                        auth: descriptor.auth,
                        class: descriptor.class,
                    },
                );
            }
        }
        Self { routes }
    }

    pub fn resolve(&self, asset: AssetClass, endpoint: Endpoint) -> Result<&Route, ExchangeError> {
        self.routes
            .get(&(asset, endpoint))
            .ok_or_else(|| ExchangeError::UnsupportedAsset { asset, endpoint })
    }

    pub fn supports(&self, asset: AssetClass, endpoint: Endpoint) -> bool {
        self.routes.contains_key(&(asset, endpoint))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> AssetRouter {
        let base_urls = HashMap::from([
            (AssetClass::UsdMargined, "https://fapi.example.com/".to_string()),
            (AssetClass::CoinMargined, "https://dapi.example.com".to_string()),
        ]);
        AssetRouter::new(
            &base_urls,
            [
                EndpointDescriptor::new(
                    Endpoint::AccountInfo,
                    Method::GET,
                    AuthLevel::Signed,
                    EndpointClass::Default,
                )
                .path(AssetClass::UsdMargined, "/fapi/v2/account")
                .path(AssetClass::CoinMargined, "/dapi/v1/account")
                .path(AssetClass::Spot, "/api/v3/account"),
                EndpointDescriptor::new(
                    Endpoint::OpenOrders,
                    Method::GET,
                    AuthLevel::Signed,
                    EndpointClass::Default,
                )
                .path_with_method(AssetClass::UsdMargined, "/fapi/v1/openOrders", Method::POST),
            ],
        )
    }

    #[test]
    fn resolves_versioned_paths_per_asset() {
        let router = router();
        let usdm = router
            .resolve(AssetClass::UsdMargined, Endpoint::AccountInfo)
            .unwrap();
        assert_eq!(usdm.url(), "https://fapi.example.com/fapi/v2/account");
        let coinm = router
            .resolve(AssetClass::CoinMargined, Endpoint::AccountInfo)
            .unwrap();
        assert_eq!(coinm.url(), "https://dapi.example.com/dapi/v1/account");
        assert_eq!(coinm.auth, AuthLevel::Signed);
    }

    #[test]
    fn path_placeholders_take_their_parameter() {
        let route = Route {
            endpoint: Endpoint::QueryOrder,
            asset: AssetClass::Spot,
            base_url: "https://api.example.com".to_string(),
            path: "/v1/order/orders/{order-id}",
            method: Method::GET,
            auth: AuthLevel::Signed,
            class: EndpointClass::Order,
        };
        let params = vec![
            ("order-id".to_string(), "59378".to_string()),
            ("symbol".to_string(), "btcusdt".to_string()),
        ];
        let (path, query) = route.expand(&params).unwrap();
        assert_eq!(path, "/v1/order/orders/59378");
        assert_eq!(query, vec![("symbol".to_string(), "btcusdt".to_string())]);

        let err = route.expand(&[]).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidParameters(_)));
    }

    #[test]
    fn missing_base_url_means_unsupported() {
        let err = router()
            .resolve(AssetClass::Spot, Endpoint::AccountInfo)
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::UnsupportedAsset {
                asset: AssetClass::Spot,
                endpoint: Endpoint::AccountInfo
            }
        ));
    }

    #[test]
    fn per_path_method_override() {
        let router = router();
        let route = router
            .resolve(AssetClass::UsdMargined, Endpoint::OpenOrders)
            .unwrap();
        assert_eq!(route.method, Method::POST);
        assert!(!router.supports(AssetClass::CoinMargined, Endpoint::OpenOrders));
        assert_eq!(router.len(), 3);
    }
}
