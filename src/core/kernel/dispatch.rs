use crate::core::errors::ExchangeError;
use crate::core::kernel::rate_limit::RateLimiter;
use crate::core::kernel::rest::RestClient;
use crate::core::kernel::router::{AssetRouter, AuthLevel, Endpoint, Route};
use crate::core::kernel::signer::{SignedRequest, Signer, UnsignedRequest};
use crate::core::types::AssetClass;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Query parameters in the order the venue should see them.
pub type Params = Vec<(String, String)>;

/// Current wall clock in epoch milliseconds.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Resolve, throttle, sign, send.
///
/// Every REST operation of a venue goes through one dispatcher so the route
/// table, the rate limit buckets and the signer are shared by all callers.
pub struct Dispatcher<R: RestClient> {
    exchange: String,
    router: AssetRouter,
    limiter: RateLimiter,
    signer: Option<Arc<dyn Signer>>,
    rest: R,
    request_timeout: Duration,
}

impl<R: RestClient> std::fmt::Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("exchange", &self.exchange)
            .field("routes", &self.router.len())
            .field("limiter", &self.limiter)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: RestClient> Dispatcher<R> {
    pub fn new(exchange: impl Into<String>, router: AssetRouter, limiter: RateLimiter, rest: R) -> Self {
        Self {
            exchange: exchange.into(),
            router,
            limiter,
            signer: None,
            rest,
            request_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub const fn router(&self) -> &AssetRouter {
        &self.router
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    /// Build the transport request for `route` at `timestamp`. Pure apart
    /// from the signer, so identical inputs give identical requests.
    pub fn prepare(
        &self,
        route: &Route,
        params: &[(String, String)],
        body: Option<&Value>,
        timestamp: u64,
    ) -> Result<SignedRequest, ExchangeError> {
        let body = body
            .map(serde_json::to_vec)
            .transpose()?
            .unwrap_or_default();
        let (path, query) = route.expand(params)?;
        let unsigned = UnsignedRequest {
            method: &route.method,
            base_url: &route.base_url,
            path: &path,
            params: &query,
            body: &body,
        };

        match route.auth {
            AuthLevel::Public => SignedRequest::public(&unsigned, HashMap::new()),
            AuthLevel::ApiKey => {
                let signer = self.require_signer(route)?;
                SignedRequest::public(&unsigned, signer.key_headers())
            }
            AuthLevel::Signed => self.require_signer(route)?.sign_request(&unsigned, timestamp),
        }
    }

    fn require_signer(&self, route: &Route) -> Result<&Arc<dyn Signer>, ExchangeError> {
        self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError(format!(
                "{} {} requires credentials but none are configured",
                self.exchange, route.endpoint
            ))
        })
    }

    /// Execute `endpoint` for `asset`, failing once `deadline` passes.
    #[instrument(skip(self, params, body, deadline), fields(exchange = %self.exchange, asset = %asset, endpoint = %endpoint))]
    pub async fn call_until(
        &self,
        asset: AssetClass,
        endpoint: Endpoint,
        params: Params,
        body: Option<Value>,
        deadline: Instant,
    ) -> Result<Value, ExchangeError> {
        let route = self.router.resolve(asset, endpoint)?;
        // fail before queueing when the call can never be authenticated
        if route.auth.requires_auth() {
            self.require_signer(route)?;
        }

        self.limiter.acquire(route.class, deadline).await?;

        let request = self.prepare(route, &params, body.as_ref(), now_millis())?;
        debug!(method = %request.method, path = %request.path(), "Dispatching request");

        tokio::time::timeout_at(deadline, self.rest.send(request))
            .await
            .map_err(|_| {
                ExchangeError::NetworkError(format!(
                    "{} {} exceeded its deadline",
                    self.exchange, endpoint
                ))
            })?
    }

    pub async fn call(
        &self,
        asset: AssetClass,
        endpoint: Endpoint,
        params: Params,
    ) -> Result<Value, ExchangeError> {
        self.call_until(asset, endpoint, params, None, Instant::now() + self.request_timeout)
            .await
    }

    pub async fn call_with_body(
        &self,
        asset: AssetClass,
        endpoint: Endpoint,
        params: Params,
        body: Value,
    ) -> Result<Value, ExchangeError> {
        self.call_until(
            asset,
            endpoint,
            params,
            Some(body),
            Instant::now() + self.request_timeout,
        )
        .await
    }

    /// [`Dispatcher::call`] with a typed response.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        asset: AssetClass,
        endpoint: Endpoint,
        params: Params,
    ) -> Result<T, ExchangeError> {
        let value = self.call(asset, endpoint, params).await?;
        decode_response(endpoint, value)
    }

    pub async fn call_json_with_body<T: DeserializeOwned>(
        &self,
        asset: AssetClass,
        endpoint: Endpoint,
        params: Params,
        body: Value,
    ) -> Result<T, ExchangeError> {
        let value = self.call_with_body(asset, endpoint, params, body).await?;
        decode_response(endpoint, value)
    }
}

fn decode_response<T: DeserializeOwned>(endpoint: Endpoint, value: Value) -> Result<T, ExchangeError> {
    T::deserialize(&value).map_err(|e| {
        ExchangeError::decode(
            format!("unexpected {} response: {}", endpoint, e),
            value.to_string(),
        )
    })
}

/// Small helper for building [`Params`] from borrowed pairs.
pub fn params<const N: usize>(pairs: [(&str, String); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::rate_limit::RateLimitConfig;
    use crate::core::kernel::router::{EndpointClass, EndpointDescriptor};
    use async_trait::async_trait;
    use reqwest::Method;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRest {
        seen: Mutex<Vec<SignedRequest>>,
    }

    #[async_trait]
    impl RestClient for RecordingRest {
        async fn send(&self, request: SignedRequest) -> Result<Value, ExchangeError> {
            self.seen.lock().unwrap().push(request);
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct FixedSigner;

    impl Signer for FixedSigner {
        fn sign_request(
            &self,
            request: &UnsignedRequest<'_>,
            timestamp: u64,
        ) -> Result<SignedRequest, ExchangeError> {
            let mut signed = SignedRequest::public(request, self.key_headers())?;
            signed.signature = Some(format!("sig-{}", timestamp));
            Ok(signed)
        }

        fn key_headers(&self) -> HashMap<String, String> {
            HashMap::from([("X-KEY".to_string(), "key".to_string())])
        }
    }

    fn dispatcher(rest: Arc<RecordingRest>) -> Dispatcher<Arc<RecordingRest>> {
        let base_urls = HashMap::from([(AssetClass::UsdMargined, "https://fapi.test".to_string())]);
        let router = AssetRouter::new(
            &base_urls,
            [
                EndpointDescriptor::new(Endpoint::Ping, Method::GET, AuthLevel::Public, EndpointClass::Default)
                    .path(AssetClass::UsdMargined, "/fapi/v1/ping"),
                EndpointDescriptor::new(
                    Endpoint::AccountInfo,
                    Method::GET,
                    AuthLevel::Signed,
                    EndpointClass::Default,
                )
                .path(AssetClass::UsdMargined, "/fapi/v2/account"),
                EndpointDescriptor::new(
                    Endpoint::CreateListenKey,
                    Method::POST,
                    AuthLevel::ApiKey,
                    EndpointClass::Default,
                )
                .path(AssetClass::UsdMargined, "/fapi/v1/listenKey"),
            ],
        );
        let limiter = RateLimiter::new(&RateLimitConfig::unlimited()).unwrap();
        Dispatcher::new("test", router, limiter, rest)
    }

    #[tokio::test]
    async fn public_call_reaches_transport() {
        let rest = Arc::new(RecordingRest::default());
        let dispatcher = dispatcher(Arc::clone(&rest));
        dispatcher
            .call(AssetClass::UsdMargined, Endpoint::Ping, Vec::new())
            .await
            .unwrap();
        let seen = rest.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://fapi.test/fapi/v1/ping");
        assert!(seen[0].signature.is_none());
    }

    #[tokio::test]
    async fn signed_call_without_signer_is_auth_error() {
        let rest = Arc::new(RecordingRest::default());
        let dispatcher = dispatcher(Arc::clone(&rest));
        let err = dispatcher
            .call(AssetClass::UsdMargined, Endpoint::AccountInfo, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::AuthError(_)));
        assert!(rest.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_asset_is_typed() {
        let dispatcher = dispatcher(Arc::new(RecordingRest::default()));
        let err = dispatcher
            .call(AssetClass::CoinMargined, Endpoint::Ping, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnsupportedAsset { .. }));
    }

    #[tokio::test]
    async fn api_key_routes_carry_key_header_only() {
        let rest = Arc::new(RecordingRest::default());
        let dispatcher = dispatcher(Arc::clone(&rest)).with_signer(Arc::new(FixedSigner));
        dispatcher
            .call(AssetClass::UsdMargined, Endpoint::CreateListenKey, Vec::new())
            .await
            .unwrap();
        let seen = rest.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].headers.get("X-KEY").map(String::as_str), Some("key"));
        assert!(seen[0].signature.is_none());
    }

    #[test]
    fn prepare_is_deterministic_for_fixed_timestamp() {
        let dispatcher = dispatcher(Arc::new(RecordingRest::default())).with_signer(Arc::new(FixedSigner));
        let route = dispatcher
            .router()
            .resolve(AssetClass::UsdMargined, Endpoint::AccountInfo)
            .unwrap()
            .clone();
        let params = params([("symbol", "BTCUSDT".to_string())]);
        let a = dispatcher.prepare(&route, &params, None, 42).unwrap();
        let b = dispatcher.prepare(&route, &params, None, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.signature.as_deref(), Some("sig-42"));
    }

    #[tokio::test]
    async fn typed_decode_failure_keeps_body() {
        let dispatcher = dispatcher(Arc::new(RecordingRest::default()));
        let err = dispatcher
            .call_json::<Vec<u32>>(AssetClass::UsdMargined, Endpoint::Ping, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.raw_frame(), Some(r#"{"ok":true}"#));
    }
}
