use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Dispatcher, RateLimitConfig, RateLimiter, ReqwestRest, RestClient, RestClientBuilder,
    RestClientConfig, StreamConfig,
};
use crate::core::traits::PairFormatter;
use crate::core::types::{AssetClass, Pair, Subscription};
use crate::exchanges::binance::{
    connector::BinanceConnector, endpoints, rest::BinanceRestClient, signer::BinanceSigner,
};
use std::sync::Arc;

/// Channels subscribed for every enabled derivatives pair
pub const DERIVATIVE_CHANNELS: [&str; 3] = ["markPrice", "kline_1m", "forceOrder"];
pub const SPOT_CHANNELS: [&str; 1] = ["kline_1m"];

/// Create a Binance connector over the default HTTP transport
pub fn build_connector(config: ExchangeConfig) -> Result<BinanceConnector<ReqwestRest>, ExchangeError> {
    let rest = RestClientBuilder::new(RestClientConfig::new("binance".to_string()).with_timeout(30))
        .build()?;
    build_connector_with_rest(config, rest, &RateLimitConfig::default())
}

/// Create a Binance connector over any transport, e.g. a test double
pub fn build_connector_with_rest<R: RestClient>(
    config: ExchangeConfig,
    rest: R,
    rate_limits: &RateLimitConfig,
) -> Result<BinanceConnector<R>, ExchangeError> {
    let mut dispatcher = Dispatcher::new(
        "binance",
        endpoints::router(&config),
        RateLimiter::new(rate_limits)?,
        rest,
    );

    // Add authentication if credentials are provided
    if let Some(credentials) = config.credentials() {
        dispatcher = dispatcher.with_signer(Arc::new(
            BinanceSigner::new(credentials.clone()).with_recv_window(5000),
        ));
    }

    // symbols of enabled pairs resolve exactly, e.g. BTCTUSD to BTC/TUSD
    let pairs = config
        .enabled_pairs
        .iter()
        .fold(endpoints::pair_formats(), |formats, (asset, pairs)| {
            formats.enable(*asset, pairs.iter().cloned())
        });

    Ok(BinanceConnector::new(
        BinanceRestClient::new(dispatcher),
        Arc::new(pairs),
        config,
    ))
}

/// Stream settings for one asset class. Public sessions dial the
/// combined-stream endpoint, authenticated ones `<base>/ws/<listenKey>`;
/// channels are added with `SUBSCRIBE` frames either way.
pub fn stream_config(asset: AssetClass, testnet: bool) -> StreamConfig {
    let ws_base = endpoints::ws_base_url(asset, testnet);
    StreamConfig::new("binance", asset, format!("{}/stream", ws_base), ws_base)
}

/// `<symbol>@<channel>` for every pair, lower-case wire symbols.
pub fn default_subscriptions(
    asset: AssetClass,
    pairs: &[Pair],
    formatter: &dyn PairFormatter,
) -> Vec<Subscription> {
    let channels: &[&str] = if asset.is_derivative() {
        &DERIVATIVE_CHANNELS[..]
    } else {
        &SPOT_CHANNELS[..]
    };
    pairs
        .iter()
        .flat_map(|pair| {
            let symbol = formatter.format(pair, asset).to_lowercase();
            channels.iter().map(move |channel| {
                Subscription::new(format!("{}@{}", symbol, channel), Some(pair.clone()), asset)
            })
        })
        .collect()
}
