use anyhow::Context;
use gatewayx::core::config::{CredentialStore, ExchangeConfig};
use gatewayx::core::kernel::SessionEvent;
use gatewayx::exchanges::binance;
use gatewayx::{AssetClass, Pair};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{error, info, warn};

const DEFAULT_PAIRS: &str = "BTC/USDT,ETH/USDT";

fn pairs_from_env() -> anyhow::Result<Vec<Pair>> {
    let raw = std::env::var("GATEWAYX_PAIRS").unwrap_or_else(|_| DEFAULT_PAIRS.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Pair::parse(s).with_context(|| format!("invalid pair {}", s)))
        .collect()
}

#[cfg(feature = "env-file")]
fn load_env_file() {
    if dotenv::dotenv().is_err() {
        info!("No .env file found, using the process environment");
    }
}

#[cfg(not(feature = "env-file"))]
fn load_env_file() {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    load_env_file();

    let store = CredentialStore::from_env(&["binance"]);
    let asset = AssetClass::UsdMargined;
    let pairs = pairs_from_env()?;
    let config = ExchangeConfig::from_store(&store, "binance")?.with_enabled_pairs(asset, pairs.clone());
    let connector = binance::build_connector(config)?;
    let subscriptions = connector.default_subscriptions(asset, &pairs);
    info!(
        authenticated = connector.can_authenticate(),
        channels = subscriptions.len(),
        "Starting USD-M stream"
    );

    let (session, mut events) = connector.stream_session(asset, subscriptions);

    loop {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(10);
        Retry::spawn(strategy, || session.start())
            .await
            .context("stream session could not be started")?;

        let reconnect = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break false,
                event = events.recv() => match event {
                    Some(SessionEvent::Data(event)) => println!("{:?}", event),
                    Some(SessionEvent::Error(e)) => warn!(error = %e, "Stream error"),
                    Some(SessionEvent::AuthenticationLost { consecutive_failures }) => {
                        warn!(consecutive_failures, "User data stream lost, market data continues");
                    }
                    Some(SessionEvent::ConnectionClosed { reason }) => {
                        warn!(%reason, "Stream closed, reconnecting");
                        break true;
                    }
                    None => {
                        error!("Event channel closed");
                        break false;
                    }
                },
            }
        };

        if !reconnect {
            break;
        }
    }

    session.stop().await;
    info!("Stopped");
    Ok(())
}
