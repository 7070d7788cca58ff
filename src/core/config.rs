use crate::core::types::{AssetClass, Pair};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::env;

/// API key and secret for one venue.
///
/// Both halves live in [`Secret`] so `Debug` output is redacted. The pair is
/// immutable once built; rotate credentials by building a new connector.
#[derive(Debug, Clone)]
pub struct Credentials {
    key: Secret<String>,
    secret: Secret<String>,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: Secret::new(key.into()),
            secret: Secret::new(secret.into()),
        }
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret.expose_secret()
    }

    fn is_complete(&self) -> bool {
        !self.key.expose_secret().is_empty() && !self.secret.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeConfig {
    credentials: Option<Credentials>,
    pub testnet: bool,
    pub base_urls: HashMap<AssetClass, String>,
    /// Pairs the engine trades per asset class. Wire symbols of these pairs
    /// resolve exactly instead of by quote-currency guessing.
    pub enabled_pairs: HashMap<AssetClass, Vec<Pair>>,
}

// Never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let redacted = self.credentials.as_ref().map(|_| "[REDACTED]");
        let mut state = serializer.serialize_struct("ExchangeConfig", 5)?;
        state.serialize_field("api_key", &redacted)?;
        state.serialize_field("secret_key", &redacted)?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("base_urls", &self.base_urls)?;
        state.serialize_field("enabled_pairs", &self.enabled_pairs)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: Option<String>,
            secret_key: Option<String>,
            #[serde(default)]
            testnet: bool,
            #[serde(default)]
            base_urls: HashMap<AssetClass, String>,
            #[serde(default)]
            enabled_pairs: HashMap<AssetClass, Vec<Pair>>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        let credentials = match (helper.api_key, helper.secret_key) {
            (Some(key), Some(secret)) => Some(Credentials::new(key, secret)),
            _ => None,
        };
        Ok(Self {
            credentials,
            testnet: helper.testnet,
            base_urls: helper.base_urls,
            enabled_pairs: helper.enabled_pairs,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            credentials: Some(Credentials::new(api_key, secret_key)),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{EXCHANGE}_API_KEY` (e.g., `BINANCE_API_KEY`)
    /// - `{EXCHANGE}_SECRET_KEY` (e.g., `BINANCE_SECRET_KEY`)
    /// - `{EXCHANGE}_TESTNET` (optional, defaults to false)
    /// - `{EXCHANGE}_SPOT_URL`, `{EXCHANGE}_USDM_URL`, `{EXCHANGE}_COINM_URL` (optional)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let mut config = Self::new(api_key, secret_key).testnet(testnet_flag(&prefix)?);
        config.base_urls = base_url_overrides(&prefix);
        Ok(config)
    }

    /// Like [`ExchangeConfig::from_env`] but falls back to a public-only
    /// configuration when no credentials are present.
    pub fn from_env_or_public(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_store(&CredentialStore::from_env(&[exchange_prefix]), exchange_prefix)
    }

    /// Configuration for `venue` with credentials taken from `store`, or
    /// public-only when the store has none. Testnet and base URL overrides
    /// still come from `{VENUE}_*` environment variables.
    pub fn from_store(store: &CredentialStore, venue: &str) -> Result<Self, ConfigError> {
        let prefix = venue.to_uppercase();
        let mut config = Self {
            credentials: store.get(venue).cloned(),
            ..Self::default()
        }
        .testnet(testnet_flag(&prefix)?);
        config.base_urls = base_url_overrides(&prefix);
        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        load_env_file(env_file_path)?;
        Self::from_env(exchange_prefix)
    }

    /// Create configuration for read-only operations (market data only)
    #[must_use]
    pub fn read_only() -> Self {
        Self::default()
    }

    /// Check if this configuration has valid credentials for authenticated operations
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(Credentials::is_complete)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref().filter(|c| c.is_complete())
    }

    /// Set testnet mode
    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Override the REST base URL for one asset class
    #[must_use]
    pub fn base_url(mut self, asset: AssetClass, base_url: String) -> Self {
        self.base_urls.insert(asset, base_url);
        self
    }

    pub fn base_url_for(&self, asset: AssetClass) -> Option<&str> {
        self.base_urls.get(&asset).map(String::as_str)
    }

    /// Add `pairs` to the enabled set of `asset`
    #[must_use]
    pub fn with_enabled_pairs(mut self, asset: AssetClass, pairs: impl IntoIterator<Item = Pair>) -> Self {
        let enabled = self.enabled_pairs.entry(asset).or_default();
        for pair in pairs {
            if !enabled.contains(&pair) {
                enabled.push(pair);
            }
        }
        self
    }

    pub fn enabled_pairs_for(&self, asset: AssetClass) -> &[Pair] {
        self.enabled_pairs.get(&asset).map_or(&[], Vec::as_slice)
    }
}

/// Read-only registry of credentials keyed by venue name.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<String, Credentials>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, venue: &str, credentials: Credentials) -> Self {
        self.entries.insert(venue.to_lowercase(), credentials);
        self
    }

    /// Collects `{VENUE}_API_KEY`/`{VENUE}_SECRET_KEY` pairs for every venue
    /// listed; venues without both variables are skipped.
    pub fn from_env(venues: &[&str]) -> Self {
        let entries = venues
            .iter()
            .filter_map(|venue| {
                let prefix = venue.to_uppercase();
                let key = env::var(format!("{}_API_KEY", prefix)).ok()?;
                let secret = env::var(format!("{}_SECRET_KEY", prefix)).ok()?;
                let credentials = Credentials::new(key, secret);
                credentials
                    .is_complete()
                    .then(|| (venue.to_lowercase(), credentials))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, venue: &str) -> Option<&Credentials> {
        self.entries.get(&venue.to_lowercase())
    }

    pub fn venues(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn testnet_flag(prefix: &str) -> Result<bool, ConfigError> {
    let var = format!("{}_TESTNET", prefix);
    match env::var(&var) {
        Ok(value) => value.trim().parse::<bool>().map_err(|_| {
            ConfigError::InvalidConfiguration(format!("{} must be true or false, got {}", var, value))
        }),
        Err(_) => Ok(false),
    }
}

fn base_url_overrides(prefix: &str) -> HashMap<AssetClass, String> {
    [
        (AssetClass::Spot, "SPOT_URL"),
        (AssetClass::UsdMargined, "USDM_URL"),
        (AssetClass::CoinMargined, "COINM_URL"),
    ]
    .into_iter()
    .filter_map(|(asset, suffix)| {
        env::var(format!("{}_{}", prefix, suffix))
            .ok()
            .map(|url| (asset, url))
    })
    .collect()
}

#[cfg(feature = "env-file")]
fn load_env_file(env_file_path: &str) -> Result<(), ConfigError> {
    match dotenv::from_path(env_file_path) {
        Ok(()) => Ok(()),
        // a missing file just means system env vars are used as-is
        Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::InvalidConfiguration(format!(
            "Failed to load .env file '{}': {}",
            env_file_path, e
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_redacts_credentials() {
        let config = ExchangeConfig::new("my-key".into(), "my-secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("my-key"));
        assert!(!json.contains("my-secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let credentials = Credentials::new("my-key", "my-secret");
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("my-secret"));
    }

    #[test]
    fn empty_credentials_are_not_usable() {
        let config = ExchangeConfig::new(String::new(), "secret".into());
        assert!(!config.has_credentials());
        assert!(config.credentials().is_none());
        assert!(!ExchangeConfig::read_only().has_credentials());
    }

    #[test]
    fn deserialize_without_keys_is_public() {
        let config: ExchangeConfig =
            serde_json::from_str(r#"{"testnet":true,"base_urls":{"usd_margined":"http://x"}}"#)
                .unwrap();
        assert!(config.testnet);
        assert!(!config.has_credentials());
        assert_eq!(config.base_url_for(AssetClass::UsdMargined), Some("http://x"));
    }

    #[test]
    fn credential_store_lookup_is_case_insensitive() {
        let store = CredentialStore::new().with("Binance", Credentials::new("k", "s"));
        assert_eq!(store.get("BINANCE").map(Credentials::api_key), Some("k"));
        assert!(store.get("huobi").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn credential_store_from_env_skips_missing_venues() {
        env::set_var("GWX_TEST_VENUE_API_KEY", "key");
        env::set_var("GWX_TEST_VENUE_SECRET_KEY", "secret");
        let store = CredentialStore::from_env(&["gwx_test_venue", "gwx_absent_venue"]);
        assert!(store.get("gwx_test_venue").is_some());
        assert!(store.get("gwx_absent_venue").is_none());
    }

    #[test]
    fn store_supplies_credentials_per_venue() {
        let store = CredentialStore::new().with("gwx_store_venue", Credentials::new("k", "s"));
        let private = ExchangeConfig::from_store(&store, "gwx_store_venue").unwrap();
        assert_eq!(private.credentials().map(Credentials::api_key), Some("k"));
        let public = ExchangeConfig::from_store(&store, "gwx_other_venue").unwrap();
        assert!(!public.has_credentials());
        assert!(!public.testnet);
    }

    #[test]
    fn enabled_pairs_are_kept_per_asset_without_duplicates() {
        let btc = Pair::new("BTC", "TUSD").unwrap();
        let config = ExchangeConfig::read_only()
            .with_enabled_pairs(AssetClass::Spot, [btc.clone(), btc.clone()])
            .with_enabled_pairs(AssetClass::UsdMargined, [Pair::new("ETH", "USDT").unwrap()]);
        assert_eq!(config.enabled_pairs_for(AssetClass::Spot), [btc]);
        assert!(config.enabled_pairs_for(AssetClass::CoinMargined).is_empty());
        let json = serde_json::to_string(&config).unwrap();
        let restored: ExchangeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.enabled_pairs_for(AssetClass::UsdMargined).len(), 1);
    }
}
