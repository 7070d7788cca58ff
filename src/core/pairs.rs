use crate::core::errors::ExchangeError;
use crate::core::traits::PairFormatter;
use crate::core::types::{AssetClass, Pair};
use std::collections::HashMap;

/// Quote currencies tried, longest first, when a wire symbol is not among
/// the enabled pairs.
const KNOWN_QUOTES: [&str; 8] = ["FDUSD", "USDT", "USDC", "BUSD", "USD", "BTC", "ETH", "BNB"];

/// Wire format of a symbol for one asset class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFormat {
    pub delimiter: String,
    pub uppercase: bool,
    /// Contract suffix appended after the quote, e.g. `_PERP`
    pub suffix: Option<String>,
}

impl PairFormat {
    pub fn new(delimiter: &str, uppercase: bool) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            uppercase,
            suffix: None,
        }
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }

    pub fn render(&self, pair: &Pair) -> String {
        let mut symbol = pair.join(&self.delimiter);
        if let Some(suffix) = &self.suffix {
            symbol.push_str(suffix);
        }
        if self.uppercase {
            symbol
        } else {
            symbol.to_lowercase()
        }
    }

    /// Upper-case symbol with the contract suffix and delimiter removed.
    fn strip(&self, wire_symbol: &str) -> String {
        let upper = wire_symbol.to_uppercase();
        let trimmed = match &self.suffix {
            Some(suffix) => upper
                .strip_suffix(&suffix.to_uppercase())
                .map_or(upper.as_str(), |s| s),
            None => upper.as_str(),
        };
        if self.delimiter.is_empty() {
            trimmed.to_string()
        } else {
            trimmed.replace(&self.delimiter.to_uppercase(), "")
        }
    }
}

impl Default for PairFormat {
    fn default() -> Self {
        Self::new("", true)
    }
}

/// Default [`PairFormatter`]: resolves against the pairs enabled per asset
/// class, then falls back to splitting on well-known quote currencies.
#[derive(Debug, Clone, Default)]
pub struct EnabledPairs {
    formats: HashMap<AssetClass, PairFormat>,
    enabled: HashMap<AssetClass, Vec<Pair>>,
    index: HashMap<(AssetClass, String), Pair>,
}

impl EnabledPairs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_format(mut self, asset: AssetClass, format: PairFormat) -> Self {
        self.formats.insert(asset, format);
        self
    }

    #[must_use]
    pub fn enable(mut self, asset: AssetClass, pairs: impl IntoIterator<Item = Pair>) -> Self {
        for pair in pairs {
            self.index.insert((asset, pair.join("")), pair.clone());
            let list = self.enabled.entry(asset).or_default();
            if !list.contains(&pair) {
                list.push(pair);
            }
        }
        self
    }

    pub fn enabled(&self, asset: AssetClass) -> &[Pair] {
        self.enabled.get(&asset).map_or(&[], Vec::as_slice)
    }

    pub fn format_for(&self, asset: AssetClass) -> PairFormat {
        self.formats.get(&asset).cloned().unwrap_or_default()
    }

    fn split_known_quote(compact: &str) -> Option<Pair> {
        KNOWN_QUOTES.iter().find_map(|quote| {
            compact
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .and_then(|base| Pair::new(base, quote).ok())
        })
    }
}

impl PairFormatter for EnabledPairs {
    fn resolve(&self, wire_symbol: &str, asset: AssetClass) -> Result<Pair, ExchangeError> {
        let format = self.format_for(asset);
        let compact = format.strip(wire_symbol);

        if let Some(pair) = self.index.get(&(asset, compact.clone())) {
            return Ok(pair.clone());
        }

        if !format.delimiter.is_empty() {
            let upper = wire_symbol.to_uppercase();
            let delimiter = format.delimiter.to_uppercase();
            if let Some((base, quote)) = upper.split_once(delimiter.as_str()) {
                let quote = format
                    .suffix
                    .as_ref()
                    .and_then(|s| quote.strip_suffix(&s.to_uppercase()))
                    .unwrap_or(quote);
                return Pair::new(base, quote);
            }
        }

        Self::split_known_quote(&compact).ok_or_else(|| {
            ExchangeError::InvalidParameters(format!(
                "symbol {} does not match any {} pair",
                wire_symbol, asset
            ))
        })
    }

    fn format(&self, pair: &Pair, asset: AssetClass) -> String {
        self.format_for(asset).render(pair)
    }
}
