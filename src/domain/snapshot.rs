//! Snapshot types shared by the state store, validator and query surface.
//!
//! A `Snapshot` is the cached/served state of one fiat pair: one tick per
//! configured asset plus a signature recording when the batch was taken
//! and whether every asset in it succeeded.
//!
//! The serialized shape is the on-disk cache format, so field names are
//! stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Keys
// ────────────────────────────────────────────

/// Fiat pair key (e.g. `"eur"`), as configured.
pub type PairKey = String;

/// Asset symbol (e.g. `"BTC"`), as configured.
pub type AssetSymbol = String;

/// Build the exchange symbol for an asset quoted in a fiat pair.
///
/// `("BTC", "eur")` becomes `"BTC/EUR"`.
pub fn market_symbol(asset: &str, pair: &str) -> String {
    format!("{}/{}", asset.to_uppercase(), pair.to_uppercase())
}

// ────────────────────────────────────────────
// Ticks and snapshots
// ────────────────────────────────────────────

/// Last known price of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTick {
    /// Asset symbol this tick belongs to.
    pub symbol: AssetSymbol,
    /// Tick timestamp (Unix ms).
    pub timestamp: i64,
    /// Last traded price, `None` when the fetch failed.
    pub last: Option<f64>,
    /// Whether the upstream delivered a usable value.
    pub success: bool,
}

impl AssetTick {
    /// A failed tick: keeps the shape of the batch without a value.
    pub fn placeholder(symbol: impl Into<AssetSymbol>, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            last: None,
            success: false,
        }
    }

    /// A tick that succeeded and carries a price.
    pub fn is_usable(&self) -> bool {
        self.success && self.last.is_some()
    }
}

/// Batch-level metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// When the batch was assembled (Unix ms).
    pub timestamp: i64,
    /// AND over all asset successes of the batch.
    pub success: bool,
}

/// Cached/served state for one fiat pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// One tick per asset symbol.
    pub assets: BTreeMap<AssetSymbol, AssetTick>,
    /// Batch signature.
    pub signature: Signature,
}

impl Snapshot {
    /// Null-valued snapshot used to pre-populate both generations.
    pub fn placeholder(assets: &[AssetSymbol]) -> Self {
        let assets = assets
            .iter()
            .map(|symbol| (symbol.clone(), AssetTick::placeholder(symbol.clone(), 0)))
            .collect();

        Self {
            assets,
            signature: Signature {
                timestamp: 0,
                success: false,
            },
        }
    }

    /// Assemble a snapshot from a finished batch of ticks.
    ///
    /// The signature succeeds only if every tick succeeded. An empty
    /// batch never succeeds.
    pub fn from_ticks(ticks: Vec<AssetTick>, timestamp: i64) -> Self {
        let success = !ticks.is_empty() && ticks.iter().all(|t| t.success);
        let assets = ticks
            .into_iter()
            .map(|tick| (tick.symbol.clone(), tick))
            .collect();

        Self {
            assets,
            signature: Signature { timestamp, success },
        }
    }

    /// Look up a single asset tick.
    pub fn asset(&self, symbol: &str) -> Option<&AssetTick> {
        self.assets.get(symbol)
    }

    /// Per-asset success flags, in symbol order.
    pub fn success_flags(&self) -> impl Iterator<Item = bool> + '_ {
        self.assets.values().map(|t| t.success)
    }

    /// Number of assets that succeeded.
    pub fn success_count(&self) -> usize {
        self.assets.values().filter(|t| t.success).count()
    }
}

// ────────────────────────────────────────────
// Generations
// ────────────────────────────────────────────

/// Selector for one of the two generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    Current,
    Previous,
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Previous => write!(f, "previous"),
        }
    }
}

/// The two-generation structure; also the cache file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generations {
    /// Snapshot of the latest cycle, per pair.
    pub current: BTreeMap<PairKey, Snapshot>,
    /// Snapshot of the cycle before, per pair.
    pub previous: BTreeMap<PairKey, Snapshot>,
}

impl Generations {
    /// Borrow one generation.
    pub fn get(&self, generation: Generation) -> &BTreeMap<PairKey, Snapshot> {
        match generation {
            Generation::Current => &self.current,
            Generation::Previous => &self.previous,
        }
    }

    /// Mutably borrow one generation.
    pub fn get_mut(&mut self, generation: Generation) -> &mut BTreeMap<PairKey, Snapshot> {
        match generation {
            Generation::Current => &mut self.current,
            Generation::Previous => &mut self.previous,
        }
    }

    /// Look up the snapshot for a pair in one generation.
    pub fn snapshot(&self, generation: Generation, pair: &str) -> Option<&Snapshot> {
        self.get(generation).get(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, last: Option<f64>, success: bool) -> AssetTick {
        AssetTick {
            symbol: symbol.to_string(),
            timestamp: 1_700_000_000_000,
            last,
            success,
        }
    }

    #[test]
    fn test_market_symbol_uppercases() {
        assert_eq!(market_symbol("btc", "eur"), "BTC/EUR");
    }

    #[test]
    fn test_from_ticks_signature_is_and_of_successes() {
        let ok = Snapshot::from_ticks(
            vec![tick("BTC", Some(1.0), true), tick("ETH", Some(2.0), true)],
            10,
        );
        assert!(ok.signature.success);
        assert_eq!(ok.signature.timestamp, 10);

        let partial = Snapshot::from_ticks(
            vec![tick("BTC", Some(1.0), true), tick("ETH", None, false)],
            10,
        );
        assert!(!partial.signature.success);
        assert_eq!(partial.success_count(), 1);
    }

    #[test]
    fn test_empty_batch_never_succeeds() {
        let empty = Snapshot::from_ticks(Vec::new(), 10);
        assert!(!empty.signature.success);
    }

    #[test]
    fn test_placeholder_has_every_asset_unset() {
        let assets = vec!["BTC".to_string(), "ETH".to_string()];
        let snap = Snapshot::placeholder(&assets);
        assert_eq!(snap.assets.len(), 2);
        assert!(snap.assets.values().all(|t| t.last.is_none() && !t.success));
        assert!(!snap.signature.success);
    }

    #[test]
    fn test_cache_format_field_names() {
        let mut generations = Generations::default();
        generations.current.insert(
            "eur".to_string(),
            Snapshot::from_ticks(vec![tick("BTC", Some(42.0), true)], 5),
        );
        let json = serde_json::to_value(&generations).unwrap();
        assert_eq!(json["current"]["eur"]["signature"]["success"], true);
        assert_eq!(json["current"]["eur"]["assets"]["BTC"]["last"], 42.0);
        assert!(json["previous"].as_object().unwrap().is_empty());
    }
}
