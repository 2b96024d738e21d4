//! Two-generation state store.
//!
//! Holds `current` and `previous` snapshots per pair. Both generations are
//! pre-populated with placeholders for every configured pair × asset, so
//! the configured shape is authoritative: granular merges only touch
//! assets that already exist in storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::error::StateError;
use super::snapshot::{AssetSymbol, AssetTick, Generation, Generations, PairKey, Snapshot};
use super::validity::ValidityReport;

/// Store shared between the cycle (writer) and the query surface (readers).
pub type SharedState = Arc<RwLock<StateStore>>;

/// Outcome of a merge, for logging and assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Assets whose value was taken from the incoming snapshot.
    pub updated: usize,
    /// Assets that kept their stored value.
    pub kept: usize,
    /// Incoming assets with no slot in storage (ignored).
    pub mismatched: Vec<AssetSymbol>,
}

/// How cold-start reconciliation placed the cached data for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Cached `current` became in-memory `previous`.
    ShiftedCurrent,
    /// Cached `previous` stayed in-memory `previous`.
    ShiftedPrevious,
    /// Cache discarded; `previous` left as placeholder.
    Discarded,
}

/// Sole owner and mutator of the two generations.
#[derive(Debug, Clone)]
pub struct StateStore {
    generations: Generations,
    pairs: Vec<PairKey>,
    assets: Vec<AssetSymbol>,
}

impl StateStore {
    /// Build a store with placeholders for every pair × asset in both generations.
    pub fn from_template(pairs: &[PairKey], assets: &[AssetSymbol]) -> Self {
        let template: BTreeMap<PairKey, Snapshot> = pairs
            .iter()
            .map(|pair| (pair.clone(), Snapshot::placeholder(assets)))
            .collect();

        Self {
            generations: Generations {
                current: template.clone(),
                previous: template,
            },
            pairs: pairs.to_vec(),
            assets: assets.to_vec(),
        }
    }

    /// Wrap the store for sharing across tasks.
    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn pairs(&self) -> &[PairKey] {
        &self.pairs
    }

    pub fn assets(&self) -> &[AssetSymbol] {
        &self.assets
    }

    pub fn snapshot(&self, generation: Generation, pair: &str) -> Option<&Snapshot> {
        self.generations.snapshot(generation, pair)
    }

    /// Merge an incoming snapshot into one generation.
    ///
    /// Without `force_granularity` the stored snapshot is replaced
    /// wholesale. With it, only assets already in storage are visited and
    /// each takes the incoming value only if the incoming tick succeeded;
    /// the stored signature is replaced only by a successful one.
    ///
    /// # Errors
    /// `UnknownPair` for a granular merge into a pair with no stored snapshot.
    pub fn merge(
        &mut self,
        target: Generation,
        pair: &str,
        incoming: &Snapshot,
        force_granularity: bool,
    ) -> Result<MergeSummary, StateError> {
        let generation = self.generations.get_mut(target);

        if !force_granularity {
            generation.insert(pair.to_string(), incoming.clone());
            return Ok(MergeSummary {
                updated: incoming.assets.len(),
                ..MergeSummary::default()
            });
        }

        let stored = generation
            .get_mut(pair)
            .ok_or_else(|| StateError::UnknownPair(pair.to_string()))?;

        let mut summary = MergeSummary::default();
        for (symbol, slot) in &mut stored.assets {
            match incoming.assets.get(symbol) {
                Some(tick) if tick.success => {
                    *slot = tick.clone();
                    summary.updated += 1;
                }
                _ => summary.kept += 1,
            }
        }

        summary.mismatched = incoming
            .assets
            .keys()
            .filter(|symbol| !stored.assets.contains_key(*symbol))
            .cloned()
            .collect();
        if !summary.mismatched.is_empty() {
            warn!(
                pair,
                generation = %target,
                assets = ?summary.mismatched,
                "Key mismatch: incoming assets not in stored shape, ignored"
            );
        }

        if incoming.signature.success {
            stored.signature = incoming.signature;
        }

        debug!(
            pair,
            generation = %target,
            updated = summary.updated,
            kept = summary.kept,
            "Granular merge applied"
        );
        Ok(summary)
    }

    /// Deep-copy every snapshot of `source` into `target`, replacing it.
    ///
    /// # Errors
    /// `SameGeneration` if source and target are equal.
    pub fn shuffle(&mut self, source: Generation, target: Generation) -> Result<(), StateError> {
        if source == target {
            return Err(StateError::SameGeneration(source));
        }
        let copied = self.generations.get(source).clone();
        *self.generations.get_mut(target) = copied;
        Ok(())
    }

    /// Deep copy of both generations.
    pub fn export_all(&self) -> Generations {
        self.generations.clone()
    }

    /// Replace both generations.
    ///
    /// The configured shape wins over the imported one: unconfigured pairs
    /// and assets are dropped, missing pairs and assets are filled with
    /// placeholders. A snapshot that needed a placeholder asset loses its
    /// success flag.
    pub fn import_all(&mut self, snapshot: Generations) {
        self.generations = snapshot;

        for generation in [Generation::Current, Generation::Previous] {
            let map = self.generations.get_mut(generation);
            let unknown: Vec<PairKey> = map
                .keys()
                .filter(|pair| !self.pairs.contains(*pair))
                .cloned()
                .collect();
            for pair in unknown {
                warn!(pair = %pair, generation = %generation, "Dropping unconfigured pair from import");
                map.remove(&pair);
            }
            for pair in &self.pairs {
                let snapshot = map
                    .entry(pair.clone())
                    .or_insert_with(|| Snapshot::placeholder(&self.assets));
                conform_assets(snapshot, &self.assets, pair, generation);
            }
        }
    }

    /// Place freshly fetched data for one pair next to a partially valid cache.
    ///
    /// Valid cached `current` moves to `previous`; otherwise a valid cached
    /// `previous` stays `previous`; otherwise the cache is discarded and
    /// `previous` keeps a placeholder until the next shuffle fills it.
    pub fn reconcile(
        &mut self,
        pair: &str,
        cache: &Generations,
        report: &ValidityReport,
        fresh: Snapshot,
    ) -> Reconciliation {
        let (outcome, previous) = if report.current {
            (
                Reconciliation::ShiftedCurrent,
                cache.snapshot(Generation::Current, pair).cloned(),
            )
        } else if report.previous {
            (
                Reconciliation::ShiftedPrevious,
                cache.snapshot(Generation::Previous, pair).cloned(),
            )
        } else {
            (Reconciliation::Discarded, None)
        };

        let previous = previous.unwrap_or_else(|| Snapshot::placeholder(&self.assets));
        self.generations.previous.insert(pair.to_string(), previous);
        self.generations.current.insert(pair.to_string(), fresh);

        debug!(pair, outcome = ?outcome, "Cache reconciled with fresh data");
        outcome
    }

    /// Per-asset success flags of `current`, across all pairs.
    pub fn current_flags(&self) -> Vec<bool> {
        self.generations
            .current
            .values()
            .flat_map(Snapshot::success_flags)
            .collect()
    }
}

/// Bring an imported snapshot to exactly the configured asset set.
fn conform_assets(
    snapshot: &mut Snapshot,
    assets: &[AssetSymbol],
    pair: &str,
    generation: Generation,
) {
    let before = snapshot.assets.len();
    snapshot.assets.retain(|symbol, _| assets.contains(symbol));
    if snapshot.assets.len() != before {
        warn!(pair, generation = %generation, "Dropping unconfigured assets from import");
    }

    for symbol in assets {
        if !snapshot.assets.contains_key(symbol) {
            warn!(pair, generation = %generation, asset = %symbol, "Backfilling missing asset in import");
            snapshot
                .assets
                .insert(symbol.clone(), AssetTick::placeholder(symbol.clone(), 0));
            snapshot.signature.success = false;
        }
    }
}
