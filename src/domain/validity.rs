//! Cache validity evaluation.
//!
//! Decides whether a loaded cache can be served as-is. Each pair gets a
//! tri-state `ValidityReport`; the reports are then consolidated with a
//! logical AND per field, so one corrupt pair forces a full refresh.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::snapshot::{AssetSymbol, Generation, Generations, PairKey, Snapshot};

const MS_PER_SECOND: i64 = 1_000;
const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

/// Maximum cache age, as configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeLimit {
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl AgeLimit {
    /// Saturates at `u64::MAX` for absurdly large limits.
    pub fn total_seconds(&self) -> u64 {
        self.days
            .saturating_mul(SECONDS_PER_DAY)
            .saturating_add(self.hours.saturating_mul(SECONDS_PER_HOUR))
            .saturating_add(self.minutes.saturating_mul(SECONDS_PER_MINUTE))
            .saturating_add(self.seconds)
    }

    pub fn is_zero(&self) -> bool {
        self.total_seconds() == 0
    }

    /// Carry overflowing units upward (`90 minutes` → `1h 30m`).
    pub fn normalized(&self) -> AgeParts {
        AgeParts::from_seconds(self.total_seconds())
    }
}

/// An age broken into units, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeParts {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl AgeParts {
    pub fn from_seconds(total: u64) -> Self {
        Self {
            days: total / SECONDS_PER_DAY,
            hours: (total % SECONDS_PER_DAY) / SECONDS_PER_HOUR,
            minutes: (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            seconds: total % SECONDS_PER_MINUTE,
        }
    }

    /// Age of a timestamp relative to `now_ms`. Future timestamps count as zero.
    pub fn between(timestamp_ms: i64, now_ms: i64) -> Self {
        let elapsed = now_ms.saturating_sub(timestamp_ms).max(0) / MS_PER_SECOND;
        Self::from_seconds(elapsed.unsigned_abs())
    }

    /// True when no unit exceeds the matching unit of the normalized limit.
    ///
    /// Units are compared independently: with a `1h` limit a `30m` age
    /// fails on minutes even though it is shorter overall.
    pub fn within(&self, limit: &AgeLimit) -> bool {
        let limit = limit.normalized();
        self.days <= limit.days
            && self.hours <= limit.hours
            && self.minutes <= limit.minutes
            && self.seconds <= limit.seconds
    }
}

/// Field of a `ValidityReport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidityField {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "previous")]
    Previous,
    #[serde(rename = "upToDate")]
    UpToDate,
}

impl ValidityField {
    pub const ALL: [Self; 3] = [Self::Current, Self::Previous, Self::UpToDate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
            Self::UpToDate => "upToDate",
        }
    }
}

impl fmt::Display for ValidityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validity of one pair's cached generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityReport {
    /// Cached `current` is structurally valid and succeeded.
    pub current: bool,
    /// Cached `previous` is structurally valid and succeeded.
    pub previous: bool,
    /// `current` is valid and within the age limit.
    pub up_to_date: bool,
}

impl ValidityReport {
    pub fn get(&self, field: ValidityField) -> bool {
        match field {
            ValidityField::Current => self.current,
            ValidityField::Previous => self.previous,
            ValidityField::UpToDate => self.up_to_date,
        }
    }

    /// Whether the cache can be served without a refetch.
    pub fn is_fully_valid(&self) -> bool {
        self.current && self.previous && self.up_to_date
    }

    pub fn fields(&self) -> BTreeMap<ValidityField, bool> {
        ValidityField::ALL
            .into_iter()
            .map(|field| (field, self.get(field)))
            .collect()
    }
}

/// Consolidated report across all pairs.
pub type ConsolidatedReport = ValidityReport;

/// A snapshot is usable only if it exists, its batch succeeded, it holds
/// exactly the configured assets and every one of them carries a value.
fn is_structurally_valid(snapshot: Option<&Snapshot>, assets: &[AssetSymbol]) -> bool {
    snapshot.is_some_and(|s| {
        s.signature.success
            && !s.assets.is_empty()
            && s.assets.len() == assets.len()
            && assets.iter().all(|symbol| s.assets.contains_key(symbol))
            && s.assets.values().all(|t| t.is_usable())
    })
}

/// Evaluate one pair of a loaded cache against the configured assets and
/// the age limit.
pub fn validate(
    cache: &Generations,
    pair: &str,
    assets: &[AssetSymbol],
    limit: &AgeLimit,
    now_ms: i64,
) -> ValidityReport {
    let current_snapshot = cache.snapshot(Generation::Current, pair);
    let current = is_structurally_valid(current_snapshot, assets);
    let previous = is_structurally_valid(cache.snapshot(Generation::Previous, pair), assets);

    let up_to_date = current
        && current_snapshot
            .is_some_and(|s| AgeParts::between(s.signature.timestamp, now_ms).within(limit));

    ValidityReport {
        current,
        previous,
        up_to_date,
    }
}

/// Per-pair validity rows keyed by field, as logged at cold start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityTable {
    rows: BTreeMap<PairKey, BTreeMap<ValidityField, bool>>,
}

impl ValidityTable {
    pub fn from_reports(reports: &BTreeMap<PairKey, ValidityReport>) -> Self {
        let rows = reports
            .iter()
            .map(|(pair, report)| (pair.clone(), report.fields()))
            .collect();
        Self { rows }
    }

    /// Build a table from raw rows (e.g. a report table read back from disk).
    pub fn from_rows(rows: BTreeMap<PairKey, BTreeMap<ValidityField, bool>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &BTreeMap<PairKey, BTreeMap<ValidityField, bool>> {
        &self.rows
    }

    /// AND every field across all pairs.
    ///
    /// # Errors
    /// `Empty` without rows; `SchemaDrift` when a row's field set differs
    /// from the first row's.
    pub fn consolidate(&self) -> Result<ConsolidatedReport, ValidationError> {
        let mut rows = self.rows.iter();
        let (_, first) = rows.next().ok_or(ValidationError::Empty)?;

        let expected: Vec<ValidityField> = first.keys().copied().collect();
        for (pair, row) in rows {
            if !row.keys().copied().eq(expected.iter().copied()) {
                return Err(ValidationError::SchemaDrift {
                    pair: pair.clone(),
                    found: join_fields(row.keys().copied()),
                    expected: join_fields(expected.iter().copied()),
                });
            }
        }

        let all = |field: ValidityField| {
            self.rows
                .values()
                .all(|row| row.get(&field).copied().unwrap_or(false))
        };

        Ok(ValidityReport {
            current: all(ValidityField::Current),
            previous: all(ValidityField::Previous),
            up_to_date: all(ValidityField::UpToDate),
        })
    }
}

fn join_fields(fields: impl Iterator<Item = ValidityField>) -> String {
    fields.map(ValidityField::as_str).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for ValidityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.rows.keys().map(String::len).max().unwrap_or(0).max(4);
        write!(f, "{:width$}", "pair")?;
        for field in ValidityField::ALL {
            write!(f, " | {:>8}", field.as_str())?;
        }
        for (pair, row) in &self.rows {
            write!(f, "\n{pair:width$}")?;
            for field in ValidityField::ALL {
                match row.get(&field) {
                    Some(value) => write!(f, " | {value:>8}")?,
                    None => write!(f, " | {:>8}", "-")?,
                }
            }
        }
        Ok(())
    }
}

/// Consolidate per-pair reports and return the table they were built from.
///
/// # Errors
/// See [`ValidityTable::consolidate`].
pub fn consolidate(
    reports: &BTreeMap<PairKey, ValidityReport>,
) -> Result<(ConsolidatedReport, ValidityTable), ValidationError> {
    let table = ValidityTable::from_reports(reports);
    let report = table.consolidate()?;
    Ok((report, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::AssetTick;

    const NOW: i64 = 1_700_000_000_000;

    fn snapshot(timestamp: i64, success: bool) -> Snapshot {
        let tick = AssetTick {
            symbol: "BTC".into(),
            timestamp,
            last: success.then_some(50_000.0),
            success,
        };
        Snapshot::from_ticks(vec![tick], timestamp)
    }

    fn cache(current: Option<Snapshot>, previous: Option<Snapshot>) -> Generations {
        let mut generations = Generations::default();
        if let Some(s) = current {
            generations.current.insert("eur".into(), s);
        }
        if let Some(s) = previous {
            generations.previous.insert("eur".into(), s);
        }
        generations
    }

    fn btc() -> Vec<AssetSymbol> {
        vec!["BTC".to_string()]
    }

    fn five_minutes() -> AgeLimit {
        AgeLimit {
            minutes: 5,
            ..AgeLimit::default()
        }
    }

    #[test]
    fn test_fresh_cache_fully_valid() {
        let c = cache(Some(snapshot(NOW - 60_000, true)), Some(snapshot(NOW - 120_000, true)));
        let report = validate(&c, "eur", &btc(), &five_minutes(), NOW);
        assert!(report.is_fully_valid());
    }

    #[test]
    fn test_age_exactly_at_limit_is_up_to_date() {
        let c = cache(Some(snapshot(NOW - 300_000, true)), None);
        let report = validate(&c, "eur", &btc(), &five_minutes(), NOW);
        assert!(report.up_to_date);
        assert!(!report.previous);
    }

    #[test]
    fn test_age_one_second_over_limit_is_stale() {
        let c = cache(Some(snapshot(NOW - 301_000, true)), None);
        let report = validate(&c, "eur", &btc(), &five_minutes(), NOW);
        assert!(report.current);
        assert!(!report.up_to_date);
    }

    #[test]
    fn test_finer_unit_over_limit_fails_despite_coarser_unit_below() {
        // 1h limit, 30m age: hours are lower but minutes exceed the limit's 0
        let limit = AgeLimit {
            hours: 1,
            ..AgeLimit::default()
        };
        let c = cache(Some(snapshot(NOW - 30 * 60_000, true)), None);
        let report = validate(&c, "eur", &btc(), &limit, NOW);
        assert!(report.current);
        assert!(!report.up_to_date);
    }

    #[test]
    fn test_every_unit_at_or_below_limit_passes() {
        let limit = AgeLimit {
            hours: 1,
            minutes: 30,
            seconds: 30,
            ..AgeLimit::default()
        };
        let c = cache(Some(snapshot(NOW - (3_600 + 20 * 60 + 30) * 1_000, true)), None);
        assert!(validate(&c, "eur", &btc(), &limit, NOW).up_to_date);
    }

    #[test]
    fn test_huge_limit_saturates_instead_of_overflowing() {
        let limit = AgeLimit {
            days: u64::MAX,
            hours: u64::MAX,
            minutes: u64::MAX,
            seconds: u64::MAX,
        };
        assert_eq!(limit.total_seconds(), u64::MAX);
        assert!(!limit.is_zero());
        assert!(AgeParts::from_seconds(0).within(&limit));
    }

    #[test]
    fn test_snapshot_missing_configured_asset_is_invalid() {
        let c = cache(Some(snapshot(NOW, true)), Some(snapshot(NOW, true)));
        let assets = vec!["BTC".to_string(), "ETH".to_string()];

        let report = validate(&c, "eur", &assets, &five_minutes(), NOW);
        assert!(!report.current);
        assert!(!report.previous);
        assert!(!report.up_to_date);
    }

    #[test]
    fn test_snapshot_with_unconfigured_asset_is_invalid() {
        let c = cache(Some(snapshot(NOW, true)), None);
        let report = validate(&c, "eur", &["ETH".to_string()], &five_minutes(), NOW);
        assert!(!report.current);
    }

    #[test]
    fn test_failed_current_is_never_up_to_date() {
        let c = cache(Some(snapshot(NOW, false)), Some(snapshot(NOW, true)));
        let report = validate(&c, "eur", &btc(), &five_minutes(), NOW);
        assert!(!report.current);
        assert!(report.previous);
        assert!(!report.up_to_date);
    }

    #[test]
    fn test_missing_pair_is_invalid() {
        let report = validate(&Generations::default(), "usd", &btc(), &five_minutes(), NOW);
        assert_eq!(
            report,
            ValidityReport {
                current: false,
                previous: false,
                up_to_date: false
            }
        );
    }

    #[test]
    fn test_success_signature_with_null_price_is_structurally_invalid() {
        let mut s = snapshot(NOW, true);
        s.assets.get_mut("BTC").unwrap().last = None;
        let c = cache(Some(s), None);
        assert!(!validate(&c, "eur", &btc(), &five_minutes(), NOW).current);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let c = cache(Some(snapshot(NOW + 10_000, true)), None);
        assert!(validate(&c, "eur", &btc(), &five_minutes(), NOW).up_to_date);
    }

    #[test]
    fn test_consolidate_ands_every_field() {
        let mut reports = BTreeMap::new();
        reports.insert(
            "eur".to_string(),
            ValidityReport {
                current: true,
                previous: false,
                up_to_date: true,
            },
        );
        reports.insert(
            "usd".to_string(),
            ValidityReport {
                current: true,
                previous: true,
                up_to_date: true,
            },
        );

        let (report, table) = consolidate(&reports).unwrap();
        assert_eq!(
            report,
            ValidityReport {
                current: true,
                previous: false,
                up_to_date: true
            }
        );
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn test_consolidate_empty_fails() {
        assert_eq!(consolidate(&BTreeMap::new()).unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn test_consolidate_detects_schema_drift() {
        let mut rows = BTreeMap::new();
        rows.insert(
            "eur".to_string(),
            ValidityField::ALL.into_iter().map(|f| (f, true)).collect(),
        );
        rows.insert(
            "usd".to_string(),
            [(ValidityField::Current, true), (ValidityField::Previous, true)]
                .into_iter()
                .collect(),
        );

        let err = ValidityTable::from_rows(rows).consolidate().unwrap_err();
        assert!(matches!(err, ValidationError::SchemaDrift { ref pair, .. } if pair == "usd"));
    }

    #[test]
    fn test_table_display_lists_pairs() {
        let mut reports = BTreeMap::new();
        reports.insert(
            "eur".to_string(),
            ValidityReport {
                current: true,
                previous: false,
                up_to_date: true,
            },
        );
        let rendered = ValidityTable::from_reports(&reports).to_string();
        assert!(rendered.contains("upToDate"));
        assert!(rendered.lines().nth(1).unwrap().starts_with("eur"));
    }

    #[test]
    fn test_limit_normalization_carries_units() {
        let limit = AgeLimit {
            minutes: 90,
            ..AgeLimit::default()
        };
        assert_eq!(
            limit.normalized(),
            AgeParts {
                days: 0,
                hours: 1,
                minutes: 30,
                seconds: 0
            }
        );
    }
}
