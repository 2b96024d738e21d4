//! Error taxonomy for the acquisition, cache and query paths.
//!
//! Every failure that can reach the retry executor is classified into
//! one of three classes:
//! - `Soft`: network/availability/rate-limit/timeout: retry
//! - `Recoverable`: missing or malformed resource: stop retrying this
//!   unit of work, continue with placeholder or partial data
//! - `Fatal`: contract violations: abort and propagate

use thiserror::Error;

use super::snapshot::{Generation, PairKey};

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Soft,
    Recoverable,
    Fatal,
}

impl ErrorClass {
    /// Label used for metrics and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Recoverable => "recoverable",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by errors that can drive `RetryPolicy`.
pub trait Classify {
    /// Which class this failure belongs to.
    fn class(&self) -> ErrorClass;

    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Soft
    }
}

/// Upstream market-data failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream request timed out")]
    Timeout,

    #[error("simulated failure: {0}")]
    Simulated(String),

    #[error("incomplete batch for {pair}: {succeeded}/{total} assets")]
    Incomplete {
        pair: PairKey,
        succeeded: usize,
        total: usize,
    },

    #[error("symbol not found upstream: {0}")]
    NotFound(String),

    #[error("malformed upstream data: {0}")]
    Malformed(String),

    #[error("contract violation: {0}")]
    Contract(String),
}

impl Classify for FeedError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable(_)
            | Self::RateLimited
            | Self::Timeout
            | Self::Simulated(_)
            | Self::Incomplete { .. } => ErrorClass::Soft,
            Self::NotFound(_) | Self::Malformed(_) => ErrorClass::Recoverable,
            Self::Contract(_) => ErrorClass::Fatal,
        }
    }
}

/// Cache file failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache contents malformed: {0}")]
    Malformed(String),

    #[error("cache serialization failed: {0}")]
    Serialization(String),
}

impl Classify for CacheError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) => ErrorClass::Soft,
            Self::Malformed(_) => ErrorClass::Recoverable,
            Self::Serialization(_) => ErrorClass::Fatal,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::Io(e.into())
        } else if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Malformed(e.to_string())
        } else {
            Self::Serialization(e.to_string())
        }
    }
}

/// State store contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("pair {0} is not part of the stored shape")]
    UnknownPair(PairKey),

    #[error("cannot shuffle generation {0} onto itself")]
    SameGeneration(Generation),
}

/// Validity report consolidation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no validity reports to consolidate")]
    Empty,

    #[error("validity field sets differ: {pair} reports [{found}], expected [{expected}]")]
    SchemaDrift {
        pair: PairKey,
        found: String,
        expected: String,
    },
}

/// Query surface failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown pair: {0}")]
    PairNotFound(PairKey),

    #[error("unknown asset {symbol} for pair {pair}")]
    AssetNotFound { pair: PairKey, symbol: String },
}
