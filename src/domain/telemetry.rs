//! Process-wide feed health.
//!
//! `FeedState` is derived from aggregate per-asset success flags. Any
//! state may follow any other.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Health of the upstream data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Online,
    Degraded,
    Offline,
}

impl FeedState {
    /// `Online` if every flag is true, `Offline` if every flag is false
    /// (or there are none), `Degraded` otherwise.
    pub fn aggregate<I>(flags: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let (mut ok, mut failed) = (0usize, 0usize);
        for flag in flags {
            if flag {
                ok += 1;
            } else {
                failed += 1;
            }
        }

        match (ok, failed) {
            (0, _) => Self::Offline,
            (_, 0) => Self::Online,
            _ => Self::Degraded,
        }
    }

    pub fn is_active(self) -> bool {
        self != Self::Offline
    }

    /// Numeric encoding for the prometheus gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            Self::Online => 2.0,
            Self::Degraded => 1.0,
            Self::Offline => 0.0,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Online => 0,
            Self::Degraded => 1,
            Self::Offline => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Online,
            1 => Self::Degraded,
            _ => Self::Offline,
        }
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Degraded => write!(f, "degraded"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Shared feed-health cell, written by the cycle and read by the query surface.
#[derive(Debug)]
pub struct Telemetry {
    state: AtomicU8,
}

impl Telemetry {
    pub fn new(initial: FeedState) -> Self {
        Self {
            state: AtomicU8::new(initial.to_u8()),
        }
    }

    pub fn state(&self) -> FeedState {
        FeedState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Store a new state and return the one it replaced.
    pub fn set(&self, state: FeedState) -> FeedState {
        FeedState::from_u8(self.state.swap(state.to_u8(), Ordering::AcqRel))
    }

    /// Derived on every call; never stored separately.
    pub fn is_data_feed_active(&self) -> bool {
        self.state().is_active()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(FeedState::Offline)
    }
}
