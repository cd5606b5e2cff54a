//! Common types used across the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or user-supplied label does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// What the ledger does when a consumption would push on-hand below zero
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStockPolicy {
    /// Fail the consumption with an insufficient-stock error
    #[default]
    Reject,
    /// Apply the consumption and flag the negative balance
    Allow,
}

impl NegativeStockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeStockPolicy::Reject => "reject",
            NegativeStockPolicy::Allow => "allow",
        }
    }
}

impl std::str::FromStr for NegativeStockPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(NegativeStockPolicy::Reject),
            "allow" => Ok(NegativeStockPolicy::Allow),
            other => Err(UnknownVariant::new("negative stock policy", other)),
        }
    }
}

/// Half-open time window `[start, end)` for log queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}
