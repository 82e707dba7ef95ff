//! Data types exchanged with market data providers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::{CleanValue, Scalar, sanitize};

/// Identity and valuation facts about a ticker, keyed by provider field name
/// (`longName`, `marketCap`, `trailingPE`, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickerInfo(BTreeMap<String, Scalar>);

impl TickerInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set a field only if it is not present yet
    pub fn insert_missing(&mut self, key: impl Into<String>, value: Scalar) {
        self.0.entry(key.into()).or_insert(value);
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.0.get(key)
    }

    /// Sanitized value of `key`, or `"N/A"` when the provider did not report it
    pub fn field_or_not_available(&self, key: &str) -> CleanValue {
        self.get(key)
            .map_or_else(CleanValue::not_available, |raw| sanitize(raw.clone()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// A news article as the provider reports it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Analyst recommendation counts for one period (`0m` is the current month)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationTrend {
    pub period: String,
    #[serde(default)]
    pub strong_buy: i64,
    #[serde(default)]
    pub buy: i64,
    #[serde(default)]
    pub hold: i64,
    #[serde(default)]
    pub sell: i64,
    #[serde(default)]
    pub strong_sell: i64,
}
