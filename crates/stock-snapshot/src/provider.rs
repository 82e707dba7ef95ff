//! Capability interface over a market data source

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{NewsItem, PriceBar, RecommendationTrend, TickerInfo};
use crate::table::{Frequency, StatementKind, Table};
use crate::value::Scalar;

/// Everything a snapshot needs from a market data source
///
/// Every method is independently fallible; callers decide how much of a
/// failure to tolerate. Implementations must not cache across calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Identity and valuation facts for `symbol`
    async fn info(&self, symbol: &str) -> Result<TickerInfo>;

    /// Daily OHLCV bars over `period` (`7d`, `1mo`, `1y`, ...), oldest first
    async fn history(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>>;

    /// One financial statement as a field-by-period table
    async fn statement(
        &self,
        symbol: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<Table>;

    /// ESG risk scores
    async fn sustainability(&self, symbol: &str) -> Result<BTreeMap<String, Scalar>>;

    /// Analyst recommendation trend, most recent period first
    async fn recommendations(&self, symbol: &str) -> Result<Vec<RecommendationTrend>>;

    /// Major holders breakdown (insider / institutional ownership)
    async fn major_holders(&self, symbol: &str) -> Result<BTreeMap<String, Scalar>>;

    /// Up to `count` recent news articles
    async fn news(&self, symbol: &str, count: usize) -> Result<Vec<NewsItem>>;
}
