//! One-shot snapshot requests against a market data provider

use futures::future::join_all;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::assemble::{FetchedData, SectionData, StockResponse, assemble};
use crate::config::SnapshotConfig;
use crate::error::{Result, StockError};
use crate::provider::MarketDataProvider;
use crate::section::Section;

/// Per-request options; anything left out falls back to the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default)]
    pub history_period: Option<String>,
    #[serde(default)]
    pub include_news: Option<bool>,
}

/// Builds stock snapshots
///
/// Every provider call of a request runs concurrently under its own timeout.
/// Only the price history is essential; every other call degrades on its own
/// without disturbing the rest. Nothing is shared between requests.
#[derive(Clone)]
pub struct SnapshotService {
    provider: Arc<dyn MarketDataProvider>,
    config: Arc<SnapshotConfig>,
}

impl SnapshotService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: Arc<SnapshotConfig>) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Build the snapshot of `ticker`; failures are reported inside the response
    #[instrument(skip(self, raw_ticker, query), fields(ticker = %raw_ticker))]
    pub async fn snapshot(&self, raw_ticker: &str, query: SnapshotQuery) -> StockResponse {
        let ticker = match normalize_ticker(raw_ticker) {
            Ok(ticker) => ticker,
            Err(e) => {
                warn!(error = %e, "rejected ticker");
                return StockResponse::failure(e.to_string());
            }
        };

        let period = query
            .history_period
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.config.default_history_period.clone());
        let include_news = query
            .include_news
            .unwrap_or(self.config.include_news_by_default);

        let started = Instant::now();
        let fetched = self.fetch(&ticker, &period, include_news).await;
        let response = assemble(&ticker, fetched, &self.config);

        match response.error() {
            Some(error) => warn!(%error, "snapshot failed"),
            None => info!(
                period = %period,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "snapshot built"
            ),
        }
        response
    }

    async fn fetch(&self, ticker: &str, period: &str, include_news: bool) -> FetchedData {
        let info = self.guarded("info", self.provider.info(ticker));
        let history = self.guarded("history", self.provider.history(ticker, period));
        let news = async {
            if include_news {
                self.guarded("news", self.provider.news(ticker, self.config.news_count))
                    .await
            } else {
                Ok(Vec::new())
            }
        };
        let sections = join_all(self.config.sections.iter().map(|&section| async move {
            (section, self.fetch_section(ticker, section).await)
        }));

        let (info, history, news, sections) = tokio::join!(info, history, news, sections);

        FetchedData {
            info: info
                .inspect_err(|e| warn!(error = %e, "info unavailable, identity fields degrade to N/A"))
                .ok(),
            history,
            news: news.unwrap_or_else(|e| {
                warn!(error = %e, "news unavailable");
                Vec::new()
            }),
            sections,
        }
    }

    async fn fetch_section(&self, ticker: &str, section: Section) -> Result<SectionData> {
        let operation = section.key();
        match (section, section.statement()) {
            (_, Some((kind, frequency))) => self
                .guarded(operation, self.provider.statement(ticker, kind, frequency))
                .await
                .map(SectionData::Statement),
            (Section::Sustainability, None) => self
                .guarded(operation, self.provider.sustainability(ticker))
                .await
                .map(SectionData::Sustainability),
            (Section::Recommendations, None) => self
                .guarded(operation, self.provider.recommendations(ticker))
                .await
                .map(SectionData::Recommendations),
            (Section::Holders, None) => self
                .guarded(operation, self.provider.major_holders(ticker))
                .await
                .map(SectionData::Holders),
            (_, None) => Err(StockError::Other(format!("no fetcher for section {section}"))),
        }
    }

    /// Run one provider call under the section timeout
    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let after = self.config.section_timeout;
        let started = Instant::now();
        let result = tokio::time::timeout(after, call)
            .await
            .unwrap_or_else(|_| Err(StockError::Timeout { operation, after }));
        debug!(
            operation,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider call finished"
        );
        result
    }
}

/// Trim and uppercase a ticker, rejecting anything that cannot be a symbol
///
/// Allowed: letters, digits, and `.`, `-`, `^`, `=` (`BRK.B`, `^GSPC`, `EURUSD=X`).
pub fn normalize_ticker(raw: &str) -> Result<String> {
    let ticker = raw.trim().to_ascii_uppercase();
    let valid = !ticker.is_empty()
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if valid {
        Ok(ticker)
    } else {
        Err(StockError::InvalidSymbol(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewsItem, PriceBar, RecommendationTrend, TickerInfo};
    use crate::provider::{MarketDataProvider, MockMarketDataProvider};
    use crate::table::{Frequency, StatementKind, Table};
    use crate::value::Scalar;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1 + i as u32, 13, 30, 0).unwrap(),
                open: 170.0,
                high: 175.0,
                low: 168.0,
                close,
                volume: 50_000_000,
            })
            .collect()
    }

    fn income_table() -> Table {
        Table::new(vec![
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        ])
        .with_row("Total Revenue", vec![Some(119_575_000_000.0), Some(90_753_000_000.0)])
        .with_row("Net Income", vec![Some(33_916_000_000.0), Some(23_636_000_000.0)])
    }

    /// A provider that answers everything except statements
    fn provider(history: Vec<PriceBar>) -> MockMarketDataProvider {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_info().returning(|_| {
            Ok(TickerInfo::new()
                .with("longName", "Apple Inc.")
                .with("sector", "Technology")
                .with("marketCap", 2_900_000_000_000_i64))
        });
        mock.expect_history().returning(move |_, _| Ok(history.clone()));
        mock.expect_news().returning(|_, _| {
            Ok(vec![NewsItem {
                title: Some("Apple unveils new chips".to_string()),
                link: Some("https://example.com/news/1".to_string()),
                publisher: Some("Reuters".to_string()),
                ..Default::default()
            }])
        });
        mock.expect_sustainability()
            .returning(|_| Ok(BTreeMap::from([("totalEsg".to_string(), Scalar::Float(16.789))])));
        mock.expect_recommendations().returning(|_| {
            Ok(vec![RecommendationTrend {
                period: "0m".to_string(),
                strong_buy: 12,
                ..Default::default()
            }])
        });
        mock.expect_major_holders().returning(|_| {
            Ok(BTreeMap::from([("institutionsPercentHeld".to_string(), Scalar::Float(0.6123))]))
        });
        mock
    }

    fn service(mock: impl MarketDataProvider + 'static, config: SnapshotConfig) -> SnapshotService {
        SnapshotService::new(Arc::new(mock), Arc::new(config))
    }

    async fn snapshot_json(service: &SnapshotService, ticker: &str, query: SnapshotQuery) -> Value {
        serde_json::to_value(service.snapshot(ticker, query).await).unwrap()
    }

    #[tokio::test]
    async fn test_no_history_is_total_failure() {
        let mut mock = provider(Vec::new());
        mock.expect_statement().returning(|_, _, _| Ok(income_table()));

        let json = snapshot_json(&service(mock, SnapshotConfig::default()), "ZZZZ", SnapshotQuery::default()).await;
        assert_eq!(json, json!({"error": "No price history available."}));
    }

    #[tokio::test]
    async fn test_quarterly_failure_keeps_other_sections() {
        let mut mock = provider(bars(&[180.0, 182.5]));
        mock.expect_statement().returning(|symbol, kind, frequency| {
            if kind == StatementKind::Income && frequency == Frequency::Quarterly {
                Err(StockError::unavailable(symbol, "statement missing"))
            } else {
                Ok(income_table())
            }
        });

        let json = snapshot_json(&service(mock, SnapshotConfig::default()), "aapl", SnapshotQuery::default()).await;

        assert_eq!(
            json["quarterly_financials"],
            json!({"error": "Quarterly financials not available"})
        );
        assert_eq!(json["ticker"], "AAPL");
        assert_eq!(json["price"], json!(182.5));
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["yearly_financials"][0]["period"], "2024-03-31");
        assert_eq!(json["yearly_financials"][0]["Net Income"], json!(23_636_000_000.0));
        // Not in the default income field list.
        assert!(json["yearly_financials"][0].get("Gross Profit").is_none());
        assert_eq!(json["sustainability"]["totalEsg"], json!(16.79));
        assert_eq!(json["recommendations"][0]["strongBuy"], json!(12));
        assert_eq!(json["holders"]["institutionsPercentHeld"], json!(0.6123));
        assert_eq!(json["news"][0]["publisher"], "Reuters");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_news_skipped_when_not_requested() {
        let mut mock = MockMarketDataProvider::new();
        let history = bars(&[180.0]);
        mock.expect_info().returning(|_| Ok(TickerInfo::new()));
        mock.expect_history().returning(move |_, _| Ok(history.clone()));
        mock.expect_news().times(0);

        let config = SnapshotConfig::builder().sections([]).build().unwrap();
        let query = SnapshotQuery {
            include_news: Some(false),
            ..Default::default()
        };
        let json = snapshot_json(&service(mock, config), "AAPL", query).await;

        assert_eq!(json["news"], json!([]));
        assert_eq!(json["symbol"], "N/A");
        assert!(json.get("quarterly_financials").is_none());
    }

    #[tokio::test]
    async fn test_nan_close_is_null() {
        let mut mock = provider(bars(&[180.0, f64::NAN]));
        mock.expect_statement().returning(|_, _, _| Ok(Table::default()));

        let json = snapshot_json(&service(mock, SnapshotConfig::default()), "AAPL", SnapshotQuery::default()).await;

        assert_eq!(json["history"][1]["close"], Value::Null);
        assert_eq!(json["history"][0]["close"], json!(180.0));
        // Empty statements are empty sections, not errors.
        assert_eq!(json["quarterly_financials"], json!([]));
    }

    #[tokio::test]
    async fn test_history_period_defaults_and_overrides() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_info().returning(|_| Ok(TickerInfo::new()));
        mock.expect_news().returning(|_, _| Ok(Vec::new()));
        mock.expect_history()
            .withf(|_, period| period.to_string() == "1y")
            .times(1)
            .returning(|_, _| Ok(bars(&[1.0])));
        mock.expect_history()
            .withf(|_, period| period.to_string() == "7d")
            .times(1)
            .returning(|_, _| Ok(bars(&[2.0])));

        let config = SnapshotConfig::builder().sections([]).build().unwrap();
        let service = service(mock, config);

        let default = service.snapshot("AAPL", SnapshotQuery::default()).await;
        assert_eq!(default.snapshot().and_then(|s| s.field("price")).and_then(|v| v.as_f64()), Some(1.0));

        let query = SnapshotQuery {
            history_period: Some("7d".to_string()),
            ..Default::default()
        };
        let custom = service.snapshot("AAPL", query).await;
        assert_eq!(custom.snapshot().and_then(|s| s.field("price")).and_then(|v| v.as_f64()), Some(2.0));
    }

    #[tokio::test]
    async fn test_info_failure_degrades() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_info()
            .returning(|symbol| Err(StockError::unavailable(symbol, "quoteSummary empty")));
        mock.expect_history().returning(|_, _| Ok(bars(&[10.0])));
        mock.expect_news()
            .returning(|_, _| Err(StockError::ApiError("search down".to_string())));

        let config = SnapshotConfig::builder().sections([]).build().unwrap();
        let json = snapshot_json(&service(mock, config), "AAPL", SnapshotQuery::default()).await;

        assert_eq!(json["market_cap"], "N/A");
        assert_eq!(json["business_summary"], "N/A");
        assert_eq!(json["price"], json!(10.0));
        assert_eq!(json["news"], json!([]));
    }

    #[tokio::test]
    async fn test_invalid_ticker_makes_no_calls() {
        // No expectations: any provider call would panic.
        let mock = MockMarketDataProvider::new();
        let json = snapshot_json(&service(mock, SnapshotConfig::default()), "AA PL;", SnapshotQuery::default()).await;
        assert_eq!(json, json!({"error": "Invalid symbol: AA PL;"}));
    }

    /// Answers instantly except for sustainability, which never finishes in time
    struct SlowEsgProvider;

    #[async_trait]
    impl MarketDataProvider for SlowEsgProvider {
        async fn info(&self, _symbol: &str) -> Result<TickerInfo> {
            Ok(TickerInfo::new())
        }

        async fn history(&self, _symbol: &str, _period: &str) -> Result<Vec<PriceBar>> {
            Ok(bars(&[50.0]))
        }

        async fn statement(&self, _symbol: &str, _kind: StatementKind, _frequency: Frequency) -> Result<Table> {
            Ok(income_table())
        }

        async fn sustainability(&self, _symbol: &str) -> Result<BTreeMap<String, Scalar>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(BTreeMap::new())
        }

        async fn recommendations(&self, _symbol: &str) -> Result<Vec<RecommendationTrend>> {
            Ok(Vec::new())
        }

        async fn major_holders(&self, _symbol: &str) -> Result<BTreeMap<String, Scalar>> {
            Ok(BTreeMap::new())
        }

        async fn news(&self, _symbol: &str, _count: usize) -> Result<Vec<NewsItem>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_section_timeout_becomes_marker() {
        let config = SnapshotConfig::builder()
            .sections([Section::Sustainability, Section::YearlyFinancials])
            .section_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let json = snapshot_json(&service(SlowEsgProvider, config), "MSFT", SnapshotQuery::default()).await;

        assert_eq!(json["sustainability"], json!({"error": "Sustainability not available"}));
        assert_eq!(json["yearly_financials"].as_array().unwrap().len(), 2);
        assert_eq!(json["price"], json!(50.0));
    }

    #[tokio::test]
    async fn test_guarded_reports_timeout() {
        let config = SnapshotConfig::builder()
            .section_timeout(Duration::from_millis(10))
            .build()
            .unwrap();
        let service = service(SlowEsgProvider, config);

        let err = service
            .guarded("sustainability", SlowEsgProvider.sustainability("MSFT"))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Timeout { operation: "sustainability", .. }));

        let ok = service.guarded("history", SlowEsgProvider.history("MSFT", "1y")).await;
        assert_ok!(ok);
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" brk.b ").unwrap(), "BRK.B");
        assert_eq!(normalize_ticker("^gspc").unwrap(), "^GSPC");
        assert_eq!(normalize_ticker("eurusd=x").unwrap(), "EURUSD=X");
        assert!(normalize_ticker("").is_err());
        assert!(normalize_ticker("AAPL/../").is_err());
    }
}
