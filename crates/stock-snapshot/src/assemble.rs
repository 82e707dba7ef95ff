//! Response assembly
//!
//! Combines the raw pieces fetched for one ticker into a single flat
//! response. Three "missing" conventions meet here and are kept apart:
//! absent identity/valuation fields become `"N/A"`, absent statement line
//! items become `0` (see [`project`]), and numerically invalid values become
//! `null`.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::SnapshotConfig;
use crate::error::Result;
use crate::model::{NewsItem, PriceBar, RecommendationTrend, TickerInfo};
use crate::section::Section;
use crate::table::{PeriodRecord, Table, project, select};
use crate::value::{CleanValue, Scalar, sanitize, scrub};

/// Message of the total failure returned when a ticker has no price history
pub const NO_HISTORY_MESSAGE: &str = "No price history available.";

/// Identity fields: response key, provider info key
const IDENTITY_FIELDS: [(&str, &str); 6] = [
    ("symbol", "longName"),
    ("sector", "sector"),
    ("industry", "industry"),
    ("business_summary", "longBusinessSummary"),
    ("currency", "currency"),
    ("exchange", "exchange"),
];

/// Valuation fields: response key, provider info key
const VALUATION_FIELDS: [(&str, &str); 7] = [
    ("market_cap", "marketCap"),
    ("pe_ratio", "trailingPE"),
    ("dividend_yield", "dividendYield"),
    ("previous_close", "previousClose"),
    ("52_week_high", "fiftyTwoWeekHigh"),
    ("52_week_low", "fiftyTwoWeekLow"),
    ("average_volume", "averageVolume"),
];

/// Raw data of one optional section, as fetched from the provider
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    Statement(Table),
    Sustainability(BTreeMap<String, Scalar>),
    Recommendations(Vec<RecommendationTrend>),
    Holders(BTreeMap<String, Scalar>),
}

/// Everything fetched for one request, successes and failures alike
#[derive(Debug)]
pub struct FetchedData {
    /// `None` when the info lookup failed
    pub info: Option<TickerInfo>,
    pub history: Result<Vec<PriceBar>>,
    pub news: Vec<NewsItem>,
    pub sections: Vec<(Section, Result<SectionData>)>,
}

/// The response of one snapshot request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StockResponse {
    Snapshot(Box<StockSnapshot>),
    Failure(Failure),
}

impl StockResponse {
    /// A total failure carrying only an error message
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(Failure {
            error: message.into(),
        })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure(failure) => Some(&failure.error),
            Self::Snapshot(_) => None,
        }
    }

    pub fn snapshot(&self) -> Option<&StockSnapshot> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            Self::Failure(_) => None,
        }
    }
}

/// Body of a total failure: `{"error": "..."}` and nothing else
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub error: String,
}

/// A fully assembled snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSnapshot {
    pub ticker: String,
    /// Identity, valuation and latest-quote fields
    #[serde(flatten)]
    pub fields: BTreeMap<&'static str, CleanValue>,
    pub news: Vec<NewsEntry>,
    pub history: Vec<HistoryEntry>,
    #[serde(flatten)]
    pub sections: BTreeMap<&'static str, SectionValue>,
}

impl StockSnapshot {
    pub fn field(&self, key: &str) -> Option<&CleanValue> {
        self.fields.get(key)
    }

    pub fn section(&self, section: Section) -> Option<&SectionValue> {
        self.sections.get(section.key())
    }
}

/// One trading day of the price history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub date: String,
    pub open: CleanValue,
    pub high: CleanValue,
    pub low: CleanValue,
    pub close: CleanValue,
    pub volume: CleanValue,
}

impl From<&PriceBar> for HistoryEntry {
    fn from(bar: &PriceBar) -> Self {
        Self {
            date: bar.timestamp.format("%Y-%m-%d").to_string(),
            open: sanitize(bar.open),
            high: sanitize(bar.high),
            low: sanitize(bar.low),
            close: sanitize(bar.close),
            volume: sanitize(bar.volume),
        }
    }
}

/// A news article ready for the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsEntry {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub publisher: String,
    pub time: String,
}

/// Value of one optional section in the response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SectionValue {
    /// Projected statement, most recent period first
    Records(Vec<PeriodRecord>),
    /// Sanitized named scores
    Values(BTreeMap<String, CleanValue>),
    /// Recommendation trend rows
    Trends(Vec<RecommendationTrend>),
    /// Pass-through values, only scrubbed of non-finite numbers
    Raw(BTreeMap<String, Scalar>),
    /// `{"error": "<Section> not available"}`
    Unavailable { error: String },
}

impl SectionValue {
    pub fn unavailable(section: Section) -> Self {
        Self::Unavailable {
            error: section.unavailable_message(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Build the response for `ticker` out of what was fetched
pub fn assemble(ticker: &str, fetched: FetchedData, config: &SnapshotConfig) -> StockResponse {
    let history = match fetched.history {
        Ok(bars) if bars.is_empty() => return StockResponse::failure(NO_HISTORY_MESSAGE),
        Ok(bars) => bars,
        Err(e) => return StockResponse::failure(e.to_string()),
    };

    let info = fetched.info.unwrap_or_default();
    let mut fields = BTreeMap::new();
    for (key, source) in IDENTITY_FIELDS.iter().chain(VALUATION_FIELDS.iter()) {
        fields.insert(*key, info.field_or_not_available(source));
    }

    if let Some(latest) = history.last() {
        fields.insert("price", sanitize(latest.close));
        fields.insert("open", sanitize(latest.open));
        fields.insert("high", sanitize(latest.high));
        fields.insert("low", sanitize(latest.low));
        fields.insert("volume", sanitize(latest.volume));
    }

    let sections = fetched
        .sections
        .into_iter()
        .map(|(section, data)| (section.key(), section_value(section, data, config)))
        .collect();

    StockResponse::Snapshot(Box::new(StockSnapshot {
        ticker: ticker.to_string(),
        fields,
        news: format_news(fetched.news),
        history: history.iter().map(HistoryEntry::from).collect(),
        sections,
    }))
}

fn section_value(section: Section, data: Result<SectionData>, config: &SnapshotConfig) -> SectionValue {
    let data = match data {
        Ok(data) => data,
        Err(e) => {
            warn!(section = %section, error = %e, "section unavailable");
            return SectionValue::unavailable(section);
        }
    };

    match (section.statement(), data) {
        (Some((kind, _)), SectionData::Statement(table)) => {
            SectionValue::Records(select(project(&table, true), config.fields_for(kind)))
        }
        (None, SectionData::Sustainability(scores)) if section == Section::Sustainability => {
            SectionValue::Values(scores.into_iter().map(|(k, v)| (k, sanitize(v))).collect())
        }
        (None, SectionData::Recommendations(trends)) if section == Section::Recommendations => {
            SectionValue::Trends(trends)
        }
        (None, SectionData::Holders(holders)) if section == Section::Holders => {
            SectionValue::Raw(holders.into_iter().map(|(k, v)| (k, scrub(v))).collect())
        }
        (_, other) => {
            warn!(section = %section, data = ?other, "section received mismatched data");
            SectionValue::unavailable(section)
        }
    }
}

/// Format provider news for the client
///
/// Articles without a title or link are dropped; other gaps get a placeholder.
pub fn format_news(items: Vec<NewsItem>) -> Vec<NewsEntry> {
    items
        .into_iter()
        .filter_map(|item| {
            let title = item.title.as_deref().map(str::trim).unwrap_or_default();
            let link = item.link.as_deref().map(str::trim).unwrap_or_default();
            if title.is_empty() || link.is_empty() {
                return None;
            }
            Some(NewsEntry {
                title: title.to_string(),
                summary: item.summary.unwrap_or_else(|| "No Summary".to_string()),
                link: link.to_string(),
                publisher: item.publisher.unwrap_or_else(|| "Unknown".to_string()),
                time: item
                    .published_at
                    .map_or_else(|| "N/A".to_string(), |t| t.to_rfc3339()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockError;
    use crate::table::Table;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::{Value, json};

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc.with_ymd_and_hms(2024, 5, day, 13, 30, 0).unwrap(),
            open: 100.0,
            high: 102.556,
            low: 99.1,
            close,
            volume: 1_000,
        }
    }

    fn fetched(history: Result<Vec<PriceBar>>) -> FetchedData {
        FetchedData {
            info: Some(
                TickerInfo::new()
                    .with("longName", "Apple Inc.")
                    .with("marketCap", 3_000_000_000_000_i64)
                    .with("trailingPE", 28.4567),
            ),
            history,
            news: Vec::new(),
            sections: Vec::new(),
        }
    }

    fn to_json(response: &StockResponse) -> Value {
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_no_history_is_total_failure() {
        let response = assemble("AAPL", fetched(Ok(Vec::new())), &SnapshotConfig::default());
        assert_eq!(to_json(&response), json!({"error": "No price history available."}));
    }

    #[test]
    fn test_history_error_is_total_failure() {
        let err = StockError::YahooFinanceError("fetching the data from yahoo! finance failed".into());
        let response = assemble("AAPL", fetched(Err(err)), &SnapshotConfig::default());

        let json = to_json(&response);
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert!(response.error().unwrap().starts_with("Yahoo Finance error"));
    }

    #[test]
    fn test_scalar_fields() {
        let response = assemble(
            "AAPL",
            fetched(Ok(vec![bar(1, 180.0), bar(2, 181.239)])),
            &SnapshotConfig::default(),
        );
        let json = to_json(&response);

        assert_eq!(json["ticker"], "AAPL");
        assert_eq!(json["symbol"], "Apple Inc.");
        assert_eq!(json["market_cap"], json!(3_000_000_000_000_i64));
        assert_eq!(json["pe_ratio"], json!(28.46));
        assert_eq!(json["sector"], "N/A");
        assert_eq!(json["52_week_high"], "N/A");
        assert_eq!(json["price"], json!(181.24));
        assert_eq!(json["high"], json!(102.56));
        assert_eq!(json["volume"], json!(1_000));
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["history"][0]["date"], "2024-05-01");
    }

    #[test]
    fn test_nan_close_is_null() {
        let response = assemble(
            "AAPL",
            fetched(Ok(vec![bar(1, 180.0), bar(2, f64::NAN)])),
            &SnapshotConfig::default(),
        );
        let json = to_json(&response);

        assert_eq!(json["history"][1]["close"], Value::Null);
        assert_eq!(json["price"], Value::Null);
        assert_eq!(json["history"][0]["close"], json!(180.0));
    }

    #[test]
    fn test_missing_info_degrades_to_not_available() {
        let mut data = fetched(Ok(vec![bar(1, 180.0)]));
        data.info = None;
        let response = assemble("AAPL", data, &SnapshotConfig::default());
        let snapshot = response.snapshot().unwrap();

        for (key, _) in IDENTITY_FIELDS.iter().chain(VALUATION_FIELDS.iter()) {
            assert!(snapshot.field(key).unwrap().is_not_available(), "{key}");
        }
        assert_eq!(snapshot.field("price").and_then(CleanValue::as_f64), Some(180.0));
    }

    #[test]
    fn test_section_failure_is_isolated() {
        let period = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let table = Table::new(vec![period])
            .with_row("Total Revenue", vec![Some(90_753_000_000.0)])
            .with_row("Research And Development", vec![Some(7_903_000_000.0)]);

        let mut data = fetched(Ok(vec![bar(1, 180.0)]));
        data.sections = vec![
            (
                Section::QuarterlyFinancials,
                Err(StockError::unavailable("AAPL", "statement missing")),
            ),
            (Section::YearlyFinancials, Ok(SectionData::Statement(table))),
        ];
        let json = to_json(&assemble("AAPL", data, &SnapshotConfig::default()));

        assert_eq!(
            json["quarterly_financials"],
            json!({"error": "Quarterly financials not available"})
        );
        assert_eq!(
            json["yearly_financials"],
            json!([{"period": "2024-03-31", "Total Revenue": 90_753_000_000.0}])
        );
        assert_eq!(json["price"], json!(180.0));
    }

    #[test]
    fn test_empty_statement_is_an_empty_section() {
        let mut data = fetched(Ok(vec![bar(1, 180.0)]));
        data.sections = vec![(
            Section::QuarterlyFinancials,
            Ok(SectionData::Statement(Table::default())),
        )];
        let json = to_json(&assemble("SPY", data, &SnapshotConfig::default()));

        assert_eq!(json["quarterly_financials"], json!([]));
    }

    #[test]
    fn test_pass_through_sections() {
        let mut data = fetched(Ok(vec![bar(1, 180.0)]));
        data.sections = vec![
            (
                Section::Sustainability,
                Ok(SectionData::Sustainability(BTreeMap::from([
                    ("totalEsg".to_string(), Scalar::Float(17.234)),
                    ("peerGroup".to_string(), Scalar::from("Technology Hardware")),
                ]))),
            ),
            (
                Section::Holders,
                Ok(SectionData::Holders(BTreeMap::from([
                    ("insidersPercentHeld".to_string(), Scalar::Float(0.017_25)),
                    ("institutionsCount".to_string(), Scalar::Int(6_000)),
                ]))),
            ),
            (
                Section::Recommendations,
                Ok(SectionData::Recommendations(vec![RecommendationTrend {
                    period: "0m".to_string(),
                    buy: 20,
                    ..Default::default()
                }])),
            ),
            // Wrong payload for the section.
            (Section::Cashflow, Ok(SectionData::Holders(BTreeMap::new()))),
        ];
        let json = to_json(&assemble("AAPL", data, &SnapshotConfig::default()));

        assert_eq!(json["sustainability"]["totalEsg"], json!(17.23));
        assert_eq!(json["holders"]["insidersPercentHeld"], json!(0.017_25));
        assert_eq!(json["recommendations"][0]["buy"], json!(20));
        assert_eq!(json["cashflow"], json!({"error": "Cashflow not available"}));
    }

    #[test]
    fn test_format_news() {
        let published = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let entries = format_news(vec![
            NewsItem {
                title: Some("  Apple beats estimates ".to_string()),
                link: Some("https://example.com/a".to_string()),
                published_at: Some(published),
                ..Default::default()
            },
            NewsItem {
                title: Some("No link".to_string()),
                link: Some("   ".to_string()),
                ..Default::default()
            },
            NewsItem {
                link: Some("https://example.com/b".to_string()),
                ..Default::default()
            },
        ]);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Apple beats estimates");
        assert_eq!(entries[0].summary, "No Summary");
        assert_eq!(entries[0].publisher, "Unknown");
        assert_eq!(entries[0].time, "2024-05-02T12:00:00+00:00");
    }
}
