//! Yahoo Finance market data provider

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::config::SnapshotConfig;
use crate::error::{Result, StockError};
use crate::model::{NewsItem, PriceBar, RecommendationTrend, TickerInfo};
use crate::provider::MarketDataProvider;
use crate::table::{Frequency, StatementKind, Table, display_name};
use crate::value::Scalar;

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Earliest period requested from the fundamentals timeseries (2015-08-22)
const STATEMENT_HISTORY_START: i64 = 1_440_201_600;

const INFO_MODULES: &str = "price,summaryDetail,assetProfile,defaultKeyStatistics,quoteType";

const INCOME_ITEMS: &[&str] = &[
    "TotalRevenue",
    "CostOfRevenue",
    "GrossProfit",
    "OperatingExpense",
    "OperatingIncome",
    "NetIncome",
    "EBITDA",
    "DilutedEPS",
    "BasicEPS",
];

const BALANCE_SHEET_ITEMS: &[&str] = &[
    "TotalAssets",
    "TotalLiabilitiesNetMinorityInterest",
    "StockholdersEquity",
    "CashAndCashEquivalents",
    "TotalDebt",
    "CurrentAssets",
    "CurrentLiabilities",
    "WorkingCapital",
];

const CASHFLOW_ITEMS: &[&str] = &[
    "OperatingCashFlow",
    "InvestingCashFlow",
    "FinancingCashFlow",
    "CapitalExpenditure",
    "FreeCashFlow",
];

/// Base URLs of the JSON endpoints
#[derive(Debug, Clone)]
struct Endpoints {
    cookie: String,
    crumb: String,
    quote_summary: String,
    timeseries: String,
    search: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cookie: COOKIE_URL.to_string(),
            crumb: CRUMB_URL.to_string(),
            quote_summary: QUOTE_SUMMARY_URL.to_string(),
            timeseries: TIMESERIES_URL.to_string(),
            search: SEARCH_URL.to_string(),
        }
    }
}

/// Yahoo Finance API client
///
/// Price history goes through `yahoo_finance_api`; everything else is read
/// from the JSON endpoints with a shared cookie jar and a lazily fetched crumb.
/// A crumb the endpoint rejects is dropped and fetched again once.
pub struct YahooFinanceClient {
    http: Client,
    connector: yahoo::YahooConnector,
    crumb: Mutex<Option<String>>,
    endpoints: Endpoints,
}

impl YahooFinanceClient {
    /// Create a new Yahoo Finance client with the given HTTP timeout
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Self::with_endpoints(request_timeout, Endpoints::default())
    }

    fn with_endpoints(request_timeout: Duration, endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        let connector = yahoo::YahooConnector::new()?;

        Ok(Self {
            http,
            connector,
            crumb: Mutex::new(None),
            endpoints,
        })
    }

    /// Create a client using the timeout from `config`
    pub fn from_config(config: &SnapshotConfig) -> Result<Self> {
        Self::new(config.request_timeout)
    }

    /// Crumb token required by the quoteSummary endpoint, fetched once
    async fn crumb(&self) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // The consent endpoint answers 404 but still sets the session cookie.
        if let Err(e) = self.http.get(&self.endpoints.cookie).send().await {
            debug!(error = %e, "cookie request failed");
        }

        let response = self.http.get(&self.endpoints.crumb).send().await?;
        if !response.status().is_success() {
            return Err(StockError::YahooFinanceError(format!(
                "crumb request failed: HTTP {}",
                response.status()
            )));
        }
        let crumb = response.text().await?.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(StockError::YahooFinanceError(
                "crumb request returned no token".to_string(),
            ));
        }

        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self.http.get(url).query(query).send().await?;
        json_body(response).await
    }

    /// First quoteSummary result for the requested modules
    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value> {
        let url = format!("{}/{symbol}", self.endpoints.quote_summary);
        let mut refreshed = false;
        loop {
            let crumb = self.crumb().await?;
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("modules", modules),
                    ("formatted", "false"),
                    ("crumb", crumb.as_str()),
                ])
                .send()
                .await?;

            if is_auth_failure(response.status()) && !refreshed {
                warn!(symbol, status = %response.status(), "crumb rejected, fetching a new one");
                self.crumb.lock().await.take();
                refreshed = true;
                continue;
            }

            return quote_summary_result(symbol, json_body(response).await?);
        }
    }

    /// One quoteSummary module as an object
    async fn summary_module(&self, symbol: &str, module: &str) -> Result<Value> {
        let mut result = self.quote_summary(symbol, module).await?;
        match result.get_mut(module).map(Value::take) {
            Some(value @ Value::Object(_)) => Ok(value),
            _ => Err(StockError::unavailable(symbol, format!("no {module} data"))),
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    async fn info(&self, symbol: &str) -> Result<TickerInfo> {
        let result = self.quote_summary(symbol, INFO_MODULES).await?;
        let info = flatten_info(&result);
        debug!(symbol, fields = info.len(), "fetched ticker info");
        Ok(info)
    }

    async fn history(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>> {
        let response = self.connector.get_quote_range(symbol, "1d", period).await?;

        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(symbol, period, error = %e, "price history has no quotes");
                return Ok(Vec::new());
            }
        };

        Ok(quotes
            .iter()
            .filter_map(|q| {
                let timestamp = i64::try_from(q.timestamp)
                    .ok()
                    .and_then(|ts| DateTime::from_timestamp(ts, 0))?;
                Some(PriceBar {
                    timestamp,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                })
            })
            .collect())
    }

    async fn statement(
        &self,
        symbol: &str,
        kind: StatementKind,
        frequency: Frequency,
    ) -> Result<Table> {
        let prefix = timeseries_prefix(frequency);
        let types = statement_items(kind)
            .iter()
            .map(|item| format!("{prefix}{item}"))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/{symbol}", self.endpoints.timeseries);
        let body = self
            .get_json(
                &url,
                &[
                    ("symbol", symbol.to_string()),
                    ("type", types),
                    ("period1", STATEMENT_HISTORY_START.to_string()),
                    ("period2", Utc::now().timestamp().to_string()),
                ],
            )
            .await?;

        let table = timeseries_table(symbol, &body, prefix)?;
        if table.is_empty() {
            debug!(symbol, %kind, %frequency, "no statement line items reported");
        }
        Ok(table)
    }

    async fn sustainability(&self, symbol: &str) -> Result<BTreeMap<String, Scalar>> {
        let module = self.summary_module(symbol, "esgScores").await?;
        let scores = scalar_fields(&module);
        if scores.is_empty() {
            return Err(StockError::unavailable(symbol, "no ESG scores"));
        }
        Ok(scores)
    }

    async fn recommendations(&self, symbol: &str) -> Result<Vec<RecommendationTrend>> {
        let mut module = self.summary_module(symbol, "recommendationTrend").await?;
        let trend = module.get_mut("trend").map(Value::take).unwrap_or_default();
        Ok(serde_json::from_value::<Option<Vec<RecommendationTrend>>>(trend)?.unwrap_or_default())
    }

    async fn major_holders(&self, symbol: &str) -> Result<BTreeMap<String, Scalar>> {
        let module = self.summary_module(symbol, "majorHoldersBreakdown").await?;
        Ok(scalar_fields(&module))
    }

    async fn news(&self, symbol: &str, count: usize) -> Result<Vec<NewsItem>> {
        let body = self
            .get_json(
                &self.endpoints.search,
                &[
                    ("q", symbol.to_string()),
                    ("quotesCount", "0".to_string()),
                    ("newsCount", count.to_string()),
                ],
            )
            .await?;
        let mut items = parse_news(&body);
        items.truncate(count);
        Ok(items)
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

async fn json_body(response: Response) -> Result<Value> {
    if !response.status().is_success() {
        return Err(StockError::YahooFinanceError(format!(
            "HTTP error: {}",
            response.status()
        )));
    }
    Ok(response.json().await?)
}

fn timeseries_prefix(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Quarterly => "quarterly",
        Frequency::Annual => "annual",
    }
}

fn statement_items(kind: StatementKind) -> &'static [&'static str] {
    match kind {
        StatementKind::Income => INCOME_ITEMS,
        StatementKind::BalanceSheet => BALANCE_SHEET_ITEMS,
        StatementKind::CashFlow => CASHFLOW_ITEMS,
    }
}

/// Unwrap `quoteSummary.result[0]`, turning the endpoint's error object into an error
fn quote_summary_result(symbol: &str, mut body: Value) -> Result<Value> {
    let summary = body
        .get_mut("quoteSummary")
        .map(Value::take)
        .unwrap_or_default();

    if let Some(error) = summary.get("error").filter(|e| !e.is_null()) {
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(StockError::YahooFinanceError(format!(
            "{symbol}: {description}"
        )));
    }

    summary
        .get("result")
        .and_then(|r| r.get(0))
        .cloned()
        .ok_or_else(|| StockError::unavailable(symbol, "empty quoteSummary result"))
}

/// Merge the scalar fields of every module into one map; the first module
/// reporting a field wins
fn flatten_info(result: &Value) -> TickerInfo {
    let mut info = TickerInfo::new();
    if let Some(modules) = result.as_object() {
        for module in INFO_MODULES.split(',') {
            if let Some(fields) = modules.get(module) {
                for (key, value) in scalar_fields(fields) {
                    info.insert_missing(key, value);
                }
            }
        }
    }
    info
}

/// Scalar fields of a JSON object; nested structures, empty placeholders
/// and `maxAge` are skipped
fn scalar_fields(object: &Value) -> BTreeMap<String, Scalar> {
    object
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(key, _)| key.as_str() != "maxAge")
        .filter_map(|(key, value)| {
            Scalar::from_json(value)
                .filter(|scalar| !scalar.is_null())
                .map(|scalar| (key.clone(), scalar))
        })
        .collect()
}

/// Statement table of a fundamentals timeseries response
///
/// A ticker without statements (an ETF, say) gives an empty table; only an
/// error reported by the endpoint is an error.
fn timeseries_table(symbol: &str, body: &Value, prefix: &str) -> Result<Table> {
    if let Some(error) = body.pointer("/timeseries/error").filter(|e| !e.is_null()) {
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(StockError::YahooFinanceError(format!(
            "{symbol}: {description}"
        )));
    }
    Ok(parse_timeseries(body, prefix))
}

/// Build a statement table from a fundamentals timeseries response
fn parse_timeseries(body: &Value, prefix: &str) -> Table {
    let results = body
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut observations = Vec::new();
    for series in results {
        let Some(type_name) = series.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(item) = type_name.strip_prefix(prefix) else {
            continue;
        };
        let field = display_name(item);

        for entry in series
            .get(type_name)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let date = entry
                .get("asOfDate")
                .and_then(Value::as_str)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            let value = entry.pointer("/reportedValue/raw").and_then(Value::as_f64);
            if let (Some(date), Some(value)) = (date, value) {
                observations.push((field.clone(), date, value));
            }
        }
    }

    Table::from_observations(observations)
}

fn parse_news(body: &Value) -> Vec<NewsItem> {
    let text = |article: &Value, key: &str| article.get(key).and_then(Value::as_str).map(String::from);

    body.get("news")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|article| NewsItem {
            title: text(article, "title"),
            summary: text(article, "summary"),
            link: text(article, "link"),
            publisher: text(article, "publisher"),
            published_at: article
                .get("providerPublishTime")
                .and_then(Value::as_i64)
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        })
        .collect()
}
