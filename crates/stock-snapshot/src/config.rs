//! Configuration for stock snapshot requests

use crate::error::{Result, StockError};
use crate::section::{Section, parse_sections};
use crate::table::StatementKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding the default history period
pub const HISTORY_PERIOD_ENV: &str = "STOCK_HISTORY_PERIOD";
/// Environment variable listing the enabled sections, comma separated
pub const SECTIONS_ENV: &str = "STOCK_SECTIONS";
/// Environment variable overriding the per-section timeout, in seconds
pub const SECTION_TIMEOUT_ENV: &str = "STOCK_SECTION_TIMEOUT_SECS";
/// Environment variable overriding the provider HTTP timeout, in seconds
pub const REQUEST_TIMEOUT_ENV: &str = "STOCK_REQUEST_TIMEOUT_SECS";
/// Environment variable overriding the number of news articles requested
pub const NEWS_COUNT_ENV: &str = "STOCK_NEWS_COUNT";

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

/// Configuration for stock snapshot requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// History period used when the request does not name one
    pub default_history_period: String,

    /// Whether news is included when the request does not say
    pub include_news_by_default: bool,

    /// Optional sections to fetch and emit, in response order
    pub sections: Vec<Section>,

    /// Budget for each individual provider call
    pub section_timeout: Duration,

    /// HTTP timeout for the provider client
    pub request_timeout: Duration,

    /// Number of news articles requested from the provider
    pub news_count: usize,

    /// Line items kept from income statements
    pub income_fields: Vec<String>,

    /// Line items kept from balance sheets
    pub balance_sheet_fields: Vec<String>,

    /// Line items kept from cash flow statements
    pub cashflow_fields: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_history_period: "1y".to_string(),
            include_news_by_default: true,
            sections: Section::ALL.to_vec(),
            section_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            news_count: 10,
            income_fields: fields(&["Total Revenue", "Gross Profit", "Operating Income", "Net Income"]),
            balance_sheet_fields: fields(&[
                "Total Assets",
                "Total Liabilities Net Minority Interest",
                "Stockholders Equity",
                "Cash And Cash Equivalents",
                "Total Debt",
            ]),
            cashflow_fields: fields(&["Operating Cash Flow", "Capital Expenditure", "Free Cash Flow"]),
        }
    }
}

impl SnapshotConfig {
    /// Create a new configuration builder
    pub fn builder() -> SnapshotConfigBuilder {
        SnapshotConfigBuilder::default()
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides through an arbitrary key lookup
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(period) = get(HISTORY_PERIOD_ENV) {
            self.default_history_period = period;
        }
        if let Some(list) = get(SECTIONS_ENV) {
            self.sections = parse_sections(&list)?;
        }
        if let Some(secs) = get(SECTION_TIMEOUT_ENV) {
            self.section_timeout = Duration::from_secs(parse_number(SECTION_TIMEOUT_ENV, &secs)?);
        }
        if let Some(secs) = get(REQUEST_TIMEOUT_ENV) {
            self.request_timeout = Duration::from_secs(parse_number(REQUEST_TIMEOUT_ENV, &secs)?);
        }
        if let Some(count) = get(NEWS_COUNT_ENV) {
            self.news_count = usize::try_from(parse_number(NEWS_COUNT_ENV, &count)?)
                .map_err(|e| StockError::ConfigError(format!("{NEWS_COUNT_ENV}: {e}")))?;
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.default_history_period.trim().is_empty() {
            return Err(StockError::ConfigError(
                "default_history_period must not be empty".to_string(),
            ));
        }

        if self.section_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(StockError::ConfigError(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.news_count == 0 {
            return Err(StockError::ConfigError(
                "news_count must be greater than 0".to_string(),
            ));
        }

        for section in &self.sections {
            if let Some((kind, _)) = section.statement() {
                if self.fields_for(kind).is_empty() {
                    return Err(StockError::ConfigError(format!(
                        "section {section} is enabled but no {kind} fields are selected"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether `section` is fetched and emitted
    pub fn includes(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }

    /// Line items kept for a statement kind
    pub fn fields_for(&self, kind: StatementKind) -> &[String] {
        match kind {
            StatementKind::Income => &self.income_fields,
            StatementKind::BalanceSheet => &self.balance_sheet_fields,
            StatementKind::CashFlow => &self.cashflow_fields,
        }
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|e| StockError::ConfigError(format!("{key}={raw}: {e}")))
}

/// Builder for SnapshotConfig
#[derive(Debug, Default)]
pub struct SnapshotConfigBuilder {
    default_history_period: Option<String>,
    include_news_by_default: Option<bool>,
    sections: Option<Vec<Section>>,
    section_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    news_count: Option<usize>,
    income_fields: Option<Vec<String>>,
    balance_sheet_fields: Option<Vec<String>>,
    cashflow_fields: Option<Vec<String>>,
    use_env: bool,
}

impl SnapshotConfigBuilder {
    /// Set the default history period
    pub fn default_history_period(mut self, period: impl Into<String>) -> Self {
        self.default_history_period = Some(period.into());
        self
    }

    /// Set whether news is included by default
    pub fn include_news_by_default(mut self, include: bool) -> Self {
        self.include_news_by_default = Some(include);
        self
    }

    /// Set the enabled sections
    pub fn sections(mut self, sections: impl IntoIterator<Item = Section>) -> Self {
        self.sections = Some(sections.into_iter().collect());
        self
    }

    /// Set the per-section timeout
    pub fn section_timeout(mut self, duration: Duration) -> Self {
        self.section_timeout = Some(duration);
        self
    }

    /// Set the provider HTTP timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the number of news articles requested
    pub fn news_count(mut self, count: usize) -> Self {
        self.news_count = Some(count);
        self
    }

    /// Set the income statement line items
    pub fn income_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.income_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the balance sheet line items
    pub fn balance_sheet_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.balance_sheet_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the cash flow statement line items
    pub fn cashflow_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cashflow_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Apply environment overrides before the explicit builder values
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SnapshotConfig> {
        let defaults = if self.use_env {
            SnapshotConfig::default().with_env()?
        } else {
            SnapshotConfig::default()
        };

        let config = SnapshotConfig {
            default_history_period: self
                .default_history_period
                .unwrap_or(defaults.default_history_period),
            include_news_by_default: self
                .include_news_by_default
                .unwrap_or(defaults.include_news_by_default),
            sections: self.sections.unwrap_or(defaults.sections),
            section_timeout: self.section_timeout.unwrap_or(defaults.section_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            news_count: self.news_count.unwrap_or(defaults.news_count),
            income_fields: self.income_fields.unwrap_or(defaults.income_fields),
            balance_sheet_fields: self
                .balance_sheet_fields
                .unwrap_or(defaults.balance_sheet_fields),
            cashflow_fields: self.cashflow_fields.unwrap_or(defaults.cashflow_fields),
        };

        config.validate()?;
        Ok(config)
    }
}
