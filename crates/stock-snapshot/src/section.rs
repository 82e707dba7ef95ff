//! Optional, independently fallible parts of a snapshot

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StockError;
use crate::table::{Frequency, StatementKind};

/// One optional section of the response
///
/// A section that cannot be produced is replaced by
/// `{"error": "<label> not available"}` without affecting the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    QuarterlyFinancials,
    YearlyFinancials,
    QuarterlyBalanceSheet,
    BalanceSheet,
    QuarterlyCashflow,
    Cashflow,
    Sustainability,
    Recommendations,
    Holders,
}

impl Section {
    /// Every section, in response order
    pub const ALL: [Section; 9] = [
        Section::QuarterlyFinancials,
        Section::YearlyFinancials,
        Section::QuarterlyBalanceSheet,
        Section::BalanceSheet,
        Section::QuarterlyCashflow,
        Section::Cashflow,
        Section::Sustainability,
        Section::Recommendations,
        Section::Holders,
    ];

    /// Response key of the section
    pub fn key(self) -> &'static str {
        match self {
            Self::QuarterlyFinancials => "quarterly_financials",
            Self::YearlyFinancials => "yearly_financials",
            Self::QuarterlyBalanceSheet => "quarterly_balance_sheet",
            Self::BalanceSheet => "balance_sheet",
            Self::QuarterlyCashflow => "quarterly_cashflow",
            Self::Cashflow => "cashflow",
            Self::Sustainability => "sustainability",
            Self::Recommendations => "recommendations",
            Self::Holders => "holders",
        }
    }

    /// Human readable name, used in the error marker
    pub fn label(self) -> &'static str {
        match self {
            Self::QuarterlyFinancials => "Quarterly financials",
            Self::YearlyFinancials => "Yearly financials",
            Self::QuarterlyBalanceSheet => "Quarterly balance sheet",
            Self::BalanceSheet => "Balance sheet",
            Self::QuarterlyCashflow => "Quarterly cashflow",
            Self::Cashflow => "Cashflow",
            Self::Sustainability => "Sustainability",
            Self::Recommendations => "Recommendations",
            Self::Holders => "Holders",
        }
    }

    pub fn unavailable_message(self) -> String {
        format!("{} not available", self.label())
    }

    /// The statement backing this section, if it is a financial statement
    pub fn statement(self) -> Option<(StatementKind, Frequency)> {
        match self {
            Self::QuarterlyFinancials => Some((StatementKind::Income, Frequency::Quarterly)),
            Self::YearlyFinancials => Some((StatementKind::Income, Frequency::Annual)),
            Self::QuarterlyBalanceSheet => Some((StatementKind::BalanceSheet, Frequency::Quarterly)),
            Self::BalanceSheet => Some((StatementKind::BalanceSheet, Frequency::Annual)),
            Self::QuarterlyCashflow => Some((StatementKind::CashFlow, Frequency::Quarterly)),
            Self::Cashflow => Some((StatementKind::CashFlow, Frequency::Annual)),
            Self::Sustainability | Self::Recommendations | Self::Holders => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Section {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|section| section.key() == wanted)
            .ok_or_else(|| StockError::ConfigError(format!("Unknown section: {s}")))
    }
}

/// Parse a comma separated list of section keys, ignoring blanks and duplicates
pub fn parse_sections(list: &str) -> Result<Vec<Section>, StockError> {
    let mut sections = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let section: Section = part.parse()?;
        if !sections.contains(&section) {
            sections.push(section);
        }
    }
    Ok(sections)
}
