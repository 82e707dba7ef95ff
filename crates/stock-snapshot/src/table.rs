//! Time-indexed tables and their projection into per-period JSON records
//!
//! Financial statements arrive field-major: one row per line item ("Total
//! Revenue", "Net Income", ...) with one cell per reporting period. Clients
//! want the opposite, one object per period. [`project`] does the transpose,
//! orders the periods and runs every cell through the sanitizer; [`select`]
//! then trims each period down to the line items a section cares about.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::value::{CleanValue, sanitize};

/// Which financial statement a table comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Income,
    BalanceSheet,
    CashFlow,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Income => "income statement",
            Self::BalanceSheet => "balance sheet",
            Self::CashFlow => "cash flow statement",
        })
    }
}

/// Reporting frequency of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Quarterly,
    Annual,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        })
    }
}

/// One line item of a [`Table`], with one cell per period
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub field: String,
    pub cells: Vec<Option<f64>>,
}

/// A field-by-period table of numeric cells
///
/// `cells[i]` of every row belongs to `periods[i]`. A `None` cell means the
/// provider did not report that line item for that period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    periods: Vec<NaiveDate>,
    rows: Vec<TableRow>,
}

impl Table {
    /// Create a table over the given periods with no rows yet
    pub fn new(periods: Vec<NaiveDate>) -> Self {
        Self {
            periods,
            rows: Vec::new(),
        }
    }

    /// Add a row; cells are padded with `None` or truncated to the period count
    pub fn with_row(mut self, field: impl Into<String>, mut cells: Vec<Option<f64>>) -> Self {
        cells.resize(self.periods.len(), None);
        self.rows.push(TableRow {
            field: field.into(),
            cells,
        });
        self
    }

    /// Build a table from `(field, period, value)` observations
    ///
    /// Periods are collected in ascending order. A later observation for the
    /// same field and period replaces an earlier one.
    pub fn from_observations<I, S>(observations: I) -> Self
    where
        I: IntoIterator<Item = (S, NaiveDate, f64)>,
        S: Into<String>,
    {
        let mut periods = BTreeSet::new();
        let mut by_field: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        for (field, period, value) in observations {
            periods.insert(period);
            by_field.entry(field.into()).or_default().insert(period, value);
        }

        let periods: Vec<NaiveDate> = periods.into_iter().collect();
        let rows = by_field
            .into_iter()
            .map(|(field, values)| TableRow {
                cells: periods.iter().map(|p| values.get(p).copied()).collect(),
                field,
            })
            .collect();

        Self { periods, rows }
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// A table with no periods or no line items holds nothing to project
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty() || self.rows.is_empty()
    }
}

/// Key carrying the period date in a serialized [`PeriodRecord`]
pub const PERIOD_KEY: &str = "period";

/// One reporting period (or trading day) as a flat record
///
/// Serializes as `{"period": "2024-06-30", "<field>": <value>, ...}`. The
/// `period` key is always present on the wire in addition to the fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRecord {
    pub period: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, CleanValue>,
}

impl PeriodRecord {
    pub fn get(&self, field: &str) -> Option<&CleanValue> {
        self.values.get(field)
    }
}

/// Transpose a table into one sanitized record per period
///
/// Absent cells count as zero: a line item a company did not report is
/// structurally zero, not unknown. Cells that are present but not finite
/// still sanitize to `null`. With `reverse_chronological` the most recent
/// period comes first. A row named like [`PERIOD_KEY`] would shadow the date
/// in the flat record and is left out.
pub fn project(table: &Table, reverse_chronological: bool) -> Vec<PeriodRecord> {
    if table.is_empty() {
        return Vec::new();
    }

    let mut records: Vec<PeriodRecord> = table
        .periods
        .iter()
        .enumerate()
        .map(|(i, period)| PeriodRecord {
            period: *period,
            values: table
                .rows
                .iter()
                .filter(|row| row.field != PERIOD_KEY)
                .map(|row| {
                    let cell = row.cells.get(i).copied().flatten().unwrap_or(0.0);
                    (row.field.clone(), sanitize(cell))
                })
                .collect(),
        })
        .collect();

    if reverse_chronological {
        records.sort_by(|a, b| b.period.cmp(&a.period));
    } else {
        records.sort_by(|a, b| a.period.cmp(&b.period));
    }
    records
}

/// Keep only the wanted fields of each record
///
/// A wanted field a record lacks is left out rather than filled with `null`.
/// The record's period is not a field: it is kept, and serialized under
/// [`PERIOD_KEY`] next to the selected fields.
pub fn select<S: AsRef<str>>(records: Vec<PeriodRecord>, wanted_fields: &[S]) -> Vec<PeriodRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record
                .values
                .retain(|field, _| wanted_fields.iter().any(|w| w.as_ref() == field));
            record
        })
        .collect()
}

/// Turn a provider type name like `TotalRevenue` into `Total Revenue`
///
/// Runs of capitals stay together (`EBITDA`, `DilutedEPS` -> `Diluted EPS`).
pub fn display_name(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut out = String::with_capacity(type_name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push(' ');
            }
        }
        out.push(c);
    }
    out
}
