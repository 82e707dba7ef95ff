//! Stock snapshot building blocks
//!
//! This crate turns market data for one ticker into a flat, JSON-ready
//! snapshot. It includes:
//!
//! - A [`MarketDataProvider`] capability trait with a Yahoo Finance implementation
//! - Value sanitization (finite numbers rounded to two decimals, non-finite to `null`)
//! - Statement projection into per-period records and field selection
//! - Assembly of identity, valuation, price history, news and optional sections
//!
//! # Architecture
//!
//! [`SnapshotService`] fans every provider call of a request out
//! concurrently, each under its own timeout, and hands the results to
//! [`assemble`]. Only the price history is essential: when it fails the
//! response is a single `{"error": ...}` object. Every optional section
//! degrades to its own `{"error": "<label> not available"}` marker.
//!
//! # Example
//!
//! ```rust,ignore
//! use stock_snapshot::{SnapshotConfig, SnapshotQuery, SnapshotService, YahooFinanceClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SnapshotConfig::builder().with_env().build()?;
//!     let provider = Arc::new(YahooFinanceClient::from_config(&config)?);
//!     let service = SnapshotService::new(provider, Arc::new(config));
//!
//!     let response = service.snapshot("AAPL", SnapshotQuery::default()).await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod assemble;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod section;
pub mod service;
pub mod table;
pub mod value;

// Re-export main types for convenience
pub use api::YahooFinanceClient;
pub use assemble::{SectionValue, StockResponse, StockSnapshot, assemble};
pub use config::SnapshotConfig;
pub use error::{Result, StockError};
pub use model::{NewsItem, PriceBar, RecommendationTrend, TickerInfo};
pub use provider::MarketDataProvider;
pub use section::Section;
pub use service::{SnapshotQuery, SnapshotService};
pub use table::{Frequency, PeriodRecord, StatementKind, Table, project, select};
pub use value::{CleanValue, Scalar, sanitize};
