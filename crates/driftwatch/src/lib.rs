//! Cross-project drift alert aggregation.
//!
//! This crate gives a single, always-current view of outstanding drift
//! alerts across independently managed projects without letting one slow or
//! failing project block the rest.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use driftwatch::{Aggregator, AggregatorConfig, AlertFilter, ApiClient, Refresher};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = Arc::new(ApiClient::new("http://127.0.0.1:8080", std::time::Duration::from_secs(5))?);
//! let aggregator = Aggregator::new(client.clone(), AggregatorConfig::default());
//! let refresher = Refresher::new(client, aggregator, AlertFilter::all());
//!
//! let snapshot = refresher.run_cycle().await?;
//! println!("{}", snapshot.summary_line());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`ProjectDirectory`] and [`AlertSource`] are the external collaborators;
//!   [`ApiClient`] implements both over HTTP
//! - [`Aggregator`] fans out one query per project and builds an
//!   [`AggregateSnapshot`]
//! - [`RefreshScheduler`] keeps the latest snapshot fresh on an interval
//! - [`extract_facets`] derives filter choices from loaded alerts
//! - [`AckTracker`] acknowledges alerts with a provisional local view

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ack;
pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod facets;
pub mod filter;
pub mod model;
pub mod notice;
pub mod scheduler;

pub use ack::{AckTracker, AlertView};
pub use aggregator::{AggregateSnapshot, Aggregator, AggregatorConfig, Refresher};
pub use client::{AckOutcome, AlertSource, ApiClient, ProjectDirectory};
pub use config::Config;
pub use error::{
    DirectoryError, Error, InvalidFilterError, QueryError, QueryErrorKind, SchedulerError,
};
pub use facets::{extract_facets, Facets};
pub use filter::{canonical_timestamp, canonicalize_time, AlertFilter, FilterInput};
pub use model::{Alert, AlertStatus, AlertType, Project, Severity};
pub use notice::{Notice, NoticeLevel};
pub use scheduler::{RefreshScheduler, SchedulerState, SchedulerStats, SnapshotReceiver};
