//! The ipfinder library: geolocate a spreadsheet column of IP addresses.
//!
//! A run reads a workbook, finds the column holding IP addresses, looks
//! each one up against an ip-api.com compatible service while staying
//! under its rate limit, and writes a bordered `ip_details_*.xlsx` table.
//!
//! # Examples
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use ipfinder::{Config, IpApiClient, Pipeline};
//!
//! let config = Config::default();
//! let client = IpApiClient::new(&config.api_url, config.timeout, config.rate.window)?;
//! let mut pipeline = Pipeline::new(config, client);
//! let summary = pipeline.run(Utf8Path::new("flows.xlsx"))?;
//! println!("wrote {} rows to {}", summary.rows, summary.output);
//! # Ok::<(), ipfinder::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod detect;
pub mod error;
pub mod format;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod throttle;

pub use crate::client::{Geolocate, IpApiClient, IpRecord, Lookup};
pub use crate::config::Config;
pub use crate::detect::{detect_ip_column, ColumnId, DetectionPolicy};
pub use crate::error::{Error, Result};
pub use crate::format::{OutputTable, COLUMNS};
pub use crate::input::{InputRow, InputTable};
pub use crate::pipeline::{output_file_name, Pipeline, RunSummary, Stage};
pub use crate::throttle::{Clock, RatePolicy, SystemClock, Throttle};
