use std::time::Duration;

use camino::Utf8PathBuf;

use crate::client::{DEFAULT_API_URL, DEFAULT_TIMEOUT};
use crate::detect::DetectionPolicy;
use crate::throttle::RatePolicy;

/// Resolved settings for one run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the ip-api compatible endpoint.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub rate: RatePolicy,
    pub detection: DetectionPolicy,
    /// Use this column instead of detecting one.
    pub column: Option<String>,
    /// Worksheet to read instead of the first one.
    pub sheet: Option<String>,
    /// Directory the `ip_details_*.xlsx` file is written to.
    pub output_dir: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            rate: RatePolicy::default(),
            detection: DetectionPolicy::default(),
            column: None,
            sheet: None,
            output_dir: Utf8PathBuf::from("."),
        }
    }
}
