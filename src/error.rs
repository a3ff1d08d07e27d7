use camino::Utf8PathBuf;

/// Error types for the ipfinder library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input workbook does not exist.
    #[error("input file not found: {path}")]
    InputNotFound { path: Utf8PathBuf },

    /// Input workbook could not be opened or parsed.
    #[error("failed to read workbook {path}")]
    Workbook {
        path: Utf8PathBuf,
        #[source]
        source: calamine::Error,
    },

    /// Workbook has no worksheets, or the requested one is missing.
    #[error("worksheet not found in {path}: {sheet}")]
    NoWorksheet { path: Utf8PathBuf, sheet: String },

    /// Worksheet has no header row.
    #[error("worksheet '{sheet}' in {path} is empty")]
    EmptySheet { path: Utf8PathBuf, sheet: String },

    /// No column looks like it holds IP addresses.
    #[error("no IP address column found (available columns: {})", .headers.join(", "))]
    NoIpColumnFound { headers: Vec<String> },

    /// A column was requested by name but is not in the header row.
    #[error("column '{name}' not found (available columns: {})", .headers.join(", "))]
    ColumnNotFound { name: String, headers: Vec<String> },

    /// Output directory is missing or not a directory.
    #[error("output directory not found: {path}")]
    OutputDir { path: Utf8PathBuf },

    /// Rate policy would never allow a request.
    #[error("invalid rate policy: {reason}")]
    InvalidRatePolicy { reason: String },

    /// Geolocation service URL cannot be used as a request base.
    #[error("invalid API URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },

    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    /// Output workbook could not be written.
    #[error("failed to write {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
