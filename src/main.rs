use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use std::time::Duration;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use ipfinder::client::DEFAULT_API_URL;
use ipfinder::throttle::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use ipfinder::{logging, Config, DetectionPolicy, IpApiClient, Pipeline, RatePolicy, RunSummary};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Column holding the IP addresses. Detected from headers and values
    /// when omitted
    #[clap(short, long, value_name = "NAME")]
    column: Option<String>,

    /// Additional header name to treat as an IP column (repeatable)
    #[clap(long = "header-term", value_name = "NAME")]
    header_terms: Vec<String>,

    /// Worksheet to read (default: first worksheet)
    #[clap(long, value_name = "SHEET")]
    sheet: Option<String>,

    /// Directory the ip_details_<timestamp>.xlsx file is written to
    #[clap(
        short,
        long,
        value_name = "DIR",
        value_hint = clap::ValueHint::DirPath,
        env = "IPFINDER_OUTPUT_DIR",
        default_value = "."
    )]
    output_dir: Utf8PathBuf,

    /// Base URL of the ip-api.com compatible lookup endpoint
    #[clap(long, value_name = "URL", env = "IPFINDER_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Per-request timeout in seconds
    #[clap(long, value_name = "SECS", default_value_t = 5)]
    timeout: u64,

    /// Maximum lookups per rate window
    #[clap(long, value_name = "N", default_value_t = DEFAULT_MAX_REQUESTS)]
    rate_limit: u32,

    /// Length of the rate window in seconds
    #[clap(long, value_name = "SECS", default_value_t = DEFAULT_WINDOW.as_secs())]
    window_secs: u64,

    /// Log level (overrides RUST_LOG)
    #[clap(long, value_name = "LEVEL")]
    log_level: Option<LevelFilter>,

    /// Also append log lines to this file
    #[clap(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    log_file: Option<Utf8PathBuf>,

    /// Use colors in the run summary
    #[clap(short = 'C', long, value_enum, default_value_t = ArgsColorChoice::Auto)]
    color: ArgsColorChoice,

    /// Spreadsheet (.xlsx, .xls, .ods, ...) with a column of IP addresses
    #[clap(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    input: Utf8PathBuf,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum ArgsColorChoice {
    Always,
    Never,
    Auto,
}

fn main() -> ExitCode {
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    // Print detailed error information based on environment variables
    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut std::io::stderr(), "Error: {:?}", err);
    } else {
        let _ = writeln!(&mut std::io::stderr(), "Error: {:#}", err);
    }

    ExitCode::FAILURE
}

fn run_main() -> Result<ExitCode> {
    let args = Args::parse();

    logging::init_logger(args.log_level, args.log_file.as_deref())
        .context("failed to set up logging")?;

    // determine appropriate colormode. auto simply
    // tests if stdout is a tty
    let colormode = match args.color {
        ArgsColorChoice::Auto => {
            if std::io::stdout().is_terminal() {
                ColorChoice::Always
            } else {
                ColorChoice::Never
            }
        }
        ArgsColorChoice::Always => ColorChoice::Always,
        ArgsColorChoice::Never => ColorChoice::Never,
    };

    let config = config_from_args(&args)?;
    let client = IpApiClient::new(&config.api_url, config.timeout, config.rate.window)?;
    let mut pipeline = Pipeline::new(config, client);

    let summary = pipeline
        .run(&args.input)
        .with_context(|| format!("failed to process {}", args.input))?;

    print_summary(&summary, colormode)?;
    if let Some(log_file) = &args.log_file {
        println!("Log file available at: {}", log_file);
    }

    Ok(ExitCode::SUCCESS)
}

fn config_from_args(args: &Args) -> Result<Config> {
    let rate = RatePolicy::new(args.rate_limit, Duration::from_secs(args.window_secs))?;

    let mut detection = DetectionPolicy::default();
    // user terms take priority over the built-in ones
    for (i, term) in args.header_terms.iter().enumerate() {
        detection.header_terms.insert(i, term.clone());
    }

    Ok(Config {
        api_url: args.api_url.clone(),
        timeout: Duration::from_secs(args.timeout),
        rate,
        detection,
        column: args.column.clone(),
        sheet: args.sheet.clone(),
        output_dir: args.output_dir.clone(),
    })
}

fn print_summary(summary: &RunSummary, colormode: ColorChoice) -> Result<()> {
    let mut out = StandardStream::stdout(colormode);

    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(out, "Results saved to {}", summary.output)?;
    out.reset()?;
    writeln!(out)?;

    writeln!(
        out,
        "{} rows from column {}: {} resolved, {} failed, {} blank",
        summary.rows, summary.column, summary.resolved, summary.failed, summary.skipped
    )?;
    out.flush()?;
    Ok(())
}
