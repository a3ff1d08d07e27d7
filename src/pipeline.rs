//! Drives a run: read the workbook, find the IP column, look up each IP
//! under the rate policy, then write the results workbook.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, TimeZone};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::client::{Geolocate, IpRecord};
use crate::config::Config;
use crate::detect::{detect_ip_column, ColumnId};
use crate::error::{Error, Result};
use crate::format::{format, OutputTable};
use crate::input::InputTable;
use crate::throttle::{Clock, SystemClock, Throttle};

/// Prefix of every results workbook.
pub const OUTPUT_PREFIX: &str = "ip_details_";
pub const OUTPUT_EXT: &str = "xlsx";

/// Where a run currently is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Start,
    ColumnDetected,
    Lookup,
    Formatted,
    Written,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ColumnDetected => "column detected",
            Stage::Lookup => "lookup",
            Stage::Formatted => "formatted",
            Stage::Written => "written",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub output: Utf8PathBuf,
    pub column: ColumnId,
    /// Data rows written, equal to input rows.
    pub rows: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Rows with a blank IP cell.
    pub skipped: usize,
}

/// `ip_details_<YYYYMMDD_HHMMSS>.xlsx` for the given time.
pub fn output_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    format!("{}{}.{}", OUTPUT_PREFIX, at.format("%Y%m%d_%H%M%S"), OUTPUT_EXT)
}

#[derive(Default)]
struct Tally {
    resolved: usize,
    failed: usize,
    skipped: usize,
}

/// Sequential enrichment pipeline.
pub struct Pipeline<G, C = SystemClock> {
    config: Config,
    geolocator: G,
    throttle: Throttle<C>,
    stage: Stage,
}

impl<G: Geolocate> Pipeline<G, SystemClock> {
    pub fn new(config: Config, geolocator: G) -> Self {
        Pipeline::with_clock(config, geolocator, SystemClock)
    }
}

impl<G: Geolocate, C: Clock> Pipeline<G, C> {
    /// Build a pipeline whose throttle runs on `clock`.
    pub fn with_clock(config: Config, geolocator: G, clock: C) -> Self {
        let throttle = Throttle::with_clock(config.rate, clock);
        Pipeline {
            config,
            geolocator,
            throttle,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        debug!("Pipeline stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Read `input` and run the whole pipeline on it.
    pub fn run(&mut self, input: &Utf8Path) -> Result<RunSummary> {
        info!("Input file: {}", input);
        self.check_output_dir()?;
        let table = InputTable::open(input, self.config.sheet.as_deref())?;
        info!("Read {} rows from {}", table.len(), table);
        self.run_table(&table)
    }

    /// Run the pipeline on an already loaded table.
    pub fn run_table(&mut self, table: &InputTable) -> Result<RunSummary> {
        self.stage = Stage::Start;
        self.check_output_dir()?;

        let column = self.detect(table)?;
        let (records, tally) = self.lookup_all(table, &column);

        let output = format(records);
        self.advance(Stage::Formatted);

        let path = self.write(&output, &Local::now())?;

        self.advance(Stage::Done);
        Ok(RunSummary {
            output: path,
            column,
            rows: output.len(),
            resolved: tally.resolved,
            failed: tally.failed,
            skipped: tally.skipped,
        })
    }

    fn check_output_dir(&self) -> Result<()> {
        if self.config.output_dir.is_dir() {
            Ok(())
        } else {
            Err(Error::OutputDir {
                path: self.config.output_dir.clone(),
            })
        }
    }

    /// Find the IP column of `table`.
    pub fn detect(&mut self, table: &InputTable) -> Result<ColumnId> {
        let column = detect_ip_column(
            table,
            &self.config.detection,
            self.config.column.as_deref(),
        )?;
        info!("Using IP column: {}", column);
        self.advance(Stage::ColumnDetected);
        Ok(column)
    }

    /// Look up the IP of every row, in order.
    ///
    /// Always yields one record per row. Blank cells give an empty record
    /// without a request; repeated IPs reuse the first lookup.
    pub fn lookup_rows(&mut self, table: &InputTable, column: &ColumnId) -> Vec<IpRecord> {
        self.lookup_all(table, column).0
    }

    fn lookup_all(&mut self, table: &InputTable, column: &ColumnId) -> (Vec<IpRecord>, Tally) {
        self.advance(Stage::Lookup);
        let total = table.len();
        info!("Processing {} IP addresses...", total);

        let mut records = Vec::with_capacity(total);
        let mut tally = Tally::default();
        let mut seen: FxHashMap<String, IpRecord> = FxHashMap::default();
        let mut backoff = None;

        for (i, ip) in table.column(column.index).enumerate() {
            let ip = ip.trim();
            if ip.is_empty() {
                warn!("Skipping empty IP at row {}", i + 1);
                tally.skipped += 1;
                records.push(IpRecord::empty(""));
                continue;
            }

            let record = match seen.get(ip) {
                Some(record) => {
                    debug!("Reusing lookup for {} at row {}", ip, i + 1);
                    record.clone()
                }
                None => {
                    info!("Processing IP {}/{}: {}", i + 1, total, ip);
                    if let Some(wait) = backoff.take() {
                        self.throttle.pause(wait);
                    }
                    self.throttle.acquire();
                    let lookup = self.geolocator.lookup(ip);
                    backoff = lookup.backoff;
                    seen.insert(ip.to_string(), lookup.record.clone());
                    lookup.record
                }
            };

            if record.is_resolved() {
                info!(
                    "Retrieved details for {}: {}, {}",
                    ip,
                    record.country.as_deref().unwrap_or("-"),
                    record.city.as_deref().unwrap_or("-")
                );
                tally.resolved += 1;
            } else {
                tally.failed += 1;
            }
            records.push(record);
        }

        (records, tally)
    }

    fn write(&mut self, table: &OutputTable, at: &DateTime<Local>) -> Result<Utf8PathBuf> {
        let path = self.config.output_dir.join(output_file_name(at));
        info!("Saving results to {}", path);
        table.write_xlsx(&path)?;
        self.advance(Stage::Written);
        info!("Results saved to {}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Lookup;
    use crate::throttle::tests::ManualClock;
    use crate::throttle::RatePolicy;
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        backoff: Option<Duration>,
    }

    impl Geolocate for Recorder {
        fn lookup(&self, ip: &str) -> Lookup {
            self.calls.borrow_mut().push(ip.to_string());
            Lookup {
                record: IpRecord {
                    ip: ip.to_string(),
                    country: Some("Testland".to_string()),
                    ..IpRecord::default()
                },
                backoff: self.backoff,
            }
        }
    }

    fn table(ips: &[&str]) -> InputTable {
        InputTable::from_parts(
            vec!["ip".to_string()],
            ips.iter().map(|ip| vec![ip.to_string()]).collect(),
        )
    }

    fn config(dir: &Utf8Path) -> Config {
        Config {
            output_dir: dir.to_owned(),
            ..Config::default()
        }
    }

    fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(output_file_name(&at), "ip_details_20240309_070501.xlsx");
    }

    #[test]
    fn blank_and_duplicate_rows() {
        let (_guard, dir) = tempdir();
        let geo = Recorder::default();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::with_clock(config(&dir), &geo, &clock);

        let t = table(&["8.8.8.8", "", "8.8.8.8", "1.1.1.1"]);
        let summary = pipeline.run_table(&t).unwrap();

        assert_eq!(*geo.calls.borrow(), ["8.8.8.8", "1.1.1.1"]);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.resolved, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(pipeline.stage(), Stage::Done);
        assert!(summary.output.exists());
    }

    #[test]
    fn lookup_rows_keeps_order() {
        let (_guard, dir) = tempdir();
        let geo = Recorder::default();
        let mut pipeline = Pipeline::with_clock(config(&dir), &geo, ManualClock::new());
        let t = table(&["9.9.9.9", "1.1.1.1", "8.8.8.8"]);
        let column = pipeline.detect(&t).unwrap();
        assert_eq!(pipeline.stage(), Stage::ColumnDetected);

        let records = pipeline.lookup_rows(&t, &column);
        let ips: Vec<&str> = records.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, ["9.9.9.9", "1.1.1.1", "8.8.8.8"]);
    }

    #[test]
    fn backoff_is_applied_before_next_call() {
        let (_guard, dir) = tempdir();
        let geo = Recorder {
            backoff: Some(Duration::from_secs(7)),
            ..Recorder::default()
        };
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::with_clock(config(&dir), &geo, &clock);
        pipeline.run_table(&table(&["1.1.1.1", "2.2.2.2"])).unwrap();

        // Only between the two calls, not after the last one.
        assert_eq!(*clock.sleeps.borrow(), [Duration::from_secs(7)]);
    }

    #[test]
    fn throttles_between_calls() {
        let (_guard, dir) = tempdir();
        let geo = Recorder::default();
        let clock = ManualClock::new();
        let cfg = Config {
            rate: RatePolicy::new(2, Duration::from_secs(10)).unwrap(),
            ..config(&dir)
        };
        let mut pipeline = Pipeline::with_clock(cfg, &geo, &clock);
        pipeline
            .run_table(&table(&["1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5"]))
            .unwrap();
        let slept: Duration = clock.sleeps.borrow().iter().sum();
        assert_eq!(slept, Duration::from_secs(20));
    }

    #[test]
    fn missing_output_dir_is_fatal_before_lookups() {
        let geo = Recorder::default();
        let mut pipeline = Pipeline::with_clock(
            config(Utf8Path::new("/nonexistent/out")),
            &geo,
            ManualClock::new(),
        );
        let err = pipeline.run_table(&table(&["8.8.8.8"])).unwrap_err();
        assert!(matches!(err, Error::OutputDir { .. }));
        assert!(geo.calls.borrow().is_empty());
    }

    #[test]
    fn no_column_is_fatal() {
        let (_guard, dir) = tempdir();
        let geo = Recorder::default();
        let mut pipeline = Pipeline::with_clock(config(&dir), &geo, ManualClock::new());
        let t = InputTable::from_parts(vec!["name".into()], vec![vec!["alice".into()]]);
        let err = pipeline.run_table(&t).unwrap_err();
        assert!(matches!(err, Error::NoIpColumnFound { .. }));
        assert_eq!(pipeline.stage(), Stage::Start);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }
}
