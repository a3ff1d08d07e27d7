//! Logger setup on top of `env_logger`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use camino::Utf8Path;
use env_logger::{Builder, Env, Target};
use log::LevelFilter;

use crate::error::Result;

/// Writes every log line to stderr and to a file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize logging.
///
/// `RUST_LOG` is honored, defaulting to `info`; an explicit `level`
/// overrides both. HTTP internals are capped at `warn`. With `log_file`,
/// lines are also appended to that file.
///
/// Calling this twice is harmless; the second logger is ignored.
pub fn init_logger(level: Option<LevelFilter>, log_file: Option<&Utf8Path>) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
        builder.filter_module("ipfinder", level);
    }
    builder.filter_module("reqwest", LevelFilter::Warn);
    builder.filter_module("hyper", LevelFilter::Warn);
    builder.filter_module("hyper_util", LevelFilter::Warn);
    builder.filter_module("rustls", LevelFilter::Warn);

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
    }

    // Already initialized (tests, embedding) is not an error.
    let _ = builder.try_init();
    Ok(())
}
