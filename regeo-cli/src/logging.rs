//! Log setup for a geocoding run
//!
//! Every record goes to the console and is appended to a log file, so a long
//! batch can be audited row by row after the terminal is gone.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Writer that copies everything to stderr and a log file
#[derive(Clone)]
struct DualWriter {
    log_file: Arc<Mutex<File>>,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Ok(mut file) = self.log_file.lock() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Ok(mut file) = self.log_file.lock() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Default filter: our own crates follow the verbose flag, dependencies stay at info
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "regeo=debug,regeo_core=debug,info"
    } else {
        "info"
    }
}

/// Install the global logger. `RUST_LOG` overrides the verbose flag.
pub fn init(log_path: &Path, verbose: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let env = env_logger::Env::default().default_filter_or(default_filter(verbose));

    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(DualWriter {
            log_file: Arc::new(Mutex::new(file)),
        })))
        .try_init()
        .context("Logger already initialized")?;

    log::debug!("Logging to {}", log_path.display());
    Ok(())
}
