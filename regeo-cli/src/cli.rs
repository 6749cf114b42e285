use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Reverse geocode a table of coordinates into street addresses
#[derive(Parser, Debug)]
#[command(name = "regeo")]
#[command(author = "4n6h4x0r")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turns longitude/latitude columns into addresses via the AMap API", long_about = None)]
pub struct Args {
    /// Input table (csv, tsv, txt, xlsx, xls, xlsm, xlsb or ods)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file; rows are appended (default: <INPUT stem>_addresses.csv)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// API key, repeat for a rotation pool (used in the order given)
    #[arg(short = 'k', long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    /// File with one API key per line (# comments allowed), appended after --key values
    #[arg(long = "key-file", value_name = "FILE")]
    pub key_file: Option<PathBuf>,

    /// Number of concurrent lookups
    #[arg(short = 'w', long = "workers", default_value_t = 5)]
    pub workers: usize,

    /// Search radius around each point, in metres
    #[arg(long = "radius", default_value_t = 1000)]
    pub radius: u32,

    /// Override the regeo endpoint URL
    #[arg(long = "endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout", default_value_t = 10)]
    pub timeout: u64,

    /// Log file (appended to, alongside console output)
    #[arg(long = "log-file", default_value = "regeo.log", value_name = "FILE")]
    pub log_file: PathBuf,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Output path, derived from the input name when not given
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => default_output_path(&self.input),
        }
    }

    /// Full key pool: --key values first, then the key file
    pub fn api_keys(&self) -> Result<Vec<String>> {
        let mut keys = self.keys.clone();
        if let Some(path) = &self.key_file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file {}", path.display()))?;
            keys.extend(parse_key_file(&contents));
        }
        Ok(keys)
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("coordinates");
    input.with_file_name(format!("{}_addresses.csv", stem))
}

fn parse_key_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parses command-line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["regeo", "data/USGS_2008.xlsx", "-k", "abc"]);
        assert_eq!(args.workers, 5);
        assert_eq!(args.radius, 1000);
        assert_eq!(args.output_path(), PathBuf::from("data/USGS_2008_addresses.csv"));
        assert_eq!(args.api_keys().unwrap(), vec!["abc".to_string()]);
    }

    #[test]
    fn test_key_pool_order() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let key_file = temp_dir.path().join("keys.txt");
        std::fs::write(&key_file, "# spare keys\nkey3\n\n  key4  \n")?;

        let key_path = key_file.to_string_lossy().to_string();
        let args = Args::parse_from([
            "regeo",
            "in.csv",
            "-k",
            "key1",
            "--key",
            "key2",
            "--key-file",
            key_path.as_str(),
            "-o",
            "out.csv",
        ]);

        assert_eq!(args.api_keys()?, vec!["key1", "key2", "key3", "key4"]);
        assert_eq!(args.output_path(), PathBuf::from("out.csv"));
        Ok(())
    }

    #[test]
    fn test_missing_key_file() {
        let args = Args::parse_from(["regeo", "in.csv", "--key-file", "/nonexistent/keys.txt"]);
        assert!(args.api_keys().is_err());
    }
}
