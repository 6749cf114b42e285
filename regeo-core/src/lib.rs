use anyhow::Result;
use std::path::Path;
use std::time::Duration;

// Internal modules
mod aggregator;
mod dispatcher;
mod geocoding;
mod key_rotator;
mod outcome;
mod sink;
mod source;

// Re-export public types
pub use aggregator::ResultAggregator;
pub use dispatcher::LookupDispatcher;
pub use geocoding::{AmapClient, AmapSettings, GeocodeClient, GeocodeReply};
pub use key_rotator::{ActiveKey, KeyRotator};
pub use outcome::{LookupOutcome, Resolution};
pub use sink::append_outcomes;
pub use source::{find_location_columns, read_coordinates, Coordinate};

/// Configuration options for a geocoding run
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    /// Maximum number of lookups in flight at once
    pub workers: usize,
    /// AMap regeo endpoint
    pub endpoint: String,
    /// Search radius around each point, in metres
    pub radius: u32,
    /// AMap `extensions` parameter ("base" or "all")
    pub extensions: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        let amap = AmapSettings::default();
        Self {
            workers: 5,
            endpoint: amap.endpoint,
            radius: amap.radius,
            extensions: amap.extensions,
            timeout: amap.timeout,
        }
    }
}

impl GeocodeConfig {
    fn amap_settings(&self) -> AmapSettings {
        AmapSettings {
            endpoint: self.endpoint.clone(),
            radius: self.radius,
            extensions: self.extensions.clone(),
            timeout: self.timeout,
        }
    }
}

/// Per-category counts for a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub coordinates: usize,
    pub resolved: usize,
    pub address_unavailable: usize,
    pub quota_exhausted: usize,
    pub transport_errors: usize,
    pub rows_written: usize,
}

impl RunSummary {
    fn tally(outcomes: &[LookupOutcome]) -> Self {
        let mut summary = Self {
            coordinates: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.resolution {
                Resolution::Address(_) => summary.resolved += 1,
                Resolution::AddressUnavailable => summary.address_unavailable += 1,
                Resolution::QuotaExhausted => summary.quota_exhausted += 1,
                Resolution::TransportError => summary.transport_errors += 1,
            }
        }
        summary
    }
}

/// Drives a whole run: read coordinates, look them up, write the results
pub struct GeocodeEngine {
    config: GeocodeConfig,
    client: Box<dyn GeocodeClient>,
}

impl GeocodeEngine {
    /// Create an engine backed by the AMap web service
    pub fn new(config: GeocodeConfig) -> Result<Self> {
        let client = AmapClient::new(config.amap_settings())?;
        Ok(Self::with_client(config, Box::new(client)))
    }

    /// Create an engine with a custom geocoding backend
    pub fn with_client(config: GeocodeConfig, client: Box<dyn GeocodeClient>) -> Self {
        Self { config, client }
    }

    /// Geocode every coordinate in `input` and append the outcomes to `output`.
    /// Configuration problems fail before any request is sent; per-row failures
    /// end up in the output file instead.
    pub fn process_file<I, S>(&self, input: &Path, output: &Path, keys: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = KeyRotator::new(keys)?;
        if self.config.workers == 0 {
            anyhow::bail!("Worker count must be at least 1");
        }

        let coordinates = read_coordinates(input)?;
        log::info!(
            "Read {} coordinates from {}, geocoding with {} workers and {} API keys",
            coordinates.len(),
            input.display(),
            self.config.workers,
            keys.len()
        );

        let outcomes = self.geocode(&coordinates, &keys)?;

        let mut summary = RunSummary::tally(&outcomes);
        summary.rows_written = append_outcomes(output, &outcomes)?;
        Ok(summary)
    }

    /// Look up a batch of coordinates with the engine's client and worker count,
    /// returning one outcome per coordinate in row order
    pub fn geocode(&self, coordinates: &[Coordinate], keys: &KeyRotator) -> Result<Vec<LookupOutcome>> {
        let dispatcher = LookupDispatcher::new(self.client.as_ref(), keys, self.config.workers)?;
        let mut aggregator = ResultAggregator::new(coordinates.iter().map(|c| c.row_index));
        dispatcher.run(coordinates, &mut aggregator);
        aggregator.finalize()
    }
}
