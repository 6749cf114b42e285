use anyhow::Result;
use regeo_core::{GeocodeConfig, GeocodeEngine};
use std::time::Duration;

mod cli;
mod logging;

fn main() -> Result<()> {
    let args = cli::parse_args();

    logging::init(&args.log_file, args.verbose)?;

    let keys = args.api_keys()?;
    let output = args.output_path();

    // Create engine with configuration from CLI args
    let mut config = GeocodeConfig {
        workers: args.workers,
        radius: args.radius,
        timeout: Duration::from_secs(args.timeout),
        ..GeocodeConfig::default()
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }

    let engine = GeocodeEngine::new(config)?;

    log::info!("Geocoding {} -> {}", args.input.display(), output.display());
    let summary = engine.process_file(&args.input, &output, keys)?;

    log::info!(
        "Resolved {} of {} coordinates ({} without address, {} over quota, {} network errors)",
        summary.resolved,
        summary.coordinates,
        summary.address_unavailable,
        summary.quota_exhausted,
        summary.transport_errors
    );
    if summary.quota_exhausted > 0 {
        log::warn!("{} rows hit an exhausted API key and were not resolved", summary.quota_exhausted);
    }
    log::info!("Wrote {} rows to {}", summary.rows_written, output.display());

    Ok(())
}
