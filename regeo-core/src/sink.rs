use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;

use crate::outcome::LookupOutcome;

/// Append outcome rows (no header) to a delimited output file, creating it if needed.
/// Returns the number of rows written.
pub fn append_outcomes(path: &Path, outcomes: &[LookupOutcome]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output file {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    for outcome in outcomes {
        writer
            .write_record([
                outcome.row_index.to_string(),
                outcome.longitude_text.clone(),
                outcome.latitude_text.clone(),
                outcome.resolution.to_string(),
            ])
            .with_context(|| format!("Failed to write row {}", outcome.row_index))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush output file {}", path.display()))?;

    Ok(outcomes.len())
}
