use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use crate::outcome::LookupOutcome;

/// Collects outcomes in whatever order lookups finish and releases them,
/// once complete, exactly one per expected row
#[derive(Debug, Default)]
pub struct ResultAggregator {
    expected: BTreeSet<usize>,
    outcomes: BTreeMap<usize, LookupOutcome>,
    emitted: BTreeSet<usize>,
}

impl ResultAggregator {
    /// Create an aggregator expecting one outcome for each of the given rows
    pub fn new<I: IntoIterator<Item = usize>>(expected_rows: I) -> Self {
        Self {
            expected: expected_rows.into_iter().collect(),
            outcomes: BTreeMap::new(),
            emitted: BTreeSet::new(),
        }
    }

    /// Store an outcome. Returns false (and keeps the first) if the row was
    /// already recorded or was never expected.
    pub fn record(&mut self, outcome: LookupOutcome) -> bool {
        let row = outcome.row_index;
        if !self.expected.contains(&row) {
            log::warn!("Ignoring outcome for unexpected row {}", row);
            return false;
        }
        if self.outcomes.contains_key(&row) {
            log::warn!("Ignoring duplicate outcome for row {}", row);
            return false;
        }
        self.outcomes.insert(row, outcome);
        true
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Rows that have no outcome yet
    pub fn missing_rows(&self) -> Vec<usize> {
        self.expected
            .iter()
            .filter(|row| !self.outcomes.contains_key(*row))
            .copied()
            .collect()
    }

    /// Check that every expected row has exactly one outcome and return, in
    /// row order, those not handed out by an earlier call
    pub fn finalize(&mut self) -> Result<Vec<LookupOutcome>> {
        let missing = self.missing_rows();
        if !missing.is_empty() {
            let preview: Vec<String> = missing.iter().take(10).map(|r| r.to_string()).collect();
            anyhow::bail!(
                "{} of {} rows have no outcome (first: {})",
                missing.len(),
                self.expected.len(),
                preview.join(", ")
            );
        }

        let fresh: Vec<LookupOutcome> = self
            .outcomes
            .iter()
            .filter(|(row, _)| !self.emitted.contains(*row))
            .map(|(_, outcome)| outcome.clone())
            .collect();

        self.emitted.extend(fresh.iter().map(|o| o.row_index));
        Ok(fresh)
    }
}
