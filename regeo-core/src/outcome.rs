use std::fmt;

use crate::source::Coordinate;

/// Terminal state of one coordinate's lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Address(String),
    AddressUnavailable,
    QuotaExhausted,
    TransportError,
}

impl Resolution {
    /// Text written to the output file and the log
    pub fn as_str(&self) -> &str {
        match self {
            Resolution::Address(address) => address,
            Resolution::AddressUnavailable => "address unavailable",
            Resolution::QuotaExhausted => "quota exhausted",
            Resolution::TransportError => "network/transport error",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Address(_))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result recorded for a single input coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct LookupOutcome {
    pub row_index: usize,
    pub longitude: f64,
    pub latitude: f64,
    /// Coordinate text as read from the input
    pub longitude_text: String,
    pub latitude_text: String,
    pub resolution: Resolution,
}

impl LookupOutcome {
    pub fn new(coordinate: &Coordinate, resolution: Resolution) -> Self {
        Self {
            row_index: coordinate.row_index,
            longitude: coordinate.longitude,
            latitude: coordinate.latitude,
            longitude_text: coordinate.longitude_text.clone(),
            latitude_text: coordinate.latitude_text.clone(),
            resolution,
        }
    }

    /// Emit the per-record log line
    pub fn log(&self) {
        if self.resolution.is_resolved() {
            log::info!("{}", self);
        } else {
            log::error!("{}", self);
        }
    }
}

impl fmt::Display for LookupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.row_index, self.longitude_text, self.latitude_text, self.resolution
        )
    }
}
