use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::source::Coordinate;

/// AMap info code for "daily query limit reached" on a key
const QUOTA_EXCEEDED_INFOCODE: &str = "10003";

/// What the remote service said about one coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeReply {
    /// A formatted address was returned
    Address(String),
    /// The request went through but no usable address came back
    NoAddress,
    /// The key used for this request is over its quota
    QuotaExceeded,
}

/// A reverse geocoding backend
///
/// `Err` is reserved for transport-level failures (connection, HTTP status,
/// unreadable body). Anything the service itself reports is a `GeocodeReply`.
pub trait GeocodeClient: Send + Sync {
    fn reverse_geocode(&self, coordinate: &Coordinate, key: &str) -> Result<GeocodeReply>;
}

/// Connection settings for the AMap regeo endpoint
#[derive(Debug, Clone)]
pub struct AmapSettings {
    pub endpoint: String,
    /// Search radius in metres
    pub radius: u32,
    pub extensions: String,
    pub timeout: Duration,
}

impl Default for AmapSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://restapi.amap.com/v3/geocode/regeo".to_string(),
            radius: 1000,
            extensions: "all".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// AMap (Gaode) reverse geocoding client
pub struct AmapClient {
    client: reqwest::blocking::Client,
    settings: AmapSettings,
}

impl AmapClient {
    pub fn new(settings: AmapSettings) -> Result<Self> {
        let user_agent = format!(
            "regeo/{} (https://github.com/h4x0r/regeo)",
            env!("CARGO_PKG_VERSION")
        );

        // Blocking client: lookups run on rayon worker threads
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, settings })
    }
}

impl GeocodeClient for AmapClient {
    fn reverse_geocode(&self, coordinate: &Coordinate, key: &str) -> Result<GeocodeReply> {
        let location = format!("{},{}", coordinate.longitude, coordinate.latitude);
        let radius = self.settings.radius.to_string();

        log::debug!("Geocoding row {} ({}) via AMap", coordinate.row_index, location);

        let response = self
            .client
            .get(&self.settings.endpoint)
            .query(&[
                ("output", "json"),
                ("location", location.as_str()),
                ("key", key),
                ("radius", radius.as_str()),
                ("extensions", self.settings.extensions.as_str()),
            ])
            .send()
            .context("Failed to send geocoding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Geocoding API returned status: {}", response.status());
        }

        let body = response
            .text()
            .context("Failed to read geocoding response")?;

        parse_reply(&body)
    }
}

/// AMap regeo response, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct RegeoResponse {
    #[serde(default)]
    infocode: Option<String>,
    #[serde(default)]
    info: Option<String>,
    #[serde(default)]
    regeocode: Option<Regeocode>,
}

#[derive(Debug, Deserialize)]
struct Regeocode {
    // A string normally, but AMap sends `[]` when it has nothing
    #[serde(default)]
    formatted_address: serde_json::Value,
}

/// Classify an AMap regeo JSON body
pub(crate) fn parse_reply(body: &str) -> Result<GeocodeReply> {
    let data: RegeoResponse =
        serde_json::from_str(body).context("Failed to parse geocoding response")?;

    if data.infocode.as_deref() == Some(QUOTA_EXCEEDED_INFOCODE) {
        return Ok(GeocodeReply::QuotaExceeded);
    }

    let address = data
        .regeocode
        .as_ref()
        .and_then(|r| r.formatted_address.as_str())
        .map(str::trim)
        .filter(|a| !a.is_empty());

    match address {
        Some(address) => Ok(GeocodeReply::Address(address.to_string())),
        None => {
            log::debug!(
                "No address in response (infocode {:?}, info {:?})",
                data.infocode,
                data.info
            );
            Ok(GeocodeReply::NoAddress)
        }
    }
}
