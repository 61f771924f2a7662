//! Reverse geocoding of memorial coordinates into short place names.

pub mod update;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::GeocodingConfig;
use crate::error::GeocodeError;

pub use update::update_locations;

/// Stored as the location when the geocoder has nothing for the coordinates.
pub const NO_ADDRESS: &str = "address information unavailable";

/// Coordinates to a display place name.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service knows no address at this point.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError>;
}

/// One entry of a Google `address_components` list.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl AddressComponent {
    fn has_type(&self, kind: &str) -> bool {
        self.types.iter().any(|t| t == kind)
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    status: String,
}

#[derive(Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

/// Short place name from address components.
///
/// Japanese addresses become `"{prefecture} {city}"` with the administrative
/// suffix (都/府/県) dropped from the prefecture; anything else becomes
/// `"{country} {city}"`.
pub fn format_address(components: &[AddressComponent]) -> String {
    let find = |kind: &str| components.iter().find(|c| c.has_type(kind));

    let country = find("country");
    let prefecture = find("administrative_area_level_1")
        .map(|c| c.long_name.as_str())
        .unwrap_or_default();
    let city = find("locality")
        .or_else(|| find("administrative_area_level_2"))
        .map(|c| c.long_name.as_str())
        .unwrap_or_default();

    let in_japan = country.is_some_and(|c| c.short_name == "JP");
    let place = if in_japan {
        let prefecture = prefecture
            .strip_suffix(['都', '府', '県'])
            .unwrap_or(prefecture);
        format!("{prefecture} {city}")
    } else {
        let country = country.map(|c| c.long_name.as_str()).unwrap_or_default();
        format!("{country} {city}")
    };
    place.trim().to_string()
}

/// Google Maps Geocoding API client.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    url: reqwest::Url,
    api_key: String,
    language: String,
    timeout: Duration,
}

impl GoogleGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.api_key.is_empty(),
            "Google Maps API key is not set (GOOGLE_MAPS_API_KEY)"
        );
        let base = config.base_url.trim_end_matches('/');
        let url = reqwest::Url::parse(&format!("{base}/maps/api/geocode/json"))
            .with_context(|| format!("invalid geocoding base URL: {}", config.base_url))?;
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build geocoding HTTP client")?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError> {
        let latlng = format!("{latitude},{longitude}");
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("latlng", &latlng)
            .append_pair("key", &self.api_key)
            .append_pair("language", &self.language);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeocodeResponse = response.json().await?;
        debug!(status = %parsed.status, results = parsed.results.len(), "geocode response");

        match parsed.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(parsed
                .results
                .first()
                .map(|r| format_address(&r.address_components))
                .filter(|place| !place.is_empty())),
            other => Err(GeocodeError::Rejected {
                status: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError> {
        tokio::time::timeout(self.timeout, self.lookup(latitude, longitude))
            .await
            .map_err(|_| GeocodeError::Timeout(self.timeout))?
    }
}
