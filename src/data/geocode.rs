//! Nominatim (OpenStreetMap) forward geocoding
//!
//! Free, no API key. Nominatim's usage policy requires a descriptive
//! User-Agent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use thiserror::Error;

use super::{GeocodedPlace, Geocoder};
use crate::cache::{Coordinates, EntryError};

/// Base URL for the Nominatim search API
const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
const USER_AGENT: &str = concat!("sunmoon/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while geocoding
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("city name must not be empty")]
    EmptyName,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("geocoder returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no place found for '{0}'")]
    NotFound(String),

    /// Nominatim returns coordinates as strings
    #[error("invalid coordinate in response: '{0}'")]
    InvalidNumber(String),

    #[error(transparent)]
    Coordinates(#[from] EntryError),
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// Client for the Nominatim search endpoint
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        Self::with_base_url(NOMINATIM_SEARCH_URL)
    }

    /// Points the client at another server, e.g. a mock in tests
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, name: &str) -> Result<GeocodedPlace, GeocodeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GeocodeError::EmptyName);
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", name),
                ("format", "json"),
                ("limit", "1"),
                ("accept-language", "zh-CN,en"),
            ])
            .header(header::USER_AGENT, USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(name.to_string()))?;

        let place = parse_place(place)?;
        tracing::debug!(query = name, display_name = %place.display_name, "geocoded");
        Ok(place)
    }
}

fn parse_place(place: NominatimPlace) -> Result<GeocodedPlace, GeocodeError> {
    let lat: f64 = place
        .lat
        .trim()
        .parse()
        .map_err(|_| GeocodeError::InvalidNumber(place.lat.clone()))?;
    let lon: f64 = place
        .lon
        .trim()
        .parse()
        .map_err(|_| GeocodeError::InvalidNumber(place.lon.clone()))?;

    Ok(GeocodedPlace {
        coordinates: Coordinates::new(lat, lon)?,
        display_name: place.display_name,
    })
}
