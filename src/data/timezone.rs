//! Coordinate → IANA timezone lookup and zone loading
//!
//! Open-Meteo's forecast endpoint reports the zone of any coordinate when
//! asked for `timezone=auto`; no API key needed.

use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::TimezoneLookup;
use crate::cache::Coordinates;

/// Base URL for the Open-Meteo API
const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while finding or loading a timezone
#[derive(Debug, Error)]
pub enum TimezoneError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("timezone service returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no timezone for coordinates ({lat:.6}, {lon:.6})")]
    NoZone { lat: f64, lon: f64 },

    /// The id is not in the bundled IANA database
    #[error("unknown timezone '{0}'")]
    UnknownZone(String),
}

/// Loads an IANA zone by id, e.g. "Asia/Shanghai"
pub fn load_zone(id: &str) -> Result<Tz, TimezoneError> {
    id.parse::<Tz>()
        .map_err(|_| TimezoneError::UnknownZone(id.to_string()))
}

#[derive(Debug, Deserialize)]
struct OpenMeteoZone {
    #[serde(default)]
    timezone: Option<String>,
}

/// Client resolving zone ids through Open-Meteo
#[derive(Debug, Clone)]
pub struct OpenMeteoTimezone {
    client: Client,
    base_url: String,
}

impl Default for OpenMeteoTimezone {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoTimezone {
    pub fn new() -> Self {
        Self::with_base_url(OPEN_METEO_BASE_URL)
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
impl TimezoneLookup for OpenMeteoTimezone {
    async fn lookup(&self, coords: Coordinates) -> Result<String, TimezoneError> {
        let url = format!(
            "{}?latitude={}&longitude={}&timezone=auto",
            self.base_url,
            coords.lat(),
            coords.lon()
        );

        let response = self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await?;
        if !response.status().is_success() {
            return Err(TimezoneError::Status(response.status()));
        }

        let body: OpenMeteoZone = response.json().await?;
        match body.timezone {
            // Open-Meteo answers "GMT" when it cannot place the coordinate.
            Some(id) if !id.is_empty() && id != "GMT" => Ok(id),
            _ => Err(TimezoneError::NoZone {
                lat: coords.lat(),
                lon: coords.lon(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn beijing() -> Coordinates {
        Coordinates::new(39.9042, 116.4074).expect("Valid coordinates")
    }

    #[test]
    fn test_load_zone_valid_and_invalid() {
        assert_eq!(load_zone("Asia/Shanghai").expect("Known zone"), Tz::Asia__Shanghai);
        assert!(matches!(
            load_zone("Mars/Olympus_Mons"),
            Err(TimezoneError::UnknownZone(id)) if id == "Mars/Olympus_Mons"
        ));
        assert!(load_zone("").is_err());
    }

    #[tokio::test]
    async fn test_lookup_reads_timezone_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("timezone", "auto"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"latitude": 39.9, "longitude": 116.4, "timezone": "Asia/Shanghai", "utc_offset_seconds": 28800}"#,
            ))
            .mount(&server)
            .await;

        let lookup = OpenMeteoTimezone::with_base_url(format!("{}/v1/forecast", server.uri()));
        let id = lookup.lookup(beijing()).await.expect("Lookup should succeed");

        assert_eq!(id, "Asia/Shanghai");
    }

    #[tokio::test]
    async fn test_lookup_without_zone_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"timezone": "GMT"}"#))
            .mount(&server)
            .await;

        let lookup = OpenMeteoTimezone::with_base_url(server.uri());
        let result = lookup.lookup(beijing()).await;

        assert!(matches!(result, Err(TimezoneError::NoZone { .. })));
    }

    #[tokio::test]
    async fn test_lookup_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lookup = OpenMeteoTimezone::with_base_url(server.uri());
        let result = lookup.lookup(beijing()).await;

        assert!(matches!(result, Err(TimezoneError::Status(_))));
    }
}
