//! External collaborators of the city workflow
//!
//! Geocoding (name → coordinates) and timezone lookup (coordinates → zone id)
//! are network services behind small traits so the workflow can be tested
//! without a network.

pub mod geocode;
pub mod timezone;

pub use geocode::{GeocodeError, NominatimGeocoder};
pub use timezone::{load_zone, OpenMeteoTimezone, TimezoneError};

use async_trait::async_trait;

use crate::cache::Coordinates;

/// A place returned by a geocoder
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub coordinates: Coordinates,
    /// Human-readable resolved name
    pub display_name: String,
}

/// Turns a free-text place name into coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, name: &str) -> Result<GeocodedPlace, GeocodeError>;
}

/// Finds the IANA zone id for a coordinate
#[async_trait]
pub trait TimezoneLookup: Send + Sync {
    async fn lookup(&self, coords: Coordinates) -> Result<String, TimezoneError>;
}
