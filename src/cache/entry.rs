//! Cached city records and the document that holds them

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::resolve::normalize_key;

/// Alternate names the tool knows for some cities, keyed by normalized name
const BUILTIN_ALIASES: &[(&str, &[&str])] = &[
    ("beijing", &["北京", "Beijing", "Peking"]),
    ("shanghai", &["上海", "Shanghai"]),
    ("guangzhou", &["广州", "Guangzhou", "Canton"]),
];

/// Returns the built-in aliases for a normalized key
pub fn builtin_aliases(normalized: &str) -> &'static [&'static str] {
    BUILTIN_ALIASES
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Errors building a cache entry
#[derive(Debug, Error, PartialEq)]
pub enum EntryError {
    #[error("invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
}

/// A validated latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    lat: f64,
    lon: f64,
}

impl Coordinates {
    /// Validates -90 ≤ lat ≤ 90 and -180 ≤ lon ≤ 180
    pub fn new(lat: f64, lon: f64) -> Result<Self, EntryError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(EntryError::InvalidCoordinates { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// One resolved location as persisted in the cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Name as the user first typed it
    pub city: String,
    /// Lowercased, trimmed key this entry is stored under
    pub normalized: String,
    /// Human-readable name from the geocoder
    pub display_name: String,
    lat: f64,
    lon: f64,
    /// IANA zone identifier, e.g. "Asia/Shanghai"
    pub timezone_id: String,
    /// Alternate names that resolve to this entry
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    /// RFC3339 time of the last write. Kept as text so one bad timestamp
    /// only makes its entry stale instead of failing the whole document.
    pub updated_at: String,
}

impl CacheEntry {
    /// Builds a fresh entry for `city`, stamped with `now`
    ///
    /// The alias set always contains `city` itself plus any built-in aliases.
    pub fn new(
        city: &str,
        display_name: impl Into<String>,
        coords: Coordinates,
        timezone_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let normalized = normalize_key(city);
        let mut aliases: BTreeSet<String> = builtin_aliases(&normalized)
            .iter()
            .map(|a| a.to_string())
            .collect();
        aliases.insert(city.to_string());

        Self {
            city: city.to_string(),
            normalized,
            display_name: display_name.into(),
            lat: coords.lat(),
            lon: coords.lon(),
            timezone_id: timezone_id.into(),
            aliases,
            updated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Adds an alias; returns false if it was already present
    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        self.aliases.insert(alias.into())
    }

    /// Parses `updated_at`, if it is valid RFC3339
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Latitude as stored; may be out of range in a hand-edited file
    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Coordinates of this entry, if they are in range
    pub fn coordinates(&self) -> Result<Coordinates, EntryError> {
        Coordinates::new(self.lat, self.lon)
    }
}

/// The whole persisted cache; saved and replaced as one unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry under its own normalized key
    ///
    /// Returns the entry previously stored under that key.
    pub fn upsert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.normalized.clone(), entry)
    }

    /// Entry stored under exactly `key`
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Map keys whose entry has a different `normalized` field
    ///
    /// `upsert` cannot produce these; they only come from hand-edited or
    /// foreign files.
    pub fn mismatched_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, entry)| key.as_str() != entry.normalized)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Map keys whose entry has out-of-range coordinates
    pub fn invalid_coordinates(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.coordinates().is_err())
            .map(|(key, _)| key.as_str())
            .collect()
    }
}
