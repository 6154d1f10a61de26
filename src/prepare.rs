//! Turning a typed city name into a geocoded, timezone-qualified context
//!
//! Cache first; the network only on a miss or a stale hit, and never in
//! offline mode. Fresh network results are written back to the cache.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cache::{
    freshness, resolve, CacheEntry, CacheError, CacheStore, Coordinates, EntryError, Freshness,
    StopReason,
};
use crate::data::{load_zone, GeocodeError, Geocoder, TimezoneError, TimezoneLookup};

/// Whether the workflow may use the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Online,
    /// Only the local cache; misses and stale hits are errors
    Offline,
}

/// Where a context's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

/// A city resolved to coordinates and a loaded timezone
#[derive(Debug, Clone)]
pub struct CityContext {
    /// Canonical name of the city
    pub city: String,
    pub display_name: String,
    pub coordinates: Coordinates,
    pub timezone_id: String,
    pub zone: Tz,
    /// Current time in the city's zone
    pub local_now: DateTime<Tz>,
    pub source: Source,
}

/// Errors from preparing a city
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("no city name given")]
    EmptyCity,

    #[error("offline: '{0}' is not in the cache; run once online first")]
    OfflineMiss(String),

    #[error("offline: cache entry for '{0}' is stale; refresh it online")]
    OfflineStale(String),

    #[error("failed to geocode city: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("failed to find timezone: {0}")]
    Timezone(#[from] TimezoneError),

    /// A cached entry names a zone the timezone database does not know
    #[error("cached timezone for '{city}' is invalid: {source}")]
    InvalidCachedZone {
        city: String,
        #[source]
        source: TimezoneError,
    },

    #[error("cached coordinates are invalid: {0}")]
    InvalidCachedCoordinates(#[from] EntryError),

    #[error("failed to save cache: {0}")]
    Cache(#[from] CacheError),

    #[error("interrupted")]
    Cancelled,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Resolves cities through the cache and the network collaborators
pub struct CityResolver<G, T> {
    store: CacheStore,
    geocoder: G,
    timezones: T,
    clock: Clock,
    cancel: CancellationToken,
}

impl<G: Geocoder, T: TimezoneLookup> CityResolver<G, T> {
    pub fn new(store: CacheStore, geocoder: G, timezones: T) -> Self {
        Self {
            store,
            geocoder,
            timezones,
            clock: Box::new(Utc::now),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops network calls and the cache lock wait once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replaces the wall clock, for tests
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn ttl(&self) -> Duration {
        self.store.config().ttl
    }

    async fn unless_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, PrepareError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PrepareError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Resolves `city` to a context
    ///
    /// # Errors
    /// * `PrepareError::OfflineMiss` / `OfflineStale` in offline mode
    /// * `PrepareError::Geocode` / `Timezone` if a collaborator fails
    /// * `PrepareError::Cache` if the fresh result cannot be saved
    /// * `PrepareError::Cancelled` if the token fires during a network call
    ///   or while waiting for the cache lock
    pub async fn prepare(&self, city: &str, mode: Mode) -> Result<CityContext, PrepareError> {
        if city.trim().is_empty() {
            return Err(PrepareError::EmptyCity);
        }

        let now = (self.clock)();
        let doc = self.store.load();

        if let Some(entry) = resolve(&doc, city) {
            match freshness(entry, now, self.ttl()) {
                Freshness::Fresh => {
                    tracing::info!(query = city, city = %entry.city, "resolved from cache");
                    return context_from_cache(entry, now);
                }
                Freshness::Stale if mode == Mode::Offline => {
                    return Err(PrepareError::OfflineStale(city.to_string()));
                }
                Freshness::Stale => {
                    tracing::info!(query = city, updated_at = %entry.updated_at, "cache entry stale, refreshing");
                }
            }
        } else if mode == Mode::Offline {
            return Err(PrepareError::OfflineMiss(city.to_string()));
        } else {
            tracing::debug!(query = city, "cache miss");
        }

        self.fetch_and_store(city, now).await
    }

    async fn fetch_and_store(&self, city: &str, now: DateTime<Utc>) -> Result<CityContext, PrepareError> {
        let place = self.unless_cancelled(self.geocoder.geocode(city)).await??;
        let timezone_id = self
            .unless_cancelled(self.timezones.lookup(place.coordinates))
            .await??;
        let zone = load_zone(&timezone_id)?;

        let entry = CacheEntry::new(
            city,
            place.display_name.clone(),
            place.coordinates,
            timezone_id.clone(),
            now,
        );
        let deadline = self
            .store
            .default_deadline()
            .with_cancellation(self.cancel.clone());
        match self.store.upsert_with(entry, &deadline).await {
            Ok(_) => {}
            Err(CacheError::LockTimeout {
                reason: StopReason::Cancelled,
                ..
            }) => return Err(PrepareError::Cancelled),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            query = city,
            display_name = %place.display_name,
            lat = place.coordinates.lat(),
            lon = place.coordinates.lon(),
            timezone = %timezone_id,
            "resolved from network"
        );

        Ok(CityContext {
            city: city.to_string(),
            display_name: place.display_name,
            coordinates: place.coordinates,
            timezone_id,
            zone,
            local_now: now.with_timezone(&zone),
            source: Source::Network,
        })
    }
}

fn context_from_cache(entry: &CacheEntry, now: DateTime<Utc>) -> Result<CityContext, PrepareError> {
    let zone = load_zone(&entry.timezone_id).map_err(|source| PrepareError::InvalidCachedZone {
        city: entry.city.clone(),
        source,
    })?;

    Ok(CityContext {
        city: entry.city.clone(),
        display_name: entry.display_name.clone(),
        coordinates: entry.coordinates()?,
        timezone_id: entry.timezone_id.clone(),
        zone,
        local_now: now.with_timezone(&zone),
        source: Source::Cache,
    })
}
