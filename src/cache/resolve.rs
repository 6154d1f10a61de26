//! Lookup of free-text city names against the cache, and TTL freshness

use chrono::{DateTime, Duration, Utc};

use super::entry::{CacheDocument, CacheEntry};

/// Default age, in days, after which an entry is stale for offline use
pub const DEFAULT_TTL_DAYS: i64 = 100;

/// Lowercased, trimmed form of a name
///
/// Uses `str::to_lowercase`, not locale-aware case folding.
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Finds the entry a user's query refers to
///
/// Tries the map key first, then every entry's canonical name and aliases,
/// all compared after normalization. The first match wins.
pub fn resolve<'a>(doc: &'a CacheDocument, query: &str) -> Option<&'a CacheEntry> {
    let key = normalize_key(query);

    if let Some(entry) = doc.get(&key) {
        return Some(entry);
    }

    doc.entries().find(|entry| {
        normalize_key(&entry.city) == key || entry.aliases.iter().any(|a| normalize_key(a) == key)
    })
}

/// Whether a cache hit may be used as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    pub fn is_stale(self) -> bool {
        self == Freshness::Stale
    }
}

/// Classifies an entry as fresh or stale at `now`
///
/// `now - updated_at > ttl` is stale; exactly `ttl` old is still fresh.
/// A missing or unparsable timestamp counts as stale.
pub fn freshness(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> Freshness {
    match entry.updated_at() {
        Some(updated) if now.signed_duration_since(updated) <= ttl => Freshness::Fresh,
        _ => Freshness::Stale,
    }
}
