//! Local cache of resolved cities
//!
//! Resolved cities live in one JSON document shared by every process that runs
//! the tool. Reads never fail and never lock; writes are serialized by an
//! advisory lock file and land through an atomic rename, so a reader always
//! sees a complete document. Concurrent writers are last-writer-wins at the
//! document level.

pub mod atomic;
pub mod entry;
pub mod lock;
pub mod resolve;
mod store;

pub use entry::{builtin_aliases, CacheDocument, CacheEntry, Coordinates, EntryError};
pub use lock::{Deadline, FileLock, LockError, LockGuard, StopReason};
pub use resolve::{freshness, normalize_key, resolve, Freshness, DEFAULT_TTL_DAYS};
pub use store::{CacheError, CacheStore};
