//! Shared capabilities: expiration contracts, the generic index contract,
//! and the epoch-millisecond clock used across the engine.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod expiration;

/// Sentinel expiration timestamp meaning "never expires".
///
/// Nothing carrying this value is ever placed in an expiration heap; this is
/// the basis for supporting unbounded, non-expiring standing data.
pub const NEVER_EXPIRES: i64 = 0;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Converts a boundary TTL in whole seconds into an absolute epoch-millisecond
/// expiration. A TTL of `0` means the item never expires.
pub fn expiration_from_ttl(ttl_seconds: u64, now: i64) -> i64 {
    if ttl_seconds == 0 {
        NEVER_EXPIRES
    } else {
        now + (ttl_seconds as i64) * 1000
    }
}

/// `true` iff expiration `a` is strictly later than expiration `b`, treating
/// the sentinel as "infinitely late".
pub fn outlives(a: i64, b: i64) -> bool {
    if b == NEVER_EXPIRES {
        false
    } else {
        a == NEVER_EXPIRES || a > b
    }
}

/// Contract for tombstoneable, time-bounded objects.
///
/// An item reports its (immutable) expiration timestamp, can transition into
/// an inert tombstone exactly once, and reports whether that transition has
/// happened. `expire` must be idempotent: the first call performs the full
/// teardown, later calls are no-ops.
pub trait Expirable: Send + Sync {
    /// Absolute epoch-millisecond expiration, or [`NEVER_EXPIRES`].
    fn expiration_time(&self) -> i64;

    /// Turns the item into an inert tombstone, releasing whatever it owns.
    fn expire(&self);

    /// Whether the item has already been tombstoned.
    fn is_tombstone(&self) -> bool;
}

impl<T: Expirable + ?Sized> Expirable for Arc<T> {
    fn expiration_time(&self) -> i64 {
        (**self).expiration_time()
    }

    fn expire(&self) {
        (**self).expire();
    }

    fn is_tombstone(&self) -> bool {
        (**self).is_tombstone()
    }
}

/// Generic index contract used wherever a collection of expirable or
/// subscriber objects must be managed without depending on eviction policy.
pub trait Index<T> {
    /// Adds an item. Returns `false` if the item was not admitted (already
    /// present, or carries the never-expire sentinel for heap-backed indexes).
    fn add(&self, item: T) -> bool;

    /// Removes an item. Returns `false` if it was not present.
    fn remove(&self, item: &T) -> bool;

    /// Drops every item.
    fn clear(&self);

    /// Whether the index currently holds no live items.
    fn is_empty(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_conversion() {
        assert_eq!(expiration_from_ttl(0, 1_000), NEVER_EXPIRES);
        assert_eq!(expiration_from_ttl(5, 1_000), 6_000);
    }

    #[test]
    fn outlives_treats_sentinel_as_infinite() {
        assert!(outlives(NEVER_EXPIRES, 10));
        assert!(!outlives(10, NEVER_EXPIRES));
        assert!(!outlives(NEVER_EXPIRES, NEVER_EXPIRES));
        assert!(outlives(20, 10));
        assert!(!outlives(10, 10));
    }
}
