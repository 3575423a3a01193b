//! Cache key layout.
//!
//! All components build keys through these helpers so that invalidation
//! (flush, reaper, resync) hits exactly the keys the read paths populate.

use sha2::{Digest, Sha256};

/// Codes with a non-zero pending counter, for the counter sweep. Kept out of
/// the `clicks:{code}` space so no code's counter can alias it.
pub const DIRTY_COUNTERS_KEY: &str = "clicks:set:dirty";
/// Pre-generated codes waiting to be allocated.
pub const SLUG_POOL_KEY: &str = "slug:pool";
/// Guards against enqueuing several refills for one low-water crossing.
pub const POOL_REFILL_LOCK_KEY: &str = "slug:pool:refill_lock";

pub const POPULAR_KEY: &str = "stats:popular";
pub const RECENT_KEY: &str = "stats:recent";
pub const SYSTEM_STATS_KEY: &str = "stats:system";

/// Aggregates that may reference any code.
pub fn aggregate_keys() -> Vec<String> {
    vec![
        POPULAR_KEY.to_string(),
        RECENT_KEY.to_string(),
        SYSTEM_STATS_KEY.to_string(),
    ]
}

/// Cached [`crate::domain::entities::ShortLink`] record.
pub fn link_key(code: &str) -> String {
    format!("link:{}", code)
}

/// Reverse lookup from destination to code. The destination is hashed to keep
/// keys short and free of URL characters.
pub fn destination_key(destination: &str) -> String {
    format!("link:dest:{}", hex::encode(Sha256::digest(destination.as_bytes())))
}

/// Pending click counter.
pub fn counter_key(code: &str) -> String {
    format!("clicks:{}", code)
}

/// Unix timestamp of the last flush for a code.
pub fn last_flush_key(code: &str) -> String {
    format!("clicks:last_flush:{}", code)
}

/// Per-code guard serializing flushes.
pub fn flush_lock_key(code: &str) -> String {
    format!("clicks:lock:{}", code)
}

/// Every per-code key, for full invalidation.
pub fn code_keys(code: &str, destination: &str) -> Vec<String> {
    vec![
        link_key(code),
        destination_key(destination),
        counter_key(code),
        last_flush_key(code),
    ]
}
