//! Durable key-value storage for cached documents.
//!
//! Each cached document occupies two keys: the serialized document and its
//! fetch time in epoch milliseconds. Backends only need string get/set.

pub mod file_storage;
pub mod memory_storage;

pub use file_storage::FileStore;
pub use memory_storage::MemoryStore;

use crate::error::CardlinkError;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

/// Per-origin persistent string store (the browser's localStorage, a JSON
/// file on disk, or memory in tests).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CardlinkError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CardlinkError>;

    fn remove(&self, key: &str) -> Result<(), CardlinkError>;

    /// Human-readable backend name for logging.
    fn strategy_name(&self) -> &'static str;
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        ManualClock {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_millis() {
        let now = SystemClock.now_ms();
        // 2020-01-01 in epoch ms
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
