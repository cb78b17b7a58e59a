//! Per-map operation statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Point-in-time statistics of one map on this member.
///
/// Only calls that went through this member's executor are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalMapStats {
    /// Reads that found a value.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Write operations, including conditional writes that changed nothing.
    pub puts: u64,
    /// Read operations.
    pub gets: u64,
    /// Remove operations.
    pub removes: u64,
    /// Last read or write, `None` before the first one.
    pub last_access: Option<SystemTime>,
    /// Last write or remove.
    pub last_update: Option<SystemTime>,
    /// Live entries in partitions owned by this member.
    pub owned_entries: u64,
    /// Keys locked at snapshot time.
    pub locked_entries: u64,
}

impl LocalMapStats {
    /// Fraction of reads that hit, `0.0` before the first read.
    pub fn hit_ratio(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            reads => self.hits as f64 / reads as f64,
        }
    }

    /// Sum of gets, puts and removes.
    pub fn total_operations(&self) -> u64 {
        self.gets + self.puts + self.removes
    }
}

// Timestamps are stored as millis since the epoch; 0 means never.
#[derive(Debug, Default)]
pub(crate) struct MapStatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    gets: AtomicU64,
    removes: AtomicU64,
    last_access: AtomicU64,
    last_update: AtomicU64,
}

impl MapStatsTracker {
    pub fn record_get(&self, found: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let outcome = if found { &self.hits } else { &self.misses };
        outcome.fetch_add(1, Ordering::Relaxed);
        self.last_access.store(epoch_millis(), Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.mark_updated();
    }

    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
        self.mark_updated();
    }

    pub fn snapshot(&self, owned_entries: u64, locked_entries: u64) -> LocalMapStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        LocalMapStats {
            hits: load(&self.hits),
            misses: load(&self.misses),
            puts: load(&self.puts),
            gets: load(&self.gets),
            removes: load(&self.removes),
            last_access: from_epoch_millis(load(&self.last_access)),
            last_update: from_epoch_millis(load(&self.last_update)),
            owned_entries,
            locked_entries,
        }
    }

    fn mark_updated(&self) {
        let now = epoch_millis();
        self.last_update.store(now, Ordering::Relaxed);
        self.last_access.store(now, Ordering::Relaxed);
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| u64::try_from(since.as_millis()).unwrap_or(u64::MAX))
}

fn from_epoch_millis(millis: u64) -> Option<SystemTime> {
    (millis > 0).then(|| UNIX_EPOCH + Duration::from_millis(millis))
}
