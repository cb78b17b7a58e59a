//! Stored records and their metadata.

use std::time::{Duration, SystemTime};

use hazelmap_core::Data;
use tokio::time::Instant;

/// Time-to-live requested by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the map's configured default TTL.
    #[default]
    MapDefault,
    /// Never expire.
    Infinite,
    /// Expire after the given duration.
    After(Duration),
}

impl Ttl {
    /// Interprets a wire TTL: negative means map default, zero means infinite.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            m if m < 0 => Ttl::MapDefault,
            0 => Ttl::Infinite,
            m => Ttl::After(Duration::from_millis(m as u64)),
        }
    }

    /// Resolves against the map default. `None` means no expiry.
    pub fn resolve(self, map_default: Option<Duration>) -> Option<Duration> {
        match self {
            Ttl::MapDefault => map_default,
            Ttl::Infinite => None,
            Ttl::After(ttl) if ttl.is_zero() => None,
            Ttl::After(ttl) => Some(ttl),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

/// A stored value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct Record {
    value: Data,
    version: u64,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
    transient: bool,
    created: SystemTime,
    updated: SystemTime,
    accessed: SystemTime,
    hits: u64,
}

// A TTL too large to represent as an instant never expires.
fn deadline(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| now.checked_add(ttl))
}

impl Record {
    pub(crate) fn new(value: Data, ttl: Option<Duration>, transient: bool, now: Instant) -> Self {
        let wall = SystemTime::now();
        Self {
            value,
            version: 1,
            ttl,
            expires_at: deadline(now, ttl),
            transient,
            created: wall,
            updated: wall,
            accessed: wall,
            hits: 0,
        }
    }

    /// Replaces the value, bumping the version and restarting the TTL clock.
    pub(crate) fn update(&mut self, value: Data, ttl: Option<Duration>, transient: bool, now: Instant) -> Data {
        self.version += 1;
        self.ttl = ttl;
        self.expires_at = deadline(now, ttl);
        self.transient = transient;
        self.updated = SystemTime::now();
        std::mem::replace(&mut self.value, value)
    }

    /// Replaces the value but keeps the current expiry.
    pub(crate) fn replace_value(&mut self, value: Data) -> Data {
        self.version += 1;
        self.updated = SystemTime::now();
        std::mem::replace(&mut self.value, value)
    }

    pub(crate) fn touch(&mut self) {
        self.hits += 1;
        self.accessed = SystemTime::now();
    }

    /// Returns the stored value.
    pub fn value(&self) -> &Data {
        &self.value
    }

    /// Returns the version, starting at 1 and incremented on each write.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns `true` once the TTL deadline has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Returns the TTL deadline, if any.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` for records written with `put_transient`.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub(crate) fn view(&self, key: &Data) -> EntryView {
        EntryView {
            key: key.clone(),
            value: self.value.clone(),
            version: self.version,
            ttl: self.ttl,
            creation_time: self.created,
            last_update_time: self.updated,
            last_access_time: self.accessed,
            hits: self.hits,
            transient: self.transient,
        }
    }
}

/// A point-in-time snapshot of an entry and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    /// The key.
    pub key: Data,
    /// The value.
    pub value: Data,
    /// The record version.
    pub version: u64,
    /// The TTL the entry was written with.
    pub ttl: Option<Duration>,
    /// When the key was first written.
    pub creation_time: SystemTime,
    /// When the value last changed.
    pub last_update_time: SystemTime,
    /// When the value was last read.
    pub last_access_time: SystemTime,
    /// Number of reads.
    pub hits: u64,
    /// Whether the entry was written with `put_transient` and is not backed up.
    pub transient: bool,
}
