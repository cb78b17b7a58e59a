//! Opaque binary payloads for keys and values.
//!
//! The map never interprets key or value bytes. Equality is exact byte-sequence
//! equality, which is what compare-and-swap style operations rely on.

use std::fmt;

use bytes::Bytes;

use crate::protocol::compute_partition_hash;

/// An opaque, cheaply cloneable byte payload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Data(Bytes);

impl Data {
    /// Creates a payload from anything convertible into [`Bytes`].
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Creates a payload by copying the given slice.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload and returns the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Returns the partition this payload routes to when used as a key.
    pub fn partition_id(&self, partition_count: u32) -> u32 {
        if partition_count == 0 {
            return 0;
        }
        compute_partition_hash(&self.0).unsigned_abs() % partition_count
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if self.0.len() <= 64 => write!(f, "Data({s:?})"),
            _ => write!(f, "Data({} bytes)", self.0.len()),
        }
    }
}

impl From<Bytes> for Data {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Data {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Data {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
