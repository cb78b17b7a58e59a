//! Request and response codecs for map operations.
//!
//! Fixed-size fields (thread ids, timeouts, flags) live in the initial frame;
//! the map name, keys, values and predicates follow as separate frames.
//! Predicates travel as opaque payloads and are resolved by the member.

use uuid::Uuid;

use super::constants::*;
use super::frame::Frame;
use super::ClientMessage;
use crate::data::Data;
use crate::error::{HazelmapError, Result};

/// A decoded map request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapRequest {
    /// Read the value of a key.
    Get { name: String, key: Data, thread_id: i64 },
    /// Write a value, returning the previous one. `ttl_ms`: -1 map default, 0 no expiry.
    Put { name: String, key: Data, value: Data, thread_id: i64, ttl_ms: i64 },
    /// Write a value without returning the previous one.
    Set { name: String, key: Data, value: Data, thread_id: i64, ttl_ms: i64 },
    /// Write only if the key has no value.
    PutIfAbsent { name: String, key: Data, value: Data, thread_id: i64, ttl_ms: i64 },
    /// Write a cache-only value that is not backed up.
    PutTransient { name: String, key: Data, value: Data, thread_id: i64, ttl_ms: i64 },
    /// Write, giving up after `timeout_ms` if the key stays locked.
    TryPut { name: String, key: Data, value: Data, thread_id: i64, timeout_ms: i64 },
    /// Remove a key, returning its value.
    Remove { name: String, key: Data, thread_id: i64 },
    /// Remove a key only if it maps to `value`.
    RemoveIfSame { name: String, key: Data, value: Data, thread_id: i64 },
    /// Remove, failing with a timeout if the key stays locked for `timeout_ms`.
    TryRemove { name: String, key: Data, thread_id: i64, timeout_ms: i64 },
    /// Replace the value of an existing key.
    Replace { name: String, key: Data, value: Data, thread_id: i64 },
    /// Replace the value only if it currently equals `expected`.
    ReplaceIfSame { name: String, key: Data, expected: Data, value: Data, thread_id: i64 },
    /// Check whether a key has a value.
    ContainsKey { name: String, key: Data, thread_id: i64 },
    /// Check whether any key maps to `value`.
    ContainsValue { name: String, value: Data },
    /// Acquire the key lock, waiting as long as needed.
    Lock { name: String, key: Data, thread_id: i64 },
    /// Acquire the key lock, waiting at most `timeout_ms` (0 = do not wait).
    TryLock { name: String, key: Data, thread_id: i64, timeout_ms: i64 },
    /// Release one hold of the key lock.
    Unlock { name: String, key: Data, thread_id: i64 },
    /// Release the key lock regardless of owner.
    ForceUnlock { name: String, key: Data },
    /// Check whether the key is locked.
    IsLocked { name: String, key: Data },
    /// Evict a key.
    Evict { name: String, key: Data, thread_id: i64 },
    /// Evict every key.
    EvictAll { name: String },
    /// Remove every key.
    Clear { name: String },
    /// Count live entries.
    Size { name: String },
    /// Keys matching an optional predicate.
    KeySet { name: String, predicate: Option<Data> },
    /// Values matching an optional predicate.
    Values { name: String, predicate: Option<Data> },
    /// Entries matching an optional predicate.
    EntrySet { name: String, predicate: Option<Data> },
    /// Register an entry listener for the calling connection.
    AddEntryListener {
        name: String,
        key: Option<Data>,
        predicate: Option<Data>,
        include_value: bool,
    },
    /// Remove a previously registered entry listener.
    RemoveEntryListener { name: String, registration_id: Uuid },
}

impl MapRequest {
    /// Returns the message type used on the wire for this request.
    pub fn message_type(&self) -> i32 {
        match self {
            MapRequest::Get { .. } => MAP_GET,
            MapRequest::Put { .. } => MAP_PUT,
            MapRequest::Set { .. } => MAP_SET,
            MapRequest::PutIfAbsent { .. } => MAP_PUT_IF_ABSENT,
            MapRequest::PutTransient { .. } => MAP_PUT_TRANSIENT,
            MapRequest::TryPut { .. } => MAP_TRY_PUT,
            MapRequest::Remove { .. } => MAP_REMOVE,
            MapRequest::RemoveIfSame { .. } => MAP_REMOVE_IF_SAME,
            MapRequest::TryRemove { .. } => MAP_TRY_REMOVE,
            MapRequest::Replace { .. } => MAP_REPLACE,
            MapRequest::ReplaceIfSame { .. } => MAP_REPLACE_IF_SAME,
            MapRequest::ContainsKey { .. } => MAP_CONTAINS_KEY,
            MapRequest::ContainsValue { .. } => MAP_CONTAINS_VALUE,
            MapRequest::Lock { .. } => MAP_LOCK,
            MapRequest::TryLock { .. } => MAP_TRY_LOCK,
            MapRequest::Unlock { .. } => MAP_UNLOCK,
            MapRequest::ForceUnlock { .. } => MAP_FORCE_UNLOCK,
            MapRequest::IsLocked { .. } => MAP_IS_LOCKED,
            MapRequest::Evict { .. } => MAP_EVICT,
            MapRequest::EvictAll { .. } => MAP_EVICT_ALL,
            MapRequest::Clear { .. } => MAP_CLEAR,
            MapRequest::Size { .. } => MAP_SIZE,
            MapRequest::KeySet { .. } => MAP_KEY_SET,
            MapRequest::Values { .. } => MAP_VALUES,
            MapRequest::EntrySet { .. } => MAP_ENTRY_SET,
            MapRequest::AddEntryListener { .. } => MAP_ADD_ENTRY_LISTENER,
            MapRequest::RemoveEntryListener { .. } => MAP_REMOVE_ENTRY_LISTENER,
        }
    }

    /// Returns the name of the map the request targets.
    pub fn map_name(&self) -> &str {
        match self {
            MapRequest::Get { name, .. }
            | MapRequest::Put { name, .. }
            | MapRequest::Set { name, .. }
            | MapRequest::PutIfAbsent { name, .. }
            | MapRequest::PutTransient { name, .. }
            | MapRequest::TryPut { name, .. }
            | MapRequest::Remove { name, .. }
            | MapRequest::RemoveIfSame { name, .. }
            | MapRequest::TryRemove { name, .. }
            | MapRequest::Replace { name, .. }
            | MapRequest::ReplaceIfSame { name, .. }
            | MapRequest::ContainsKey { name, .. }
            | MapRequest::ContainsValue { name, .. }
            | MapRequest::Lock { name, .. }
            | MapRequest::TryLock { name, .. }
            | MapRequest::Unlock { name, .. }
            | MapRequest::ForceUnlock { name, .. }
            | MapRequest::IsLocked { name, .. }
            | MapRequest::Evict { name, .. }
            | MapRequest::EvictAll { name }
            | MapRequest::Clear { name }
            | MapRequest::Size { name }
            | MapRequest::KeySet { name, .. }
            | MapRequest::Values { name, .. }
            | MapRequest::EntrySet { name, .. }
            | MapRequest::AddEntryListener { name, .. }
            | MapRequest::RemoveEntryListener { name, .. } => name,
        }
    }

    /// Encodes the request.
    pub fn encode(&self, correlation_id: i64, partition_id: i32) -> ClientMessage {
        let mut m = ClientMessage::new_request(self.message_type(), correlation_id, partition_id);
        m.add_frame(Frame::from_string(self.map_name()));

        match self {
            MapRequest::Get { key, thread_id, .. }
            | MapRequest::Remove { key, thread_id, .. }
            | MapRequest::ContainsKey { key, thread_id, .. }
            | MapRequest::Lock { key, thread_id, .. }
            | MapRequest::Unlock { key, thread_id, .. }
            | MapRequest::Evict { key, thread_id, .. } => {
                m.put_i64(*thread_id);
                m.add_frame(Frame::from_data(key));
            }
            MapRequest::Put { key, value, thread_id, ttl_ms, .. }
            | MapRequest::Set { key, value, thread_id, ttl_ms, .. }
            | MapRequest::PutIfAbsent { key, value, thread_id, ttl_ms, .. }
            | MapRequest::PutTransient { key, value, thread_id, ttl_ms, .. } => {
                m.put_i64(*thread_id);
                m.put_i64(*ttl_ms);
                m.add_frame(Frame::from_data(key));
                m.add_frame(Frame::from_data(value));
            }
            MapRequest::TryPut { key, value, thread_id, timeout_ms, .. } => {
                m.put_i64(*thread_id);
                m.put_i64(*timeout_ms);
                m.add_frame(Frame::from_data(key));
                m.add_frame(Frame::from_data(value));
            }
            MapRequest::RemoveIfSame { key, value, thread_id, .. }
            | MapRequest::Replace { key, value, thread_id, .. } => {
                m.put_i64(*thread_id);
                m.add_frame(Frame::from_data(key));
                m.add_frame(Frame::from_data(value));
            }
            MapRequest::TryRemove { key, thread_id, timeout_ms, .. }
            | MapRequest::TryLock { key, thread_id, timeout_ms, .. } => {
                m.put_i64(*thread_id);
                m.put_i64(*timeout_ms);
                m.add_frame(Frame::from_data(key));
            }
            MapRequest::ReplaceIfSame { key, expected, value, thread_id, .. } => {
                m.put_i64(*thread_id);
                m.add_frame(Frame::from_data(key));
                m.add_frame(Frame::from_data(expected));
                m.add_frame(Frame::from_data(value));
            }
            MapRequest::ContainsValue { value, .. } => {
                m.add_frame(Frame::from_data(value));
            }
            MapRequest::ForceUnlock { key, .. } | MapRequest::IsLocked { key, .. } => {
                m.add_frame(Frame::from_data(key));
            }
            MapRequest::EvictAll { .. } | MapRequest::Clear { .. } | MapRequest::Size { .. } => {}
            MapRequest::KeySet { predicate, .. }
            | MapRequest::Values { predicate, .. }
            | MapRequest::EntrySet { predicate, .. } => {
                m.add_frame(Frame::from_nullable_data(predicate.as_ref()));
            }
            MapRequest::AddEntryListener { key, predicate, include_value, .. } => {
                m.put_bool(*include_value);
                m.add_frame(Frame::from_nullable_data(key.as_ref()));
                m.add_frame(Frame::from_nullable_data(predicate.as_ref()));
            }
            MapRequest::RemoveEntryListener { registration_id, .. } => {
                m.put_uuid(*registration_id);
            }
        }
        m
    }

    /// Decodes a request message.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        let message_type = message
            .message_type()
            .ok_or_else(|| HazelmapError::Protocol("request without a header".to_string()))?;
        let mut f = message.fixed_fields();
        let mut frames = FrameCursor::new(message);
        let name = frames.string("name")?;

        let request = match message_type {
            MAP_GET => MapRequest::Get {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                name,
            },
            MAP_PUT | MAP_SET | MAP_PUT_IF_ABSENT | MAP_PUT_TRANSIENT => {
                let thread_id = f.read_i64("thread_id")?;
                let ttl_ms = f.read_i64("ttl")?;
                let key = frames.data("key")?;
                let value = frames.data("value")?;
                match message_type {
                    MAP_PUT => MapRequest::Put { name, key, value, thread_id, ttl_ms },
                    MAP_SET => MapRequest::Set { name, key, value, thread_id, ttl_ms },
                    MAP_PUT_IF_ABSENT => MapRequest::PutIfAbsent { name, key, value, thread_id, ttl_ms },
                    _ => MapRequest::PutTransient { name, key, value, thread_id, ttl_ms },
                }
            }
            MAP_TRY_PUT => MapRequest::TryPut {
                thread_id: f.read_i64("thread_id")?,
                timeout_ms: f.read_i64("timeout")?,
                key: frames.data("key")?,
                value: frames.data("value")?,
                name,
            },
            MAP_REMOVE => MapRequest::Remove {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                name,
            },
            MAP_REMOVE_IF_SAME => MapRequest::RemoveIfSame {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                value: frames.data("value")?,
                name,
            },
            MAP_TRY_REMOVE => MapRequest::TryRemove {
                thread_id: f.read_i64("thread_id")?,
                timeout_ms: f.read_i64("timeout")?,
                key: frames.data("key")?,
                name,
            },
            MAP_REPLACE => MapRequest::Replace {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                value: frames.data("value")?,
                name,
            },
            MAP_REPLACE_IF_SAME => MapRequest::ReplaceIfSame {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                expected: frames.data("expected")?,
                value: frames.data("value")?,
                name,
            },
            MAP_CONTAINS_KEY => MapRequest::ContainsKey {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                name,
            },
            MAP_CONTAINS_VALUE => MapRequest::ContainsValue {
                value: frames.data("value")?,
                name,
            },
            MAP_LOCK => MapRequest::Lock {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                name,
            },
            MAP_TRY_LOCK => MapRequest::TryLock {
                thread_id: f.read_i64("thread_id")?,
                timeout_ms: f.read_i64("timeout")?,
                key: frames.data("key")?,
                name,
            },
            MAP_UNLOCK => MapRequest::Unlock {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                name,
            },
            MAP_FORCE_UNLOCK => MapRequest::ForceUnlock {
                key: frames.data("key")?,
                name,
            },
            MAP_IS_LOCKED => MapRequest::IsLocked {
                key: frames.data("key")?,
                name,
            },
            MAP_EVICT => MapRequest::Evict {
                thread_id: f.read_i64("thread_id")?,
                key: frames.data("key")?,
                name,
            },
            MAP_EVICT_ALL => MapRequest::EvictAll { name },
            MAP_CLEAR => MapRequest::Clear { name },
            MAP_SIZE => MapRequest::Size { name },
            MAP_KEY_SET => MapRequest::KeySet {
                predicate: frames.nullable_data("predicate")?,
                name,
            },
            MAP_VALUES => MapRequest::Values {
                predicate: frames.nullable_data("predicate")?,
                name,
            },
            MAP_ENTRY_SET => MapRequest::EntrySet {
                predicate: frames.nullable_data("predicate")?,
                name,
            },
            MAP_ADD_ENTRY_LISTENER => MapRequest::AddEntryListener {
                include_value: f.read_bool("include_value")?,
                key: frames.nullable_data("key")?,
                predicate: frames.nullable_data("predicate")?,
                name,
            },
            MAP_REMOVE_ENTRY_LISTENER => MapRequest::RemoveEntryListener {
                registration_id: f.read_uuid("registration_id")?,
                name,
            },
            other => {
                return Err(HazelmapError::Protocol(format!(
                    "unknown map message type {other:#08x}"
                )))
            }
        };
        Ok(request)
    }
}

/// A map response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapResponse {
    /// No payload.
    Empty,
    /// A boolean outcome.
    Bool(bool),
    /// A count.
    Int(i32),
    /// A value that may be absent.
    Nullable(Option<Data>),
    /// A registration id.
    Uuid(Uuid),
    /// A collection of keys or values.
    DataList(Vec<Data>),
    /// A collection of key/value pairs.
    EntryList(Vec<(Data, Data)>),
}

impl MapResponse {
    /// Encodes the response to the request with the given type and correlation ID.
    pub fn encode(&self, request_type: i32, correlation_id: i64) -> ClientMessage {
        let mut m = ClientMessage::new_response(response_type(request_type), correlation_id);
        match self {
            MapResponse::Empty => {}
            MapResponse::Bool(b) => m.put_bool(*b),
            MapResponse::Int(i) => m.put_i32(*i),
            MapResponse::Nullable(value) => m.add_frame(Frame::from_nullable_data(value.as_ref())),
            MapResponse::Uuid(uuid) => m.put_uuid(*uuid),
            MapResponse::DataList(items) => {
                m.put_i32(items.len() as i32);
                for item in items {
                    m.add_frame(Frame::from_data(item));
                }
            }
            MapResponse::EntryList(entries) => {
                m.put_i32(entries.len() as i32);
                for (key, value) in entries {
                    m.add_frame(Frame::from_data(key));
                    m.add_frame(Frame::from_data(value));
                }
            }
        }
        m
    }

    /// Reads a boolean response.
    pub fn decode_bool(message: &ClientMessage) -> Result<bool> {
        check_not_error(message)?;
        message.fixed_fields().read_bool("response")
    }

    /// Reads a count response.
    pub fn decode_int(message: &ClientMessage) -> Result<i32> {
        check_not_error(message)?;
        message.fixed_fields().read_i32("response")
    }

    /// Reads a nullable value response.
    pub fn decode_nullable(message: &ClientMessage) -> Result<Option<Data>> {
        check_not_error(message)?;
        Ok(message.frame(1, "response")?.to_nullable_data())
    }

    /// Reads a registration id response.
    pub fn decode_uuid(message: &ClientMessage) -> Result<Uuid> {
        check_not_error(message)?;
        message.fixed_fields().read_uuid("response")
    }

    /// Reads a key or value collection response.
    pub fn decode_data_list(message: &ClientMessage) -> Result<Vec<Data>> {
        check_not_error(message)?;
        let count = message.fixed_fields().read_i32("count")?.max(0) as usize;
        (1..=count)
            .map(|i| message.frame(i, "item").map(Frame::to_data))
            .collect()
    }

    /// Reads an entry collection response.
    pub fn decode_entry_list(message: &ClientMessage) -> Result<Vec<(Data, Data)>> {
        check_not_error(message)?;
        let count = message.fixed_fields().read_i32("count")?.max(0) as usize;
        (0..count)
            .map(|i| {
                let key = message.frame(1 + 2 * i, "entry key")?.to_data();
                let value = message.frame(2 + 2 * i, "entry value")?.to_data();
                Ok((key, value))
            })
            .collect()
    }
}

/// Wire codes for errors returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Any error without a dedicated code.
    Undefined = 0,
    /// See [`HazelmapError::Timeout`].
    Timeout = 1,
    /// See [`HazelmapError::IllegalState`].
    IllegalState = 2,
    /// See [`HazelmapError::Unsupported`].
    Unsupported = 3,
    /// See [`HazelmapError::PermissionDenied`].
    PermissionDenied = 4,
    /// See [`HazelmapError::Protocol`].
    Protocol = 5,
}

impl ErrorCode {
    fn of(error: &HazelmapError) -> Self {
        match error {
            HazelmapError::Timeout(_) => ErrorCode::Timeout,
            HazelmapError::IllegalState(_) => ErrorCode::IllegalState,
            HazelmapError::Unsupported(_) => ErrorCode::Unsupported,
            HazelmapError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            HazelmapError::Protocol(_) => ErrorCode::Protocol,
            _ => ErrorCode::Undefined,
        }
    }
}

/// Encodes an error reply for the request with the given correlation ID.
pub fn encode_error(error: &HazelmapError, correlation_id: i64) -> ClientMessage {
    let mut m = ClientMessage::new_response(ERROR_RESPONSE, correlation_id);
    m.put_i32(ErrorCode::of(error) as i32);
    m.add_frame(Frame::from_string(&error.to_string()));
    m
}

/// Turns an error reply back into an error; other messages pass.
pub fn check_not_error(message: &ClientMessage) -> Result<()> {
    if message.message_type() != Some(ERROR_RESPONSE) {
        return Ok(());
    }
    let code = message.fixed_fields().read_i32("error_code")?;
    let text = message.frame(1, "error_message")?.to_string_value()?;
    Err(match code {
        c if c == ErrorCode::Timeout as i32 => HazelmapError::Timeout(text),
        c if c == ErrorCode::IllegalState as i32 => HazelmapError::IllegalState(text),
        c if c == ErrorCode::Unsupported as i32 => HazelmapError::Unsupported(text),
        c if c == ErrorCode::PermissionDenied as i32 => HazelmapError::PermissionDenied {
            action: String::new(),
            resource: text,
        },
        _ => HazelmapError::Protocol(text),
    })
}

struct FrameCursor<'a> {
    frames: &'a [Frame],
    next: usize,
}

impl<'a> FrameCursor<'a> {
    fn new(message: &'a ClientMessage) -> Self {
        Self {
            frames: message.frames(),
            next: 1,
        }
    }

    fn take(&mut self, field: &str) -> Result<&'a Frame> {
        let frame = self.frames.get(self.next).ok_or_else(|| {
            HazelmapError::Protocol(format!("request is missing the {field} frame"))
        })?;
        self.next += 1;
        Ok(frame)
    }

    fn string(&mut self, field: &str) -> Result<String> {
        self.take(field)?.to_string_value()
    }

    fn data(&mut self, field: &str) -> Result<Data> {
        let frame = self.take(field)?;
        if frame.is_null_frame() {
            return Err(HazelmapError::Protocol(format!("{field} must not be null")));
        }
        Ok(frame.to_data())
    }

    fn nullable_data(&mut self, field: &str) -> Result<Option<Data>> {
        Ok(self.take(field)?.to_nullable_data())
    }
}
