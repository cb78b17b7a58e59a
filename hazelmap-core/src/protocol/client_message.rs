//! Multi-frame messages exchanged between clients and the member.

use bytes::{BufMut, BytesMut};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use super::constants::*;
use super::frame::Frame;
use crate::error::{HazelmapError, Result};

static CORRELATION_ID_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Generates a unique correlation ID for a member-initiated message.
pub fn next_correlation_id() -> i64 {
    CORRELATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A message composed of one or more frames.
///
/// The initial frame carries the header (message type, correlation ID and,
/// for requests and events, a partition ID) followed by fixed-size fields.
/// Variable-size fields (strings, payloads) follow as separate frames.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientMessage {
    frames: Vec<Frame>,
}

impl ClientMessage {
    /// Creates a request message with the given type and partition ID.
    pub fn new_request(message_type: i32, correlation_id: i64, partition_id: i32) -> Self {
        let mut initial = Frame::with_capacity(REQUEST_HEADER_SIZE, BEGIN_FLAG);
        initial.content.put_i32_le(message_type);
        initial.content.put_i64_le(correlation_id);
        initial.content.put_i32_le(partition_id);
        Self::from_frames(vec![initial])
    }

    /// Creates a response to the request with the given correlation ID.
    pub fn new_response(message_type: i32, correlation_id: i64) -> Self {
        let mut initial = Frame::with_capacity(RESPONSE_HEADER_SIZE, BEGIN_FLAG | IS_FINAL_FLAG);
        initial.content.put_i32_le(message_type);
        initial.content.put_i64_le(correlation_id);
        initial.content.put_u8(0);
        Self::from_frames(vec![initial])
    }

    /// Creates an out-of-band event message.
    pub fn new_event(message_type: i32, partition_id: i32) -> Self {
        let mut initial = Frame::with_capacity(EVENT_HEADER_SIZE, BEGIN_FLAG | IS_EVENT_FLAG);
        initial.content.put_i32_le(message_type);
        initial.content.put_i64_le(next_correlation_id());
        initial.content.put_i32_le(partition_id);
        Self::from_frames(vec![initial])
    }

    /// Creates a message from received frames.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Returns the message type from the initial frame.
    pub fn message_type(&self) -> Option<i32> {
        self.initial_content()
            .and_then(|c| c.get(TYPE_FIELD_OFFSET..TYPE_FIELD_OFFSET + 4))
            .and_then(|b| b.try_into().ok())
            .map(i32::from_le_bytes)
    }

    /// Returns the correlation ID from the initial frame.
    pub fn correlation_id(&self) -> Option<i64> {
        self.initial_content()
            .and_then(|c| c.get(CORRELATION_ID_OFFSET..CORRELATION_ID_OFFSET + 8))
            .and_then(|b| b.try_into().ok())
            .map(i64::from_le_bytes)
    }

    /// Returns the partition ID from the initial frame of a request or event.
    pub fn partition_id(&self) -> Option<i32> {
        if self.is_response() {
            return None;
        }
        self.initial_content()
            .and_then(|c| c.get(PARTITION_ID_OFFSET..PARTITION_ID_OFFSET + 4))
            .and_then(|b| b.try_into().ok())
            .map(i32::from_le_bytes)
    }

    /// Appends a fixed-size `i32` field to the initial frame.
    pub fn put_i32(&mut self, value: i32) {
        if let Some(initial) = self.frames.first_mut() {
            initial.content.put_i32_le(value);
        }
    }

    /// Appends a fixed-size `i64` field to the initial frame.
    pub fn put_i64(&mut self, value: i64) {
        if let Some(initial) = self.frames.first_mut() {
            initial.content.put_i64_le(value);
        }
    }

    /// Appends a fixed-size boolean field to the initial frame.
    pub fn put_bool(&mut self, value: bool) {
        if let Some(initial) = self.frames.first_mut() {
            initial.content.put_u8(u8::from(value));
        }
    }

    /// Appends a fixed-size UUID field to the initial frame.
    pub fn put_uuid(&mut self, value: Uuid) {
        if let Some(initial) = self.frames.first_mut() {
            initial.content.put_slice(value.as_bytes());
        }
    }

    /// Returns a cursor over the fixed-size fields that follow the header.
    pub fn fixed_fields(&self) -> FixedFields<'_> {
        let header = if self.is_response() {
            RESPONSE_HEADER_SIZE
        } else {
            REQUEST_HEADER_SIZE
        };
        FixedFields {
            content: self.initial_content().unwrap_or(&[]),
            offset: header,
        }
    }

    /// Adds a frame to the message.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns the frame at `index`, or a protocol error naming the missing field.
    pub fn frame(&self, index: usize, field: &str) -> Result<&Frame> {
        self.frames.get(index).ok_or_else(|| {
            HazelmapError::Protocol(format!("message is missing the {field} frame"))
        })
    }

    /// Returns a reference to all frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns the number of frames in the message.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(Frame::wire_size).sum()
    }

    /// Writes all frames to the destination buffer, marking the last as END.
    pub fn write_to(&mut self, dst: &mut BytesMut) {
        if let Some(last) = self.frames.last_mut() {
            last.flags |= END_FLAG;
        }
        for frame in &self.frames {
            frame.write_to(dst);
        }
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.frames.first().is_some_and(Frame::is_event_frame)
    }

    /// Returns true if this message is a response.
    pub fn is_response(&self) -> bool {
        self.frames.first().is_some_and(|f| f.flags & IS_FINAL_FLAG != 0)
    }

    fn initial_content(&self) -> Option<&[u8]> {
        self.frames.first().map(|f| &f.content[..])
    }
}

/// Sequential reader over the fixed-size fields of an initial frame.
#[derive(Debug)]
pub struct FixedFields<'a> {
    content: &'a [u8],
    offset: usize,
}

impl<'a> FixedFields<'a> {
    fn take<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        let bytes = self
            .content
            .get(self.offset..self.offset + N)
            .and_then(|b| <[u8; N]>::try_from(b).ok())
            .ok_or_else(|| {
                HazelmapError::Protocol(format!("initial frame too short for field {field}"))
            })?;
        self.offset += N;
        Ok(bytes)
    }

    /// Reads the next `i32` field.
    pub fn read_i32(&mut self, field: &str) -> Result<i32> {
        self.take::<4>(field).map(i32::from_le_bytes)
    }

    /// Reads the next `i64` field.
    pub fn read_i64(&mut self, field: &str) -> Result<i64> {
        self.take::<8>(field).map(i64::from_le_bytes)
    }

    /// Reads the next boolean field.
    pub fn read_bool(&mut self, field: &str) -> Result<bool> {
        self.take::<1>(field).map(|b| b[0] != 0)
    }

    /// Reads the next UUID field.
    pub fn read_uuid(&mut self, field: &str) -> Result<Uuid> {
        self.take::<UUID_SIZE>(field).map(Uuid::from_bytes)
    }
}

/// Computes a partition hash for the given key bytes.
///
/// MurmurHash3 x86 32-bit with the protocol's fixed seed.
pub fn compute_partition_hash(key: &[u8]) -> i32 {
    murmur_hash3_x86_32(key, 0x01000193)
}

fn murmur_hash3_x86_32(data: &[u8], seed: u32) -> i32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    fn mix(k1: u32) -> u32 {
        k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
    }

    let mut h1 = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k1 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h1 ^= mix(k1);
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let k1 = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, b)| acc ^ ((*b as u32) << (8 * i)));
        h1 ^= mix(k1);
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;
    h1 as i32
}
