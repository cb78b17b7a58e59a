//! Frame type for the map wire protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::constants::*;
use crate::data::Data;
use crate::error::{HazelmapError, Result};

/// A single frame of a message.
///
/// On the wire a frame is a 4-byte little-endian length (flags + content),
/// a 2-byte little-endian flags field, then the content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame content (payload after flags).
    pub content: BytesMut,
    /// Frame flags indicating frame type and properties.
    pub flags: u16,
}

impl Frame {
    /// Creates a new frame with the given content and flags.
    pub fn new(content: BytesMut, flags: u16) -> Self {
        Self { content, flags }
    }

    /// Creates a new empty frame with the given flags.
    pub fn with_flags(flags: u16) -> Self {
        Self::new(BytesMut::new(), flags)
    }

    /// Creates a new frame with the given capacity and flags.
    pub fn with_capacity(capacity: usize, flags: u16) -> Self {
        Self::new(BytesMut::with_capacity(capacity), flags)
    }

    /// Creates a null frame standing for an absent value.
    pub fn null() -> Self {
        Self::with_flags(IS_NULL_FLAG)
    }

    /// Creates a frame holding an opaque payload.
    pub fn from_data(data: &Data) -> Self {
        Self::new(BytesMut::from(data.as_bytes()), DEFAULT_FLAGS)
    }

    /// Creates a frame for an optional payload, using a null frame for `None`.
    pub fn from_nullable_data(data: Option<&Data>) -> Self {
        data.map(Self::from_data).unwrap_or_else(Self::null)
    }

    /// Creates a frame holding a UTF-8 string.
    pub fn from_string(s: &str) -> Self {
        Self::new(BytesMut::from(s.as_bytes()), DEFAULT_FLAGS)
    }

    /// Creates a frame holding a UUID (most significant bits first).
    pub fn from_uuid(uuid: Uuid) -> Self {
        let mut content = BytesMut::with_capacity(UUID_SIZE);
        content.put_slice(uuid.as_bytes());
        Self::new(content, DEFAULT_FLAGS)
    }

    /// Returns true if this frame has the BEGIN flag set.
    pub fn is_begin_frame(&self) -> bool {
        self.flags & BEGIN_FLAG != 0
    }

    /// Returns true if this frame has the END flag set.
    pub fn is_end_frame(&self) -> bool {
        self.flags & END_FLAG != 0
    }

    /// Returns true if this frame has the NULL flag set.
    pub fn is_null_frame(&self) -> bool {
        self.flags & IS_NULL_FLAG != 0
    }

    /// Returns true if this frame has the EVENT flag set.
    pub fn is_event_frame(&self) -> bool {
        self.flags & IS_EVENT_FLAG != 0
    }

    /// Reads the content as an opaque payload.
    pub fn to_data(&self) -> Data {
        Data::from(Bytes::copy_from_slice(&self.content))
    }

    /// Reads the content as an optional payload (`None` for null frames).
    pub fn to_nullable_data(&self) -> Option<Data> {
        if self.is_null_frame() {
            None
        } else {
            Some(self.to_data())
        }
    }

    /// Reads the content as a UTF-8 string.
    pub fn to_string_value(&self) -> Result<String> {
        std::str::from_utf8(&self.content)
            .map(str::to_owned)
            .map_err(|e| HazelmapError::Protocol(format!("invalid UTF-8 in string frame: {e}")))
    }

    /// Reads the content as a UUID.
    pub fn to_uuid(&self) -> Result<Uuid> {
        let bytes: [u8; UUID_SIZE] = self
            .content
            .get(..UUID_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| HazelmapError::Protocol("UUID frame too short".to_string()))?;
        Ok(Uuid::from_bytes(bytes))
    }

    /// Returns the size of this frame on the wire.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.content.len()
    }

    /// Returns the value written in the length field (flags + content).
    pub fn frame_length(&self) -> usize {
        SIZE_OF_FRAME_FLAGS_FIELD + self.content.len()
    }

    /// Writes this frame to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        dst.put_u32_le(self.frame_length() as u32);
        dst.put_u16_le(self.flags);
        dst.put_slice(&self.content);
    }

    /// Reads a frame from the given buffer.
    ///
    /// Returns `Ok(None)` if there isn't enough data for a complete frame yet.
    pub fn read_from(src: &mut BytesMut) -> Result<Option<Self>> {
        if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
            return Ok(None);
        }

        let frame_length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if frame_length < SIZE_OF_FRAME_FLAGS_FIELD {
            return Err(HazelmapError::Protocol(format!(
                "frame length {frame_length} is shorter than the flags field"
            )));
        }
        if src.len() < SIZE_OF_FRAME_LENGTH_FIELD + frame_length {
            return Ok(None);
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let flags = src.get_u16_le();
        let content = src.split_to(frame_length - SIZE_OF_FRAME_FLAGS_FIELD);
        Ok(Some(Self::new(content, flags)))
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::with_flags(DEFAULT_FLAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_frame() {
        let frame = Frame::from_nullable_data(None);
        assert!(frame.is_null_frame());
        assert_eq!(frame.to_nullable_data(), None);
    }

    #[test]
    fn test_data_frame_preserves_bytes() {
        let data = Data::from(vec![0u8, 159, 146, 150]);
        let frame = Frame::from_nullable_data(Some(&data));
        assert!(!frame.is_null_frame());
        assert_eq!(frame.to_nullable_data(), Some(data));
    }

    #[test]
    fn test_string_frame() {
        let frame = Frame::from_string("orders");
        assert_eq!(frame.to_string_value().unwrap(), "orders");

        let bad = Frame::new(BytesMut::from(&[0xffu8, 0xfe][..]), DEFAULT_FLAGS);
        assert!(bad.to_string_value().is_err());
    }

    #[test]
    fn test_uuid_frame() {
        let uuid = Uuid::new_v4();
        assert_eq!(Frame::from_uuid(uuid).to_uuid().unwrap(), uuid);
        assert!(Frame::from_string("short").to_uuid().is_err());
    }

    #[test]
    fn test_write_and_read_frame() {
        let frame = Frame::new(BytesMut::from(&b"payload"[..]), BEGIN_FLAG | END_FLAG);
        let mut buf = BytesMut::new();
        frame.write_to(&mut buf);
        assert_eq!(buf.len(), frame.wire_size());

        let read = Frame::read_from(&mut buf).unwrap().unwrap();
        assert_eq!(read, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_incomplete_frame() {
        let mut buf = BytesMut::from(&[0x10, 0x00, 0x00, 0x00, 0x00, 0x80, 0x01][..]);
        assert!(Frame::read_from(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn test_read_rejects_short_length() {
        let mut buf = BytesMut::from(&[0x01, 0x00, 0x00, 0x00, 0x00][..]);
        assert!(Frame::read_from(&mut buf).is_err());
    }
}
