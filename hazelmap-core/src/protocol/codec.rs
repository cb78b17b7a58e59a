//! Framing codec for [`ClientMessage`] streams.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::Frame;
use super::ClientMessage;
use crate::error::{HazelmapError, Result};

/// Codec that turns a byte stream into whole messages and back.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits so a
/// transport can wrap its socket in `Framed`.
#[derive(Debug, Default)]
pub struct ClientMessageCodec {
    pending_frames: Vec<Frame>,
    in_message: bool,
}

impl ClientMessageCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = HazelmapError;

    fn encode(&mut self, mut item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        if item.is_empty() {
            return Err(HazelmapError::Protocol(
                "cannot encode empty message".to_string(),
            ));
        }
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = HazelmapError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while let Some(frame) = Frame::read_from(src)? {
            if frame.is_begin_frame() {
                self.pending_frames.clear();
                self.in_message = true;
            }
            if !self.in_message {
                // Stray frame outside a message; drop it.
                continue;
            }

            let is_end = frame.is_end_frame();
            self.pending_frames.push(frame);
            if is_end {
                self.in_message = false;
                let frames = std::mem::take(&mut self.pending_frames);
                return Ok(Some(ClientMessage::from_frames(frames)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut codec = ClientMessageCodec::new();
        let mut original = ClientMessage::new_request(MAP_PUT, 9, 12);
        original.put_i64(-1);
        original.add_frame(Frame::from_string("orders"));

        let mut buf = BytesMut::new();
        codec.encode(original.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), Some(MAP_PUT));
        assert_eq!(decoded.correlation_id(), Some(9));
        assert_eq!(decoded.partition_id(), Some(12));
        assert_eq!(decoded.frame_count(), 2);
        assert_eq!(decoded.frames()[1].to_string_value().unwrap(), "orders");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_empty_message_fails() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.encode(ClientMessage::default(), &mut buf).is_err());
    }

    #[test]
    fn test_decode_partial_input_waits() {
        let mut codec = ClientMessageCodec::new();
        let mut msg = ClientMessage::new_request(MAP_GET, 1, 0);
        msg.add_frame(Frame::from_string("m"));
        let mut full = BytesMut::new();
        msg.write_to(&mut full);

        let mut buf = full.split_to(full.len() - 1);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_decode_two_messages_back_to_back() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(ClientMessage::new_request(MAP_GET, 1, 0), &mut buf)
            .unwrap();
        codec
            .encode(ClientMessage::new_request(MAP_SIZE, 2, -1), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.correlation_id(), Some(1));
        assert_eq!(second.message_type(), Some(MAP_SIZE));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
