//! Encoding of entry event push messages.

use uuid::Uuid;

use super::constants::*;
use super::frame::Frame;
use super::ClientMessage;
use crate::data::Data;
use crate::error::{HazelmapError, Result};
use crate::event::EntryEventType;

/// Number of affected entries reported for a single-key event.
pub const SINGLE_ENTRY_AFFECTED: i32 = 1;

/// Fields of an entry event push message.
///
/// Layout: the initial frame carries `event_type`, `member_id`,
/// `affected_count` and `registration_id` as fixed fields; the key, new value
/// and old value follow as nullable data frames, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryEventParameters {
    /// Registration the push is addressed to.
    pub registration_id: Uuid,
    /// Key of the mutated entry.
    pub key: Option<Data>,
    /// Value after the mutation, if included.
    pub new_value: Option<Data>,
    /// Value before the mutation, if included.
    pub old_value: Option<Data>,
    /// Kind of mutation.
    pub event_type: EntryEventType,
    /// Member on which the mutation happened.
    pub member_id: Uuid,
    /// Number of entries the event covers.
    pub affected_count: i32,
}

impl EntryEventParameters {
    /// Encodes a single-key event.
    ///
    /// Map-wide events carry no key/value pair and have no agreed encoding for
    /// the missing fields, so they are rejected with [`HazelmapError::Unsupported`].
    pub fn encode(&self, partition_id: i32) -> Result<ClientMessage> {
        if self.event_type.is_map_wide() {
            return Err(HazelmapError::Unsupported(format!(
                "encoding of map-wide {} events",
                self.event_type
            )));
        }
        let key = self.key.as_ref().ok_or_else(|| {
            HazelmapError::Protocol(format!("{} event without a key", self.event_type))
        })?;

        let mut message = ClientMessage::new_event(MAP_ENTRY_EVENT, partition_id);
        message.put_i32(self.event_type.code());
        message.put_uuid(self.member_id);
        message.put_i32(self.affected_count);
        message.put_uuid(self.registration_id);
        message.add_frame(Frame::from_data(key));
        message.add_frame(Frame::from_nullable_data(self.new_value.as_ref()));
        message.add_frame(Frame::from_nullable_data(self.old_value.as_ref()));
        Ok(message)
    }

    /// Decodes an event push produced by [`encode`](Self::encode).
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        if !message.is_event() || message.message_type() != Some(MAP_ENTRY_EVENT) {
            return Err(HazelmapError::Protocol(
                "message is not an entry event".to_string(),
            ));
        }

        let mut fields = message.fixed_fields();
        let code = fields.read_i32("event_type")?;
        let event_type = EntryEventType::from_code(code)
            .ok_or_else(|| HazelmapError::Protocol(format!("unknown entry event type {code}")))?;
        let member_id = fields.read_uuid("member_id")?;
        let affected_count = fields.read_i32("affected_count")?;
        let registration_id = fields.read_uuid("registration_id")?;

        Ok(Self {
            registration_id,
            key: message.frame(1, "key")?.to_nullable_data(),
            new_value: message.frame(2, "new_value")?.to_nullable_data(),
            old_value: message.frame(3, "old_value")?.to_nullable_data(),
            event_type,
            member_id,
            affected_count,
        })
    }
}
