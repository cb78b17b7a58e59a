//! Protocol constants for the map wire protocol.

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags).
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// Begin frame flag - marks the start of a message.
pub const BEGIN_FLAG: u16 = 1 << 15;

/// End frame flag - marks the end of a message.
pub const END_FLAG: u16 = 1 << 14;

/// Final flag - indicates the final response.
pub const IS_FINAL_FLAG: u16 = 1 << 13;

/// Event flag - marks an out-of-band event push.
pub const IS_EVENT_FLAG: u16 = 1 << 12;

/// Null frame flag - the frame stands for an absent value.
pub const IS_NULL_FLAG: u16 = 1 << 10;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Offset of message type in initial frame content.
pub const TYPE_FIELD_OFFSET: usize = 0;

/// Offset of correlation ID in initial frame content.
pub const CORRELATION_ID_OFFSET: usize = TYPE_FIELD_OFFSET + 4;

/// Offset of partition ID in request and event initial frames.
pub const PARTITION_ID_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the request initial frame header.
pub const REQUEST_HEADER_SIZE: usize = PARTITION_ID_OFFSET + 4;

/// Offset of backup acks count in response initial frame.
pub const RESPONSE_BACKUP_ACKS_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the response initial frame header.
pub const RESPONSE_HEADER_SIZE: usize = RESPONSE_BACKUP_ACKS_OFFSET + 1;

/// Size of the event initial frame header.
pub const EVENT_HEADER_SIZE: usize = PARTITION_ID_OFFSET + 4;

/// Partition ID indicating no specific partition (-1).
pub const PARTITION_ID_ANY: i32 = -1;

/// Size of an encoded UUID (two big-endian longs).
pub const UUID_SIZE: usize = 16;

/// Response message type for an error reply.
pub const ERROR_RESPONSE: i32 = 0x00_00_00;

// Map request message types. The response type is `request + 1` and the
// event type for listener registrations is `request + 2`.

/// Map put request.
pub const MAP_PUT: i32 = 0x01_01_00;
/// Map get request.
pub const MAP_GET: i32 = 0x01_02_00;
/// Map remove request.
pub const MAP_REMOVE: i32 = 0x01_03_00;
/// Map replace request.
pub const MAP_REPLACE: i32 = 0x01_04_00;
/// Map replace-if-same request.
pub const MAP_REPLACE_IF_SAME: i32 = 0x01_05_00;
/// Map contains key request.
pub const MAP_CONTAINS_KEY: i32 = 0x01_06_00;
/// Map contains value request.
pub const MAP_CONTAINS_VALUE: i32 = 0x01_07_00;
/// Map remove-if-same request.
pub const MAP_REMOVE_IF_SAME: i32 = 0x01_08_00;
/// Map try-remove request.
pub const MAP_TRY_REMOVE: i32 = 0x01_0B_00;
/// Map try-put request.
pub const MAP_TRY_PUT: i32 = 0x01_0C_00;
/// Map put-transient request.
pub const MAP_PUT_TRANSIENT: i32 = 0x01_0D_00;
/// Map put-if-absent request.
pub const MAP_PUT_IF_ABSENT: i32 = 0x01_0E_00;
/// Map set request.
pub const MAP_SET: i32 = 0x01_0F_00;
/// Map lock request.
pub const MAP_LOCK: i32 = 0x01_10_00;
/// Map try-lock request.
pub const MAP_TRY_LOCK: i32 = 0x01_11_00;
/// Map is-locked request.
pub const MAP_IS_LOCKED: i32 = 0x01_12_00;
/// Map unlock request.
pub const MAP_UNLOCK: i32 = 0x01_13_00;
/// Map add entry listener request (all keys, optional key and predicate).
pub const MAP_ADD_ENTRY_LISTENER: i32 = 0x01_19_00;
/// Entry event pushed to a listener registered with [`MAP_ADD_ENTRY_LISTENER`].
pub const MAP_ENTRY_EVENT: i32 = MAP_ADD_ENTRY_LISTENER + 2;
/// Map remove entry listener request.
pub const MAP_REMOVE_ENTRY_LISTENER: i32 = 0x01_1A_00;
/// Map evict request.
pub const MAP_EVICT: i32 = 0x01_1E_00;
/// Map evict-all request.
pub const MAP_EVICT_ALL: i32 = 0x01_1F_00;
/// Map key set request (optionally filtered by a predicate).
pub const MAP_KEY_SET: i32 = 0x01_22_00;
/// Map values request (optionally filtered by a predicate).
pub const MAP_VALUES: i32 = 0x01_24_00;
/// Map entry set request (optionally filtered by a predicate).
pub const MAP_ENTRY_SET: i32 = 0x01_25_00;
/// Map size request.
pub const MAP_SIZE: i32 = 0x01_2A_00;
/// Map clear request.
pub const MAP_CLEAR: i32 = 0x01_2D_00;
/// Map force-unlock request.
pub const MAP_FORCE_UNLOCK: i32 = 0x01_33_00;

/// Returns the response message type paired with a request type.
pub const fn response_type(request_type: i32) -> i32 {
    request_type + 1
}
