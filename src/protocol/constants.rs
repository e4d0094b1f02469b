//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port
pub const RTMP_PORT: u16 = 1935;

/// Size of C1/S1/C2/S2
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size, in both directions, until SetChunkSize says otherwise
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest chunk size a SetChunkSize message may carry
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Message lengths are 24-bit on the wire
pub const MAX_MESSAGE_SIZE: u32 = 0xFF_FFFF;

/// Timestamps >= this value are sent in the extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFF_FFFF;

// ============================================================================
// Chunk Stream IDs (CSID)
// ============================================================================

/// Protocol control messages (Set Chunk Size, Window Ack, User Control)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, publish, ...)
pub const CSID_COMMAND: u32 = 3;

/// Audio data
pub const CSID_AUDIO: u32 = 4;

/// Video data
pub const CSID_VIDEO: u32 = 6;

/// play command, sent on its own chunk stream with the media stream id
pub const CSID_PLAY: u32 = 8;

/// Smallest and largest encodable chunk stream ids
pub const CSID_MIN: u32 = 2;
pub const CSID_MAX: u32 = 65599;

// ============================================================================
// Message Type IDs
// ============================================================================

pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_SHARED_OBJECT_AMF3: u8 = 16;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_SHARED_OBJECT_AMF0: u8 = 19;
pub const MSG_COMMAND_AMF0: u8 = 20;
pub const MSG_AGGREGATE: u8 = 22;

/// Whether a message type id falls in the range this client accepts
pub fn is_valid_message_type(message_type: u8) -> bool {
    (MSG_SET_CHUNK_SIZE..=MSG_AGGREGATE).contains(&message_type)
}

/// Protocol control and user control messages
pub fn is_control_message(message_type: u8) -> bool {
    (MSG_SET_CHUNK_SIZE..=MSG_SET_PEER_BANDWIDTH).contains(&message_type)
}

// ============================================================================
// User Control Event Types
// ============================================================================

pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_STREAM_DRY: u16 = 2;
pub const UC_SET_BUFFER_LENGTH: u16 = 3;
pub const UC_STREAM_IS_RECORDED: u16 = 4;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// ============================================================================
// Command Names
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_PLAY: &str = "play";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";

// Data commands
pub const CMD_SET_DATA_FRAME: &str = "@setDataFrame";
pub const CMD_ON_METADATA: &str = "onMetaData";

// ============================================================================
// NetStream Status Codes
// ============================================================================

pub const NS_PLAY_START: &str = "NetStream.Play.Start";
pub const NS_PLAY_STOP: &str = "NetStream.Play.Stop";
pub const NS_PLAY_UNPUBLISH_NOTIFY: &str = "NetStream.Play.UnpublishNotify";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_SEEK_NOTIFY: &str = "NetStream.Seek.Notify";
pub const NS_DATA_START: &str = "NetStream.Data.Start";

/// onStatus level that does not indicate a failure
pub const STATUS_LEVEL_OK: &str = "status";

// ============================================================================
// Connect Capabilities (read mode)
// ============================================================================

pub const CONNECT_CAPABILITIES: f64 = 15.0;

/// SUPPORT_SND_AAC
pub const CONNECT_AUDIO_CODECS: f64 = 1024.0;

/// SUPPORT_VID_H264
pub const CONNECT_VIDEO_CODECS: f64 = 128.0;

/// SUPPORT_VID_CLIENT_SEEK
pub const CONNECT_VIDEO_FUNCTION: f64 = 1.0;

/// Window acknowledgement size announced until the server sends its own
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;
