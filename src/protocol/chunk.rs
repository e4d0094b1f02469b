//! RTMP chunk stream codec
//!
//! RTMP messages are split into chunks for multiplexing. Each chunk has a header
//! that identifies the chunk stream and message being sent.
//!
//! ```text
//! Chunk Format:
//! +-------------+----------------+-------------------+
//! | Basic Header| Message Header | Chunk Data        |
//! | (1-3 bytes) | (0,3,7,11 bytes)| (variable)       |
//! +-------------+----------------+-------------------+
//!
//! Basic Header formats:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 64-65599
//!
//! Message Header formats (based on fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4, LE)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  (use previous chunk's values)
//!
//! Extended timestamp (4 bytes, BE) follows when the field is 0xFFFFFF
//! ```
//!
//! The decoder reads straight from an async byte stream and keeps a partial
//! body per chunk stream, so messages interleaved across chunk streams are
//! reassembled independently.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::*;

/// A complete RTMP message (reassembled from chunks)
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpPacket {
    /// Chunk stream ID (for multiplexing)
    pub csid: u32,
    /// Message timestamp (milliseconds)
    pub timestamp: u32,
    /// Message type ID
    pub message_type: u8,
    /// Message stream ID
    pub stream_id: u32,
    /// Message payload
    pub payload: Bytes,
}

impl RtmpPacket {
    pub fn new(csid: u32, message_type: u8, stream_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            csid,
            timestamp: 0,
            message_type,
            stream_id,
            payload: payload.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Per-chunk-stream state for reassembly
#[derive(Debug, Default)]
struct ChunkStreamState {
    /// Whether a format 0/1 header has been seen on this chunk stream
    initialized: bool,
    /// Last timestamp (absolute)
    timestamp: u32,
    /// Last timestamp delta
    timestamp_delta: u32,
    /// Last message length
    message_length: u32,
    /// Last message type
    message_type: u8,
    /// Last message stream ID
    stream_id: u32,
    /// Whether the last header used the extended timestamp field
    has_extended_timestamp: bool,
    /// Buffer for partial message reassembly
    partial_message: BytesMut,
    /// Whether a message is mid-reassembly
    in_progress: bool,
}

impl ChunkStreamState {
    fn discard_partial(&mut self) {
        self.partial_message.clear();
        self.in_progress = false;
    }
}

/// Chunk stream decoder
///
/// Handles chunk demultiplexing and message reassembly.
pub struct ChunkDecoder {
    /// Maximum incoming chunk size
    chunk_size: u32,
    /// Per-chunk-stream state
    streams: HashMap<u32, ChunkStreamState>,
    /// Maximum message size (sanity limit)
    max_message_size: u32,
}

impl ChunkDecoder {
    /// Create a new decoder with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Set the chunk size (called when receiving SetChunkSize message)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Lower the largest message length accepted
    pub fn set_max_message_size(&mut self, size: u32) {
        self.max_message_size = size.min(MAX_MESSAGE_SIZE);
    }

    /// Read chunks until one message is complete
    ///
    /// End of stream before the first byte of a chunk, with no message
    /// mid-reassembly, is reported as [`Error::ConnectionClosed`]. Running
    /// out anywhere else is an I/O error.
    pub async fn read_message<R>(&mut self, reader: &mut R) -> Result<RtmpPacket>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let (fmt, csid) = self.read_basic_header(reader).await?;
            match self.read_chunk(reader, fmt, csid).await {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => continue,
                Err(e) => {
                    if let Some(state) = self.streams.get_mut(&csid) {
                        state.discard_partial();
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Read the basic header and return (fmt, csid)
    async fn read_basic_header<R>(&self, reader: &mut R) -> Result<(u8, u32)>
    where
        R: AsyncRead + Unpin,
    {
        let mut first = [0u8; 1];
        if reader.read(&mut first).await? == 0 {
            if self.streams.values().any(|s| s.in_progress) {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            return Err(Error::ConnectionClosed);
        }

        let fmt = (first[0] >> 6) & 0x03;
        let csid = match first[0] & 0x3F {
            0 => {
                // 2-byte header: csid = 64 + second byte
                64 + reader.read_u8().await? as u32
            }
            1 => {
                // 3-byte header: csid = 64 + second + third*256
                let b1 = reader.read_u8().await? as u32;
                let b2 = reader.read_u8().await? as u32;
                64 + b1 + b2 * 256
            }
            low => low as u32,
        };

        Ok((fmt, csid))
    }

    /// Read one chunk's message header and data
    ///
    /// Returns the message once its last chunk has been read.
    async fn read_chunk<R>(
        &mut self,
        reader: &mut R,
        fmt: u8,
        csid: u32,
    ) -> Result<Option<RtmpPacket>>
    where
        R: AsyncRead + Unpin,
    {
        let chunk_size = self.chunk_size;
        let max_message_size = self.max_message_size;
        let state = self.streams.entry(csid).or_default();

        if fmt >= 2 && !state.initialized {
            return Err(ProtocolError::MissingPreviousHeader(csid).into());
        }

        let mut header = [0u8; 11];
        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        reader.read_exact(&mut header[..header_len]).await?;

        let timestamp_field = if fmt < 3 { read_u24(&header[0..3]) } else { 0 };
        let declared = if fmt < 2 {
            let length = read_u24(&header[3..6]);
            let message_type = header[6];
            if !is_valid_message_type(message_type) {
                return Err(ProtocolError::UnknownMessageType(message_type).into());
            }
            Some((length, message_type))
        } else {
            None
        };

        let extended = if fmt < 3 {
            timestamp_field >= EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            state.has_extended_timestamp
        };
        let timestamp = if extended {
            reader.read_u32().await?
        } else {
            timestamp_field
        };

        if state.in_progress {
            // Continuation of a message already mid-reassembly; the header
            // may restate the length but must not change it.
            if let Some((length, _)) = declared {
                if length != state.message_length {
                    let expected = state.message_length;
                    state.discard_partial();
                    return Err(ProtocolError::ChunkLengthMismatch {
                        csid,
                        expected,
                        actual: length,
                    }
                    .into());
                }
            }
        } else {
            match fmt {
                0 => {
                    state.timestamp = timestamp;
                    state.timestamp_delta = timestamp;
                    state.stream_id =
                        u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
                }
                1 | 2 => {
                    state.timestamp_delta = timestamp;
                    state.timestamp = state.timestamp.wrapping_add(timestamp);
                }
                _ => {
                    if extended {
                        state.timestamp_delta = timestamp;
                    }
                    state.timestamp = state.timestamp.wrapping_add(state.timestamp_delta);
                }
            }
            if let Some((length, message_type)) = declared {
                state.message_length = length;
                state.message_type = message_type;
            }
            state.initialized = true;
            state.has_extended_timestamp = extended;

            if state.message_length > max_message_size {
                return Err(ProtocolError::MessageTooLarge {
                    size: state.message_length,
                    max: max_message_size,
                }
                .into());
            }

            if state.message_length == 0 {
                return Ok(Some(RtmpPacket {
                    csid,
                    timestamp: state.timestamp,
                    message_type: state.message_type,
                    stream_id: state.stream_id,
                    payload: Bytes::new(),
                }));
            }

            state.partial_message.clear();
            state.partial_message.reserve(state.message_length as usize);
            state.in_progress = true;
        }

        let remaining = state.message_length as usize - state.partial_message.len();
        let chunk_data_len = remaining.min(chunk_size as usize);

        let start = state.partial_message.len();
        state.partial_message.resize(start + chunk_data_len, 0);
        reader
            .read_exact(&mut state.partial_message[start..])
            .await?;

        if state.partial_message.len() < state.message_length as usize {
            return Ok(None);
        }

        state.in_progress = false;
        Ok(Some(RtmpPacket {
            csid,
            timestamp: state.timestamp,
            message_type: state.message_type,
            stream_id: state.stream_id,
            payload: state.partial_message.split().freeze(),
        }))
    }

    /// Abort a message on a chunk stream (when receiving Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.discard_partial();
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk stream encoder
///
/// Every message starts with a format 0 header; its continuation chunks
/// use format 3.
pub struct ChunkEncoder {
    /// Outgoing chunk size
    chunk_size: u32,
}

impl ChunkEncoder {
    /// Create a new encoder with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the chunk size (call before encoding to use larger chunks)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message into chunks
    pub fn encode(&self, packet: &RtmpPacket, buf: &mut BytesMut) -> Result<()> {
        if !(CSID_MIN..=CSID_MAX).contains(&packet.csid) {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }
        let payload_len = packet.payload.len();
        if payload_len > MAX_MESSAGE_SIZE as usize {
            return Err(ProtocolError::MessageTooLarge {
                size: payload_len as u32,
                max: MAX_MESSAGE_SIZE,
            }
            .into());
        }

        let chunk_size = self.chunk_size as usize;
        let needs_extended = packet.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let chunk_count = payload_len.div_ceil(chunk_size).max(1);
        buf.reserve(payload_len + 3 + 11 + 4 + (chunk_count - 1) * 7);

        write_basic_header(packet.csid, 0, buf);
        write_u24(packet.timestamp.min(EXTENDED_TIMESTAMP_THRESHOLD), buf);
        write_u24(payload_len as u32, buf);
        buf.put_u8(packet.message_type);
        buf.put_u32_le(packet.stream_id);

        let mut offset = 0;
        loop {
            if needs_extended {
                buf.put_u32(packet.timestamp);
            }

            let chunk_data_len = (payload_len - offset).min(chunk_size);
            buf.put_slice(&packet.payload[offset..offset + chunk_data_len]);
            offset += chunk_data_len;

            if offset >= payload_len {
                break;
            }
            write_basic_header(packet.csid, 3, buf);
        }

        Ok(())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write basic header
fn write_basic_header(csid: u32, fmt: u8, buf: &mut BytesMut) {
    if csid >= 64 + 256 {
        // 3-byte header
        buf.put_u8((fmt << 6) | 1);
        let csid_offset = csid - 64;
        buf.put_u8((csid_offset & 0xFF) as u8);
        buf.put_u8(((csid_offset >> 8) & 0xFF) as u8);
    } else if csid >= 64 {
        // 2-byte header
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        // 1-byte header
        buf.put_u8((fmt << 6) | (csid as u8));
    }
}

/// Write 24-bit big-endian value
fn write_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8(((value >> 16) & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8((value & 0xFF) as u8);
}

fn read_u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32)
}
