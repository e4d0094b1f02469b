//! RTMP message types and parsing
//!
//! RTMP messages are classified into:
//! - Protocol Control Messages (types 1-6): Chunk/flow control
//! - Command Messages (type 20): AMF0-encoded invokes
//! - Data Messages (type 18): Metadata
//! - Audio/Video Messages (types 8, 9): Media data
//!
//! Command and data bodies are decoded as a nameless AMF0 object whose
//! properties are then read by position. AMF3 variants are not decoded and
//! surface as [`RtmpMessage::Unknown`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfObject, AmfValue, Amf0Encoder};
use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::RtmpPacket;
use crate::protocol::constants::*;

/// Parsed RTMP message
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2)
    Abort { csid: u32 },

    /// Acknowledgement (type 3)
    Acknowledgement { sequence: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit_type: u8 },

    /// Audio data (type 8)
    Audio { timestamp: u32, data: Bytes },

    /// Video data (type 9)
    Video { timestamp: u32, data: Bytes },

    /// AMF0 Data message (type 18) - onMetaData, @setDataFrame
    Data(DataMessage),

    /// AMF0 Command (type 20)
    Command(Command),

    /// Anything else, including AMF3 and aggregate messages
    Unknown { type_id: u8, data: Bytes },
}

/// User Control Event
#[derive(Debug, Clone, PartialEq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

/// AMF0 invoke
///
/// On the wire this is a sequence of values: name, transaction id, command
/// object, then any arguments. The fourth value (`arguments[0]`) carries
/// the created stream id in a createStream result and the info object in
/// onStatus.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Transaction ID
    pub transaction_id: f64,
    /// Command object (often null)
    pub command_object: AmfValue,
    /// Additional arguments
    pub arguments: Vec<AmfValue>,
}

/// Data message (@setDataFrame, onMetaData, etc.)
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    /// Handler name (e.g., "@setDataFrame", "onMetaData")
    pub name: String,
    /// Data values
    pub values: Vec<AmfValue>,
}

/// Validated onStatus info object
#[derive(Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub code: String,
    pub description: Option<String>,
}

impl RtmpMessage {
    /// Parse a message from a reassembled packet
    pub fn from_packet(packet: &RtmpPacket) -> Result<Self> {
        let mut payload = packet.payload.clone();

        match packet.message_type {
            MSG_SET_CHUNK_SIZE => {
                require_len(&payload, 4, "SetChunkSize")?;
                // The most significant bit is reserved
                Ok(RtmpMessage::SetChunkSize(payload.get_u32() & 0x7FFF_FFFF))
            }

            MSG_ABORT => {
                require_len(&payload, 4, "Abort")?;
                Ok(RtmpMessage::Abort {
                    csid: payload.get_u32(),
                })
            }

            MSG_ACKNOWLEDGEMENT => {
                require_len(&payload, 4, "Acknowledgement")?;
                Ok(RtmpMessage::Acknowledgement {
                    sequence: payload.get_u32(),
                })
            }

            MSG_USER_CONTROL => Ok(RtmpMessage::UserControl(UserControlEvent::parse(
                &mut payload,
            )?)),

            MSG_WINDOW_ACK_SIZE => {
                require_len(&payload, 4, "WindowAckSize")?;
                Ok(RtmpMessage::WindowAckSize(payload.get_u32()))
            }

            MSG_SET_PEER_BANDWIDTH => {
                require_len(&payload, 5, "SetPeerBandwidth")?;
                let size = payload.get_u32();
                let limit_type = payload.get_u8();
                Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
            }

            MSG_AUDIO => Ok(RtmpMessage::Audio {
                timestamp: packet.timestamp,
                data: payload,
            }),

            MSG_VIDEO => Ok(RtmpMessage::Video {
                timestamp: packet.timestamp,
                data: payload,
            }),

            MSG_DATA_AMF0 => Ok(RtmpMessage::Data(DataMessage::decode(&payload)?)),

            MSG_COMMAND_AMF0 => Ok(RtmpMessage::Command(Command::decode(&payload)?)),

            _ => Ok(RtmpMessage::Unknown {
                type_id: packet.message_type,
                data: payload,
            }),
        }
    }

    /// Encode message to (message type, payload)
    pub fn encode(&self) -> (u8, Bytes) {
        match self {
            RtmpMessage::SetChunkSize(size) => (MSG_SET_CHUNK_SIZE, u32_payload(*size)),
            RtmpMessage::Abort { csid } => (MSG_ABORT, u32_payload(*csid)),
            RtmpMessage::Acknowledgement { sequence } => {
                (MSG_ACKNOWLEDGEMENT, u32_payload(*sequence))
            }
            RtmpMessage::UserControl(event) => (MSG_USER_CONTROL, event.encode()),
            RtmpMessage::WindowAckSize(size) => (MSG_WINDOW_ACK_SIZE, u32_payload(*size)),
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                (MSG_SET_PEER_BANDWIDTH, buf.freeze())
            }
            RtmpMessage::Audio { data, .. } => (MSG_AUDIO, data.clone()),
            RtmpMessage::Video { data, .. } => (MSG_VIDEO, data.clone()),
            RtmpMessage::Data(data) => (MSG_DATA_AMF0, data.encode()),
            RtmpMessage::Command(cmd) => (MSG_COMMAND_AMF0, cmd.encode()),
            RtmpMessage::Unknown { type_id, data } => (*type_id, data.clone()),
        }
    }
}

impl UserControlEvent {
    fn parse(payload: &mut Bytes) -> Result<Self> {
        require_len(payload, 2, "UserControl")?;
        let event_type = payload.get_u16();

        let event = match event_type {
            UC_SET_BUFFER_LENGTH => {
                require_len(payload, 8, "SetBufferLength")?;
                let stream_id = payload.get_u32();
                let buffer_ms = payload.get_u32();
                UserControlEvent::SetBufferLength {
                    stream_id,
                    buffer_ms,
                }
            }
            UC_STREAM_BEGIN | UC_STREAM_EOF | UC_STREAM_DRY | UC_STREAM_IS_RECORDED
            | UC_PING_REQUEST | UC_PING_RESPONSE => {
                require_len(payload, 4, "UserControl")?;
                let value = payload.get_u32();
                match event_type {
                    UC_STREAM_BEGIN => UserControlEvent::StreamBegin(value),
                    UC_STREAM_EOF => UserControlEvent::StreamEof(value),
                    UC_STREAM_DRY => UserControlEvent::StreamDry(value),
                    UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(value),
                    UC_PING_REQUEST => UserControlEvent::PingRequest(value),
                    _ => UserControlEvent::PingResponse(value),
                }
            }
            _ => UserControlEvent::Unknown {
                event_type,
                data: payload.clone(),
            },
        };

        Ok(event)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(10);
        match self {
            UserControlEvent::StreamBegin(id) => {
                buf.put_u16(UC_STREAM_BEGIN);
                buf.put_u32(*id);
            }
            UserControlEvent::StreamEof(id) => {
                buf.put_u16(UC_STREAM_EOF);
                buf.put_u32(*id);
            }
            UserControlEvent::StreamDry(id) => {
                buf.put_u16(UC_STREAM_DRY);
                buf.put_u32(*id);
            }
            UserControlEvent::SetBufferLength {
                stream_id,
                buffer_ms,
            } => {
                buf.put_u16(UC_SET_BUFFER_LENGTH);
                buf.put_u32(*stream_id);
                buf.put_u32(*buffer_ms);
            }
            UserControlEvent::StreamIsRecorded(id) => {
                buf.put_u16(UC_STREAM_IS_RECORDED);
                buf.put_u32(*id);
            }
            UserControlEvent::PingRequest(ts) => {
                buf.put_u16(UC_PING_REQUEST);
                buf.put_u32(*ts);
            }
            UserControlEvent::PingResponse(ts) => {
                buf.put_u16(UC_PING_RESPONSE);
                buf.put_u32(*ts);
            }
            UserControlEvent::Unknown { event_type, data } => {
                buf.put_u16(*event_type);
                buf.put_slice(data);
            }
        }
        buf.freeze()
    }
}

impl Command {
    pub fn new(name: impl Into<String>, transaction_id: f64) -> Self {
        Self {
            name: name.into(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: Vec::new(),
        }
    }

    pub fn with_object(mut self, object: impl Into<AmfValue>) -> Self {
        self.command_object = object.into();
        self
    }

    pub fn with_arg(mut self, arg: impl Into<AmfValue>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    /// Transaction id as a registry key, if it is a non-negative integer
    pub fn invoke_id(&self) -> Option<u32> {
        let id = self.transaction_id;
        if id.is_finite() && id >= 0.0 && id <= u32::MAX as f64 && id.fract() == 0.0 {
            Some(id as u32)
        } else {
            None
        }
    }

    /// The value after the command object
    pub fn info(&self) -> Option<&AmfValue> {
        self.arguments.first()
    }

    /// Decode an AMF0 invoke body
    ///
    /// The whole payload must be consumed by the body.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(ProtocolError::InvalidCommand("empty invoke body".into()).into());
        }

        let body = decode_body(payload)?;
        let name = match body.at(0) {
            Some(AmfValue::String(s)) => s.clone(),
            _ => {
                return Err(ProtocolError::InvalidCommand("expected command name".into()).into())
            }
        };
        let transaction_id = body
            .at(1)
            .and_then(AmfValue::as_number)
            .ok_or_else(|| ProtocolError::MissingField(format!("{} transaction id", name)))?;

        let mut values = body.into_values().skip(2);
        let command_object = values.next().unwrap_or_default();
        let arguments = values.collect();

        Ok(Command {
            name,
            transaction_id,
            command_object,
            arguments,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = Amf0Encoder::new();
        encoder.encode(&AmfValue::String(self.name.clone()));
        encoder.encode(&AmfValue::Number(self.transaction_id));
        encoder.encode(&self.command_object);
        encoder.encode_all(&self.arguments);
        encoder.finish()
    }
}

impl DataMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<AmfValue>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Decode an AMF0 data body: a handler name followed by values
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(ProtocolError::InvalidPayload("empty data message".into()).into());
        }

        let body = decode_body(payload)?;
        let mut values = body.into_values();
        let name = match values.next() {
            Some(AmfValue::String(s)) => s,
            _ => String::new(),
        };

        Ok(DataMessage {
            name,
            values: values.collect(),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = Amf0Encoder::new();
        encoder.encode(&AmfValue::String(self.name.clone()));
        encoder.encode_all(&self.values);
        encoder.finish()
    }

    /// Whether an onMetaData object announces (video, audio) codecs
    pub fn codec_presence(&self) -> Option<(bool, bool)> {
        let props = match self.values.first()? {
            AmfValue::Object(o) | AmfValue::EcmaArray(o) => o,
            _ => return None,
        };
        Some((props.contains("videocodecid"), props.contains("audiocodecid")))
    }
}

impl StatusInfo {
    /// Validate the info object of an onStatus command
    ///
    /// The object must carry `level == "status"`; anything else (including a
    /// missing level or a non-object) is a failure carrying the server's
    /// description when present.
    pub fn from_amf(info: Option<&AmfValue>) -> Result<Self> {
        let props = match info {
            Some(AmfValue::Object(o)) => o,
            _ => return Err(ProtocolError::MissingField("onStatus info object".into()).into()),
        };

        let description = props
            .get("description")
            .and_then(AmfValue::as_str)
            .map(str::to_owned);

        match props.get("level").and_then(AmfValue::as_str) {
            Some(STATUS_LEVEL_OK) => {}
            level => {
                return Err(ProtocolError::InvalidStatus {
                    level: level.unwrap_or_default().to_owned(),
                    description: description.unwrap_or_default(),
                }
                .into())
            }
        }

        let code = props
            .get("code")
            .and_then(AmfValue::as_str)
            .unwrap_or_default()
            .to_owned();

        Ok(StatusInfo { code, description })
    }
}

fn decode_body(payload: &[u8]) -> Result<AmfObject> {
    let (body, used) = amf0::decode_object(payload, false)?;
    if used != payload.len() {
        return Err(ProtocolError::InvalidPayload(format!(
            "{} trailing bytes after AMF0 body",
            payload.len() - used
        ))
        .into());
    }
    Ok(body)
}

fn require_len(payload: &Bytes, len: usize, what: &str) -> Result<()> {
    if payload.len() < len {
        return Err(ProtocolError::InvalidPayload(format!(
            "{} needs {} bytes, got {}",
            what,
            len,
            payload.len()
        ))
        .into());
    }
    Ok(())
}

fn u32_payload(value: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(value);
    buf.freeze()
}
