//! Unified error types for rtmp-client

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all client operations
#[derive(Debug)]
pub enum Error {
    /// I/O error on the transport (short read/write, reset, ...)
    Io(io::Error),
    /// RTMP protocol violation
    Protocol(ProtocolError),
    /// AMF0 decoding error
    Amf(AmfError),
    /// Handshake failure
    Handshake(HandshakeError),
    /// Invoke bookkeeping error
    Invoke(InvokeError),
    /// Server answered a command with `_error`
    Rejected(String),
    /// Operation timed out
    Timeout,
    /// Peer closed the connection at a message boundary
    ConnectionClosed,
    /// Invalid configuration or URL
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Invoke(e) => write!(f, "Invoke error: {}", e),
            Error::Rejected(msg) => write!(f, "Command rejected: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Amf(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::Invoke(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl From<InvokeError> for Error {
    fn from(err: InvokeError) -> Self {
        Error::Invoke(err)
    }
}

/// Protocol-level errors
#[derive(Debug)]
pub enum ProtocolError {
    InvalidChunkHeader,
    UnknownMessageType(u8),
    MessageTooLarge { size: u32, max: u32 },
    /// Format 2/3 chunk on a chunk stream that never carried a full header
    MissingPreviousHeader(u32),
    /// Continuation chunk re-declared a different message length
    ChunkLengthMismatch { csid: u32, expected: u32, actual: u32 },
    InvalidPayload(String),
    InvalidCommand(String),
    MissingField(String),
    /// onStatus with a level other than "status"
    InvalidStatus { level: String, description: String },
    StreamNotCreated,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidChunkHeader => write!(f, "Invalid chunk header"),
            ProtocolError::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::MissingPreviousHeader(csid) => {
                write!(f, "No previous header on chunk stream {}", csid)
            }
            ProtocolError::ChunkLengthMismatch {
                csid,
                expected,
                actual,
            } => write!(
                f,
                "Chunk stream {} length changed mid-message: expected {}, got {}",
                csid, expected, actual
            ),
            ProtocolError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            ProtocolError::InvalidCommand(cmd) => write!(f, "Invalid command: {}", cmd),
            ProtocolError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ProtocolError::InvalidStatus { level, description } => {
                write!(f, "Status level '{}': {}", level, description)
            }
            ProtocolError::StreamNotCreated => write!(f, "No stream has been created"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum AmfError {
    UnknownMarker(u8),
    /// Marker is defined by AMF0 but not accepted here (MovieClip, Reference, ...)
    UnsupportedMarker(u8),
    UnexpectedEof,
    InvalidUtf8,
    NestingTooDeep,
    InvalidObjectEnd,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnknownMarker(m) => write!(f, "Unknown AMF marker: 0x{:02x}", m),
            AmfError::UnsupportedMarker(m) => write!(f, "Unsupported AMF marker: 0x{:02x}", m),
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::InvalidObjectEnd => write!(f, "Invalid object end marker"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake-specific errors
#[derive(Debug)]
pub enum HandshakeError {
    InvalidState,
    InvalidLength { expected: usize, actual: usize },
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidState => write!(f, "Invalid handshake state"),
            HandshakeError::InvalidLength { expected, actual } => {
                write!(f, "Handshake packet length {} (expected {})", actual, expected)
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Invoke registry errors
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeError {
    EmptyCommand,
    DuplicateId(u32),
    NotFound(u32),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeError::EmptyCommand => write!(f, "Invoke command name is empty"),
            InvokeError::DuplicateId(id) => write!(f, "Invoke id {} is already pending", id),
            InvokeError::NotFound(id) => write!(f, "No pending invoke for id {}", id),
        }
    }
}

impl std::error::Error for InvokeError {}
