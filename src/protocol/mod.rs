//! RTMP wire protocol implementation
//!
//! This module handles the low-level protocol details:
//! - Handshake (C0C1/S0S1/C2/S2 exchange)
//! - Chunk stream multiplexing and demultiplexing
//! - Message framing and parsing

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RtmpPacket};
pub use handshake::Handshake;
pub use message::{Command, DataMessage, RtmpMessage, StatusInfo, UserControlEvent};
