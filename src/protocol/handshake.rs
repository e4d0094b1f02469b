//! RTMP client handshake
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+zero) --->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes) ---------------|
//!   |                                        |
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |                                        |
//!   |<------ S2 (1536 bytes) ---------------|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! This is the simple, unauthenticated exchange: S1 is echoed back verbatim
//! and S2 is read but not checked. The state machine does no I/O; the
//! session feeds it the bytes it reads.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Length of C0+C1 and of S0+S1
pub const C0C1_SIZE: usize = 1 + HANDSHAKE_SIZE;

/// Client handshake state machine
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Need to send C0C1
    Initial,
    /// Waiting for S0S1
    WaitingForS0S1,
    /// C2 sent, waiting for S2
    WaitingForS2,
    /// Handshake complete
    Done,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Initial,
        }
    }

    /// Check if handshake is complete
    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Bytes the next `process_*` call expects
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::WaitingForS0S1 => C0C1_SIZE,
            HandshakeState::WaitingForS2 => HANDSHAKE_SIZE,
            HandshakeState::Initial | HandshakeState::Done => 0,
        }
    }

    /// Build C0+C1: version byte, 4-byte big-endian timestamp, then zeros
    pub fn generate_c0c1(&mut self, timestamp: u32) -> Result<Bytes> {
        if self.state != HandshakeState::Initial {
            return Err(HandshakeError::InvalidState.into());
        }

        let mut buf = BytesMut::with_capacity(C0C1_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_u32(timestamp);
        buf.put_bytes(0, HANDSHAKE_SIZE - 4);

        self.state = HandshakeState::WaitingForS0S1;
        Ok(buf.freeze())
    }

    /// Consume S0+S1 and return C2 (an echo of S1)
    pub fn process_s0s1(&mut self, s0s1: &[u8]) -> Result<Bytes> {
        if self.state != HandshakeState::WaitingForS0S1 {
            return Err(HandshakeError::InvalidState.into());
        }
        check_len(s0s1, C0C1_SIZE)?;

        if s0s1[0] != RTMP_VERSION {
            tracing::debug!(version = s0s1[0], "Server answered with non-standard RTMP version");
        }

        self.state = HandshakeState::WaitingForS2;
        Ok(Bytes::copy_from_slice(&s0s1[1..]))
    }

    /// Consume S2
    pub fn process_s2(&mut self, s2: &[u8]) -> Result<()> {
        if self.state != HandshakeState::WaitingForS2 {
            return Err(HandshakeError::InvalidState.into());
        }
        check_len(s2, HANDSHAKE_SIZE)?;

        self.state = HandshakeState::Done;
        Ok(())
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

fn check_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(HandshakeError::InvalidLength {
            expected,
            actual: data.len(),
        }
        .into());
    }
    Ok(())
}
