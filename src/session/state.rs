//! Client session state machine
//!
//! Tracks a client session from TCP connect to playback/publishing and
//! holds everything negotiated with the server along the way.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::protocol::constants::*;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Allocated, transport not yet handshaken
    New,
    /// Handshake complete
    Handshaken,
    /// connect sent, waiting for its result
    Connecting,
    /// createStream answered; stream id assigned
    StreamCreated,
    /// play or publish sent
    Active,
    /// Server reported a playing stream
    Playing,
    /// Server accepted the publish
    Publishing,
    /// A step failed; the session is unusable
    Failed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Current phase
    pub phase: SessionPhase,

    /// Negotiated chunk size (outgoing)
    pub out_chunk_size: u32,

    /// Window acknowledgement size
    pub window_ack_size: u32,

    /// Peer bandwidth and its limit type
    pub peer_bandwidth: u32,
    pub peer_bandwidth_limit: u8,

    /// Message stream id from the createStream result
    pub stream_id: Option<u32>,

    /// Set and cleared by onStatus codes
    pub playing: bool,

    pub has_audio: bool,
    pub has_video: bool,
    pub received_metadata: bool,

    /// Timestamp of the last PingRequest
    last_ping: AtomicU32,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::New,
            out_chunk_size: DEFAULT_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: 0,
            peer_bandwidth_limit: 0,
            stream_id: None,
            playing: false,
            has_audio: false,
            has_video: false,
            received_metadata: false,
            last_ping: AtomicU32::new(0),
        }
    }

    pub fn complete_handshake(&mut self) {
        if self.phase == SessionPhase::New {
            self.phase = SessionPhase::Handshaken;
        }
    }

    pub fn start_connect(&mut self) {
        self.phase = SessionPhase::Connecting;
    }

    pub fn stream_created(&mut self, stream_id: u32) {
        self.stream_id = Some(stream_id);
        self.phase = SessionPhase::StreamCreated;
    }

    /// play/publish has been sent
    pub fn start_stream(&mut self) {
        self.phase = SessionPhase::Active;
    }

    /// deleteStream sent; the connection stays up without a stream
    pub fn stream_deleted(&mut self) {
        self.stream_id = None;
        self.playing = false;
        self.phase = SessionPhase::Handshaken;
    }

    pub fn fail(&mut self) {
        self.phase = SessionPhase::Failed;
    }

    pub fn is_failed(&self) -> bool {
        self.phase == SessionPhase::Failed
    }

    /// Apply a NetStream status code
    ///
    /// Returns false for codes that do not affect the session.
    pub fn apply_status_code(&mut self, code: &str) -> bool {
        match code {
            NS_PLAY_START | NS_SEEK_NOTIFY | NS_DATA_START => {
                self.playing = true;
                self.phase = SessionPhase::Playing;
            }
            NS_PLAY_STOP | NS_PLAY_UNPUBLISH_NOTIFY => {
                self.playing = false;
                if self.phase == SessionPhase::Playing {
                    self.phase = SessionPhase::Active;
                }
            }
            NS_PUBLISH_START => {
                // `playing` stays false for publish sessions
                self.playing = false;
                self.phase = SessionPhase::Publishing;
            }
            _ => return false,
        }
        true
    }

    pub fn set_last_ping(&self, timestamp: u32) {
        self.last_ping.store(timestamp, Ordering::Release);
    }

    pub fn last_ping(&self) -> u32 {
        self.last_ping.load(Ordering::Acquire)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
