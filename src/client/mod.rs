//! RTMP client implementation
//!
//! Provides client-side RTMP for:
//! - Playing streams from remote RTMP servers
//! - Publishing streams to RTMP servers

pub mod config;
pub mod connector;
pub mod publisher;

pub use config::{ClientConfig, ClientMode, ParsedUrl};
pub use connector::RtmpConnector;
pub use publisher::{PublishEvent, RtmpPublisher};
