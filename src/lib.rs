//! rtmp-client: RTMP client library
//!
//! This library provides the client side of RTMP:
//! - AMF0 encoding and decoding of command and data payloads
//! - Chunk stream framing with multi-chunk reassembly
//! - The simple (unauthenticated) handshake
//! - A session that runs connect, createStream, and play or publish
//!
//! # Example: Play a stream
//!
//! ```no_run
//! use rtmp_client::{ClientConfig, ClientMode, RtmpConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("rtmp://localhost/live/test", ClientMode::Read);
//!     let mut connector = RtmpConnector::new(config)?;
//!     connector.connect().await?;
//!     connector.handshake().await?;
//!     connector.connect_stream().await?;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod protocol;
pub mod session;

// Re-export main types for convenience
pub use client::config::{ClientConfig, ClientMode};
pub use client::connector::RtmpConnector;
pub use client::publisher::{PublishEvent, RtmpPublisher};
pub use error::{Error, Result};
