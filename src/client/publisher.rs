//! RTMP stream publisher
//!
//! High-level API for publishing audio and video to an RTMP server.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::constants::{MSG_AUDIO, MSG_VIDEO};

use super::config::{ClientConfig, ClientMode};
use super::connector::RtmpConnector;

/// Events from the RTMP publisher
#[derive(Debug)]
pub enum PublishEvent {
    /// Handshake done, connect about to be sent
    Connected,

    /// Server answered NetStream.Publish.Start
    Publishing,

    /// Error occurred
    Error(String),

    /// Disconnected
    Disconnected,
}

/// RTMP stream publisher
///
/// Runs a write-mode session and sends FLV audio/video tag bodies on the
/// stream the server assigned.
///
/// # Example
/// ```no_run
/// use rtmp_client::client::{ClientConfig, ClientMode, RtmpPublisher};
///
/// # async fn example() -> rtmp_client::error::Result<()> {
/// let config = ClientConfig::new("rtmp://localhost/live/stream_key", ClientMode::Write);
/// let (mut publisher, mut events) = RtmpPublisher::new(config);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// publisher.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct RtmpPublisher {
    config: ClientConfig,
    event_tx: mpsc::Sender<PublishEvent>,
    connector: Option<RtmpConnector>,
}

impl RtmpPublisher {
    /// Create a new publisher.
    ///
    /// Returns the publisher and a receiver for events. The config is forced
    /// into write mode.
    pub fn new(mut config: ClientConfig) -> (Self, mpsc::Receiver<PublishEvent>) {
        config.mode = ClientMode::Write;
        let (tx, rx) = mpsc::channel(256);

        let publisher = Self {
            config,
            event_tx: tx,
            connector: None,
        };

        (publisher, rx)
    }

    /// Connect to the RTMP server and start publishing.
    ///
    /// Returns once the server has accepted the publish.
    pub async fn connect(&mut self) -> Result<()> {
        match self.open().await {
            Ok(connector) => {
                self.connector = Some(connector);
                let _ = self.event_tx.send(PublishEvent::Publishing).await;
                Ok(())
            }
            Err(e) => {
                let _ = self.event_tx.send(PublishEvent::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<RtmpConnector> {
        let mut connector = RtmpConnector::new(self.config.clone())?;
        connector.connect().await?;
        connector.handshake().await?;
        let _ = self.event_tx.send(PublishEvent::Connected).await;

        connector.open_stream().await?;
        Ok(connector)
    }

    /// Send an audio tag body. `timestamp` is in milliseconds.
    pub async fn send_audio(&mut self, data: Bytes, timestamp: u32) -> Result<()> {
        self.connector()?.send_media(MSG_AUDIO, data, timestamp).await
    }

    /// Send a video tag body. `timestamp` is in milliseconds.
    pub async fn send_video(&mut self, data: Bytes, timestamp: u32) -> Result<()> {
        self.connector()?.send_media(MSG_VIDEO, data, timestamp).await
    }

    fn connector(&mut self) -> Result<&mut RtmpConnector> {
        self.connector.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Delete the stream and close the connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut connector) = self.connector.take() {
            let deleted = connector.delete_stream().await;
            connector.release().await?;
            deleted?;
        }
        let _ = self.event_tx.send(PublishEvent::Disconnected).await;
        Ok(())
    }

    /// Check if currently connected and publishing.
    pub fn is_connected(&self) -> bool {
        self.connector.is_some()
    }
}
