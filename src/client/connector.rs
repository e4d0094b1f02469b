//! RTMP client connector
//!
//! Drives one client session over a byte stream: handshake, connect,
//! createStream, then play or publish, followed by message dispatch until
//! the server closes the connection.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::amf::{AmfObject, AmfValue};
use crate::error::{Error, HandshakeError, ProtocolError, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RtmpPacket};
use crate::protocol::constants::*;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{Command, DataMessage, RtmpMessage, StatusInfo, UserControlEvent};
use crate::session::{InvokeRegistry, SessionPhase, SessionState};

use super::config::{ClientConfig, ClientMode, ParsedUrl};

/// RTMP client connector
///
/// `S` is the transport; [`RtmpConnector::new`] plus [`RtmpConnector::connect`]
/// use TCP, [`RtmpConnector::with_transport`] accepts any async byte stream.
pub struct RtmpConnector<S = TcpStream> {
    config: ClientConfig,
    url: ParsedUrl,
    io: Option<BufStream<S>>,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    write_buf: BytesMut,
    state: SessionState,
    invokes: InvokeRegistry,
    media_tx: Option<mpsc::Sender<RtmpPacket>>,
}

impl RtmpConnector<TcpStream> {
    /// Allocate a session for `config`; no I/O happens until [`connect`](Self::connect)
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Open the TCP connection
    pub async fn connect(&mut self) -> Result<()> {
        let addr = self.url.socket_addr();
        tracing::info!(addr = %addr, "Connecting to RTMP server");

        let socket = timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        self.io = Some(BufStream::new(socket));
        Ok(())
    }
}

impl<S> RtmpConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Allocate a session over an already-open transport
    pub fn with_transport(config: ClientConfig, io: S) -> Result<Self> {
        Self::build(config, Some(BufStream::new(io)))
    }

    fn build(config: ClientConfig, io: Option<BufStream<S>>) -> Result<Self> {
        let url = config.parse_url()?;

        Ok(Self {
            config,
            url,
            io,
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            write_buf: BytesMut::with_capacity(4096),
            state: SessionState::new(),
            invokes: InvokeRegistry::new(),
            media_tx: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn url(&self) -> &ParsedUrl {
        &self.url
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn stream_id(&self) -> Option<u32> {
        self.state.stream_id
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    /// Forward received audio, video, and data messages to `tx`
    pub fn set_media_sender(&mut self, tx: mpsc::Sender<RtmpPacket>) {
        self.media_tx = Some(tx);
    }

    /// Perform the simple (unauthenticated) handshake
    pub async fn handshake(&mut self) -> Result<()> {
        let result = self.do_handshake().await;
        match &result {
            Ok(()) => {
                self.state.complete_handshake();
                tracing::debug!("Handshake complete");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Handshake failed");
                self.state.fail();
            }
        }
        result
    }

    async fn do_handshake(&mut self) -> Result<()> {
        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut handshake = Handshake::new();

        let c0c1 = handshake.generate_c0c1(epoch_millis())?;
        io.write_all(&c0c1).await?;
        io.flush().await?;

        let mut s0s1 = vec![0u8; handshake.bytes_needed()];
        io.read_exact(&mut s0s1).await?;
        let c2 = handshake.process_s0s1(&s0s1)?;
        io.write_all(&c2).await?;
        io.flush().await?;

        let mut s2 = vec![0u8; handshake.bytes_needed()];
        io.read_exact(&mut s2).await?;
        handshake.process_s2(&s2)
    }

    /// Run connect, createStream, and play/publish, then keep dispatching
    /// until the server closes the connection
    ///
    /// Succeeds only if the stream started and the connection then ended
    /// at a message boundary.
    pub async fn connect_stream(&mut self) -> Result<()> {
        self.open_stream().await?;

        loop {
            match self.process_next().await {
                Ok(()) => {}
                Err(Error::ConnectionClosed) => {
                    tracing::info!("Server closed the connection");
                    return Ok(());
                }
                Err(e) => {
                    self.state.fail();
                    return Err(e);
                }
            }
        }
    }

    /// Send connect and dispatch until playback (read mode) or publishing
    /// (write mode) has started
    pub async fn open_stream(&mut self) -> Result<()> {
        let result = self.run_until_started().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Failed to start stream");
            self.state.fail();
        }
        result
    }

    async fn run_until_started(&mut self) -> Result<()> {
        self.send_connect().await?;
        while !self.stream_started() {
            self.process_next().await?;
        }

        tracing::info!(
            stream_id = ?self.state.stream_id,
            mode = ?self.config.mode,
            "Stream started"
        );
        Ok(())
    }

    fn stream_started(&self) -> bool {
        match self.config.mode {
            ClientMode::Read => self.state.playing,
            ClientMode::Write => self.state.phase == SessionPhase::Publishing,
        }
    }

    /// Send the connect command
    ///
    /// A non-default outgoing chunk size is announced first.
    pub async fn send_connect(&mut self) -> Result<()> {
        if self.state.phase != SessionPhase::Handshaken {
            return Err(HandshakeError::InvalidState.into());
        }

        if self.config.chunk_size != DEFAULT_CHUNK_SIZE {
            let size = self.config.chunk_size.clamp(1, MAX_CHUNK_SIZE);
            self.send_message(CSID_PROTOCOL_CONTROL, 0, &RtmpMessage::SetChunkSize(size))
                .await?;
            self.encoder.set_chunk_size(size);
            self.state.out_chunk_size = size;
        }

        let mut object = AmfObject::new()
            .with("app", self.url.app.as_str())
            .with("tcUrl", self.url.tc_url());
        if self.config.mode == ClientMode::Read {
            object.insert("fpad", false);
            object.insert("capabilities", CONNECT_CAPABILITIES);
            object.insert("audioCodecs", CONNECT_AUDIO_CODECS);
            object.insert("videoCodecs", CONNECT_VIDEO_CODECS);
            object.insert("videoFunction", CONNECT_VIDEO_FUNCTION);
        }

        let command = Command::new(CMD_CONNECT, self.next_transaction_id()).with_object(object);
        self.send_invoke(CSID_COMMAND, 0, command).await?;

        self.state.start_connect();
        tracing::debug!(app = %self.url.app, "Sent connect");
        Ok(())
    }

    /// Receive one message and act on it
    pub async fn process_next(&mut self) -> Result<()> {
        let packet = self.recv_message().await?;
        if packet.payload.is_empty() {
            tracing::trace!(csid = packet.csid, "Skipping empty message");
            return Ok(());
        }
        self.dispatch(packet).await
    }

    /// Receive one fully reassembled message
    pub async fn recv_message(&mut self) -> Result<RtmpPacket> {
        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        self.decoder.read_message(io).await
    }

    /// Encode and send a typed message
    pub async fn send_message(
        &mut self,
        csid: u32,
        stream_id: u32,
        message: &RtmpMessage,
    ) -> Result<()> {
        let (message_type, payload) = message.encode();
        self.send_packet(&RtmpPacket::new(csid, message_type, stream_id, payload))
            .await
    }

    /// Chunk and send a raw message
    pub async fn send_packet(&mut self, packet: &RtmpPacket) -> Result<()> {
        self.write_buf.clear();
        self.encoder.encode(packet, &mut self.write_buf)?;

        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        io.write_all(&self.write_buf).await?;
        io.flush().await?;
        Ok(())
    }

    /// Send an audio or video message on the created stream
    pub async fn send_media(
        &mut self,
        message_type: u8,
        data: Bytes,
        timestamp: u32,
    ) -> Result<()> {
        let stream_id = self.state.stream_id.ok_or(ProtocolError::StreamNotCreated)?;
        let csid = match message_type {
            MSG_AUDIO => CSID_AUDIO,
            MSG_VIDEO => CSID_VIDEO,
            other => {
                return Err(ProtocolError::InvalidPayload(format!(
                    "message type {} is not audio or video",
                    other
                ))
                .into())
            }
        };

        let packet = RtmpPacket::new(csid, message_type, stream_id, data).with_timestamp(timestamp);
        self.send_packet(&packet).await
    }

    /// Send deleteStream for the current stream
    pub async fn delete_stream(&mut self) -> Result<()> {
        let stream_id = self.state.stream_id.ok_or(ProtocolError::StreamNotCreated)?;

        let command = Command::new(CMD_DELETE_STREAM, self.next_transaction_id())
            .with_arg(stream_id);
        self.send_message(CSID_COMMAND, 0, &RtmpMessage::Command(command))
            .await?;

        self.state.stream_deleted();
        tracing::debug!(stream_id, "Sent deleteStream");
        Ok(())
    }

    /// Shut the transport down; later operations fail with `ConnectionClosed`
    pub async fn release(&mut self) -> Result<()> {
        if let Some(mut io) = self.io.take() {
            io.shutdown().await?;
            tracing::debug!("Transport released");
        }
        Ok(())
    }

    fn next_transaction_id(&self) -> f64 {
        self.invokes.next_transaction_id() as f64
    }

    /// Register a command awaiting `_result`, then send it
    async fn send_invoke(&mut self, csid: u32, stream_id: u32, command: Command) -> Result<()> {
        if let Some(id) = command.invoke_id() {
            self.invokes.register(id, &command.name).await?;
        }
        self.send_message(csid, stream_id, &RtmpMessage::Command(command))
            .await
    }

    async fn dispatch(&mut self, packet: RtmpPacket) -> Result<()> {
        let message = match RtmpMessage::from_packet(&packet) {
            Ok(message) => message,
            Err(e) if is_control_message(packet.message_type) => {
                tracing::warn!(
                    message_type = packet.message_type,
                    error = %e,
                    "Ignoring malformed control message"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match message {
            RtmpMessage::SetChunkSize(size) => {
                self.decoder.set_chunk_size(size);
                tracing::info!(chunk_size = size, "Peer chunk size changed");
            }
            RtmpMessage::Abort { csid } => {
                self.decoder.abort(csid);
                tracing::debug!(csid, "Peer aborted message");
            }
            RtmpMessage::Acknowledgement { sequence } => {
                tracing::debug!(sequence, "Acknowledgement");
            }
            RtmpMessage::UserControl(event) => self.on_user_control(event).await?,
            RtmpMessage::WindowAckSize(size) => {
                self.state.window_ack_size = size;
                tracing::info!(size, "Window acknowledgement size");
            }
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                self.state.peer_bandwidth = size;
                self.state.peer_bandwidth_limit = limit_type;
                tracing::info!(size, limit_type, "Peer bandwidth");
            }
            RtmpMessage::Audio { .. } => {
                self.state.has_audio = true;
                tracing::trace!(len = packet.payload.len(), "Audio message");
                self.forward(packet).await;
            }
            RtmpMessage::Video { .. } => {
                self.state.has_video = true;
                tracing::trace!(len = packet.payload.len(), "Video message");
                self.forward(packet).await;
            }
            RtmpMessage::Data(data) => {
                self.on_data(&data);
                self.forward(packet).await;
            }
            RtmpMessage::Command(command) => self.on_command(command).await?,
            RtmpMessage::Unknown { type_id, .. } => {
                tracing::info!(message_type = type_id, "Unsupported message type");
            }
        }

        Ok(())
    }

    async fn forward(&mut self, packet: RtmpPacket) {
        if let Some(tx) = &self.media_tx {
            if tx.send(packet).await.is_err() {
                tracing::debug!("Media receiver dropped");
                self.media_tx = None;
            }
        }
    }

    async fn on_user_control(&mut self, event: UserControlEvent) -> Result<()> {
        match event {
            UserControlEvent::PingRequest(timestamp) => {
                self.state.set_last_ping(timestamp);
                tracing::debug!(timestamp, "Ping request");
                let reply = RtmpMessage::UserControl(UserControlEvent::PingResponse(timestamp));
                self.send_message(CSID_PROTOCOL_CONTROL, 0, &reply).await?;
            }
            UserControlEvent::PingResponse(timestamp) => {
                tracing::debug!(timestamp, "Ping response");
            }
            other => {
                tracing::info!(event = ?other, "User control event");
            }
        }
        Ok(())
    }

    fn on_data(&mut self, data: &DataMessage) {
        match data.name.as_str() {
            CMD_ON_METADATA => {
                if let Some((has_video, has_audio)) = data.codec_presence() {
                    self.state.received_metadata = true;
                    self.state.has_video |= has_video;
                    self.state.has_audio |= has_audio;
                    tracing::debug!(has_video, has_audio, "Received metadata");
                }
            }
            CMD_SET_DATA_FRAME => tracing::debug!("Skipping @setDataFrame"),
            other => tracing::debug!(handler = other, "Data message"),
        }
    }

    async fn on_command(&mut self, command: Command) -> Result<()> {
        match command.name.as_str() {
            CMD_RESULT => self.on_result(&command).await,
            CMD_ERROR => self.on_error(&command).await,
            CMD_ON_STATUS => self.on_status(&command),
            other => {
                tracing::debug!(command = other, "Ignoring command");
                Ok(())
            }
        }
    }

    async fn on_result(&mut self, result: &Command) -> Result<()> {
        let id = result.invoke_id().ok_or_else(|| {
            ProtocolError::InvalidCommand(format!(
                "_result with transaction id {}",
                result.transaction_id
            ))
        })?;
        let command = self.invokes.resolve(id, "").await?;
        tracing::debug!(transaction_id = id, command = %command, "Result");

        match command.as_str() {
            CMD_CONNECT => {
                tracing::info!(app = %self.url.app, "Connected");
                let window = RtmpMessage::WindowAckSize(self.state.window_ack_size);
                self.send_message(CSID_PROTOCOL_CONTROL, 0, &window).await?;
                self.send_buffer_length(0, self.config.connect_buffer_ms)
                    .await?;

                let create = Command::new(CMD_CREATE_STREAM, self.next_transaction_id());
                self.send_invoke(CSID_COMMAND, 0, create).await?;
            }
            CMD_CREATE_STREAM => {
                let stream_id = result
                    .info()
                    .and_then(AmfValue::as_number)
                    .ok_or_else(|| ProtocolError::MissingField("createStream stream id".into()))?
                    as u32;
                self.state.stream_created(stream_id);
                tracing::info!(stream_id, "Stream created");

                match self.config.mode {
                    ClientMode::Write => self.send_publish(stream_id).await?,
                    ClientMode::Read => {
                        self.send_play(stream_id).await?;
                        self.send_buffer_length(stream_id, self.config.play_buffer_ms)
                            .await?;
                    }
                }
                self.state.start_stream();
            }
            _ => {}
        }

        Ok(())
    }

    async fn on_error(&mut self, error: &Command) -> Result<()> {
        let command = match error.invoke_id() {
            Some(id) => self.invokes.resolve(id, "").await.ok(),
            None => None,
        };
        let command = command.unwrap_or_else(|| "unknown".to_string());
        let description = error
            .info()
            .and_then(|info| info.get_string("description"))
            .unwrap_or("no description");

        tracing::warn!(command = %command, description, "Server rejected command");
        Err(Error::Rejected(format!("{}: {}", command, description)))
    }

    fn on_status(&mut self, status: &Command) -> Result<()> {
        let info = match StatusInfo::from_amf(status.info()) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "Stream status error");
                return Err(e);
            }
        };

        tracing::info!(code = %info.code, "onStatus");
        if !self.state.apply_status_code(&info.code) {
            tracing::debug!(code = %info.code, "Status does not affect session");
        }
        Ok(())
    }

    async fn send_play(&mut self, stream_id: u32) -> Result<()> {
        // -1: live if available, recorded otherwise
        let play = Command::new(CMD_PLAY, self.next_transaction_id())
            .with_arg(self.url.play_path())
            .with_arg(-1.0);
        self.send_invoke(CSID_PLAY, stream_id, play).await?;
        tracing::debug!(play_path = %self.url.play_path(), "Sent play");
        Ok(())
    }

    async fn send_publish(&mut self, stream_id: u32) -> Result<()> {
        let publish = Command::new(CMD_PUBLISH, self.next_transaction_id())
            .with_arg(self.url.play_path())
            .with_arg(self.config.publish_type.as_str());
        self.send_invoke(CSID_COMMAND, stream_id, publish).await?;
        tracing::debug!(play_path = %self.url.play_path(), "Sent publish");
        Ok(())
    }

    async fn send_buffer_length(&mut self, stream_id: u32, buffer_ms: u32) -> Result<()> {
        let event = UserControlEvent::SetBufferLength {
            stream_id,
            buffer_ms,
        };
        self.send_message(CSID_PROTOCOL_CONTROL, 0, &RtmpMessage::UserControl(event))
            .await
    }
}

fn epoch_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::handshake::C0C1_SIZE;
    use tokio::io::DuplexStream;

    /// Scripted server end of a duplex pipe
    struct MockServer {
        io: DuplexStream,
        decoder: ChunkDecoder,
        encoder: ChunkEncoder,
    }

    impl MockServer {
        fn new(io: DuplexStream) -> Self {
            Self {
                io,
                decoder: ChunkDecoder::new(),
                encoder: ChunkEncoder::new(),
            }
        }

        async fn handshake(&mut self) {
            let mut c0c1 = vec![0u8; C0C1_SIZE];
            self.io.read_exact(&mut c0c1).await.unwrap();
            assert_eq!(c0c1[0], RTMP_VERSION);
            assert!(c0c1[5..].iter().all(|&b| b == 0));

            let mut s0s1 = vec![RTMP_VERSION, 0, 0, 0x12, 0x34];
            s0s1.extend((0..HANDSHAKE_SIZE - 4).map(|i| (i % 251) as u8));
            self.io.write_all(&s0s1).await.unwrap();

            let mut c2 = vec![0u8; HANDSHAKE_SIZE];
            self.io.read_exact(&mut c2).await.unwrap();
            assert_eq!(&c2[..], &s0s1[1..]);

            self.io.write_all(&[0u8; HANDSHAKE_SIZE]).await.unwrap();
        }

        async fn recv(&mut self) -> (RtmpPacket, RtmpMessage) {
            let packet = self.decoder.read_message(&mut self.io).await.unwrap();
            let message = RtmpMessage::from_packet(&packet).unwrap();
            (packet, message)
        }

        async fn recv_command(&mut self) -> (RtmpPacket, Command) {
            match self.recv().await {
                (packet, RtmpMessage::Command(command)) => (packet, command),
                (_, other) => panic!("expected command, got {:?}", other),
            }
        }

        async fn send_packet(&mut self, packet: RtmpPacket) {
            let mut buf = BytesMut::new();
            self.encoder.encode(&packet, &mut buf).unwrap();
            self.io.write_all(&buf).await.unwrap();
        }

        async fn send(&mut self, csid: u32, stream_id: u32, message: RtmpMessage) {
            let (message_type, payload) = message.encode();
            self.send_packet(RtmpPacket::new(csid, message_type, stream_id, payload))
                .await;
        }

        async fn send_command(&mut self, command: Command) {
            self.send(CSID_COMMAND, 0, RtmpMessage::Command(command)).await;
        }

        async fn send_status(&mut self, stream_id: u32, level: &str, code: &str) {
            let info = AmfObject::new()
                .with("level", level)
                .with("code", code)
                .with("description", "denied");
            let command = Command::new(CMD_ON_STATUS, 0.0).with_arg(info);
            self.send(CSID_PLAY, stream_id, RtmpMessage::Command(command))
                .await;
        }

        /// Answer connect and createStream, returning the client's play or
        /// publish command
        async fn accept_session(&mut self, stream_id: u32) -> (RtmpPacket, Command) {
            let (_, connect) = self.recv_command().await;
            assert_eq!(connect.name, CMD_CONNECT);
            let reply = Command::new(CMD_RESULT, connect.transaction_id)
                .with_object(AmfObject::new())
                .with_arg(AmfObject::new().with("code", "NetConnection.Connect.Success"));
            self.send_command(reply).await;

            assert!(matches!(self.recv().await.1, RtmpMessage::WindowAckSize(_)));
            assert!(matches!(self.recv().await.1, RtmpMessage::UserControl(_)));

            let (_, create) = self.recv_command().await;
            assert_eq!(create.name, CMD_CREATE_STREAM);
            let reply = Command::new(CMD_RESULT, create.transaction_id).with_arg(stream_id as f64);
            self.send_command(reply).await;

            self.recv_command().await
        }
    }

    /// Fails the test instead of hanging when either side stalls
    async fn within<F: std::future::Future>(future: F) -> F::Output {
        timeout(std::time::Duration::from_secs(5), future)
            .await
            .expect("mock session timed out")
    }

    fn connector(url: &str, mode: ClientMode) -> (RtmpConnector<DuplexStream>, MockServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let config = ClientConfig::new(url, mode);
        let connector = RtmpConnector::with_transport(config, client).unwrap();
        (connector, MockServer::new(server))
    }

    #[tokio::test]
    async fn test_handshake_echoes_s1() {
        let (mut client, mut server) = connector("rtmp://localhost/live/test", ClientMode::Read);

        let (result, _) =
            within(async { tokio::join!(client.handshake(), server.handshake()) }).await;
        result.unwrap();
        assert_eq!(client.phase(), SessionPhase::Handshaken);
    }

    #[tokio::test]
    async fn test_handshake_fails_on_closed_transport() {
        let (mut client, server) = connector("rtmp://localhost/live/test", ClientMode::Read);
        drop(server);

        assert!(client.handshake().await.is_err());
        assert!(client.state().is_failed());
    }

    #[tokio::test]
    async fn test_play_session() {
        let (mut client, mut server) =
            connector("rtmp://localhost:1935/live/test?token=t1", ClientMode::Read);
        let (media_tx, mut media_rx) = mpsc::channel(16);
        client.set_media_sender(media_tx);

        let server_side = async move {
            server.handshake().await;

            let (packet, connect) = server.recv_command().await;
            assert_eq!(packet.csid, CSID_COMMAND);
            assert_eq!(packet.message_type, MSG_COMMAND_AMF0);
            assert_eq!(packet.stream_id, 0);
            assert_eq!(connect.name, CMD_CONNECT);
            assert_eq!(connect.transaction_id, 1.0);
            let object = &connect.command_object;
            assert_eq!(object.get_string("app"), Some("live"));
            assert_eq!(object.get_string("tcUrl"), Some("rtmp://localhost:1935/live"));
            assert_eq!(object.get("fpad").and_then(AmfValue::as_bool), Some(false));
            assert_eq!(object.get_number("capabilities"), Some(15.0));
            assert_eq!(object.get_number("videoFunction"), Some(1.0));

            // Malformed control messages are skipped
            server
                .send_packet(RtmpPacket::new(2, MSG_WINDOW_ACK_SIZE, 0, vec![1u8, 2]))
                .await;
            server
                .send(CSID_PROTOCOL_CONTROL, 0, RtmpMessage::WindowAckSize(5_000_000))
                .await;
            server
                .send(
                    CSID_PROTOCOL_CONTROL,
                    0,
                    RtmpMessage::SetPeerBandwidth {
                        size: 5_000_000,
                        limit_type: 2,
                    },
                )
                .await;
            server
                .send(CSID_PROTOCOL_CONTROL, 0, RtmpMessage::SetChunkSize(4096))
                .await;
            server.encoder.set_chunk_size(4096);

            // Larger than the default chunk size, sent as a single chunk
            let big = "x".repeat(1000);
            let reply = Command::new(CMD_RESULT, 1.0)
                .with_object(AmfObject::new().with("fmsVer", big.as_str()))
                .with_arg(AmfObject::new());
            server.send_command(reply).await;

            match server.recv().await {
                (packet, RtmpMessage::WindowAckSize(size)) => {
                    assert_eq!(packet.csid, CSID_PROTOCOL_CONTROL);
                    assert_eq!(size, 5_000_000);
                }
                other => panic!("expected WindowAckSize, got {:?}", other),
            }
            match server.recv().await.1 {
                RtmpMessage::UserControl(UserControlEvent::SetBufferLength {
                    stream_id,
                    buffer_ms,
                }) => {
                    assert_eq!(stream_id, 0);
                    assert_eq!(buffer_ms, 300);
                }
                other => panic!("expected SetBufferLength, got {:?}", other),
            }
            let (_, create) = server.recv_command().await;
            assert_eq!(create.name, CMD_CREATE_STREAM);
            assert_eq!(create.transaction_id, 2.0);
            assert!(create.command_object.is_null());

            let reply = Command::new(CMD_RESULT, 2.0).with_arg(1.0);
            server.send_command(reply).await;

            let (packet, play) = server.recv_command().await;
            assert_eq!(packet.csid, CSID_PLAY);
            assert_eq!(packet.stream_id, 1);
            assert_eq!(play.name, CMD_PLAY);
            assert_eq!(play.arguments[0].as_str(), Some("test?token=t1"));
            assert_eq!(play.arguments[1].as_number(), Some(-1.0));
            match server.recv().await.1 {
                RtmpMessage::UserControl(UserControlEvent::SetBufferLength {
                    stream_id,
                    buffer_ms,
                }) => {
                    assert_eq!(stream_id, 1);
                    assert_eq!(buffer_ms, 3000);
                }
                other => panic!("expected SetBufferLength, got {:?}", other),
            }

            server
                .send(
                    CSID_PROTOCOL_CONTROL,
                    0,
                    RtmpMessage::UserControl(UserControlEvent::PingRequest(77)),
                )
                .await;
            match server.recv().await.1 {
                RtmpMessage::UserControl(UserControlEvent::PingResponse(ts)) => {
                    assert_eq!(ts, 77)
                }
                other => panic!("expected PingResponse, got {:?}", other),
            }

            server.send_status(1, "status", NS_PLAY_START).await;

            let metadata = DataMessage::new(CMD_ON_METADATA).with_value(
                AmfValue::EcmaArray(AmfObject::new().with("videocodecid", 7.0)),
            );
            server.send(5, 1, RtmpMessage::Data(metadata)).await;
            server
                .send_packet(
                    RtmpPacket::new(CSID_AUDIO, MSG_AUDIO, 1, vec![0xAFu8, 0x01, 0x21])
                        .with_timestamp(40),
                )
                .await;

            // Closing at a message boundary ends the session cleanly
            drop(server);
        };

        let client_side = async {
            client.handshake().await?;
            client.connect_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        result.unwrap();

        assert!(client.is_playing());
        assert_eq!(client.phase(), SessionPhase::Playing);
        assert_eq!(client.stream_id(), Some(1));
        assert_eq!(client.state().window_ack_size, 5_000_000);
        assert_eq!(client.state().peer_bandwidth, 5_000_000);
        assert_eq!(client.state().last_ping(), 77);
        assert!(client.state().received_metadata);
        assert!(client.state().has_video);
        assert!(client.state().has_audio);

        let forwarded_data = media_rx.recv().await.unwrap();
        assert_eq!(forwarded_data.message_type, MSG_DATA_AMF0);
        let audio = media_rx.recv().await.unwrap();
        assert_eq!(audio.message_type, MSG_AUDIO);
        assert_eq!(audio.timestamp, 40);
        assert_eq!(&audio.payload[..], &[0xAF, 0x01, 0x21]);
    }

    #[tokio::test]
    async fn test_publish_session() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let mut config = ClientConfig::new("rtmp://localhost/live/cam", ClientMode::Write);
        config.chunk_size = 4096;
        let mut client = RtmpConnector::with_transport(config, client_io).unwrap();
        let mut server = MockServer::new(server_io);

        let server_side = async {
            server.handshake().await;

            match server.recv().await.1 {
                RtmpMessage::SetChunkSize(size) => assert_eq!(size, 4096),
                other => panic!("expected SetChunkSize, got {:?}", other),
            }
            server.decoder.set_chunk_size(4096);

            let (packet, publish) = server.accept_session(3).await;
            assert_eq!(publish.name, CMD_PUBLISH);
            assert_eq!(packet.csid, CSID_COMMAND);
            assert_eq!(packet.stream_id, 3);
            assert_eq!(publish.arguments[0].as_str(), Some("cam"));
            assert_eq!(publish.arguments[1].as_str(), Some("live"));

            server.send_status(3, "status", NS_PUBLISH_START).await;

            // 5000 bytes fit a single 4096-byte chunk plus one continuation
            let (packet, message) = server.recv().await;
            assert!(matches!(message, RtmpMessage::Video { .. }));
            assert_eq!(packet.csid, CSID_VIDEO);
            assert_eq!(packet.stream_id, 3);
            assert_eq!(packet.timestamp, 33);
            assert_eq!(packet.payload.len(), 5000);

            let (_, delete) = server.recv_command().await;
            assert_eq!(delete.name, CMD_DELETE_STREAM);
            assert_eq!(delete.arguments[0].as_number(), Some(3.0));
        };

        let client_side = async {
            client.handshake().await?;
            client.open_stream().await?;
            assert_eq!(client.phase(), SessionPhase::Publishing);
            assert!(!client.is_playing());

            client
                .send_media(MSG_VIDEO, Bytes::from(vec![0x17u8; 5000]), 33)
                .await?;
            client.delete_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        result.unwrap();
        assert_eq!(client.stream_id(), None);
        assert_eq!(client.state().out_chunk_size, 4096);
    }

    #[tokio::test]
    async fn test_connect_object_omits_play_fields_when_publishing() {
        let (mut client, mut server) = connector("rtmp://h/app/s", ClientMode::Write);

        let server_side = async {
            server.handshake().await;
            let (_, connect) = server.recv_command().await;
            let object = connect.command_object.as_object().unwrap();
            assert!(object.contains("app"));
            assert!(object.contains("tcUrl"));
            assert!(!object.contains("fpad"));
            assert!(!object.contains("capabilities"));
        };
        let client_side = async {
            client.handshake().await?;
            client.send_connect().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        result.unwrap();
        assert_eq!(client.phase(), SessionPhase::Connecting);
    }

    #[tokio::test]
    async fn test_error_status_fails_session() {
        let (mut client, mut server) = connector("rtmp://localhost/live/test", ClientMode::Read);

        let server_side = async {
            server.handshake().await;
            server.accept_session(1).await;
            server.recv().await;
            server
                .send_status(1, "error", "NetStream.Play.StreamNotFound")
                .await;
        };
        let client_side = async {
            client.handshake().await?;
            client.connect_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        match result {
            Err(Error::Protocol(ProtocolError::InvalidStatus { level, description })) => {
                assert_eq!(level, "error");
                assert_eq!(description, "denied");
            }
            other => panic!("expected InvalidStatus, got {:?}", other),
        }
        assert!(client.state().is_failed());
        assert!(!client.is_playing());
    }

    #[tokio::test]
    async fn test_status_without_level_fails() {
        let (mut client, mut server) = connector("rtmp://localhost/live/test", ClientMode::Read);

        let server_side = async {
            server.handshake().await;
            server.recv_command().await;
            let info = AmfObject::new().with("code", NS_PLAY_START);
            server
                .send_command(Command::new(CMD_ON_STATUS, 0.0).with_arg(info))
                .await;
        };
        let client_side = async {
            client.handshake().await?;
            client.open_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::InvalidStatus { .. }))
        ));
        assert!(!client.is_playing());
    }

    #[tokio::test]
    async fn test_error_reply_rejects_connect() {
        let (mut client, mut server) = connector("rtmp://localhost/live/test", ClientMode::Read);

        let server_side = async {
            server.handshake().await;
            let (_, connect) = server.recv_command().await;
            let info = AmfObject::new()
                .with("level", "error")
                .with("code", "NetConnection.Connect.Rejected")
                .with("description", "bad app");
            server
                .send_command(Command::new(CMD_ERROR, connect.transaction_id).with_arg(info))
                .await;
        };
        let client_side = async {
            client.handshake().await?;
            client.connect_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        match result {
            Err(Error::Rejected(reason)) => assert_eq!(reason, "connect: bad app"),
            other => panic!("expected Rejected, got {:?}", other),
        }
        assert_eq!(client.phase(), SessionPhase::Failed);
    }

    #[tokio::test]
    async fn test_unknown_result_id_fails() {
        let (mut client, mut server) = connector("rtmp://localhost/live/test", ClientMode::Read);

        let server_side = async {
            server.handshake().await;
            server.recv_command().await;
            server
                .send_command(Command::new(CMD_RESULT, 9.0).with_arg(1.0))
                .await;
        };
        let client_side = async {
            client.handshake().await?;
            client.open_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        assert!(matches!(
            result,
            Err(Error::Invoke(crate::error::InvokeError::NotFound(9)))
        ));
    }

    #[tokio::test]
    async fn test_close_before_start_is_an_error() {
        let (mut client, mut server) = connector("rtmp://localhost/live/test", ClientMode::Read);

        let server_side = async move {
            server.handshake().await;
            server.accept_session(1).await;
            server.recv().await;
            drop(server);
        };
        let client_side = async {
            client.handshake().await?;
            client.connect_stream().await
        };

        let (result, ()) = within(async { tokio::join!(client_side, server_side) }).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(client.state().is_failed());
    }

    #[tokio::test]
    async fn test_connect_requires_handshake() {
        let (mut client, _server) = connector("rtmp://localhost/live/test", ClientMode::Read);
        assert!(matches!(
            client.send_connect().await,
            Err(Error::Handshake(HandshakeError::InvalidState))
        ));
    }

    #[tokio::test]
    async fn test_media_requires_stream() {
        let (mut client, _server) = connector("rtmp://localhost/live/test", ClientMode::Write);
        assert!(matches!(
            client.send_media(MSG_AUDIO, Bytes::from_static(&[0xAF]), 0).await,
            Err(Error::Protocol(ProtocolError::StreamNotCreated))
        ));
        assert!(matches!(
            client.delete_stream().await,
            Err(Error::Protocol(ProtocolError::StreamNotCreated))
        ));
    }

    #[tokio::test]
    async fn test_release_closes_transport() {
        let (mut client, _server) = connector("rtmp://localhost/live/test", ClientMode::Read);
        client.release().await.unwrap();

        assert!(matches!(client.recv_message().await, Err(Error::ConnectionClosed)));
        assert!(matches!(client.handshake().await, Err(Error::ConnectionClosed)));
        client.release().await.unwrap();
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = ClientConfig::new("http://localhost/live/test", ClientMode::Read);
        assert!(matches!(RtmpConnector::new(config), Err(Error::Config(_))));
    }
}
