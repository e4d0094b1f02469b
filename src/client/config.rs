//! Client configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::{DEFAULT_CHUNK_SIZE, RTMP_PORT};

/// Which branch the session takes once the stream is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientMode {
    /// Play a stream from the server
    #[default]
    Read,
    /// Publish a stream to the server
    Write,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// RTMP URL to connect to (rtmp://host[:port]/app/stream[?query])
    pub url: String,

    /// Play or publish
    pub mode: ClientMode,

    /// TCP connection timeout
    pub connect_timeout: Duration,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,

    /// Outgoing chunk size; anything other than 128 is announced before connect
    pub chunk_size: u32,

    /// SetBufferLength sent for stream 0 after connect succeeds
    pub connect_buffer_ms: u32,

    /// SetBufferLength sent for the play stream
    pub play_buffer_ms: u32,

    /// Publishing type passed with the publish command
    pub publish_type: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            mode: ClientMode::Read,
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_buffer_ms: 300,
            play_buffer_ms: 3000,
            publish_type: "live".to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new config with the given URL and mode
    pub fn new(url: impl Into<String>, mode: ClientMode) -> Self {
        Self {
            url: url.into(),
            mode,
            ..Default::default()
        }
    }

    /// Parse URL into components
    pub fn parse_url(&self) -> Result<ParsedUrl> {
        ParsedUrl::parse(&self.url)
    }
}

/// Parsed RTMP URL components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Host exactly as written in the URL, port included if present
    pub authority: String,
    pub host: String,
    pub port: u16,
    pub app: String,
    /// Everything after the app segment, without the query
    pub stream_path: String,
    pub query: Vec<(String, String)>,
}

impl ParsedUrl {
    /// Split `rtmp://host[:port]/app/stream_path[?query]`
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("rtmp://")
            .ok_or_else(|| Error::Config(format!("unsupported URL scheme: {}", url)))?;

        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("missing application in URL: {}", url)))?;
        if authority.is_empty() {
            return Err(Error::Config(format!("missing host in URL: {}", url)));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port in URL: {}", url)))?;
                (h.to_string(), port)
            }
            None => (authority.to_string(), RTMP_PORT),
        };

        let (app, stream) = path
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("missing stream path in URL: {}", url)))?;
        if app.is_empty() {
            return Err(Error::Config(format!("empty application in URL: {}", url)));
        }

        let (stream_path, query) = match stream.split_once('?') {
            Some((s, q)) => (s, parse_query(q)),
            None => (stream, Vec::new()),
        };
        if stream_path.is_empty() {
            return Err(Error::Config(format!("empty stream path in URL: {}", url)));
        }

        Ok(Self {
            authority: authority.to_string(),
            host,
            port,
            app: app.to_string(),
            stream_path: stream_path.to_string(),
            query,
        })
    }

    /// `rtmp://host[:port]/app`, sent as tcUrl in the connect command
    pub fn tc_url(&self) -> String {
        format!("rtmp://{}/{}", self.authority, self.app)
    }

    /// Stream name used for play/publish, with the query re-attached
    pub fn play_path(&self) -> String {
        if self.query.is_empty() {
            return self.stream_path.clone();
        }

        let query = self
            .query
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.stream_path, query)
    }

    /// Address for `TcpStream::connect`
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
