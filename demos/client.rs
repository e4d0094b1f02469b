//! RTMP client example
//!
//! Run with: cargo run --example client -- <rtmp_url> [play|publish]
//!
//! Examples:
//!   cargo run --example client -- rtmp://localhost/live/test_key
//!   cargo run --example client -- rtmp://localhost/live/test_key publish
//!
//! In play mode the stream is pulled until the server closes it and a
//! running count of audio/video messages is printed. In publish mode the
//! client waits for NetStream.Publish.Start and then sends a few silent
//! AAC frames.

use bytes::Bytes;
use rtmp_client::protocol::constants::{MSG_AUDIO, MSG_DATA_AMF0, MSG_VIDEO};
use rtmp_client::{ClientConfig, ClientMode, PublishEvent, RtmpConnector, RtmpPublisher};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_client=debug".parse()?)
                .add_directive("client=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let url = match args.get(1) {
        Some(url) => url.clone(),
        None => {
            eprintln!("Usage: client <rtmp_url> [play|publish]");
            eprintln!("Example: client rtmp://localhost/live/test_key");
            std::process::exit(1);
        }
    };
    let mode = match args.get(2).map(String::as_str) {
        None | Some("play") => ClientMode::Read,
        Some("publish") => ClientMode::Write,
        Some(other) => {
            eprintln!("Unknown mode '{}', expected play or publish", other);
            std::process::exit(1);
        }
    };

    let config = ClientConfig::new(&url, mode);
    match mode {
        ClientMode::Read => play(config).await,
        ClientMode::Write => publish(config).await,
    }
}

async fn play(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Playing {}", config.url);

    let mut connector = RtmpConnector::new(config)?;
    let (tx, mut rx) = mpsc::channel(256);
    connector.set_media_sender(tx);

    let counter = tokio::spawn(async move {
        let (mut audio, mut video, mut data) = (0u64, 0u64, 0u64);
        while let Some(packet) = rx.recv().await {
            match packet.message_type {
                MSG_AUDIO => audio += 1,
                MSG_VIDEO => video += 1,
                MSG_DATA_AMF0 => data += 1,
                _ => {}
            }
            if audio + video > 0 && (audio + video) % 100 == 0 {
                println!("Progress: {} video, {} audio, {} data", video, audio, data);
            }
        }
        (audio, video, data)
    });

    connector.connect().await?;
    connector.handshake().await?;
    let result = connector.connect_stream().await;

    // Dropping the connector closes the media channel
    let state_line = format!(
        "has_audio={} has_video={} metadata={}",
        connector.state().has_audio,
        connector.state().has_video,
        connector.state().received_metadata
    );
    drop(connector);

    let (audio, video, data) = counter.await?;
    println!("Received {} video, {} audio, {} data messages", video, audio, data);
    println!("{}", state_line);

    result?;
    Ok(())
}

async fn publish(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Publishing to {}", config.url);

    let (mut publisher, mut events) = RtmpPublisher::new(config);
    let event_handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PublishEvent::Connected => println!("Connected"),
                PublishEvent::Publishing => println!("Publishing"),
                PublishEvent::Error(e) => eprintln!("Error: {}", e),
                PublishEvent::Disconnected => {
                    println!("Disconnected");
                    break;
                }
            }
        }
    });

    publisher.connect().await?;

    // AAC LC, 44.1 kHz, stereo sequence header followed by silent frames
    publisher
        .send_audio(Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]), 0)
        .await?;
    for i in 0..50u32 {
        publisher
            .send_audio(Bytes::from_static(&[0xAF, 0x01, 0x21, 0x00, 0x03, 0x80]), i * 23)
            .await?;
    }

    publisher.disconnect().await?;
    drop(publisher);
    event_handle.await?;
    Ok(())
}
