//! Command-line stand-in for the interview browser client.
//!
//! Connects to a running relay, streams a synthetic tone as microphone audio,
//! and reports what the interviewer sends back.

use anyhow::{Context, anyhow};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use interview_core::frame::{self, RESPONSE_AUDIO_DELTA};
use interview_relay::audio_utils;
use std::{collections::BTreeMap, time::Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser, Debug)]
#[command(name = "probe")]
#[command(version, about = "Streams a test tone through the interview relay", long_about = None)]
struct Cli {
    /// Relay endpoint to connect to
    #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Number of audio chunks to send
    #[arg(long, default_value_t = 50)]
    chunks: u32,

    /// Length of each chunk in milliseconds
    #[arg(long, default_value_t = 100)]
    chunk_ms: u64,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    frequency: f32,

    /// How long to keep listening after the last chunk, in seconds
    #[arg(long, default_value_t = 10)]
    listen_secs: u64,
}

/// Tally of everything received from the relay.
#[derive(Default)]
struct Report {
    frames_by_type: BTreeMap<String, u64>,
    samples: usize,
    close: Option<String>,
}

impl Report {
    fn record(&mut self, text: &str) {
        let kind = frame::frame_type(text)
            .map(|t| t.into_owned())
            .unwrap_or_else(|| "<untyped>".to_string());
        if kind == RESPONSE_AUDIO_DELTA {
            self.samples += audio_utils::audio_delta_samples(text).map_or(0, |s| s.len());
        } else {
            info!(frame_type = %kind, "Received frame");
        }
        *self.frames_by_type.entry(kind).or_default() += 1;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let args = Cli::parse();

    let (socket, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    info!(url = %args.url, "Connected to relay");
    let (mut tx, mut rx) = socket.split();

    let chunk = audio_utils::tone(args.frequency, Duration::from_millis(args.chunk_ms), 0.3);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.chunk_ms));
    let mut sent = 0u32;
    let mut report = Report::default();

    let listen = tokio::time::sleep(if args.chunks == 0 {
        Duration::from_secs(args.listen_secs)
    } else {
        Duration::MAX
    });
    tokio::pin!(listen);

    loop {
        tokio::select! {
            _ = ticker.tick(), if sent < args.chunks => {
                tx.send(Message::Text(audio_utils::append_frame(&chunk).into()))
                    .await
                    .context("Relay stopped accepting audio")?;
                sent += 1;
                if sent == args.chunks {
                    info!(chunks = sent, "Finished streaming audio");
                    listen
                        .as_mut()
                        .reset(tokio::time::Instant::now() + Duration::from_secs(args.listen_secs));
                }
            }
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) => report.record(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    report.close = Some(match frame {
                        Some(f) => format!("{} {}", u16::from(f.code), f.reason.as_str()),
                        None => "no close frame".to_string(),
                    });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Relay connection failed");
                    break;
                }
                None => break,
            },
            _ = &mut listen => {
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    println!("chunks sent: {sent}");
    for (kind, count) in &report.frames_by_type {
        println!("{count:>6}  {kind}");
    }
    println!(
        "audio received: {} samples ({:.2}s)",
        report.samples,
        audio_utils::playback_duration(report.samples).as_secs_f64()
    );
    if let Some(close) = &report.close {
        println!("closed by relay: {close}");
    }
    Ok(())
}
