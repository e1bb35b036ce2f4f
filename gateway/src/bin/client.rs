//! Streaming transcription client.
//!
//! Streams raw PCM audio to a chorus-gateway server and prints the
//! transcriptions that come back. Audio is read from `--input` when given,
//! otherwise from stdin (pipe a capture tool into it for live use):
//!
//! ```text
//! arecord -f S16_LE -r 16000 -c 1 -t raw | chorus-client --output transcript.txt
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, warn};

use chorus_gateway::handlers::stream::messages::{AudioFrameRequest, TranscriptResponse};

/// One 1024-sample buffer of 16-bit PCM. Small frames keep latency bounded.
const FRAME_SIZE: usize = 2048;

/// Chorus Gateway streaming client
#[derive(Parser, Debug)]
#[command(name = "chorus-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// WebSocket server URL
    #[arg(long, default_value = "ws://localhost:8081/ws")]
    url: String,

    /// Output file path for transcriptions (optional)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Input audio file path, used in place of live capture (raw 16-bit LE
    /// mono PCM). Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let audio: Box<dyn tokio::io::AsyncRead + Unpin + Send> = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            eprintln!("Using input file: {}", path.display());
            Box::new(file)
        }
        None => {
            eprintln!("Reading audio from stdin");
            Box::new(tokio::io::stdin())
        }
    };

    let mut output = match &cli.output {
        Some(path) => Some(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?,
        ),
        None => None,
    };

    let (ws_stream, _response) = connect_async(cli.url.as_str())
        .await
        .with_context(|| format!("websocket dial failed for {}", cli.url))?;
    let (sink, mut stream) = ws_stream.split();

    println!("Streaming... Press Ctrl+C to stop.");

    let send_task = tokio::spawn(stream_audio(sink, audio));

    // Keep printing transcriptions until the server closes or the user
    // interrupts; the server may still be flushing results after our audio
    // has ended.
    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let response: TranscriptResponse = match serde_json::from_str(&text) {
                            Ok(response) => response,
                            Err(err) => {
                                warn!(error = %err, "failed to parse transcript response");
                                continue;
                            }
                        };

                        let line = format!(
                            "[{}] {} (confidence: {:.2})",
                            Local::now().format("%H:%M:%S"),
                            response.sentence,
                            response.confidence,
                        );
                        println!("{line}");

                        if let Some(file) = output.as_mut() {
                            if let Err(err) = writeln!(file, "{line}").and_then(|_| file.flush()) {
                                warn!(error = %err, "failed to write to output file");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("Server closed the stream.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!("\nDone.");
                break;
            }
        }
    }

    send_task.abort();
    Ok(())
}

/// Read PCM frames from the audio source and ship them to the server.
async fn stream_audio(
    mut sink: futures::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    mut audio: Box<dyn tokio::io::AsyncRead + Unpin + Send>,
) {
    let mut buf = vec![0u8; FRAME_SIZE];

    loop {
        let read = match audio.read(&mut buf).await {
            Ok(0) => {
                debug!("audio source exhausted");
                return;
            }
            Ok(read) => read,
            Err(err) => {
                warn!(error = %err, "audio read error");
                return;
            }
        };

        let request = AudioFrameRequest::from_pcm(&buf[..read]);
        let json = match serde_json::to_string(&request) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize audio frame");
                continue;
            }
        };

        if let Err(err) = sink.send(Message::Text(json.into())).await {
            warn!(error = %err, "websocket write error");
            return;
        }
    }
}
