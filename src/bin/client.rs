//! Radio Listener
//!
//! Tunes in to a station and plays what it streams until Ctrl+C.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_streamer::{
    audio::{playback::DEFAULT_PLAYBACK_FIFO, CpalPlayback},
    config::AppConfig,
    network::{ClientSession, LogEntry, Shutdown},
    stream::{StreamEnd, Tuner},
};

/// Radio listener: plays a station's stream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name announced to the station
    #[arg(short, long)]
    name: Option<String>,

    /// Modulation: am, am-sc or none
    #[arg(short, long)]
    modulation: Option<String>,

    /// Station host
    #[arg(long)]
    host: Option<String>,

    /// Station port
    #[arg(short, long)]
    port: Option<String>,

    /// Configuration file (overrides the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback device name
    #[arg(short, long)]
    output_device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let name = args
        .name
        .or(config.client.name)
        .ok_or_else(|| anyhow!("no name given, pass --name or set client.name"))?;
    let modulation = args
        .modulation
        .unwrap_or_else(|| config.client.modulation.as_str().to_string());
    let host = args.host.unwrap_or(config.client.host);
    let port = args.port.unwrap_or_else(|| config.client.port.to_string());
    let output_device = args.output_device.or(config.audio.output_device);

    let mut session = ClientSession::with_name(&name)?;
    session
        .session_log()
        .set_observer(Arc::new(|entry: &LogEntry| println!("{}", entry)));

    let color = session.connect(&modulation, &host, &port)?;
    tracing::info!("Tuned in as {}", color);

    let mut speaker = CpalPlayback::open(output_device.as_deref(), DEFAULT_PLAYBACK_FIFO)?;
    let interrupter = session.interrupter()?;
    let shutdown = Shutdown::new();

    let mut task = {
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || {
            let tuner = Tuner::new(&session, shutdown);
            tuner.listen(&mut speaker)
        })
    };

    let report = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            shutdown.trigger();
            interrupter.interrupt();
            task.await?
        }
    }?;

    match report.end {
        StreamEnd::Graceful => println!("The station closed the broadcast"),
        StreamEnd::Reset => println!("Lost connection to the station"),
        StreamEnd::Interrupted => println!("Disconnected"),
    }
    tracing::info!("Played {} chunks", report.chunks_played);

    Ok(())
}
