//! Radio Station
//!
//! Streams the microphone to every connected listener until Ctrl+C.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_streamer::{
    audio::{list_devices, CpalCaptureOpener},
    config::AppConfig,
    network::{LogEntry, ServerSession},
    stream::Station,
};

/// Radio station: streams live audio to listeners over TCP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to listen on (blank for all)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<String>,

    /// Configuration file (overrides the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the available audio devices and exit
    #[arg(long, default_value = "false")]
    list_devices: bool,

    /// Capture device name
    #[arg(short, long)]
    input_device: Option<String>,
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

    if args.list_devices {
        println!("\n=== Available Input Devices ===");
        for device in list_devices().iter().filter(|d| d.is_input) {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        return Ok(());
    }

    let config = AppConfig::load(args.config.as_deref())?;
    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or_else(|| config.server.port.to_string());
    let input_device = args.input_device.or(config.audio.input_device);

    let session = Arc::new(ServerSession::new());
    session
        .session_log()
        .set_observer(Arc::new(|entry: &LogEntry| println!("{}", entry)));

    let address = session.bind(&host, &port)?;
    tracing::info!("Station listening on {}", address);
    session.log("Press Ctrl+C to shutdown")?;

    let opener = CpalCaptureOpener::new(input_device, config.audio.fifo_capacity);
    let station = Station::new(session, Arc::new(opener));
    let stopper = station.stop_handle();

    let mut task = tokio::task::spawn_blocking(move || station.run());

    let stats = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            stopper.stop();
            task.await?
        }
    }?;

    let chunks: u64 = stats.iter().map(|s| s.chunks_sent).sum();
    let bytes: u64 = stats.iter().map(|s| s.bytes_sent).sum();
    tracing::info!(
        "Served {} clients: {} chunks, {:.1} MiB",
        stats.len(),
        chunks,
        bytes as f64 / (1024.0 * 1024.0)
    );

    Ok(())
}
