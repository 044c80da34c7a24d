//! # Radio Streamer
//!
//! Live microphone audio streamed from one station to many listeners over
//! plain TCP, optionally passed through a simulated AM / AM-SC radio channel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              STATION                                 │
//! │                                                                      │
//! │   ┌──────────────────────────┐     ┌──────────────────────────────┐  │
//! │   │ Accept loop              │     │ Client registry              │  │
//! │   │ (stream::station)        │────▶│ (network::server, Mutex)     │  │
//! │   │ poll 100 ms, handshake   │     │ name / colour / modulation   │  │
//! │   └────────────┬─────────────┘     └──────────────────────────────┘  │
//! │                │ one thread per client                               │
//! │       ┌────────┴────────┬─────────────────┐                          │
//! │       ▼                 ▼                 ▼                          │
//! │  ┌─────────┐       ┌─────────┐       ┌─────────┐                     │
//! │  │ Capture │       │ Capture │       │ Capture │                     │
//! │  └────┬────┘       └────┬────┘       └────┬────┘                     │
//! │       ▼                 ▼                 ▼                          │
//! │  ┌─────────┐       ┌─────────┐       ┌─────────┐                     │
//! │  │ Lowpass │       │ Lowpass │       │  (none) │                     │
//! │  │   AM    │       │  AM-SC  │       │         │                     │
//! │  └────┬────┘       └────┬────┘       └────┬────┘                     │
//! └───────┼─────────────────┼─────────────────┼──────────────────────────┘
//!         │  4096-byte PCM packets over TCP   │
//!         ▼                 ▼                 ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Tuner        │  │ Tuner        │  │ Tuner        │
//! │ demod + LPF  │  │ demod + LPF  │  │ passthrough  │
//! │ → speaker    │  │ → speaker    │  │ → speaker    │
//! └──────────────┘  └──────────────┘  └──────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod modulation;
pub mod network;
pub mod protocol;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Transmission packet size in bytes (4 KiB)
    pub const PACKAGE_SIZE: usize = 1024 * 4;

    /// Number of audio channels
    pub const CHANNELS: usize = 2;

    /// Bytes per PCM sample (int16)
    pub const SAMPLE_BYTES: usize = 2;

    /// Frames per streamed chunk, sized so one chunk fills one packet
    pub const CHUNK_SIZE: usize = PACKAGE_SIZE / CHANNELS / SAMPLE_BYTES;

    /// Device frame rate in Hz
    pub const FRAME_RATE: u32 = 44_100;

    /// AM carrier frequency in Hz
    pub const AM_CARRIER_FREQ: f64 = 3_000.0;

    /// Lowpass cutoff frequency in Hz
    pub const CUTOFF: f64 = 1_000.0;

    /// Maximum time for a client connection attempt
    pub const ATTEMPT_TIME: Duration = Duration::from_secs(3);

    /// Pending connections the listener queues before refusing
    pub const BACKLOG_SIZE: i32 = 10;

    /// Interval between listener readiness checks
    pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Default port
    pub const DEFAULT_PORT: u16 = 33_000;

    /// Default hostname
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Informational lines the station sends after the handshake
    pub const GREETING_LINES: usize = 4;
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn test_chunk_fills_one_packet() {
        assert_eq!(CHUNK_SIZE, 1024);
        assert!(CHUNK_SIZE * CHANNELS * SAMPLE_BYTES <= PACKAGE_SIZE);
    }
}
