//! Shared helpers for the loopback streaming tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use radio_streamer::audio::{CaptureDevice, CaptureOpener, MemoryCapture, MemoryPlayback};
use radio_streamer::error::AudioError;
use radio_streamer::network::{ClientSession, ServerSession, Shutdown};
use radio_streamer::protocol::ClientRecord;
use radio_streamer::stream::{Station, Tuner, TunerReport, WorkerStats};

pub type StationHandle = JoinHandle<radio_streamer::Result<Vec<WorkerStats>>>;

/// Opens a scripted capture per client name; unknown names get silence
pub struct ScriptedOpener {
    scripts: HashMap<String, Vec<Vec<i16>>>,
}

impl ScriptedOpener {
    pub fn silent() -> Self {
        Self {
            scripts: HashMap::new(),
        }
    }

    pub fn new(scripts: impl IntoIterator<Item = (&'static str, Vec<Vec<i16>>)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(name, blocks)| (name.to_string(), blocks))
                .collect(),
        }
    }
}

impl CaptureOpener for ScriptedOpener {
    fn open(&self, client: &ClientRecord) -> Result<Box<dyn CaptureDevice>, AudioError> {
        let blocks = self.scripts.get(&client.name).cloned().unwrap_or_default();
        Ok(Box::new(MemoryCapture::new(blocks)))
    }
}

/// Capture producing the same block forever, paced like a sound card
pub struct EndlessCapture(pub Vec<i16>);

impl CaptureDevice for EndlessCapture {
    fn read(&mut self, _frames: usize) -> Result<Vec<i16>, AudioError> {
        thread::sleep(Duration::from_millis(5));
        Ok(self.0.clone())
    }
}

/// Bind a loopback station on an ephemeral port and run it in the background
pub fn start_station(opener: Arc<dyn CaptureOpener>) -> (Arc<ServerSession>, SocketAddr, Shutdown, StationHandle) {
    let session = Arc::new(ServerSession::new());
    let addr = session.bind("127.0.0.1", "0").expect("bind loopback");

    let station = Station::new(session.clone(), opener);
    let shutdown = station.shutdown_handle();
    let handle = thread::spawn(move || station.run());

    (session, addr, shutdown, handle)
}

/// Connect, listen until the station stops, and return what was played
pub fn tune(name: &str, modulation: &str, addr: SocketAddr) -> (TunerReport, MemoryPlayback) {
    let mut session = ClientSession::with_name(name).expect("valid name");
    session
        .connect(modulation, "127.0.0.1", &addr.port().to_string())
        .expect("connect");

    let playback = MemoryPlayback::new();
    let mut speaker = playback.clone();
    let report = Tuner::new(&session, Shutdown::new())
        .listen(&mut speaker)
        .expect("listen");

    (report, playback)
}

/// A block of `frames` stereo frames counting up from `start`
pub fn ramp(start: i16, frames: usize) -> Vec<i16> {
    (0..frames * 2).map(|i| start.wrapping_add(i as i16)).collect()
}

/// Poll `condition` for up to two seconds
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}
