//! The station: accept loop plus one worker thread per client

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::CaptureOpener;
use crate::constants::CHUNK_SIZE;
use crate::error::{AudioError, Error, Result, SessionError};
use crate::modulation::transmit_chunk;
use crate::network::{ServerSession, Shutdown};
use crate::protocol::{ClientId, ClientRecord};

/// What one worker streamed before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub chunks_sent: u64,
    pub bytes_sent: u64,
}

/// Streams a capture device to every client of a bound [`ServerSession`]
pub struct Station {
    session: Arc<ServerSession>,
    opener: Arc<dyn CaptureOpener>,
    shutdown: Shutdown,
}

impl Station {
    pub fn new(session: Arc<ServerSession>, opener: Arc<dyn CaptureOpener>) -> Self {
        Self {
            session,
            opener,
            shutdown: Shutdown::new(),
        }
    }

    /// Use an existing cancellation signal
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Handle that stops [`run`](Self::run) from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: self.shutdown.clone(),
            session: self.session.clone(),
        }
    }

    pub fn session(&self) -> &Arc<ServerSession> {
        &self.session
    }

    /// Accept clients until shutdown, then close the session and wait for
    /// every worker.
    ///
    /// Failed handshakes are logged and skipped. Returns the stats of every
    /// worker that ran.
    pub fn run(&self) -> Result<Vec<WorkerStats>> {
        let mut workers: Vec<JoinHandle<WorkerStats>> = Vec::new();
        let mut finished = Vec::new();

        let outcome = loop {
            match self.session.accept(&self.shutdown) {
                Ok(Some(client)) => match self.spawn_worker(client) {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        tracing::error!("failed to start worker for {}: {}", client, e);
                        let _ = self.session.bye(client);
                    }
                },
                Ok(None) => break Ok(()),
                Err(Error::Session(SessionError::SessionClosed)) => break Ok(()),
                Err(e @ Error::Session(_)) | Err(e @ Error::Modulation(_)) => {
                    tracing::warn!("client rejected: {}", e);
                }
                Err(e) => break Err(e),
            }

            let (done, running): (Vec<_>, Vec<_>) = workers.into_iter().partition(|h| h.is_finished());
            workers = running;
            finished.extend(done.into_iter().filter_map(|h| h.join().ok()));
        };

        // Closing the sockets first unblocks workers stuck in a send
        self.shutdown.trigger();
        self.session.shutdown();
        finished.extend(workers.into_iter().filter_map(|h| h.join().ok()));

        tracing::info!("Station stopped after serving {} clients", finished.len());
        outcome.map(|_| finished)
    }

    fn spawn_worker(&self, client: ClientId) -> Result<JoinHandle<WorkerStats>> {
        let worker = Worker {
            client,
            record: self.session.record(client)?,
            session: self.session.clone(),
            opener: self.opener.clone(),
            shutdown: self.shutdown.clone(),
        };

        thread::Builder::new()
            .name(format!("client-{}", client.0))
            .spawn(move || worker.run())
            .map_err(|e| AudioError::StreamError(format!("worker spawn failed: {}", e)).into())
    }
}

/// Stops a running [`Station`].
///
/// Setting the flag alone is not enough while the accept loop waits on a
/// peer that never finishes its handshake, so the session is shut down too.
#[derive(Clone)]
pub struct StopHandle {
    shutdown: Shutdown,
    session: Arc<ServerSession>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shutdown.trigger();
        self.session.shutdown();
    }
}

struct Worker {
    client: ClientId,
    record: ClientRecord,
    session: Arc<ServerSession>,
    opener: Arc<dyn CaptureOpener>,
    shutdown: Shutdown,
}

impl Worker {
    fn run(self) -> WorkerStats {
        let peer = self
            .session
            .peer_addr(self.client)
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let nick = self.record.color.paint(&self.record.name);

        let joined = if self.record.modulation.is_modulated() {
            format!(" in {}", self.record.modulation.as_str().to_uppercase())
        } else {
            String::new()
        };
        let _ = self.session.log(format!("{} just connected{}! ({})", nick, joined, peer));

        let stats = match self.stream(&peer) {
            Ok(stats) => stats,
            Err(e) => {
                if !e.is_disconnect() && !self.shutdown.is_triggered() {
                    tracing::error!("worker for {} failed: {}", self.record.name, e);
                }
                WorkerStats::default()
            }
        };

        match self.session.bye(self.client) {
            Ok(_) => {
                let _ = self.session.log(format!("{} left the server ({})", nick, peer));
            }
            Err(Error::Session(SessionError::UnknownClient(_) | SessionError::SessionClosed)) => {}
            Err(e) => tracing::warn!("bye {} failed: {}", self.client, e),
        }

        tracing::debug!(
            "worker {} done: {} chunks, {} bytes",
            self.client,
            stats.chunks_sent,
            stats.bytes_sent
        );
        stats
    }

    fn stream(&self, peer: &str) -> Result<WorkerStats> {
        let modulation = self.record.modulation;

        let info = if modulation.is_modulated() {
            format!("Listening in {} modulation", modulation.as_str().to_uppercase())
        } else {
            "Listening without modulation".to_string()
        };
        for line in [
            format!("Welcome to the radio, {}!", self.record.name),
            format!("Your address is {}", peer),
            info,
            "You can press Ctrl+C to disconnect".to_string(),
        ] {
            self.session.send_string(self.client, &line)?;
        }

        let mut device = self.opener.open(&self.record)?;
        let mut stats = WorkerStats::default();

        while !self.shutdown.is_triggered() {
            let block = device.read(CHUNK_SIZE)?;
            if block.is_empty() {
                break;
            }

            let payload = transmit_chunk(modulation, &block);
            match self.session.send_packet(self.client, &payload) {
                Ok(()) => {
                    stats.chunks_sent += 1;
                    stats.bytes_sent += payload.len() as u64;
                }
                Err(e) if e.is_disconnect() => break,
                Err(e) => return Err(e),
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureDevice, MemoryCapture};
    use crate::network::ClientSession;
    use std::time::Duration;

    fn silent_opener() -> Arc<dyn CaptureOpener> {
        Arc::new(|_: &ClientRecord| -> std::result::Result<Box<dyn CaptureDevice>, AudioError> {
            Ok(Box::new(MemoryCapture::new(vec![vec![0; CHUNK_SIZE * 2]; 2])))
        })
    }

    /// Records forever, as fast as the socket takes it
    struct Tone;

    impl CaptureDevice for Tone {
        fn read(&mut self, frames: usize) -> std::result::Result<Vec<i16>, AudioError> {
            Ok(vec![1; frames * 2])
        }
    }

    fn endless_opener() -> Arc<dyn CaptureOpener> {
        Arc::new(|_: &ClientRecord| -> std::result::Result<Box<dyn CaptureDevice>, AudioError> {
            Ok(Box::new(Tone))
        })
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let session = Arc::new(ServerSession::new());
        session.bind("127.0.0.1", "0").unwrap();

        let station = Station::new(session.clone(), silent_opener());
        let shutdown = station.shutdown_handle();

        let handle = thread::spawn(move || station.run());
        thread::sleep(Duration::from_millis(150));
        shutdown.trigger();

        let stats = handle.join().unwrap().unwrap();
        assert!(stats.is_empty());
        assert!(!crate::network::Session::is_open(&*session));
    }

    #[test]
    fn test_stop_aborts_pending_handshake() {
        let session = Arc::new(ServerSession::new());
        let addr = session.bind("127.0.0.1", "0").unwrap();

        let station = Station::new(session.clone(), silent_opener());
        let stopper = station.stop_handle();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(station.run());
        });

        let _silent = std::net::TcpStream::connect(addr).unwrap();
        thread::sleep(Duration::from_millis(300));
        stopper.stop();

        let stats = done_rx.recv_timeout(Duration::from_secs(3)).unwrap().unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_stop_releases_worker_blocked_on_stalled_client() {
        let endless = endless_opener();

        let session = Arc::new(ServerSession::new());
        let addr = session.bind("127.0.0.1", "0").unwrap();

        let station = Station::new(session.clone(), endless);
        let stopper = station.stop_handle();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(station.run());
        });

        // Completes the handshake, then never reads
        let mut client = ClientSession::with_name("stalled").unwrap();
        client.connect("", "127.0.0.1", &addr.port().to_string()).unwrap();
        client.acknowledge().unwrap();
        thread::sleep(Duration::from_millis(500));

        stopper.stop();
        let stats = done_rx.recv_timeout(Duration::from_secs(3)).unwrap().unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].chunks_sent > 0);
    }

    #[test]
    fn test_shutdown_flag_releases_stalled_worker() {
        let endless = endless_opener();

        let session = Arc::new(ServerSession::new());
        let addr = session.bind("127.0.0.1", "0").unwrap();

        let station = Station::new(session.clone(), endless);
        let shutdown = station.shutdown_handle();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(station.run());
        });

        let mut client = ClientSession::with_name("stalled").unwrap();
        client.connect("", "127.0.0.1", &addr.port().to_string()).unwrap();
        client.acknowledge().unwrap();
        thread::sleep(Duration::from_millis(500));

        shutdown.trigger();
        let stats = done_rx.recv_timeout(Duration::from_secs(3)).unwrap().unwrap();
        assert_eq!(stats.len(), 1);
    }

    #[test]
    fn test_worker_streams_until_device_ends() {
        let session = Arc::new(ServerSession::new());
        let addr = session.bind("127.0.0.1", "0").unwrap();

        let station = Station::new(session.clone(), silent_opener());
        let shutdown = station.shutdown_handle();
        let handle = thread::spawn(move || station.run());

        let mut client = ClientSession::with_name("alice").unwrap();
        client.connect("", "127.0.0.1", &addr.port().to_string()).unwrap();
        client.acknowledge().unwrap();

        let greeting = client.greeting().unwrap();
        assert_eq!(greeting[0], "Welcome to the radio, alice!");
        assert_eq!(greeting[2], "Listening without modulation");

        assert_eq!(client.recv_packet().unwrap().len(), crate::constants::PACKAGE_SIZE);
        assert_eq!(client.recv_packet().unwrap().len(), crate::constants::PACKAGE_SIZE);
        assert!(client.recv_packet().unwrap().is_empty());

        shutdown.trigger();
        let stats = handle.join().unwrap().unwrap();
        assert_eq!(
            stats,
            vec![WorkerStats {
                chunks_sent: 2,
                bytes_sent: 2 * crate::constants::PACKAGE_SIZE as u64,
            }]
        );
    }
}
