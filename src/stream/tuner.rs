//! The tuner: plays what the station streams to one client

use crate::audio::PlaybackDevice;
use crate::error::{Error, Result, SessionError};
use crate::modulation::receive_chunk;
use crate::network::{ClientSession, Session, Shutdown};

/// How a listening session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The station closed the connection cleanly
    Graceful,
    /// The connection was reset
    Reset,
    /// Stopped locally through the shutdown signal
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunerReport {
    pub chunks_played: u64,
    pub end: StreamEnd,
}

/// Receives, demodulates and plays one client's stream
pub struct Tuner<'a> {
    session: &'a ClientSession,
    shutdown: Shutdown,
}

impl<'a> Tuner<'a> {
    /// `session` must already be connected
    pub fn new(session: &'a ClientSession, shutdown: Shutdown) -> Self {
        Self { session, shutdown }
    }

    /// Acknowledge, read the greeting, then play packets until the station
    /// closes or `shutdown` fires.
    ///
    /// To stop a blocked receive, trigger the shutdown and then interrupt the
    /// session through its [`Interrupter`](crate::network::Interrupter).
    pub fn listen(&self, speaker: &mut dyn PlaybackDevice) -> Result<TunerReport> {
        self.session.check_open()?;
        let modulation = self.session.modulation()?;

        self.session.acknowledge()?;
        self.session.greeting()?;

        let mut chunks_played = 0u64;
        let end = loop {
            if self.shutdown.is_triggered() {
                break StreamEnd::Interrupted;
            }

            let packet = match self.session.recv_packet() {
                Ok(packet) => packet,
                Err(Error::Session(SessionError::ServerDisconnected)) if self.shutdown.is_triggered() => {
                    break StreamEnd::Interrupted
                }
                Err(Error::Session(SessionError::ServerDisconnected)) => break StreamEnd::Reset,
                Err(e) => return Err(e),
            };

            if packet.is_empty() {
                break if self.shutdown.is_triggered() {
                    StreamEnd::Interrupted
                } else {
                    StreamEnd::Graceful
                };
            }

            let frames = receive_chunk(modulation, &packet)?;
            speaker.write(&frames)?;
            chunks_played += 1;
        };

        tracing::info!("Stopped listening after {} chunks ({:?})", chunks_played, end);
        Ok(TunerReport { chunks_played, end })
    }
}
