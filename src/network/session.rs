//! Session base: open/closed state, event log and guarded socket I/O
//!
//! Both ends of a connection share these pieces. Raw `std::io` failures stop
//! here and are turned into [`SessionError`]s.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crate::constants::PACKAGE_SIZE;
use crate::error::SessionError;
use crate::protocol;

/// Lifecycle shared by client and server sessions.
///
/// Opening is type-specific: [`ClientSession::connect`] dials a station,
/// [`ServerSession::bind`] starts listening.
///
/// [`ClientSession::connect`]: crate::network::ClientSession::connect
/// [`ServerSession::bind`]: crate::network::ServerSession::bind
pub trait Session {
    /// Whether the session currently owns an open socket
    fn is_open(&self) -> bool;

    /// Close the socket and clear the session state
    fn disconnect(&mut self);

    /// Snapshot of the event log, empty while closed
    fn events(&self) -> Vec<LogEntry>;

    /// Fail with [`SessionError::SessionClosed`] unless open
    fn check_open(&self) -> Result<(), SessionError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SessionError::SessionClosed)
        }
    }
}

/// One timestamped session event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%d/%m/%Y %H:%M:%S"), self.message)
    }
}

/// Presentation hook called for every appended entry
pub type LogObserver = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Ordered event log that exists only while its session is open
#[derive(Default)]
pub struct SessionLog {
    entries: Mutex<Option<Vec<LogEntry>>>,
    observer: Mutex<Option<LogObserver>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh, empty log
    pub fn open(&self) {
        *self.entries.lock() = Some(Vec::new());
    }

    /// Drop every entry; appends fail until reopened
    pub fn close(&self) {
        *self.entries.lock() = None;
    }

    /// Install the presentation observer
    pub fn set_observer(&self, observer: LogObserver) {
        *self.observer.lock() = Some(observer);
    }

    /// Append a message, failing while the session is closed
    pub fn append(&self, message: impl Into<String>) -> Result<(), SessionError> {
        let entry = LogEntry {
            at: Local::now(),
            message: message.into(),
        };

        {
            let mut entries = self.entries.lock();
            let entries = entries.as_mut().ok_or(SessionError::SessionClosed)?;
            entries.push(entry.clone());
        }

        tracing::debug!("{}", entry.message);

        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer(&entry);
        }

        Ok(())
    }

    /// Snapshot of the entries
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLog").field("entries", &self.len()).finish()
    }
}

/// Single read of at most [`PACKAGE_SIZE`] bytes; empty means the peer
/// closed the connection.
pub(crate) fn recv_raw(stream: &TcpStream, gone: SessionError) -> Result<Bytes, SessionError> {
    let mut buf = BytesMut::zeroed(PACKAGE_SIZE);
    let mut reader = stream;

    loop {
        match reader.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf.freeze());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("recv failed: {}", e);
                return Err(gone);
            }
        }
    }
}

/// Send at most [`PACKAGE_SIZE`] bytes. With `ensure` the whole buffer is
/// written, otherwise a single write is attempted.
pub(crate) fn send_raw(
    stream: &TcpStream,
    bytes: &[u8],
    ensure: bool,
    gone: SessionError,
) -> Result<usize, SessionError> {
    if bytes.len() > PACKAGE_SIZE {
        return Err(SessionError::PacketTooLarge(bytes.len()));
    }

    let mut writer = stream;
    let result = if ensure {
        writer.write_all(bytes).map(|_| bytes.len())
    } else {
        writer.write(bytes)
    };

    result.map_err(|e| {
        tracing::debug!("send failed: {}", e);
        gone
    })
}

/// Read one full packet; empty means a clean close on a packet boundary
pub(crate) fn recv_packet(stream: &TcpStream, gone: SessionError) -> Result<Bytes, SessionError> {
    let mut reader = stream;
    protocol::read_packet(&mut reader).map_err(|e| {
        tracing::debug!("packet read failed: {}", e);
        gone
    })
}

/// Write one padded packet
pub(crate) fn send_packet(stream: &TcpStream, payload: &[u8], gone: SessionError) -> Result<(), SessionError> {
    if payload.len() > PACKAGE_SIZE {
        return Err(SessionError::PacketTooLarge(payload.len()));
    }

    let mut writer = stream;
    protocol::write_packet(&mut writer, payload).map_err(|e| {
        tracing::debug!("packet write failed: {}", e);
        gone
    })
}

/// Read one control string; a closed connection is reported as `gone`
pub(crate) fn recv_control(stream: &TcpStream, gone: SessionError) -> Result<String, SessionError> {
    let packet = recv_packet(stream, gone.clone())?;
    if packet.is_empty() {
        return Err(gone);
    }
    Ok(protocol::decode_control(&packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_log_requires_open_session() {
        let log = SessionLog::new();
        assert_eq!(log.append("nope"), Err(SessionError::SessionClosed));

        log.open();
        log.append("first").unwrap();
        log.append("second").unwrap();
        let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);

        log.close();
        assert!(log.entries().is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_log_observer() {
        let seen = Arc::new(AtomicUsize::new(0));
        let log = SessionLog::new();
        {
            let seen = seen.clone();
            log.set_observer(Arc::new(move |_: &LogEntry| {
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        }

        log.open();
        log.append("a").unwrap();
        log.append("b").unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_entry_display() {
        let entry = LogEntry {
            at: Local::now(),
            message: "hello".to_string(),
        };
        let text = entry.to_string();
        assert!(text.starts_with('['));
        assert!(text.ends_with("] hello"));
    }
}
