//! Listener side of the session protocol

use bytes::Bytes;
use std::io;
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpStream, ToSocketAddrs};

use crate::constants::{ATTEMPT_TIME, DEFAULT_HOST, GREETING_LINES};
use crate::error::{ConnectionError, Result, SessionError};
use crate::network::session::{self, LogEntry, Session, SessionLog};
use crate::protocol::{parse_port, ColorTag, ModulationType, HANDSHAKE_ACK};

const GONE: SessionError = SessionError::ServerDisconnected;

struct Connection {
    stream: TcpStream,
    server: SocketAddr,
    local: SocketAddr,
    modulation: ModulationType,
    color: ColorTag,
}

/// A named listener and, once connected, its socket to the station
#[derive(Default)]
pub struct ClientSession {
    name: Option<String>,
    connection: Option<Connection>,
    log: SessionLog,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(name: &str) -> Result<Self> {
        let mut session = Self::new();
        session.set_name(name)?;
        Ok(session)
    }

    /// Set the name announced to the station
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidName.into());
        }
        self.name = Some(name.to_string());
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Connect and run the first half of the handshake.
    ///
    /// Blank `modulation`, `host` and `port` fall back to no modulation,
    /// [`DEFAULT_HOST`] and the default port. The colour assigned by the
    /// station is returned; [`acknowledge`](Self::acknowledge) completes the
    /// handshake.
    pub fn connect(&mut self, modulation: &str, host: &str, port: &str) -> Result<ColorTag> {
        let name = self.name.clone().ok_or(SessionError::UndefinedName)?;

        let modulation = match modulation.trim() {
            "" => ModulationType::default(),
            other => other.parse()?,
        };
        let host = match host.trim() {
            "" => DEFAULT_HOST,
            host => host,
        };
        let port = parse_port(port)?;

        let server = (host, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConnectionError::UnknownHost(host.to_string()))?;

        if self.is_open() {
            self.disconnect();
        }

        tracing::debug!("connecting to {} as {}", server, name);
        let stream = TcpStream::connect_timeout(&server, ATTEMPT_TIME).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionError::Timeout(server.to_string()),
            _ => ConnectionError::Refused(server.to_string()),
        })?;
        let _ = stream.set_nodelay(true);
        let local = stream.local_addr().unwrap_or(server);

        session::send_packet(&stream, name.as_bytes(), GONE)?;
        let color_name = session::recv_control(&stream, GONE)?;
        let color: ColorTag = color_name
            .parse()
            .map_err(SessionError::HandshakeFailed)?;
        session::send_packet(&stream, modulation.as_str().as_bytes(), GONE)?;

        self.connection = Some(Connection {
            stream,
            server,
            local,
            modulation,
            color,
        });
        self.log.open();
        self.log.append(format!("Connected to {} as {}", server, color.paint(&name)))?;

        Ok(color)
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| SessionError::SessionClosed.into())
    }

    /// Finish the handshake so the station starts streaming
    pub fn acknowledge(&self) -> Result<()> {
        self.send_packet(HANDSHAKE_ACK.as_bytes())
    }

    /// Read the station's greeting, appending each line to the log
    pub fn greeting(&self) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(GREETING_LINES);
        for _ in 0..GREETING_LINES {
            let line = self.recv_string()?;
            self.log.append(line.clone())?;
            lines.push(line);
        }
        Ok(lines)
    }

    /// Single read of at most one packet; empty means the station closed
    pub fn recv(&self) -> Result<Bytes> {
        Ok(session::recv_raw(&self.connection()?.stream, GONE)?)
    }

    /// Read one full packet; empty means the station closed
    pub fn recv_packet(&self) -> Result<Bytes> {
        Ok(session::recv_packet(&self.connection()?.stream, GONE)?)
    }

    pub fn recv_string(&self) -> Result<String> {
        Ok(session::recv_control(&self.connection()?.stream, GONE)?)
    }

    /// Send raw bytes (at most one packet)
    pub fn send(&self, bytes: &[u8], ensure: bool) -> Result<usize> {
        Ok(session::send_raw(&self.connection()?.stream, bytes, ensure, GONE)?)
    }

    pub fn send_packet(&self, payload: &[u8]) -> Result<()> {
        Ok(session::send_packet(&self.connection()?.stream, payload, GONE)?)
    }

    pub fn send_string(&self, text: &str) -> Result<()> {
        self.send_packet(text.as_bytes())
    }

    pub fn color(&self) -> Result<ColorTag> {
        Ok(self.connection()?.color)
    }

    pub fn modulation(&self) -> Result<ModulationType> {
        Ok(self.connection()?.modulation)
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection()?.server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.connection()?.local)
    }

    /// Append to the session log
    pub fn log(&self, message: impl Into<String>) -> Result<()> {
        Ok(self.log.append(message)?)
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    /// Handle that can unblock a pending read from another thread
    pub fn interrupter(&self) -> Result<Interrupter> {
        let stream = self.connection()?.stream.try_clone().map_err(|_| GONE)?;
        Ok(Interrupter { stream })
    }
}

impl Session for ClientSession {
    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Closes the socket; the name is kept for the next connect
    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.stream.shutdown(SocketShutdown::Both);
            tracing::info!("Disconnected from {}", connection.server);
        }
        self.log.close();
    }

    fn events(&self) -> Vec<LogEntry> {
        self.log.entries()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Shuts down a client socket from outside the thread reading it
#[derive(Debug)]
pub struct Interrupter {
    stream: TcpStream,
}

impl Interrupter {
    pub fn interrupt(&self) {
        let _ = self.stream.shutdown(SocketShutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::network::{ServerSession, Shutdown};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_name_validation() {
        let mut client = ClientSession::new();
        assert!(matches!(client.set_name("   "), Err(Error::Session(SessionError::InvalidName))));
        assert!(client.name().is_none());

        client.set_name(" alice ").unwrap();
        assert_eq!(client.name(), Some("alice"));
    }

    #[test]
    fn test_connect_requires_name() {
        let mut client = ClientSession::new();
        let err = client.connect("", "127.0.0.1", "1").unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::UndefinedName)));
    }

    #[test]
    fn test_connect_argument_errors() {
        let mut client = ClientSession::with_name("alice").unwrap();

        assert!(matches!(
            client.connect("fm", "", ""),
            Err(Error::Modulation(_))
        ));
        assert!(matches!(
            client.connect("", "", "abc"),
            Err(Error::Connection(ConnectionError::InvalidPort(_)))
        ));
        assert!(matches!(
            client.connect("", "", "70000"),
            Err(Error::Connection(ConnectionError::PortOutOfRange(_)))
        ));
        assert!(!client.is_open());
    }

    #[test]
    fn test_connect_unknown_host() {
        let mut client = ClientSession::with_name("alice").unwrap();
        let err = client.connect("", "nonexistent.invalid", "").unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::UnknownHost(ref host)) if host == "nonexistent.invalid"
        ));
        assert!(!client.is_open());
    }

    #[test]
    fn test_single_write_send() {
        let server = Arc::new(ServerSession::new());
        let addr = server.bind("127.0.0.1", "0").unwrap();

        let station = {
            let server = server.clone();
            thread::spawn(move || server.accept(&Shutdown::new()).unwrap().unwrap())
        };

        let mut client = ClientSession::with_name("bob").unwrap();
        client.connect("", "127.0.0.1", &addr.port().to_string()).unwrap();
        client.acknowledge().unwrap();
        let id = station.join().unwrap();

        // A small write into an empty loopback buffer completes in one call
        assert_eq!(client.send(b"ping", false).unwrap(), 4);
        assert_eq!(&server.recv(id).unwrap()[..], b"ping");

        let err = client.send(&[0u8; crate::constants::PACKAGE_SIZE + 1], false).unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::PacketTooLarge(_))));
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut client = ClientSession::with_name("alice").unwrap();
        let err = client.connect("", "127.0.0.1", &port.to_string()).unwrap_err();
        assert!(matches!(err, Error::Connection(ConnectionError::Refused(_))));
    }

    #[test]
    fn test_closed_session_refuses_io() {
        let client = ClientSession::with_name("alice").unwrap();
        assert!(matches!(client.recv(), Err(Error::Session(SessionError::SessionClosed))));
        assert!(matches!(client.send(b"x", true), Err(Error::Session(SessionError::SessionClosed))));
        assert!(matches!(client.color(), Err(Error::Session(SessionError::SessionClosed))));
    }

    #[test]
    fn test_handshake_and_greeting() {
        let server = Arc::new(ServerSession::new());
        let addr = server.bind("127.0.0.1", "0").unwrap();

        let station = {
            let server = server.clone();
            thread::spawn(move || {
                let id = server.accept(&Shutdown::new()).unwrap().unwrap();
                for line in ["one", "two", "three", "four"] {
                    server.send_string(id, line).unwrap();
                }
                id
            })
        };

        let mut client = ClientSession::with_name("alice").unwrap();
        let color = client.connect("AM", "127.0.0.1", &addr.port().to_string()).unwrap();
        assert_eq!(color, ColorTag::Red);
        client.acknowledge().unwrap();

        let id = station.join().unwrap();
        assert_eq!(server.modulation(id).unwrap(), ModulationType::Am);
        assert_eq!(client.modulation().unwrap(), ModulationType::Am);
        assert_eq!(client.server_addr().unwrap(), addr);

        assert_eq!(client.greeting().unwrap(), vec!["one", "two", "three", "four"]);
        assert_eq!(client.events().len(), 5);

        server.bye(id).unwrap();
        assert!(client.recv_packet().unwrap().is_empty());

        client.disconnect();
        assert!(!client.is_open());
        assert_eq!(client.name(), Some("alice"));
        assert!(client.events().is_empty());
    }

    #[test]
    fn test_interrupter_unblocks_reader() {
        let server = Arc::new(ServerSession::new());
        let addr = server.bind("127.0.0.1", "0").unwrap();

        let station = {
            let server = server.clone();
            thread::spawn(move || server.accept(&Shutdown::new()).unwrap().unwrap())
        };

        let mut client = ClientSession::with_name("bob").unwrap();
        client.connect("", "127.0.0.1", &addr.port().to_string()).unwrap();
        client.acknowledge().unwrap();
        let _id = station.join().unwrap();

        let interrupter = client.interrupter().unwrap();
        let waker = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(50));
            interrupter.interrupt();
        });

        assert!(client.recv_packet().unwrap().is_empty());
        waker.join().unwrap();
    }
}
