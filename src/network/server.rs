//! Station side of the session protocol
//!
//! A [`ServerSession`] is shared (behind an `Arc`) between the accept loop
//! and every client worker. The only mutable shared state is the client
//! registry, guarded by a mutex; socket writes happen outside the lock on a
//! cloned `Arc<TcpStream>`.

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use crate::constants::{ACCEPT_POLL_INTERVAL, BACKLOG_SIZE};
use crate::error::{ConnectionError, Result, SessionError};
use crate::network::session::{self, LogEntry, Session, SessionLog};
use crate::network::Shutdown;
use crate::protocol::{parse_port, ClientId, ClientRecord, ColorTag, ModulationType, Palette, HANDSHAKE_ACK};

const GONE: SessionError = SessionError::ClientDisconnected;

struct ClientEntry {
    stream: Arc<TcpStream>,
    peer: SocketAddr,
    record: ClientRecord,
}

#[derive(Default)]
struct ClientRegistry {
    clients: HashMap<ClientId, ClientEntry>,
    palette: Palette,
    next_id: u64,
}

/// Listening socket plus the registry of handshaken clients
#[derive(Default)]
pub struct ServerSession {
    listener: Mutex<Option<TcpListener>>,
    address: Mutex<Option<SocketAddr>>,
    registry: Mutex<ClientRegistry>,
    /// Socket currently in the handshake, so shutdown can unblock it
    handshaking: Mutex<Option<Arc<TcpStream>>>,
    log: SessionLog,
}

impl ServerSession {
    /// A closed session
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind and listen.
    ///
    /// A blank `host` listens on every interface, a blank `port` selects the
    /// default one. Rebinding an open session shuts the previous one down
    /// once the new socket is listening; a failed rebind leaves it intact.
    pub fn bind(&self, host: &str, port: &str) -> Result<SocketAddr> {
        let port = parse_port(port)?;
        let host = match host.trim() {
            "" => "0.0.0.0",
            host => host,
        };

        let addr = (host, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConnectionError::UnknownHost(host.to_string()))?;

        let listener = Self::listen(addr).map_err(|e| {
            tracing::debug!("bind {} failed: {}", addr, e);
            ConnectionError::PortAlreadyUsed(port)
        })?;
        let local = listener.local_addr().unwrap_or(addr);

        if self.is_open() {
            self.shutdown();
        }

        {
            let mut registry = self.registry.lock();
            *registry = ClientRegistry::default();
        }
        *self.address.lock() = Some(local);
        *self.listener.lock() = Some(listener);

        self.log.open();
        self.log.append(format!("Connection established at {}", local))?;

        Ok(local)
    }

    fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.bind(&addr.into())?;
        socket.listen(BACKLOG_SIZE)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    /// Wait for the next client and run its handshake.
    ///
    /// The listener is polled every [`ACCEPT_POLL_INTERVAL`]; `Ok(None)` is
    /// returned once `shutdown` fires or the session is shut down. A
    /// concurrent [`shutdown`](Self::shutdown) also aborts a handshake in
    /// progress.
    pub fn accept(&self, shutdown: &Shutdown) -> Result<Option<ClientId>> {
        self.check_open()?;

        let (stream, peer) = loop {
            if shutdown.is_triggered() {
                return Ok(None);
            }

            let polled = match self.listener.lock().as_ref() {
                Some(listener) => listener.accept(),
                None => return Ok(None),
            };

            match polled {
                Ok(pair) => break pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted) => {}
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        };

        stream.set_nonblocking(false).map_err(|_| GONE)?;
        let _ = stream.set_nodelay(true);
        let stream = Arc::new(stream);

        let color = self.registry.lock().palette.next_color();

        {
            let mut handshaking = self.handshaking.lock();
            if !self.is_open() {
                let _ = stream.shutdown(SocketShutdown::Both);
                return Ok(None);
            }
            *handshaking = Some(stream.clone());
        }
        let handshake = Self::handshake(&stream, color);
        *self.handshaking.lock() = None;

        let (name, modulation) = match handshake {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("handshake with {} failed: {}", peer, e);
                let _ = stream.shutdown(SocketShutdown::Both);
                return Err(e);
            }
        };

        let record = ClientRecord { name, color, modulation };

        let mut registry = self.registry.lock();
        if !self.is_open() {
            let _ = stream.shutdown(SocketShutdown::Both);
            return Ok(None);
        }

        registry.next_id += 1;
        let id = ClientId(registry.next_id);
        tracing::debug!("client {} ({}) registered from {}", id, record.name, peer);
        registry.clients.insert(id, ClientEntry { stream, peer, record });

        Ok(Some(id))
    }

    /// name → colour → modulation → ack
    fn handshake(stream: &TcpStream, color: ColorTag) -> Result<(String, ModulationType)> {
        let name = session::recv_control(stream, GONE)?;
        session::send_packet(stream, color.as_str().as_bytes(), GONE)?;

        let modulation: ModulationType = session::recv_control(stream, GONE)?.parse()?;

        let ack = session::recv_control(stream, GONE)?;
        if ack != HANDSHAKE_ACK {
            return Err(SessionError::HandshakeFailed(format!("expected {:?}, got {:?}", HANDSHAKE_ACK, ack)).into());
        }

        Ok((name, modulation))
    }

    /// Address the listener is bound to
    pub fn address(&self) -> Result<SocketAddr> {
        self.check_open()?;
        self.address.lock().ok_or_else(|| SessionError::SessionClosed.into())
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.registry.lock().clients.len()
    }

    /// Registered clients, oldest first
    pub fn clients(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.registry.lock().clients.keys().copied().collect();
        ids.sort();
        ids
    }

    fn with_entry<T>(&self, client: ClientId, f: impl FnOnce(&ClientEntry) -> T) -> Result<T> {
        self.check_open()?;
        let registry = self.registry.lock();
        let entry = registry
            .clients
            .get(&client)
            .ok_or(SessionError::UnknownClient(client))?;
        Ok(f(entry))
    }

    fn stream(&self, client: ClientId) -> Result<Arc<TcpStream>> {
        self.with_entry(client, |entry| entry.stream.clone())
    }

    pub fn record(&self, client: ClientId) -> Result<ClientRecord> {
        self.with_entry(client, |entry| entry.record.clone())
    }

    pub fn name(&self, client: ClientId) -> Result<String> {
        self.with_entry(client, |entry| entry.record.name.clone())
    }

    pub fn color(&self, client: ClientId) -> Result<ColorTag> {
        self.with_entry(client, |entry| entry.record.color)
    }

    pub fn modulation(&self, client: ClientId) -> Result<ModulationType> {
        self.with_entry(client, |entry| entry.record.modulation)
    }

    pub fn peer_addr(&self, client: ClientId) -> Result<SocketAddr> {
        self.with_entry(client, |entry| entry.peer)
    }

    /// Send raw bytes (at most one packet) to a client
    pub fn send(&self, client: ClientId, bytes: &[u8], ensure: bool) -> Result<usize> {
        let stream = self.stream(client)?;
        Ok(session::send_raw(&stream, bytes, ensure, GONE)?)
    }

    /// Single read of at most one packet; empty means the client closed
    pub fn recv(&self, client: ClientId) -> Result<Bytes> {
        let stream = self.stream(client)?;
        Ok(session::recv_raw(&stream, GONE)?)
    }

    /// Send one padded packet
    pub fn send_packet(&self, client: ClientId, payload: &[u8]) -> Result<()> {
        let stream = self.stream(client)?;
        Ok(session::send_packet(&stream, payload, GONE)?)
    }

    /// Read one full packet; empty means the client closed
    pub fn recv_packet(&self, client: ClientId) -> Result<Bytes> {
        let stream = self.stream(client)?;
        Ok(session::recv_packet(&stream, GONE)?)
    }

    pub fn send_string(&self, client: ClientId, text: &str) -> Result<()> {
        self.send_packet(client, text.as_bytes())
    }

    pub fn recv_string(&self, client: ClientId) -> Result<String> {
        let stream = self.stream(client)?;
        Ok(session::recv_control(&stream, GONE)?)
    }

    /// Best-effort packet fan-out.
    ///
    /// Returns the clients the packet could not be delivered to.
    pub fn broadcast(&self, payload: &[u8], excluding: &[ClientId]) -> Result<Vec<ClientId>> {
        self.check_open()?;

        let targets: Vec<(ClientId, Arc<TcpStream>)> = self
            .registry
            .lock()
            .clients
            .iter()
            .filter(|(id, _)| !excluding.contains(id))
            .map(|(id, entry)| (*id, entry.stream.clone()))
            .collect();

        let mut failed = Vec::new();
        for (id, stream) in targets {
            if let Err(e) = session::send_packet(&stream, payload, GONE) {
                tracing::debug!("broadcast to {} failed: {}", id, e);
                failed.push(id);
            }
        }
        failed.sort();

        Ok(failed)
    }

    pub fn broadcast_string(&self, text: &str, excluding: &[ClientId]) -> Result<Vec<ClientId>> {
        self.broadcast(text.as_bytes(), excluding)
    }

    /// Disconnect a client and forget it
    pub fn bye(&self, client: ClientId) -> Result<ClientRecord> {
        self.check_open()?;

        let entry = self
            .registry
            .lock()
            .clients
            .remove(&client)
            .ok_or(SessionError::UnknownClient(client))?;

        let _ = entry.stream.shutdown(SocketShutdown::Both);
        tracing::debug!("client {} ({}) removed", client, entry.record.name);

        Ok(entry.record)
    }

    /// Append to the session log
    pub fn log(&self, message: impl Into<String>) -> Result<()> {
        Ok(self.log.append(message)?)
    }

    /// The session log, for installing an observer
    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    /// Close every client socket, then the listener, and clear all state
    pub fn shutdown(&self) {
        let listener = self.listener.lock().take();

        if let Some(stream) = self.handshaking.lock().take() {
            let _ = stream.shutdown(SocketShutdown::Both);
        }

        let clients: Vec<ClientEntry> = {
            let mut registry = self.registry.lock();
            let clients = registry.clients.drain().map(|(_, entry)| entry).collect();
            *registry = ClientRegistry::default();
            clients
        };
        for entry in clients {
            let _ = entry.stream.shutdown(SocketShutdown::Both);
        }

        if listener.is_some() {
            tracing::info!("Server session closed");
        }
        drop(listener);

        *self.address.lock() = None;
        self.log.close();
    }
}

impl Session for ServerSession {
    fn is_open(&self) -> bool {
        self.listener.lock().is_some()
    }

    fn disconnect(&mut self) {
        self.shutdown();
    }

    fn events(&self) -> Vec<LogEntry> {
        self.log.entries()
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
