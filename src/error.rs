//! Error types for the radio streamer

use thiserror::Error;

use crate::protocol::ClientId;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Modulation error: {0}")]
    Modulation(#[from] ModulationError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures while establishing a connection or binding a port
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection refused by {0}")]
    Refused(String),

    #[error("Connection attempt to {0} timed out")]
    Timeout(String),

    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Invalid port number: {0:?}")]
    InvalidPort(String),

    #[error("Port number out of range (0-65535): {0}")]
    PortOutOfRange(String),

    #[error("Port {0} is already in use")]
    PortAlreadyUsed(u16),
}

/// Failures of an established (or expected) session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Client name is not defined")]
    UndefinedName,

    #[error("Client name must not be empty")]
    InvalidName,

    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Server disconnected")]
    ServerDisconnected,

    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// Signal processor errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModulationError {
    #[error("Invalid modulation type: {0:?}")]
    InvalidModulationType(String),

    #[error("Invalid signal type: {0}")]
    InvalidSignalType(String),
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device closed")]
    Closed,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the error only means the peer went away
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Error::Session(SessionError::ClientDisconnected | SessionError::ServerDisconnected)
        )
    }
}
