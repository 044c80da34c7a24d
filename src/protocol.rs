//! Wire protocol shared by station and tuner
//!
//! Every message on the wire is exactly [`PACKAGE_SIZE`] bytes. Control
//! strings are UTF-8 padded with NUL bytes, audio packets carry raw
//! little-endian PCM. There is no length prefix: both ends rely on the same
//! packet size.
//!
//! Handshake (client initiated):
//!
//! ```text
//! client ── name ──────────▶ station
//! client ◀────── colour ──── station
//! client ── modulation ────▶ station
//! client ── "OK" ──────────▶ station
//! client ◀── greeting x4 ─── station
//! client ◀── PCM packets ─── station   (until either side closes)
//! ```

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::num::IntErrorKind;
use std::str::FromStr;

use crate::constants::{DEFAULT_PORT, PACKAGE_SIZE};
use crate::error::{ConnectionError, ModulationError};

/// Literal the client sends to confirm the handshake
pub const HANDSHAKE_ACK: &str = "OK";

/// Server-side handle of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Modulation applied to a client's stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModulationType {
    /// Amplitude modulation with the carrier added
    Am,
    /// Amplitude modulation, suppressed carrier
    AmSc,
    /// Raw PCM, no radio simulation
    #[default]
    None,
}

impl ModulationType {
    pub const ALL: [ModulationType; 3] = [ModulationType::Am, ModulationType::AmSc, ModulationType::None];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ModulationType::Am => "am",
            ModulationType::AmSc => "am-sc",
            ModulationType::None => "none",
        }
    }

    /// Human-readable description used in greetings
    pub fn description(&self) -> &'static str {
        match self {
            ModulationType::Am => "Amplitude Modulation",
            ModulationType::AmSc => "Amplitude Modulation with Suppressed Carrier",
            ModulationType::None => "No modulation",
        }
    }

    pub fn is_modulated(&self) -> bool {
        !matches!(self, ModulationType::None)
    }
}

impl fmt::Display for ModulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModulationType {
    type Err = ModulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "am" => Ok(ModulationType::Am),
            "am-sc" | "am_sc" => Ok(ModulationType::AmSc),
            "none" => Ok(ModulationType::None),
            _ => Err(ModulationError::InvalidModulationType(s.to_string())),
        }
    }
}

/// Accent colour assigned to each client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorTag {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

/// Assignment order of client colours
pub const PALETTE: [ColorTag; 6] = [
    ColorTag::Red,
    ColorTag::Green,
    ColorTag::Yellow,
    ColorTag::Blue,
    ColorTag::Magenta,
    ColorTag::Cyan,
];

impl ColorTag {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorTag::Red => "red",
            ColorTag::Green => "green",
            ColorTag::Yellow => "yellow",
            ColorTag::Blue => "blue",
            ColorTag::Magenta => "magenta",
            ColorTag::Cyan => "cyan",
        }
    }

    /// ANSI escape sequence for terminal front-ends
    pub fn ansi(&self) -> &'static str {
        match self {
            ColorTag::Red => "\x1b[91m",
            ColorTag::Green => "\x1b[92m",
            ColorTag::Yellow => "\x1b[93m",
            ColorTag::Blue => "\x1b[94m",
            ColorTag::Magenta => "\x1b[95m",
            ColorTag::Cyan => "\x1b[96m",
        }
    }

    /// Wrap `text` in this colour, resetting afterwards
    pub fn paint(&self, text: &str) -> String {
        format!("{}{}\x1b[0m", self.ansi(), text)
    }
}

impl fmt::Display for ColorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PALETTE
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("unknown colour tag {:?}", s))
    }
}

/// Round-robin colour assignment
#[derive(Debug, Default)]
pub struct Palette {
    index: usize,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next colour, wrapping once the palette is exhausted
    pub fn next_color(&mut self) -> ColorTag {
        let color = PALETTE[self.index];
        self.index = (self.index + 1) % PALETTE.len();
        color
    }
}

/// What the station knows about a client once its handshake completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub name: String,
    pub color: ColorTag,
    pub modulation: ModulationType,
}

/// Parse a user-supplied port number. Blank input selects [`DEFAULT_PORT`].
pub fn parse_port(input: &str) -> Result<u16, ConnectionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_PORT);
    }

    match trimmed.parse::<i64>() {
        Ok(value) => u16::try_from(value).map_err(|_| ConnectionError::PortOutOfRange(trimmed.to_string())),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                Err(ConnectionError::PortOutOfRange(trimmed.to_string()))
            }
            _ => Err(ConnectionError::InvalidPort(trimmed.to_string())),
        },
    }
}

/// Read exactly one packet.
///
/// Returns an empty buffer when the peer closed the connection cleanly on a
/// packet boundary. A close in the middle of a packet is `UnexpectedEof`.
pub fn read_packet<R: Read>(reader: &mut R) -> io::Result<Bytes> {
    let mut buf = BytesMut::zeroed(PACKAGE_SIZE);
    let mut filled = 0;

    while filled < PACKAGE_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(Bytes::new()),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {} of {} bytes", filled, PACKAGE_SIZE),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(buf.freeze())
}

/// Write `payload` as one packet, zero-padded to [`PACKAGE_SIZE`]
pub fn write_packet<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > PACKAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds packet size", payload.len()),
        ));
    }

    let mut packet = [0u8; PACKAGE_SIZE];
    packet[..payload.len()].copy_from_slice(payload);
    writer.write_all(&packet)?;
    writer.flush()
}

/// Decode a control string, dropping the NUL padding
pub fn decode_control(packet: &[u8]) -> String {
    let end = packet.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&packet[..end]).into_owned()
}
