//! Audio subsystem module
//!
//! The streaming loops only need fixed-block blocking I/O from a device,
//! expressed by [`CaptureDevice`] and [`PlaybackDevice`]. `cpal` adapters
//! bridge callback-driven hardware streams to that model through a
//! [`SampleFifo`]; in-memory devices serve tests and offline runs.

pub mod buffer;
pub mod capture;
pub mod device;
pub mod memory;
pub mod playback;

pub use buffer::SampleFifo;
pub use capture::{CpalCapture, CpalCaptureOpener};
pub use device::{list_devices, AudioDeviceInfo, CaptureDevice, CaptureOpener, PlaybackDevice};
pub use memory::{ChannelPlayback, MemoryCapture, MemoryPlayback};
pub use playback::CpalPlayback;
