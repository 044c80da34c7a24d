//! Streaming loops: the station serving every client, and the tuner playing
//! what one client receives

pub mod station;
pub mod tuner;

pub use crate::network::Shutdown;
pub use station::{Station, StopHandle, WorkerStats};
pub use tuner::{StreamEnd, Tuner, TunerReport};
