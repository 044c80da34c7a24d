//! In-memory devices
//!
//! Scripted capture and recording playback, used by tests and for streaming
//! without sound hardware.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::audio::device::{CaptureDevice, PlaybackDevice};
use crate::constants::CHANNELS;
use crate::error::AudioError;

/// Capture device replaying a fixed list of blocks.
///
/// Each read returns the next block as-is regardless of the requested size,
/// then an empty block once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapture {
    blocks: VecDeque<Vec<i16>>,
}

impl MemoryCapture {
    pub fn new(blocks: Vec<Vec<i16>>) -> Self {
        Self {
            blocks: blocks.into(),
        }
    }

    /// Blocks not yet read
    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

impl CaptureDevice for MemoryCapture {
    fn read(&mut self, _frames: usize) -> Result<Vec<i16>, AudioError> {
        Ok(self.blocks.pop_front().unwrap_or_default())
    }
}

/// Playback device recording every frame it is given.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlayback {
    frames: Arc<Mutex<Vec<[i16; CHANNELS]>>>,
}

impl MemoryPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything played so far
    pub fn frames(&self) -> Vec<[i16; CHANNELS]> {
        self.frames.lock().clone()
    }

    /// Everything played so far, flattened to interleaved samples
    pub fn samples(&self) -> Vec<i16> {
        self.frames.lock().iter().flatten().copied().collect()
    }
}

impl PlaybackDevice for MemoryPlayback {
    fn write(&mut self, frames: &[[i16; CHANNELS]]) -> Result<(), AudioError> {
        self.frames.lock().extend_from_slice(frames);
        Ok(())
    }
}

/// Playback device forwarding each written block over a channel
#[derive(Debug, Clone)]
pub struct ChannelPlayback {
    tx: Sender<Vec<[i16; CHANNELS]>>,
}

impl ChannelPlayback {
    pub fn new() -> (Self, Receiver<Vec<[i16; CHANNELS]>>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl PlaybackDevice for ChannelPlayback {
    fn write(&mut self, frames: &[[i16; CHANNELS]]) -> Result<(), AudioError> {
        self.tx.send(frames.to_vec()).map_err(|_| AudioError::Closed)
    }
}
