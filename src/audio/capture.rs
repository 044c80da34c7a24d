//! Audio capture from input devices
//!
//! Every connected client records through its own capture instance. The
//! `cpal` stream lives on a dedicated thread and feeds a [`SampleFifo`] that
//! the streaming worker drains in fixed-size blocks.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{SampleFifo, SharedFifo};
use crate::audio::device::{find_input_device, stream_config, CaptureDevice, CaptureOpener};
use crate::constants::{CHANNELS, CHUNK_SIZE};
use crate::error::AudioError;
use crate::protocol::ClientRecord;

/// How long a read waits before re-checking the stream state
const READ_POLL: Duration = Duration::from_millis(100);

/// Default FIFO capacity: eight chunks
pub const DEFAULT_CAPTURE_FIFO: usize = CHUNK_SIZE * CHANNELS * 8;

/// Microphone capture through `cpal`
pub struct CpalCapture {
    /// Label used for the thread name and logs
    label: String,

    /// Whether the stream thread should keep running
    running: Arc<AtomicBool>,

    /// Samples recorded by the callback
    fifo: SharedFifo,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Receiver<AudioError>,

    /// Total samples captured
    samples_captured: Arc<AtomicU64>,
}

impl CpalCapture {
    /// Open `device` (or the default input) and start recording
    pub fn open(label: &str, device: Option<&str>, fifo_capacity: usize) -> Result<Self, AudioError> {
        let device = find_input_device(device)?;
        let config = stream_config();

        let running = Arc::new(AtomicBool::new(true));
        let fifo: SharedFifo = Arc::new(SampleFifo::new(fifo_capacity.max(CHUNK_SIZE * CHANNELS)));
        let samples_captured = Arc::new(AtomicU64::new(0));
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let handle = {
            let running = running.clone();
            let fifo = fifo.clone();
            let samples_captured = samples_captured.clone();

            thread::Builder::new()
                .name(format!("capture-{}", label))
                .spawn(move || {
                    let callback_fifo = fifo.clone();
                    let stream = device.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let block: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                            samples_captured.fetch_add(block.len() as u64, Ordering::Relaxed);
                            callback_fifo.push(&block);
                        },
                        move |err| {
                            let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                        },
                        None,
                    );

                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                            return;
                        }
                    };

                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    // Keep the stream alive while running
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(10));
                    }

                    fifo.close();
                })
                .map_err(|e| AudioError::StreamError(e.to_string()))?
        };

        ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("capture thread exited".to_string()))??;

        tracing::debug!("Capture {} started", label);

        Ok(Self {
            label: label.to_string(),
            running,
            fifo,
            thread_handle: Some(handle),
            error_rx,
            samples_captured,
        })
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.fifo.close();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::debug!("Capture {} stopped", self.label);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total samples captured
    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// Samples dropped because the worker fell behind
    pub fn overflow_count(&self) -> usize {
        self.fifo.overflow_count()
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl CaptureDevice for CpalCapture {
    fn read(&mut self, frames: usize) -> Result<Vec<i16>, AudioError> {
        loop {
            if let Some(err) = self.check_errors() {
                return Err(err);
            }

            if let Some(block) = self.fifo.pop_exact(frames * CHANNELS, READ_POLL) {
                return Ok(block);
            }

            if !self.is_running() || self.fifo.is_closed() {
                return Err(AudioError::Closed);
            }
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens a fresh `cpal` capture for each client
#[derive(Debug, Clone, Default)]
pub struct CpalCaptureOpener {
    /// Input device name, `None` for the default device
    pub device: Option<String>,
    pub fifo_capacity: usize,
}

impl CpalCaptureOpener {
    pub fn new(device: Option<String>, fifo_capacity: usize) -> Self {
        Self { device, fifo_capacity }
    }
}

impl CaptureOpener for CpalCaptureOpener {
    fn open(&self, client: &ClientRecord) -> Result<Box<dyn CaptureDevice>, AudioError> {
        let capture = CpalCapture::open(&client.name, self.device.as_deref(), self.fifo_capacity)?;
        Ok(Box::new(capture))
    }
}

/// Scale a float sample in `[-1, 1]` to int16
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        assert_eq!(f32_to_i16(2.5), i16::MAX);
        assert_eq!(f32_to_i16(0.5), 16383);
    }

    #[test]
    fn test_capture_creation() {
        // Only meaningful on machines with an input device
        if crate::audio::device::list_devices().iter().any(|d| d.is_input) {
            if let Ok(mut capture) = CpalCapture::open("test", None, DEFAULT_CAPTURE_FIFO) {
                assert!(capture.is_running());
                capture.stop();
                assert!(!capture.is_running());
            }
        }
    }
}
