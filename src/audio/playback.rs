//! Audio playback to output devices

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{SampleFifo, SharedFifo};
use crate::audio::device::{find_output_device, stream_config, PlaybackDevice};
use crate::constants::{CHANNELS, CHUNK_SIZE};
use crate::error::AudioError;

/// Default FIFO capacity: four chunks of latency
pub const DEFAULT_PLAYBACK_FIFO: usize = CHUNK_SIZE * CHANNELS * 4;

/// Speaker output through `cpal`
pub struct CpalPlayback {
    running: Arc<AtomicBool>,
    fifo: SharedFifo,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
}

impl CpalPlayback {
    /// Open `device` (or the default output) and start playing silence
    pub fn open(device: Option<&str>, fifo_capacity: usize) -> Result<Self, AudioError> {
        let device = find_output_device(device)?;
        let config = stream_config();

        let running = Arc::new(AtomicBool::new(true));
        let fifo: SharedFifo = Arc::new(SampleFifo::new(fifo_capacity.max(CHUNK_SIZE * CHANNELS)));
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let handle = {
            let running = running.clone();
            let fifo = fifo.clone();

            thread::Builder::new()
                .name("playback".to_string())
                .spawn(move || {
                    let callback_fifo = fifo.clone();
                    let mut scratch: Vec<i16> = Vec::new();

                    let stream = device.build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            scratch.resize(data.len(), 0);
                            callback_fifo.pop_into(&mut scratch);
                            for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                                *out = sample as f32 / 32_768.0;
                            }
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

                    while running.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(10));
                    }

                    fifo.close();
                })
                .map_err(|e| AudioError::StreamError(e.to_string()))?
        };

        ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("playback thread exited".to_string()))??;

        Ok(Self {
            running,
            fifo,
            thread_handle: Some(handle),
            error_rx,
        })
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.fifo.close();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Callbacks that ran dry
    pub fn underrun_count(&self) -> usize {
        self.fifo.underrun_count()
    }

    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl PlaybackDevice for CpalPlayback {
    fn write(&mut self, frames: &[[i16; CHANNELS]]) -> Result<(), AudioError> {
        if let Some(err) = self.check_errors() {
            return Err(err);
        }

        let flat: Vec<i16> = frames.iter().flatten().copied().collect();
        self.fifo.push_blocking(&flat)
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
