//! Chunk-level modulation, demodulation and filtering

use bytes::Bytes;
use std::f64::consts::PI;

use crate::constants::{AM_CARRIER_FREQ, CHANNELS, CUTOFF, FRAME_RATE};
use crate::error::ModulationError;
use crate::modulation::{filter, pcm};
use crate::protocol::ModulationType;

/// Input accepted by [`SignalProcessor::new`]
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    /// Little-endian int16 PCM bytes, as received from the network
    Pcm(&'a [u8]),
    /// Flat interleaved samples
    Samples(&'a [i16]),
    /// Interleaved frames, as read from a device
    Frames(&'a [[i16; CHANNELS]]),
}

/// Transforms one chunk of audio.
///
/// Built per chunk, consumed by chaining:
///
/// ```
/// use radio_streamer::modulation::SignalProcessor;
/// use radio_streamer::protocol::ModulationType;
///
/// let payload = SignalProcessor::from_samples(ModulationType::AmSc, &[100, -100, 50, -50])
///     .lowpass()
///     .modulate()
///     .encode();
/// assert_eq!(payload.len(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct SignalProcessor {
    modulation: ModulationType,
    signal: Vec<f64>,
}

impl SignalProcessor {
    /// Create a processor from any supported signal representation
    pub fn new(modulation: ModulationType, signal: Signal<'_>) -> Result<Self, ModulationError> {
        let signal = match signal {
            Signal::Pcm(bytes) => pcm::decode(bytes)?.into_iter().map(f64::from).collect(),
            Signal::Samples(samples) => samples.iter().copied().map(f64::from).collect(),
            Signal::Frames(frames) => frames.iter().flatten().copied().map(f64::from).collect(),
        };

        Ok(Self { modulation, signal })
    }

    /// Create a processor from raw PCM bytes
    pub fn from_pcm(modulation: ModulationType, bytes: &[u8]) -> Result<Self, ModulationError> {
        Self::new(modulation, Signal::Pcm(bytes))
    }

    /// Create a processor from flat interleaved samples
    pub fn from_samples(modulation: ModulationType, samples: &[i16]) -> Self {
        Self {
            modulation,
            signal: samples.iter().copied().map(f64::from).collect(),
        }
    }

    /// Create a processor resolving the modulation from its wire name
    pub fn with_modulation_name(modulation: &str, signal: Signal<'_>) -> Result<Self, ModulationError> {
        Self::new(modulation.parse()?, signal)
    }

    pub fn modulation(&self) -> ModulationType {
        self.modulation
    }

    /// Number of samples in the working buffer
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    /// An empty chunk marks the end of a stream
    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    /// Modulate the chunk onto the carrier
    pub fn modulate(mut self) -> Self {
        match self.modulation {
            ModulationType::Am => {
                let carrier = self.carrier();
                for (s, c) in self.signal.iter_mut().zip(carrier) {
                    *s = (*s * c + c) / 2.0;
                }
            }
            ModulationType::AmSc => {
                let carrier = self.carrier();
                for (s, c) in self.signal.iter_mut().zip(carrier) {
                    *s *= c;
                }
            }
            ModulationType::None => {}
        }
        self
    }

    /// Recover the baseband signal.
    ///
    /// AM uses envelope detection (absolute value); AM-SC multiplies by a
    /// carrier regenerated from the sample index, assuming no drift between
    /// the two ends.
    pub fn demodulate(mut self) -> Self {
        match self.modulation {
            ModulationType::Am => {
                for s in &mut self.signal {
                    *s = s.abs();
                }
            }
            ModulationType::AmSc => {
                let carrier = self.carrier();
                for (s, c) in self.signal.iter_mut().zip(carrier) {
                    *s *= c;
                }
            }
            ModulationType::None => {}
        }
        self
    }

    /// Lowpass at the default cutoff
    pub fn lowpass(self) -> Self {
        self.lowpass_with(CUTOFF)
    }

    /// Lowpass with a filter as long as the current chunk.
    ///
    /// The taps are designed from scratch for every chunk, so nothing is
    /// carried across chunk boundaries.
    pub fn lowpass_with(mut self, cutoff: f64) -> Self {
        if self.signal.is_empty() {
            return self;
        }

        let taps = filter::lowpass_taps(self.signal.len(), cutoff, f64::from(FRAME_RATE));
        self.signal = filter::convolve_same(&self.signal, &taps);
        self
    }

    /// Working buffer as int16 samples
    pub fn samples(&self) -> Vec<i16> {
        self.signal.iter().copied().map(pcm::to_sample).collect()
    }

    /// Working buffer as int16 PCM bytes
    pub fn encode(&self) -> Bytes {
        pcm::encode(self.signal.iter().copied().map(pcm::to_sample))
    }

    /// Working buffer as interleaved frames for playback.
    ///
    /// A trailing partial frame is dropped.
    pub fn output(&self) -> Vec<[i16; CHANNELS]> {
        self.signal
            .chunks_exact(CHANNELS)
            .map(|frame| {
                let mut out = [0i16; CHANNELS];
                for (o, s) in out.iter_mut().zip(frame) {
                    *o = pcm::to_sample(*s);
                }
                out
            })
            .collect()
    }

    /// `cos(2π·f·t)` over the flat sample index
    fn carrier(&self) -> Vec<f64> {
        (0..self.signal.len())
            .map(|t| (2.0 * PI * t as f64 * AM_CARRIER_FREQ).cos())
            .collect()
    }
}
