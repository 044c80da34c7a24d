//! Per-chunk signal processing
//!
//! Simulates a radio channel on every streamed chunk: the station filters
//! and modulates what it records, the tuner demodulates and filters what it
//! receives. Each chunk is processed on its own, with no state carried over
//! to the next one.

pub mod filter;
pub mod pcm;
pub mod processor;

pub use processor::{Signal, SignalProcessor};

use bytes::Bytes;

use crate::constants::CHANNELS;
use crate::error::ModulationError;
use crate::protocol::ModulationType;

/// Station side: recorded samples to the packet payload
pub fn transmit_chunk(modulation: ModulationType, samples: &[i16]) -> Bytes {
    let recorded = SignalProcessor::from_samples(modulation, samples);

    if !modulation.is_modulated() {
        return recorded.encode();
    }

    recorded.lowpass().modulate().encode()
}

/// Tuner side: packet payload to playable frames
pub fn receive_chunk(
    modulation: ModulationType,
    packet: &[u8],
) -> Result<Vec<[i16; CHANNELS]>, ModulationError> {
    let received = SignalProcessor::from_pcm(modulation, packet)?;

    if !modulation.is_modulated() {
        return Ok(received.output());
    }

    Ok(received.demodulate().lowpass().output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CHUNK_SIZE, PACKAGE_SIZE};

    #[test]
    fn test_unmodulated_chunk_passes_through() {
        let samples: Vec<i16> = (0..(CHUNK_SIZE * CHANNELS) as i32).map(|i| (i * 7 - 3000) as i16).collect();

        let payload = transmit_chunk(ModulationType::None, &samples);
        assert_eq!(payload.len(), PACKAGE_SIZE);

        let frames = receive_chunk(ModulationType::None, &payload).unwrap();
        let flat: Vec<i16> = frames.iter().flatten().copied().collect();
        assert_eq!(flat, samples);
    }

    #[test]
    fn test_modulated_chunk_keeps_size() {
        let samples: Vec<i16> = (0..CHUNK_SIZE * CHANNELS)
            .map(|i| ((i as f64 * 0.01).sin() * 8000.0) as i16)
            .collect();

        for modulation in [ModulationType::Am, ModulationType::AmSc] {
            let payload = transmit_chunk(modulation, &samples);
            assert_eq!(payload.len(), PACKAGE_SIZE);

            let frames = receive_chunk(modulation, &payload).unwrap();
            assert_eq!(frames.len(), CHUNK_SIZE);
        }
    }

    #[test]
    fn test_odd_payload_rejected() {
        let err = receive_chunk(ModulationType::Am, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ModulationError::InvalidSignalType(_)));
    }
}
