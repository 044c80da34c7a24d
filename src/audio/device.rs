//! Device traits and `cpal` device enumeration

use cpal::traits::{DeviceTrait, HostTrait};

use crate::constants::{CHANNELS, FRAME_RATE};
use crate::error::AudioError;
use crate::protocol::ClientRecord;

/// A source of recorded audio read in fixed-size blocks
pub trait CaptureDevice: Send {
    /// Block until `frames` interleaved frames are available.
    ///
    /// An empty result means the device has nothing more to give.
    fn read(&mut self, frames: usize) -> Result<Vec<i16>, AudioError>;
}

/// A sink that plays interleaved frames, blocking while it is full
pub trait PlaybackDevice: Send {
    fn write(&mut self, frames: &[[i16; CHANNELS]]) -> Result<(), AudioError>;
}

/// Opens one capture device per connected client
pub trait CaptureOpener: Send + Sync {
    fn open(&self, client: &ClientRecord) -> Result<Box<dyn CaptureDevice>, AudioError>;
}

impl<F> CaptureOpener for F
where
    F: Fn(&ClientRecord) -> Result<Box<dyn CaptureDevice>, AudioError> + Send + Sync,
{
    fn open(&self, client: &ClientRecord) -> Result<Box<dyn CaptureDevice>, AudioError> {
        self(client)
    }
}

/// Description of an audio device
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Stream configuration every device is opened with
pub fn stream_config() -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: CHANNELS as u16,
        sample_rate: cpal::SampleRate(FRAME_RATE),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDeviceInfo> = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, true);
                devices.push(AudioDeviceInfo {
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);

                // Duplex devices show up in both lists
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                    continue;
                }

                let (sample_rates, channels) = get_device_capabilities(&device, false);
                devices.push(AudioDeviceInfo {
                    name,
                    is_input: false,
                    is_output: true,
                    is_default,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Supported sample rates (from a fixed list of common ones) and channel counts
fn get_device_capabilities(device: &cpal::Device, is_input: bool) -> (Vec<u32>, Vec<u16>) {
    let configs: Vec<cpal::SupportedStreamConfigRange> = if is_input {
        device.supported_input_configs().map(|c| c.collect()).unwrap_or_default()
    } else {
        device.supported_output_configs().map(|c| c.collect()).unwrap_or_default()
    };

    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    for config in configs {
        for rate_val in [44_100u32, 48_000, 88_200, 96_000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= config.min_sample_rate()
                && rate <= config.max_sample_rate()
                && !sample_rates.contains(&rate_val)
            {
                sample_rates.push(rate_val);
            }
        }

        if !channels.contains(&config.channels()) {
            channels.push(config.channels());
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();

    (sample_rates, channels)
}

/// Find an input device by name, or the default one
pub fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string())),
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
    }
}

/// Find an output device by name, or the default one
pub fn find_output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        Some(name) => host
            .output_devices()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ColorTag, ModulationType};

    struct Silence;

    impl CaptureDevice for Silence {
        fn read(&mut self, frames: usize) -> Result<Vec<i16>, AudioError> {
            Ok(vec![0; frames * CHANNELS])
        }
    }

    #[test]
    fn test_closure_opener() {
        let opener = |_: &ClientRecord| -> Result<Box<dyn CaptureDevice>, AudioError> { Ok(Box::new(Silence)) };
        let record = ClientRecord {
            name: "alice".to_string(),
            color: ColorTag::Red,
            modulation: ModulationType::None,
        };

        let mut device = opener.open(&record).unwrap();
        assert_eq!(device.read(4).unwrap().len(), 8);
    }

    #[test]
    fn test_stream_config() {
        let config = stream_config();
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate.0, 44_100);
    }
}
