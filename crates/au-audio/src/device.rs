//! Audio output device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::{AudioError, AudioResult};

/// Output device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub output_channels: u16,
    pub sample_rates: Vec<u32>,
}

/// Get the audio host (platform-specific backend)
pub fn get_host() -> Host {
    cpal::default_host()
}

/// List available output devices
pub fn list_output_devices() -> AudioResult<Vec<DeviceInfo>> {
    let host = get_host();
    let default_name = host
        .default_output_device()
        .as_ref()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
    {
        if let Ok(name) = device.name() {
            let is_default = default_name.as_ref().map(|d| d == &name).unwrap_or(false);
            let (output_channels, sample_rates) = output_capabilities(&device);
            devices.push(DeviceInfo {
                name,
                is_default,
                output_channels,
                sample_rates,
            });
        }
    }
    Ok(devices)
}

/// Get the default output device
pub fn get_default_output_device() -> AudioResult<Device> {
    let host = get_host();
    host.default_output_device().ok_or(AudioError::NoDevice)
}

/// Get an output device by name
pub fn get_output_device_by_name(name: &str) -> AudioResult<Device> {
    let host = get_host();
    for device in host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
    {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

fn output_capabilities(device: &Device) -> (u16, Vec<u32>) {
    let mut channels = 0u16;
    let mut rates = Vec::new();
    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            channels = channels.max(config.channels());
            for rate in [44100, 48000, 88200, 96000, 192000] {
                if config.min_sample_rate().0 <= rate
                    && rate <= config.max_sample_rate().0
                    && !rates.contains(&rate)
                {
                    rates.push(rate);
                }
            }
        }
    }
    rates.sort_unstable();
    (channels, rates)
}
