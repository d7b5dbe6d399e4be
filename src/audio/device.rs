//! Input device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};

use crate::config::DeviceSelector;
use crate::error::CaptureError;

/// Description of an input device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available input devices
pub fn list_input_devices() -> Vec<InputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            let (sample_rates, channels) = get_device_capabilities(&device);
            Some(InputDeviceInfo {
                index,
                is_default: default_name.as_ref() == Some(&name),
                name,
                sample_rates,
                channels,
            })
        })
        .collect()
}

/// Common sample rates the device accepts, and its channel counts
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_input_configs() {
        for config in configs {
            for rate_val in [16000u32, 22050, 44100, 48000, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort();
    channels.sort();

    (sample_rates, channels)
}

/// Resolve a configured selector to a cpal device
pub fn select_input_device(selector: &DeviceSelector) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();

    match selector {
        DeviceSelector::Default => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceNotFound("No default input device".to_string())),
        DeviceSelector::Name(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.clone())),
        DeviceSelector::Index(index) => host
            .input_devices()?
            .nth(*index)
            .ok_or_else(|| CaptureError::DeviceNotFound(format!("input device #{}", index))),
    }
}
