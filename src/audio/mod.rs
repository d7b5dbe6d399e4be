//! Audio subsystem module

pub mod device;
pub mod monitor;
pub mod sampler;

pub use device::{list_input_devices, select_input_device, InputDeviceInfo};
pub use monitor::{run_capture_loop, AudioMonitor, MonitorStatus, RetryPolicy};
pub use sampler::{rms, CpalSampler, FrameSource};
