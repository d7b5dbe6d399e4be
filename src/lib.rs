//! # Anilay
//!
//! Always-on-top overlay that swaps its image based on microphone loudness.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              AUDIO THREAD                     │
//! │  ┌─────────────┐   ┌──────────────────────┐   │
//! │  │ Microphone  │──▶│ Sampler (audio::     │   │
//! │  │   (cpal)    │   │ sampler) RMS/frame   │   │
//! │  └─────────────┘   └──────────┬───────────┘   │
//! │                               ▼               │
//! │                    ┌──────────────────────┐   │
//! │                    │ Mode Classifier      │   │
//! │                    │ (mode::classifier)   │   │
//! │                    │ thresholds + timeout │   │
//! │                    └──────────┬───────────┘   │
//! └───────────────────────────────┼───────────────┘
//!                                 │ mode changes only
//!                                 ▼
//!                  ┌──────────────────────────────┐
//!                  │ Mode Channel (mode::channel) │
//!                  │ single slot, latest wins     │
//!                  └──────────────┬───────────────┘
//!                                 │ wakes the UI
//! ┌───────────────────────────────┼───────────────┐
//! │               UI THREAD       ▼               │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ Overlay Controller (overlay::controller) │  │
//! │  │  anchor + per-mode offset, image scaling │  │
//! │  └────────────┬──────────────────┬─────────┘  │
//! │               ▼                  ▼            │
//! │  ┌──────────────────┐  ┌──────────────────┐   │
//! │  │ Animation        │  │ Surface (ui,     │   │
//! │  │ Scheduler        │─▶│ eframe window)   │   │
//! │  └──────────────────┘  └──────────────────┘   │
//! └───────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod mode;
pub mod overlay;
pub mod session;
pub mod shutdown;
#[cfg(feature = "overlay")]
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Name used for the per-user configuration directory
    pub const APP_NAME: &str = "anilay";

    /// Default capture sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default samples per channel in one analysis frame
    pub const DEFAULT_FRAME_SIZE: usize = 1024;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Quiet time before falling back to the default mode
    pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(500);

    /// Consecutive capture failures tolerated before giving up
    pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 50;

    /// Default bounding box for mode images, in pixels
    pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 100;

    /// Largest accepted capture sample rate
    pub const MAX_SAMPLE_RATE: u32 = 384_000;

    /// Largest accepted analysis frame, in samples per channel
    pub const MAX_FRAME_SIZE: usize = 1 << 16;

    /// Longest accepted silence timeout
    pub const MAX_SILENCE_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Largest accepted image bound, in pixels
    pub const MAX_IMAGE_DIMENSION: u32 = 8192;

    /// Largest accepted offset magnitude, in pixels
    pub const MAX_OFFSET: i32 = 100_000;

    pub const DEFAULT_TALKING_THRESHOLD: i64 = 20;
    pub const DEFAULT_SCREAMING_THRESHOLD: i64 = 2000;

    /// Chunks buffered between the device callback and the audio thread
    pub const CAPTURE_CHUNK_CAPACITY: usize = 64;

    /// Longest wait for one chunk before a read times out
    pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

    /// Pause after an overrun or timeout
    pub const TRANSIENT_BACKOFF: Duration = Duration::from_millis(100);

    /// Pause after any other capture error
    pub const ERROR_BACKOFF: Duration = Duration::from_millis(500);

    /// How long shutdown waits for the audio thread
    pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

    /// How often the shutdown watcher checks for a received signal
    pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(50);
}
