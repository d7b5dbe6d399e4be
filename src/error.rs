//! Error types for the overlay

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio capture errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Input buffer overrun ({dropped} samples dropped)")]
    Overrun { dropped: usize },

    #[error("Read timed out")]
    Timeout,

    #[error("Stream disconnected")]
    Disconnected,

    #[error("cpal error: {0}")]
    CpalError(String),
}

impl CaptureError {
    /// Whether the capture loop should retry after a short backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Overrun { .. } | CaptureError::Timeout)
    }
}

impl From<cpal::DevicesError> for CaptureError {
    fn from(err: cpal::DevicesError) -> Self {
        CaptureError::DeviceNotFound(format!("Failed to enumerate devices: {}", err))
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        CaptureError::CpalError(format!("Failed to get default stream config: {}", err))
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(err: cpal::BuildStreamError) -> Self {
        CaptureError::StreamError(format!("Failed to build input stream: {}", err))
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(err: cpal::PlayStreamError) -> Self {
        CaptureError::StreamError(format!("Failed to start input stream: {}", err))
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Skin folder not found: {0}")]
    SkinNotFound(PathBuf),

    #[error("Skin folder must end with '.al': {0}")]
    InvalidSkinName(PathBuf),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Image loading and display errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Image file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image has no frames: {0}")]
    Empty(PathBuf),

    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
