//! Startup wiring
//!
//! Resolves the skin, starts the audio monitor and hands the overlay the
//! receiving end of the mode channel.

use std::fs;
use std::path::PathBuf;

use crate::audio::{select_input_device, AudioMonitor, CpalSampler, FrameSource};
use crate::config::{default_skin_dir, AppConfig, DisplayProfiles};
use crate::error::{CaptureError, Result};
use crate::mode::{mode_channel, ModeReceiver};

/// A running capture session and the configuration it was started with
pub struct Session {
    pub config: AppConfig,
    pub receiver: ModeReceiver,
    pub monitor: AudioMonitor,
}

/// Skin directory to use; without one the per-user default is created
pub fn resolve_skin_dir(skin: Option<PathBuf>) -> Result<PathBuf> {
    match skin {
        Some(dir) => Ok(dir),
        None => {
            let dir = default_skin_dir()?;
            fs::create_dir_all(&dir)?;
            Ok(dir)
        }
    }
}

impl Session {
    /// Capture from the configured input device
    pub fn start(config: AppConfig) -> Result<Self> {
        let audio = config.audio.clone();
        Self::start_with(config, move || {
            let device = select_input_device(&audio.device)?;
            CpalSampler::open(&device, &audio)
        })
    }

    /// Capture from the source produced by `open` on the audio thread
    pub fn start_with<S, F>(config: AppConfig, open: F) -> Result<Self>
    where
        S: FrameSource,
        F: FnOnce() -> std::result::Result<S, CaptureError> + Send + 'static,
    {
        warn_missing_images(&config.profiles);

        let (sender, receiver) = mode_channel();
        let monitor = AudioMonitor::start(&config.audio, config.thresholds.clone(), sender, open)?;

        tracing::info!(
            "Audio: {}Hz, {} channel(s), {} samples/frame ({:.1}ms)",
            config.audio.sample_rate,
            config.audio.channels,
            config.audio.frame_size,
            config.audio.frame_duration().as_secs_f64() * 1000.0
        );

        Ok(Self {
            config,
            receiver,
            monitor,
        })
    }
}

/// Log every mode whose image is missing; returns how many are
fn warn_missing_images(profiles: &DisplayProfiles) -> usize {
    let mut missing = 0;
    for mode in profiles.modes() {
        if let Some(profile) = profiles.get(&mode) {
            if !profile.image.exists() {
                tracing::warn!("Image for mode {} not found: {}", mode, profile.image.display());
                missing += 1;
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use std::time::{Duration, Instant};

    /// Endless loud frames, paced like a real device
    struct Loud;

    impl FrameSource for Loud {
        fn next_frame(&mut self) -> std::result::Result<Vec<i16>, CaptureError> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(vec![500; 64])
        }
    }

    #[test]
    fn test_session_delivers_modes() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::defaults(dir.path());

        let mut session = Session::start_with(config, || Ok(Loud)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            received = session.receiver.try_recv();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(received, Some(Mode::new("talking")));

        session.monitor.stop();
        assert!(!session.monitor.is_running());
    }

    #[test]
    fn test_open_failure_closes_channel() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::defaults(dir.path());

        let mut session = Session::start_with(config, || {
            Err::<Loud, _>(CaptureError::DeviceNotFound("none".into()))
        })
        .unwrap();

        session.monitor.stop();
        assert!(session.receiver.is_closed());
    }

    #[test]
    fn test_missing_images_counted() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::defaults(dir.path());
        assert_eq!(warn_missing_images(&config.profiles), 3);

        std::fs::write(dir.path().join("normal.png"), b"").unwrap();
        assert_eq!(warn_missing_images(&config.profiles), 2);
    }

    #[test]
    fn test_explicit_skin_dir_kept() {
        let dir = PathBuf::from("/skins/cat.al");
        assert_eq!(resolve_skin_dir(Some(dir.clone())).unwrap(), dir);
    }
}
