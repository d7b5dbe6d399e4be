//! Audio monitoring thread
//!
//! Runs the sampler and the mode classifier on a dedicated thread and posts
//! mode changes into the [`ModeSender`]. The thread never touches window
//! state. Stopping is cooperative: a flag is cleared, the current read
//! completes or fails, and the loop exits; the frame source is dropped on the
//! audio thread on every exit path.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::sampler::{rms, FrameSource};
use crate::config::AudioConfig;
use crate::constants::{ERROR_BACKOFF, JOIN_TIMEOUT, TRANSIENT_BACKOFF};
use crate::error::CaptureError;
use crate::mode::{ModeClassifier, ModeSender, ThresholdTable};

/// Lifecycle of the capture thread
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorStatus {
    Starting,
    Running,
    Stopped,
    /// Capture gave up; mode changes are no longer produced
    Failed(CaptureError),
}

/// Backoff and give-up policy for read failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub transient_backoff: Duration,
    pub error_backoff: Duration,
    pub max_consecutive_errors: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            transient_backoff: TRANSIENT_BACKOFF,
            error_backoff: ERROR_BACKOFF,
            max_consecutive_errors: config.max_consecutive_errors,
        }
    }
}

/// Handle to the running capture thread
pub struct AudioMonitor {
    running: Arc<AtomicBool>,
    status: Arc<Mutex<MonitorStatus>>,
    thread_handle: Option<JoinHandle<()>>,
    done_rx: Option<Receiver<()>>,
    join_timeout: Duration,
}

/// Signals thread exit when dropped, including on panic
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

impl AudioMonitor {
    /// Spawn the capture thread.
    ///
    /// `open` runs on the new thread and produces the frame source; a failure
    /// there is fatal for the monitor.
    pub fn start<S, F>(
        config: &AudioConfig,
        thresholds: ThresholdTable,
        sender: ModeSender,
        open: F,
    ) -> Result<Self, CaptureError>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, CaptureError> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let status = Arc::new(Mutex::new(MonitorStatus::Starting));
        let (done_tx, done_rx) = bounded::<()>(1);

        let running_for_loop = running.clone();
        let status_for_loop = status.clone();
        let policy = RetryPolicy::from_config(config);
        let silence_timeout = config.silence_timeout;

        let handle = thread::Builder::new()
            .name("audio-monitor".into())
            .spawn(move || {
                let _done = DoneGuard(done_tx);

                let mut source = match open() {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::error!("Fatal error opening audio input: {}", e);
                        *status_for_loop.lock() = MonitorStatus::Failed(e);
                        return;
                    }
                };

                *status_for_loop.lock() = MonitorStatus::Running;
                tracing::info!("Audio detection thread started");

                let mut classifier = ModeClassifier::new(thresholds, silence_timeout);
                let result = run_capture_loop(
                    &mut source,
                    &mut classifier,
                    &sender,
                    &running_for_loop,
                    policy,
                );

                // Release the device before reporting
                drop(source);

                *status_for_loop.lock() = match result {
                    Ok(()) => MonitorStatus::Stopped,
                    Err(e) => {
                        tracing::error!("Audio capture failed, mode changes disabled: {}", e);
                        MonitorStatus::Failed(e)
                    }
                };
            })
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        Ok(Self {
            running,
            status,
            thread_handle: Some(handle),
            done_rx: Some(done_rx),
            join_timeout: JOIN_TIMEOUT,
        })
    }

    /// Stop the capture thread, waiting at most the join timeout
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let (Some(handle), Some(done_rx)) = (self.thread_handle.take(), self.done_rx.take()) else {
            return;
        };

        match done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                tracing::info!("Audio processor stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Audio thread did not stop within {:?}, detaching",
                    self.join_timeout
                );
            }
        }
    }

    /// Whether the capture loop is still producing samples
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && matches!(
                *self.status.lock(),
                MonitorStatus::Starting | MonitorStatus::Running
            )
    }

    pub fn status(&self) -> MonitorStatus {
        self.status.lock().clone()
    }
}

impl Drop for AudioMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read, measure and classify frames until `running` is cleared.
///
/// Read errors are handled per iteration. Returns an error only once more
/// than `max_consecutive_errors` reads in a row have failed.
pub fn run_capture_loop<S: FrameSource + ?Sized>(
    source: &mut S,
    classifier: &mut ModeClassifier,
    sender: &ModeSender,
    running: &AtomicBool,
    policy: RetryPolicy,
) -> Result<(), CaptureError> {
    let mut consecutive_errors = 0u32;

    while running.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(frame) => {
                consecutive_errors = 0;
                let loudness = rms(&frame);
                tracing::trace!("rms {:.1}", loudness);
                if let Some(mode) = classifier.observe(loudness, Instant::now()) {
                    sender.send(mode);
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors > policy.max_consecutive_errors {
                    return Err(e);
                }
                let backoff = if e.is_transient() {
                    tracing::warn!("Audio stream: {}", e);
                    policy.transient_backoff
                } else {
                    tracing::error!("Error in audio detection: {}", e);
                    policy.error_backoff
                };
                sleep_while_running(running, backoff);
            }
        }
    }

    Ok(())
}

/// Sleep up to `duration`, waking early once `running` is cleared
fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(10)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{mode_channel, Mode};
    use std::collections::VecDeque;

    /// Replays scripted reads, then clears `running`
    struct ScriptedSource {
        reads: VecDeque<Result<Vec<i16>, CaptureError>>,
        running: Option<Arc<AtomicBool>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Result<Vec<i16>, CaptureError>>) -> Self {
            Self {
                reads: reads.into(),
                running: None,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Vec<i16>, CaptureError> {
            match self.reads.pop_front() {
                Some(read) => read,
                None => {
                    if let Some(running) = &self.running {
                        running.store(false, Ordering::SeqCst);
                    }
                    Ok(vec![0; 4])
                }
            }
        }
    }

    fn frame(level: i16) -> Result<Vec<i16>, CaptureError> {
        Ok(vec![level; 64])
    }

    fn thresholds() -> ThresholdTable {
        ThresholdTable::new([("talking", 20.0), ("screaming", 2000.0)])
    }

    fn fast_policy(max: u32) -> RetryPolicy {
        RetryPolicy {
            transient_backoff: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
            max_consecutive_errors: max,
        }
    }

    #[test]
    fn test_loop_posts_mode_changes() {
        let running = Arc::new(AtomicBool::new(true));
        let mut source = ScriptedSource::new(vec![frame(5), frame(30), frame(2500)]);
        source.running = Some(running.clone());

        let (tx, rx) = mode_channel();
        let mut classifier = ModeClassifier::new(thresholds(), Duration::from_secs(60));

        run_capture_loop(&mut source, &mut classifier, &tx, &running, fast_policy(3)).unwrap();

        // Latest value wins: talking was overwritten by screaming
        assert_eq!(rx.try_recv(), Some(Mode::new("screaming")));
        assert_eq!(rx.overwritten_count(), 1);
    }

    #[test]
    fn test_loop_retries_overrun() {
        let running = Arc::new(AtomicBool::new(true));
        let mut source = ScriptedSource::new(vec![
            Err(CaptureError::Overrun { dropped: 512 }),
            Err(CaptureError::Timeout),
            frame(30),
        ]);
        source.running = Some(running.clone());

        let (tx, rx) = mode_channel();
        let mut classifier = ModeClassifier::new(thresholds(), Duration::from_secs(60));

        run_capture_loop(&mut source, &mut classifier, &tx, &running, fast_policy(2)).unwrap();
        assert_eq!(rx.try_recv(), Some(Mode::new("talking")));
    }

    #[test]
    fn test_loop_gives_up_after_sustained_errors() {
        let running = AtomicBool::new(true);
        let mut source = ScriptedSource::new(vec![
            Err(CaptureError::Disconnected),
            Err(CaptureError::Disconnected),
            Err(CaptureError::Disconnected),
        ]);

        let (tx, _rx) = mode_channel();
        let mut classifier = ModeClassifier::new(thresholds(), Duration::from_secs(60));

        let err = run_capture_loop(&mut source, &mut classifier, &tx, &running, fast_policy(2))
            .unwrap_err();
        assert_eq!(err, CaptureError::Disconnected);
    }

    #[test]
    fn test_error_streak_resets_on_success() {
        let running = Arc::new(AtomicBool::new(true));
        let mut source = ScriptedSource::new(vec![
            Err(CaptureError::Timeout),
            Err(CaptureError::Timeout),
            frame(5),
            Err(CaptureError::Timeout),
            Err(CaptureError::Timeout),
        ]);
        source.running = Some(running.clone());

        let (tx, _rx) = mode_channel();
        let mut classifier = ModeClassifier::new(thresholds(), Duration::from_secs(60));

        assert!(
            run_capture_loop(&mut source, &mut classifier, &tx, &running, fast_policy(2)).is_ok()
        );
    }

    #[test]
    fn test_monitor_open_failure_is_fatal() {
        let (tx, rx) = mode_channel();
        let mut monitor = AudioMonitor::start(
            &AudioConfig::default(),
            thresholds(),
            tx,
            || -> Result<ScriptedSource, CaptureError> {
                Err(CaptureError::DeviceNotFound("mic".into()))
            },
        )
        .unwrap();

        monitor.stop();
        assert_eq!(
            monitor.status(),
            MonitorStatus::Failed(CaptureError::DeviceNotFound("mic".into()))
        );
        assert!(!monitor.is_running());
        // Sender dropped with the thread
        assert!(rx.is_closed());
    }

    #[test]
    fn test_monitor_start_stop() {
        let (tx, rx) = mode_channel();
        let mut monitor = AudioMonitor::start(&AudioConfig::default(), thresholds(), tx, || {
            Ok(ScriptedSource::new((0..10_000).map(|_| frame(30)).collect()))
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !rx.has_pending() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(rx.try_recv(), Some(Mode::new("talking")));

        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(monitor.status(), MonitorStatus::Stopped);
    }
}
