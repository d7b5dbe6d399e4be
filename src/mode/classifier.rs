//! Mode classifier with silence hysteresis
//!
//! Loud samples switch modes immediately. Falling back to `default` only
//! happens once the input has stayed below every threshold for at least the
//! silence timeout, measured from the last sample that exceeded one.

use std::time::{Duration, Instant};

use super::{Mode, ThresholdTable};

/// Audio-thread state machine mapping loudness to a [`Mode`]
#[derive(Debug, Clone)]
pub struct ModeClassifier {
    thresholds: ThresholdTable,
    silence_timeout: Duration,
    current: Mode,
    /// Time of the most recent non-default classification
    last_active: Option<Instant>,
}

impl ModeClassifier {
    pub fn new(thresholds: ThresholdTable, silence_timeout: Duration) -> Self {
        Self {
            thresholds,
            silence_timeout,
            current: Mode::default(),
            last_active: None,
        }
    }

    /// Feed one loudness sample taken at `now`.
    ///
    /// Returns the new mode only when the current mode actually changed.
    pub fn observe(&mut self, loudness: f32, now: Instant) -> Option<Mode> {
        let candidate = self.thresholds.classify(loudness);

        if !candidate.is_default() {
            self.last_active = Some(now);
            if candidate != self.current {
                tracing::debug!("Mode {} -> {} (rms {:.1})", self.current, candidate, loudness);
                self.current = candidate.clone();
                return Some(candidate);
            }
            return None;
        }

        if self.current.is_default() {
            return None;
        }

        let quiet_for = self
            .last_active
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::MAX);

        if quiet_for >= self.silence_timeout {
            tracing::debug!(
                "Mode {} -> default after {:.2}s of silence",
                self.current,
                quiet_for.as_secs_f32()
            );
            self.current = Mode::default();
            return Some(self.current.clone());
        }

        None
    }

    pub fn current(&self) -> &Mode {
        &self.current
    }

    pub fn last_active(&self) -> Option<Instant> {
        self.last_active
    }

    pub fn silence_timeout(&self) -> Duration {
        self.silence_timeout
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }
}
