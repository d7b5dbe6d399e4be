//! Loudness-driven display modes
//!
//! A [`Mode`] is a named display state. `default` is always present and is
//! implicitly the quietest mode; every other mode is introduced by an entry in
//! the [`ThresholdTable`].

pub mod channel;
pub mod classifier;

pub use channel::{mode_channel, ModeReceiver, ModeSender};
pub use classifier::ModeClassifier;

use std::fmt;
use std::sync::Arc;

/// Named display state
///
/// Cheap to clone; the name is shared between the audio and UI threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mode(Arc<str>);

impl Mode {
    /// Name of the built-in quiet mode
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn is_default(&self) -> bool {
        &*self.0 == Self::DEFAULT_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mode {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Loudness thresholds, kept sorted from loudest to quietest
///
/// Entries with equal thresholds keep their insertion order, so the one listed
/// first wins a tie. The `default` mode never appears here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdTable {
    entries: Vec<(Mode, f32)>,
}

impl ThresholdTable {
    pub fn new<I, M>(entries: I) -> Self
    where
        I: IntoIterator<Item = (M, f32)>,
        M: Into<Mode>,
    {
        let mut entries: Vec<(Mode, f32)> = entries
            .into_iter()
            .map(|(mode, threshold)| (mode.into(), threshold))
            .filter(|(mode, _)| !mode.is_default())
            .collect();

        // Stable sort keeps configuration order among equal thresholds
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));

        Self { entries }
    }

    /// Loudest mode whose threshold is strictly exceeded, or `default`
    pub fn classify(&self, loudness: f32) -> Mode {
        self.entries
            .iter()
            .find(|(_, threshold)| loudness > *threshold)
            .map(|(mode, _)| mode.clone())
            .unwrap_or_default()
    }

    pub fn threshold(&self, mode: &Mode) -> Option<f32> {
        self.entries
            .iter()
            .find(|(m, _)| m == mode)
            .map(|(_, threshold)| *threshold)
    }

    /// Iterate entries from loudest to quietest
    pub fn iter(&self) -> impl Iterator<Item = (&Mode, f32)> {
        self.entries.iter().map(|(mode, threshold)| (mode, *threshold))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
