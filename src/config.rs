//! Skin configuration
//!
//! A skin is a directory ending in `.al` holding the images and a
//! `config.toml`. The file is read once at startup. Missing keys fall back to
//! built-in defaults and invalid values are replaced with defaults (logged),
//! so the hot path never sees a configuration error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::mode::{Mode, ThresholdTable};

/// Name of the configuration file inside a skin directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Required suffix of skin directories
pub const SKIN_EXTENSION: &str = "al";

/// Which input device to capture from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    #[default]
    Default,
    Name(String),
    Index(usize),
}

/// Audio capture parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per channel in one analysis frame
    pub frame_size: usize,
    pub channels: u16,
    pub silence_timeout: Duration,
    pub device: DeviceSelector,
    /// Consecutive read failures tolerated before capture gives up
    pub max_consecutive_errors: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            channels: DEFAULT_CHANNELS,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            device: DeviceSelector::Default,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl AudioConfig {
    /// Interleaved samples in one analysis frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    /// Wall-clock length of one frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }
}

/// Per-mode visual parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayProfile {
    pub image: PathBuf,
    pub max_width: u32,
    pub max_height: u32,
    pub x_offset: i32,
    pub y_offset: i32,
}

impl DisplayProfile {
    fn builtin(mode: &str) -> Self {
        let (image, x_offset, y_offset) = match mode {
            "talking" => ("talking.png", 0, -10),
            "screaming" => ("screaming.png", 0, -25),
            Mode::DEFAULT_NAME => ("normal.png", 50, 50),
            other => return Self::custom(other),
        };
        Self {
            image: PathBuf::from(image),
            max_width: DEFAULT_MAX_IMAGE_SIZE,
            max_height: DEFAULT_MAX_IMAGE_SIZE,
            x_offset,
            y_offset,
        }
    }

    fn custom(mode: &str) -> Self {
        Self {
            image: PathBuf::from(format!("{mode}.png")),
            max_width: DEFAULT_MAX_IMAGE_SIZE,
            max_height: DEFAULT_MAX_IMAGE_SIZE,
            x_offset: 0,
            y_offset: 0,
        }
    }
}

/// Profile lookup with fallback to the `default` profile
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayProfiles {
    default: DisplayProfile,
    modes: BTreeMap<Mode, DisplayProfile>,
}

impl DisplayProfiles {
    pub fn new(default: DisplayProfile) -> Self {
        Self {
            default,
            modes: BTreeMap::new(),
        }
    }

    pub fn with_profile(mut self, mode: impl Into<Mode>, profile: DisplayProfile) -> Self {
        self.insert(mode.into(), profile);
        self
    }

    pub fn insert(&mut self, mode: Mode, profile: DisplayProfile) {
        if mode.is_default() {
            self.default = profile;
        } else {
            self.modes.insert(mode, profile);
        }
    }

    pub fn default_profile(&self) -> &DisplayProfile {
        &self.default
    }

    /// Profile configured for exactly this mode
    pub fn get(&self, mode: &Mode) -> Option<&DisplayProfile> {
        if mode.is_default() {
            Some(&self.default)
        } else {
            self.modes.get(mode)
        }
    }

    /// Every configured mode, `default` first
    pub fn modes(&self) -> impl Iterator<Item = Mode> + '_ {
        std::iter::once(Mode::default()).chain(self.modes.keys().cloned())
    }
}

/// Presentation flags the window backend honours where it can
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Allow the user to drag the overlay, which moves the anchor
    pub draggable: bool,
    /// Let mouse events pass through to windows underneath
    pub click_through: bool,
    pub transparent: bool,
    pub always_on_top: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            draggable: false,
            click_through: true,
            transparent: true,
            always_on_top: true,
        }
    }
}

/// Fully validated application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub skin_dir: PathBuf,
    pub audio: AudioConfig,
    pub thresholds: ThresholdTable,
    pub profiles: DisplayProfiles,
    pub window: WindowConfig,
}

impl AppConfig {
    /// Built-in configuration for a skin directory
    pub fn defaults(skin_dir: &Path) -> Self {
        ConfigFile::default().validate(skin_dir)
    }

    /// Load `config.toml` from a skin directory.
    ///
    /// A missing file is created with the defaults. An unparsable file is
    /// reported and the defaults are used instead.
    pub fn load(skin_dir: &Path) -> Result<Self, ConfigError> {
        let skin_dir = validate_skin_dir(skin_dir)?;
        let path = skin_dir.join(CONFIG_FILE_NAME);

        if !path.exists() {
            tracing::warn!("Config file not found. Creating default at {}", path.display());
            if let Err(e) = write_default_config(&path) {
                tracing::error!("Error saving configuration: {}", e);
            }
            return Ok(Self::defaults(&skin_dir));
        }

        let file = read_config_table(&path).and_then(|mut table| {
            if fill_missing_keys(&mut table, &default_table()?) {
                tracing::warn!("Adding missing keys to {}", path.display());
                if let Err(e) = write_config_table(&path, &table) {
                    tracing::error!("Error saving configuration: {}", e);
                }
            }
            toml::Value::Table(table)
                .try_into::<ConfigFile>()
                .map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })
        });

        match file {
            Ok(file) => {
                tracing::info!("Loaded configuration from {}", path.display());
                Ok(file.validate(&skin_dir))
            }
            Err(e) => {
                tracing::error!("{}. Using defaults.", e);
                Ok(Self::defaults(&skin_dir))
            }
        }
    }

    /// Parse configuration text as if it lived in `skin_dir`
    pub fn from_toml_str(text: &str, skin_dir: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: skin_dir.join(CONFIG_FILE_NAME),
            source,
        })?;
        Ok(file.validate(skin_dir))
    }
}

/// Skin directory used when none is given on the command line
pub fn default_skin_dir() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join(format!("default.{SKIN_EXTENSION}")))
        .ok_or(ConfigError::NoConfigDir)
}

/// Check that a skin directory exists and carries the `.al` suffix
pub fn validate_skin_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    if !abs.is_dir() {
        return Err(ConfigError::SkinNotFound(abs));
    }
    if abs.extension().and_then(|e| e.to_str()) != Some(SKIN_EXTENSION) {
        return Err(ConfigError::InvalidSkinName(abs));
    }
    Ok(abs)
}

/// Write the built-in configuration to `path`
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(&ConfigFile::default())?;
    fs::write(path, text).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Configuration saved to {}", path.display());
    Ok(())
}

fn read_config_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_config_table(path: &Path, table: &toml::Table) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(table)?;
    fs::write(path, text).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Configuration saved to {}", path.display());
    Ok(())
}

/// Built-in configuration as a TOML table
fn default_table() -> Result<toml::Table, ConfigError> {
    Ok(toml::Table::try_from(ConfigFile::default())?)
}

/// Copy every key of `defaults` that `table` lacks, recursing into
/// sections. User values are never replaced, even invalid ones. Returns
/// whether anything was added.
fn fill_missing_keys(table: &mut toml::Table, defaults: &toml::Table) -> bool {
    let mut added = false;
    for (key, default) in defaults {
        if !table.contains_key(key) {
            table.insert(key.clone(), default.clone());
            added = true;
            continue;
        }
        if let (Some(toml::Value::Table(existing)), toml::Value::Table(default)) =
            (table.get_mut(key), default)
        {
            added |= fill_missing_keys(existing, default);
        }
    }
    added
}

// On-disk layout. Fields are loosely typed so bad values can be replaced
// one at a time instead of rejecting the whole file.

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    audio: AudioSection,
    thresholds: toml::Table,
    display: BTreeMap<String, ProfileSection>,
    window: WindowConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let mut thresholds = toml::Table::new();
        thresholds.insert("talking".into(), toml::Value::Integer(DEFAULT_TALKING_THRESHOLD));
        thresholds.insert(
            "screaming".into(),
            toml::Value::Integer(DEFAULT_SCREAMING_THRESHOLD),
        );

        let display = [Mode::DEFAULT_NAME, "talking", "screaming"]
            .into_iter()
            .map(|mode| (mode.to_string(), ProfileSection::from(DisplayProfile::builtin(mode))))
            .collect();

        Self {
            audio: AudioSection::default(),
            thresholds,
            display,
            window: WindowConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct AudioSection {
    sample_rate: i64,
    frame_size: i64,
    channels: i64,
    silence_timeout: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_index: Option<i64>,
    max_consecutive_errors: i64,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE as i64,
            frame_size: DEFAULT_FRAME_SIZE as i64,
            channels: DEFAULT_CHANNELS as i64,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT.as_secs_f64(),
            device: None,
            device_index: None,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS as i64,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x_offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y_offset: Option<i64>,
}

impl From<DisplayProfile> for ProfileSection {
    fn from(profile: DisplayProfile) -> Self {
        Self {
            image: Some(profile.image.to_string_lossy().into_owned()),
            max_width: Some(profile.max_width.into()),
            max_height: Some(profile.max_height.into()),
            x_offset: Some(profile.x_offset.into()),
            y_offset: Some(profile.y_offset.into()),
        }
    }
}

/// Return `value` converted if `valid`, otherwise warn and use `fallback`
fn checked<T, U>(key: &str, value: T, fallback: U, valid: impl FnOnce(&T) -> Option<U>) -> U
where
    T: std::fmt::Debug,
    U: std::fmt::Debug,
{
    match valid(&value) {
        Some(v) => v,
        None => {
            tracing::warn!("Invalid {} = {:?}, using {:?}", key, value, fallback);
            fallback
        }
    }
}

impl ConfigFile {
    fn validate(self, skin_dir: &Path) -> AppConfig {
        AppConfig {
            skin_dir: skin_dir.to_path_buf(),
            audio: self.audio.validate(),
            thresholds: validate_thresholds(&self.thresholds),
            profiles: validate_profiles(self.display, skin_dir),
            window: self.window,
        }
    }
}

impl AudioSection {
    fn validate(self) -> AudioConfig {
        let defaults = AudioConfig::default();

        let device = match (self.device, self.device_index) {
            (Some(name), _) if !name.trim().is_empty() => DeviceSelector::Name(name),
            (_, Some(index)) if index >= 0 => DeviceSelector::Index(index as usize),
            (_, Some(index)) => {
                tracing::debug!("device_index {} selects the default device", index);
                DeviceSelector::Default
            }
            _ => DeviceSelector::Default,
        };

        AudioConfig {
            sample_rate: checked("audio.sample_rate", self.sample_rate, defaults.sample_rate, |v| {
                u32::try_from(*v).ok().filter(|v| (1..=MAX_SAMPLE_RATE).contains(v))
            }),
            frame_size: checked("audio.frame_size", self.frame_size, defaults.frame_size, |v| {
                usize::try_from(*v).ok().filter(|v| (1..=MAX_FRAME_SIZE).contains(v))
            }),
            channels: checked("audio.channels", self.channels, defaults.channels, |v| {
                matches!(*v, 1 | 2).then_some(*v as u16)
            }),
            silence_timeout: checked(
                "audio.silence_timeout",
                self.silence_timeout,
                defaults.silence_timeout,
                |v| {
                    Duration::try_from_secs_f64(*v)
                        .ok()
                        .filter(|d| *d <= MAX_SILENCE_TIMEOUT)
                },
            ),
            device,
            max_consecutive_errors: checked(
                "audio.max_consecutive_errors",
                self.max_consecutive_errors,
                defaults.max_consecutive_errors,
                |v| u32::try_from(*v).ok().filter(|v| *v > 0),
            ),
        }
    }
}

fn validate_thresholds(table: &toml::Table) -> ThresholdTable {
    let mut entries = Vec::with_capacity(table.len());

    for (name, value) in table {
        if name == Mode::DEFAULT_NAME {
            // The default mode is implicitly zero
            continue;
        }

        let threshold = match value {
            toml::Value::Integer(i) => Some(*i as f64),
            toml::Value::Float(f) => Some(*f),
            _ => None,
        }
        .map(|t| t as f32)
        .filter(|t| t.is_finite() && *t > 0.0);

        match (threshold, builtin_threshold(name)) {
            (Some(t), _) => entries.push((Mode::new(name), t)),
            (None, Some(fallback)) => {
                tracing::warn!(
                    "Invalid threshold for {} ({}), using {}",
                    name,
                    value,
                    fallback
                );
                entries.push((Mode::new(name), fallback));
            }
            (None, None) => {
                tracing::warn!("Invalid threshold for {} ({}), mode disabled", name, value);
            }
        }
    }

    for (i, (mode, t)) in entries.iter().enumerate() {
        if let Some((other, _)) = entries[..i].iter().find(|(_, u)| u == t) {
            tracing::warn!(
                "Modes {} and {} share threshold {}; {} takes precedence",
                other,
                mode,
                t,
                other
            );
        }
    }

    ThresholdTable::new(entries)
}

fn builtin_threshold(name: &str) -> Option<f32> {
    match name {
        "talking" => Some(DEFAULT_TALKING_THRESHOLD as f32),
        "screaming" => Some(DEFAULT_SCREAMING_THRESHOLD as f32),
        _ => None,
    }
}

fn validate_profiles(sections: BTreeMap<String, ProfileSection>, skin_dir: &Path) -> DisplayProfiles {
    let resolve = |mode: &str, section: ProfileSection| -> DisplayProfile {
        let fallback = DisplayProfile::builtin(mode);
        let size = |key: &str, v: Option<i64>, d: u32| match v {
            None => d,
            Some(v) => checked(&format!("display.{mode}.{key}"), v, d, |v| {
                u32::try_from(*v)
                    .ok()
                    .filter(|v| (1..=MAX_IMAGE_DIMENSION).contains(v))
            }),
        };
        let offset = |key: &str, v: Option<i64>, d: i32| match v {
            None => d,
            Some(v) => checked(&format!("display.{mode}.{key}"), v, d, |v| {
                i32::try_from(*v)
                    .ok()
                    .filter(|v| (-MAX_OFFSET..=MAX_OFFSET).contains(v))
            }),
        };

        let image = section
            .image
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(fallback.image);

        DisplayProfile {
            image: if image.is_absolute() {
                image
            } else {
                skin_dir.join(image)
            },
            max_width: size("max_width", section.max_width, fallback.max_width),
            max_height: size("max_height", section.max_height, fallback.max_height),
            x_offset: offset("x_offset", section.x_offset, fallback.x_offset),
            y_offset: offset("y_offset", section.y_offset, fallback.y_offset),
        }
    };

    let mut sections = sections;
    let default_section = sections.remove(Mode::DEFAULT_NAME).unwrap_or_else(|| {
        tracing::warn!("No [display.default] section, using built-in default profile");
        ProfileSection::default()
    });

    let mut profiles = DisplayProfiles::new(resolve(Mode::DEFAULT_NAME, default_section));
    for (mode, section) in sections {
        let profile = resolve(&mode, section);
        profiles.insert(Mode::new(&mode), profile);
    }
    profiles
}
