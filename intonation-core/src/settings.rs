//! # Settings Module
//!
//! User preferences and tracker tunables, plus JSON persistence.
//!
//! The reference pitch and notation preferences are shared with the running
//! tracker through [`SharedPreferences`], so the GUI can change them while
//! detection is running. Everything else is read when a session starts.

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::metronome::MetronomeSettings;
use crate::note_buffer::BufferSettings;
use crate::notation::{Accidental, NotationSystem};
use crate::pitch::EstimatorGates;
use crate::tuning::{DEFAULT_REFERENCE_HZ, MAX_REFERENCE_HZ, MIN_REFERENCE_HZ};

/// Errors which can occur while saving or loading settings.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Couldn't access the settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reference pitch and spelling preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencePitchConfig {
    /// Frequency of A4 in Hz, 415–466.
    pub standard_pitch_hz: f32,
    pub notation: NotationSystem,
    pub accidental: Accidental,
}

impl Default for ReferencePitchConfig {
    fn default() -> Self {
        Self {
            standard_pitch_hz: DEFAULT_REFERENCE_HZ,
            notation: NotationSystem::default(),
            accidental: Accidental::default(),
        }
    }
}

impl ReferencePitchConfig {
    /// Sets the reference pitch, clamped to 415–466 Hz.
    ///
    /// Non-finite input leaves the current value in place.
    pub fn set_standard_pitch(&mut self, hz: f32) {
        if hz.is_finite() {
            self.standard_pitch_hz = hz.clamp(MIN_REFERENCE_HZ, MAX_REFERENCE_HZ);
        }
    }

    /// Returns a copy with the reference pitch forced into range.
    pub fn sanitized(mut self) -> Self {
        let hz = self.standard_pitch_hz;
        self.standard_pitch_hz = DEFAULT_REFERENCE_HZ;
        self.set_standard_pitch(hz);
        self
    }
}

/// A cloneable, hot-swappable handle to the reference pitch preferences.
///
/// Readers take a copy per call, so an update lands on the next mapping
/// without restarting detection.
#[derive(Debug, Clone, Default)]
pub struct SharedPreferences {
    inner: Arc<RwLock<ReferencePitchConfig>>,
}

impl SharedPreferences {
    pub fn new(config: ReferencePitchConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config.sanitized())),
        }
    }

    /// The current preferences.
    pub fn get(&self) -> ReferencePitchConfig {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Applies `change` and keeps the reference pitch in range.
    pub fn update(&self, change: impl FnOnce(&mut ReferencePitchConfig)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        change(&mut *guard);
        let sanitized = guard.sanitized();
        *guard = sanitized;
    }

    pub fn set(&self, config: ReferencePitchConfig) {
        self.update(|current| *current = config);
    }
}

/// Tunables of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Samples per analysis window.
    pub window_size: usize,
    pub gates: EstimatorGates,
    /// Lowest frequency accepted as a note.
    pub min_frequency_hz: f32,
    /// Highest frequency accepted as a note.
    pub max_frequency_hz: f32,
    pub buffer: BufferSettings,
    /// Analysis cadence.
    pub analysis_interval_ms: u64,
    /// Display cadence.
    pub display_interval_ms: u64,
    /// How long pitch must be absent before reporting "no signal".
    pub no_signal_hold_ms: u64,
    /// Number of readings averaged for the cents read-out.
    pub smoothing_len: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            window_size: crate::audio::BUFFER_SIZE,
            gates: EstimatorGates::default(),
            min_frequency_hz: 50.0,
            max_frequency_hz: 5_000.0,
            buffer: BufferSettings::default(),
            analysis_interval_ms: 33,
            display_interval_ms: 16,
            no_signal_hold_ms: 250,
            smoothing_len: 5,
        }
    }
}

/// Everything the application persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSettings {
    pub reference: ReferencePitchConfig,
    pub tracker: TrackerSettings,
    pub metronome: MetronomeSettings,
}

impl PracticeSettings {
    /// Saves the settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json_string)?;
        tracing::debug!("Saved settings to {}", path.as_ref().display());
        Ok(())
    }

    /// Loads settings written by [`PracticeSettings::save`].
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let data = fs::read_to_string(path.as_ref())?;
        let mut settings: PracticeSettings = serde_json::from_str(&data)?;
        settings.reference = settings.reference.sanitized();
        tracing::debug!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Like [`PracticeSettings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match Self::load(path) {
            Err(SettingsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }
}
