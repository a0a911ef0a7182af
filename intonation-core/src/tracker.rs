//! # Tracker Module
//!
//! The thread-confined state machine at the heart of a session. It owns the
//! rolling analysis window, the estimator and the note buffer, and exposes
//! one entry point per cadence:
//!
//! - [`Tracker::analyze`] on the analysis cadence (~30 Hz)
//! - [`Tracker::display_tick`] on the display cadence (~60 Hz)
//!
//! Time is passed in explicitly as milliseconds since the session started,
//! which keeps every step deterministic and testable without a clock.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::metronome::{Metronome, MetronomeSettings};
use crate::notation;
use crate::note_buffer::{BufferSnapshot, Insertion, NoteBuffer, NoteObservation, TickMarker};
use crate::pitch::{PitchEstimator, PitchSample};
use crate::settings::{SharedPreferences, TrackerSettings};
use crate::tuning;

/// What the user should see about the input signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignalStatus {
    /// No session is running.
    #[default]
    Idle,
    /// Running, but nothing pitched has been heard recently.
    NoSignal,
    /// A note is being tracked.
    Tracking,
}

/// Everything the rendering consumer needs for one display frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Milliseconds since the session started.
    pub now_ms: u64,
    pub buffer: BufferSnapshot,
    pub status: SignalStatus,
    /// The most recent observation, throttled or not.
    pub latest: Option<NoteObservation>,
    /// Mean cents deviation over the last few readings of the current note.
    pub smoothed_cents: Option<f32>,
    pub last_sample: PitchSample,
}

/// Result of one analysis step.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub sample: PitchSample,
    /// Present when the sample was pitched and inside the instrument band.
    pub observation: Option<NoteObservation>,
    /// What the buffer did with the observation.
    pub insertion: Option<Insertion>,
}

impl AnalysisOutcome {
    fn silent() -> Self {
        Self {
            sample: PitchSample::SILENT,
            observation: None,
            insertion: None,
        }
    }
}

/// The most recent `capacity` samples.
#[derive(Debug, Clone)]
struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    fresh: bool,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            fresh: false,
        }
    }

    fn push(&mut self, chunk: &[f32]) {
        if chunk.is_empty() {
            return;
        }
        self.samples.extend(chunk.iter().copied());
        let excess = self.samples.len().saturating_sub(self.capacity);
        self.samples.drain(..excess);
        self.fresh = true;
    }

    /// Copies a full, not yet analyzed window into `out`.
    fn take_fresh(&mut self, out: &mut Vec<f32>) -> bool {
        if !self.fresh || self.samples.len() < self.capacity {
            return false;
        }
        self.fresh = false;
        out.clear();
        out.extend(self.samples.iter().copied());
        true
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.fresh = false;
    }
}

/// Pitch tracking state for one session.
#[derive(Debug)]
pub struct Tracker {
    settings: TrackerSettings,
    preferences: SharedPreferences,
    estimator: PitchEstimator,
    buffer: NoteBuffer,
    window: SampleWindow,
    frame: Vec<f32>,
    sample_rate: u32,
    metronome: Option<Metronome>,
    /// Number of the next beat marker, shared by metronome and manual beats.
    next_beat: u64,
    status: SignalStatus,
    last_pitched_at: Option<u64>,
    last_sample: PitchSample,
    latest: Option<NoteObservation>,
    cents_history: VecDeque<i32>,
}

impl Tracker {
    pub fn new(settings: TrackerSettings, preferences: SharedPreferences, sample_rate: u32) -> Self {
        Self {
            estimator: PitchEstimator::new(settings.gates),
            buffer: NoteBuffer::new(settings.buffer),
            window: SampleWindow::new(settings.window_size),
            frame: Vec::with_capacity(settings.window_size),
            sample_rate,
            metronome: None,
            next_beat: 0,
            status: SignalStatus::NoSignal,
            last_pitched_at: None,
            last_sample: PitchSample::SILENT,
            latest: None,
            cents_history: VecDeque::with_capacity(settings.smoothing_len.max(1)),
            settings,
            preferences,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn preferences(&self) -> &SharedPreferences {
        &self.preferences
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer(&self) -> &NoteBuffer {
        &self.buffer
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    pub fn latest(&self) -> Option<&NoteObservation> {
        self.latest.as_ref()
    }

    /// Appends captured audio to the rolling analysis window.
    pub fn push_samples(&mut self, chunk: &[f32]) {
        self.window.push(chunk);
    }

    /// Analysis tick: estimates the current window if new audio arrived.
    ///
    /// Without new audio this counts as an unpitched frame, so a stalled
    /// input ends up in [`SignalStatus::NoSignal`].
    pub fn analyze(&mut self, now_ms: u64) -> AnalysisOutcome {
        let mut frame = std::mem::take(&mut self.frame);
        let outcome = if self.window.take_fresh(&mut frame) {
            self.analyze_frame(&frame, now_ms)
        } else {
            self.note_absence(now_ms);
            AnalysisOutcome::silent()
        };
        self.frame = frame;
        outcome
    }

    /// Runs estimator, band check, note mapping and insertion on `frame`.
    pub fn analyze_frame(&mut self, frame: &[f32], now_ms: u64) -> AnalysisOutcome {
        let sample = self.estimator.estimate(frame, self.sample_rate);
        self.last_sample = sample;

        let Some(frequency) = sample.frequency_hz.filter(|&f| self.in_band(f)) else {
            if let Some(f) = sample.frequency_hz {
                trace!("Ignoring {:.1} Hz outside the instrument band", f);
            }
            self.note_absence(now_ms);
            return AnalysisOutcome {
                sample,
                observation: None,
                insertion: None,
            };
        };

        // Read the preferences once per mapping so updates apply live.
        let prefs = self.preferences.get();
        let Some(reading) = tuning::frequency_to_note(frequency, prefs.standard_pitch_hz) else {
            self.note_absence(now_ms);
            return AnalysisOutcome {
                sample,
                observation: None,
                insertion: None,
            };
        };

        let observation = NoteObservation {
            note_name: notation::display_name(reading.pitch_class, prefs.notation, prefs.accidental)
                .to_string(),
            pitch_class: reading.pitch_class,
            octave: reading.octave,
            cents_deviation: reading.cents,
            frequency_hz: frequency,
            confidence: sample.clarity,
            observed_at_ms: now_ms,
        };

        self.record_cents(&observation);
        self.status = SignalStatus::Tracking;
        self.last_pitched_at = Some(now_ms);
        self.latest = Some(observation.clone());

        let insertion = self.buffer.append_note(observation.clone(), now_ms);
        if let Insertion::Inserted(id) = insertion {
            trace!("Buffered {} as #{}", observation.label(), id);
        }

        AnalysisOutcome {
            sample,
            observation: Some(observation),
            insertion: Some(insertion),
        }
    }

    fn in_band(&self, frequency: f32) -> bool {
        (self.settings.min_frequency_hz..=self.settings.max_frequency_hz).contains(&frequency)
    }

    fn note_absence(&mut self, now_ms: u64) {
        let held = self
            .last_pitched_at
            .is_some_and(|at| now_ms.saturating_sub(at) < self.settings.no_signal_hold_ms);
        if !held && self.status != SignalStatus::NoSignal {
            debug!("No signal since {:?} ms", self.last_pitched_at);
            self.status = SignalStatus::NoSignal;
            self.cents_history.clear();
        }
    }

    fn record_cents(&mut self, observation: &NoteObservation) {
        let same_note = self.latest.as_ref().is_some_and(|latest| {
            latest.pitch_class == observation.pitch_class && latest.octave == observation.octave
        });
        if !same_note {
            self.cents_history.clear();
        }
        self.cents_history.push_back(observation.cents_deviation);
        while self.cents_history.len() > self.settings.smoothing_len.max(1) {
            self.cents_history.pop_front();
        }
    }

    fn smoothed_cents(&self) -> Option<f32> {
        if self.cents_history.is_empty() {
            return None;
        }
        let sum: i32 = self.cents_history.iter().sum();
        Some(sum as f32 / self.cents_history.len() as f32)
    }

    /// Records a manual beat marker.
    ///
    /// Manual and metronome beats are numbered from the same counter, so a
    /// tap never collides with a metronome beat in the buffer's de-duplication.
    pub fn push_tick(&mut self, accent: bool, now_ms: u64) -> Insertion {
        self.append_beat(accent, now_ms)
    }

    fn append_beat(&mut self, accent: bool, now_ms: u64) -> Insertion {
        let tick = TickMarker {
            beat: self.next_beat,
            accent,
        };
        self.next_beat += 1;
        self.buffer.append_tick(tick, now_ms)
    }

    /// Starts, retunes or (with `None`) stops the beat clock.
    ///
    /// A running clock with the same bar length only changes tempo and keeps
    /// its schedule; anything else restarts it with beat 0 of the bar on
    /// `now_ms`.
    pub fn set_metronome(&mut self, settings: Option<MetronomeSettings>, now_ms: u64) {
        match (self.metronome.as_mut(), settings) {
            (Some(running), Some(s)) if s.enabled && running.beats_per_bar() == s.beats_per_bar.max(1) => {
                running.set_bpm(s.bpm, now_ms);
            }
            _ => self.metronome = settings.and_then(|s| Metronome::from_settings(&s, now_ms)),
        }
        debug!("Metronome: {:?}", self.metronome.as_ref().map(Metronome::bpm));
    }

    pub fn set_time_window(&mut self, time_window_ms: u64) {
        self.buffer.set_time_window(time_window_ms);
    }

    /// Display tick: injects due beats, evicts periodically and returns what
    /// to draw.
    pub fn display_tick(&mut self, now_ms: u64) -> FrameSnapshot {
        let due = self
            .metronome
            .as_mut()
            .map(|metronome| metronome.poll(now_ms))
            .unwrap_or_default();
        for beat in due {
            self.append_beat(beat.accent, now_ms);
        }

        let evicted = self.buffer.maybe_evict(now_ms);
        if evicted > 0 {
            trace!("Evicted {} events", evicted);
        }

        self.snapshot(now_ms)
    }

    /// The current state without side effects.
    pub fn snapshot(&self, now_ms: u64) -> FrameSnapshot {
        FrameSnapshot {
            now_ms,
            buffer: self.buffer.snapshot(),
            status: self.status,
            latest: self.latest.clone(),
            smoothed_cents: self.smoothed_cents(),
            last_sample: self.last_sample,
        }
    }

    /// Gives up the tracker, keeping only its buffer.
    pub fn into_buffer(self) -> NoteBuffer {
        self.buffer
    }

    /// Empties the buffer and forgets the current note.
    ///
    /// The status drops to [`SignalStatus::NoSignal`] until the next pitched
    /// frame. Beat numbering carries on.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.latest = None;
        self.cents_history.clear();
        self.last_pitched_at = None;
        self.status = SignalStatus::NoSignal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{Accidental, NotationSystem, PitchClass};
    use crate::settings::ReferencePitchConfig;

    const RATE: u32 = 44_100;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerSettings::default(), SharedPreferences::default(), RATE)
    }

    #[test]
    fn a_tone_becomes_a_buffered_note() {
        let mut tracker = tracker();
        let outcome = tracker.analyze_frame(&sine(440.0, 2048), 100);

        let note = outcome.observation.expect("observation");
        assert_eq!(note.note_name, "A");
        assert_eq!(note.octave, 4);
        assert!(note.cents_deviation.abs() <= 5);
        assert!(matches!(outcome.insertion, Some(Insertion::Inserted(_))));
        assert_eq!(tracker.status(), SignalStatus::Tracking);
        assert_eq!(tracker.buffer().len(), 1);
    }

    #[test]
    fn silence_creates_no_observation() {
        let mut tracker = tracker();
        let outcome = tracker.analyze_frame(&vec![0.0; 2048], 100);
        assert!(outcome.observation.is_none());
        assert!(tracker.buffer().is_empty());
        assert_eq!(tracker.status(), SignalStatus::NoSignal);
    }

    #[test]
    fn out_of_band_pitches_are_ignored() {
        let mut settings = TrackerSettings::default();
        settings.max_frequency_hz = 300.0;
        let mut tracker = Tracker::new(settings, SharedPreferences::default(), RATE);
        assert!(tracker.analyze_frame(&sine(440.0, 2048), 0).observation.is_none());
        assert!(tracker.buffer().is_empty());
    }

    #[test]
    fn preference_changes_apply_to_the_next_mapping() {
        let prefs = SharedPreferences::default();
        let mut tracker = Tracker::new(TrackerSettings::default(), prefs.clone(), RATE);
        let tone = sine(415.0, 2048);

        let before = tracker.analyze_frame(&tone, 0).observation.unwrap();
        assert_eq!(before.pitch_class, PitchClass::GSharp);
        assert_eq!(before.note_name, "G#");

        prefs.set(ReferencePitchConfig {
            standard_pitch_hz: 415.0,
            notation: NotationSystem::Solfege,
            accidental: Accidental::Flat,
        });
        let after = tracker.analyze_frame(&tone, 200).observation.unwrap();
        assert_eq!(after.pitch_class, PitchClass::A);
        assert_eq!(after.note_name, "La");
        assert_eq!(after.octave, 4);
    }

    #[test]
    fn no_signal_waits_for_the_hold_time() {
        let mut tracker = tracker();
        tracker.analyze_frame(&sine(440.0, 2048), 1_000);
        tracker.analyze_frame(&vec![0.0; 2048], 1_100);
        assert_eq!(tracker.status(), SignalStatus::Tracking);
        tracker.analyze_frame(&vec![0.0; 2048], 1_300);
        assert_eq!(tracker.status(), SignalStatus::NoSignal);
        assert_eq!(tracker.snapshot(1_300).smoothed_cents, None);
    }

    #[test]
    fn window_is_analyzed_only_when_full_and_fresh() {
        let mut tracker = tracker();
        let tone = sine(440.0, 4096);

        tracker.push_samples(&tone[..1000]);
        assert!(tracker.analyze(0).observation.is_none());

        tracker.push_samples(&tone[1000..]);
        assert!(tracker.analyze(33).observation.is_some());
        // Nothing new arrived since the last analysis.
        assert!(tracker.analyze(66).observation.is_none());
    }

    #[test]
    fn metronome_beats_are_injected_on_display_ticks() {
        let mut tracker = tracker();
        tracker.set_metronome(
            Some(MetronomeSettings {
                enabled: true,
                bpm: 120.0,
                beats_per_bar: 4,
            }),
            0,
        );
        for now in (0..=1_000).step_by(16) {
            tracker.display_tick(now);
        }
        let beats: Vec<u64> = tracker
            .buffer()
            .iter()
            .filter_map(|e| e.as_tick().map(|t| t.beat))
            .collect();
        assert_eq!(beats, vec![0, 1]);
    }

    fn beat_numbers(tracker: &Tracker) -> Vec<u64> {
        tracker
            .buffer()
            .iter()
            .filter_map(|e| e.as_tick().map(|t| t.beat))
            .collect()
    }

    fn metronome(bpm: f32) -> Option<MetronomeSettings> {
        Some(MetronomeSettings {
            enabled: true,
            bpm,
            beats_per_bar: 4,
        })
    }

    #[test]
    fn tempo_changes_keep_beat_numbers_rising() {
        let mut tracker = tracker();
        tracker.set_metronome(metronome(120.0), 0);
        for now in (0..=1_200).step_by(10) {
            tracker.display_tick(now);
        }
        assert_eq!(beat_numbers(&tracker), vec![0, 1, 2]);

        tracker.set_metronome(metronome(121.0), 1_210);
        tracker.display_tick(1_210);
        assert_eq!(beat_numbers(&tracker), vec![0, 1, 2]);

        for now in (1_220..=2_000).step_by(10) {
            tracker.display_tick(now);
        }
        let beats = beat_numbers(&tracker);
        assert!(beats.len() > 3);
        assert!(beats.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn a_tap_on_a_metronome_beat_is_kept() {
        let mut tracker = tracker();
        tracker.set_metronome(metronome(60.0), 0);
        tracker.display_tick(0);

        assert!(matches!(tracker.push_tick(true, 20), Insertion::Inserted(_)));
        assert_eq!(beat_numbers(&tracker), vec![0, 1]);

        tracker.display_tick(1_000);
        assert_eq!(beat_numbers(&tracker), vec![0, 1, 2]);
    }

    #[test]
    fn display_ticks_scroll_without_new_notes() {
        let mut tracker = tracker();
        tracker.analyze_frame(&sine(440.0, 2048), 0);

        let early = tracker.display_tick(1_000);
        let late = tracker.display_tick(5_000);
        let event = &early.buffer.events[0];
        assert!(late.buffer.position(event, late.now_ms) < early.buffer.position(event, early.now_ms));
    }

    #[test]
    fn clear_keeps_the_tracker_usable() {
        let mut tracker = tracker();
        tracker.analyze_frame(&sine(440.0, 2048), 0);
        assert_eq!(tracker.status(), SignalStatus::Tracking);
        tracker.clear();
        assert!(tracker.buffer().is_empty());
        assert!(tracker.latest().is_none());
        assert_eq!(tracker.snapshot(10).status, SignalStatus::NoSignal);
        assert!(tracker.analyze_frame(&sine(440.0, 2048), 50).insertion.is_some());
    }
}
