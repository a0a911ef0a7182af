//! # Metronome Module
//!
//! A beat clock that turns elapsed time into numbered beats. It does not
//! produce sound; the tracker polls it on the display cadence and injects
//! each due beat into the note buffer as a tick marker.

use serde::{Deserialize, Serialize};

pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 300.0;

/// Persisted metronome preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub enabled: bool,
    pub bpm: f32,
    pub beats_per_bar: u32,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bpm: 60.0,
            beats_per_bar: 4,
        }
    }
}

/// One beat that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    /// Counts up from 0 since the metronome started.
    pub number: u64,
    /// Scheduled time of the beat.
    pub at_ms: u64,
    /// First beat of a bar.
    pub accent: bool,
}

/// A running beat clock.
#[derive(Debug, Clone)]
pub struct Metronome {
    bpm: f32,
    beats_per_bar: u32,
    started_at_ms: u64,
    next_beat: u64,
}

impl Metronome {
    /// Starts a clock whose beat 0 falls on `now_ms`.
    pub fn start(bpm: f32, beats_per_bar: u32, now_ms: u64) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            beats_per_bar: beats_per_bar.max(1),
            started_at_ms: now_ms,
            next_beat: 0,
        }
    }

    pub fn from_settings(settings: &MetronomeSettings, now_ms: u64) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::start(settings.bpm, settings.beats_per_bar, now_ms))
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    fn interval_ms(&self) -> f64 {
        60_000.0 / self.bpm as f64
    }

    fn beat_time(&self, number: u64) -> u64 {
        self.started_at_ms + (number as f64 * self.interval_ms()).round() as u64
    }

    /// Returns every beat scheduled at or before `now_ms` that has not been
    /// returned yet, in order.
    pub fn poll(&mut self, now_ms: u64) -> Vec<Beat> {
        let mut due = Vec::new();
        while self.beat_time(self.next_beat) <= now_ms {
            let number = self.next_beat;
            due.push(Beat {
                number,
                at_ms: self.beat_time(number),
                accent: number % self.beats_per_bar as u64 == 0,
            });
            self.next_beat += 1;
        }
        due
    }

    /// Changes the tempo without renumbering beats.
    ///
    /// The next beat is rescheduled one new interval after the last one
    /// that was delivered.
    pub fn set_bpm(&mut self, bpm: f32, now_ms: u64) {
        let last_at = match self.next_beat {
            0 => self.started_at_ms,
            n => self.beat_time(n - 1).min(now_ms),
        };
        self.bpm = clamp_bpm(bpm);
        // Re-anchor so that beat `next_beat` lands one interval after `last_at`.
        let delivered = self.next_beat.saturating_sub(1);
        let offset = (delivered as f64 * self.interval_ms()).round() as u64;
        self.started_at_ms = last_at.saturating_sub(offset);
    }
}

fn clamp_bpm(bpm: f32) -> f32 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        MIN_BPM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beats_arrive_on_schedule_with_increasing_numbers() {
        let mut metronome = Metronome::start(120.0, 4, 1_000);

        let first = metronome.poll(1_000);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].number, 0);
        assert!(first[0].accent);

        assert!(metronome.poll(1_499).is_empty());

        let later = metronome.poll(3_000);
        let numbers: Vec<u64> = later.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(later[3].accent);
        assert!(!later[0].accent);
        assert_eq!(later[3].at_ms, 3_000);
    }

    #[test]
    fn disabled_settings_build_nothing() {
        assert!(Metronome::from_settings(&MetronomeSettings::default(), 0).is_none());
        let enabled = MetronomeSettings {
            enabled: true,
            ..MetronomeSettings::default()
        };
        assert!(Metronome::from_settings(&enabled, 0).is_some());
    }

    #[test]
    fn tempo_is_clamped() {
        assert_eq!(Metronome::start(5.0, 4, 0).bpm(), MIN_BPM);
        assert_eq!(Metronome::start(1_000.0, 4, 0).bpm(), MAX_BPM);
        assert_eq!(Metronome::start(f32::NAN, 0, 0).beats_per_bar(), 1);
    }

    #[test]
    fn changing_tempo_keeps_counting() {
        let mut metronome = Metronome::start(60.0, 4, 0);
        assert_eq!(metronome.poll(2_000).len(), 3); // beats 0, 1, 2

        metronome.set_bpm(120.0, 2_100);
        assert!(metronome.poll(2_400).is_empty());
        let next = metronome.poll(2_500);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].number, 3);
        assert_eq!(next[0].at_ms, 2_500);
    }
}
