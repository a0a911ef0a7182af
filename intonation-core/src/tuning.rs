//! # Musical Tuning Module
//!
//! Converts between frequencies and notes in twelve-tone equal temperament
//! relative to an adjustable reference pitch for A4.
//!
//! ## Conventions
//! - The reference pitch is A in octave 4.
//! - A sits 9 semitones above C, so a semitone count `n` relative to the
//!   reference becomes `n + 9` semitones above C4. The same offset is used in
//!   both directions.
//! - Octave numbers change at C (scientific pitch notation): B3 is followed
//!   by C4.
//! - Cents are measured against the nearest semitone and always lie in
//!   `[-50, 50]`.

use crate::notation::{self, PitchClass};
use serde::{Deserialize, Serialize};

/// Octave of the reference note.
pub const REFERENCE_OCTAVE: i32 = 4;

/// Semitones from C up to the reference note A.
pub const REFERENCE_OFFSET: i32 = 9;

pub const SEMITONES_PER_OCTAVE: i32 = 12;

/// Lowest reference pitch accepted by the preferences (baroque A415).
pub const MIN_REFERENCE_HZ: f32 = 415.0;

/// Highest reference pitch accepted by the preferences.
pub const MAX_REFERENCE_HZ: f32 = 466.0;

pub const DEFAULT_REFERENCE_HZ: f32 = 440.0;

/// The nearest note to a frequency and the deviation from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteReading {
    pub pitch_class: PitchClass,
    pub octave: i32,
    /// Deviation from the nearest semitone, in `[-50, 50]`.
    pub cents: i32,
}

fn valid_frequency(hz: f32) -> bool {
    hz.is_finite() && hz > 0.0
}

/// Finds the nearest note to `freq` given the frequency of A4.
///
/// # Returns
/// * `Some(reading)` - Pitch class, octave and cents deviation
/// * `None` - `freq` or `reference_hz` is not a finite positive number
pub fn frequency_to_note(freq: f32, reference_hz: f32) -> Option<NoteReading> {
    if !valid_frequency(freq) || !valid_frequency(reference_hz) {
        return None;
    }

    let semitones = 12.0 * (freq as f64 / reference_hz as f64).log2();
    let nearest = semitones.round();
    let cents = ((semitones - nearest) * 100.0).round() as i32;

    let from_c4 = nearest as i32 + REFERENCE_OFFSET;
    let pitch_class = PitchClass::from_index(from_c4);
    let octave = REFERENCE_OCTAVE + from_c4.div_euclid(SEMITONES_PER_OCTAVE);

    Some(NoteReading {
        pitch_class,
        octave,
        cents: cents.clamp(-50, 50),
    })
}

/// Returns the equal-tempered frequency of a note given the frequency of A4.
pub fn note_to_frequency(pitch_class: PitchClass, octave: i32, reference_hz: f32) -> f32 {
    let from_reference = SEMITONES_PER_OCTAVE * (octave - REFERENCE_OCTAVE)
        + pitch_class.index()
        - REFERENCE_OFFSET;
    (reference_hz as f64 * 2f64.powf(from_reference as f64 / 12.0)) as f32
}

/// Like [`note_to_frequency`] but takes a spelled name such as `"Eb"` or `"Sol#"`.
///
/// Returns `None` when the name is not recognized.
pub fn note_name_to_frequency(name: &str, octave: i32, reference_hz: f32) -> Option<f32> {
    notation::parse_pitch_class(name).map(|class| note_to_frequency(class, octave, reference_hz))
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat. Unlike
/// [`frequency_to_note`] the result is continuous and unbounded.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_pitch_is_a4() {
        let reading = frequency_to_note(440.0, 440.0).unwrap();
        assert_eq!(reading.pitch_class, PitchClass::A);
        assert_eq!(reading.octave, 4);
        assert_eq!(reading.cents, 0);
    }

    #[test]
    fn octave_changes_at_c() {
        let c4 = note_to_frequency(PitchClass::C, 4, 440.0);
        assert!((c4 - 261.63).abs() < 0.01);

        let b3 = frequency_to_note(246.94, 440.0).unwrap();
        assert_eq!((b3.pitch_class, b3.octave), (PitchClass::B, 3));

        let c5 = frequency_to_note(523.25, 440.0).unwrap();
        assert_eq!((c5.pitch_class, c5.octave), (PitchClass::C, 5));
    }

    #[test]
    fn round_trip_across_all_notes_and_references() {
        let mut reference = MIN_REFERENCE_HZ;
        while reference <= MAX_REFERENCE_HZ {
            for octave in 0..=8 {
                for class in PitchClass::ALL {
                    let freq = note_to_frequency(class, octave, reference);
                    let reading = frequency_to_note(freq, reference).unwrap();
                    assert_eq!(reading.pitch_class, class, "{class}{octave} @ {reference}");
                    assert_eq!(reading.octave, octave, "{class}{octave} @ {reference}");
                    assert!(reading.cents.abs() <= 1, "{class}{octave} @ {reference}");
                }
            }
            reference += 0.5;
        }
    }

    #[test]
    fn cents_always_within_half_a_semitone() {
        let mut freq = 20.0_f32;
        while freq < 8000.0 {
            let reading = frequency_to_note(freq, 440.0).unwrap();
            assert!((-50..=50).contains(&reading.cents), "{freq} -> {}", reading.cents);
            freq *= 1.0007;
        }
    }

    #[test]
    fn lowered_tone_resolves_to_the_semitone_below() {
        // 415 Hz against A=440 is ~101 cents flat, so it rounds to G#4.
        let reading = frequency_to_note(415.0, 440.0).unwrap();
        assert_eq!(reading.pitch_class, PitchClass::GSharp);
        assert_eq!(reading.octave, 4);
        assert_eq!(reading.cents, -1);

        // The same tone is A4 under baroque pitch.
        let baroque = frequency_to_note(415.0, 415.0).unwrap();
        assert_eq!((baroque.pitch_class, baroque.octave, baroque.cents), (PitchClass::A, 4, 0));
    }

    #[test]
    fn halfway_frequencies_stay_in_bounds() {
        let quarter_tone = 440.0 * 2f32.powf(0.5 / 12.0);
        let reading = frequency_to_note(quarter_tone, 440.0).unwrap();
        assert_eq!(reading.cents.abs(), 50);
    }

    #[test]
    fn invalid_input_is_a_soft_failure() {
        assert_eq!(frequency_to_note(0.0, 440.0), None);
        assert_eq!(frequency_to_note(-3.0, 440.0), None);
        assert_eq!(frequency_to_note(f32::NAN, 440.0), None);
        assert_eq!(frequency_to_note(f32::INFINITY, 440.0), None);
        assert_eq!(frequency_to_note(440.0, 0.0), None);
        assert_eq!(note_name_to_frequency("X", 4, 440.0), None);
    }

    #[test]
    fn names_in_any_spelling_resolve() {
        let la = note_name_to_frequency("La", 4, 442.0).unwrap();
        assert!((la - 442.0).abs() < 1e-3);
        let eb = note_name_to_frequency("Eb", 4, 440.0).unwrap();
        let ds = note_name_to_frequency("D#", 4, 440.0).unwrap();
        assert_eq!(eb, ds);
    }

    #[test]
    fn cents_between_is_signed() {
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-3);
        assert!(cents_between(430.0, 440.0) < 0.0);
    }
}
