//! # Notation Module
//!
//! Static spelling tables for the twelve pitch classes. Every class has a
//! display name under two notation systems (letter names and fixed-do
//! solfège) and two accidental spellings (sharps or flats). Parsing accepts
//! any of those spellings plus the common enharmonic aliases, so `C#`, `Db`,
//! `Do♯` and `Reb` all resolve to the same class.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One of the twelve pitch classes, indexed from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All classes in ascending order starting at C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C (0..12).
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Builds a class from any integer semitone count, wrapping into an octave.
    pub fn from_index(index: i32) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(display_name(*self, NotationSystem::Letter, Accidental::Sharp))
    }
}

/// Naming system used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotationSystem {
    /// C, D, E, ...
    #[default]
    Letter,
    /// Do, Re, Mi, ...
    Solfege,
}

/// How accidentals are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Accidental {
    #[default]
    Sharp,
    Flat,
}

const LETTER_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const LETTER_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];
const SOLFEGE_SHARP: [&str; 12] = [
    "Do", "Do#", "Re", "Re#", "Mi", "Fa", "Fa#", "Sol", "Sol#", "La", "La#", "Si",
];
const SOLFEGE_FLAT: [&str; 12] = [
    "Do", "Reb", "Re", "Mib", "Mi", "Fa", "Solb", "Sol", "Lab", "La", "Sib", "Si",
];

/// Spellings that only ever appear as input.
const ALIASES: [(&str, PitchClass); 8] = [
    ("E#", PitchClass::F),
    ("Fb", PitchClass::E),
    ("B#", PitchClass::C),
    ("Cb", PitchClass::B),
    ("Mi#", PitchClass::F),
    ("Fab", PitchClass::E),
    ("Si#", PitchClass::C),
    ("Dob", PitchClass::B),
];

/// Lowercased spelling -> pitch class, covering every table above.
static SPELLINGS: Lazy<HashMap<String, PitchClass>> = Lazy::new(|| {
    let tables = [LETTER_SHARP, LETTER_FLAT, SOLFEGE_SHARP, SOLFEGE_FLAT];
    let mut map = HashMap::with_capacity(64);
    for table in tables {
        for (name, class) in table.iter().zip(PitchClass::ALL) {
            map.insert(name.to_lowercase(), class);
        }
    }
    for (name, class) in ALIASES {
        map.insert(name.to_lowercase(), class);
    }
    // "Ti" is the movable-do spelling of Si.
    map.insert("ti".to_string(), PitchClass::B);
    map.insert("ti#".to_string(), PitchClass::C);
    map.insert("tib".to_string(), PitchClass::ASharp);
    map
});

/// Returns the display name of `class`.
pub fn display_name(class: PitchClass, notation: NotationSystem, accidental: Accidental) -> &'static str {
    let table = match (notation, accidental) {
        (NotationSystem::Letter, Accidental::Sharp) => &LETTER_SHARP,
        (NotationSystem::Letter, Accidental::Flat) => &LETTER_FLAT,
        (NotationSystem::Solfege, Accidental::Sharp) => &SOLFEGE_SHARP,
        (NotationSystem::Solfege, Accidental::Flat) => &SOLFEGE_FLAT,
    };
    table[class as usize]
}

/// Parses a pitch-class name in any supported spelling.
///
/// Matching is case-insensitive and accepts the Unicode accidentals `♯`/`♭`.
/// Surrounding whitespace is ignored.
pub fn parse_pitch_class(name: &str) -> Option<PitchClass> {
    let normalized = name.trim().replace('♯', "#").replace('♭', "b").to_lowercase();
    SPELLINGS.get(&normalized).copied()
}

/// Re-spells a pitch-class name under the requested notation.
///
/// Unrecognized input is returned unchanged.
pub fn convert_note_name(name: &str, notation: NotationSystem, accidental: Accidental) -> String {
    match parse_pitch_class(name) {
        Some(class) => display_name(class, notation, accidental).to_string(),
        None => name.to_string(),
    }
}
