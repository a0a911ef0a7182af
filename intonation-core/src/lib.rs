//! The core logic for the intonation trainer.
//! This crate captures audio, estimates pitch, maps it to notes and keeps
//! the scrolling history of recent notes and beats. It is completely
//! headless and contains no GUI code.

pub mod audio;
pub mod fft;
pub mod metronome;
pub mod notation;
pub mod note_buffer;
pub mod pitch;
pub mod scheduler;
pub mod settings;
pub mod tracker;
pub mod tuning;

pub use audio::{AudioSource, CaptureError, MicrophoneSource, ToneSegment, ToneSource};
pub use note_buffer::{BufferSnapshot, BufferedEvent, EventKind, NoteBuffer, NoteObservation, TickMarker};
pub use pitch::{PitchEstimator, PitchSample};
pub use scheduler::{Command, FinishedRun, Scheduler, Session};
pub use settings::{PracticeSettings, ReferencePitchConfig, SharedPreferences, TrackerSettings};
pub use tracker::{FrameSnapshot, SignalStatus, Tracker};
