//! End-to-end runs of the tracker on a virtual clock.

use std::time::Duration;

use intonation_core::audio::{ToneGenerator, ToneSegment};
use intonation_core::notation::PitchClass;
use intonation_core::settings::{ReferencePitchConfig, SharedPreferences, TrackerSettings};
use intonation_core::{FrameSnapshot, SignalStatus, Tracker};

const RATE: u32 = 44_100;

/// Feeds 10 ms chunks and fires both cadences for every millisecond in
/// `from_ms..to_ms`. Returns the snapshot of the last display tick.
fn run(tracker: &mut Tracker, generator: &mut ToneGenerator, from_ms: u64, to_ms: u64) -> FrameSnapshot {
    let mut last = tracker.snapshot(from_ms);
    for now in from_ms..to_ms {
        if now % 10 == 0 {
            tracker.push_samples(&generator.next_chunk(RATE as usize / 100));
        }
        if now % 33 == 0 {
            tracker.analyze(now);
        }
        if now % 16 == 0 {
            last = tracker.display_tick(now);
        }
    }
    last
}

#[test]
fn silence_then_a_tone() {
    let mut generator = ToneGenerator::new(
        vec![
            ToneSegment::silence(Duration::from_millis(1_000)),
            ToneSegment::tone(440.0, Duration::from_secs(60)),
        ],
        RATE,
        0.5,
    );
    let mut tracker = Tracker::new(TrackerSettings::default(), SharedPreferences::default(), RATE);

    let quiet = run(&mut tracker, &mut generator, 0, 1_000);
    assert_eq!(quiet.status, SignalStatus::NoSignal);
    assert!(quiet.buffer.events.is_empty());

    let loud = run(&mut tracker, &mut generator, 1_000, 2_500);
    assert_eq!(loud.status, SignalStatus::Tracking);

    let latest = loud.latest.expect("a note");
    assert_eq!(latest.label(), "A4");
    assert!(latest.cents_deviation.abs() <= 5, "{} cents", latest.cents_deviation);
    assert!(loud.smoothed_cents.unwrap().abs() <= 5.0);

    let visible: Vec<_> = loud.buffer.visible_at(loud.now_ms).collect();
    assert!(!visible.is_empty());
    for (event, position) in &visible {
        let note = event.as_note().expect("only notes");
        assert_eq!(note.pitch_class, PitchClass::A);
        assert!((0.1..=0.9).contains(position));
    }

    let times: Vec<u64> = loud.buffer.events.iter().map(|e| e.observed_at_ms).collect();
    assert!(times.windows(2).all(|pair| pair[1] - pair[0] >= 100), "{times:?}");
}

#[test]
fn the_tone_stops_and_the_belt_keeps_moving() {
    let mut generator = ToneGenerator::new(
        vec![ToneSegment::tone(440.0, Duration::from_millis(1_000))],
        RATE,
        0.5,
    );
    let mut tracker = Tracker::new(TrackerSettings::default(), SharedPreferences::default(), RATE);

    let playing = run(&mut tracker, &mut generator, 0, 1_000);
    assert_eq!(playing.status, SignalStatus::Tracking);
    let first = playing.buffer.events[0].clone();

    let after = run(&mut tracker, &mut generator, 1_000, 3_000);
    assert_eq!(after.status, SignalStatus::NoSignal);
    assert!(after.buffer.position(&first, after.now_ms) < playing.buffer.position(&first, playing.now_ms));

    // Everything has aged out once a full window passed.
    let gone = run(&mut tracker, &mut generator, 3_000, 12_000);
    assert!(gone.buffer.events.is_empty());
}

#[test]
fn changing_the_reference_retunes_live() {
    let prefs = SharedPreferences::default();
    let mut generator = ToneGenerator::new(vec![ToneSegment::tone(442.0, Duration::from_secs(60))], RATE, 0.5);
    let mut tracker = Tracker::new(TrackerSettings::default(), prefs.clone(), RATE);

    let sharp = run(&mut tracker, &mut generator, 0, 600).latest.unwrap();
    assert_eq!(sharp.label(), "A4");
    assert!((4..=12).contains(&sharp.cents_deviation), "{} cents", sharp.cents_deviation);

    prefs.update(|config| config.set_standard_pitch(442.0));
    let in_tune = run(&mut tracker, &mut generator, 600, 1_200).latest.unwrap();
    assert_eq!(in_tune.label(), "A4");
    assert!(in_tune.cents_deviation.abs() <= 4, "{} cents", in_tune.cents_deviation);
}

#[test]
fn shrinking_the_window_drops_older_notes() {
    let mut generator = ToneGenerator::new(
        vec![
            ToneSegment::tone(440.0, Duration::from_millis(300)),
            ToneSegment::silence(Duration::from_secs(60)),
        ],
        RATE,
        0.5,
    );
    let mut tracker = Tracker::new(TrackerSettings::default(), SharedPreferences::default(), RATE);

    let snapshot = run(&mut tracker, &mut generator, 0, 7_000);
    assert!(!snapshot.buffer.events.is_empty(), "kept under a 10 s window");

    tracker.set_time_window(5_000);
    let snapshot = run(&mut tracker, &mut generator, 7_000, 7_600);
    assert_eq!(snapshot.buffer.time_window_ms, 5_000);
    assert!(snapshot.buffer.events.is_empty());
}

#[test]
fn solfege_preferences_name_new_notes() {
    let prefs = SharedPreferences::new(ReferencePitchConfig {
        notation: intonation_core::notation::NotationSystem::Solfege,
        ..ReferencePitchConfig::default()
    });
    let mut generator = ToneGenerator::new(vec![ToneSegment::tone(261.63, Duration::from_secs(60))], RATE, 0.5);
    let mut tracker = Tracker::new(TrackerSettings::default(), prefs, RATE);

    let latest = run(&mut tracker, &mut generator, 0, 500).latest.unwrap();
    assert_eq!(latest.label(), "Do4");
}
