//! # Scrolling Note Buffer
//!
//! A time-ordered, self-expiring collection of note and beat events that
//! drives a "conveyor belt" display. Events enter at the right edge and
//! drift left as they age; the position of every event is a pure function
//! of its age, so the belt keeps moving even when nothing new arrives.
//!
//! Eviction is a separate, periodic step. Recomputing positions each frame
//! is plain arithmetic, while mutating the collection is only needed a few
//! times per second.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::notation::PitchClass;

/// Shortest accepted time window.
pub const MIN_TIME_WINDOW_MS: u64 = 5_000;

/// Longest accepted time window.
pub const MAX_TIME_WINDOW_MS: u64 = 30_000;

pub const DEFAULT_TIME_WINDOW_MS: u64 = 10_000;

/// A detected note, as handed to the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteObservation {
    /// Display spelling of `pitch_class` at the time of detection.
    pub note_name: String,
    pub pitch_class: PitchClass,
    pub octave: i32,
    /// Deviation from the nearest semitone, in `[-50, 50]`.
    pub cents_deviation: i32,
    pub frequency_hz: f32,
    pub confidence: f32,
    pub observed_at_ms: u64,
}

impl NoteObservation {
    /// Name with octave, e.g. `"F#3"`.
    pub fn label(&self) -> String {
        format!("{}{}", self.note_name, self.octave)
    }
}

/// A rhythm pulse rendered alongside the notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMarker {
    /// Monotonically increasing beat counter.
    pub beat: u64,
    /// First beat of a bar.
    pub accent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Note(NoteObservation),
    Tick(TickMarker),
}

/// An entry of the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    /// Unique within the buffer that created it.
    pub id: u64,
    pub observed_at_ms: u64,
    /// Whether the rendering consumer should draw this event.
    pub visible: bool,
    pub kind: EventKind,
}

impl BufferedEvent {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.observed_at_ms)
    }

    pub fn as_note(&self) -> Option<&NoteObservation> {
        match &self.kind {
            EventKind::Note(note) => Some(note),
            EventKind::Tick(_) => None,
        }
    }

    pub fn as_tick(&self) -> Option<&TickMarker> {
        match &self.kind {
            EventKind::Tick(tick) => Some(tick),
            EventKind::Note(_) => None,
        }
    }
}

/// Horizontal extent of the belt as fractions of the display width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayEdges {
    pub left: f32,
    pub right: f32,
}

impl Default for DisplayEdges {
    fn default() -> Self {
        Self {
            left: 0.1,
            right: 0.9,
        }
    }
}

/// Where an event sits on the belt at `now_ms`.
///
/// New events are at `edges.right`; an event that has lived for the whole
/// window (or longer) is at `edges.left`. The result is non-increasing in
/// `now_ms` and depends on nothing else.
pub fn position(event: &BufferedEvent, now_ms: u64, time_window_ms: u64, edges: DisplayEdges) -> f32 {
    let progress = if time_window_ms == 0 {
        1.0
    } else {
        (event.age_ms(now_ms) as f64 / time_window_ms as f64).min(1.0) as f32
    };
    let (low, high) = if edges.left <= edges.right {
        (edges.left, edges.right)
    } else {
        (edges.right, edges.left)
    };
    (edges.right - progress * (edges.right - edges.left)).clamp(low, high)
}

/// Outcome of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// Stored under the given id.
    Inserted(u64),
    /// A note arrived within the throttle interval of the previous one.
    Throttled,
    /// The same beat was already recorded moments ago.
    Duplicate,
}

impl Insertion {
    pub fn id(self) -> Option<u64> {
        match self {
            Insertion::Inserted(id) => Some(id),
            _ => None,
        }
    }
}

/// Tunables of a [`NoteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    pub time_window_ms: u64,
    /// Notes with a lower confidence are stored but not drawn.
    pub min_visible_clarity: f32,
    /// Minimum spacing between accepted notes.
    pub throttle_ms: u64,
    /// Window in which a repeated beat counter is ignored.
    pub tick_dedupe_ms: u64,
    /// Minimum spacing between periodic evictions.
    pub eviction_interval_ms: u64,
    pub edges: DisplayEdges,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            time_window_ms: DEFAULT_TIME_WINDOW_MS,
            min_visible_clarity: 0.5,
            throttle_ms: 100,
            tick_dedupe_ms: 50,
            eviction_interval_ms: 500,
            edges: DisplayEdges::default(),
        }
    }
}

/// Read-only copy of the buffer handed to the rendering consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    /// Oldest first.
    pub events: Vec<BufferedEvent>,
    pub time_window_ms: u64,
    pub edges: DisplayEdges,
}

impl BufferSnapshot {
    /// See [`position`].
    pub fn position(&self, event: &BufferedEvent, now_ms: u64) -> f32 {
        position(event, now_ms, self.time_window_ms, self.edges)
    }

    /// Events the consumer should draw, paired with their positions.
    pub fn visible_at(&self, now_ms: u64) -> impl Iterator<Item = (&BufferedEvent, f32)> + '_ {
        self.events
            .iter()
            .filter(|event| event.visible)
            .map(move |event| (event, self.position(event, now_ms)))
    }
}

impl Default for BufferSnapshot {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            time_window_ms: DEFAULT_TIME_WINDOW_MS,
            edges: DisplayEdges::default(),
        }
    }
}

/// The scrolling note buffer.
#[derive(Debug, Clone)]
pub struct NoteBuffer {
    events: VecDeque<BufferedEvent>,
    settings: BufferSettings,
    next_id: u64,
    last_note_at: Option<u64>,
    last_tick: Option<(u64, u64)>,
    last_eviction_at: Option<u64>,
}

impl Default for NoteBuffer {
    fn default() -> Self {
        Self::new(BufferSettings::default())
    }
}

impl NoteBuffer {
    pub fn new(mut settings: BufferSettings) -> Self {
        settings.time_window_ms = clamp_window(settings.time_window_ms);
        Self {
            events: VecDeque::new(),
            settings,
            next_id: 0,
            last_note_at: None,
            last_tick: None,
            last_eviction_at: None,
        }
    }

    pub fn settings(&self) -> &BufferSettings {
        &self.settings
    }

    pub fn time_window_ms(&self) -> u64 {
        self.settings.time_window_ms
    }

    /// Changes the window length, clamped to 5–30 s.
    ///
    /// Timestamps are untouched; positions and the eviction threshold follow
    /// the new window on the next recompute.
    pub fn set_time_window(&mut self, time_window_ms: u64) {
        self.settings.time_window_ms = clamp_window(time_window_ms);
    }

    /// Appends a detected note observed at `now_ms`.
    ///
    /// Notes closer than `throttle_ms` to the last accepted note are dropped.
    /// Notes below `min_visible_clarity` are kept but hidden.
    ///
    /// # Arguments
    ///
    /// * `note` - The observation; its timestamp is overwritten with `now_ms`.
    /// * `now_ms` - Milliseconds since the session started.
    ///
    /// # Returns
    ///
    /// The new event id, or [`Insertion::Throttled`].
    pub fn append_note(&mut self, mut note: NoteObservation, now_ms: u64) -> Insertion {
        if let Some(last) = self.last_note_at {
            if now_ms.saturating_sub(last) < self.settings.throttle_ms {
                return Insertion::Throttled;
            }
        }
        self.last_note_at = Some(now_ms);

        note.observed_at_ms = now_ms;
        let visible = note.confidence >= self.settings.min_visible_clarity;
        Insertion::Inserted(self.push(EventKind::Note(note), visible, now_ms))
    }

    /// Appends a beat marker.
    ///
    /// Beat markers bypass the note throttle; only a repeat of the last
    /// accepted beat counter within `tick_dedupe_ms` is rejected.
    ///
    /// # Arguments
    ///
    /// * `tick` - Beat number and accent.
    /// * `now_ms` - Milliseconds since the session started.
    ///
    /// # Returns
    ///
    /// The new event id, or [`Insertion::Duplicate`].
    pub fn append_tick(&mut self, tick: TickMarker, now_ms: u64) -> Insertion {
        if let Some((beat, at)) = self.last_tick {
            if beat == tick.beat && now_ms.saturating_sub(at) < self.settings.tick_dedupe_ms {
                return Insertion::Duplicate;
            }
        }
        self.last_tick = Some((tick.beat, now_ms));
        Insertion::Inserted(self.push(EventKind::Tick(tick), true, now_ms))
    }

    fn push(&mut self, kind: EventKind, visible: bool, now_ms: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push_back(BufferedEvent {
            id,
            observed_at_ms: now_ms,
            visible,
            kind,
        });
        id
    }

    /// Removes every event older than the time window.
    ///
    /// # Arguments
    ///
    /// * `now_ms` - Milliseconds since the session started.
    ///
    /// # Returns
    ///
    /// The number of events removed.
    pub fn evict_expired(&mut self, now_ms: u64) -> usize {
        let window = self.settings.time_window_ms;
        let before = self.events.len();
        self.events.retain(|event| event.age_ms(now_ms) <= window);
        self.last_eviction_at = Some(now_ms);
        before - self.events.len()
    }

    /// Runs [`NoteBuffer::evict_expired`] if the eviction interval has passed.
    pub fn maybe_evict(&mut self, now_ms: u64) -> usize {
        match self.last_eviction_at {
            Some(last) if now_ms.saturating_sub(last) < self.settings.eviction_interval_ms => 0,
            _ => self.evict_expired(now_ms),
        }
    }

    /// Position of `event` under this buffer's window and edges.
    pub fn position(&self, event: &BufferedEvent, now_ms: u64) -> f32 {
        position(event, now_ms, self.settings.time_window_ms, self.settings.edges)
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            events: self.events.iter().cloned().collect(),
            time_window_ms: self.settings.time_window_ms,
            edges: self.settings.edges,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedEvent> {
        self.events.iter()
    }

    pub fn visible(&self) -> impl Iterator<Item = &BufferedEvent> {
        self.events.iter().filter(|event| event.visible)
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteObservation> {
        self.events.iter().filter_map(BufferedEvent::as_note)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops all events and throttle state. Ids keep counting up.
    pub fn clear(&mut self) {
        self.events.clear();
        self.last_note_at = None;
        self.last_tick = None;
        self.last_eviction_at = None;
    }
}

fn clamp_window(time_window_ms: u64) -> u64 {
    time_window_ms.clamp(MIN_TIME_WINDOW_MS, MAX_TIME_WINDOW_MS)
}
