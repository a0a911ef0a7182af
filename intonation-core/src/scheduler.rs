//! # Scheduler Module
//!
//! Drives a [`Tracker`] on two independent cadences from a single thread:
//!
//! - the analysis tick (~30 Hz) estimates the latest audio window
//! - the display tick (~60 Hz) ages the buffer and publishes a snapshot
//!
//! Audio chunks, commands and both timers meet in one
//! `crossbeam_channel::select!`, so the tracker is never shared and commands
//! are handled strictly in arrival order.
//!
//! [`Session`] wraps the loop in a worker thread and enforces the one
//! capture at a time rule. The audio source is built on the worker thread
//! because device streams are generally not `Send`.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use tracing::{debug, info, warn};

use crate::audio::{AudioSource, CaptureError};
use crate::metronome::MetronomeSettings;
use crate::note_buffer::{BufferSnapshot, NoteBuffer};
use crate::settings::{SharedPreferences, TrackerSettings};
use crate::tracker::{FrameSnapshot, SignalStatus, Tracker};

/// Pending snapshots kept for a slow consumer before new ones are dropped.
const SNAPSHOT_BACKLOG: usize = 4;

/// Pending audio chunks before the capture callback starts dropping them.
const FRAME_BACKLOG: usize = 256;

/// Messages from the controller to a running loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Leave the loop and release the audio source.
    Stop,
    /// Record a manual beat marker; the loop assigns its number.
    Beat { accent: bool },
    SetTimeWindow(u64),
    /// Start (or restart) the beat clock, `None` stops it.
    SetMetronome(Option<MetronomeSettings>),
    /// Empty the buffer.
    Clear,
}

/// The two cadences of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub analysis: Duration,
    pub display: Duration,
}

impl Cadence {
    pub fn from_settings(settings: &TrackerSettings) -> Self {
        Self {
            analysis: Duration::from_millis(settings.analysis_interval_ms.max(1)),
            display: Duration::from_millis(settings.display_interval_ms.max(1)),
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::from_settings(&TrackerSettings::default())
    }
}

/// The cooperative update loop.
pub struct Scheduler {
    cadence: Cadence,
    started_at: Instant,
}

impl Scheduler {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            started_at: Instant::now(),
        }
    }

    /// Milliseconds since the scheduler was created.
    pub fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Runs until [`Command::Stop`] arrives or every command sender is gone.
    ///
    /// Each display tick publishes a snapshot with `try_send`, dropping it if
    /// the consumer is behind. A closed frame channel does not end the loop.
    ///
    /// # Arguments
    ///
    /// * `tracker` - The tracker to drive; it is confined to this thread.
    /// * `frames` - Audio chunks from the source.
    /// * `commands` - Controller messages, handled in arrival order.
    /// * `snapshots` - Where display snapshots are published.
    ///
    /// # Returns
    ///
    /// The tracker, so its buffer can be inspected after the run.
    pub fn run(
        &self,
        mut tracker: Tracker,
        frames: Receiver<Vec<f32>>,
        commands: Receiver<Command>,
        snapshots: Sender<FrameSnapshot>,
    ) -> Tracker {
        let analysis = crossbeam_channel::tick(self.cadence.analysis);
        let display = crossbeam_channel::tick(self.cadence.display);
        let mut frames = Some(frames);

        loop {
            // A closed frame channel is replaced by `never`, so the loop
            // keeps scrolling and reports no signal.
            let frame_rx = frames.clone().unwrap_or_else(crossbeam_channel::never);
            select! {
                recv(frame_rx) -> msg => match msg {
                    Ok(chunk) => tracker.push_samples(&chunk),
                    Err(_) => {
                        warn!("Audio channel closed");
                        frames = None;
                    }
                },
                recv(analysis) -> _ => {
                    tracker.analyze(self.now_ms());
                },
                recv(display) -> _ => {
                    let snapshot = tracker.display_tick(self.now_ms());
                    if let Err(TrySendError::Disconnected(_)) = snapshots.try_send(snapshot) {
                        debug!("Snapshot consumer is gone");
                    }
                },
                recv(commands) -> msg => match msg {
                    Ok(Command::Stop) | Err(_) => {
                        debug!("Leaving the update loop");
                        break;
                    }
                    Ok(command) => apply(&mut tracker, command, self.now_ms()),
                },
            }
        }

        tracker
    }
}

fn apply(tracker: &mut Tracker, command: Command, now_ms: u64) {
    match command {
        Command::Beat { accent } => {
            tracker.push_tick(accent, now_ms);
        }
        Command::SetTimeWindow(ms) => tracker.set_time_window(ms),
        Command::SetMetronome(settings) => tracker.set_metronome(settings, now_ms),
        Command::Clear => tracker.clear(),
        Command::Stop => {}
    }
}

/// What is left of a run after it stopped.
#[derive(Debug, Clone)]
pub struct FinishedRun {
    pub buffer: NoteBuffer,
    pub snapshot: FrameSnapshot,
}

struct ActiveSession {
    commands: Sender<Command>,
    snapshots: Receiver<FrameSnapshot>,
    worker: JoinHandle<Option<FinishedRun>>,
    sample_rate: u32,
}

/// An exclusive detection session.
///
/// At most one capture is active; [`Session::start`] while running is a
/// no-op and [`Session::stop`] may be called any number of times. The
/// buffer of the last stopped run stays available for inspection.
pub struct Session {
    settings: TrackerSettings,
    preferences: SharedPreferences,
    metronome: Option<MetronomeSettings>,
    active: Option<ActiveSession>,
    finished: Option<FinishedRun>,
    latest: FrameSnapshot,
}

impl Session {
    pub fn new(settings: TrackerSettings, preferences: SharedPreferences) -> Self {
        Self {
            settings,
            preferences,
            metronome: None,
            active: None,
            finished: None,
            latest: FrameSnapshot::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn preferences(&self) -> &SharedPreferences {
        &self.preferences
    }

    /// Sample rate of the running capture.
    pub fn sample_rate(&self) -> Option<u32> {
        self.active.as_ref().map(|active| active.sample_rate)
    }

    /// Starts capturing with the source built by `make_source`.
    ///
    /// The source is created and started on the worker thread. Calling this
    /// while a capture is running does nothing.
    ///
    /// # Arguments
    ///
    /// * `make_source` - Builds the audio source on the worker thread.
    ///
    /// # Returns
    ///
    /// `Ok(())` once the source delivers audio, or the source's start error.
    /// After an error the source has been stopped and the session is
    /// inactive.
    pub fn start<S, F>(&mut self, make_source: F) -> Result<(), CaptureError>
    where
        S: AudioSource,
        F: FnOnce() -> S + Send + 'static,
    {
        if self.active.is_some() {
            debug!("Session already active");
            return Ok(());
        }

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(SNAPSHOT_BACKLOG);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, CaptureError>>(1);

        let settings = self.settings;
        let preferences = self.preferences.clone();
        let metronome = self.metronome;

        let worker = thread::Builder::new()
            .name("intonation-detect".into())
            .spawn(move || {
                let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_BACKLOG);
                let mut source = make_source();
                let sample_rate = match source.start(frame_tx) {
                    Ok(rate) => rate,
                    Err(err) => {
                        source.stop();
                        let _ = ready_tx.send(Err(err));
                        return None;
                    }
                };
                let _ = ready_tx.send(Ok(sample_rate));

                let scheduler = Scheduler::new(Cadence::from_settings(&settings));
                let mut tracker = Tracker::new(settings, preferences, sample_rate);
                tracker.set_metronome(metronome, 0);

                let tracker = scheduler.run(tracker, frame_rx, command_rx, snapshot_tx);
                source.stop();
                info!("Audio source released");

                let mut snapshot = tracker.snapshot(scheduler.now_ms());
                snapshot.status = SignalStatus::Idle;
                Some(FinishedRun {
                    buffer: tracker.into_buffer(),
                    snapshot,
                })
            })
            .map_err(|err| {
                warn!("Couldn't spawn the detection worker: {}", err);
                CaptureError::WorkerExited
            })?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!("Session started at {} Hz", sample_rate);
                self.finished = None;
                self.latest = FrameSnapshot::default();
                self.active = Some(ActiveSession {
                    commands: command_tx,
                    snapshots: snapshot_rx,
                    worker,
                    sample_rate,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                warn!("Couldn't start audio capture: {}", err);
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CaptureError::WorkerExited)
            }
        }
    }

    /// Stops the running capture, if any, and waits for the device to be
    /// released.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let _ = active.commands.send(Command::Stop);
        match active.worker.join() {
            Ok(Some(run)) => {
                self.latest = run.snapshot.clone();
                self.finished = Some(run);
            }
            Ok(None) => {}
            Err(_) => {
                warn!("Detection worker panicked");
                self.latest.status = SignalStatus::Idle;
            }
        }
        info!("Session stopped");
    }

    fn send(&self, command: Command) {
        if let Some(active) = &self.active {
            if active.commands.send(command).is_err() {
                warn!("Detection worker is not listening");
            }
        }
    }

    /// Records a manual beat marker in the running session.
    pub fn beat(&self, accent: bool) {
        self.send(Command::Beat { accent });
    }

    pub fn set_time_window(&mut self, time_window_ms: u64) {
        self.settings.buffer.time_window_ms = time_window_ms;
        if let Some(run) = self.finished.as_mut() {
            run.buffer.set_time_window(time_window_ms);
            run.snapshot.buffer = run.buffer.snapshot();
            self.latest.buffer = run.snapshot.buffer.clone();
        }
        self.send(Command::SetTimeWindow(time_window_ms));
    }

    /// Changes the beat clock now and for future runs.
    pub fn set_metronome(&mut self, settings: Option<MetronomeSettings>) {
        self.metronome = settings;
        self.send(Command::SetMetronome(settings));
    }

    /// Empties the buffer of the running session or of the last run.
    pub fn clear(&mut self) {
        if let Some(run) = self.finished.as_mut() {
            run.buffer.clear();
            run.snapshot.buffer = run.buffer.snapshot();
            run.snapshot.latest = None;
            run.snapshot.smoothed_cents = None;
            self.latest = run.snapshot.clone();
        }
        self.send(Command::Clear);
    }

    /// Drains published snapshots and returns the newest one.
    pub fn poll(&mut self) -> &FrameSnapshot {
        if let Some(active) = &self.active {
            while let Ok(snapshot) = active.snapshots.try_recv() {
                self.latest = snapshot;
            }
        }
        &self.latest
    }

    /// The last stopped run.
    pub fn finished(&self) -> Option<&FinishedRun> {
        self.finished.as_ref()
    }

    /// Buffer contents of the last stopped run.
    pub fn final_buffer(&self) -> Option<BufferSnapshot> {
        self.finished.as_ref().map(|run| run.buffer.snapshot())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ToneGenerator, ToneSegment};

    #[test]
    fn loop_analyzes_applies_commands_and_hands_back_the_buffer() {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(SNAPSHOT_BACKLOG);

        let tone = vec![ToneSegment::tone(440.0, Duration::from_secs(1))];
        frame_tx
            .send(ToneGenerator::new(tone, 44_100, 0.5).next_chunk(4096))
            .unwrap();
        command_tx
            .send(Command::Beat { accent: true })
            .unwrap();

        let worker = thread::spawn(move || {
            let tracker = Tracker::new(TrackerSettings::default(), SharedPreferences::default(), 44_100);
            Scheduler::new(Cadence::default())
                .run(tracker, frame_rx, command_rx, snapshot_tx)
                .into_buffer()
        });

        thread::sleep(Duration::from_millis(200));
        command_tx.send(Command::Stop).unwrap();
        let buffer = worker.join().unwrap();

        assert!(buffer.notes().any(|note| note.label() == "A4"));
        assert!(buffer.iter().any(|event| event.as_tick().is_some()));
        assert!(snapshot_rx.try_recv().is_ok());
        drop(frame_tx);
    }

    #[test]
    fn cadences_follow_the_settings() {
        let cadence = Cadence::default();
        assert_eq!(cadence.analysis, Duration::from_millis(33));
        assert_eq!(cadence.display, Duration::from_millis(16));
    }
}
