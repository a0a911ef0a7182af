//! # Intonation - Live Pitch Trainer GUI
//!
//! Desktop front-end for `intonation-core`. It runs one detection session at
//! a time, edits the reference pitch and note spelling while detection is
//! running and draws the scrolling belt of recent notes.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Detection Thread**: owned by [`Session`], runs the analysis and
//!   display cadences
//! - **Updates**: every display tick the newest snapshot is pulled from the
//!   session

mod logger;
mod ui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use iced::{Element, Subscription, Task, Theme};
use intonation_core::metronome::MetronomeSettings;
use intonation_core::notation::{Accidental, NotationSystem};
use intonation_core::{
    AudioSource, FrameSnapshot, MicrophoneSource, PracticeSettings, ReferencePitchConfig, Session,
    SharedPreferences, ToneSource,
};
use tracing::{error, info, warn};
use ui::main_display::create_main_view;

#[derive(Parser, Debug)]
#[command(version, about = "Shows the notes you play on a scrolling belt")]
struct Cli {
    /// Settings file to load at start-up and write on save.
    #[arg(long, value_name = "PATH", default_value = "intonation.json")]
    settings: PathBuf,

    /// Listen to a generated tone of this frequency instead of the microphone.
    #[arg(long, value_name = "HZ")]
    test_tone: Option<f32>,
}

pub fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();

    let settings = PracticeSettings::load_or_default(&cli.settings)
        .with_context(|| format!("Couldn't load settings from {}", cli.settings.display()))?;
    info!("Starting with A4 = {} Hz", settings.reference.standard_pitch_hz);

    iced::application("Intonation", IntonationApp::update, IntonationApp::view)
        .subscription(IntonationApp::subscription)
        .theme(IntonationApp::theme)
        .window_size((1100.0, 640.0))
        .run_with(move || (IntonationApp::new(cli, settings), Task::none()))
        .context("GUI terminated with an error")?;

    info!("Application finished");
    Ok(())
}

#[derive(Debug, Clone)]
pub enum Message {
    Start,
    Stop,

    ReferenceChanged(f32),
    NotationChanged(NotationSystem),
    AccidentalChanged(Accidental),
    /// New time window in seconds.
    WindowChanged(f32),

    MetronomeToggled(bool),
    BpmChanged(f32),
    /// Manual beat marker.
    Beat,

    Clear,
    SaveSettings,

    /// Display tick.
    Tick,
}

/// Everything the view needs.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub session_active: bool,
    pub snapshot: FrameSnapshot,
    pub reference: ReferencePitchConfig,
    pub time_window_secs: f32,
    pub metronome: MetronomeSettings,
    /// Where audio comes from, e.g. "Microphone".
    pub source_label: String,
    /// Last error or confirmation shown under the controls.
    pub notice: Option<String>,
}

struct IntonationApp {
    session: Session,
    preferences: SharedPreferences,
    settings: PracticeSettings,
    settings_path: PathBuf,
    test_tone: Option<f32>,
    /// Manual beats since the session started, for bar accents.
    taps: u64,
    display_data: AppDisplayData,
}

impl IntonationApp {
    fn new(cli: Cli, settings: PracticeSettings) -> Self {
        let preferences = SharedPreferences::new(settings.reference);
        let mut session = Session::new(settings.tracker, preferences.clone());
        session.set_metronome(Some(settings.metronome));

        let source_label = match cli.test_tone {
            Some(hz) => format!("Test tone {hz:.1} Hz"),
            None => "Microphone".to_string(),
        };

        Self {
            display_data: AppDisplayData {
                session_active: false,
                snapshot: FrameSnapshot::default(),
                reference: preferences.get(),
                time_window_secs: settings.tracker.buffer.time_window_ms as f32 / 1000.0,
                metronome: settings.metronome,
                source_label,
                notice: None,
            },
            session,
            preferences,
            settings,
            settings_path: cli.settings,
            test_tone: cli.test_tone,
            taps: 0,
        }
    }

    fn start(&mut self) {
        let test_tone = self.test_tone;
        let result = self.session.start(move || -> Box<dyn AudioSource> {
            match test_tone {
                Some(hz) => Box::new(ToneSource::drone(hz)),
                None => Box::new(MicrophoneSource::new()),
            }
        });

        match result {
            Ok(()) => {
                self.taps = 0;
                self.display_data.notice = None;
            }
            Err(err) => {
                error!("Couldn't start detection: {}", err);
                self.display_data.notice = Some(err.to_string());
            }
        }
        self.display_data.session_active = self.session.is_active();
    }

    fn update(&mut self, message: Message) {
        match message {
            Message::Start => self.start(),
            Message::Stop => {
                self.session.stop();
                self.display_data.session_active = false;
                self.display_data.snapshot = self.session.poll().clone();
            }
            Message::ReferenceChanged(hz) => {
                self.preferences.update(|config| config.set_standard_pitch(hz));
                self.sync_reference();
            }
            Message::NotationChanged(notation) => {
                self.preferences.update(|config| config.notation = notation);
                self.sync_reference();
            }
            Message::AccidentalChanged(accidental) => {
                self.preferences.update(|config| config.accidental = accidental);
                self.sync_reference();
            }
            Message::WindowChanged(secs) => {
                let window_ms = (secs.round() as u64) * 1000;
                self.session.set_time_window(window_ms);
                self.settings.tracker.buffer.time_window_ms = window_ms;
                self.display_data.time_window_secs = secs.round();
                if !self.session.is_active() {
                    self.display_data.snapshot = self.session.poll().clone();
                }
            }
            Message::MetronomeToggled(enabled) => {
                self.settings.metronome.enabled = enabled;
                self.sync_metronome();
            }
            Message::BpmChanged(bpm) => {
                self.settings.metronome.bpm = bpm.round();
                self.sync_metronome();
            }
            Message::Beat => {
                let beats_per_bar = self.settings.metronome.beats_per_bar.max(1) as u64;
                self.session.beat(self.taps % beats_per_bar == 0);
                self.taps += 1;
            }
            Message::Clear => {
                self.session.clear();
                self.display_data.snapshot = self.session.poll().clone();
            }
            Message::SaveSettings => {
                self.settings.reference = self.preferences.get();
                match self.settings.save(&self.settings_path) {
                    Ok(()) => {
                        info!("Settings saved to {}", self.settings_path.display());
                        self.display_data.notice =
                            Some(format!("Saved to {}", self.settings_path.display()));
                    }
                    Err(err) => {
                        warn!("Error saving settings: {}", err);
                        self.display_data.notice = Some(err.to_string());
                    }
                }
            }
            Message::Tick => {
                if self.session.is_active() {
                    self.display_data.snapshot = self.session.poll().clone();
                }
            }
        }
    }

    fn sync_reference(&mut self) {
        let reference = self.preferences.get();
        self.settings.reference = reference;
        self.display_data.reference = reference;
    }

    fn sync_metronome(&mut self) {
        self.display_data.metronome = self.settings.metronome;
        self.session.set_metronome(Some(self.settings.metronome));
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    fn subscription(&self) -> Subscription<Message> {
        let interval = self.settings.tracker.display_interval_ms.max(1);
        iced::time::every(Duration::from_millis(interval)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
