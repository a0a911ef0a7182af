//! # Main Display Module
//!
//! Layout of the main window: note read-out and cent meter on top, the note
//! belt below and the control sidebar on the right.

use iced::widget::{Space, button, column, container, horizontal_space, row, slider, text, toggler};
use iced::{Alignment, Color, Element, Length};
use intonation_core::SignalStatus;
use intonation_core::metronome::{MAX_BPM, MIN_BPM};
use intonation_core::notation::{self, Accidental, NotationSystem};
use intonation_core::note_buffer::{MAX_TIME_WINDOW_MS, MIN_TIME_WINDOW_MS};
use intonation_core::tuning::{MAX_REFERENCE_HZ, MIN_REFERENCE_HZ};

use super::{cent_meter, note_belt};
use crate::{AppDisplayData, Message};

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'_, Message> {
    let title = row![
        text("Intonation").size(28),
        horizontal_space(),
        text(status_text(data)).size(16),
    ]
    .align_y(Alignment::Center);

    let belt = container(
        note_belt::NoteBelt::new(data.snapshot.buffer.clone(), data.snapshot.now_ms).view(),
    )
    .width(Length::Fill)
    .height(Length::Fill);

    let main_content = row![
        column![
            title,
            Space::with_height(10),
            create_readout_panel(data),
            Space::with_height(10),
            belt,
        ]
        .width(Length::Fill)
        .spacing(5),
        Space::with_width(10),
        create_sidebar(data),
    ]
    .align_y(Alignment::Start)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn status_text(data: &AppDisplayData) -> String {
    match data.snapshot.status {
        _ if !data.session_active => "Stopped".to_string(),
        SignalStatus::Idle => "Stopped".to_string(),
        SignalStatus::NoSignal => format!("{} · No signal", data.source_label),
        SignalStatus::Tracking => format!("{} · Listening", data.source_label),
    }
}

/// Current note, frequency, confidence and the cent meter.
fn create_readout_panel(data: &AppDisplayData) -> Element<'_, Message> {
    let reference = data.reference;
    let tracking = data.session_active && data.snapshot.status == SignalStatus::Tracking;

    // Re-spell with the current preference so a notation switch shows at once.
    let (note_text, freq_text, confidence_text) = match (&data.snapshot.latest, tracking) {
        (Some(note), true) => (
            format!(
                "{}{}",
                notation::convert_note_name(&note.note_name, reference.notation, reference.accidental),
                note.octave
            ),
            format!("{:.2} Hz", note.frequency_hz),
            format!("{:.0}%", note.confidence * 100.0),
        ),
        _ => ("--".to_string(), "-- Hz".to_string(), "--".to_string()),
    };

    let cents = if tracking { data.snapshot.smoothed_cents } else { None };
    let cents_text = cents
        .map(|c| format!("{c:+.0} cents"))
        .unwrap_or_else(|| "No signal".to_string());

    container(
        column![
            row![
                text(note_text).size(40),
                Space::with_width(20),
                column![text(freq_text).size(18), text(cents_text).size(14)],
                horizontal_space(),
                column![text("Confidence").size(12), text(confidence_text).size(18)]
                    .align_x(Alignment::End),
            ]
            .align_y(Alignment::Center),
            cent_meter::CentMeter::new(cents).view(),
        ]
        .spacing(8)
        .padding(10),
    )
    .width(Length::Fill)
    .into()
}

/// A sidebar button, highlighted when `active`.
fn make_button(label: &str, message: Option<Message>, active: bool) -> Element<'static, Message> {
    let mut button = button(text(label.to_string()).size(14).width(Length::Fill)).padding([6, 10]);

    if active {
        button = button.style(|_theme, _status| button::Style {
            background: Some(iced::Background::Color(Color::from_rgb(0.2, 0.5, 0.8))),
            text_color: Color::WHITE,
            ..button::Style::default()
        });
    }

    button.on_press_maybe(message).into()
}

fn section<'a>(title: &'static str, items: Vec<Element<'a, Message>>) -> Element<'a, Message> {
    let items = items
        .into_iter()
        .fold(column![].spacing(8), |col, item| col.push(item));

    column![text(title).size(18), Space::with_height(5), items]
        .spacing(5)
        .into()
}

fn create_sidebar(data: &AppDisplayData) -> Element<'_, Message> {
    let active = data.session_active;
    let reference = data.reference;
    let metronome = data.metronome;

    let session = section(
        "Session",
        vec![
            make_button("Start", (!active).then_some(Message::Start), active),
            make_button("Stop", active.then_some(Message::Stop), false),
            make_button("Clear", Some(Message::Clear), false),
        ],
    );

    let tuning = section(
        "Tuning",
        vec![
            text(format!("A4 = {:.0} Hz", reference.standard_pitch_hz)).size(14).into(),
            slider(
                MIN_REFERENCE_HZ..=MAX_REFERENCE_HZ,
                reference.standard_pitch_hz,
                Message::ReferenceChanged,
            )
            .step(1.0)
            .into(),
            row![
                make_button(
                    "C D E",
                    Some(Message::NotationChanged(NotationSystem::Letter)),
                    reference.notation == NotationSystem::Letter,
                ),
                make_button(
                    "Do Re Mi",
                    Some(Message::NotationChanged(NotationSystem::Solfege)),
                    reference.notation == NotationSystem::Solfege,
                ),
            ]
            .spacing(5)
            .into(),
            row![
                make_button(
                    "♯",
                    Some(Message::AccidentalChanged(Accidental::Sharp)),
                    reference.accidental == Accidental::Sharp,
                ),
                make_button(
                    "♭",
                    Some(Message::AccidentalChanged(Accidental::Flat)),
                    reference.accidental == Accidental::Flat,
                ),
            ]
            .spacing(5)
            .into(),
        ],
    );

    let window = section(
        "Display",
        vec![
            text(format!("Time window: {:.0} s", data.time_window_secs)).size(14).into(),
            slider(
                (MIN_TIME_WINDOW_MS / 1000) as f32..=(MAX_TIME_WINDOW_MS / 1000) as f32,
                data.time_window_secs,
                Message::WindowChanged,
            )
            .step(1.0)
            .into(),
        ],
    );

    let rhythm = section(
        "Metronome",
        vec![
            toggler(metronome.enabled)
                .label("Beat markers")
                .on_toggle(Message::MetronomeToggled)
                .into(),
            text(format!("{:.0} BPM", metronome.bpm)).size(14).into(),
            slider(MIN_BPM..=MAX_BPM, metronome.bpm, Message::BpmChanged)
                .step(1.0)
                .into(),
            make_button("Tap beat", active.then_some(Message::Beat), false),
        ],
    );

    let mut sidebar = column![
        session,
        tuning,
        window,
        rhythm,
        make_button("Save settings", Some(Message::SaveSettings), false),
    ]
    .spacing(15);

    if let Some(notice) = &data.notice {
        sidebar = sidebar.push(text(notice.clone()).size(12));
    }

    container(sidebar.padding(15))
        .width(Length::Fixed(260.0))
        .height(Length::Fill)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use intonation_core::FrameSnapshot;
    use intonation_core::metronome::MetronomeSettings;
    use intonation_core::settings::ReferencePitchConfig;

    fn data(active: bool, status: SignalStatus) -> AppDisplayData {
        AppDisplayData {
            session_active: active,
            snapshot: FrameSnapshot {
                status,
                ..FrameSnapshot::default()
            },
            reference: ReferencePitchConfig::default(),
            time_window_secs: 10.0,
            metronome: MetronomeSettings::default(),
            source_label: "Microphone".to_string(),
            notice: None,
        }
    }

    #[test]
    fn status_line_reports_missing_signal() {
        assert_eq!(status_text(&data(false, SignalStatus::Tracking)), "Stopped");
        assert_eq!(status_text(&data(true, SignalStatus::NoSignal)), "Microphone · No signal");
        assert_eq!(status_text(&data(true, SignalStatus::Tracking)), "Microphone · Listening");
    }
}
