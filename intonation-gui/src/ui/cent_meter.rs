//! # Cent Meter
//!
//! Horizontal meter for the smoothed deviation of the current note, with
//! scale marks every 10 cents and a color-coded needle.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::{Color, Element, Point, Rectangle, Renderer, Size, Theme, mouse};

use crate::Message;

/// The meter spans -50..=50 cents.
const METER_RANGE: f32 = 50.0;

const IN_TUNE: Color = Color { r: 0.20, g: 0.86, b: 0.60, a: 1.0 };
const CLOSE: Color = Color { r: 1.0, g: 0.76, b: 0.0, a: 1.0 };
const OFF: Color = Color { r: 1.0, g: 0.20, b: 0.20, a: 1.0 };

/// Color for a deviation in cents: green within 5, yellow within 20.
pub fn deviation_color(cents: f32) -> Color {
    match cents.abs() {
        c if c < 5.0 => IN_TUNE,
        c if c < 20.0 => CLOSE,
        _ => OFF,
    }
}

pub struct CentMeter {
    cents: Option<f32>,
}

impl CentMeter {
    pub fn new(cents: Option<f32>) -> Self {
        Self { cents }
    }

    pub fn view(self) -> Element<'static, Message> {
        canvas::Canvas::new(self)
            .width(iced::Length::Fill)
            .height(iced::Length::Fixed(60.0))
            .into()
    }
}

impl canvas::Program<Message> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let to_x = |cents: f32| (cents + METER_RANGE) / (2.0 * METER_RANGE) * bounds.width;

        frame.fill(
            &Path::rectangle(Point::ORIGIN, bounds.size()),
            Color::from_rgb8(0x30, 0x30, 0x30),
        );

        // In-tune zone.
        let zone_left = to_x(-5.0);
        frame.fill(
            &Path::rectangle(
                Point::new(zone_left, 0.0),
                Size::new(to_x(5.0) - zone_left, bounds.height),
            ),
            Color { a: 0.15, ..IN_TUNE },
        );

        for mark in (-50..=50).step_by(10) {
            let x = to_x(mark as f32);
            let (height, color) = if mark == 0 {
                (bounds.height, Color::WHITE)
            } else {
                (bounds.height * 0.3, Color::from_rgb8(0x80, 0x80, 0x80))
            };
            frame.stroke(
                &Path::line(Point::new(x, bounds.height - height), Point::new(x, bounds.height)),
                Stroke::default().with_width(if mark == 0 { 2.0 } else { 1.0 }).with_color(color),
            );
        }

        if let Some(cents) = self.cents {
            let x = to_x(cents.clamp(-METER_RANGE, METER_RANGE));
            let needle = Path::rectangle(Point::new(x - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, deviation_color(cents));
        }

        vec![frame.into_geometry()]
    }
}
