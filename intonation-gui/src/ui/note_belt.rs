//! # Note Belt
//!
//! Draws a buffer snapshot as a conveyor belt. New events appear at the
//! right edge and drift left as they age; the horizontal position of every
//! event comes from the snapshot's position function, so the belt keeps
//! moving between detections.
//!
//! Notes sit above or below the center line by their cents deviation.
//! Beat markers are vertical lines, accented beats brighter and wider.

use iced::alignment;
use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::{Color, Element, Pixels, Point, Rectangle, Renderer, Size, Theme, mouse};
use intonation_core::{BufferSnapshot, EventKind};

use super::cent_meter::deviation_color;
use crate::Message;

/// Fraction of the half-height used for ±50 cents.
const CENTS_SPAN: f32 = 0.7;

const NOTE_RADIUS: f32 = 7.0;

pub struct NoteBelt {
    snapshot: BufferSnapshot,
    now_ms: u64,
}

impl NoteBelt {
    pub fn new(snapshot: BufferSnapshot, now_ms: u64) -> Self {
        Self { snapshot, now_ms }
    }

    pub fn view(self) -> Element<'static, Message> {
        canvas::Canvas::new(self)
            .width(iced::Length::Fill)
            .height(iced::Length::Fill)
            .into()
    }
}

fn guide(width: f32) -> Stroke<'static> {
    Stroke::default()
        .with_width(width)
        .with_color(Color::from_rgb8(0x55, 0x55, 0x5a))
}

/// Older events fade out towards the left edge.
fn fade(position: f32, left: f32, right: f32) -> f32 {
    let span = right - left;
    if span.abs() < f32::EPSILON {
        return 1.0;
    }
    ((position - left) / span).clamp(0.25, 1.0)
}

impl canvas::Program<Message> for NoteBelt {
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
        if !bounds.width.is_finite() || !bounds.height.is_finite() {
            return vec![frame.into_geometry()];
        }

        frame.fill(
            &Path::rectangle(Point::ORIGIN, bounds.size()),
            Color::from_rgb8(0x22, 0x22, 0x26),
        );

        let edges = self.snapshot.edges;
        let center_y = bounds.height / 2.0;

        frame.stroke(
            &Path::line(
                Point::new(edges.left * bounds.width, center_y),
                Point::new(edges.right * bounds.width, center_y),
            ),
            guide(1.0),
        );
        // The "now" edge where new events enter.
        let now_x = edges.right * bounds.width;
        frame.stroke(
            &Path::line(Point::new(now_x, 0.0), Point::new(now_x, bounds.height)),
            guide(2.0),
        );

        for (event, position) in self.snapshot.visible_at(self.now_ms) {
            let x = position * bounds.width;
            let alpha = fade(position, edges.left, edges.right);

            match &event.kind {
                EventKind::Tick(tick) => {
                    let (width, color) = if tick.accent {
                        (3.0, Color::from_rgb8(0xE0, 0xE0, 0xFF))
                    } else {
                        (1.5, Color::from_rgb8(0x90, 0x90, 0xA0))
                    };
                    frame.stroke(
                        &Path::line(Point::new(x, 0.0), Point::new(x, bounds.height)),
                        Stroke::default()
                            .with_width(width)
                            .with_color(Color { a: alpha, ..color }),
                    );
                }
                EventKind::Note(note) => {
                    let cents = note.cents_deviation as f32;
                    let y = center_y - cents / 50.0 * center_y * CENTS_SPAN;
                    let color = Color {
                        a: alpha,
                        ..deviation_color(cents)
                    };

                    frame.fill(&Path::circle(Point::new(x, y), NOTE_RADIUS), color);
                    frame.fill_text(canvas::Text {
                        content: note.label(),
                        position: Point::new(x, y - NOTE_RADIUS - 4.0),
                        color: Color { a: alpha, ..Color::WHITE },
                        size: Pixels(14.0),
                        horizontal_alignment: alignment::Horizontal::Center,
                        vertical_alignment: alignment::Vertical::Bottom,
                        ..canvas::Text::default()
                    });
                }
            }
        }

        let border = Path::rectangle(Point::ORIGIN, Size::new(bounds.width, bounds.height));
        frame.stroke(&border, guide(1.0));

        vec![frame.into_geometry()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_events_are_opaque_and_old_ones_dim() {
        assert_eq!(fade(0.9, 0.1, 0.9), 1.0);
        assert_eq!(fade(0.1, 0.1, 0.9), 0.25);
        assert!(fade(0.5, 0.1, 0.9) > 0.25);
        assert_eq!(fade(0.5, 0.5, 0.5), 1.0);
    }
}
