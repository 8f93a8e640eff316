//! Face geometry for the kiosk display
//!
//! Pure functions producing draw-shape lists for the idle/talking face and
//! the per-emotion static faces. Everything is proportional to the surface
//! size, so a resize is just a re-render at the new dimensions. There are no
//! error paths; a zero-sized surface yields an empty frame.

use crate::coordinator::state::EmotionLabel;

/// How a shape is painted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintStyle {
    Fill,
    Stroke { width: f32 },
}

/// A single draw primitive in surface coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Axis-aligned filled rectangle
    Rect { x: f32, y: f32, w: f32, h: f32 },
    /// Straight stroked line
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
    },
    /// Elliptical arc from `start` to `end` radians
    Arc {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        start: f32,
        end: f32,
        style: PaintStyle,
    },
    /// Quadratic curve with a single control point
    Curve {
        x1: f32,
        y1: f32,
        cx: f32,
        cy: f32,
        x2: f32,
        y2: f32,
        width: f32,
    },
}

/// One rendered face, ready for presentation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceFrame {
    pub width: f32,
    pub height: f32,
    pub shapes: Vec<Shape>,
}

impl FaceFrame {
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// Shared proportions for one surface size
struct FaceMetrics {
    height: f32,
    center_x: f32,
    center_y: f32,
    eye_separation: f32,
    eye_width: f32,
    eye_height: f32,
    eye_y: f32,
    mouth_center_y: f32,
    mouth_rx: f32,
    mouth_ry: f32,
    line_width: f32,
}

impl FaceMetrics {
    fn for_surface(w: f32, h: f32) -> Self {
        Self {
            height: h,
            center_x: w / 2.0,
            center_y: h / 2.0,
            eye_separation: w * 0.5,
            eye_width: w * 0.15,
            eye_height: h * 0.15,
            eye_y: h / 2.0 - h * 0.2,
            mouth_center_y: h / 2.0 + h * 0.2,
            mouth_rx: w * 0.25,
            mouth_ry: h * 0.1,
            line_width: (w * 0.015).max(5.0),
        }
    }

    fn left_eye_x(&self) -> f32 {
        self.center_x - self.eye_separation / 2.0
    }

    fn right_eye_x(&self) -> f32 {
        self.center_x + self.eye_separation / 2.0
    }
}

fn eye_rects(m: &FaceMetrics, eye_height: f32, eye_y: f32) -> [Shape; 2] {
    let make = |eye_x: f32| Shape::Rect {
        x: eye_x - m.eye_width / 2.0,
        y: eye_y - eye_height / 2.0,
        w: m.eye_width,
        h: eye_height,
    };
    [make(m.left_eye_x()), make(m.right_eye_x())]
}

/// Eyebrow pair; `inner_down` tilts the inner ends downwards (angry), the
/// opposite tilt reads as fear.
fn eyebrows(m: &FaceMetrics, eye_height: f32, inner_down: bool) -> [Shape; 2] {
    let offset_y = m.eye_y - eye_height * 0.8;
    let length = m.eye_width * 1.2;
    let tilt = m.height * 0.08;
    let sign = if inner_down { 1.0 } else { -1.0 };

    let left = Shape::Line {
        x1: m.left_eye_x() - length / 2.0,
        y1: offset_y - sign * tilt / 2.0,
        x2: m.left_eye_x() + length / 2.0,
        y2: offset_y + sign * tilt / 2.0,
        width: m.line_width,
    };
    let right = Shape::Line {
        x1: m.right_eye_x() - length / 2.0,
        y1: offset_y + sign * tilt / 2.0,
        x2: m.right_eye_x() + length / 2.0,
        y2: offset_y - sign * tilt / 2.0,
        width: m.line_width,
    };
    [left, right]
}

/// The static face shown during snapshot presentation.
pub fn static_face(emotion: EmotionLabel, width: f32, height: f32) -> FaceFrame {
    if width <= 0.0 || height <= 0.0 {
        return FaceFrame::default();
    }

    let m = FaceMetrics::for_surface(width, height);
    let mut shapes = Vec::new();

    let eye_height = match emotion {
        EmotionLabel::Surprise => m.eye_height * 1.2,
        _ => m.eye_height,
    };
    shapes.extend(eye_rects(&m, eye_height, m.eye_y));

    match emotion {
        EmotionLabel::Angry => shapes.extend(eyebrows(&m, eye_height, true)),
        EmotionLabel::Fear => shapes.extend(eyebrows(&m, eye_height, false)),
        _ => {}
    }

    match emotion {
        EmotionLabel::Happy => shapes.push(Shape::Arc {
            cx: m.center_x,
            cy: m.mouth_center_y,
            rx: m.mouth_rx,
            ry: m.mouth_ry,
            start: 0.0,
            end: std::f32::consts::PI,
            style: PaintStyle::Stroke {
                width: m.line_width,
            },
        }),
        EmotionLabel::Sad => shapes.push(Shape::Arc {
            cx: m.center_x,
            cy: m.mouth_center_y,
            rx: m.mouth_rx,
            ry: m.mouth_ry,
            start: std::f32::consts::PI,
            end: 2.0 * std::f32::consts::PI,
            style: PaintStyle::Stroke {
                width: m.line_width,
            },
        }),
        EmotionLabel::Surprise | EmotionLabel::Fear => shapes.push(Shape::Arc {
            cx: m.center_x,
            cy: m.mouth_center_y,
            rx: m.mouth_rx,
            ry: m.mouth_ry * 1.2,
            start: 0.0,
            end: 2.0 * std::f32::consts::PI,
            style: PaintStyle::Fill,
        }),
        EmotionLabel::Disgust => {
            let mouth_y = m.mouth_center_y + m.mouth_ry * 0.5;
            let wave = m.mouth_ry;
            shapes.push(Shape::Curve {
                x1: m.center_x - m.mouth_rx,
                y1: mouth_y,
                cx: m.center_x - m.mouth_rx / 2.0,
                cy: mouth_y - wave,
                x2: m.center_x,
                y2: mouth_y,
                width: m.line_width,
            });
            shapes.push(Shape::Curve {
                x1: m.center_x,
                y1: mouth_y,
                cx: m.center_x + m.mouth_rx / 2.0,
                cy: mouth_y + wave,
                x2: m.center_x + m.mouth_rx,
                y2: mouth_y,
                width: m.line_width,
            });
        }
        // Angry, Neutral and everything else: a flat line
        _ => shapes.push(Shape::Line {
            x1: m.center_x - m.mouth_rx,
            y1: m.mouth_center_y,
            x2: m.center_x + m.mouth_rx,
            y2: m.mouth_center_y,
            width: m.line_width,
        }),
    }

    FaceFrame {
        width,
        height,
        shapes,
    }
}

/// The talking/idle face.
///
/// The whole face floats vertically with a slow sine of `t` (seconds); louder
/// amplitude narrows the eyes and opens the mouth.
pub fn talking_face(amplitude: f32, t: f32, width: f32, height: f32) -> FaceFrame {
    if width <= 0.0 || height <= 0.0 {
        return FaceFrame::default();
    }

    let amplitude = amplitude.clamp(0.0, 1.0);
    let m = FaceMetrics::for_surface(width, height);
    let float_offset = height * 0.01 * (t * 0.8).sin();

    let eye_height =
        (m.eye_height - amplitude * m.eye_height * 0.6).max(m.eye_height * 0.4);
    let eye_y = m.eye_y + float_offset;

    let mouth_ry = m.mouth_ry * 0.1 + amplitude * m.mouth_ry * 1.5;
    let mouth_rx = m.mouth_rx + amplitude * m.mouth_rx * 0.2;

    let mut shapes = Vec::with_capacity(3);
    shapes.extend(eye_rects(&m, eye_height, eye_y));
    shapes.push(Shape::Arc {
        cx: m.center_x,
        cy: m.mouth_center_y + float_offset,
        rx: mouth_rx,
        ry: mouth_ry,
        start: 0.0,
        end: 2.0 * std::f32::consts::PI,
        style: PaintStyle::Fill,
    });

    FaceFrame {
        width,
        height,
        shapes,
    }
}
