//! Net label placement.
//!
//! A pin's rotation tells which edge of the body it sits on, and the label
//! goes on the far side of the pin, facing away from the body:
//!
//! | pin rotation | edge   | anchor offset | text rotation | justify |
//! |--------------|--------|---------------|---------------|---------|
//! | 0            | left   | (-2, 0)       | 180           | right   |
//! | 180          | right  | (+2, 0)       | 0             | left    |
//! | 90           | bottom | (0, +2)       | 270           | right   |
//! | 270          | top    | (0, -2)       | 270           | left    |
//!
//! Offsets are in sheet space, where Y grows downward.

use schemgen_eda::PinRotation;
use schemgen_netlist::geometry::{Point, Rect};
use schemgen_netlist::PinRef;
use serde::Serialize;

/// Distance from a pin's connection point to its label anchor.
pub const LABEL_OFFSET: f64 = 2.0;

/// Rough advance of one glyph in the default 1.27 mm font.
const CHAR_WIDTH: f64 = 1.1;
const TEXT_HEIGHT: f64 = 1.27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Justify {
    Left,
    Right,
}

impl Justify {
    pub fn as_str(self) -> &'static str {
        match self {
            Justify::Left => "left",
            Justify::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    pub offset: (f64, f64),
    pub rotation: u16,
    pub justify: Justify,
}

pub fn label_placement(pin_rotation: PinRotation) -> LabelPlacement {
    let (offset, rotation, justify) = match pin_rotation {
        PinRotation::R0 => ((-LABEL_OFFSET, 0.0), 180, Justify::Right),
        PinRotation::R180 => ((LABEL_OFFSET, 0.0), 0, Justify::Left),
        PinRotation::R90 => ((0.0, LABEL_OFFSET), 270, Justify::Right),
        PinRotation::R270 => ((0.0, -LABEL_OFFSET), 270, Justify::Left),
    };
    LabelPlacement {
        offset,
        rotation,
        justify,
    }
}

/// A label attached to exactly one pin of one placed part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetLabel {
    pub text: String,
    pub pin: PinRef,
    pub pin_position: Point,
    pub pin_rotation: PinRotation,
    pub position: Point,
    pub rotation: u16,
    pub justify: Justify,
}

impl NetLabel {
    /// `pin_rotation` is the pin's orientation on the sheet, after the
    /// instance transform.
    pub fn at_pin(
        text: impl Into<String>,
        pin: PinRef,
        pin_position: Point,
        pin_rotation: PinRotation,
    ) -> Self {
        let placement = label_placement(pin_rotation);
        NetLabel {
            text: text.into(),
            pin,
            pin_position,
            pin_rotation,
            position: pin_position.offset(placement.offset.0, placement.offset.1),
            rotation: placement.rotation,
            justify: placement.justify,
        }
    }

    /// Approximate sheet area from the pin to the end of the text.
    pub fn extent(&self) -> Rect {
        let (dx, dy) = self.pin_rotation.outward();
        let reach = LABEL_OFFSET + text_width(&self.text);
        let far = self.pin_position.offset(dx * reach, dy * reach);
        Rect::from_corners(self.pin_position, far).inflate(TEXT_HEIGHT / 2.0)
    }
}

/// Estimated rendered length of `text`, with a little padding.
pub fn text_width(text: &str) -> f64 {
    text.chars().count() as f64 * CHAR_WIDTH + 1.0
}
