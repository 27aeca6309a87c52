use schemgen_netlist::geometry::Rect;
use schemgen_netlist::PartInstance;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO sheet sizes, landscape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Paper {
    A4,
    A3,
    A2,
    A1,
    A0,
}

impl Paper {
    pub const ALL: [Paper; 5] = [Paper::A4, Paper::A3, Paper::A2, Paper::A1, Paper::A0];

    /// Width and height in millimetres.
    pub fn size(self) -> (f64, f64) {
        match self {
            Paper::A4 => (297.0, 210.0),
            Paper::A3 => (420.0, 297.0),
            Paper::A2 => (594.0, 420.0),
            Paper::A1 => (841.0, 594.0),
            Paper::A0 => (1189.0, 841.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Paper::A4 => "A4",
            Paper::A3 => "A3",
            Paper::A2 => "A2",
            Paper::A1 => "A1",
            Paper::A0 => "A0",
        }
    }

    /// Smallest sheet that holds `width` x `height`. Oversized drawings get A0.
    pub fn fitting(width: f64, height: f64) -> Paper {
        Paper::ALL
            .into_iter()
            .find(|p| {
                let (w, h) = p.size();
                width <= w && height <= h
            })
            .unwrap_or_else(|| {
                log::warn!("drawing is {width:.1} x {height:.1} mm, larger than A0");
                Paper::A0
            })
    }
}

impl fmt::Display for Paper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Paper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Paper::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown paper size `{s}`, expected A4, A3, A2, A1 or A0"))
    }
}

/// Placed parts, ready for routing and export.
#[derive(Debug, Clone)]
pub struct Layout {
    pub instances: Vec<PartInstance>,
    /// Union of every part's keep-out area, labels included.
    pub extents: Rect,
    pub paper: Paper,
    pub iterations: usize,
    pub converged: bool,
}

impl Layout {
    pub fn instance(&self, designator: &str) -> Option<&PartInstance> {
        self.instances.iter().find(|i| i.designator == designator)
    }
}
