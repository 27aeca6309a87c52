pub mod catalog;
pub mod kicad;

pub use catalog::{SymbolCatalog, SymbolRef};
pub use kicad::symbol_library::KicadSymbolLibrary;

use schemgen_sexpr::{ParseError, Sexpr};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Errors raised while reading symbol libraries or looking symbols up.
#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol `{0}` not found in any loaded library")]
    SymbolNotFound(String),
    #[error("malformed symbol `{symbol}`: {reason}")]
    MalformedSymbol { symbol: String, reason: String },
    #[error("invalid symbol library: {0}")]
    Parse(#[from] ParseError),
    #[error("not a symbol library: expected `kicad_symbol_lib`, found `{0}`")]
    NotALibrary(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A library symbol with its pin geometry in symbol-local, Y-up coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub name: String,
    pub in_bom: bool,
    pub on_board: bool,
    pub properties: BTreeMap<String, String>,
    pub pins: Vec<Pin>,
    /// Extent of the body graphics and pins.
    pub bounds: LocalBounds,
    /// Flattened definition, ready to embed in a schematic's `lib_symbols`.
    #[serde(skip)]
    pub raw_sexp: Option<Sexpr>,
}

impl Symbol {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Designator prefix from the `Reference` property (`U`, `R`, ...).
    pub fn reference_prefix(&self) -> Option<&str> {
        self.property("Reference")
            .map(|r| r.trim_end_matches(|c: char| c.is_ascii_digit() || c == '?'))
            .filter(|r| !r.is_empty())
    }

    pub fn pin(&self, number: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.number == number)
    }

    /// Every pin carrying `name`. Parts often repeat names such as `GND`.
    pub fn pins_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Pin> + 'a {
        self.pins.iter().filter(move |p| p.name == name)
    }
}

/// A symbol pin. `x`/`y` is the connection point in symbol-local space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub number: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub rotation: PinRotation,
    pub length: f64,
    pub electrical_type: ElectricalType,
    pub hidden: bool,
    /// Unit the pin belongs to; 0 means common to all units.
    pub unit: u32,
}

/// Cardinal pin orientation as stored in KiCad libraries.
///
/// The angle is the direction from the connection point toward the body, so
/// an `R0` pin sits on the left edge of the symbol and its free end faces
/// left. [`PinRotation::outward`] gives the direction away from the body in
/// schematic (Y-down) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PinRotation {
    #[serde(rename = "0")]
    R0,
    #[serde(rename = "90")]
    R90,
    #[serde(rename = "180")]
    R180,
    #[serde(rename = "270")]
    R270,
}

impl PinRotation {
    pub const ALL: [PinRotation; 4] = [
        PinRotation::R0,
        PinRotation::R90,
        PinRotation::R180,
        PinRotation::R270,
    ];

    /// Accepts exactly 0, 90, 180 or 270.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        if degrees.fract() != 0.0 {
            return None;
        }
        match degrees as i64 {
            0 => Some(PinRotation::R0),
            90 => Some(PinRotation::R90),
            180 => Some(PinRotation::R180),
            270 => Some(PinRotation::R270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            PinRotation::R0 => 0,
            PinRotation::R90 => 90,
            PinRotation::R180 => 180,
            PinRotation::R270 => 270,
        }
    }

    fn quarter_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    fn from_quarter_turns(turns: u8) -> Self {
        match turns % 4 {
            0 => PinRotation::R0,
            1 => PinRotation::R90,
            2 => PinRotation::R180,
            _ => PinRotation::R270,
        }
    }

    /// Rotate counter-clockwise (as seen on screen) by `turns` quarter turns.
    pub fn rotated(self, turns: u8) -> Self {
        Self::from_quarter_turns(self.quarter_turns() + turns % 4)
    }

    /// Mirror left/right: 0 and 180 swap.
    pub fn mirrored_x(self) -> Self {
        match self {
            PinRotation::R0 => PinRotation::R180,
            PinRotation::R180 => PinRotation::R0,
            other => other,
        }
    }

    /// Mirror top/bottom: 90 and 270 swap.
    pub fn mirrored_y(self) -> Self {
        match self {
            PinRotation::R90 => PinRotation::R270,
            PinRotation::R270 => PinRotation::R90,
            other => other,
        }
    }

    /// Unit vector pointing away from the body, in schematic space (Y-down).
    pub fn outward(self) -> (f64, f64) {
        match self {
            PinRotation::R0 => (-1.0, 0.0),
            PinRotation::R180 => (1.0, 0.0),
            PinRotation::R90 => (0.0, 1.0),
            PinRotation::R270 => (0.0, -1.0),
        }
    }

    /// Unit vector from the connection point toward the body, symbol-local
    /// space (Y-up).
    pub fn local_direction(self) -> (f64, f64) {
        match self {
            PinRotation::R0 => (1.0, 0.0),
            PinRotation::R90 => (0.0, 1.0),
            PinRotation::R180 => (-1.0, 0.0),
            PinRotation::R270 => (0.0, -1.0),
        }
    }
}

impl fmt::Display for PinRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectricalType {
    Input,
    Output,
    Bidirectional,
    TriState,
    Passive,
    Free,
    Unspecified,
    PowerIn,
    PowerOut,
    OpenCollector,
    OpenEmitter,
    NoConnect,
}

impl ElectricalType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElectricalType::Input => "input",
            ElectricalType::Output => "output",
            ElectricalType::Bidirectional => "bidirectional",
            ElectricalType::TriState => "tri_state",
            ElectricalType::Passive => "passive",
            ElectricalType::Free => "free",
            ElectricalType::Unspecified => "unspecified",
            ElectricalType::PowerIn => "power_in",
            ElectricalType::PowerOut => "power_out",
            ElectricalType::OpenCollector => "open_collector",
            ElectricalType::OpenEmitter => "open_emitter",
            ElectricalType::NoConnect => "no_connect",
        }
    }
}

impl FromStr for ElectricalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "input" => ElectricalType::Input,
            "output" => ElectricalType::Output,
            "bidirectional" => ElectricalType::Bidirectional,
            "tri_state" => ElectricalType::TriState,
            "passive" => ElectricalType::Passive,
            "free" => ElectricalType::Free,
            "unspecified" => ElectricalType::Unspecified,
            "power_in" => ElectricalType::PowerIn,
            "power_out" => ElectricalType::PowerOut,
            "open_collector" => ElectricalType::OpenCollector,
            "open_emitter" => ElectricalType::OpenEmitter,
            "no_connect" => ElectricalType::NoConnect,
            other => return Err(format!("unknown electrical type `{other}`")),
        })
    }
}

impl fmt::Display for ElectricalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned extent in symbol-local coordinates (Y-up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl LocalBounds {
    pub fn empty() -> Self {
        LocalBounds {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    /// Empty bounds collapse to the origin so placement always has a box.
    pub fn or_origin(self) -> Self {
        if self.is_empty() {
            LocalBounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            }
        } else {
            self
        }
    }
}

impl Default for LocalBounds {
    fn default() -> Self {
        LocalBounds::empty()
    }
}
