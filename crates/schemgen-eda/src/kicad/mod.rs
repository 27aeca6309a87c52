//! KiCad `.kicad_sym` reading.

pub mod symbol;
pub mod symbol_library;
