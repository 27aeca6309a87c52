//! # schemgen-kicad-exporter
//!
//! Writes a placed and routed sheet as a KiCad 8 schematic, plus the
//! project sidecars (`sym-lib-table`, `fp-lib-table`, `.kicad_pro`).

pub mod kicad_schematic;
pub mod project;

pub use kicad_schematic::{
    power_nets, shorten_label_names, to_kicad_schematic, write_kicad_schematic, ExportOptions,
    LabelStyle, SymbolMode, POWER_FLAG_LIB_ID,
};
pub use project::{format_footprint, write_sidecars, ProjectFiles};

use std::path::PathBuf;
use thiserror::Error;

/// Error types for schematic export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("symbol `{0}` has no definition to embed")]
    MissingDefinition(String),

    #[error("invalid symbol library name `{0}`")]
    InvalidLibraryName(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize project file: {0}")]
    Json(#[from] serde_json::Error),
}
