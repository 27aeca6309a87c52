//! `schemgen.toml`: placement, routing and output settings.
//!
//! ```toml
//! [placement]
//! clearance = 7.62
//!
//! [routing]
//! fanout_limit = 4
//!
//! [output]
//! symbols = "reference"
//! library = "Parts"
//! labels = "global"
//! max_label_length = 10
//! ```
//!
//! Every key is optional. Unknown keys are errors.

use anyhow::{bail, Context, Result};
use schemgen_engine::{Paper, PlacerConfig, RouterConfig};
use schemgen_kicad_exporter::{LabelStyle, SymbolMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "schemgen.toml";

/// Room for one character plus a two digit counter.
const MIN_LABEL_LENGTH: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub placement: PlacerConfig,
    pub routing: RouterConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolSource {
    #[default]
    Embed,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub symbols: SymbolSource,
    /// Library name instances point at when `symbols = "reference"`.
    pub library: Option<String>,
    pub labels: LabelStyle,
    /// Fixed paper size instead of the smallest that fits.
    pub paper: Option<Paper>,
    pub annotate_fallbacks: bool,
    /// Write `sym-lib-table`, `fp-lib-table` and the `.kicad_pro` file.
    pub sidecars: bool,
    /// Add a PWR_FLAG to every power net.
    pub power_flags: bool,
    /// Longest label text; longer net names are shortened on the sheet.
    pub max_label_length: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            symbols: SymbolSource::Embed,
            library: None,
            labels: LabelStyle::Local,
            paper: None,
            annotate_fallbacks: true,
            sidecars: true,
            power_flags: true,
            max_label_length: None,
        }
    }
}

impl OutputConfig {
    pub fn symbol_mode(&self) -> Result<SymbolMode> {
        match (self.symbols, &self.library) {
            (SymbolSource::Embed, _) => Ok(SymbolMode::Embed),
            (SymbolSource::Reference, Some(library)) => Ok(SymbolMode::Reference {
                library: library.clone(),
            }),
            (SymbolSource::Reference, None) => {
                bail!("[output] symbols = \"reference\" needs a `library` name")
            }
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        if let Some(max) = config.output.max_label_length {
            if max < MIN_LABEL_LENGTH {
                bail!("[output] max_label_length must be at least {MIN_LABEL_LENGTH}, got {max}");
            }
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// The explicit config, else `schemgen.toml` beside the design, else
    /// defaults.
    pub fn discover(design: &Path, explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let beside = design
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CONFIG_FILE);
        if beside.is_file() {
            log::debug!("using config {}", beside.display());
            return Ok((Self::load(&beside)?, Some(beside)));
        }
        Ok((Self::default(), None))
    }
}
