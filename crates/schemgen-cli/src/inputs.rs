//! Reading design files and symbol libraries from disk.

use anyhow::{bail, Context, Result};
use clap::Args;
use schemgen_eda::{KicadSymbolLibrary, SymbolCatalog};
use schemgen_netlist::Design;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Arguments shared by every command that resolves a design.
#[derive(Args, Debug, Clone)]
pub struct DesignArgs {
    /// Design file (.json, .yaml or .yml)
    #[arg(value_name = "DESIGN", value_hint = clap::ValueHint::FilePath)]
    pub design: PathBuf,

    /// Symbol library to load, as PATH or NAME=PATH. Repeatable; the file
    /// stem names the library unless NAME is given.
    #[arg(short = 'l', long = "library", value_name = "LIB.kicad_sym", required = true)]
    pub libraries: Vec<String>,
}

impl DesignArgs {
    pub fn load(&self) -> Result<(Design, Libraries)> {
        let design = load_design(&self.design)?;
        let libraries = Libraries::load(&self.libraries)?;
        Ok((design, libraries))
    }
}

/// Loaded libraries and where each came from.
pub struct Libraries {
    pub catalog: SymbolCatalog,
    pub paths: BTreeMap<String, PathBuf>,
}

impl Libraries {
    pub fn load(args: &[String]) -> Result<Self> {
        let mut catalog = SymbolCatalog::new();
        let mut paths = BTreeMap::new();
        for arg in args {
            let (name, path) = parse_library_arg(arg)?;
            let library = KicadSymbolLibrary::from_file(&path)
                .with_context(|| format!("Failed to load symbol library {}", path.display()))?;
            if paths.insert(name.clone(), path).is_some() {
                bail!("library name `{name}` is used twice");
            }
            catalog = catalog.with_library(&name, library);
        }
        log::info!("loaded {} symbols from {} libraries", catalog.len(), paths.len());
        Ok(Self { catalog, paths })
    }
}

fn parse_library_arg(arg: &str) -> Result<(String, PathBuf)> {
    if let Some((name, path)) = arg.split_once('=') {
        if name.is_empty() || name.contains(':') {
            bail!("invalid library name in `{arg}`");
        }
        return Ok((name.to_string(), PathBuf::from(path)));
    }
    let path = PathBuf::from(arg);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .with_context(|| format!("cannot name library `{arg}`, use NAME=PATH"))?;
    Ok((name, path))
}

/// Parse a design as JSON or YAML according to its extension.
pub fn load_design(path: &Path) -> Result<Design> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read design {}", path.display()))?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let design = match extension.as_str() {
        "json" => serde_json::from_str(&text).map_err(anyhow::Error::from),
        "yaml" | "yml" => serde_yaml::from_str(&text).map_err(anyhow::Error::from),
        other => bail!(
            "unsupported design format `.{other}` for {}, expected .json, .yaml or .yml",
            path.display()
        ),
    };
    design.with_context(|| format!("Invalid design {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_names_come_from_stems_or_prefixes() {
        let (name, path) = parse_library_arg("libs/Demo.kicad_sym").unwrap();
        assert_eq!(name, "Demo");
        assert_eq!(path, PathBuf::from("libs/Demo.kicad_sym"));

        let (name, _) = parse_library_arg("Parts=libs/jlc.kicad_sym").unwrap();
        assert_eq!(name, "Parts");
        assert!(parse_library_arg("a:b=x.kicad_sym").is_err());
    }

    #[test]
    fn designs_load_by_extension() {
        let dir = assert_fs::TempDir::new().unwrap();
        let json = dir.path().join("d.json");
        std::fs::write(&json, r#"{"parts": [{"id": "r", "symbol": "R"}]}"#).unwrap();
        assert_eq!(load_design(&json).unwrap().parts[0].id, "r");

        let yaml = dir.path().join("d.YML");
        std::fs::write(&yaml, "parts: [{id: c, symbol: C}]\n").unwrap();
        assert_eq!(load_design(&yaml).unwrap().parts[0].id, "c");

        let txt = dir.path().join("d.txt");
        std::fs::write(&txt, "").unwrap();
        assert!(format!("{:#}", load_design(&txt).unwrap_err()).contains("unsupported"));
    }
}
