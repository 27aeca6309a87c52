//! Sidecar files that turn a lone schematic into a KiCad project:
//! `sym-lib-table`, `fp-lib-table` and a minimal `.kicad_pro`.
//!
//! Library URIs are written relative to `${KIPRJMOD}` whenever the library
//! lives below the project directory, so the project can be moved.

use crate::ExportError;
use schemgen_engine::Layout;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Paths of the files written by [`write_sidecars`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFiles {
    pub project: PathBuf,
    pub sym_lib_table: PathBuf,
    pub fp_lib_table: Option<PathBuf>,
}

/// Split a footprint reference into the `Lib:Name` form KiCad expects and,
/// for footprints given as `.kicad_mod` file paths, the library that has to
/// be registered for it.
///
/// `Resistor_SMD:R_0603` is returned unchanged. `fp/Parts.pretty/SOT23.kicad_mod`
/// becomes `Parts:SOT23` with library `Parts` at `fp/Parts.pretty`.
pub fn format_footprint(fp: &str) -> (String, Option<(String, PathBuf)>) {
    if is_lib_footprint(fp) {
        return (fp.to_owned(), None);
    }
    let path = Path::new(fp);
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return (fp.to_owned(), None);
    };
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let lib_name = dir
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty() && s != ".")
        .unwrap_or_else(|| stem.clone());
    (format!("{lib_name}:{stem}"), Some((lib_name, dir)))
}

/// A `lib:footprint` reference rather than a file path. Single-letter
/// prefixes are Windows drives.
fn is_lib_footprint(s: &str) -> bool {
    let Some((lib, fp)) = s.split_once(':') else {
        return false;
    };
    if lib.len() == 1 && lib.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    let has_sep = |p: &str| p.contains('/') || p.contains('\\');
    !lib.is_empty() && !fp.is_empty() && !fp.contains(':') && !has_sep(lib) && !has_sep(fp)
}

/// Footprint libraries referenced by file path from the placed parts.
pub fn footprint_libraries(layout: &Layout) -> BTreeMap<String, PathBuf> {
    let mut libs = BTreeMap::new();
    for inst in &layout.instances {
        if let Some((_, Some((name, dir)))) = inst.footprint.as_deref().map(format_footprint) {
            libs.entry(name).or_insert(dir);
        }
    }
    libs
}

pub fn serialize_sym_lib_table(project_dir: &Path, libs: &BTreeMap<String, PathBuf>) -> String {
    serialize_lib_table("sym_lib_table", project_dir, libs)
}

pub fn serialize_fp_lib_table(project_dir: &Path, libs: &BTreeMap<String, PathBuf>) -> String {
    serialize_lib_table("fp_lib_table", project_dir, libs)
}

fn serialize_lib_table(
    kind: &str,
    project_dir: &Path,
    libs: &BTreeMap<String, PathBuf>,
) -> String {
    let mut table = format!("({kind}\n  (version 7)\n");
    for (name, path) in libs {
        table.push_str(&format!(
            "  (lib (name \"{}\")(type \"KiCad\")(uri \"{}\")(options \"\")(descr \"\"))\n",
            escape(name),
            escape(&library_uri(project_dir, path)),
        ));
    }
    table.push_str(")\n");
    table
}

fn library_uri(project_dir: &Path, path: &Path) -> String {
    let absolute = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(p)
        }
    };
    let (base, target) = (absolute(project_dir), absolute(path));
    let uri = match pathdiff::diff_paths(&target, &base) {
        Some(rel) if !rel.starts_with("..") => {
            let rel = rel.display().to_string();
            if rel.is_empty() {
                "${KIPRJMOD}".to_string()
            } else {
                format!("${{KIPRJMOD}}/{rel}")
            }
        }
        _ => target.display().to_string(),
    };
    uri.replace('\\', "/")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Minimal project file; KiCad fills in the rest on first save.
pub fn project_json(project: &str) -> Result<String, ExportError> {
    let value = serde_json::json!({
        "meta": {
            "filename": format!("{project}.kicad_pro"),
            "version": 1
        },
        "libraries": {
            "pinned_footprint_libs": [],
            "pinned_symbol_libs": []
        },
        "schematic": {
            "legacy_lib_dir": "",
            "legacy_lib_list": []
        },
        "sheets": [["", ""]],
        "boards": []
    });
    Ok(serde_json::to_string_pretty(&value)? + "\n")
}

/// Write `{project}.kicad_pro`, `sym-lib-table` and, when any footprint is
/// given by path, `fp-lib-table` into `project_dir`.
pub fn write_sidecars(
    project_dir: &Path,
    project: &str,
    symbol_libraries: &BTreeMap<String, PathBuf>,
    layout: &Layout,
) -> Result<ProjectFiles, ExportError> {
    let write = |path: PathBuf, contents: String| -> Result<PathBuf, ExportError> {
        std::fs::write(&path, contents).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        log::debug!("wrote {}", path.display());
        Ok(path)
    };

    std::fs::create_dir_all(project_dir).map_err(|source| ExportError::Io {
        path: project_dir.to_path_buf(),
        source,
    })?;

    let project_file = write(
        project_dir.join(format!("{project}.kicad_pro")),
        project_json(project)?,
    )?;
    let sym_lib_table = write(
        project_dir.join("sym-lib-table"),
        serialize_sym_lib_table(project_dir, symbol_libraries),
    )?;
    let footprints = footprint_libraries(layout);
    let fp_lib_table = if footprints.is_empty() {
        None
    } else {
        Some(write(
            project_dir.join("fp-lib-table"),
            serialize_fp_lib_table(project_dir, &footprints),
        )?)
    };

    Ok(ProjectFiles {
        project: project_file,
        sym_lib_table,
        fp_lib_table,
    })
}
