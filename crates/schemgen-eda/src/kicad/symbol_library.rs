use crate::{Symbol, SymbolError};
use schemgen_sexpr::{parse, Sexpr};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::symbol::parse_symbol;

/// Every symbol of one `.kicad_sym` document.
///
/// A symbol whose geometry cannot be read does not poison the library: its
/// failure is kept and reported when that symbol is asked for.
#[derive(Debug, Clone, Default)]
pub struct KicadSymbolLibrary {
    symbols: Vec<Symbol>,
    malformed: BTreeMap<String, String>,
}

impl KicadSymbolLibrary {
    pub fn from_string(content: &str) -> Result<Self, SymbolError> {
        let root = parse(content)?;
        match root.tag() {
            Some("kicad_symbol_lib") => {}
            other => return Err(SymbolError::NotALibrary(other.unwrap_or("").to_string())),
        }

        let raw: Vec<(String, &Sexpr)> = root
            .find_all("symbol")
            .filter_map(|s| Some((s.atom_at(1)?.to_string(), s)))
            .collect();
        let by_name: HashMap<&str, &Sexpr> =
            raw.iter().map(|(name, s)| (name.as_str(), *s)).collect();

        let mut library = KicadSymbolLibrary::default();
        for (name, sexp) in &raw {
            let parsed = flatten(sexp, &by_name).and_then(|flat| parse_symbol(&flat));
            match parsed {
                Ok(symbol) => library.symbols.push(symbol),
                Err(reason) => {
                    log::warn!("symbol {name} is malformed: {reason}");
                    library.malformed.insert(name.clone(), reason);
                }
            }
        }
        log::debug!(
            "read symbol library with {} symbols ({} malformed)",
            library.symbols.len(),
            library.malformed.len()
        );
        Ok(library)
    }

    pub fn from_file(path: &Path) -> Result<Self, SymbolError> {
        let content = fs::read_to_string(path).map_err(|source| SymbolError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_string(&content)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbol_names(&self) -> Vec<&str> {
        self.symbols.iter().map(|s| s.name.as_str()).collect()
    }

    /// Symbols that failed to parse, with the reason.
    pub fn malformed(&self) -> &BTreeMap<String, String> {
        &self.malformed
    }

    pub fn get_symbol(&self, name: &str) -> Result<&Symbol, SymbolError> {
        if let Some(reason) = self.malformed.get(name) {
            return Err(SymbolError::MalformedSymbol {
                symbol: name.to_string(),
                reason: reason.clone(),
            });
        }
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SymbolError::SymbolNotFound(name.to_string()))
    }

    pub(crate) fn into_parts(self) -> (Vec<Symbol>, BTreeMap<String, String>) {
        (self.symbols, self.malformed)
    }
}

/// Resolve the `extends` chain of a symbol into one self-contained definition.
fn flatten(sexp: &Sexpr, by_name: &HashMap<&str, &Sexpr>) -> Result<Sexpr, String> {
    let mut chain = vec![sexp];
    let mut current = sexp;
    while let Some(parent) = current.find("extends").and_then(|e| e.atom_at(1)) {
        let parent_sexp = *by_name
            .get(parent)
            .ok_or_else(|| format!("extends unknown symbol `{parent}`"))?;
        if chain.iter().any(|s| std::ptr::eq(*s, parent_sexp)) {
            return Err(format!("circular extends through `{parent}`"));
        }
        chain.push(parent_sexp);
        current = parent_sexp;
    }

    let mut merged = chain.pop().unwrap_or(sexp).clone();
    while let Some(child) = chain.pop() {
        merged = merge_symbol(&merged, child);
    }
    Ok(merged)
}

/// Overlay `child` on a flattened `parent`: child properties replace parent
/// properties of the same key, and the parent's unit sections are renamed
/// after the child unless the child draws its own.
fn merge_symbol(parent: &Sexpr, child: &Sexpr) -> Sexpr {
    let parent_name = parent.atom_at(1).unwrap_or_default();
    let child_name = child.atom_at(1).unwrap_or_default();
    let child_items = child.as_list().unwrap_or(&[]);

    let child_property = |key: &str| {
        child
            .find_all("property")
            .find(|p| p.atom_at(1) == Some(key))
    };
    let child_has_units = child.find("symbol").is_some();

    let mut items = vec![Sexpr::symbol("symbol"), Sexpr::string(child_name)];
    for item in parent.as_list().unwrap_or(&[]).iter().skip(2) {
        match item.tag() {
            Some("property") => {
                let key = item.atom_at(1).unwrap_or_default();
                items.push(child_property(key).unwrap_or(item).clone());
            }
            Some("symbol") => {
                if !child_has_units {
                    let mut unit = item.clone();
                    if let Some(Sexpr::String(unit_name) | Sexpr::Symbol(unit_name)) =
                        unit.as_list_mut().and_then(|l| l.get_mut(1))
                    {
                        if let Some(suffix) = unit_name.strip_prefix(parent_name) {
                            *unit_name = format!("{child_name}{suffix}");
                        }
                    }
                    items.push(unit);
                }
            }
            Some(tag) => {
                let overridden = child_items.iter().skip(2).any(|c| c.tag() == Some(tag));
                if !overridden {
                    items.push(item.clone());
                }
            }
            None => {}
        }
    }

    for item in child_items.iter().skip(2) {
        match item.tag() {
            Some("extends") => {}
            Some("property") => {
                let key = item.atom_at(1).unwrap_or_default();
                let in_parent = parent
                    .find_all("property")
                    .any(|p| p.atom_at(1) == Some(key));
                if !in_parent {
                    items.push(item.clone());
                }
            }
            Some(_) => items.push(item.clone()),
            None => {}
        }
    }
    Sexpr::List(items)
}
