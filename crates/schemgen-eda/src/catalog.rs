//! Immutable lookup of library symbols by `Library:Name` id.

use crate::kicad::symbol_library::KicadSymbolLibrary;
use crate::{Symbol, SymbolError};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

/// A resolved catalog entry: the id the schematic will reference plus the
/// shared symbol.
#[derive(Debug, Clone)]
pub struct SymbolRef {
    pub lib_id: String,
    pub symbol: Arc<Symbol>,
}

impl Deref for SymbolRef {
    type Target = Symbol;

    fn deref(&self) -> &Symbol {
        &self.symbol
    }
}

/// Symbols from one or more libraries, keyed by `Library:Name`.
///
/// The catalog never changes once built; adding a library produces a new
/// catalog that shares the already loaded symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolCatalog {
    symbols: BTreeMap<String, Arc<Symbol>>,
    malformed: BTreeMap<String, String>,
}

impl SymbolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding everything already present plus `library` under
    /// `library_name`. Later libraries shadow earlier ids.
    pub fn with_library(mut self, library_name: &str, library: KicadSymbolLibrary) -> Self {
        let (symbols, malformed) = library.into_parts();
        for symbol in symbols {
            let id = format!("{library_name}:{}", symbol.name);
            self.malformed.remove(&id);
            self.symbols.insert(id, Arc::new(symbol));
        }
        for (name, reason) in malformed {
            let id = format!("{library_name}:{name}");
            self.symbols.remove(&id);
            self.malformed.insert(id, reason);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Symbol>)> {
        self.symbols.iter().map(|(id, s)| (id.as_str(), s))
    }

    /// Look a symbol up by `Library:Name`, or by bare `Name` when exactly one
    /// library provides it.
    pub fn get(&self, id: &str) -> Result<SymbolRef, SymbolError> {
        if id.contains(':') {
            return self.lookup(id);
        }

        let suffix = format!(":{id}");
        let mut candidates = self
            .symbols
            .keys()
            .chain(self.malformed.keys())
            .filter(|key| key.ends_with(&suffix))
            .collect::<Vec<_>>();
        candidates.sort();
        candidates.dedup();
        match candidates.as_slice() {
            [] => Err(SymbolError::SymbolNotFound(id.to_string())),
            [only] => self.lookup(only),
            [first, ..] => {
                log::warn!(
                    "symbol {id} exists in {} libraries, using {first}",
                    candidates.len()
                );
                self.lookup(first)
            }
        }
    }

    /// First symbol (in id order) whose property `key` equals `value`, e.g.
    /// an `LCSC` part number.
    pub fn find_by_property(&self, key: &str, value: &str) -> Option<SymbolRef> {
        self.symbols
            .iter()
            .find(|(_, s)| s.property(key) == Some(value))
            .map(|(id, s)| SymbolRef {
                lib_id: id.clone(),
                symbol: Arc::clone(s),
            })
    }

    fn lookup(&self, id: &str) -> Result<SymbolRef, SymbolError> {
        if let Some(reason) = self.malformed.get(id) {
            return Err(SymbolError::MalformedSymbol {
                symbol: id.to_string(),
                reason: reason.clone(),
            });
        }
        self.symbols
            .get(id)
            .map(|s| SymbolRef {
                lib_id: id.to_string(),
                symbol: Arc::clone(s),
            })
            .ok_or_else(|| SymbolError::SymbolNotFound(id.to_string()))
    }
}
