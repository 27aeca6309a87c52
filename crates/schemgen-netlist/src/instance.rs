//! Part instances: one per physical component, each bound to a shared
//! catalog symbol and a designator.

use crate::design::{Design, PartCategory, PartRecord};
use crate::geometry::{to_schematic_space, Point, Rect, Transform};
use crate::ResolveError;
use schemgen_eda::{Pin, PinRotation, SymbolCatalog, SymbolRef};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct PartInstance {
    pub designator: String,
    /// Id of the design record this instance came from.
    pub part_id: String,
    pub symbol: SymbolRef,
    pub value: String,
    pub footprint: Option<String>,
    pub datasheet: Option<String>,
    /// Part-source (LCSC) number.
    pub part_source: Option<String>,
    pub category: PartCategory,
    pub belongs_to: Option<String>,
    pub transform: Transform,
}

impl PartInstance {
    pub fn position(&self) -> Point {
        self.transform.position
    }

    pub fn pin_position(&self, pin: &Pin) -> Point {
        to_schematic_space((pin.x, pin.y), &self.transform)
    }

    /// Pin orientation on the sheet, after instance rotation and mirroring.
    pub fn pin_rotation(&self, pin: &Pin) -> PinRotation {
        self.transform.apply_to_rotation(pin.rotation)
    }

    /// Sheet-space extent of the symbol body and pins.
    pub fn body_rect(&self) -> Rect {
        self.transform.apply_to_bounds(&self.symbol.bounds)
    }

    pub fn pins(&self) -> &[Pin] {
        &self.symbol.pins
    }
}

/// Resolve every record's symbol, assign designators and expand quantities.
///
/// Records with explicit designators keep them. The rest are numbered per
/// prefix in record order, skipping numbers that are already taken.
pub fn build_instances(
    design: &Design,
    catalog: &SymbolCatalog,
) -> Result<Vec<PartInstance>, ResolveError> {
    let mut ids = HashSet::new();
    for part in &design.parts {
        if !ids.insert(part.id.as_str()) {
            return Err(ResolveError::DuplicatePartId(part.id.clone()));
        }
    }

    let symbols = design
        .parts
        .iter()
        .map(|part| resolve_symbol(part, catalog))
        .collect::<Result<Vec<_>, _>>()?;

    let mut taken = HashSet::new();
    for designator in design.parts.iter().flat_map(|p| &p.designators) {
        if !taken.insert(designator.clone()) {
            return Err(ResolveError::DuplicateDesignator(designator.clone()));
        }
    }

    let mut counters: BTreeMap<String, u32> = BTreeMap::new();
    let mut instances = Vec::new();
    for (part, symbol) in design.parts.iter().zip(symbols) {
        let designators = if part.designators.is_empty() {
            let prefix = part
                .prefix
                .clone()
                .or_else(|| symbol.reference_prefix().map(str::to_string))
                .unwrap_or_else(|| "U".to_string());
            let counter = counters.entry(prefix.clone()).or_insert(0);
            let mut assigned = Vec::new();
            while assigned.len() < part.quantity as usize {
                *counter += 1;
                let candidate = format!("{prefix}{counter}");
                if taken.insert(candidate.clone()) {
                    assigned.push(candidate);
                }
            }
            assigned
        } else {
            if part.designators.len() != part.quantity as usize && part.quantity != 1 {
                log::warn!(
                    "part {} lists {} designators but quantity {}; using the designators",
                    part.id,
                    part.designators.len(),
                    part.quantity
                );
            }
            part.designators.clone()
        };

        for designator in designators {
            instances.push(instance_for(part, &symbol, designator));
        }
    }

    log::debug!(
        "built {} part instances from {} records",
        instances.len(),
        design.parts.len()
    );
    Ok(instances)
}

fn resolve_symbol(part: &PartRecord, catalog: &SymbolCatalog) -> Result<SymbolRef, ResolveError> {
    let wrap = |source| ResolveError::Symbol {
        part: part.id.clone(),
        source,
    };
    match (&part.symbol, &part.lcsc) {
        (Some(id), _) => catalog.get(id).map_err(wrap),
        (None, Some(lcsc)) => catalog
            .find_by_property("LCSC", lcsc)
            .or_else(|| catalog.find_by_property("LCSC Part", lcsc))
            .ok_or_else(|| wrap(schemgen_eda::SymbolError::SymbolNotFound(lcsc.clone()))),
        (None, None) => Err(ResolveError::MissingSymbolReference(part.id.clone())),
    }
}

fn instance_for(part: &PartRecord, symbol: &SymbolRef, designator: String) -> PartInstance {
    let property = |key: &str| {
        symbol
            .property(key)
            .filter(|v| !v.is_empty() && *v != "~")
            .map(str::to_string)
    };
    PartInstance {
        designator,
        part_id: part.id.clone(),
        symbol: symbol.clone(),
        value: part
            .value
            .clone()
            .or_else(|| property("Value"))
            .unwrap_or_else(|| symbol.name.clone()),
        footprint: part.footprint.clone().or_else(|| property("Footprint")),
        datasheet: part.datasheet.clone().or_else(|| property("Datasheet")),
        part_source: part
            .lcsc
            .clone()
            .or_else(|| property("LCSC"))
            .or_else(|| property("LCSC Part")),
        category: part.category,
        belongs_to: part.belongs_to.clone(),
        transform: Transform {
            position: Point::default(),
            orientation: part.rotation,
            mirror: part.mirror,
        },
    }
}

/// Order designators the way a human reads them: `R2` before `R10`.
pub fn compare_designators(a: &str, b: &str) -> Ordering {
    split_designator(a).cmp(&split_designator(b))
}

fn split_designator(designator: &str) -> (&str, u64, &str) {
    let prefix_end = designator
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(designator.len());
    let (prefix, rest) = designator.split_at(prefix_end);
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let number = rest[..digits_end].parse().unwrap_or(0);
    (prefix, number, &rest[digits_end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_designator_order() {
        let mut refs = vec!["R10", "C1", "R2", "R1", "U1A", "U1"];
        refs.sort_by(|a, b| compare_designators(a, b));
        assert_eq!(refs, vec!["C1", "R1", "R2", "R10", "U1", "U1A"]);
    }
}
