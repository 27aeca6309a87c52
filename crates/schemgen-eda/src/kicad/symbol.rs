use crate::{ElectricalType, LocalBounds, Pin, PinRotation, Symbol};
use schemgen_sexpr::Sexpr;
use std::collections::{BTreeMap, HashSet};

/// Default pin length KiCad assumes when `(length ...)` is absent.
const DEFAULT_PIN_LENGTH: f64 = 2.54;

/// Parse one flattened top-level `(symbol "NAME" ...)` form.
///
/// The error is the human-readable reason; the caller attaches the symbol
/// name when it builds a `MalformedSymbol`.
pub(crate) fn parse_symbol(sexp: &Sexpr) -> Result<Symbol, String> {
    let name = sexp
        .atom_at(1)
        .ok_or_else(|| "symbol has no name".to_string())?
        .to_string();

    let mut symbol = Symbol {
        name: name.clone(),
        in_bom: true,
        on_board: true,
        properties: BTreeMap::new(),
        pins: Vec::new(),
        bounds: LocalBounds::empty(),
        raw_sexp: Some(sexp.clone()),
    };

    for item in sexp.as_list().unwrap_or(&[]).iter().skip(2) {
        match item.tag() {
            Some("in_bom") => symbol.in_bom = item.atom_at(1) != Some("no"),
            Some("on_board") => symbol.on_board = item.atom_at(1) != Some("no"),
            Some("property") => {
                if let (Some(key), Some(value)) = (item.atom_at(1), item.atom_at(2)) {
                    symbol.properties.insert(key.to_string(), value.to_string());
                }
            }
            Some("pin") => symbol.pins.push(parse_pin(item, 0)?),
            Some("symbol") => parse_unit(&mut symbol, &name, item)?,
            Some(_) => accumulate_graphic(&mut symbol.bounds, item),
            None => {}
        }
    }

    let mut seen = HashSet::new();
    for pin in &symbol.pins {
        if !seen.insert(pin.number.as_str()) {
            return Err(format!("pin number `{}` appears more than once", pin.number));
        }
        symbol.bounds.include(pin.x, pin.y);
        let (dx, dy) = pin.rotation.local_direction();
        symbol
            .bounds
            .include(pin.x + dx * pin.length, pin.y + dy * pin.length);
    }

    log::trace!(
        "parsed symbol {} with {} pins",
        symbol.name,
        symbol.pins.len()
    );
    Ok(symbol)
}

/// Nested `(symbol "NAME_<unit>_<style>" ...)` section. Only the base body
/// style is read; De Morgan alternates repeat the same pins.
fn parse_unit(symbol: &mut Symbol, parent: &str, section: &Sexpr) -> Result<(), String> {
    let (unit, style) = section
        .atom_at(1)
        .and_then(|n| unit_suffix(parent, n))
        .unwrap_or((0, 1));
    if style > 1 {
        return Ok(());
    }

    for item in section.as_list().unwrap_or(&[]).iter().skip(2) {
        match item.tag() {
            Some("pin") => symbol.pins.push(parse_pin(item, unit)?),
            Some(_) => accumulate_graphic(&mut symbol.bounds, item),
            None => {}
        }
    }
    Ok(())
}

fn unit_suffix(parent: &str, section_name: &str) -> Option<(u32, u32)> {
    let rest = section_name.strip_prefix(parent)?.strip_prefix('_')?;
    let (unit, style) = rest.split_once('_')?;
    Some((unit.parse().ok()?, style.parse().ok()?))
}

/// `(pin <type> <shape> (at X Y [ROT]) (length L) [hide] (name "N") (number "1"))`
pub(crate) fn parse_pin(pin: &Sexpr, unit: u32) -> Result<Pin, String> {
    let number = pin
        .find("number")
        .and_then(|n| n.atom_at(1))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "pin without a number".to_string())?
        .to_string();

    let electrical_type = pin
        .atom_at(1)
        .ok_or_else(|| format!("pin {number} has no electrical type"))?
        .parse::<ElectricalType>()
        .map_err(|e| format!("pin {number}: {e}"))?;

    let at = pin
        .find("at")
        .ok_or_else(|| format!("pin {number} has no position"))?;
    let x = coordinate(at, 1, "x", &number)?;
    let y = coordinate(at, 2, "y", &number)?;
    let rotation = match at.atom_at(3) {
        None => PinRotation::R0,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .and_then(PinRotation::from_degrees)
            .ok_or_else(|| {
                format!("pin {number} rotation `{raw}` is not one of 0, 90, 180, 270")
            })?,
    };

    let length = pin
        .find("length")
        .and_then(|l| l.f64_at(1))
        .unwrap_or(DEFAULT_PIN_LENGTH);
    let name = pin
        .find("name")
        .and_then(|n| n.atom_at(1))
        .unwrap_or("~")
        .to_string();
    let hidden = pin.has_flag("hide")
        || pin
            .find("hide")
            .is_some_and(|h| h.atom_at(1).map_or(true, |v| v == "yes"));

    Ok(Pin {
        number,
        name,
        x,
        y,
        rotation,
        length,
        electrical_type,
        hidden,
        unit,
    })
}

fn coordinate(at: &Sexpr, index: usize, axis: &str, pin: &str) -> Result<f64, String> {
    let raw = at
        .atom_at(index)
        .ok_or_else(|| format!("pin {pin} is missing its {axis} coordinate"))?;
    raw.parse::<f64>()
        .map_err(|_| format!("pin {pin} has non-numeric {axis} coordinate `{raw}`"))
}

/// Grow `bounds` by the outline of a body graphic.
fn accumulate_graphic(bounds: &mut LocalBounds, item: &Sexpr) {
    match item.tag() {
        Some("rectangle") => {
            include_point(bounds, item.find("start"));
            include_point(bounds, item.find("end"));
        }
        Some("arc") => {
            include_point(bounds, item.find("start"));
            include_point(bounds, item.find("mid"));
            include_point(bounds, item.find("end"));
        }
        Some("polyline") | Some("bezier") => {
            if let Some(pts) = item.find("pts") {
                for xy in pts.find_all("xy") {
                    include_point(bounds, Some(xy));
                }
            }
        }
        Some("circle") => {
            let center = item.find("center");
            let radius = item.find("radius").and_then(|r| r.f64_at(1));
            if let (Some(c), Some(r)) = (center, radius) {
                if let (Some(cx), Some(cy)) = (c.f64_at(1), c.f64_at(2)) {
                    bounds.include(cx - r, cy - r);
                    bounds.include(cx + r, cy + r);
                }
            }
        }
        _ => {}
    }
}

fn include_point(bounds: &mut LocalBounds, child: Option<&Sexpr>) {
    if let Some(c) = child {
        if let (Some(x), Some(y)) = (c.f64_at(1), c.f64_at(2)) {
            bounds.include(x, y);
        }
    }
}
