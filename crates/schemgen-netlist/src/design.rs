//! The design document a generation run starts from: parts, semantic nets
//! and explicit no-connect pins.

use crate::diagnostics::{Diagnostics, Warning};
use crate::geometry::{Mirror, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Design {
    #[serde(default)]
    pub title: Option<String>,
    pub parts: Vec<PartRecord>,
    /// Net name to `Component.Pin` references.
    #[serde(default)]
    pub nets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub no_connect: Vec<NoConnect>,
    /// Nets allowed to have a single member.
    #[serde(default)]
    pub test_points: BTreeSet<String>,
    /// Canonical pin name to alternate spellings, e.g. `SDA: [SDIO, DATA]`.
    #[serde(default)]
    pub pin_aliases: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartRecord {
    /// Semantic name used in net references.
    pub id: String,
    /// Designator prefix; defaults to the symbol's `Reference` property.
    #[serde(default)]
    pub prefix: Option<String>,
    /// `Library:Name` or bare symbol name.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Part-source number, also used to find the symbol when `symbol` is absent.
    #[serde(default)]
    pub lcsc: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Pre-assigned designators. When empty, designators are numbered per prefix.
    #[serde(default)]
    pub designators: Vec<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub footprint: Option<String>,
    #[serde(default)]
    pub datasheet: Option<String>,
    #[serde(default)]
    pub category: PartCategory,
    /// Id of the part this one supports (decoupling caps, pull-ups, ...).
    #[serde(default)]
    pub belongs_to: Option<String>,
    #[serde(default)]
    pub rotation: Orientation,
    #[serde(default)]
    pub mirror: Option<Mirror>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCategory {
    Ic,
    Connector,
    Passive,
    Decoupling,
    Bypass,
    Power,
    Crystal,
    Led,
    Mechanical,
    #[default]
    #[serde(other)]
    Other,
}

impl PartCategory {
    /// Local decoupling/bypass parts are packed apart from the main layout.
    pub fn is_decoupling(self) -> bool {
        matches!(self, PartCategory::Decoupling | PartCategory::Bypass)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoConnect {
    pub component: String,
    pub pin: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Design {
    pub fn part(&self, id: &str) -> Option<&PartRecord> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Structural checks that do not block generation.
    pub fn validate(&self, diagnostics: &mut Diagnostics) {
        let ids: HashSet<&str> = self.parts.iter().map(|p| p.id.as_str()).collect();
        for part in &self.parts {
            if let Some(parent) = &part.belongs_to {
                if !ids.contains(parent.as_str()) {
                    diagnostics.warn(Warning::UnknownGroupParent {
                        part: part.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let referenced: HashSet<&str> = self
            .nets
            .values()
            .flatten()
            .filter_map(|r| r.split_once('.').map(|(component, _)| component))
            .chain(self.no_connect.iter().map(|nc| nc.component.as_str()))
            .collect();
        for part in &self.parts {
            if !referenced.contains(part.id.as_str()) {
                diagnostics.warn(Warning::UnconnectedPart {
                    part: part.id.clone(),
                });
            }
        }

        if !self.nets.keys().any(|n| is_ground_net(n)) {
            diagnostics.warn(Warning::MissingGroundNet);
        }
        if !self.nets.keys().any(|n| is_supply_net(n)) {
            diagnostics.warn(Warning::MissingSupplyRail);
        }
    }
}

/// `GND` and its analog, digital and power variants (`AGND`, `GND_D`, ...),
/// plus `VSS`.
pub fn is_ground_net(name: &str) -> bool {
    let name = name.to_ascii_uppercase();
    name.contains("GND") || name == "VSS"
}

/// Positive supply rails: `VCC`, `VDD`, `VBAT`, `VBUS`, `VIN`, `VSYS` (with
/// optional `_suffix`) and voltage names such as `+3V3`, `5V`, `1V8`, `+3.3V`.
pub fn is_supply_net(name: &str) -> bool {
    let name = name.trim_start_matches('+').to_ascii_uppercase();
    let stem = name.split('_').next().unwrap_or_default();
    if matches!(stem, "VCC" | "VDD" | "VBAT" | "VBUS" | "VIN" | "VSYS") {
        return true;
    }
    // 3V3, 12V, 1V8, 3.3V
    match stem.split_once('V') {
        Some((volts, fraction)) => {
            !volts.is_empty()
                && volts.chars().all(|c| c.is_ascii_digit() || c == '.')
                && volts.starts_with(|c: char| c.is_ascii_digit())
                && fraction.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_design_with_defaults() {
        let design: Design = serde_yaml::from_str(
            r#"
title: Sensor board
parts:
  - id: mcu
    symbol: Demo:MCU
    category: ic
  - id: c_dec
    symbol: Device:C
    quantity: 2
    category: decoupling
    belongs_to: mcu
    rotation: 90
  - id: j_prog
    lcsc: C124378
    category: header
nets:
  GND: [mcu.GND, c_dec.2]
no_connect:
  - { component: mcu, pin: IO1, reason: unused }
"#,
        )
        .unwrap();

        assert_eq!(design.parts.len(), 3);
        let dec = design.part("c_dec").unwrap();
        assert_eq!(dec.quantity, 2);
        assert!(dec.category.is_decoupling());
        assert_eq!(dec.rotation, Orientation::R90);
        assert_eq!(design.part("mcu").unwrap().quantity, 1);
        // Unknown categories fall back to Other.
        assert_eq!(design.part("j_prog").unwrap().category, PartCategory::Other);
        assert_eq!(design.no_connect[0].reason.as_deref(), Some("unused"));
    }

    #[test]
    fn rejects_unknown_fields_and_rotations() {
        let bad_field = serde_yaml::from_str::<Design>("parts: [{id: a, colour: red}]");
        assert!(bad_field.is_err());
        let bad_rotation = serde_yaml::from_str::<Design>("parts: [{id: a, rotation: 45}]");
        assert!(bad_rotation.is_err());
    }

    #[test]
    fn unknown_group_parent_is_a_warning() {
        let design: Design = serde_yaml::from_str(
            "parts: [{id: r1, belongs_to: ghost}, {id: r2, belongs_to: r1}]",
        )
        .unwrap();
        let mut diagnostics = Diagnostics::default();
        design.validate(&mut diagnostics);
        let parents: Vec<_> = diagnostics
            .warnings()
            .iter()
            .filter(|w| matches!(w, Warning::UnknownGroupParent { .. }))
            .collect();
        assert_eq!(
            parents,
            vec![&Warning::UnknownGroupParent {
                part: "r1".into(),
                parent: "ghost".into()
            }]
        );
    }

    #[test]
    fn rail_names() {
        for name in ["GND", "AGND", "gnd_iso", "VSS"] {
            assert!(is_ground_net(name), "{name}");
        }
        for name in ["+3V3", "3V3", "+5V", "12V", "1V8", "+3.3V", "VCC", "VDD_IO", "VBUS", "vbat"] {
            assert!(is_supply_net(name), "{name}");
        }
        for name in ["SDA", "VREF", "V", "EN", "LED_V", "GND", "V3"] {
            assert!(!is_supply_net(name), "{name}");
        }
    }
}
