//! Pin-model resolution: turn `Component.Pin` net references into a label for
//! every physical pin of every part instance.

use crate::design::Design;
use crate::diagnostics::{Diagnostics, Warning};
use crate::instance::{compare_designators, PartInstance};
use crate::ResolveError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

/// One physical pin: designator plus pin number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PinRef {
    pub designator: String,
    pub pin: String,
}

impl PinRef {
    pub fn new(designator: impl Into<String>, pin: impl Into<String>) -> Self {
        PinRef {
            designator: designator.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.designator, self.pin)
    }
}

/// The label a pin carries on the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PinLabel {
    /// Member of a named net.
    Net { name: String },
    /// Absent from every net; carries a synthesized unique name.
    Unconnected { name: String },
    /// Explicitly left open; drawn with a no-connect flag.
    NoConnect {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl PinLabel {
    pub fn text(&self) -> &str {
        match self {
            PinLabel::Net { name }
            | PinLabel::Unconnected { name }
            | PinLabel::NoConnect { name, .. } => name,
        }
    }

    pub fn is_no_connect(&self) -> bool {
        matches!(self, PinLabel::NoConnect { .. })
    }
}

/// Complete pin-to-label mapping plus the resolved member list of each net.
#[derive(Debug, Clone, Default)]
pub struct PinModel {
    labels: BTreeMap<PinRef, PinLabel>,
    nets: BTreeMap<String, Vec<PinRef>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinModelStats {
    pub parts: usize,
    pub total_pins: usize,
    pub connected_pins: usize,
    pub unconnected_pins: usize,
    pub no_connect_pins: usize,
    pub nets: usize,
}

impl PinModel {
    pub fn label(&self, pin: &PinRef) -> Option<&PinLabel> {
        self.labels.get(pin)
    }

    pub fn label_for(&self, designator: &str, pin: &str) -> Option<&PinLabel> {
        self.labels.get(&PinRef::new(designator, pin))
    }

    pub fn labels(&self) -> impl Iterator<Item = (&PinRef, &PinLabel)> {
        self.labels.iter()
    }

    /// Named nets with their resolved pins, in name order.
    pub fn nets(&self) -> impl Iterator<Item = (&str, &[PinRef])> {
        self.nets.iter().map(|(n, m)| (n.as_str(), m.as_slice()))
    }

    pub fn members(&self, net: &str) -> &[PinRef] {
        self.nets.get(net).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fan_out(&self, net: &str) -> usize {
        self.members(net).len()
    }

    pub fn statistics(&self) -> PinModelStats {
        let mut stats = PinModelStats {
            parts: self
                .labels
                .keys()
                .map(|p| p.designator.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            total_pins: self.labels.len(),
            connected_pins: 0,
            unconnected_pins: 0,
            no_connect_pins: 0,
            nets: self.nets.len(),
        };
        for label in self.labels.values() {
            match label {
                PinLabel::Net { .. } => stats.connected_pins += 1,
                PinLabel::Unconnected { .. } => stats.unconnected_pins += 1,
                PinLabel::NoConnect { .. } => stats.no_connect_pins += 1,
            }
        }
        stats
    }

    /// Per-part pin tables, net membership and statistics as pretty JSON.
    pub fn to_json(&self, instances: &[PartInstance]) -> Result<String, serde_json::Error> {
        let mut parts: Vec<&PartInstance> = instances.iter().collect();
        parts.sort_by(|a, b| compare_designators(&a.designator, &b.designator));

        let report = PinModelReport {
            parts: parts
                .into_iter()
                .map(|inst| PartEntry {
                    designator: &inst.designator,
                    part_id: &inst.part_id,
                    symbol: &inst.symbol.lib_id,
                    value: &inst.value,
                    pins: inst
                        .pins()
                        .iter()
                        .filter_map(|pin| {
                            let label = self.label_for(&inst.designator, &pin.number)?;
                            Some(PinEntry {
                                number: &pin.number,
                                name: &pin.name,
                                electrical_type: pin.electrical_type.as_str(),
                                label,
                            })
                        })
                        .collect(),
                })
                .collect(),
            nets: self
                .nets
                .iter()
                .map(|(name, members)| {
                    (name.as_str(), members.iter().map(PinRef::to_string).collect())
                })
                .collect(),
            statistics: self.statistics(),
        };
        serde_json::to_string_pretty(&report)
    }
}

#[derive(Serialize)]
struct PinModelReport<'a> {
    parts: Vec<PartEntry<'a>>,
    nets: BTreeMap<&'a str, Vec<String>>,
    statistics: PinModelStats,
}

#[derive(Serialize)]
struct PartEntry<'a> {
    designator: &'a str,
    part_id: &'a str,
    symbol: &'a str,
    value: &'a str,
    pins: Vec<PinEntry<'a>>,
}

#[derive(Serialize)]
struct PinEntry<'a> {
    number: &'a str,
    name: &'a str,
    electrical_type: &'a str,
    label: &'a PinLabel,
}

const NO_CONNECT_NET: &str = "<no_connect>";

/// Resolves semantic references against the instances of one design.
pub struct Resolver<'a> {
    instances: &'a [PartInstance],
    by_part: HashMap<&'a str, Vec<&'a PartInstance>>,
    by_designator: HashMap<&'a str, &'a PartInstance>,
    aliases: &'a BTreeMap<String, Vec<String>>,
}

impl<'a> Resolver<'a> {
    pub fn new(instances: &'a [PartInstance], aliases: &'a BTreeMap<String, Vec<String>>) -> Self {
        let mut by_part: HashMap<&str, Vec<&PartInstance>> = HashMap::new();
        let mut by_designator = HashMap::new();
        for inst in instances {
            by_part.entry(inst.part_id.as_str()).or_default().push(inst);
            by_designator.insert(inst.designator.as_str(), inst);
        }
        Resolver {
            instances,
            by_part,
            by_designator,
            aliases,
        }
    }

    /// Resolve one `Component.Pin` reference to every physical pin it names.
    ///
    /// The component is a part id (all of its instances) or a designator. The
    /// pin token is tried as a pin name, case-insensitively, through the alias
    /// table, and finally as a pin number.
    pub fn resolve_reference(&self, net: &str, reference: &str) -> Result<Vec<PinRef>, ResolveError> {
        let unresolved = |reason: String| ResolveError::UnresolvedReference {
            net: net.to_string(),
            reference: reference.to_string(),
            reason,
        };

        let (component, token) = reference
            .split_once('.')
            .filter(|(c, t)| !c.is_empty() && !t.is_empty())
            .ok_or_else(|| unresolved("expected `Component.Pin`".to_string()))?;

        let targets: Vec<&PartInstance> = match self.by_part.get(component) {
            Some(instances) => instances.clone(),
            None => match self.by_designator.get(component) {
                Some(inst) => vec![*inst],
                None => {
                    return Err(unresolved(format!(
                        "no part or designator named `{component}`"
                    )))
                }
            },
        };

        let mut pins = Vec::new();
        for inst in targets {
            let numbers = self.pin_numbers(inst, token);
            if numbers.is_empty() {
                return Err(unresolved(format!(
                    "{} ({}) has no pin named or numbered `{token}`",
                    inst.designator, inst.symbol.lib_id
                )));
            }
            pins.extend(numbers.into_iter().map(|n| PinRef::new(&inst.designator, n)));
        }
        Ok(pins)
    }

    fn pin_numbers(&self, inst: &PartInstance, token: &str) -> Vec<String> {
        let by_name = |name: &str| -> Vec<String> {
            inst.pins()
                .iter()
                .filter(|p| p.name != "~" && p.name == name)
                .map(|p| p.number.clone())
                .collect()
        };

        let exact = by_name(token);
        if !exact.is_empty() {
            return exact;
        }

        let folded: Vec<String> = inst
            .pins()
            .iter()
            .filter(|p| p.name != "~" && p.name.eq_ignore_ascii_case(token))
            .map(|p| p.number.clone())
            .collect();
        if !folded.is_empty() {
            return folded;
        }

        for alternate in self.alias_candidates(token) {
            let found = by_name(alternate);
            if !found.is_empty() {
                return found;
            }
        }

        inst.symbol
            .pin(token)
            .map(|p| vec![p.number.clone()])
            .unwrap_or_default()
    }

    /// Other spellings of `token`: its alternates when it is canonical, or the
    /// canonical name and sibling alternates when it is an alternate.
    fn alias_candidates(&self, token: &str) -> Vec<&'a str> {
        let mut out = Vec::new();
        for (canonical, alternates) in self.aliases {
            let group_has_token = canonical.eq_ignore_ascii_case(token)
                || alternates.iter().any(|a| a.eq_ignore_ascii_case(token));
            if group_has_token {
                out.push(canonical.as_str());
                out.extend(alternates.iter().map(String::as_str));
            }
        }
        out.retain(|name| !name.eq_ignore_ascii_case(token));
        out
    }

    /// Build the full pin model for `design`.
    pub fn resolve(
        &self,
        design: &Design,
        diagnostics: &mut Diagnostics,
    ) -> Result<PinModel, ResolveError> {
        let mut owner: HashMap<PinRef, &str> = HashMap::new();
        let mut nets: BTreeMap<String, Vec<PinRef>> = BTreeMap::new();

        for (net, references) in &design.nets {
            let mut members = Vec::new();
            for reference in references {
                for pin in self.resolve_reference(net, reference)? {
                    match owner.get(&pin) {
                        Some(first) if *first != net.as_str() => {
                            return Err(ResolveError::DuplicatePinAssignment {
                                designator: pin.designator,
                                pin: pin.pin,
                                first_net: first.to_string(),
                                second_net: net.clone(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            owner.insert(pin.clone(), net.as_str());
                            members.push(pin);
                        }
                    }
                }
            }
            if members.len() < 2 && !design.test_points.contains(net) {
                diagnostics.warn(Warning::DanglingNet {
                    net: net.clone(),
                    members: members.len(),
                });
            }
            nets.insert(net.clone(), members);
        }

        let mut no_connect: HashMap<PinRef, Option<String>> = HashMap::new();
        for entry in &design.no_connect {
            let reference = format!("{}.{}", entry.component, entry.pin);
            for pin in self.resolve_reference(NO_CONNECT_NET, &reference)? {
                if let Some(net) = owner.get(&pin) {
                    return Err(ResolveError::ConflictingNoConnect {
                        designator: pin.designator,
                        pin: pin.pin,
                        net: net.to_string(),
                    });
                }
                no_connect.insert(pin, entry.reason.clone());
            }
        }

        let mut taken: HashSet<String> = nets.keys().cloned().collect();
        let mut labels = BTreeMap::new();
        for inst in self.instances {
            for pin in inst.pins() {
                let pin_ref = PinRef::new(&inst.designator, &pin.number);
                let label = if let Some(net) = owner.get(&pin_ref) {
                    PinLabel::Net {
                        name: net.to_string(),
                    }
                } else {
                    let name = unique_label(&inst.designator, &pin.number, &mut taken, diagnostics);
                    match no_connect.get(&pin_ref) {
                        Some(reason) => PinLabel::NoConnect {
                            name,
                            reason: reason.clone(),
                        },
                        None => PinLabel::Unconnected { name },
                    }
                };
                labels.insert(pin_ref, label);
            }
        }

        let model = PinModel { labels, nets };
        let stats = model.statistics();
        log::info!(
            "resolved {} pins on {} parts: {} connected, {} unconnected, {} no-connect, {} nets",
            stats.total_pins,
            stats.parts,
            stats.connected_pins,
            stats.unconnected_pins,
            stats.no_connect_pins,
            stats.nets
        );
        Ok(model)
    }
}

fn unique_label(
    designator: &str,
    pin: &str,
    taken: &mut HashSet<String>,
    diagnostics: &mut Diagnostics,
) -> String {
    let base = format!("{designator}_{pin}");
    let mut label = base.clone();
    let mut suffix = 0;
    while taken.contains(&label) {
        suffix += 1;
        label = format!("{base}_{suffix}");
    }
    if suffix > 0 {
        diagnostics.warn(Warning::RenamedUnconnectedLabel {
            designator: designator.to_string(),
            pin: pin.to_string(),
            label: label.clone(),
        });
    }
    taken.insert(label.clone());
    label
}

/// Resolve `design` against already built `instances`.
pub fn resolve_pin_model(
    design: &Design,
    instances: &[PartInstance],
    diagnostics: &mut Diagnostics,
) -> Result<PinModel, ResolveError> {
    Resolver::new(instances, &design.pin_aliases).resolve(design, diagnostics)
}
