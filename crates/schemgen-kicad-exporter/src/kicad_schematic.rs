//! Conversion of a placed and routed sheet to KiCad's `.kicad_sch` format.
//!
//! Symbols are either embedded, with each flattened library definition
//! copied into `lib_symbols` under its `Library:Name` id, or referenced by
//! name only. A referencing schematic is incomplete: it needs a separate
//! "populate embedded definitions" pass (KiCad's *Update Symbols from
//! Library*, or an equivalent script) before KiCad can draw it. This crate
//! never performs that pass.
//!
//! Power nets get a `power:PWR_FLAG` each, in a row above the parts, so
//! KiCad's ERC sees where their power comes from.
//!
//! Every UUID is a v5 UUID derived from the sheet title and the element it
//! names, so the same inputs always produce the same bytes.

use crate::project::format_footprint;
use crate::ExportError;
use schemgen_eda::ElectricalType;
use schemgen_engine::{Justify, Layout, Paper, Routing, RoutingOutcome};
use schemgen_netlist::geometry::{snap_to_grid, Mirror, Point};
use schemgen_netlist::{is_ground_net, is_supply_net, PartInstance};
use schemgen_sexpr::{format_sexpr, Sexpr};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use uuid::Uuid;

/// File format version written to the header (KiCad 8).
pub const SCHEMATIC_VERSION: &str = "20231120";
pub const GENERATOR: &str = "schemgen";

const FONT_SIZE: f64 = 1.27;
const FALLBACK_COLOR: [&str; 4] = ["255", "0", "0", "1"];

pub const POWER_FLAG_LIB_ID: &str = "power:PWR_FLAG";
const FLAG_PITCH: f64 = 25.4;
const FLAG_STUB: f64 = 5.08;
/// Flag anchors sit this far above the topmost part, never closer than
/// `FLAG_TOP` to the sheet edge.
const FLAG_RISE: f64 = 17.78;
const FLAG_TOP: f64 = 7.62;
const GRID: f64 = 1.27;

/// How symbol definitions reach the schematic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolMode {
    /// Copy flattened definitions into `lib_symbols`.
    #[default]
    Embed,
    /// Point every instance at `library:Name` and leave `lib_symbols` empty.
    Reference { library: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    #[default]
    Local,
    Global,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub title: String,
    /// Title block date, as the caller wants it printed.
    pub date: Option<String>,
    /// Project name recorded in each symbol's instance path.
    pub project: String,
    /// Overrides the paper size chosen by the placer.
    pub paper: Option<Paper>,
    pub symbol_mode: SymbolMode,
    pub label_style: LabelStyle,
    /// Put a red text note next to every fallback path.
    pub annotate_fallbacks: bool,
    /// Add a PWR_FLAG to every power net.
    pub power_flags: bool,
    /// Shorten label text to at most this many characters, keeping
    /// distinct nets distinct.
    pub max_label_length: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title: GENERATOR.to_string(),
            date: None,
            project: GENERATOR.to_string(),
            paper: None,
            symbol_mode: SymbolMode::Embed,
            label_style: LabelStyle::Local,
            annotate_fallbacks: true,
            power_flags: true,
            max_label_length: None,
        }
    }
}

/// Render the sheet as `.kicad_sch` text.
pub fn to_kicad_schematic(
    layout: &Layout,
    routing: &Routing,
    options: &ExportOptions,
) -> Result<String, ExportError> {
    let converter = SchematicConverter::new(options)?;
    let schematic = converter.convert(layout, routing)?;
    let mut text = format_sexpr(&schematic, 0);
    text.push('\n');
    Ok(text)
}

/// Render and write the sheet. Nothing is written when rendering fails.
pub fn write_kicad_schematic(
    path: &Path,
    layout: &Layout,
    routing: &Routing,
    options: &ExportOptions,
) -> Result<(), ExportError> {
    let text = to_kicad_schematic(layout, routing, options)?;
    std::fs::write(path, text).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote schematic {}", path.display());
    Ok(())
}

struct Uuids {
    namespace: Uuid,
}

impl Uuids {
    fn new(title: &str) -> Self {
        let seed = format!("{GENERATOR}:{title}");
        Self {
            namespace: Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()),
        }
    }

    fn node(&self, key: &str) -> Sexpr {
        let id = Uuid::new_v5(&self.namespace, key.as_bytes());
        Sexpr::node("uuid", vec![Sexpr::symbol(id.to_string())])
    }

    fn root(&self) -> String {
        Uuid::new_v5(&self.namespace, b"root").to_string()
    }
}

/// Map net names to label text no longer than `max` characters.
///
/// Names that already fit keep their text. Longer ones are truncated; when
/// the truncated text is taken the last two characters become a counter
/// (`01` to `99`). A name with no free counter keeps its full text.
pub fn shorten_label_names<'n>(
    names: impl IntoIterator<Item = &'n str>,
    max: usize,
) -> BTreeMap<String, String> {
    let names: BTreeSet<&str> = names.into_iter().collect();
    let fits = |name: &str| name.chars().count() <= max;
    let mut taken: HashSet<String> = names
        .iter()
        .filter(|n| fits(n))
        .map(|n| n.to_string())
        .collect();

    let mut map = BTreeMap::new();
    for name in names {
        if fits(name) {
            map.insert(name.to_string(), name.to_string());
            continue;
        }
        let truncated: String = name.chars().take(max).collect();
        let base: String = name.chars().take(max.saturating_sub(2)).collect();
        let short = std::iter::once(truncated)
            .chain((1..100).map(|i| format!("{base}{i:02}")))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| {
                log::warn!("no free short label for {name}, keeping it whole");
                name.to_string()
            });
        taken.insert(short.clone());
        map.insert(name.to_string(), short);
    }
    map
}

/// Nets that get a PWR_FLAG: ground and supply rails by name, plus any net
/// reaching a power input or output pin.
pub fn power_nets<'r>(layout: &Layout, routing: &'r Routing) -> Vec<&'r str> {
    let mut nets: BTreeSet<&str> = routing
        .nets
        .iter()
        .map(|n| n.net.as_str())
        .filter(|n| is_ground_net(n) || is_supply_net(n))
        .collect();
    for label in &routing.labels {
        if routing.net(&label.text).is_none() {
            continue;
        }
        let powered = layout
            .instance(&label.pin.designator)
            .and_then(|inst| inst.symbol.pin(&label.pin.pin))
            .is_some_and(|pin| {
                matches!(
                    pin.electrical_type,
                    ElectricalType::PowerIn | ElectricalType::PowerOut
                )
            });
        if powered {
            nets.insert(label.text.as_str());
        }
    }
    nets.into_iter().collect()
}

struct SchematicConverter<'a> {
    options: &'a ExportOptions,
    uuids: Uuids,
}

impl<'a> SchematicConverter<'a> {
    fn new(options: &'a ExportOptions) -> Result<Self, ExportError> {
        if let SymbolMode::Reference { library } = &options.symbol_mode {
            if library.is_empty() || library.contains(':') || library.contains('"') {
                return Err(ExportError::InvalidLibraryName(library.clone()));
            }
        }
        Ok(Self {
            options,
            uuids: Uuids::new(&options.title),
        })
    }

    fn convert(&self, layout: &Layout, routing: &Routing) -> Result<Sexpr, ExportError> {
        let paper = self.paper(layout);
        let flagged = if self.options.power_flags {
            power_nets(layout, routing)
        } else {
            Vec::new()
        };
        let names = self.label_names(routing);
        let text_of = |net: &str| names.get(net).cloned().unwrap_or_else(|| net.to_string());
        let mut items = vec![
            Sexpr::symbol("kicad_sch"),
            Sexpr::node("version", vec![Sexpr::symbol(SCHEMATIC_VERSION)]),
            Sexpr::node("generator", vec![Sexpr::string(GENERATOR)]),
            Sexpr::node("uuid", vec![Sexpr::symbol(self.uuids.root())]),
            Sexpr::node("paper", vec![Sexpr::string(paper.as_str())]),
            self.title_block(),
            self.lib_symbols(layout, !flagged.is_empty())?,
        ];

        for (i, junction) in routing.junctions.iter().enumerate() {
            items.push(Sexpr::node(
                "junction",
                vec![
                    at(*junction, None),
                    Sexpr::node("diameter", vec![Sexpr::symbol("0")]),
                    Sexpr::node("color", ["0", "0", "0", "0"].map(Sexpr::symbol).to_vec()),
                    self.uuids.node(&format!("junction/{i}")),
                ],
            ));
        }

        for flag in &routing.no_connects {
            items.push(Sexpr::node(
                "no_connect",
                vec![
                    at(flag.position, None),
                    self.uuids.node(&format!("no_connect/{}", flag.pin)),
                ],
            ));
        }

        for (i, wire) in routing.wires.iter().chain(&routing.leads).enumerate() {
            items.push(self.wire(wire.start, wire.end, &format!("wire/{i}")));
        }

        for label in &routing.labels {
            let justify = match label.justify {
                Justify::Left => "left",
                Justify::Right => "right",
            };
            items.push(self.label(
                &text_of(&label.text),
                label.position,
                label.rotation,
                justify,
                &format!("label/{}", label.pin),
            ));
        }

        let root = self.uuids.root();
        let row = flag_row(layout);
        for (i, net) in flagged.iter().enumerate() {
            let anchor = row.offset(i as f64 * FLAG_PITCH, 0.0);
            let stub_end = anchor.offset(0.0, FLAG_STUB);
            items.push(self.power_flag(i + 1, anchor, &root));
            items.push(self.wire(anchor, stub_end, &format!("power_flag/{net}/wire")));
            items.push(self.label(
                &text_of(net),
                stub_end,
                270,
                "left",
                &format!("power_flag/{net}/label"),
            ));
        }

        if self.options.annotate_fallbacks {
            items.extend(self.fallback_notes(routing));
        }

        for inst in &layout.instances {
            items.push(self.symbol(inst, &root));
        }

        items.push(Sexpr::node(
            "sheet_instances",
            vec![Sexpr::node(
                "path",
                vec![
                    Sexpr::string("/"),
                    Sexpr::node("page", vec![Sexpr::string("1")]),
                ],
            )],
        ));

        log::debug!(
            "schematic: {} symbols, {} wires, {} labels, {} junctions, {} no-connects, {} power flags on {}",
            layout.instances.len(),
            routing.wires.len() + routing.leads.len(),
            routing.labels.len(),
            routing.junctions.len(),
            routing.no_connects.len(),
            flagged.len(),
            paper
        );
        Ok(Sexpr::List(items))
    }

    fn paper(&self, layout: &Layout) -> Paper {
        let Some(paper) = self.options.paper else {
            return layout.paper;
        };
        let (width, height) = paper.size();
        if layout.extents.max.x > width || layout.extents.max.y > height {
            log::warn!(
                "layout needs {}, sheet forced to {paper}; parts will fall off the page",
                layout.paper
            );
        }
        paper
    }

    fn title_block(&self) -> Sexpr {
        let mut items = vec![Sexpr::node(
            "title",
            vec![Sexpr::string(self.options.title.clone())],
        )];
        if let Some(date) = &self.options.date {
            items.push(Sexpr::node("date", vec![Sexpr::string(date.clone())]));
        }
        items.push(Sexpr::node(
            "comment",
            vec![
                Sexpr::symbol("1"),
                Sexpr::string(format!("Generated by {GENERATOR}")),
            ],
        ));
        Sexpr::node("title_block", items)
    }

    fn label_names(&self, routing: &Routing) -> BTreeMap<String, String> {
        match self.options.max_label_length {
            Some(max) => {
                let names = routing
                    .labels
                    .iter()
                    .map(|l| l.text.as_str())
                    .chain(routing.nets.iter().map(|n| n.net.as_str()));
                shorten_label_names(names, max)
            }
            None => BTreeMap::new(),
        }
    }

    fn lib_symbols(&self, layout: &Layout, power_flag: bool) -> Result<Sexpr, ExportError> {
        let mut definitions = BTreeMap::new();
        if self.options.symbol_mode == SymbolMode::Embed {
            for inst in &layout.instances {
                let lib_id = &inst.symbol.lib_id;
                if definitions.contains_key(lib_id) {
                    continue;
                }
                let mut definition = inst
                    .symbol
                    .raw_sexp
                    .clone()
                    .ok_or_else(|| ExportError::MissingDefinition(lib_id.clone()))?;
                // Unit sections keep their bare names; only the top level
                // carries the library prefix.
                if let Some(name) = definition.as_list_mut().and_then(|l| l.get_mut(1)) {
                    *name = Sexpr::string(lib_id.clone());
                }
                definitions.insert(lib_id.clone(), definition);
            }
            if power_flag {
                definitions.insert(POWER_FLAG_LIB_ID.to_string(), power_flag_definition());
            }
        }
        Ok(Sexpr::node("lib_symbols", definitions.into_values().collect()))
    }

    fn lib_id(&self, inst: &PartInstance) -> String {
        match &self.options.symbol_mode {
            SymbolMode::Embed => inst.symbol.lib_id.clone(),
            SymbolMode::Reference { library } => format!("{library}:{}", inst.symbol.name),
        }
    }

    fn wire(&self, start: Point, end: Point, key: &str) -> Sexpr {
        Sexpr::node(
            "wire",
            vec![
                Sexpr::node("pts", vec![xy(start), xy(end)]),
                Sexpr::node(
                    "stroke",
                    vec![
                        Sexpr::node("width", vec![Sexpr::symbol("0")]),
                        Sexpr::node("type", vec![Sexpr::symbol("default")]),
                    ],
                ),
                self.uuids.node(key),
            ],
        )
    }

    fn label(&self, text: &str, position: Point, rotation: u16, justify: &str, key: &str) -> Sexpr {
        let mut items = Vec::new();
        match self.options.label_style {
            LabelStyle::Local => {
                items.push(Sexpr::symbol("label"));
                items.push(Sexpr::string(text));
            }
            LabelStyle::Global => {
                items.push(Sexpr::symbol("global_label"));
                items.push(Sexpr::string(text));
                items.push(Sexpr::node("shape", vec![Sexpr::symbol("bidirectional")]));
            }
        }
        items.push(at(position, Some(rotation)));
        items.push(Sexpr::node("fields_autoplaced", vec![]));
        items.push(match self.options.label_style {
            LabelStyle::Local => effects(&[justify, "bottom"], false, None),
            LabelStyle::Global => effects(&[justify], false, None),
        });
        items.push(self.uuids.node(key));
        Sexpr::List(items)
    }

    /// The `number`th PWR_FLAG, pin at `anchor` and flag drawn above it.
    fn power_flag(&self, number: usize, anchor: Point, root: &str) -> Sexpr {
        let reference = format!("#FLG{number:02}");
        Sexpr::node(
            "symbol",
            vec![
                Sexpr::node("lib_id", vec![Sexpr::string(POWER_FLAG_LIB_ID)]),
                at(anchor, Some(0)),
                Sexpr::node("unit", vec![Sexpr::symbol("1")]),
                Sexpr::node("exclude_from_sim", vec![Sexpr::yes_no(false)]),
                Sexpr::node("in_bom", vec![Sexpr::yes_no(false)]),
                Sexpr::node("on_board", vec![Sexpr::yes_no(true)]),
                Sexpr::node("dnp", vec![Sexpr::yes_no(false)]),
                Sexpr::node("fields_autoplaced", vec![]),
                self.uuids.node(&format!("power_flag/{reference}")),
                property("Reference", &reference, anchor.offset(0.0, -1.905), true),
                property("Value", "PWR_FLAG", anchor.offset(0.0, -3.81), false),
                property("Footprint", "", anchor, true),
                property("Datasheet", "~", anchor, true),
                Sexpr::node(
                    "pin",
                    vec![
                        Sexpr::string("1"),
                        self.uuids.node(&format!("power_flag/{reference}/pin")),
                    ],
                ),
                self.instances(&reference, root),
            ],
        )
    }

    fn instances(&self, reference: &str, root: &str) -> Sexpr {
        Sexpr::node(
            "instances",
            vec![Sexpr::node(
                "project",
                vec![
                    Sexpr::string(self.options.project.clone()),
                    Sexpr::node(
                        "path",
                        vec![
                            Sexpr::string(format!("/{root}")),
                            Sexpr::node("reference", vec![Sexpr::string(reference)]),
                            Sexpr::node("unit", vec![Sexpr::symbol("1")]),
                        ],
                    ),
                ],
            )],
        )
    }

    fn fallback_notes(&self, routing: &Routing) -> Vec<Sexpr> {
        let mut notes = Vec::new();
        for net in &routing.nets {
            for outcome in &net.outcomes {
                let RoutingOutcome::Fallback { from, to, path } = outcome else {
                    continue;
                };
                let Some(anchor) = path.get(path.len() / 2) else {
                    continue;
                };
                notes.push(Sexpr::node(
                    "text",
                    vec![
                        Sexpr::string(format!("routing fallback: {} {from} -> {to}", net.net)),
                        Sexpr::node("exclude_from_sim", vec![Sexpr::yes_no(false)]),
                        at(anchor.offset(0.0, -FONT_SIZE), Some(0)),
                        effects(&["left", "bottom"], false, Some(FALLBACK_COLOR)),
                        self.uuids
                            .node(&format!("fallback/{}/{from}/{to}", net.net)),
                    ],
                ));
            }
        }
        notes
    }

    fn symbol(&self, inst: &PartInstance, root: &str) -> Sexpr {
        let p = inst.position();
        let body = inst.body_rect();
        let mut items = vec![
            Sexpr::symbol("symbol"),
            Sexpr::node("lib_id", vec![Sexpr::string(self.lib_id(inst))]),
            at(p, Some(inst.transform.orientation.degrees())),
        ];
        if let Some(mirror) = inst.transform.mirror {
            let axis = match mirror {
                Mirror::X => "x",
                Mirror::Y => "y",
            };
            items.push(Sexpr::node("mirror", vec![Sexpr::symbol(axis)]));
        }
        items.extend([
            Sexpr::node("unit", vec![Sexpr::symbol("1")]),
            Sexpr::node("exclude_from_sim", vec![Sexpr::yes_no(false)]),
            Sexpr::node("in_bom", vec![Sexpr::yes_no(inst.symbol.in_bom)]),
            Sexpr::node("on_board", vec![Sexpr::yes_no(inst.symbol.on_board)]),
            Sexpr::node("dnp", vec![Sexpr::yes_no(false)]),
            Sexpr::node("fields_autoplaced", vec![]),
            self.uuids.node(&format!("symbol/{}", inst.designator)),
        ]);

        items.push(property(
            "Reference",
            &inst.designator,
            Point::new(p.x, body.min.y - FONT_SIZE),
            false,
        ));
        items.push(property(
            "Value",
            &inst.value,
            Point::new(p.x, body.max.y + FONT_SIZE),
            false,
        ));
        let footprint = inst
            .footprint
            .as_deref()
            .map(|fp| format_footprint(fp).0)
            .unwrap_or_default();
        items.push(property("Footprint", &footprint, p, true));
        items.push(property(
            "Datasheet",
            inst.datasheet.as_deref().unwrap_or("~"),
            p,
            true,
        ));
        if let Some(lcsc) = &inst.part_source {
            items.push(property("LCSC", lcsc, p, true));
        }

        let mut seen = HashSet::new();
        for pin in inst.pins() {
            if !seen.insert(pin.number.as_str()) {
                continue;
            }
            items.push(Sexpr::node(
                "pin",
                vec![
                    Sexpr::string(pin.number.clone()),
                    self.uuids
                        .node(&format!("pin/{}/{}", inst.designator, pin.number)),
                ],
            ));
        }

        items.push(self.instances(&inst.designator, root));
        Sexpr::List(items)
    }
}

/// Left end of the PWR_FLAG row, on the grid above the parts.
fn flag_row(layout: &Layout) -> Point {
    let y = snap_to_grid(layout.extents.min.y - FLAG_RISE, GRID).max(FLAG_TOP);
    Point::new(snap_to_grid(layout.extents.min.x, GRID), y).canonical()
}

/// KiCad's standard `power:PWR_FLAG`: a zero-length power output pin under
/// a small diamond.
fn power_flag_definition() -> Sexpr {
    let font = || Sexpr::node("font", vec![size()]);
    let hidden = || Sexpr::node("effects", vec![font(), Sexpr::symbol("hide")]);
    let field = |key: &str, value: &str, y: f64, hide: bool| {
        Sexpr::node(
            "property",
            vec![
                Sexpr::string(key),
                Sexpr::string(value),
                at(Point::new(0.0, y), Some(0)),
                if hide {
                    hidden()
                } else {
                    Sexpr::node("effects", vec![font()])
                },
            ],
        )
    };
    let pts = [(0.0, 0.0), (0.0, 1.27), (-1.016, 1.905), (0.0, 2.54), (1.016, 1.905), (0.0, 1.27)]
        .into_iter()
        .map(|(x, y)| xy(Point::new(x, y)))
        .collect();

    Sexpr::node(
        "symbol",
        vec![
            Sexpr::string(POWER_FLAG_LIB_ID),
            Sexpr::node("power", vec![]),
            Sexpr::node("pin_numbers", vec![Sexpr::symbol("hide")]),
            Sexpr::node(
                "pin_names",
                vec![
                    Sexpr::node("offset", vec![Sexpr::symbol("0")]),
                    Sexpr::symbol("hide"),
                ],
            ),
            Sexpr::node("exclude_from_sim", vec![Sexpr::yes_no(false)]),
            Sexpr::node("in_bom", vec![Sexpr::yes_no(false)]),
            Sexpr::node("on_board", vec![Sexpr::yes_no(true)]),
            field("Reference", "#FLG", 1.905, true),
            field("Value", "PWR_FLAG", 3.81, false),
            field("Footprint", "", 0.0, true),
            field("Datasheet", "~", 0.0, true),
            field(
                "Description",
                "Special symbol for telling ERC where power comes from",
                0.0,
                true,
            ),
            Sexpr::node(
                "symbol",
                vec![
                    Sexpr::string("PWR_FLAG_0_0"),
                    Sexpr::node(
                        "pin",
                        vec![
                            Sexpr::symbol("power_out"),
                            Sexpr::symbol("line"),
                            at(Point::new(0.0, 0.0), Some(90)),
                            Sexpr::node("length", vec![Sexpr::symbol("0")]),
                            Sexpr::node(
                                "name",
                                vec![Sexpr::string("pwr"), Sexpr::node("effects", vec![font()])],
                            ),
                            Sexpr::node(
                                "number",
                                vec![Sexpr::string("1"), Sexpr::node("effects", vec![font()])],
                            ),
                        ],
                    ),
                ],
            ),
            Sexpr::node(
                "symbol",
                vec![
                    Sexpr::string("PWR_FLAG_0_1"),
                    Sexpr::node(
                        "polyline",
                        vec![
                            Sexpr::node("pts", pts),
                            Sexpr::node(
                                "stroke",
                                vec![
                                    Sexpr::node("width", vec![Sexpr::symbol("0")]),
                                    Sexpr::node("type", vec![Sexpr::symbol("default")]),
                                ],
                            ),
                            Sexpr::node("fill", vec![Sexpr::node("type", vec![Sexpr::symbol("none")])]),
                        ],
                    ),
                ],
            ),
        ],
    )
}

fn size() -> Sexpr {
    Sexpr::node("size", vec![Sexpr::number(FONT_SIZE), Sexpr::number(FONT_SIZE)])
}

fn at(p: Point, angle: Option<u16>) -> Sexpr {
    let mut items = vec![Sexpr::number(p.x), Sexpr::number(p.y)];
    if let Some(angle) = angle {
        items.push(Sexpr::symbol(angle.to_string()));
    }
    Sexpr::node("at", items)
}

fn xy(p: Point) -> Sexpr {
    Sexpr::node("xy", vec![Sexpr::number(p.x), Sexpr::number(p.y)])
}

fn effects(justify: &[&str], hide: bool, color: Option<[&str; 4]>) -> Sexpr {
    let mut font = vec![Sexpr::node(
        "size",
        vec![Sexpr::number(FONT_SIZE), Sexpr::number(FONT_SIZE)],
    )];
    if let Some(color) = color {
        font.push(Sexpr::node("color", color.map(Sexpr::symbol).to_vec()));
    }
    let mut items = vec![Sexpr::node("font", font)];
    if !justify.is_empty() {
        items.push(Sexpr::node(
            "justify",
            justify.iter().map(|j| Sexpr::symbol(*j)).collect(),
        ));
    }
    if hide {
        items.push(Sexpr::symbol("hide"));
    }
    Sexpr::node("effects", items)
}

fn property(key: &str, value: &str, position: Point, hide: bool) -> Sexpr {
    Sexpr::node(
        "property",
        vec![
            Sexpr::string(key),
            Sexpr::string(value),
            at(position, Some(0)),
            effects(&[], hide, None),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_depend_on_title_and_key() {
        let a = Uuids::new("Board");
        assert_eq!(a.node("wire/0"), Uuids::new("Board").node("wire/0"));
        assert_ne!(a.node("wire/0"), a.node("wire/1"));
        assert_ne!(a.root(), Uuids::new("Other").root());
    }

    #[test]
    fn reference_mode_rejects_bad_library_names() {
        for library in ["", "a:b"] {
            let options = ExportOptions {
                symbol_mode: SymbolMode::Reference {
                    library: library.to_string(),
                },
                ..Default::default()
            };
            assert!(matches!(
                SchematicConverter::new(&options),
                Err(ExportError::InvalidLibraryName(_))
            ));
        }
    }

    #[test]
    fn long_names_shorten_without_colliding() {
        let names = ["GND", "I2C_SDA_MAIN", "I2C_SDA_MAIN_B", "I2C_SDA_MA", "USB_DPLUS"];
        let map = shorten_label_names(names, 10);
        assert_eq!(map["GND"], "GND");
        assert_eq!(map["USB_DPLUS"], "USB_DPLUS");
        // The short name that already fits keeps its text.
        assert_eq!(map["I2C_SDA_MA"], "I2C_SDA_MA");
        assert_eq!(map["I2C_SDA_MAIN"], "I2C_SDA_01");
        assert_eq!(map["I2C_SDA_MAIN_B"], "I2C_SDA_02");

        let shortened: HashSet<&String> = map.values().collect();
        assert_eq!(shortened.len(), names.len());
        assert!(map.values().all(|v| v.chars().count() <= 10));
    }

    #[test]
    fn power_flag_definition_is_a_power_symbol() {
        let flag = power_flag_definition();
        assert_eq!(flag.atom_at(1), Some(POWER_FLAG_LIB_ID));
        assert!(flag.find("power").is_some());
        let pin = flag
            .find_all("symbol")
            .find_map(|unit| unit.find("pin"))
            .unwrap();
        assert_eq!(pin.atom_at(1), Some("power_out"));
        assert_eq!(pin.find("length").and_then(|l| l.atom_at(1)), Some("0"));
        let text = format_sexpr(&flag, 0);
        assert!(text.contains("(xy -1.016 1.905)"), "{text}");
    }

    #[test]
    fn hidden_properties_carry_the_hide_flag() {
        let text = format_sexpr(
            &property("Footprint", "R_0603", Point::new(1.0, 2.5), true),
            0,
        );
        assert!(text.contains("(at 1 2.5 0)"), "{text}");
        assert!(text.contains("hide"), "{text}");
        assert!(!format_sexpr(&property("Value", "10k", Point::new(0.0, 0.0), false), 0)
            .contains("hide"));
    }
}
