use schemgen_eda::{KicadSymbolLibrary, SymbolCatalog};
use schemgen_engine::{
    on_segment, place, route, Justify, Layout, Paper, PlacerConfig, RouterConfig, Routing, RoutingOutcome,
    SkipReason,
};
use schemgen_netlist::geometry::{Point, Rect};
use schemgen_netlist::{
    build_instances, resolve_pin_model, Design, Diagnostics, PartInstance, PinModel, Warning,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

const BOARD: &str = r#"
title: Sensor node
parts:
  - { id: mcu, symbol: MCU, category: ic }
  - { id: ldo, lcsc: C6186, category: power }
  - { id: header, symbol: Conn_01x04, category: connector }
  - { id: r_sda, symbol: R, value: 4k7, belongs_to: mcu, category: passive }
  - { id: r_scl, symbol: R, value: 4k7, belongs_to: mcu, category: passive }
  - { id: c_mcu, symbol: C_100n, quantity: 3, belongs_to: mcu, category: decoupling }
  - { id: c_ldo, symbol: C, value: 1u, belongs_to: ldo, category: bypass }
nets:
  GND: [mcu.GND, ldo.GND, c_mcu.2, c_ldo.2, header.Pin_4]
  "3V3": [ldo.VOUT, mcu.VDD, c_mcu.1, r_sda.1, r_scl.1]
  VBUS: [header.Pin_1, ldo.VIN, c_ldo.1]
  SDA: [mcu.SDA, r_sda.2, header.Pin_2]
  SCL: [mcu.SCL, r_scl.2, header.Pin_3]
  EN: [ldo.EN, mcu.EN]
no_connect:
  - { component: mcu, pin: IO1 }
"#;

fn catalog() -> SymbolCatalog {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/resources/Demo.kicad_sym");
    SymbolCatalog::new().with_library("Demo", KicadSymbolLibrary::from_file(&path).unwrap())
}

fn resolve(yaml: &str, catalog: &SymbolCatalog) -> (Vec<PartInstance>, PinModel) {
    let design: Design = serde_yaml::from_str(yaml).unwrap();
    let instances = build_instances(&design, catalog).unwrap();
    let model = resolve_pin_model(&design, &instances, &mut Diagnostics::default()).unwrap();
    (instances, model)
}

fn board(config: &RouterConfig) -> (Layout, PinModel, Routing, Diagnostics) {
    let (instances, model) = resolve(BOARD, &catalog());
    let mut diagnostics = Diagnostics::default();
    let layout = place(instances, &model, &PlacerConfig::default(), &mut diagnostics);
    let routing = route(&layout, &model, config, &mut diagnostics);
    (layout, model, routing, diagnostics)
}

fn pin_position(layout: &Layout, designator: &str, number: &str) -> Point {
    let inst = layout.instance(designator).unwrap();
    inst.pin_position(inst.symbol.pin(number).unwrap())
}

/// Connected groups of wire end points, keyed on 0.01 mm.
fn wire_groups(routing: &Routing, net: &str) -> impl Fn(Point) -> Option<usize> {
    let key = |p: Point| ((p.x * 100.0).round() as i64, (p.y * 100.0).round() as i64);
    let mut parent: HashMap<(i64, i64), (i64, i64)> = HashMap::new();
    fn find(parent: &mut HashMap<(i64, i64), (i64, i64)>, k: (i64, i64)) -> (i64, i64) {
        let p = *parent.entry(k).or_insert(k);
        if p == k {
            k
        } else {
            let root = find(parent, p);
            parent.insert(k, root);
            root
        }
    }
    for wire in routing.wires_of(net) {
        let (a, b) = (find(&mut parent, key(wire.start)), find(&mut parent, key(wire.end)));
        parent.insert(a, b);
    }
    let mut roots: HashMap<(i64, i64), usize> = HashMap::new();
    let keys: Vec<_> = parent.keys().copied().collect();
    let mut group_of = HashMap::new();
    for k in keys {
        let root = find(&mut parent, k);
        let next = roots.len();
        group_of.insert(k, *roots.entry(root).or_insert(next));
    }
    move |p: Point| group_of.get(&key(p)).copied()
}

fn body_overlaps(layout: &Layout) -> Vec<(String, String)> {
    let mut overlaps = Vec::new();
    for (i, a) in layout.instances.iter().enumerate() {
        for b in &layout.instances[i + 1..] {
            if a.body_rect().intersects(&b.body_rect()) {
                overlaps.push((a.designator.clone(), b.designator.clone()));
            }
        }
    }
    overlaps
}

#[test]
fn rotated_pin_label_scenario() {
    let library = KicadSymbolLibrary::from_string(
        r#"(kicad_symbol_lib (version 20231120) (generator test)
          (symbol "Sensor" (in_bom yes) (on_board yes)
            (property "Reference" "U" (at 0 0 0))
            (symbol "Sensor_0_1" (rectangle (start -5 7) (end 5 -7)))
            (symbol "Sensor_1_1"
              (pin bidirectional line (at 10 5 180) (length 5) (name "SDA") (number "7")))))"#,
    )
    .unwrap();
    let catalog = SymbolCatalog::new().with_library("T", library);
    let (mut instances, model) = resolve(
        "parts: [{id: sensor, symbol: 'T:Sensor', designators: [U3]}]",
        &catalog,
    );
    instances[0].transform.position = Point::new(100.0, 200.0);
    let layout = Layout {
        instances,
        extents: Rect::from_corners(Point::new(0.0, 0.0), Point::new(297.0, 210.0)),
        paper: Paper::A4,
        iterations: 0,
        converged: true,
    };

    let routing = route(&layout, &model, &RouterConfig::default(), &mut Diagnostics::default());
    assert_eq!(pin_position(&layout, "U3", "7"), Point::new(110.0, 195.0));
    let label = &routing.labels[0];
    assert_eq!(label.text, "U3_7");
    assert_eq!(label.position, Point::new(112.0, 195.0));
    assert_eq!(label.rotation, 0);
    assert_eq!(label.justify, Justify::Left);
    assert!(routing.wires.is_empty());
}

#[test]
fn placement_is_legal_and_deterministic() {
    let (layout, _, _, _) = board(&RouterConfig::default());
    let (again, _, _, _) = board(&RouterConfig::default());

    assert!(body_overlaps(&layout).is_empty(), "{:?}", body_overlaps(&layout));
    let positions =
        |l: &Layout| -> Vec<Point> { l.instances.iter().map(|i| i.position()).collect() };
    assert_eq!(positions(&layout), positions(&again));

    for inst in &layout.instances {
        let p = inst.position();
        for v in [p.x, p.y] {
            let steps = v / 2.54;
            assert!((steps - steps.round()).abs() < 1e-6, "{} at {p}", inst.designator);
        }
        assert!(p.x >= 25.4 && p.y >= 25.4, "{} at {p}", inst.designator);
    }

    let (w, h) = layout.paper.size();
    assert!(layout.extents.max.x <= w && layout.extents.max.y <= h);
}

#[test]
fn decoupling_parts_sit_below_the_main_layout() {
    let (layout, _, _, _) = board(&RouterConfig::default());
    let (decoupling, main): (Vec<_>, Vec<_>) = layout
        .instances
        .iter()
        .partition(|i| i.category.is_decoupling());
    assert_eq!(decoupling.len(), 4);

    let main_bottom = main.iter().map(|i| i.body_rect().max.y).fold(f64::MIN, f64::max);
    for cap in &decoupling {
        assert!(cap.body_rect().min.y > main_bottom, "{} overlaps main area", cap.designator);
    }
    // Grouped by owner: the LDO's bypass cap comes after the MCU's three.
    let mut reading_order: Vec<_> = decoupling
        .iter()
        .map(|c| (c.position().y, c.position().x, c.designator.as_str()))
        .collect();
    reading_order.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(reading_order.last().map(|c| c.2), Some("C4"));
}

#[test]
fn small_nets_are_wired_and_large_nets_labeled() {
    let (layout, model, routing, _) = board(&RouterConfig::default());

    for net in ["SDA", "SCL", "VBUS", "EN"] {
        let group = wire_groups(&routing, net);
        let members = model.members(net);
        assert!(members.len() <= 3);
        let groups: Vec<_> = members
            .iter()
            .map(|m| group(pin_position(&layout, &m.designator, &m.pin)))
            .collect();
        assert!(groups.iter().all(|g| g.is_some() && *g == groups[0]), "{net}: {groups:?}");
        assert_eq!(routing.labels_of(net).count(), members.len());
    }

    for net in ["GND", "3V3"] {
        assert_eq!(routing.wires_of(net).count(), 0, "{net}");
        assert_eq!(routing.labels_of(net).count(), model.fan_out(net));
        assert_eq!(
            routing.net(net).unwrap().outcomes,
            vec![RoutingOutcome::Skipped(SkipReason::HighFanout {
                members: model.fan_out(net)
            })]
        );
    }
    let gnd_leads = routing.leads.iter().filter(|l| l.net == "GND").count();
    assert_eq!(gnd_leads, model.fan_out("GND"));
}

#[test]
fn every_label_sits_on_a_wire_of_its_net() {
    let (_, _, routing, _) = board(&RouterConfig::default());
    for label in &routing.labels {
        let attached = routing
            .wires
            .iter()
            .chain(&routing.leads)
            .filter(|w| w.net == label.text)
            .any(|w| on_segment(label.position, w.start, w.end));
        assert!(attached, "{} at {} dangles", label.text, label.position);
    }
}

#[test]
fn routed_paths_stay_off_part_bodies() {
    let (layout, _, routing, _) = board(&RouterConfig::default());
    for outcome in routing.nets.iter().flat_map(|n| &n.outcomes) {
        let RoutingOutcome::Routed { path, from, to } = outcome else {
            continue;
        };
        for pair in path.windows(2) {
            assert!(
                pair[0].x == pair[1].x || pair[0].y == pair[1].y,
                "{from}->{to}: diagonal segment"
            );
            let segment = Rect::from_corners(pair[0], pair[1]);
            for inst in &layout.instances {
                assert!(
                    !segment.intersects(&inst.body_rect()),
                    "{from}->{to} crosses {}",
                    inst.designator
                );
            }
        }
    }
}

#[test]
fn every_pin_is_labeled_or_flagged() {
    let (layout, _, routing, _) = board(&RouterConfig::default());
    let total: usize = layout.instances.iter().map(|i| i.pins().len()).sum();
    assert_eq!(routing.labels.len() + routing.no_connects.len(), total);

    let mut flagged: Vec<String> = routing.no_connects.iter().map(|f| f.pin.to_string()).collect();
    flagged.sort();
    // IO1 is declared no-connect, pin 11 is a no-connect pin type.
    assert_eq!(flagged, vec!["U1.11", "U1.4"]);
}

#[test]
fn exhausted_search_falls_back() {
    let config = RouterConfig {
        expansion_budget: 0,
        ..RouterConfig::default()
    };
    let (layout, model, routing, diagnostics) = board(&config);

    let fallbacks = routing.fallbacks().count();
    assert!(fallbacks > 0);
    let warned = diagnostics
        .warnings()
        .iter()
        .filter(|w| matches!(w, Warning::RoutingFallback { .. }))
        .count();
    assert_eq!(warned, fallbacks);

    // Still electrically complete.
    let group = wire_groups(&routing, "EN");
    let ends: Vec<_> = model
        .members("EN")
        .iter()
        .map(|m| group(pin_position(&layout, &m.designator, &m.pin)))
        .collect();
    assert!(ends[0].is_some() && ends[0] == ends[1]);
}

#[test]
fn fallback_wires_report_every_net_they_touch() {
    let config = RouterConfig {
        expansion_budget: 0,
        ..RouterConfig::default()
    };
    let (_, _, routing, diagnostics) = board(&config);
    assert!(routing.fallbacks().count() > 0);

    let mut reported: HashSet<(String, String)> = HashSet::new();
    for warning in diagnostics.warnings() {
        if let Warning::RoutingFallback { net, touches, .. } = warning {
            for other in touches {
                reported.insert((net.clone(), other.clone()));
                reported.insert((other.clone(), net.clone()));
            }
        }
    }

    let segments: Vec<_> = routing.wires.iter().chain(&routing.leads).collect();
    let mut points: Vec<(String, Point)> = Vec::new();
    for wire in &segments {
        points.push((wire.net.clone(), wire.start));
        points.push((wire.net.clone(), wire.end));
    }
    for label in &routing.labels {
        points.push((label.text.clone(), label.pin_position));
        points.push((label.text.clone(), label.position));
    }
    for flag in &routing.no_connects {
        points.push((flag.pin.to_string(), flag.position));
    }

    for (net, path) in routing.fallbacks() {
        for pair in path.windows(2) {
            for (name, p) in points.iter().filter(|(name, _)| name != net) {
                if on_segment(*p, pair[0], pair[1]) {
                    let key = (net.to_string(), name.clone());
                    assert!(reported.contains(&key), "{net} runs over {name} at {p}");
                }
            }
        }
        for vertex in path {
            for wire in segments.iter().filter(|w| w.net != net) {
                if on_segment(*vertex, wire.start, wire.end) {
                    let key = (net.to_string(), wire.net.clone());
                    assert!(reported.contains(&key), "{net} ends on {} at {vertex}", wire.net);
                }
            }
        }
    }
}

#[test]
fn label_leads_attach_label_only_pins() {
    let (_, _, routing, _) = board(&RouterConfig::default());
    assert!(!routing.leads.is_empty());
    for lead in &routing.leads {
        let label = routing
            .labels
            .iter()
            .find(|l| l.pin_position == lead.start)
            .unwrap();
        assert_eq!(label.position, lead.end);
        assert_eq!(label.text, lead.net);
    }
    assert_eq!(routing.wires_of("GND").count(), 0);

    let config = RouterConfig {
        label_leads: false,
        ..RouterConfig::default()
    };
    let (_, _, routing, _) = board(&config);
    assert!(routing.leads.is_empty());
}

#[test]
fn config_sections_parse_with_defaults() {
    let placer: PlacerConfig = toml::from_str("grid = 1.27\nmax_iterations = 50").unwrap();
    assert_eq!(placer.grid, 1.27);
    assert_eq!(placer.max_iterations, 50);
    assert_eq!(placer.clearance, PlacerConfig::default().clearance);

    let router: RouterConfig = toml::from_str("fanout_limit = 5").unwrap();
    assert_eq!(router.fanout_limit, 5);
    assert!(toml::from_str::<RouterConfig>("fan_out = 5").is_err());
}

#[test]
fn svg_preview_is_written() {
    let (layout, _, routing, _) = board(&RouterConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preview.svg");
    schemgen_engine::svg_generator::run(&layout, &routing, &path).unwrap();

    let svg = std::fs::read_to_string(&path).unwrap();
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("U1 MCU"));
    assert!(svg.contains("<line"));
    assert!(svg.contains("SDA"));
}
