use assert_fs::prelude::*;
use schemgen_eda::{KicadSymbolLibrary, SymbolCatalog};
use schemgen_engine::{place, route, Layout, PlacerConfig, RouterConfig, Routing};
use schemgen_kicad_exporter::{
    power_nets, to_kicad_schematic, write_kicad_schematic, write_sidecars, ExportError,
    ExportOptions, LabelStyle, SymbolMode, POWER_FLAG_LIB_ID,
};
use schemgen_netlist::{build_instances, resolve_pin_model, Design, Diagnostics};
use schemgen_sexpr::Sexpr;
use std::collections::BTreeMap;
use std::path::PathBuf;

const BOARD: &str = r#"
title: Sensor node
parts:
  - { id: mcu, symbol: MCU }
  - { id: ldo, lcsc: C6186 }
  - { id: header, symbol: Conn_01x04, footprint: fp/Parts.pretty/HDR4.kicad_mod }
  - { id: r_sda, symbol: R, value: 4k7, belongs_to: mcu }
  - { id: c_mcu, symbol: C_100n, quantity: 2, belongs_to: mcu, category: decoupling }
nets:
  GND: [mcu.GND, ldo.GND, c_mcu.2, header.Pin_4]
  "3V3": [ldo.VOUT, mcu.VDD, c_mcu.1, r_sda.1]
  VBUS: [header.Pin_1, ldo.VIN]
  SDA: [mcu.SDA, r_sda.2, header.Pin_2]
no_connect:
  - { component: mcu, pin: IO1 }
"#;

fn library_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/resources/Demo.kicad_sym")
}

fn sheet(router: &RouterConfig) -> (Layout, Routing) {
    let _ = env_logger::builder().is_test(true).try_init();
    let catalog = SymbolCatalog::new().with_library(
        "Demo",
        KicadSymbolLibrary::from_file(&library_path()).unwrap(),
    );
    let design: Design = serde_yaml::from_str(BOARD).unwrap();
    let instances = build_instances(&design, &catalog).unwrap();
    let mut diagnostics = Diagnostics::default();
    let model = resolve_pin_model(&design, &instances, &mut diagnostics).unwrap();
    let layout = place(instances, &model, &PlacerConfig::default(), &mut diagnostics);
    let routing = route(&layout, &model, router, &mut diagnostics);
    (layout, routing)
}

fn options() -> ExportOptions {
    ExportOptions {
        title: "Sensor node".to_string(),
        date: Some("2024-05-01".to_string()),
        project: "sensor".to_string(),
        ..Default::default()
    }
}

fn export(options: &ExportOptions, router: &RouterConfig) -> (Layout, Routing, Sexpr) {
    let (layout, routing) = sheet(router);
    let text = to_kicad_schematic(&layout, &routing, options).unwrap();
    let parsed = schemgen_sexpr::parse(&text).unwrap();
    (layout, routing, parsed)
}

fn property<'a>(symbol: &'a Sexpr, key: &str) -> Option<&'a str> {
    symbol
        .find_all("property")
        .find(|p| p.atom_at(1) == Some(key))
        .and_then(|p| p.atom_at(2))
}

/// Placed parts, without the PWR_FLAG symbols.
fn parts(sch: &Sexpr) -> Vec<&Sexpr> {
    sch.find_all("symbol")
        .filter(|s| !property(s, "Reference").is_some_and(|r| r.starts_with('#')))
        .collect()
}

fn point(item: &Sexpr) -> (f64, f64) {
    let at = item.find("at").unwrap();
    (at.f64_at(1).unwrap(), at.f64_at(2).unwrap())
}

#[test]
fn schematic_has_header_and_title_block() {
    let (layout, _, sch) = export(&options(), &RouterConfig::default());

    assert!(sch.is_tagged("kicad_sch"));
    assert_eq!(sch.find("version").and_then(|v| v.atom_at(1)), Some("20231120"));
    assert_eq!(sch.find("generator").and_then(|v| v.atom_at(1)), Some("schemgen"));
    assert_eq!(
        sch.find("paper").and_then(|v| v.atom_at(1)),
        Some(layout.paper.as_str())
    );
    let title_block = sch.find("title_block").unwrap();
    assert_eq!(title_block.find("title").and_then(|t| t.atom_at(1)), Some("Sensor node"));
    assert_eq!(title_block.find("date").and_then(|t| t.atom_at(1)), Some("2024-05-01"));
    assert!(sch.find("sheet_instances").is_some());
}

#[test]
fn every_instance_is_emitted_with_its_properties() {
    let (layout, _, sch) = export(&options(), &RouterConfig::default());
    let symbols = parts(&sch);
    assert_eq!(symbols.len(), layout.instances.len());

    for (symbol, inst) in symbols.iter().zip(&layout.instances) {
        assert_eq!(property(symbol, "Reference"), Some(inst.designator.as_str()));
        assert_eq!(property(symbol, "Value"), Some(inst.value.as_str()));
        assert_eq!(
            symbol.find("lib_id").and_then(|l| l.atom_at(1)),
            Some(inst.symbol.lib_id.as_str())
        );
        let at = symbol.find("at").unwrap();
        assert!((at.f64_at(1).unwrap() - inst.position().x).abs() < 1e-4);
        assert!((at.f64_at(2).unwrap() - inst.position().y).abs() < 1e-4);
        assert_eq!(symbol.find_all("pin").count(), inst.pins().len());
        let path = symbol.find("instances").and_then(|i| i.find("project")).unwrap();
        assert_eq!(path.atom_at(1), Some("sensor"));
    }

    let ldo = symbols
        .iter()
        .find(|s| property(s, "Value") == Some("AMS1117-3.3"))
        .unwrap();
    assert_eq!(property(ldo, "LCSC"), Some("C6186"));
    assert_eq!(
        property(ldo, "Datasheet"),
        Some("http://www.advanced-monolithic.com/pdf/ds1117.pdf")
    );
    let header = symbols
        .iter()
        .find(|s| property(s, "Value") == Some("Conn_01x04"))
        .unwrap();
    assert_eq!(property(header, "Footprint"), Some("Parts:HDR4"));
}

#[test]
fn embedded_definitions_are_renamed_to_their_ids() {
    let (_, _, sch) = export(&options(), &RouterConfig::default());
    let lib_symbols = sch.find("lib_symbols").unwrap();
    let names: Vec<&str> = lib_symbols
        .find_all("symbol")
        .filter_map(|s| s.atom_at(1))
        .collect();
    assert_eq!(
        names,
        [
            "Demo:C_100n",
            "Demo:Conn_01x04",
            "Demo:LDO_3V3",
            "Demo:MCU",
            "Demo:R",
            POWER_FLAG_LIB_ID
        ]
    );

    // Derived symbols arrive flattened, with unit sections under their own name.
    let cap = lib_symbols.find_all("symbol").next().unwrap();
    assert!(cap.find("extends").is_none());
    let units: Vec<&str> = cap.find_all("symbol").filter_map(|s| s.atom_at(1)).collect();
    assert!(units.iter().all(|u| u.starts_with("C_100n_")), "{units:?}");
}

#[test]
fn reference_mode_leaves_definitions_out() {
    let options = ExportOptions {
        symbol_mode: SymbolMode::Reference {
            library: "Parts".to_string(),
        },
        ..options()
    };
    let (_, _, sch) = export(&options, &RouterConfig::default());
    assert_eq!(sch.find("lib_symbols").and_then(Sexpr::as_list).map(<[_]>::len), Some(1));
    for symbol in parts(&sch) {
        let lib_id = symbol.find("lib_id").and_then(|l| l.atom_at(1)).unwrap();
        assert!(lib_id.starts_with("Parts:"), "{lib_id}");
    }
}

#[test]
fn labels_flags_and_wires_match_the_routing() {
    let (layout, routing, sch) = export(&options(), &RouterConfig::default());
    let flags = power_nets(&layout, &routing).len();
    assert_eq!(sch.find_all("label").count(), routing.labels.len() + flags);
    assert_eq!(sch.find_all("global_label").count(), 0);
    assert_eq!(sch.find_all("no_connect").count(), routing.no_connects.len());
    assert_eq!(
        sch.find_all("wire").count(),
        routing.wires.len() + routing.leads.len() + flags
    );
    assert_eq!(sch.find_all("junction").count(), routing.junctions.len());

    let sda = sch
        .find_all("label")
        .find(|l| l.atom_at(1) == Some("SDA"))
        .unwrap();
    let justify = sda
        .find("effects")
        .and_then(|e| e.find("justify"))
        .and_then(|j| j.atom_at(1));
    assert!(matches!(justify, Some("left" | "right")));

    let global = ExportOptions {
        label_style: LabelStyle::Global,
        ..options()
    };
    let (_, routing, sch) = export(&global, &RouterConfig::default());
    assert_eq!(sch.find_all("global_label").count(), routing.labels.len() + flags);
    assert_eq!(sch.find_all("label").count(), 0);
}

#[test]
fn power_nets_get_a_flag_with_a_stub_and_label() {
    let (layout, routing, sch) = export(&options(), &RouterConfig::default());
    assert_eq!(power_nets(&layout, &routing), ["3V3", "GND", "VBUS"]);

    let flags: Vec<&Sexpr> = sch
        .find_all("symbol")
        .filter(|s| s.find("lib_id").and_then(|l| l.atom_at(1)) == Some(POWER_FLAG_LIB_ID))
        .collect();
    let references: Vec<&str> = flags.iter().filter_map(|f| property(f, "Reference")).collect();
    assert_eq!(references, ["#FLG01", "#FLG02", "#FLG03"]);

    let top = layout
        .instances
        .iter()
        .map(|i| i.body_rect().min.y)
        .fold(f64::MAX, f64::min);
    for (flag, net) in flags.iter().zip(["3V3", "GND", "VBUS"]) {
        assert_eq!(flag.find("in_bom").and_then(|b| b.atom_at(1)), Some("no"));
        let (x, y) = point(flag);
        assert!(y < top, "{net} flag at {y} is not above the parts");

        // A wire runs straight down from the pin to a label of the net.
        let stub: Vec<(f64, f64)> = sch
            .find_all("wire")
            .filter_map(|w| w.find("pts"))
            .map(|pts| {
                pts.find_all("xy")
                    .map(|p| (p.f64_at(1).unwrap(), p.f64_at(2).unwrap()))
                    .collect::<Vec<_>>()
            })
            .find(|ends| ends[0] == (x, y))
            .unwrap();
        assert_eq!(stub[1].0, x);
        assert!((stub[1].1 - y - 5.08).abs() < 1e-4);
        let label = sch
            .find_all("label")
            .find(|l| l.atom_at(1) == Some(net) && point(l) == stub[1])
            .unwrap();
        assert_eq!(label.find("at").and_then(|a| a.atom_at(3)), Some("270"));
    }

    let plain = ExportOptions {
        power_flags: false,
        ..options()
    };
    let (layout, _, sch) = export(&plain, &RouterConfig::default());
    assert_eq!(sch.find_all("symbol").count(), layout.instances.len());
    let lib_symbols = sch.find("lib_symbols").unwrap();
    assert!(lib_symbols.find_all("symbol").all(|s| s.atom_at(1) != Some(POWER_FLAG_LIB_ID)));
}

#[test]
fn long_label_text_is_shortened() {
    let short = ExportOptions {
        max_label_length: Some(3),
        ..options()
    };
    let (_, _, sch) = export(&short, &RouterConfig::default());
    let texts: Vec<&str> = sch.find_all("label").filter_map(|l| l.atom_at(1)).collect();
    assert!(texts.iter().all(|t| t.chars().count() <= 3), "{texts:?}");
    // Nets that fit keep their text.
    assert!(texts.contains(&"SDA") && texts.contains(&"GND") && texts.contains(&"3V3"));
    assert!(!texts.contains(&"VBUS"));
    assert!(texts.contains(&"VBU"));
}

#[test]
fn fallback_paths_are_annotated() {
    let starved = RouterConfig {
        expansion_budget: 0,
        ..RouterConfig::default()
    };
    let (_, routing, sch) = export(&options(), &starved);
    let fallbacks = routing.fallbacks().count();
    assert!(fallbacks > 0);
    let notes: Vec<&str> = sch
        .find_all("text")
        .filter_map(|t| t.atom_at(1))
        .filter(|t| t.starts_with("routing fallback"))
        .collect();
    assert_eq!(notes.len(), fallbacks);

    let quiet = ExportOptions {
        annotate_fallbacks: false,
        ..options()
    };
    let (_, _, sch) = export(&quiet, &starved);
    assert_eq!(sch.find_all("text").count(), 0);
}

#[test]
fn identical_inputs_give_identical_bytes() {
    let (layout, routing) = sheet(&RouterConfig::default());
    let first = to_kicad_schematic(&layout, &routing, &options()).unwrap();
    let (layout, routing) = sheet(&RouterConfig::default());
    let second = to_kicad_schematic(&layout, &routing, &options()).unwrap();
    assert_eq!(first, second);

    let renamed = ExportOptions {
        title: "Other".to_string(),
        ..options()
    };
    assert_ne!(first, to_kicad_schematic(&layout, &routing, &renamed).unwrap());
}

#[test]
fn failed_exports_write_nothing() {
    let (layout, routing) = sheet(&RouterConfig::default());
    let dir = assert_fs::TempDir::new().unwrap();
    let out = dir.child("board.kicad_sch");
    let bad = ExportOptions {
        symbol_mode: SymbolMode::Reference {
            library: String::new(),
        },
        ..options()
    };

    let err = write_kicad_schematic(out.path(), &layout, &routing, &bad).unwrap_err();
    assert!(matches!(err, ExportError::InvalidLibraryName(_)));
    assert!(!out.path().exists());

    write_kicad_schematic(out.path(), &layout, &routing, &options()).unwrap();
    assert!(std::fs::read_to_string(out.path()).unwrap().starts_with("(kicad_sch"));
}

#[test]
fn sidecars_register_libraries() -> anyhow::Result<()> {
    let (layout, _) = sheet(&RouterConfig::default());
    let dir = assert_fs::TempDir::new()?;
    dir.child("libs").create_dir_all()?;
    let lib = dir.child("libs/Demo.kicad_sym");
    lib.write_file(&library_path())?;

    let mut libraries = BTreeMap::new();
    libraries.insert("Demo".to_string(), lib.path().to_path_buf());
    let files = write_sidecars(dir.path(), "sensor", &libraries, &layout)?;

    assert_eq!(files.project, dir.path().join("sensor.kicad_pro"));
    let sym_table = std::fs::read_to_string(&files.sym_lib_table)?;
    assert!(
        sym_table.contains("(uri \"${KIPRJMOD}/libs/Demo.kicad_sym\")"),
        "{sym_table}"
    );
    let fp_table = files.fp_lib_table.expect("header footprint is a file path");
    let fp_table = std::fs::read_to_string(fp_table)?;
    assert!(fp_table.contains("(name \"Parts\")"), "{fp_table}");

    let project: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&files.project)?)?;
    assert_eq!(project["meta"]["filename"], "sensor.kicad_pro");
    Ok(())
}
