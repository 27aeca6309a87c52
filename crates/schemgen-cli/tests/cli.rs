use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::Path;

const RESOURCES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/resources");

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    dir.copy_from(RESOURCES, &["*.kicad_sym", "*.yaml"]).unwrap();
    dir
}

fn schemgen(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("schemgen").unwrap();
    cmd.current_dir(dir).env("NO_COLOR", "1");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn generate_writes_schematic_report_and_sidecars() {
    let dir = workspace();
    let output = schemgen(dir.path())
        .args(["generate", "board.yaml", "-l", "Demo.kicad_sym"])
        .args(["--date", "2024-05-01", "--report", "out/report.json"])
        .args(["-o", "out/sensor.kicad_sch"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("sensor.kicad_sch"));

    let schematic = std::fs::read_to_string(dir.child("out/sensor.kicad_sch").path()).unwrap();
    assert!(schematic.starts_with("(kicad_sch"));
    assert!(schematic.contains("(title \"Sensor node\")"));
    assert!(schematic.contains("(date \"2024-05-01\")"));
    assert!(schematic.contains("\"Demo:MCU\""));
    assert!(schematic.contains("(lib_id \"power:PWR_FLAG\")"));
    assert!(schematic.contains("\"#FLG01\""));

    let table = std::fs::read_to_string(dir.child("out/sym-lib-table").path()).unwrap();
    assert!(table.contains("(name \"Demo\")"), "{table}");
    assert!(dir.child("out/sensor.kicad_pro").path().exists());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.child("out/report.json").path()).unwrap())
            .unwrap();
    assert_eq!(report["title"], "Sensor node");
    assert_eq!(report["statistics"]["parts"], 6);
    assert_eq!(report["statistics"]["no_connect_pins"], 1);
    assert!(report["nets"].as_array().unwrap().len() >= 4);
}

#[test]
fn generate_is_repeatable() {
    let dir = workspace();
    let run = |name: &str| {
        let output = schemgen(dir.path())
            .args(["generate", "board.yaml", "-l", "Demo.kicad_sym", "--no-sidecars"])
            .args(["--date", "2024-05-01", "-o", name])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", stderr(&output));
        std::fs::read(dir.child(name).path()).unwrap()
    };
    assert_eq!(run("run1/board.kicad_sch"), run("run2/board.kicad_sch"));
    assert!(!dir.child("run1/sym-lib-table").path().exists());
}

#[test]
fn unresolved_symbols_fail_without_output() {
    let dir = workspace();
    dir.child("broken.yaml")
        .write_str("parts:\n  - { id: u1, symbol: NoSuchPart }\n")
        .unwrap();
    let output = schemgen(dir.path())
        .args(["generate", "broken.yaml", "-l", "Demo.kicad_sym"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("NoSuchPart"), "{}", stderr(&output));
    assert!(!dir.child("broken.kicad_sch").path().exists());
    assert!(!dir.child("sym-lib-table").path().exists());
}

#[test]
fn bad_settings_are_rejected() {
    let dir = workspace();
    dir.child("schemgen.toml")
        .write_str("[routing]\nfanout = 4\n")
        .unwrap();
    let output = schemgen(dir.path())
        .args(["generate", "board.yaml", "-l", "Demo.kicad_sym"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("fanout"), "{}", stderr(&output));
    assert!(!dir.child("board.kicad_sch").path().exists());
}

#[test]
fn pins_prints_the_pin_model() {
    let dir = workspace();
    let output = schemgen(dir.path())
        .args(["pins", "board.yaml", "-l", "Demo.kicad_sym"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let model: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(model["statistics"]["parts"], 6);
    assert!(model["nets"]["SDA"].as_array().unwrap().len() == 3);
}

#[test]
fn symbols_lists_a_library_and_its_pins() {
    let dir = workspace();
    let output = schemgen(dir.path())
        .args(["symbols", "Demo.kicad_sym"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let listing = stdout(&output);
    assert!(listing.contains("MCU"));
    assert!(listing.contains("Conn_01x04"));

    let output = schemgen(dir.path())
        .args(["symbols", "Demo.kicad_sym", "--symbol", "MCU"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let pins = stdout(&output);
    assert!(pins.contains("SDA"));
    assert!(pins.contains("no_connect"));
}
