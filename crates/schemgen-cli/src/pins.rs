use anyhow::{Context, Result};
use clap::Args;
use schemgen_netlist::{build_instances, resolve_pin_model, Diagnostics};
use std::path::PathBuf;

use crate::inputs::DesignArgs;
use crate::ui::{icons, Colorize, Style, StyledText};

#[derive(Args, Debug, Clone)]
#[command(about = "Resolve every pin of a design to its label and write the pin model as JSON")]
pub struct PinsArgs {
    #[command(flatten)]
    pub input: DesignArgs,

    /// Where to write the pin model (stdout when omitted)
    #[arg(short, long, value_name = "pin_model.json")]
    pub output: Option<PathBuf>,
}

pub fn execute(args: PinsArgs) -> Result<()> {
    let (design, libraries) = args.input.load()?;
    let mut diagnostics = Diagnostics::default();
    design.validate(&mut diagnostics);
    let instances = build_instances(&design, &libraries.catalog)?;
    let model = resolve_pin_model(&design, &instances, &mut diagnostics)
        .with_context(|| format!("Failed to resolve {}", args.input.design.display()))?;
    let json = model
        .to_json(&instances)
        .context("Failed to serialize pin model")?;

    let Some(output) = &args.output else {
        println!("{json}");
        return Ok(());
    };
    std::fs::write(output, json + "\n")
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let stats = model.statistics();
    println!(
        "{} {} ({} pins: {} connected, {} unconnected, {} no-connect)",
        icons::success(),
        output.display().to_string().with_style(Style::Green).bold(),
        stats.total_pins,
        stats.connected_pins,
        stats.unconnected_pins,
        stats.no_connect_pins
    );
    for warning in diagnostics.warnings() {
        println!("  {} {warning}", icons::warning());
    }
    Ok(())
}
