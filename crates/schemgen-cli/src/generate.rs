use anyhow::{Context, Result};
use clap::Args;
use schemgen_engine::{place, route, svg_generator, Layout, NetRoute, Paper, Routing};
use schemgen_kicad_exporter::{to_kicad_schematic, write_sidecars, ExportOptions, SymbolMode};
use schemgen_netlist::{
    build_instances, resolve_pin_model, Diagnostics, PinModelStats, Warning,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::inputs::DesignArgs;
use crate::ui::{icons, Colorize, Spinner, Style, StyledText};

#[derive(Args, Debug, Clone)]
#[command(about = "Place, label and route a design and write a KiCad schematic")]
pub struct GenerateArgs {
    #[command(flatten)]
    pub input: DesignArgs,

    /// Schematic to write (defaults to the design path with .kicad_sch)
    #[arg(short, long, value_name = "OUT.kicad_sch")]
    pub output: Option<PathBuf>,

    /// Settings file (defaults to schemgen.toml beside the design)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Reference symbols from this library instead of embedding them
    #[arg(long, value_name = "LIBNAME")]
    pub reference_symbols: Option<String>,

    /// Write the run report (statistics, warnings, routing outcomes) as JSON
    #[arg(long, value_name = "FILE.json")]
    pub report: Option<PathBuf>,

    /// Also write an SVG preview
    #[arg(long, value_name = "FILE.svg")]
    pub svg: Option<PathBuf>,

    /// Do not write sym-lib-table, fp-lib-table or the .kicad_pro file
    #[arg(long)]
    pub no_sidecars: bool,

    /// Title block title (defaults to the design title, then the file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Title block date (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,
}

/// Everything worth keeping from one run besides the schematic itself.
#[derive(Debug, Serialize)]
struct Report<'a> {
    title: &'a str,
    paper: Paper,
    iterations: usize,
    converged: bool,
    statistics: PinModelStats,
    warnings: &'a [Warning],
    nets: &'a [NetRoute],
}

pub fn execute(args: GenerateArgs) -> Result<()> {
    let design_path = &args.input.design;
    let file_name = design_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| design_path.display().to_string());
    let (config, config_path) = Config::discover(design_path, args.config.as_deref())?;
    if let Some(path) = &config_path {
        log::info!("settings from {}", path.display());
    }

    let spinner = Spinner::start(format!("{file_name}: Resolving pins"));
    let (design, libraries) = args.input.load()?;
    let mut diagnostics = Diagnostics::default();
    design.validate(&mut diagnostics);
    let model = build_instances(&design, &libraries.catalog)
        .and_then(|instances| {
            let model = resolve_pin_model(&design, &instances, &mut diagnostics)?;
            Ok((instances, model))
        })
        .with_context(|| format!("Failed to resolve {}", design_path.display()));
    let (instances, model) = match model {
        Ok(resolved) => resolved,
        Err(e) => {
            spinner.println(format!(
                "{} {}: Generation failed",
                icons::error(),
                file_name.with_style(Style::Red).bold()
            ));
            spinner.finish();
            return Err(e);
        }
    };

    spinner.set_message(format!("{file_name}: Placing {} parts", instances.len()));
    let layout = place(instances, &model, &config.placement, &mut diagnostics);

    spinner.set_message(format!("{file_name}: Routing"));
    let routing = route(&layout, &model, &config.routing, &mut diagnostics);

    spinner.set_message(format!("{file_name}: Writing schematic"));
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| design_path.with_extension("kicad_sch"));
    let project = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schematic".to_string());
    let title = args
        .title
        .clone()
        .or_else(|| design.title.clone())
        .unwrap_or_else(|| project.clone());
    let symbol_mode = match &args.reference_symbols {
        Some(library) => SymbolMode::Reference {
            library: library.clone(),
        },
        None => config.output.symbol_mode()?,
    };
    let options = ExportOptions {
        title: title.clone(),
        date: Some(
            args.date
                .clone()
                .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string()),
        ),
        project: project.clone(),
        paper: config.output.paper,
        symbol_mode,
        label_style: config.output.labels,
        annotate_fallbacks: config.output.annotate_fallbacks,
        power_flags: config.output.power_flags,
        max_label_length: config.output.max_label_length,
    };
    let schematic = to_kicad_schematic(&layout, &routing, &options)
        .with_context(|| format!("Failed to convert {}", design_path.display()))?;

    write_file(&output, &schematic)?;
    if let Some(svg) = &args.svg {
        svg_generator::run(&layout, &routing, svg)?;
    }
    if let Some(report_path) = &args.report {
        let report = Report {
            title: &title,
            paper: options.paper.unwrap_or(layout.paper),
            iterations: layout.iterations,
            converged: layout.converged,
            statistics: model.statistics(),
            warnings: diagnostics.warnings(),
            nets: &routing.nets,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        write_file(report_path, &json)?;
    }
    if config.output.sidecars && !args.no_sidecars {
        let project_dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        write_sidecars(project_dir, &project, &libraries.paths, &layout)
            .context("Failed to write project files")?;
    }
    spinner.finish();

    print_summary(&file_name, &output, &layout, &routing, &diagnostics);
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_summary(
    file_name: &str,
    output: &Path,
    layout: &Layout,
    routing: &Routing,
    diagnostics: &Diagnostics,
) {
    let (icon, style) = if diagnostics.is_empty() {
        (icons::success(), Style::Green)
    } else {
        (icons::warning(), Style::Yellow)
    };
    println!(
        "{icon} {} {} {} ({} parts on {}, {} wires, {} labels)",
        file_name.with_style(style).bold(),
        icons::arrow(),
        output.display(),
        layout.instances.len(),
        layout.paper,
        routing.wires.len(),
        routing.labels.len()
    );
    for warning in diagnostics.warnings() {
        println!("  {} {warning}", icons::warning());
    }
}
