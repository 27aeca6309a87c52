use anyhow::{Context, Result};
use clap::Args;
use schemgen_eda::KicadSymbolLibrary;
use std::path::PathBuf;

use crate::ui::{icons, Colorize, Style, StyledText};

#[derive(Args, Debug, Clone)]
#[command(about = "List the symbols of a library, or the pins of one symbol")]
pub struct SymbolsArgs {
    /// Symbol library to inspect
    #[arg(value_name = "LIB.kicad_sym", value_hint = clap::ValueHint::FilePath)]
    pub library: PathBuf,

    /// Show the pin table of this symbol
    #[arg(short, long, value_name = "NAME")]
    pub symbol: Option<String>,
}

pub fn execute(args: SymbolsArgs) -> Result<()> {
    let library = KicadSymbolLibrary::from_file(&args.library)
        .with_context(|| format!("Failed to load symbol library {}", args.library.display()))?;

    if let Some(name) = &args.symbol {
        let symbol = library.get_symbol(name)?;
        println!(
            "{} ({} pins)",
            symbol.name.as_str().with_style(Style::Cyan).bold(),
            symbol.pins.len()
        );
        for pin in &symbol.pins {
            let hidden = if pin.hidden { " hidden" } else { "" };
            println!(
                "  {:>4}  {:<12} {:>8.2} {:>8.2}  R{:<3} {}{hidden}",
                pin.number,
                pin.name,
                pin.x,
                pin.y,
                pin.rotation.degrees(),
                pin.electrical_type.as_str()
            );
        }
        return Ok(());
    }

    for symbol in library.symbols() {
        println!(
            "{:<24} {:<4} {} pins",
            symbol.name,
            symbol.reference_prefix().unwrap_or("?"),
            symbol.pins.len()
        );
    }
    for (name, reason) in library.malformed() {
        println!("{} {name}: {reason}", icons::warning());
    }
    Ok(())
}
