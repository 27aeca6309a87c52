use clap::{Parser, Subcommand};

mod config;
mod generate;
mod inputs;
mod pins;
mod symbols;
mod ui;

#[derive(Parser)]
#[command(name = "schemgen")]
#[command(about = "Readable KiCad schematics from parts, nets and symbol libraries", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place, label and route a design into a .kicad_sch file
    #[command(alias = "g")]
    Generate(generate::GenerateArgs),

    /// Write the resolved pin model as JSON
    #[command(alias = "p")]
    Pins(pins::PinsArgs),

    /// Inspect a symbol library
    #[command(alias = "s")]
    Symbols(symbols::SymbolsArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => generate::execute(args),
        Commands::Pins(args) => pins::execute(args),
        Commands::Symbols(args) => symbols::execute(args),
    }
}
