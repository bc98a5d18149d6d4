//! cityprep CLI — data preparation for urban-energy simulation.
//!
//! Attaches tabular attributes to CityGML building models, remaps use-type
//! codes, converts EPW weather files, and merges city-model documents.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
