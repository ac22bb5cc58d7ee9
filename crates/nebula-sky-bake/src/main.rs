//! Offline bake of the precomputed atmosphere tables.
//!
//! Loads `config.ron`, applies command-line overrides, generates the lookup
//! tables on the CPU and writes tone-mapped previews plus a manifest.

mod bake;
mod manifest;
mod platform;
mod preview;

use clap::Parser;
use nebula_config::{CliArgs, Config};
use tracing::info;

use crate::bake::BakeError;
use crate::platform::PlatformDirs;

fn run(args: &CliArgs) -> Result<(), BakeError> {
    let dirs = PlatformDirs::resolve()?;
    dirs.create_dirs()?;

    let config_dir = args.config.clone().unwrap_or_else(|| dirs.config_dir.clone());
    let mut config = Config::load_or_create(&config_dir)?;
    config.apply_cli_overrides(args);

    let log_dir = config.debug.log_to_file.then_some(dirs.log_dir.as_path());
    nebula_log::init_logging(log_dir, cfg!(debug_assertions), Some(&config));
    info!(config = %config_dir.display(), "nebula-sky-bake starting");

    let output_dir = config
        .atmosphere
        .output_dir
        .clone()
        .unwrap_or_else(|| dirs.tables_dir());
    let outcome = bake::bake(&config.atmosphere, &output_dir, args.upload)?;

    println!("Baked {} tables ({})", outcome.manifest.tables.len(), outcome.manifest.variant);
    for table in &outcome.manifest.tables {
        println!(
            "  {:<22} {}x{}x{}  {}",
            table.kind, table.width, table.height, table.depth, table.preview
        );
    }
    println!("  manifest: {}", outcome.manifest_path.display());
    if let Some(uploaded) = outcome.uploaded {
        println!("  uploaded {uploaded} tables to the GPU");
    }
    Ok(())
}

fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(&args) {
        eprintln!("nebula-sky-bake: {e}");
        std::process::exit(1);
    }
}
