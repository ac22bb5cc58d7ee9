//! Command-line argument parsing for the sky bake tool.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{Config, ScalarValue, TableResolution};

/// Luminance mode as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LuminanceArg {
    None,
    Approximate,
    Precomputed,
}

impl LuminanceArg {
    /// Overlay encoding of the mode (`luminance_type`).
    pub fn overlay_value(self) -> i64 {
        match self {
            LuminanceArg::None => 0,
            LuminanceArg::Approximate => 1,
            LuminanceArg::Precomputed => 2,
        }
    }
}

/// Sky bake command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula-sky-bake", about = "Precompute atmosphere lookup tables")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Lookup table size preset.
    #[arg(long, value_enum)]
    pub resolution: Option<TableResolution>,

    /// Luminance mode.
    #[arg(long, value_enum)]
    pub luminance: Option<LuminanceArg>,

    /// Disable ozone absorption.
    #[arg(long)]
    pub no_ozone: bool,

    /// Store single Mie scattering in its own table.
    #[arg(long)]
    pub separate_textures: bool,

    /// Use a flat solar spectrum instead of the measured one.
    #[arg(long)]
    pub constant_solar: bool,

    /// Output directory for previews and the manifest.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Upload the generated tables to a headless GPU device.
    #[arg(long)]
    pub upload: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(resolution) = args.resolution {
            self.atmosphere.table_resolution = resolution;
        }
        if let Some(ref output) = args.output {
            self.atmosphere.output_dir = Some(output.clone());
        }

        let overlay = &mut self.atmosphere.overlay;
        if let Some(luminance) = args.luminance {
            overlay.insert(
                "luminance_type".into(),
                ScalarValue::Int(luminance.overlay_value()),
            );
        }
        if args.no_ozone {
            overlay.insert("use_ozone".into(), ScalarValue::Bool(false));
        }
        if args.separate_textures {
            overlay.insert("use_combined_textures".into(), ScalarValue::Bool(false));
        }
        if args.constant_solar {
            overlay.insert(
                "use_constant_solar_spectrum".into(),
                ScalarValue::Bool(true),
            );
        }
    }
}
