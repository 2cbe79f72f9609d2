use std::path::PathBuf;

use bevy::math::Vec2;
use bevy::prelude::AppExit;
use clap::{Parser, ValueEnum};
use hydro_server::config_file::load_hydro_config;
use hydro_server::init::{self, HostSettings};
use hydro_server::scenario::ScenarioSettings;
use hydro_server::terrain::TerrainSettings;
use hydro_shared::HydroPreset;

/// Largest grid side accepted from the command line.
const MAX_GRID_SIDE: usize = 4096;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    Default,
    Arid,
    Wetland,
    Still,
}

impl From<Preset> for HydroPreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Default => HydroPreset::Default,
            Preset::Arid => HydroPreset::Arid,
            Preset::Wetland => HydroPreset::Wetland,
            Preset::Still => HydroPreset::Still,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, default_value_t = 128)]
    width: usize,

    #[arg(long, default_value_t = 128)]
    height: usize,

    /// Cell edge length (m). Overrides the config file.
    #[arg(long)]
    cell_size: Option<f32>,

    #[arg(short, long, default_value_t = 300)]
    ticks: u64,

    /// Hydrology config in RON format.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    #[arg(short, long, default_value_t = 0)]
    seed: u32,

    /// Uniform rainfall (m/s).
    #[arg(long, default_value_t = 0.0)]
    rain: f64,

    /// Terrain elevation range (m).
    #[arg(long, default_value_t = 8.0)]
    relief: f32,

    #[arg(long, default_value_t = 1)]
    springs: usize,

    /// Where to write the ledger report.
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Wind as `x,y` in m/s.
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [4.0, 1.0])]
    wind: Vec<f32>,

    /// Pace ticks at wall-clock speed.
    #[arg(long)]
    realtime: bool,
}

fn main() -> AppExit {
    let args = Args::parse();

    // Validate grid dimensions
    if args.width == 0
        || args.height == 0
        || args.width > MAX_GRID_SIDE
        || args.height > MAX_GRID_SIDE
    {
        eprintln!(
            "Error: width and height must be between 1 and {} (inclusive).",
            MAX_GRID_SIDE
        );
        eprintln!("Got: {}x{}", args.width, args.height);
        std::process::exit(1);
    }

    if !args.rain.is_finite() || args.rain < 0.0 {
        eprintln!("Error: rain must be a non-negative rate, got {}", args.rain);
        std::process::exit(1);
    }

    let mut config = match load_hydro_config(args.config.as_deref(), args.preset.into()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: could not load the hydrology config: {err}");
            std::process::exit(1);
        }
    };
    if let Some(cell_size) = args.cell_size {
        config.cell_size = cell_size;
        config = config.sanitized();
    }

    let wind = match args.wind.as_slice() {
        [x, y] => Vec2::new(*x, *y),
        _ => Vec2::ZERO,
    };

    init::init(HostSettings {
        terrain: TerrainSettings {
            width: args.width,
            height: args.height,
            seed: args.seed,
            relief: args.relief.max(0.0),
            ..Default::default()
        },
        config,
        scenario: ScenarioSettings {
            ticks: args.ticks,
            seed: args.seed as u64,
            rain: args.rain,
            springs: args.springs,
            report_path: args.report,
            ..Default::default()
        },
        wind,
        realtime: args.realtime,
        logging: true,
    })
}
