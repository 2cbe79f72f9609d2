//! Hydrology simulation configuration.
//!
//! Compile-time defaults live in [`constants`]; [`HydroConfig`] is the runtime
//! resource built from them (and optionally overridden from a `.ron` file by
//! the host).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::waves::WaveScaleConfig;

/// Compile-time tunable defaults for the hydrology simulation.
pub mod constants {
    /// Fixed physics substep (seconds).
    pub const SUBSTEP: f32 = 1.0 / 60.0;

    /// Maximum substeps run by a single `tick` call.
    ///
    /// Bounds worst-case frame cost: leftover time beyond this is dropped
    /// rather than caught up.
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Flow rate coefficient (1/s) - how fast surface differences equalise.
    /// This is effectively the "hydraulic conductivity" of the model.
    pub const FLOW_RATE: f32 = 4.0;

    /// Minimum surface elevation difference (m) to trigger flow.
    /// Prevents oscillation between near-equal neighbours.
    pub const MIN_FLOW_THRESHOLD: f32 = 0.001;

    /// Depth (m) below which a cell produces no outflow.
    pub const MIN_DEPTH: f32 = 1.0e-6;

    /// Fraction of a cell's volume that may leave it in one substep.
    pub const MAX_OUTFLOW_FRACTION: f32 = 1.0;

    /// Time constant (s) of the exponential velocity blend.
    pub const VELOCITY_TIME_CONSTANT: f32 = 0.25;

    /// Velocity magnitude clamp (m/s).
    pub const MAX_VELOCITY: f32 = 20.0;

    /// Foam generated per (m/s above threshold) per second.
    pub const FOAM_GAIN: f32 = 0.6;

    /// Speed (m/s) above which moving water starts producing foam.
    pub const FOAM_SPEED_THRESHOLD: f32 = 1.5;

    /// Exponential foam decay rate (1/s).
    pub const FOAM_DECAY: f32 = 0.8;

    /// Evaporation rate (m of depth per second) from wet cells.
    pub const EVAPORATION_RATE: f32 = 1.0e-7;

    /// Infiltration rate (m of depth per second) into soil.
    pub const INFILTRATION_RATE: f32 = 2.0e-6;

    /// Maximum number of records retained in the ledger audit log.
    pub const AUDIT_CAPACITY: usize = 4096;

    /// Tolerance (m³) for conservation checks.
    pub const CONSERVATION_EPSILON: f64 = 1.0e-3;
}

/// How water behaves at the edge of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Reflect)]
pub enum EdgeMode {
    /// Walls: nothing leaves the grid.
    Closed,
    /// Off-grid surface is linearly extrapolated from the edge, so water
    /// sloping toward the boundary keeps flowing out and a flat pool stays put.
    #[default]
    Outflow,
    /// Off-grid water stands at a fixed elevation (e.g. sea level).
    Sink { level: f32 },
}

/// Cosmetic wave generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct WaveConfig {
    /// Cap on simultaneously active wave sources; oldest are evicted first.
    pub max_sources: usize,
    /// Neighbour-averaging blend of the smoothing pass (0 = off, 1 = full).
    pub smoothing: f32,
    /// Absolute clamp on per-cell displacement (m).
    pub max_displacement: f32,
    /// Wind sources spawned per second per (m/s) of wind.
    pub wind_spawn_rate: f32,
    /// Local speed (m/s) above which flow waves may spawn.
    pub flow_wave_speed: f32,
    /// Depth (m) below which a cell is treated as dry for displacement.
    pub wet_threshold: f32,
    /// Seed of the ambient-generation RNG.
    pub seed: u64,
    /// Local-volume based amplitude scaling.
    pub scale: WaveScaleConfig,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            max_sources: 64,
            smoothing: 0.25,
            max_displacement: 2.0,
            wind_spawn_rate: 0.2,
            flow_wave_speed: 2.0,
            wet_threshold: 0.01,
            seed: 0x5eed,
            scale: WaveScaleConfig::default(),
        }
    }
}

/// Runtime hydrology configuration resource.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize, Reflect)]
#[reflect(Resource)]
#[serde(default)]
pub struct HydroConfig {
    /// Horizontal cell size (m). Cell area is `cell_size²`.
    pub cell_size: f32,
    pub substep: f32,
    pub max_substeps: u32,
    pub flow_rate: f32,
    pub min_flow_threshold: f32,
    pub min_depth: f32,
    pub max_outflow_fraction: f32,
    pub edge_mode: EdgeMode,
    pub velocity_time_constant: f32,
    pub max_velocity: f32,
    pub foam_gain: f32,
    pub foam_speed_threshold: f32,
    pub foam_decay: f32,
    pub evaporation_rate: f32,
    pub infiltration_rate: f32,
    pub audit_capacity: usize,
    pub conservation_epsilon: f64,
    /// Whether stable tiles may skip the gradient phase.
    pub sleep_enabled: bool,
    pub waves: WaveConfig,
}

impl Default for HydroConfig {
    fn default() -> Self {
        Self {
            cell_size: crate::constants::DEFAULT_CELL_SIZE,
            substep: constants::SUBSTEP,
            max_substeps: constants::MAX_SUBSTEPS,
            flow_rate: constants::FLOW_RATE,
            min_flow_threshold: constants::MIN_FLOW_THRESHOLD,
            min_depth: constants::MIN_DEPTH,
            max_outflow_fraction: constants::MAX_OUTFLOW_FRACTION,
            edge_mode: EdgeMode::default(),
            velocity_time_constant: constants::VELOCITY_TIME_CONSTANT,
            max_velocity: constants::MAX_VELOCITY,
            foam_gain: constants::FOAM_GAIN,
            foam_speed_threshold: constants::FOAM_SPEED_THRESHOLD,
            foam_decay: constants::FOAM_DECAY,
            evaporation_rate: constants::EVAPORATION_RATE,
            infiltration_rate: constants::INFILTRATION_RATE,
            audit_capacity: constants::AUDIT_CAPACITY,
            conservation_epsilon: constants::CONSERVATION_EPSILON,
            sleep_enabled: true,
            waves: WaveConfig::default(),
        }
    }
}

impl HydroConfig {
    #[inline]
    pub fn cell_area(&self) -> f32 {
        self.cell_size * self.cell_size
    }

    /// Configuration with all domain exchanges switched off: only lateral
    /// transport and edge drainage move water.
    pub fn transport_only() -> Self {
        Self {
            evaporation_rate: 0.0,
            infiltration_rate: 0.0,
            sleep_enabled: false,
            ..Default::default()
        }
    }

    /// Clamps values that would make the integrator unstable or meaningless.
    pub fn sanitized(mut self) -> Self {
        self.cell_size = finite_or(self.cell_size, crate::constants::DEFAULT_CELL_SIZE).max(1.0e-3);
        self.substep = finite_or(self.substep, constants::SUBSTEP).max(1.0e-4);
        self.max_substeps = self.max_substeps.max(1);
        self.flow_rate = finite_or(self.flow_rate, constants::FLOW_RATE).max(0.0);
        self.min_flow_threshold = finite_or(self.min_flow_threshold, 0.0).max(0.0);
        self.min_depth = finite_or(self.min_depth, 0.0).max(0.0);
        self.max_outflow_fraction = finite_or(self.max_outflow_fraction, 1.0).clamp(0.0, 1.0);
        self.velocity_time_constant = finite_or(self.velocity_time_constant, 0.0).max(1.0e-4);
        self.evaporation_rate = finite_or(self.evaporation_rate, 0.0).max(0.0);
        self.infiltration_rate = finite_or(self.infiltration_rate, 0.0).max(0.0);
        self.audit_capacity = self.audit_capacity.max(1);
        self.waves.smoothing = finite_or(self.waves.smoothing, 0.0).clamp(0.0, 1.0);
        self
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Preset configurations for different climates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum HydroPreset {
    #[default]
    Default,
    /// Strong evaporation, thirsty soil.
    Arid,
    /// Slow drainage, waterlogged soil, sluggish flow.
    Wetland,
    /// No exchanges, no ambient waves: pure transport.
    Still,
}

impl HydroPreset {
    pub fn to_config(self) -> HydroConfig {
        let mut config = HydroConfig::default();

        match self {
            HydroPreset::Default => {}
            HydroPreset::Arid => {
                config.evaporation_rate = 5.0e-6;
                config.infiltration_rate = 2.0e-5;
                config.waves.wind_spawn_rate = 0.4;
            }
            HydroPreset::Wetland => {
                config.flow_rate = 1.5;
                config.evaporation_rate = 5.0e-8;
                config.infiltration_rate = 2.0e-7;
                config.foam_decay = 0.3;
            }
            HydroPreset::Still => {
                config.evaporation_rate = 0.0;
                config.infiltration_rate = 0.0;
                config.waves.wind_spawn_rate = 0.0;
            }
        }

        config
    }
}
