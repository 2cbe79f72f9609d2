//! Bevy plugin for hydrology integration.

use bevy::prelude::*;

use crate::config::HydroConfig;
use crate::ledger::ConservationReport;
use crate::sets::HydroUpdateSet;
use crate::simulation::{HydroSimulation, TickSummary};

/// Ticks between conservation audits.
pub const AUDIT_INTERVAL_TICKS: u64 = 30;

/// Manipulation requested by another system (brush, weather, gameplay).
/// Positions are world coordinates.
#[derive(Event, Debug, Clone, PartialEq)]
pub enum WaterCommand {
    AddWater { position: Vec2, amount: f64, radius: f32 },
    RemoveWater { position: Vec2, amount: f64, radius: f32 },
    Splash { position: Vec2, volume: f32 },
    /// Uniform rainfall (m/s); zero stops it.
    Rain { rate: f64 },
}

/// Latest tick and audit results, for hosts and diagnostics.
#[derive(Resource, Debug, Clone, Default)]
pub struct HydroStatus {
    pub ticks: u64,
    pub last_tick: TickSummary,
    pub last_report: Option<ConservationReport>,
    /// Volume added through commands (m³).
    pub commanded_in: f64,
    /// Volume removed through commands (m³).
    pub commanded_out: f64,
}

/// Plugin that runs the hydrology core each frame.
///
/// The host inserts a [`HydroSimulation`] resource (it needs a terrain
/// provider); every system here is skipped until it exists. Edits to the
/// [`HydroConfig`] resource are pushed into the simulation. Without one, the
/// resource is created from the simulation's own config.
pub struct HydrologyPlugin;

impl Plugin for HydrologyPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<WaterCommand>()
            .init_resource::<HydroStatus>()
            .register_type::<HydroConfig>()
            .configure_sets(
                Update,
                (
                    HydroUpdateSet::Commands,
                    HydroUpdateSet::Simulate,
                    HydroUpdateSet::Audit,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (sync_config_system, apply_water_commands)
                    .chain()
                    .in_set(HydroUpdateSet::Commands)
                    .run_if(resource_exists::<HydroSimulation>),
            )
            .add_systems(
                Update,
                hydrology_tick_system
                    .in_set(HydroUpdateSet::Simulate)
                    .run_if(resource_exists::<HydroSimulation>),
            )
            .add_systems(
                Update,
                conservation_audit_system
                    .in_set(HydroUpdateSet::Audit)
                    .run_if(resource_exists::<HydroSimulation>),
            );
    }
}

fn sync_config_system(
    mut commands: Commands,
    config: Option<Res<HydroConfig>>,
    mut simulation: ResMut<HydroSimulation>,
) {
    let Some(config) = config else {
        commands.insert_resource(simulation.config().clone());
        return;
    };
    if config.is_changed() && *config != *simulation.config() {
        simulation.set_config(config.clone());
    }
}

pub fn apply_water_commands(
    mut commands: EventReader<WaterCommand>,
    mut simulation: ResMut<HydroSimulation>,
    mut status: ResMut<HydroStatus>,
) {
    for command in commands.read() {
        match *command {
            WaterCommand::AddWater {
                position,
                amount,
                radius,
            } => {
                status.commanded_in += simulation.add_water(position, amount, radius);
            }
            WaterCommand::RemoveWater {
                position,
                amount,
                radius,
            } => {
                status.commanded_out += simulation.remove_water(position, amount, radius);
            }
            WaterCommand::Splash { position, volume } => simulation.splash(position, volume),
            WaterCommand::Rain { rate } => simulation.rain(rate),
        }
    }
}

pub fn hydrology_tick_system(
    time: Res<Time>,
    mut simulation: ResMut<HydroSimulation>,
    mut status: ResMut<HydroStatus>,
) {
    status.last_tick = simulation.tick(time.delta_secs());
    status.ticks += 1;
}

pub fn conservation_audit_system(
    mut simulation: ResMut<HydroSimulation>,
    mut status: ResMut<HydroStatus>,
) {
    if status.ticks % AUDIT_INTERVAL_TICKS != 0 {
        return;
    }
    status.last_report = Some(simulation.audit());
}
