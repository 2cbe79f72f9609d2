//! Scripted headless run: pour water, let it settle, report the ledger.

use bevy::prelude::*;
use hydro_shared::{HydroSimulation, HydroStatus, WaterCommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use crate::report::{save_report, RunReport};

#[derive(Resource, Debug, Clone)]
pub struct ScenarioSettings {
    /// Ticks to run before exiting.
    pub ticks: u64,
    pub seed: u64,
    /// Brushes of water poured at startup.
    pub pours: usize,
    /// Volume per brush (m³).
    pub pour_volume: f64,
    /// Brush radius (m).
    pub pour_radius: f32,
    /// Uniform rainfall (m/s).
    pub rain: f64,
    pub springs: usize,
    /// Output per spring (m³/s).
    pub spring_rate: f64,
    /// Ticks between progress lines.
    pub log_interval: u64,
    pub report_path: Option<PathBuf>,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            ticks: 300,
            seed: 0,
            pours: 4,
            pour_volume: 200.0,
            pour_radius: 6.0,
            rain: 0.0,
            springs: 1,
            spring_rate: 0.5,
            log_interval: 30,
            report_path: None,
        }
    }
}

/// Random point inside the grid footprint, in world coordinates.
fn random_world_position(rng: &mut StdRng, simulation: &HydroSimulation) -> Vec2 {
    let grid = simulation.grid();
    let cell = Vec2::new(
        rng.gen::<f32>() * (grid.width() - 1) as f32,
        rng.gen::<f32>() * (grid.height() - 1) as f32,
    );
    simulation.coordinates().cell_to_world(cell)
}

pub fn setup_scenario_system(
    settings: Res<ScenarioSettings>,
    mut simulation: ResMut<HydroSimulation>,
    mut commands: EventWriter<WaterCommand>,
) {
    let mut rng = StdRng::seed_from_u64(settings.seed);

    for _ in 0..settings.pours {
        commands.write(WaterCommand::AddWater {
            position: random_world_position(&mut rng, &simulation),
            amount: settings.pour_volume,
            radius: settings.pour_radius,
        });
    }

    for _ in 0..settings.springs {
        let position = random_world_position(&mut rng, &simulation);
        if let Some(id) = simulation.add_spring(position, settings.spring_rate) {
            debug!("Spring {:?} at {:?}", id, position);
        }
    }

    if settings.rain > 0.0 {
        commands.write(WaterCommand::Rain {
            rate: settings.rain,
        });
    }

    info!(
        "Scenario: {} pours of {} m³, {} springs, rain {} m/s, {} ticks",
        settings.pours, settings.pour_volume, settings.springs, settings.rain, settings.ticks
    );
}

pub fn scenario_progress_system(
    settings: Res<ScenarioSettings>,
    status: Res<HydroStatus>,
    mut simulation: ResMut<HydroSimulation>,
    mut exit: EventWriter<AppExit>,
) {
    if status.ticks == 0 {
        return;
    }

    if settings.log_interval > 0 && status.ticks % settings.log_interval == 0 {
        let summary = &status.last_tick;
        let grid = simulation.grid();
        info!(
            "tick {}: {} wet cells, max depth {:.3} m, moved {:.3} m³, drained {:.3} m³, {} waves",
            status.ticks,
            grid.wet_cells(simulation.config().waves.wet_threshold),
            grid.max_depth(),
            summary.moved,
            summary.edge_drainage,
            summary.active_waves
        );
    }

    if status.ticks < settings.ticks {
        return;
    }

    let report = RunReport::collect(&mut simulation);
    for totals in &report.domains {
        info!(
            "{:>12}: {:>12.4} m³ (in {:.4}, out {:.4})",
            totals.domain, totals.volume, totals.injected, totals.withdrawn
        );
    }
    info!(
        "Closure error {:.3e} m³, surface drift {:.3e} m³, {} violations",
        report.audit.closure_error, report.audit.surface_drift, report.audit_violations
    );

    if let Some(path) = &settings.report_path {
        if let Err(err) = save_report(&report, path) {
            error!("Could not save ledger report to {} : {}", path.display(), err);
        }
    }

    if report.audit.ok && report.audit_violations == 0 {
        exit.write(AppExit::Success);
    } else {
        warn!("Conservation audit failed, exiting with an error");
        exit.write(AppExit::error());
    }
}
