use crate::scenario::{scenario_progress_system, setup_scenario_system, ScenarioSettings};
use crate::terrain::{generate_heightfield, TerrainSettings};
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use bevy_app::ScheduleRunnerPlugin;
use hydro_shared::{
    AmbientAtmosphere, GridError, HydroConfig, HydroSimulation, HydroUpdateSet, HydrologyPlugin,
    SoilColumns, TICKS_PER_SECOND,
};
use std::sync::Arc;
use std::time::Duration;

/// Soil moisture each cell can hold before infiltration stops (m³).
const SOIL_CAPACITY_PER_CELL: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub terrain: TerrainSettings,
    pub config: HydroConfig,
    pub scenario: ScenarioSettings,
    /// Prevailing wind (m/s).
    pub wind: Vec2,
    /// Pace ticks at `TICKS_PER_SECOND` wall-clock time instead of running
    /// them back to back.
    pub realtime: bool,
    pub logging: bool,
}

/// Builds the headless app. Simulated time always advances by exactly one
/// tick per update, whatever the wall-clock pacing.
pub fn build_app(settings: HostSettings) -> Result<App, GridError> {
    let tick = Duration::from_secs_f64(1.0 / TICKS_PER_SECOND as f64);
    let wait = if settings.realtime {
        tick
    } else {
        Duration::ZERO
    };

    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(wait)));
    if settings.logging {
        app.add_plugins(bevy::log::LogPlugin::default());
    }
    app.insert_resource(TimeUpdateStrategy::ManualDuration(tick));

    let terrain = Arc::new(generate_heightfield(&settings.terrain));
    let cells = settings.terrain.width * settings.terrain.height;
    let simulation = HydroSimulation::new(settings.config.clone(), terrain)?
        .with_geology(SoilColumns::new(cells, SOIL_CAPACITY_PER_CELL))
        .with_atmosphere(AmbientAtmosphere::with_wind(settings.wind));

    app.add_plugins(HydrologyPlugin);
    app.insert_resource(settings.config);
    app.insert_resource(simulation);
    app.insert_resource(settings.scenario);

    app.add_systems(Startup, setup_scenario_system);
    app.add_systems(
        Update,
        scenario_progress_system.after(HydroUpdateSet::Audit),
    );

    Ok(app)
}

pub fn init(settings: HostSettings) -> AppExit {
    info!(
        "Starting hydrology host on a {}x{} grid",
        settings.terrain.width, settings.terrain.height
    );

    match build_app(settings) {
        Ok(mut app) => app.run(),
        Err(err) => {
            error!("Could not create the hydrology grid : {}", err);
            AppExit::error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_shared::{Domain, HydroStatus};

    fn settings(ticks: u64) -> HostSettings {
        HostSettings {
            terrain: TerrainSettings {
                width: 24,
                height: 24,
                seed: 3,
                relief: 2.0,
                ..Default::default()
            },
            config: HydroConfig::default(),
            scenario: ScenarioSettings {
                ticks,
                pours: 2,
                pour_volume: 10.0,
                pour_radius: 2.0,
                ..Default::default()
            },
            wind: Vec2::new(3.0, 1.0),
            realtime: false,
            logging: false,
        }
    }

    #[test]
    fn test_scenario_runs_to_completion() {
        let mut app = build_app(settings(12)).unwrap();
        let mut exit = None;
        for _ in 0..40 {
            app.update();
            exit = app.should_exit();
            if exit.is_some() {
                break;
            }
        }

        assert_eq!(exit, Some(AppExit::Success));
        let status = app.world().resource::<HydroStatus>();
        assert!(status.ticks >= 12);
        let simulation = app.world().resource::<HydroSimulation>();
        assert!(simulation.ledger().injected(Domain::Surface) > 20.0);
        assert_eq!(simulation.grid().negative_cells(), 0);
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        let mut settings = settings(1);
        settings.terrain.width = 0;
        assert!(matches!(
            build_app(settings),
            Err(GridError::InvalidDimensions { .. })
        ));
    }
}
