//! Query/manipulation façade over the hydrology core.
//!
//! [`HydroSimulation`] owns the grid, the ledger, the flow engine and the wave
//! generator, plus handles to the collaborators they need. Hosts talk to the
//! core only through it.
//!
//! ## Design Principles
//! - Every mutation of surface water goes through the ledger first (or
//!   together with it), so the Surface volume is always observed
//! - World positions are mapped through the [`CoordinateSystem`]; anything
//!   outside the grid reads as 0 and writes nothing
//! - A tick runs fixed substeps: external inputs, gradient, apply, exchange

use std::sync::Arc;

use bevy::math::{UVec2, Vec2};
use bevy_ecs::resource::Resource;
use serde::{Deserialize, Serialize};

use crate::collaborators::{
    AmbientAtmosphere, AtmosphereProvider, CoordinateSystem, GeologyProvider, GridTransform,
    ImpermeableBedrock, TerrainProvider,
};
use crate::config::HydroConfig;
use crate::error::GridResult;
use crate::flow::{FlowEngine, SubstepReport};
use crate::grid::{bilinear, Field, GridState};
use crate::ledger::{
    ConservationAudit, ConservationLedger, ConservationReport, Domain, LedgerSnapshot,
    TransferReason,
};
use crate::waves::WaveGenerator;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpringId(pub u64);

/// Persistent point source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub id: SpringId,
    pub cell: usize,
    /// Output (m³/s).
    pub rate: f64,
}

/// What one `tick` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub substeps: u32,
    /// Volume moved between cells (m³).
    pub moved: f64,
    pub edge_drainage: f64,
    pub evaporated: f64,
    pub infiltrated: f64,
    /// Spring and rain input (m³).
    pub injected: f64,
    pub active_waves: usize,
    /// True when the tick did nothing because terrain and grid disagree.
    pub skipped: bool,
}

impl TickSummary {
    fn absorb(&mut self, report: &SubstepReport) {
        self.moved += report.moved;
        self.edge_drainage += report.edge_drainage;
        self.evaporated += report.evaporated;
        self.infiltrated += report.infiltrated;
    }
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Resource)]
pub struct HydroSimulation {
    config: HydroConfig,
    grid: GridState,
    ledger: ConservationLedger,
    audit: ConservationAudit,
    baseline: LedgerSnapshot,
    engine: FlowEngine,
    waves: WaveGenerator,
    terrain: Arc<dyn TerrainProvider>,
    geology: Box<dyn GeologyProvider>,
    atmosphere: Box<dyn AtmosphereProvider>,
    coords: Box<dyn CoordinateSystem>,
    springs: Vec<Spring>,
    next_spring: u64,
    /// Uniform precipitation (m of depth per second).
    rain_rate: f64,
    terrain_mismatch: bool,
    last_summary: TickSummary,
}

impl HydroSimulation {
    /// Builds a dry grid matching the terrain's dimensions.
    ///
    /// Geology defaults to [`ImpermeableBedrock`], the atmosphere to a calm
    /// [`AmbientAtmosphere`] and coordinates to a [`GridTransform`] at the
    /// origin with the configured cell size.
    pub fn new(config: HydroConfig, terrain: Arc<dyn TerrainProvider>) -> GridResult<Self> {
        let config = config.sanitized();
        let (width, height) = terrain.dimensions();
        let grid = GridState::new(width, height)?;
        let mut engine = FlowEngine::new(width, height, &config);
        engine.sync_terrain(terrain.as_ref())?;

        let ledger = ConservationLedger::new(config.audit_capacity);
        let baseline = ledger.snapshot();
        let waves = WaveGenerator::new(width, height, &config.waves);
        let coords = GridTransform::new(Vec2::ZERO, config.cell_size);

        log::info!(
            "Hydrology grid {}x{} ({} cells, {} m cells)",
            width,
            height,
            grid.len(),
            config.cell_size
        );

        Ok(Self {
            config,
            grid,
            ledger,
            audit: ConservationAudit::default(),
            baseline,
            engine,
            waves,
            terrain,
            geology: Box::new(ImpermeableBedrock::default()),
            atmosphere: Box::new(AmbientAtmosphere::default()),
            coords: Box::new(coords),
            springs: Vec::new(),
            next_spring: 0,
            rain_rate: 0.0,
            terrain_mismatch: false,
            last_summary: TickSummary::default(),
        })
    }

    pub fn with_geology(mut self, geology: impl GeologyProvider + 'static) -> Self {
        let mut geology: Box<dyn GeologyProvider> = Box::new(geology);
        geology.resize(self.grid.len());
        self.geology = geology;
        self
    }

    pub fn with_atmosphere(mut self, atmosphere: impl AtmosphereProvider + 'static) -> Self {
        self.atmosphere = Box::new(atmosphere);
        self
    }

    /// Installs a coordinate system. Its cell size becomes the grid's, so
    /// brushes and cell volumes agree with the transform; depths already on
    /// the grid are rescaled to keep their volume.
    pub fn with_coordinates(mut self, coords: impl CoordinateSystem + 'static) -> Self {
        let cell_size = coords.cell_size();
        if !cell_size.is_finite() || cell_size <= 0.0 {
            log::warn!(
                "Coordinate system reports cell size {}, keeping {} m",
                cell_size,
                self.config.cell_size
            );
        } else if cell_size != self.config.cell_size {
            let scale = self.config.cell_area() / (cell_size * cell_size);
            for depth in self.grid.depth_mut() {
                *depth *= scale;
            }
            log::info!(
                "Cell size {} -> {} m from the coordinate system",
                self.config.cell_size,
                cell_size
            );
            self.config.cell_size = cell_size;
            self.engine.reconfigure(&self.config);
        }
        self.coords = Box::new(coords);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn ledger(&self) -> &ConservationLedger {
        &self.ledger
    }

    pub fn waves(&self) -> &WaveGenerator {
        &self.waves
    }

    pub fn waves_mut(&mut self) -> &mut WaveGenerator {
        &mut self.waves
    }

    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }

    pub fn config(&self) -> &HydroConfig {
        &self.config
    }

    pub fn terrain(&self) -> &Arc<dyn TerrainProvider> {
        &self.terrain
    }

    pub fn geology(&self) -> &dyn GeologyProvider {
        self.geology.as_ref()
    }

    pub fn atmosphere(&self) -> &dyn AtmosphereProvider {
        self.atmosphere.as_ref()
    }

    pub fn coordinates(&self) -> &dyn CoordinateSystem {
        self.coords.as_ref()
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn rain_rate(&self) -> f64 {
        self.rain_rate
    }

    pub fn last_summary(&self) -> &TickSummary {
        &self.last_summary
    }

    pub fn audit_state(&self) -> &ConservationAudit {
        &self.audit
    }

    /// Applies a new configuration. The cell size is fixed for the lifetime
    /// of the grid; a different value is ignored.
    pub fn set_config(&mut self, config: HydroConfig) {
        let mut config = config.sanitized();
        if config.cell_size != self.config.cell_size {
            log::warn!(
                "Ignoring cell size change {} -> {}: resize the simulation instead",
                self.config.cell_size,
                config.cell_size
            );
            config.cell_size = self.config.cell_size;
        }
        self.engine.reconfigure(&config);
        self.config = config;
    }

    /// Swaps the terrain provider. Takes effect at the next tick.
    pub fn set_terrain(&mut self, terrain: Arc<dyn TerrainProvider>) {
        self.terrain = terrain;
        self.engine.invalidate_terrain();
    }

    // ========================================================================
    // Coordinates
    // ========================================================================

    /// Fractional cell coordinates of `world`, or `None` when the position
    /// lies outside every cell's footprint.
    pub fn world_to_cell(&self, world: Vec2) -> Option<Vec2> {
        let cell = self.coords.world_to_cell(world);
        if !cell.is_finite() {
            return None;
        }
        let inside = cell.x >= -0.5
            && cell.y >= -0.5
            && cell.x < self.grid.width() as f32 - 0.5
            && cell.y < self.grid.height() as f32 - 0.5;
        inside.then_some(cell)
    }

    fn nearest_cell(&self, cell: Vec2) -> usize {
        let x = cell.x.round().clamp(0.0, (self.grid.width() - 1) as f32) as usize;
        let y = cell.y.round().clamp(0.0, (self.grid.height() - 1) as f32) as usize;
        y * self.grid.width() + x
    }

    /// Normalised falloff weights for a brush of `radius` (m) at `cell`.
    ///
    /// Cells whose centre lies within the radius get `1 - d/(r + cell/2)`.
    /// When the radius covers no centre, the nearest cell takes everything.
    fn brush_weights(&self, cell: Vec2, radius: f32) -> Vec<(usize, f64)> {
        let cell_size = self.config.cell_size;
        let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
        let reach = radius / cell_size;
        let falloff = radius + cell_size * 0.5;

        let max_x = (self.grid.width() - 1) as f32;
        let max_y = (self.grid.height() - 1) as f32;
        let x0 = (cell.x - reach).ceil().clamp(0.0, max_x) as usize;
        let x1 = (cell.x + reach).floor().clamp(0.0, max_x) as usize;
        let y0 = (cell.y - reach).ceil().clamp(0.0, max_y) as usize;
        let y1 = (cell.y + reach).floor().clamp(0.0, max_y) as usize;

        let mut weights = Vec::new();
        let mut total = 0.0f64;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let distance = Vec2::new(x as f32, y as f32).distance(cell) * cell_size;
                if distance > radius {
                    continue;
                }
                let weight = (1.0 - distance / falloff).max(0.0) as f64;
                if weight > 0.0 {
                    weights.push((y * self.grid.width() + x, weight));
                    total += weight;
                }
            }
        }

        if weights.is_empty() {
            return vec![(self.nearest_cell(cell), 1.0)];
        }
        for (_, weight) in &mut weights {
            *weight /= total;
        }
        weights
    }

    fn wake_brush(&mut self, cell: Vec2, radius: f32, reason: &str) {
        let reach = if radius.is_finite() {
            (radius / self.config.cell_size).max(0.0)
        } else {
            0.0
        };
        let min = (cell - Vec2::splat(reach + 1.0)).max(Vec2::ZERO);
        let max = (cell + Vec2::splat(reach + 1.0)).max(Vec2::ZERO);
        self.engine.sleep_mut().wake_region(
            UVec2::new(min.x as u32, min.y as u32),
            UVec2::new(max.x as u32, max.y as u32),
            reason,
        );
    }

    // ========================================================================
    // Manipulation
    // ========================================================================

    /// Deposits `amount` m³ around `world`, weighted toward the centre.
    /// Returns the volume injected (0 when out of bounds or invalid).
    pub fn add_water(&mut self, world: Vec2, amount: f64, radius: f32) -> f64 {
        if !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let Some(cell) = self.world_to_cell(world) else {
            return 0.0;
        };

        let area = self.config.cell_area() as f64;
        let weights = self.brush_weights(cell, radius);
        let injected = self.ledger.inject(
            Domain::Surface,
            amount,
            Some(self.nearest_cell(cell)),
            TransferReason::UserAdd,
        );
        for &(index, weight) in &weights {
            self.grid.add_depth(index, (injected * weight / area) as f32);
        }

        self.wake_brush(cell, radius, "water added");
        self.waves.splash(
            &self.grid,
            cell,
            injected as f32,
            self.config.cell_size,
            &self.config.waves,
        );
        log::debug!(
            "[LEDGER] Added {:.4} m³ over {} cells at {:?}",
            injected,
            weights.len(),
            cell
        );
        injected
    }

    /// Removes up to `amount` m³ around `world` with the same weighting as
    /// [`HydroSimulation::add_water`]. Each cell gives at most what it holds.
    pub fn remove_water(&mut self, world: Vec2, amount: f64, radius: f32) -> f64 {
        if !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let Some(cell) = self.world_to_cell(world) else {
            return 0.0;
        };

        let area = self.config.cell_area() as f64;
        let takes: Vec<(usize, f64)> = self
            .brush_weights(cell, radius)
            .into_iter()
            .map(|(index, weight)| {
                let held = self.grid.depth()[index] as f64 * area;
                (index, (amount * weight).min(held))
            })
            .collect();
        let requested: f64 = takes.iter().map(|(_, take)| take).sum();
        if requested <= 0.0 {
            return 0.0;
        }

        let actual = self.ledger.withdraw(
            Domain::Surface,
            requested,
            Some(self.nearest_cell(cell)),
            TransferReason::UserRemove,
        );
        let scale = actual / requested;
        for &(index, take) in &takes {
            self.grid.add_depth(index, -(take * scale / area) as f32);
        }

        self.wake_brush(cell, radius, "water removed");
        log::debug!("[LEDGER] Removed {:.4} of {:.4} m³ at {:?}", actual, amount, cell);
        actual
    }

    /// Deposits `volume` m³ into a single cell. Returns the volume injected.
    pub fn add_water_to_cell(&mut self, x: usize, y: usize, volume: f64) -> f64 {
        if !volume.is_finite() || volume <= 0.0 {
            return 0.0;
        }
        let Some(index) = self.grid.index(x as i64, y as i64) else {
            return 0.0;
        };
        let injected = self
            .ledger
            .inject(Domain::Surface, volume, Some(index), TransferReason::UserAdd);
        self.grid
            .add_depth(index, (injected / self.config.cell_area() as f64) as f32);
        self.engine.sleep_mut().wake_cell(x, y, "water added");
        injected
    }

    /// Removes up to `volume` m³ from a single cell.
    pub fn remove_water_from_cell(&mut self, x: usize, y: usize, volume: f64) -> f64 {
        if !volume.is_finite() || volume <= 0.0 {
            return 0.0;
        }
        let Some(index) = self.grid.index(x as i64, y as i64) else {
            return 0.0;
        };
        let area = self.config.cell_area() as f64;
        let held = self.grid.depth()[index] as f64 * area;
        let actual = self.ledger.withdraw(
            Domain::Surface,
            volume.min(held),
            Some(index),
            TransferReason::UserRemove,
        );
        self.grid.add_depth(index, -(actual / area) as f32);
        self.engine.sleep_mut().wake_cell(x, y, "water removed");
        actual
    }

    /// Collision waves at `world` without adding water.
    pub fn splash(&mut self, world: Vec2, volume: f32) {
        if let Some(cell) = self.world_to_cell(world) {
            self.waves.splash(
                &self.grid,
                cell,
                volume,
                self.config.cell_size,
                &self.config.waves,
            );
        }
    }

    /// Registers a point source emitting `rate` m³/s at the cell nearest
    /// `world`. Returns `None` out of bounds or for a non-positive rate.
    pub fn add_spring(&mut self, world: Vec2, rate: f64) -> Option<SpringId> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        let cell = self.world_to_cell(world)?;
        let id = SpringId(self.next_spring);
        self.next_spring += 1;
        let index = self.nearest_cell(cell);
        self.springs.push(Spring {
            id,
            cell: index,
            rate,
        });
        log::debug!("[LEDGER] Spring {:?} at cell {} ({} m³/s)", id, index, rate);
        Some(id)
    }

    pub fn remove_spring(&mut self, id: SpringId) -> bool {
        let before = self.springs.len();
        self.springs.retain(|spring| spring.id != id);
        self.springs.len() != before
    }

    /// Sets uniform rainfall (m of depth per second). Zero, negative or NaN
    /// stops the rain.
    pub fn rain(&mut self, rate: f64) {
        self.rain_rate = if rate.is_finite() { rate.max(0.0) } else { 0.0 };
    }

    /// Returns `fraction` of the atmosphere's volume to the surface as even
    /// rainfall. Returns the volume moved.
    pub fn precipitate(&mut self, fraction: f64) -> f64 {
        if !fraction.is_finite() || fraction <= 0.0 {
            return 0.0;
        }
        let requested = self.ledger.available(Domain::Atmosphere) * fraction.min(1.0);
        let actual = self.ledger.transfer_atmosphere_to_surface(None, requested);
        if actual <= 0.0 {
            return 0.0;
        }

        let per_cell = (actual / (self.grid.len() as f64 * self.config.cell_area() as f64)) as f32;
        for index in 0..self.grid.len() {
            self.grid.add_depth(index, per_cell);
        }
        self.atmosphere.release_precipitation(actual);
        self.engine.sleep_mut().wake_all("precipitation");
        actual
    }

    /// Rebuilds the grid at a new size. Surface water is discarded and
    /// recorded as a `GridReset` withdrawal, as is soil moisture when the cell
    /// count changes. Waves and flow state start over.
    /// Invalid dimensions leave everything untouched.
    pub fn resize(&mut self, width: usize, height: usize) -> GridResult<()> {
        let grid = GridState::new(width, height)?;

        let discarded = self.ledger.available(Domain::Surface);
        self.ledger
            .withdraw(Domain::Surface, discarded, None, TransferReason::GridReset);

        let cells = width * height;
        let mut soil_discarded = 0.0;
        if cells != self.grid.len() {
            soil_discarded = self.ledger.available(Domain::SoilMoisture);
            self.ledger.withdraw(
                Domain::SoilMoisture,
                soil_discarded,
                None,
                TransferReason::GridReset,
            );
        }

        self.grid = grid;
        self.engine.resize(width, height);
        self.waves.resize(width, height);
        self.geology.resize(cells);
        self.springs.clear();
        self.terrain_mismatch = false;

        log::info!(
            "Hydrology grid resized to {}x{} ({:.3} m³ surface water, {:.3} m³ soil moisture discarded)",
            width,
            height,
            discarded,
            soil_discarded
        );
        Ok(())
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advances the simulation by `delta_time` seconds.
    pub fn tick(&mut self, delta_time: f32) -> TickSummary {
        let tick = self.ledger.begin_tick();

        match self.engine.sync_terrain(self.terrain.as_ref()) {
            Ok(_) => self.terrain_mismatch = false,
            Err(err) => {
                if !self.terrain_mismatch {
                    log::warn!("Skipping hydrology ticks: {}", err);
                }
                self.terrain_mismatch = true;
                self.last_summary = TickSummary {
                    skipped: true,
                    active_waves: self.waves.active_sources(),
                    ..Default::default()
                };
                return self.last_summary;
            }
        }

        let substeps = self.engine.clock_mut().advance(delta_time);
        let dt = self.engine.clock().substep();
        let mut summary = TickSummary {
            substeps,
            ..Default::default()
        };

        if substeps == 0 {
            self.waves.update(
                &self.grid,
                self.atmosphere.as_ref(),
                &self.config.waves,
                self.config.cell_size,
                delta_time,
            );
        }

        for substep in 0..substeps {
            summary.injected += self.apply_inputs(dt);

            if substep == 0 {
                // Both only read the grid.
                let grid = &self.grid;
                let config = &self.config;
                let atmosphere = self.atmosphere.as_ref();
                let waves = &mut self.waves;
                let engine = &mut self.engine;
                rayon::join(
                    || waves.update(grid, atmosphere, &config.waves, config.cell_size, delta_time),
                    || engine.compute(grid, config, dt),
                );
            } else {
                self.engine.compute(&self.grid, &self.config, dt);
            }

            let report = self.engine.commit(
                &mut self.grid,
                &mut self.ledger,
                self.geology.as_mut(),
                self.atmosphere.as_mut(),
                &self.config,
                dt,
            );
            summary.absorb(&report);
        }

        summary.active_waves = self.waves.active_sources();
        log::debug!(
            "[FLOW] Tick {}: {} substeps, moved {:.4} m³, drained {:.4} m³, {} waves",
            tick,
            summary.substeps,
            summary.moved,
            summary.edge_drainage,
            summary.active_waves
        );
        self.last_summary = summary;
        summary
    }

    /// Spring and rain input for one substep. Returns the volume injected.
    fn apply_inputs(&mut self, dt: f32) -> f64 {
        let area = self.config.cell_area() as f64;
        let mut injected = 0.0;

        for spring in &self.springs {
            let volume = self.ledger.inject(
                Domain::Surface,
                spring.rate * dt as f64,
                Some(spring.cell),
                TransferReason::Spring,
            );
            self.grid.add_depth(spring.cell, (volume / area) as f32);
            let (x, y) = self.grid.coords(spring.cell);
            self.engine.sleep_mut().wake_cell(x, y, "spring");
            injected += volume;
        }

        if self.rain_rate > 0.0 {
            let per_cell = (self.rain_rate * dt as f64) as f32;
            let mut applied = 0.0f64;
            for index in 0..self.grid.len() {
                applied += self.grid.add_depth(index, per_cell) as f64;
            }
            injected += self.ledger.inject(
                Domain::Surface,
                applied * area,
                None,
                TransferReason::Precipitation,
            );
            self.engine.sleep_mut().wake_all("rain");
        }

        injected
    }

    /// Checks ledger closure, surface agreement and non-negativity against
    /// the state at construction.
    pub fn audit(&mut self) -> ConservationReport {
        self.audit.check(
            &self.ledger,
            &self.grid,
            self.config.cell_area(),
            &self.baseline,
            self.config.conservation_epsilon,
        )
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn sample(&self, world: Vec2, field: Field) -> f32 {
        match self.world_to_cell(world) {
            Some(cell) => self.grid.bilinear_sample(field, cell.x, cell.y),
            None => 0.0,
        }
    }

    /// Water depth (m) at `world`.
    pub fn depth_at(&self, world: Vec2) -> f32 {
        self.sample(world, Field::Depth)
    }

    pub fn velocity_at(&self, world: Vec2) -> Vec2 {
        Vec2::new(
            self.sample(world, Field::VelocityX),
            self.sample(world, Field::VelocityY),
        )
    }

    pub fn foam_at(&self, world: Vec2) -> f32 {
        self.sample(world, Field::Foam)
    }

    /// Cosmetic wave offset (m) at `world`.
    pub fn displacement_at(&self, world: Vec2) -> f32 {
        match self.world_to_cell(world) {
            Some(cell) => self.waves.sample_displacement(cell.x, cell.y),
            None => 0.0,
        }
    }

    /// Terrain plus water depth (m) at `world`, without wave displacement.
    pub fn surface_elevation_at(&self, world: Vec2) -> f32 {
        match self.world_to_cell(world) {
            Some(cell) => {
                let terrain = bilinear(
                    self.engine.terrain(),
                    self.grid.width(),
                    self.grid.height(),
                    cell.x,
                    cell.y,
                );
                terrain + self.grid.bilinear_sample(Field::Depth, cell.x, cell.y)
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FlatTerrain, HeightField, SoilColumns};

    fn flat(width: usize, height: usize) -> HydroSimulation {
        HydroSimulation::new(
            HydroConfig::transport_only(),
            Arc::new(FlatTerrain::new(width, height)),
        )
        .unwrap()
    }

    fn centre(x: usize, y: usize) -> Vec2 {
        Vec2::new(x as f32 + 0.5, y as f32 + 0.5)
    }

    #[test]
    fn test_add_water_injects_exact_amount() {
        let mut sim = flat(5, 5);
        let added = sim.add_water(centre(2, 2), 50.0, 1.0);

        assert_eq!(added, 50.0);
        assert_eq!(sim.ledger().volume(Domain::Surface), 50.0);
        assert!((sim.grid().surface_volume(1.0) - 50.0).abs() < 1e-4);
        // Centre plus the four orthogonal neighbours
        assert_eq!(sim.grid().wet_cells(0.0), 5);
        assert!(sim.grid().depth_at(2, 2) > sim.grid().depth_at(2, 1));
    }

    #[test]
    fn test_small_radius_uses_nearest_cell() {
        let mut sim = flat(4, 4);
        sim.add_water(Vec2::new(1.9, 1.2), 3.0, 0.1);
        assert!((sim.grid().depth_at(1, 1) - 3.0).abs() < 1e-6);
        assert_eq!(sim.grid().wet_cells(0.0), 1);
    }

    #[test]
    fn test_out_of_bounds_manipulation_is_ignored() {
        let mut sim = flat(4, 4);
        assert_eq!(sim.add_water(Vec2::new(-3.0, 1.0), 5.0, 1.0), 0.0);
        assert_eq!(sim.add_water(centre(1, 1), f64::NAN, 1.0), 0.0);
        assert_eq!(sim.add_water(centre(1, 1), -2.0, 1.0), 0.0);
        assert_eq!(sim.remove_water(Vec2::new(50.0, 1.0), 5.0, 1.0), 0.0);
        assert_eq!(sim.ledger().record_count(), 0);
        assert_eq!(sim.depth_at(Vec2::new(-3.0, 1.0)), 0.0);
        assert_eq!(sim.velocity_at(Vec2::new(9.0, 9.0)), Vec2::ZERO);
        assert_eq!(sim.displacement_at(Vec2::new(9.0, 9.0)), 0.0);
    }

    #[test]
    fn test_remove_is_inverse_of_add() {
        let mut sim = flat(6, 6);
        let before = sim.ledger().volume(Domain::Surface);
        let added = sim.add_water(Vec2::new(3.2, 2.7), 12.0, 2.0);
        let removed = sim.remove_water(Vec2::new(3.2, 2.7), added, 2.0);

        assert!((removed - added).abs() < 1e-4);
        assert!((sim.ledger().volume(Domain::Surface) - before).abs() < 1e-4);
        assert_eq!(sim.grid().negative_cells(), 0);
    }

    #[test]
    fn test_remove_clamps_to_available() {
        let mut sim = flat(3, 3);
        sim.add_water_to_cell(1, 1, 2.0);
        let removed = sim.remove_water(centre(1, 1), 10.0, 0.0);

        assert!((removed - 2.0).abs() < 1e-6);
        assert_eq!(sim.grid().depth_at(1, 1), 0.0);
        assert_eq!(sim.ledger().volume(Domain::Surface), 0.0);
    }

    #[test]
    fn test_depth_at_cell_centre_is_exact() {
        let mut sim = flat(4, 3);
        for y in 0..3 {
            for x in 0..4 {
                sim.add_water_to_cell(x, y, (x * 3 + y) as f64 * 0.37);
            }
        }
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(sim.depth_at(centre(x, y)), sim.grid().depth_at(x as i64, y as i64));
            }
        }
    }

    #[test]
    fn test_springs_inject_per_substep() {
        let mut sim = flat(5, 5);
        let id = sim.add_spring(centre(2, 2), 0.6).unwrap();
        let substep = sim.config().substep;

        let summary = sim.tick(substep * 3.0);
        assert_eq!(summary.substeps, 3);
        let expected = 0.6 * substep as f64 * 3.0;
        assert!((summary.injected - expected).abs() < 1e-6);
        assert!((sim.ledger().injected(Domain::Surface) - expected).abs() < 1e-6);

        assert!(sim.remove_spring(id));
        assert!(!sim.remove_spring(id));
        assert_eq!(sim.add_spring(Vec2::new(-1.0, 0.0), 1.0), None);
    }

    #[test]
    fn test_rain_and_precipitation() {
        let config = HydroConfig {
            evaporation_rate: 1.0e-3,
            ..HydroConfig::transport_only()
        };
        let mut sim = HydroSimulation::new(config, Arc::new(FlatTerrain::new(4, 4))).unwrap();
        sim.rain(0.01);
        sim.tick(sim.config().substep * 2.0);
        sim.rain(0.0);
        assert!(sim.ledger().injected(Domain::Surface) > 0.0);
        assert!(sim.ledger().volume(Domain::Atmosphere) > 0.0);

        let atmosphere = sim.ledger().volume(Domain::Atmosphere);
        let moved = sim.precipitate(0.5);
        assert!((moved - atmosphere * 0.5).abs() < 1e-9);
        assert!(sim.audit().ok);
    }

    #[test]
    fn test_resize_records_discarded_water() {
        let mut sim = flat(4, 4);
        sim.add_water_to_cell(1, 1, 7.0);

        assert!(sim.resize(0, 3).is_err());
        assert_eq!(sim.grid().width(), 4);
        assert_eq!(sim.ledger().volume(Domain::Surface), 7.0);

        sim.resize(6, 2).unwrap();
        assert_eq!(sim.grid().len(), 12);
        assert_eq!(sim.ledger().volume(Domain::Surface), 0.0);
        let reset = sim
            .ledger()
            .records()
            .find(|record| record.reason == TransferReason::GridReset)
            .unwrap();
        assert_eq!(reset.actual, 7.0);
        assert!(sim.audit().ok);
    }

    #[test]
    fn test_terrain_mismatch_skips_tick() {
        let terrain = Arc::new(HeightField::new(4, 4));
        let mut sim =
            HydroSimulation::new(HydroConfig::transport_only(), terrain.clone()).unwrap();
        sim.add_water_to_cell(0, 0, 3.0);

        terrain.resize(5, 4);
        let summary = sim.tick(0.1);
        assert!(summary.skipped);
        assert_eq!(summary.substeps, 0);
        assert_eq!(sim.grid().depth_at(0, 0), 3.0);

        sim.resize(5, 4).unwrap();
        assert!(!sim.tick(0.1).skipped);
    }

    #[test]
    fn test_surface_elevation_includes_terrain() {
        let terrain = Arc::new(HeightField::new(3, 3));
        terrain.set_height(1, 1, 2.0);
        let mut sim = HydroSimulation::new(HydroConfig::transport_only(), terrain).unwrap();
        sim.add_water_to_cell(1, 1, 0.5);
        assert!((sim.surface_elevation_at(centre(1, 1)) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_infiltration_reaches_soil() {
        let config = HydroConfig {
            infiltration_rate: 0.01,
            ..HydroConfig::transport_only()
        };
        let mut sim = HydroSimulation::new(config, Arc::new(FlatTerrain::new(3, 3)))
            .unwrap()
            .with_geology(SoilColumns::new(9, 1.0));
        for y in 0..3 {
            for x in 0..3 {
                sim.add_water_to_cell(x, y, 1.0);
            }
        }
        let summary = sim.tick(sim.config().substep);
        assert!(summary.infiltrated > 0.0);
        assert!((sim.ledger().volume(Domain::SoilMoisture) - summary.infiltrated).abs() < 1e-9);
        assert!(sim.audit().ok);
    }

    fn soaked(width: usize, height: usize, geology: SoilColumns) -> HydroSimulation {
        let config = HydroConfig {
            infiltration_rate: 0.01,
            ..HydroConfig::transport_only()
        };
        let mut sim = HydroSimulation::new(config, Arc::new(FlatTerrain::new(width, height)))
            .unwrap()
            .with_geology(geology);
        for y in 0..height {
            for x in 0..width {
                sim.add_water_to_cell(x, y, 1.0);
            }
        }
        sim
    }

    #[test]
    fn test_installed_soil_keeps_saturation() {
        let mut soil = SoilColumns::new(9, 1.0);
        soil.saturate(4);
        let mut sim = soaked(3, 3, soil);
        assert_eq!(sim.geology().soil_moisture_capacity(4), 0.0);

        let summary = sim.tick(sim.config().substep);
        assert!(summary.infiltrated > 0.0);
        assert_eq!(sim.geology().soil_moisture_capacity(4), 0.0);
        let gained = sim.geology().stored_moisture() - 1.0;
        assert!((gained - summary.infiltrated).abs() < 1e-6);
        assert!(sim.audit().ok);
    }

    #[test]
    fn test_resize_writes_off_soil_moisture() {
        let mut sim = soaked(3, 3, SoilColumns::new(9, 1.0));
        sim.tick(sim.config().substep);
        let soil = sim.ledger().volume(Domain::SoilMoisture);
        assert!(soil > 0.0);

        sim.resize(3, 3).unwrap();
        assert_eq!(sim.ledger().volume(Domain::SoilMoisture), soil);
        assert!((sim.geology().stored_moisture() - soil).abs() < 1e-6);

        sim.resize(4, 4).unwrap();
        assert_eq!(sim.ledger().volume(Domain::SoilMoisture), 0.0);
        assert_eq!(sim.geology().stored_moisture(), 0.0);
        assert_eq!(sim.ledger().withdrawn(Domain::SoilMoisture), soil);
        assert!(sim.audit().ok);
    }

    #[test]
    fn test_coordinates_set_cell_size() {
        let mut sim = flat(4, 4);
        sim.add_water_to_cell(1, 1, 8.0);
        let mut sim = sim.with_coordinates(GridTransform::new(Vec2::ZERO, 2.0));

        assert_eq!(sim.config().cell_size, 2.0);
        assert!((sim.grid().depth_at(1, 1) - 2.0).abs() < 1e-6);
        assert!(sim.audit().ok);

        let added = sim.add_water(Vec2::new(5.0, 5.0), 3.0, 1.0);
        assert_eq!(added, 3.0);
        assert!((sim.grid().depth_at(2, 2) - 0.75).abs() < 1e-6);
        assert_eq!(sim.grid().depth_at(3, 2), 0.0);
        assert!(sim.audit().ok);
    }
}
