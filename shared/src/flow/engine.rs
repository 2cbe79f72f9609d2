//! Flow engine: owns the scratch state of the two-phase update.
//!
//! One substep is `compute` (gradient phase, read-only over the grid) followed
//! by `commit` (apply phase, exchange phase, sleep bookkeeping). The split is
//! public so the caller can overlap `compute` with other read-only work.

use bevy::math::UVec2;

use super::apply::{apply_outflows, ApplyScratch};
use super::clock::SubstepClock;
use super::exchange::{evaporate, infiltrate, ExchangeParams};
use super::gradient::{compute_outflows, GradientParams, OutflowPlan};
use super::sleep::TileSleepManager;
use crate::collaborators::{AtmosphereProvider, GeologyProvider, TerrainProvider};
use crate::config::HydroConfig;
use crate::error::{GridError, GridResult};
use crate::grid::GridState;
use crate::ledger::ConservationLedger;

/// What one substep did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubstepReport {
    /// Cells that produced outflow in the gradient phase.
    pub flowing_cells: usize,
    /// Volume moved between cells (m³).
    pub moved: f64,
    /// Volume drained off the grid into groundwater (m³).
    pub edge_drainage: f64,
    pub evaporated: f64,
    pub infiltrated: f64,
}

#[derive(Debug, Clone)]
pub struct FlowEngine {
    width: usize,
    height: usize,
    plan: OutflowPlan,
    scratch: ApplyScratch,
    terrain: Vec<f32>,
    terrain_revision: Option<u64>,
    sleep: TileSleepManager,
    clock: SubstepClock,
    planned_cells: usize,
}

impl FlowEngine {
    pub fn new(width: usize, height: usize, config: &HydroConfig) -> Self {
        Self {
            width,
            height,
            plan: OutflowPlan::new(width, height),
            scratch: ApplyScratch::new(width * height),
            terrain: vec![0.0; width * height],
            terrain_revision: None,
            sleep: TileSleepManager::new(width, height, config.sleep_enabled),
            clock: SubstepClock::new(config.substep, config.max_substeps),
            planned_cells: 0,
        }
    }

    /// Drops all scratch, sleep and terrain state for a new grid size.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.plan.resize(width, height);
        self.scratch = ApplyScratch::new(width * height);
        self.terrain = vec![0.0; width * height];
        self.terrain_revision = None;
        self.sleep.resize(width, height);
        self.clock.reset();
        self.planned_cells = 0;
    }

    /// Forces a fresh terrain copy at the next sync and wakes every tile.
    pub fn invalidate_terrain(&mut self) {
        self.terrain_revision = None;
        self.sleep.wake_all("terrain replaced");
    }

    /// Applies a changed configuration to the clock and the sleep manager.
    pub fn reconfigure(&mut self, config: &HydroConfig) {
        self.clock.reconfigure(config.substep, config.max_substeps);
        self.sleep.set_enabled(config.sleep_enabled);
    }

    #[inline]
    pub fn clock(&self) -> &SubstepClock {
        &self.clock
    }

    #[inline]
    pub fn clock_mut(&mut self) -> &mut SubstepClock {
        &mut self.clock
    }

    #[inline]
    pub fn sleep(&self) -> &TileSleepManager {
        &self.sleep
    }

    #[inline]
    pub fn sleep_mut(&mut self) -> &mut TileSleepManager {
        &mut self.sleep
    }

    /// Terrain heights the current tick sees.
    #[inline]
    pub fn terrain(&self) -> &[f32] {
        &self.terrain
    }

    #[inline]
    pub fn terrain_at(&self, index: usize) -> f32 {
        self.terrain.get(index).copied().unwrap_or(0.0)
    }

    pub fn plan(&self) -> &OutflowPlan {
        &self.plan
    }

    /// Re-snapshots terrain if the provider changed since the last copy,
    /// waking tiles whose heights moved. Returns whether a copy was made.
    pub fn sync_terrain(&mut self, terrain: &dyn TerrainProvider) -> GridResult<bool> {
        let actual = terrain.dimensions();
        if actual != (self.width, self.height) {
            return Err(GridError::TerrainMismatch {
                expected: (self.width, self.height),
                actual,
            });
        }

        let revision = terrain.revision();
        if self.terrain_revision == Some(revision) {
            return Ok(false);
        }

        let mut fresh = vec![0.0; self.width * self.height];
        terrain.copy_heights(&mut fresh);

        if self.terrain_revision.is_some() {
            let mut changed = 0;
            for (i, (old, new)) in self.terrain.iter().zip(&fresh).enumerate() {
                if old != new {
                    let (x, y) = ((i % self.width) as u32, (i / self.width) as u32);
                    // Neighbours may now drain toward the edited cell too.
                    self.sleep.wake_region(
                        UVec2::new(x.saturating_sub(1), y.saturating_sub(1)),
                        UVec2::new(x + 1, y + 1),
                        "terrain changed",
                    );
                    changed += 1;
                }
            }
            log::debug!(
                "[FLOW] Terrain revision {} -> {}: {} cells changed",
                self.terrain_revision.unwrap_or_default(),
                revision,
                changed
            );
        }

        self.terrain = fresh;
        self.terrain_revision = Some(revision);
        Ok(true)
    }

    /// Gradient phase. Reads `grid` only.
    pub fn compute(&mut self, grid: &GridState, config: &HydroConfig, dt: f32) -> usize {
        let params = GradientParams::from_config(config, dt);
        self.planned_cells =
            compute_outflows(grid, &self.terrain, &params, &self.sleep, &mut self.plan);
        self.planned_cells
    }

    /// Apply and exchange phases for the plan made by [`FlowEngine::compute`].
    pub fn commit(
        &mut self,
        grid: &mut GridState,
        ledger: &mut ConservationLedger,
        geology: &mut dyn GeologyProvider,
        atmosphere: &mut dyn AtmosphereProvider,
        config: &HydroConfig,
        dt: f32,
    ) -> SubstepReport {
        let applied = apply_outflows(
            grid,
            &self.plan,
            ledger,
            geology,
            &mut self.sleep,
            &mut self.scratch,
            config,
            dt,
        );

        let exchange = ExchangeParams {
            cell_area: config.cell_area(),
            min_depth: config.min_depth,
            evaporation_rate: config.evaporation_rate,
            infiltration_rate: config.infiltration_rate,
        };
        let evaporated = evaporate(grid, ledger, atmosphere, &exchange, dt);
        let infiltrated = infiltrate(grid, ledger, geology, &exchange, dt);

        self.sleep.update_all();

        SubstepReport {
            flowing_cells: self.planned_cells,
            moved: applied.moved,
            edge_drainage: applied.edge_drained,
            evaporated,
            infiltrated,
        }
    }

    /// Runs one full substep.
    pub fn step(
        &mut self,
        grid: &mut GridState,
        ledger: &mut ConservationLedger,
        geology: &mut dyn GeologyProvider,
        atmosphere: &mut dyn AtmosphereProvider,
        config: &HydroConfig,
        dt: f32,
    ) -> SubstepReport {
        self.compute(grid, config, dt);
        self.commit(grid, ledger, geology, atmosphere, config, dt)
    }
}
