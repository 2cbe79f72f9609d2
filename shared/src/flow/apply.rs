//! Apply phase: serial commit of an [`OutflowPlan`].
//!
//! Internal flows are accumulated as paired deltas (the source loses exactly
//! what the destination gains) and committed together, so the result does
//! not depend on cell order. Off-grid flow is routed through the ledger as
//! edge drainage; whatever the ledger cannot move stays in the edge cell.

use rayon::prelude::*;

use super::gradient::OutflowPlan;
use super::sleep::TileSleepManager;
use crate::collaborators::GeologyProvider;
use crate::config::HydroConfig;
use crate::grid::{neighbor_index, GridState, NEIGHBOR_COUNT, NEIGHBOR_DIRECTIONS};
use crate::ledger::ConservationLedger;

/// Depth floor (m) used when turning flux into velocity, so films of water
/// do not produce huge speeds.
pub const MIN_VELOCITY_DEPTH: f32 = 0.01;

/// Reusable per-cell buffers of the apply phase.
#[derive(Debug, Clone, Default)]
pub struct ApplyScratch {
    /// Net volume change (m³).
    delta: Vec<f32>,
    /// Directional volume flux through each cell (m³).
    flux_x: Vec<f32>,
    flux_y: Vec<f32>,
}

impl ApplyScratch {
    pub fn new(cells: usize) -> Self {
        Self {
            delta: vec![0.0; cells],
            flux_x: vec![0.0; cells],
            flux_y: vec![0.0; cells],
        }
    }

    fn reset(&mut self, cells: usize) {
        for buffer in [&mut self.delta, &mut self.flux_x, &mut self.flux_y] {
            buffer.clear();
            buffer.resize(cells, 0.0);
        }
    }

    /// Net volume change of `index` in the last committed substep.
    pub fn delta(&self, index: usize) -> f32 {
        self.delta.get(index).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ApplyReport {
    /// Volume moved between grid cells (m³).
    pub moved: f64,
    /// Off-grid volume requested from the ledger (m³).
    pub edge_requested: f64,
    /// Off-grid volume the ledger actually moved to groundwater (m³).
    pub edge_drained: f64,
    /// Cells that sent water anywhere.
    pub flowing_cells: usize,
}

/// Commits `plan` to `grid`, then updates velocity and foam.
pub fn apply_outflows(
    grid: &mut GridState,
    plan: &OutflowPlan,
    ledger: &mut ConservationLedger,
    geology: &mut dyn GeologyProvider,
    sleep: &mut TileSleepManager,
    scratch: &mut ApplyScratch,
    config: &HydroConfig,
    dt: f32,
) -> ApplyReport {
    let width = grid.width();
    let height = grid.height();
    let cells = grid.len();
    let cell_area = config.cell_area();
    scratch.reset(cells);

    let mut report = ApplyReport::default();

    // Record flows
    for i in 0..cells {
        let outflows = plan.outflows(i);
        if outflows.iter().all(|&q| q <= 0.0) {
            continue;
        }
        report.flowing_cells += 1;

        let (x, y) = (i % width, i / width);
        let mut off_grid = 0.0f32;

        for dir in 0..NEIGHBOR_COUNT {
            let q = outflows[dir];
            if q <= 0.0 {
                continue;
            }
            let [ux, uy] = NEIGHBOR_DIRECTIONS[dir];
            scratch.flux_x[i] += q * ux;
            scratch.flux_y[i] += q * uy;

            match neighbor_index(x, y, dir, width, height) {
                Some(j) => {
                    scratch.delta[i] -= q;
                    scratch.delta[j] += q;
                    scratch.flux_x[j] += q * ux;
                    scratch.flux_y[j] += q * uy;
                    report.moved += q as f64;
                }
                None => off_grid += q,
            }
        }

        if off_grid > 0.0 {
            let requested = off_grid as f64;
            let actual = ledger.transfer_surface_to_groundwater(Some(i), requested);
            if actual > 0.0 {
                geology.credit_groundwater(Some(i), actual);
                scratch.delta[i] -= actual as f32;
            }
            if actual < requested {
                log::trace!(
                    "[FLOW] Edge drainage at ({}, {}) short by {:.6} m³, kept on surface",
                    x,
                    y,
                    requested - actual
                );
            }
            report.edge_requested += requested;
            report.edge_drained += actual;
        }
    }

    // Commit depth
    for i in 0..cells {
        let delta = scratch.delta[i];
        if delta != 0.0 {
            grid.add_depth(i, delta / cell_area);
            sleep.record_activity(i % width, i / width, delta);
        }
    }

    update_velocity_and_foam(grid, scratch, config, dt);
    report
}

/// Exponentially blends velocity toward the substep's flux estimate and
/// advances foam. Per-cell independent, so it runs in parallel.
fn update_velocity_and_foam(
    grid: &mut GridState,
    scratch: &ApplyScratch,
    config: &HydroConfig,
    dt: f32,
) {
    let blend = 1.0 - (-dt / config.velocity_time_constant).exp();
    let foam_retain = (-config.foam_decay * dt).exp();
    let cell_size = config.cell_size;
    let min_depth = config.min_depth;
    let max_velocity = config.max_velocity;
    let foam_gain = config.foam_gain;
    let foam_threshold = config.foam_speed_threshold;

    let (depth, velocity_x, velocity_y, foam) = grid.fields_mut();
    let depth = &*depth;

    velocity_x
        .par_iter_mut()
        .zip(velocity_y.par_iter_mut())
        .zip(foam.par_iter_mut())
        .enumerate()
        .for_each(|(i, ((vx, vy), f))| {
            let d = depth[i];
            let (target_x, target_y) = if d > min_depth {
                let denom = dt * cell_size * d.max(MIN_VELOCITY_DEPTH);
                (scratch.flux_x[i] / denom, scratch.flux_y[i] / denom)
            } else {
                (0.0, 0.0)
            };

            let mut nx = *vx + blend * (target_x - *vx);
            let mut ny = *vy + blend * (target_y - *vy);
            let speed = (nx * nx + ny * ny).sqrt();
            if speed > max_velocity {
                let k = max_velocity / speed;
                nx *= k;
                ny *= k;
            }
            *vx = nx;
            *vy = ny;

            let speed = speed.min(max_velocity);
            let generated = if d > min_depth {
                foam_gain * (speed - foam_threshold).max(0.0) * dt
            } else {
                0.0
            };
            *f = ((*f + generated) * foam_retain).clamp(0.0, 1.0);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ImpermeableBedrock;
    use crate::config::EdgeMode;
    use crate::flow::gradient::{compute_outflows, GradientParams};
    use crate::ledger::{Domain, TransferReason};

    struct Fixture {
        grid: GridState,
        ledger: ConservationLedger,
        geology: ImpermeableBedrock,
        sleep: TileSleepManager,
        scratch: ApplyScratch,
        plan: OutflowPlan,
        config: HydroConfig,
    }

    impl Fixture {
        fn new(width: usize, height: usize, depths: &[f32], edge_mode: EdgeMode) -> Self {
            let config = HydroConfig {
                edge_mode,
                ..HydroConfig::transport_only()
            };
            let mut grid = GridState::new(width, height).unwrap();
            let mut ledger = ConservationLedger::new(64);
            for (i, &d) in depths.iter().enumerate() {
                grid.add_depth(i, d);
                ledger.inject(
                    Domain::Surface,
                    (d * config.cell_area()) as f64,
                    Some(i),
                    TransferReason::External,
                );
            }
            Self {
                sleep: TileSleepManager::new(width, height, false),
                scratch: ApplyScratch::new(width * height),
                plan: OutflowPlan::new(width, height),
                grid,
                ledger,
                geology: ImpermeableBedrock::default(),
                config,
            }
        }

        fn substep(&mut self, terrain: &[f32]) -> ApplyReport {
            let dt = self.config.substep;
            let params = GradientParams::from_config(&self.config, dt);
            compute_outflows(&self.grid, terrain, &params, &self.sleep, &mut self.plan);
            apply_outflows(
                &mut self.grid,
                &self.plan,
                &mut self.ledger,
                &mut self.geology,
                &mut self.sleep,
                &mut self.scratch,
                &self.config,
                dt,
            )
        }
    }

    #[test]
    fn test_internal_flow_conserves_volume() {
        let mut depths = [0.0; 9];
        depths[4] = 10.0;
        let mut fx = Fixture::new(3, 3, &depths, EdgeMode::Closed);
        let before = fx.grid.surface_volume(1.0);

        let report = fx.substep(&[0.0; 9]);

        assert!(report.moved > 0.0);
        assert_eq!(report.edge_drained, 0.0);
        assert!((fx.grid.surface_volume(1.0) - before).abs() < 1e-4);
        assert!(fx.grid.depth_at(0, 0) > 0.0);
        assert!(fx.grid.depth_at(1, 1) < 10.0);
    }

    #[test]
    fn test_edge_drainage_is_credited_to_groundwater() {
        let mut fx = Fixture::new(1, 1, &[1.0], EdgeMode::Sink { level: -5.0 });
        let before = fx.grid.surface_volume(1.0);

        let report = fx.substep(&[0.0]);
        let lost = before - fx.grid.surface_volume(1.0);

        assert!(report.edge_drained > 0.0);
        assert!((lost - report.edge_drained).abs() < 1e-5);
        assert!((fx.ledger.volume(Domain::Groundwater) - report.edge_drained).abs() < 1e-12);
        assert!((fx.geology.groundwater - report.edge_drained).abs() < 1e-12);
    }

    #[test]
    fn test_ledger_shortfall_keeps_water_on_surface() {
        let mut fx = Fixture::new(1, 1, &[1.0], EdgeMode::Sink { level: -5.0 });
        // Drain the ledger so it cannot honour drainage.
        let all = fx.ledger.available(Domain::Surface);
        fx.ledger
            .withdraw(Domain::Surface, all, None, TransferReason::External);

        let report = fx.substep(&[0.0]);

        assert!(report.edge_requested > 0.0);
        assert_eq!(report.edge_drained, 0.0);
        assert_eq!(fx.grid.depth_at(0, 0), 1.0);
    }

    #[test]
    fn test_velocity_follows_flow_direction() {
        let mut fx = Fixture::new(3, 1, &[0.0, 0.0, 0.0], EdgeMode::Closed);
        fx.grid.add_depth(0, 1.0);
        let terrain = [0.0, 0.0, 0.0];

        fx.substep(&terrain);

        let v = fx.grid.velocity_at(1, 0);
        assert!(v.x > 0.0);
        assert!(v.y.abs() < 1e-6);
    }

    #[test]
    fn test_still_water_foam_decays() {
        let mut fx = Fixture::new(1, 1, &[1.0], EdgeMode::Closed);
        fx.grid.fields_mut().3[0] = 1.0;

        fx.substep(&[0.0]);

        let foam = fx.grid.foam_at(0, 0);
        assert!(foam < 1.0 && foam > 0.0);
    }
}
