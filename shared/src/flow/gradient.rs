//! Gradient phase: read-only computation of per-cell outflows.
//!
//! ## Algorithm
//! For each wet cell, `surface = terrain + depth` is compared with each of the
//! 8 neighbours. A neighbour lower by more than the flow threshold receives a
//! candidate volume `c * Δh * cell_area * weight`. If the candidates together
//! exceed what the cell may give up this substep, all of them are scaled by
//! the same factor, so a cell can never send more than it holds.
//!
//! The phase writes only into an [`OutflowPlan`]; rows are processed in
//! parallel since each row writes a disjoint slice of the plan.

use rayon::prelude::*;

use super::sleep::TileSleepManager;
use crate::config::{EdgeMode, HydroConfig};
use crate::grid::{neighbor_index, GridState, NEIGHBOR_COUNT, NEIGHBOR_WEIGHTS, OPPOSITE};

/// Upper bound of `flow_rate * dt`: the fraction of a height difference
/// that may cross one edge in one substep. Keeps the explicit scheme stable
/// with 8 neighbours.
pub const MAX_EDGE_FRACTION: f32 = 0.125;

/// Substep-invariant inputs of the gradient phase.
#[derive(Debug, Clone, Copy)]
pub struct GradientParams {
    pub cell_area: f32,
    /// `min(flow_rate * dt, MAX_EDGE_FRACTION)`
    pub coefficient: f32,
    pub min_flow_threshold: f32,
    pub min_depth: f32,
    pub max_outflow_fraction: f32,
    pub edge_mode: EdgeMode,
}

impl GradientParams {
    pub fn from_config(config: &HydroConfig, dt: f32) -> Self {
        Self {
            cell_area: config.cell_area(),
            coefficient: (config.flow_rate * dt).clamp(0.0, MAX_EDGE_FRACTION),
            min_flow_threshold: config.min_flow_threshold,
            min_depth: config.min_depth,
            max_outflow_fraction: config.max_outflow_fraction,
            edge_mode: config.edge_mode,
        }
    }
}

/// Scratch buffer of outflow volumes (m³), one slot per direction per cell.
///
/// Slots whose neighbour is off-grid hold edge drainage.
#[derive(Debug, Clone, Default)]
pub struct OutflowPlan {
    width: usize,
    outflow: Vec<[f32; NEIGHBOR_COUNT]>,
}

impl OutflowPlan {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            outflow: vec![[0.0; NEIGHBOR_COUNT]; width * height],
        }
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        *self = Self::new(width, height);
    }

    #[inline]
    pub fn outflows(&self, index: usize) -> &[f32; NEIGHBOR_COUNT] {
        &self.outflow[index]
    }

    /// Total volume leaving `index` this substep.
    #[inline]
    pub fn total_outflow(&self, index: usize) -> f32 {
        self.outflow[index].iter().sum()
    }

    pub fn len(&self) -> usize {
        self.outflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outflow.is_empty()
    }

    pub fn clear(&mut self) {
        self.outflow.fill([0.0; NEIGHBOR_COUNT]);
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }
}

/// Fills `plan` from the current grid. Cells skipped by `sleep` get no
/// outflow. Returns the number of cells that produced any outflow.
pub fn compute_outflows(
    grid: &GridState,
    terrain: &[f32],
    params: &GradientParams,
    sleep: &TileSleepManager,
    plan: &mut OutflowPlan,
) -> usize {
    let width = grid.width();
    let height = grid.height();
    if plan.len() != grid.len() {
        plan.resize(width, height);
    }
    let depth = grid.depth();

    plan.outflow
        .par_chunks_mut(width)
        .enumerate()
        .map(|(y, row)| {
            let mut flowing = 0;
            for (x, slots) in row.iter_mut().enumerate() {
                *slots = [0.0; NEIGHBOR_COUNT];
                let i = y * width + x;
                let d = depth[i];
                if d <= params.min_depth || !sleep.should_simulate(x, y) {
                    continue;
                }
                if cell_outflows(x, y, width, height, depth, terrain, params, slots) {
                    flowing += 1;
                }
            }
            flowing
        })
        .sum()
}

/// Computes the eight outflows of one cell. Returns whether any is nonzero.
#[inline]
fn cell_outflows(
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    depth: &[f32],
    terrain: &[f32],
    params: &GradientParams,
    slots: &mut [f32; NEIGHBOR_COUNT],
) -> bool {
    let i = y * width + x;
    let surface = terrain[i] + depth[i];
    let mut total = 0.0;

    for dir in 0..NEIGHBOR_COUNT {
        let neighbor_surface = match neighbor_index(x, y, dir, width, height) {
            Some(j) => terrain[j] + depth[j],
            None => match ghost_surface(x, y, dir, width, height, surface, depth, terrain, params.edge_mode) {
                Some(ghost) => ghost,
                None => continue,
            },
        };

        let height_diff = surface - neighbor_surface;
        if height_diff <= params.min_flow_threshold {
            continue;
        }

        let q = params.coefficient * height_diff * params.cell_area * NEIGHBOR_WEIGHTS[dir];
        slots[dir] = q;
        total += q;
    }

    if total <= 0.0 {
        return false;
    }

    // Uniform scaling keeps the flow direction pattern while capping volume.
    let available = depth[i] * params.cell_area * params.max_outflow_fraction;
    if total > available {
        let scale = available / total;
        for q in slots.iter_mut() {
            *q *= scale;
        }
    }
    true
}

/// Water-surface elevation assumed beyond the grid edge in direction `dir`,
/// or `None` when the edge is closed.
#[inline]
pub fn ghost_surface(
    x: usize,
    y: usize,
    dir: usize,
    width: usize,
    height: usize,
    surface: f32,
    depth: &[f32],
    terrain: &[f32],
    edge_mode: EdgeMode,
) -> Option<f32> {
    match edge_mode {
        EdgeMode::Closed => None,
        EdgeMode::Sink { level } => Some(level),
        EdgeMode::Outflow => {
            // Continue the slope from the cell on the opposite side.
            let inner = neighbor_index(x, y, OPPOSITE[dir], width, height)
                .map(|j| terrain[j] + depth[j]);
            Some(match inner {
                Some(inner_surface) => 2.0 * surface - inner_surface,
                None => surface,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::neighbor_index;

    fn params(edge_mode: EdgeMode) -> GradientParams {
        let config = HydroConfig {
            edge_mode,
            ..HydroConfig::transport_only()
        };
        GradientParams::from_config(&config, config.substep)
    }

    fn grid_with(width: usize, height: usize, depths: &[f32]) -> GridState {
        let mut grid = GridState::new(width, height).unwrap();
        for (i, &d) in depths.iter().enumerate() {
            grid.add_depth(i, d);
        }
        grid
    }

    fn plan_for(grid: &GridState, terrain: &[f32], params: &GradientParams) -> OutflowPlan {
        let sleep = TileSleepManager::new(grid.width(), grid.height(), false);
        let mut plan = OutflowPlan::new(grid.width(), grid.height());
        compute_outflows(grid, terrain, params, &sleep, &mut plan);
        plan
    }

    #[test]
    fn test_flat_pool_has_no_flow() {
        let grid = grid_with(3, 3, &[10.0; 9]);
        let terrain = vec![0.0; 9];
        let plan = plan_for(&grid, &terrain, &params(EdgeMode::Outflow));

        for i in 0..9 {
            assert_eq!(plan.total_outflow(i), 0.0, "cell {} should not flow", i);
        }
    }

    #[test]
    fn test_outflow_never_exceeds_volume() {
        let mut depths = [0.0; 9];
        depths[4] = 10.0;
        let grid = grid_with(3, 3, &depths);
        let terrain = vec![0.0; 9];
        let mut p = params(EdgeMode::Closed);
        p.coefficient = MAX_EDGE_FRACTION;

        let plan = plan_for(&grid, &terrain, &p);
        let total = plan.total_outflow(4);
        assert!(total > 0.0);
        assert!(total <= 10.0 * p.cell_area + 1e-4);

        // Orthogonal neighbours receive more than diagonal ones
        let out = plan.outflows(4);
        assert!(out[0] > out[4]);
    }

    #[test]
    fn test_uniform_scaling_when_capped() {
        // Shallow cell far above its neighbours: the cap must bind.
        let grid = grid_with(3, 3, &[0.0, 0.0, 0.0, 0.0, 0.01, 0.0, 0.0, 0.0, 0.0]);
        let mut terrain = vec![0.0; 9];
        terrain[4] = 50.0;
        let p = params(EdgeMode::Closed);

        let plan = plan_for(&grid, &terrain, &p);
        let total = plan.total_outflow(4);
        assert!((total - 0.01 * p.cell_area).abs() < 1e-6);

        let out = plan.outflows(4);
        assert!((out[0] - out[1]).abs() < 1e-9);
        assert!((out[4] / out[0] - NEIGHBOR_WEIGHTS[4]).abs() < 1e-4);
    }

    #[test]
    fn test_closed_edges_never_drain() {
        let grid = grid_with(2, 1, &[1.0, 0.0]);
        let terrain = vec![5.0, 0.0];
        let plan = plan_for(&grid, &terrain, &params(EdgeMode::Closed));

        for dir in 0..NEIGHBOR_COUNT {
            if neighbor_index(0, 0, dir, 2, 1).is_none() {
                assert_eq!(plan.outflows(0)[dir], 0.0);
            }
        }
        assert!(plan.outflows(0)[0] > 0.0);
    }

    #[test]
    fn test_slope_toward_edge_drains() {
        // Terrain falls toward x = 0, so the ghost continues downhill.
        let grid = grid_with(3, 1, &[0.5, 0.0, 0.0]);
        let terrain = vec![0.0, 1.0, 2.0];
        let plan = plan_for(&grid, &terrain, &params(EdgeMode::Outflow));

        // Direction 1 is -x, off-grid for x = 0.
        assert!(plan.outflows(0)[1] > 0.0);
    }

    #[test]
    fn test_sink_level_controls_drainage() {
        let grid = grid_with(1, 1, &[1.0]);
        let terrain = vec![0.0];

        let low = plan_for(&grid, &terrain, &params(EdgeMode::Sink { level: -1.0 }));
        assert!(low.total_outflow(0) > 0.0);

        let high = plan_for(&grid, &terrain, &params(EdgeMode::Sink { level: 3.0 }));
        assert_eq!(high.total_outflow(0), 0.0);
    }

    #[test]
    fn test_dry_cells_do_not_flow() {
        let grid = grid_with(2, 1, &[0.0, 0.0]);
        let terrain = vec![10.0, 0.0];
        let plan = plan_for(&grid, &terrain, &params(EdgeMode::Outflow));
        assert_eq!(plan.total_outflow(0), 0.0);
    }
}
