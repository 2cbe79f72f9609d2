/// Default grid edge length in cells (2^9 + 1, matching common DEM tile sizes).
pub const DEFAULT_GRID_SIZE: usize = 513;

/// Hard upper bound on the number of cells a grid may hold.
pub const MAX_GRID_CELLS: usize = 4097 * 4097;

/// Default horizontal size of one cell in metres.
pub const DEFAULT_CELL_SIZE: f32 = 1.0;

/// Rate at which the host loop is expected to call `tick`.
pub const TICKS_PER_SECOND: u64 = 30;

/// Gravitational acceleration (m/s²).
pub const GRAVITY: f32 = 9.81;

/// Surface tension of water over its density (m³/s²), used by the
/// capillary term of the dispersion relation.
pub const SURFACE_TENSION_OVER_DENSITY: f32 = 0.072 / 1000.0;

pub const CONFIG_READ_ERROR: &str = "Failed to read hydrology config file";
