//! Geology/groundwater collaborator.
//!
//! Receives water the surface loses to the ground: infiltration into soil
//! moisture and edge drainage into groundwater. The ledger decides how much
//! moves; the collaborator decides how much soil can take.

/// Soil and groundwater storage below the surface grid.
pub trait GeologyProvider: Send + Sync {
    /// Remaining soil-moisture headroom (m³) at `cell`.
    fn soil_moisture_capacity(&self, cell: usize) -> f32;

    /// Offers `amount` (m³) of infiltrating water to the soil at `cell`.
    /// Returns the volume actually accepted, `0.0` when saturated.
    fn accept_infiltration(&mut self, cell: usize, amount: f32) -> f32;

    /// Notification that `amount` (m³) reached groundwater, optionally at a
    /// specific cell (edge drainage).
    fn credit_groundwater(&mut self, cell: Option<usize>, amount: f64);

    /// Total soil moisture (m³) held across all columns.
    fn stored_moisture(&self) -> f64 {
        0.0
    }

    /// Called when the grid is rebuilt with a new cell count. Stored soil
    /// moisture is kept when the count is unchanged and discarded otherwise.
    fn resize(&mut self, _cells: usize) {}
}

/// Ground that accepts nothing: everything stays on the surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpermeableBedrock {
    /// Groundwater received through edge drainage.
    pub groundwater: f64,
}

impl GeologyProvider for ImpermeableBedrock {
    fn soil_moisture_capacity(&self, _cell: usize) -> f32 {
        0.0
    }

    fn accept_infiltration(&mut self, _cell: usize, _amount: f32) -> f32 {
        0.0
    }

    fn credit_groundwater(&mut self, _cell: Option<usize>, amount: f64) {
        self.groundwater += amount;
    }
}

/// Per-cell soil columns with a fixed moisture capacity each.
#[derive(Debug, Clone)]
pub struct SoilColumns {
    capacity_per_cell: f32,
    moisture: Vec<f32>,
    groundwater: f64,
}

impl SoilColumns {
    /// `capacity_per_cell` is the saturation volume (m³) of one column.
    pub fn new(cells: usize, capacity_per_cell: f32) -> Self {
        Self {
            capacity_per_cell: capacity_per_cell.max(0.0),
            moisture: vec![0.0; cells],
            groundwater: 0.0,
        }
    }

    /// Stored moisture (m³) at `cell`, 0 out of range.
    pub fn moisture(&self, cell: usize) -> f32 {
        self.moisture.get(cell).copied().unwrap_or(0.0)
    }

    pub fn total_moisture(&self) -> f64 {
        self.moisture.iter().map(|&m| m as f64).sum()
    }

    pub fn groundwater(&self) -> f64 {
        self.groundwater
    }

    /// Fills a column to saturation (used to model waterlogged ground).
    pub fn saturate(&mut self, cell: usize) {
        if let Some(m) = self.moisture.get_mut(cell) {
            *m = self.capacity_per_cell;
        }
    }
}

impl GeologyProvider for SoilColumns {
    fn soil_moisture_capacity(&self, cell: usize) -> f32 {
        self.moisture
            .get(cell)
            .map(|m| (self.capacity_per_cell - m).max(0.0))
            .unwrap_or(0.0)
    }

    fn accept_infiltration(&mut self, cell: usize, amount: f32) -> f32 {
        let capacity = self.capacity_per_cell;
        let Some(moisture) = self.moisture.get_mut(cell) else {
            return 0.0;
        };
        if amount.is_nan() || amount <= 0.0 {
            return 0.0;
        }
        let accepted = amount.min((capacity - *moisture).max(0.0));
        *moisture += accepted;
        accepted
    }

    fn credit_groundwater(&mut self, _cell: Option<usize>, amount: f64) {
        self.groundwater += amount;
    }

    fn stored_moisture(&self) -> f64 {
        self.total_moisture()
    }

    fn resize(&mut self, cells: usize) {
        if cells != self.moisture.len() {
            self.moisture = vec![0.0; cells];
        }
    }
}
