//! Authoritative per-cell hydrological state.
//!
//! ## Data Model
//! - Four dense row-major arrays of `width * height` cells:
//!   `depth` (m, never negative), `velocity_x`/`velocity_y` (m/s) and
//!   `foam` (0..1, purely visual)
//! - Water volume of a cell is `depth * cell_area`
//! - Readers get bounds-checked accessors that return 0 out of range;
//!   writers are limited to this crate (the manipulation API and the flow
//!   engine's apply phase)

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_GRID_CELLS;
use crate::error::{validate_dimensions, GridResult};

/// Selects one of the sampled per-cell fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Depth,
    VelocityX,
    VelocityY,
    Foam,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridState {
    width: usize,
    height: usize,
    depth: Vec<f32>,
    velocity_x: Vec<f32>,
    velocity_y: Vec<f32>,
    foam: Vec<f32>,
}

impl GridState {
    /// Creates a dry, still grid.
    pub fn new(width: usize, height: usize) -> GridResult<Self> {
        let cells = validate_dimensions(width, height, MAX_GRID_CELLS)?;
        Ok(Self {
            width,
            height,
            depth: vec![0.0; cells],
            velocity_x: vec![0.0; cells],
            velocity_y: vec![0.0; cells],
            foam: vec![0.0; cells],
        })
    }

    /// Reinitialises every array to defaults at the new size.
    ///
    /// Invalid dimensions are rejected and the current state is kept.
    pub fn resize(&mut self, width: usize, height: usize) -> GridResult<()> {
        *self = Self::new(width, height)?;
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.depth.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u64) < self.width as u64 && (y as u64) < self.height as u64
    }

    /// Row-major index of `(x, y)`, or `None` out of range.
    #[inline]
    pub fn index(&self, x: i64, y: i64) -> Option<usize> {
        if self.contains(x, y) {
            Some(y as usize * self.width + x as usize)
        } else {
            None
        }
    }

    /// Inverse of [`GridState::index`].
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    /// Depth (m) at `(x, y)`, 0 out of range.
    #[inline]
    pub fn depth_at(&self, x: i64, y: i64) -> f32 {
        self.index(x, y).map(|i| self.depth[i]).unwrap_or(0.0)
    }

    /// Velocity (m/s) at `(x, y)`, zero out of range.
    #[inline]
    pub fn velocity_at(&self, x: i64, y: i64) -> Vec2 {
        self.index(x, y)
            .map(|i| Vec2::new(self.velocity_x[i], self.velocity_y[i]))
            .unwrap_or(Vec2::ZERO)
    }

    /// Foam intensity at `(x, y)`, 0 out of range.
    #[inline]
    pub fn foam_at(&self, x: i64, y: i64) -> f32 {
        self.index(x, y).map(|i| self.foam[i]).unwrap_or(0.0)
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn velocity_x(&self) -> &[f32] {
        &self.velocity_x
    }

    pub fn velocity_y(&self) -> &[f32] {
        &self.velocity_y
    }

    pub fn foam(&self) -> &[f32] {
        &self.foam
    }

    pub fn field(&self, field: Field) -> &[f32] {
        match field {
            Field::Depth => &self.depth,
            Field::VelocityX => &self.velocity_x,
            Field::VelocityY => &self.velocity_y,
            Field::Foam => &self.foam,
        }
    }

    /// Bilinear sample of `field` at fractional cell coordinates.
    ///
    /// Coordinates are clamped to the grid, so edges extend outward. At
    /// integer coordinates this returns the raw cell value exactly.
    pub fn bilinear_sample(&self, field: Field, fx: f32, fy: f32) -> f32 {
        bilinear(self.field(field), self.width, self.height, fx, fy)
    }

    /// Total surface water volume (m³), accumulated in f64.
    pub fn surface_volume(&self, cell_area: f32) -> f64 {
        let area = cell_area as f64;
        self.depth.iter().map(|&d| d as f64 * area).sum()
    }

    /// Number of cells holding more than `threshold` metres of water.
    pub fn wet_cells(&self, threshold: f32) -> usize {
        self.depth.iter().filter(|&&d| d > threshold).count()
    }

    pub fn max_depth(&self) -> f32 {
        self.depth.iter().copied().fold(0.0, f32::max)
    }

    /// Cells violating the non-negativity invariant (should always be 0).
    pub fn negative_cells(&self) -> usize {
        self.depth.iter().filter(|&&d| d < 0.0 || d.is_nan()).count()
    }

    // ------------------------------------------------------------------
    // Crate-internal mutation (manipulation API and flow apply phase)
    // ------------------------------------------------------------------

    /// Adds `delta` metres to a cell's depth, never going below zero.
    /// Returns the depth change actually applied.
    #[inline]
    pub(crate) fn add_depth(&mut self, index: usize, delta: f32) -> f32 {
        let Some(d) = self.depth.get_mut(index) else {
            return 0.0;
        };
        let before = *d;
        *d = (before + delta).max(0.0);
        *d - before
    }

    #[inline]
    pub(crate) fn depth_mut(&mut self) -> &mut [f32] {
        &mut self.depth
    }

    /// Split borrow of all mutable arrays for the apply phase.
    #[inline]
    pub(crate) fn fields_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [f32], &mut [f32]) {
        (
            &mut self.depth,
            &mut self.velocity_x,
            &mut self.velocity_y,
            &mut self.foam,
        )
    }
}

/// Bilinear interpolation over a row-major `width x height` buffer.
///
/// Coordinates are clamped to the buffer, so edges extend outward. NaN reads
/// as 0. At integer coordinates this returns the raw value exactly.
pub fn bilinear(values: &[f32], width: usize, height: usize, fx: f32, fy: f32) -> f32 {
    if width == 0 || height == 0 || values.len() < width * height {
        return 0.0;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let fx = if fx.is_finite() { fx.clamp(0.0, max_x) } else { 0.0 };
    let fy = if fy.is_finite() { fy.clamp(0.0, max_y) } else { 0.0 };

    let x0 = fx.floor() as usize;
    let y0 = fy.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let v00 = values[y0 * width + x0];
    let v10 = values[y0 * width + x1];
    let v01 = values[y1 * width + x0];
    let v11 = values[y1 * width + x1];

    let top = v00 + (v10 - v00) * tx;
    let bottom = v01 + (v11 - v01) * tx;
    top + (bottom - top) * ty
}
