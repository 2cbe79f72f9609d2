//! Shared coordinate system: world positions ↔ fractional cell coordinates.

use bevy::math::Vec2;

/// Maps world-space XY positions onto the grid.
///
/// Fractional cell coordinates put cell `(x, y)`'s centre at exactly
/// `(x as f32, y as f32)`, so sampling at a centre reads the raw cell value.
pub trait CoordinateSystem: Send + Sync {
    fn world_to_cell(&self, world: Vec2) -> Vec2;
    fn cell_to_world(&self, cell: Vec2) -> Vec2;
    fn cell_size(&self) -> f32;
}

/// Axis-aligned grid placed at `origin` (the corner of cell `(0, 0)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    pub origin: Vec2,
    pub cell_size: f32,
}

impl GridTransform {
    pub fn new(origin: Vec2, cell_size: f32) -> Self {
        Self {
            origin,
            cell_size: cell_size.max(f32::EPSILON),
        }
    }
}

impl Default for GridTransform {
    fn default() -> Self {
        Self::new(Vec2::ZERO, crate::constants::DEFAULT_CELL_SIZE)
    }
}

impl CoordinateSystem for GridTransform {
    #[inline]
    fn world_to_cell(&self, world: Vec2) -> Vec2 {
        (world - self.origin) / self.cell_size - Vec2::splat(0.5)
    }

    #[inline]
    fn cell_to_world(&self, cell: Vec2) -> Vec2 {
        self.origin + (cell + Vec2::splat(0.5)) * self.cell_size
    }

    fn cell_size(&self) -> f32 {
        self.cell_size
    }
}
