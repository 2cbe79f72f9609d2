//! Terrain height collaborator.
//!
//! The terrain is owned elsewhere (editing tools, DEM import). The hydrology
//! core only reads it, copying heights into its own snapshot at the start of
//! every tick so a tick sees one consistent surface.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// Read-only view of absolute terrain elevation per cell.
pub trait TerrainProvider: Send + Sync {
    /// Grid dimensions `(width, height)` the terrain covers.
    fn dimensions(&self) -> (usize, usize);

    /// Absolute elevation (m) of cell `(x, y)`. Only called in range.
    fn height(&self, x: usize, y: usize) -> f32;

    /// Monotonic edit counter; a change tells the core to re-snapshot and
    /// wake the water near edited cells.
    fn revision(&self) -> u64 {
        0
    }

    /// Copies all heights (row-major) into `out`, which has `width*height` slots.
    fn copy_heights(&self, out: &mut [f32]) {
        let (width, _) = self.dimensions();
        if width == 0 {
            return;
        }
        for (i, h) in out.iter_mut().enumerate() {
            *h = self.height(i % width, i / width);
        }
    }
}

/// Terrain with the same elevation everywhere.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    pub width: usize,
    pub height: usize,
    pub elevation: f32,
}

impl FlatTerrain {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            elevation: 0.0,
        }
    }
}

impl TerrainProvider for FlatTerrain {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn height(&self, _x: usize, _y: usize) -> f32 {
        self.elevation
    }
}

struct HeightData {
    width: usize,
    height: usize,
    heights: Vec<f32>,
}

/// Editable heightfield shareable between the hydrology core and the
/// terrain-editing side (wrap it in an `Arc`).
///
/// Edits go through `&self` and bump [`TerrainProvider::revision`].
pub struct HeightField {
    data: RwLock<HeightData>,
    revision: AtomicU64,
}

impl HeightField {
    /// Creates a flat heightfield at elevation 0.
    pub fn new(width: usize, height: usize) -> Self {
        Self::from_heights(width, height, vec![0.0; width * height])
    }

    /// Creates a heightfield from row-major heights. Missing values are
    /// padded with 0 and extra values dropped.
    pub fn from_heights(width: usize, height: usize, mut heights: Vec<f32>) -> Self {
        heights.resize(width * height, 0.0);
        Self {
            data: RwLock::new(HeightData {
                width,
                height,
                heights,
            }),
            revision: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HeightData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HeightData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::Release);
    }

    /// Sets the elevation of one cell. Out-of-range writes are ignored.
    pub fn set_height(&self, x: usize, y: usize, value: f32) {
        let mut data = self.write();
        if x < data.width && y < data.height && value.is_finite() {
            let idx = y * data.width + x;
            data.heights[idx] = value;
            drop(data);
            self.bump();
        }
    }

    /// Raises (or lowers, with a negative delta) every cell within `radius`
    /// cells of `(cx, cy)` using a linear falloff.
    pub fn raise(&self, cx: f32, cy: f32, radius: f32, delta: f32) {
        if !delta.is_finite() || radius <= 0.0 {
            return;
        }
        let mut data = self.write();
        let (width, height) = (data.width, data.height);
        let min_x = (cx - radius).floor().max(0.0) as usize;
        let min_y = (cy - radius).floor().max(0.0) as usize;
        let max_x = ((cx + radius).ceil().max(0.0) as usize).min(width.saturating_sub(1));
        let max_y = ((cy + radius).ceil().max(0.0) as usize).min(height.saturating_sub(1));
        let mut touched = false;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                if d <= radius && x < width && y < height {
                    data.heights[y * width + x] += delta * (1.0 - d / radius);
                    touched = true;
                }
            }
        }
        drop(data);
        if touched {
            self.bump();
        }
    }

    /// Changes the terrain's dimensions, resetting heights to 0.
    pub fn resize(&self, width: usize, height: usize) {
        let mut data = self.write();
        data.width = width;
        data.height = height;
        data.heights = vec![0.0; width * height];
        drop(data);
        self.bump();
    }
}

impl TerrainProvider for HeightField {
    fn dimensions(&self) -> (usize, usize) {
        let data = self.read();
        (data.width, data.height)
    }

    fn height(&self, x: usize, y: usize) -> f32 {
        let data = self.read();
        data.heights
            .get(y * data.width + x)
            .copied()
            .unwrap_or(0.0)
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn copy_heights(&self, out: &mut [f32]) {
        let data = self.read();
        let n = out.len().min(data.heights.len());
        out[..n].copy_from_slice(&data.heights[..n]);
        out[n..].iter_mut().for_each(|h| *h = 0.0);
    }
}
