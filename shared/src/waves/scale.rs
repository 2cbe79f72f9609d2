//! Wave scale calculation based on local water volume.
//!
//! Wave size is a function of the water volume around each cell, which
//! naturally produces:
//!
//! - Puddles → minor ripples (very low local volume)
//! - Ponds → small waves (moderate local volume)
//! - Lakes → medium waves (high local volume)
//! - Oceans → large waves (very high local volume, especially far from shore)
//!
//! ## Design Principles
//! - Local volume is the sum of `depth * cell_area` in a square window
//! - The mapping from volume to wave scale is non-linear (smoothstep)
//! - Window sums come from a summed-area table, so the whole field costs
//!   O(cells) regardless of radius

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::GridState;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default sampling radius (cells). A radius of 3 samples a 7x7 window.
pub const DEFAULT_SAMPLE_RADIUS: i32 = 3;

/// Minimum wave scale factor (for very shallow/small water bodies).
/// This ensures there's always at least a tiny bit of surface movement.
pub const MIN_WAVE_SCALE: f32 = 0.05;

/// Maximum wave scale factor (for large deep water bodies).
pub const MAX_WAVE_SCALE: f32 = 1.0;

/// Window volume (m³) below which water is a "puddle".
pub const VOLUME_THRESHOLD_PUDDLE: f32 = 2.0;

/// Window volume (m³) of a "pond".
pub const VOLUME_THRESHOLD_POND: f32 = 8.0;

/// Window volume (m³) of a "lake".
pub const VOLUME_THRESHOLD_LAKE: f32 = 25.0;

/// Window volume (m³) at and above which waves are at full scale.
pub const VOLUME_THRESHOLD_OCEAN: f32 = 50.0;

// ============================================================================
// Configuration Struct
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Reflect)]
#[serde(default)]
pub struct WaveScaleConfig {
    /// Window half-size in cells (samples a (2r+1)² area).
    pub sample_radius: i32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Volume thresholds for interpolation [puddle, pond, lake, ocean].
    pub volume_thresholds: [f32; 4],
    /// Wave scales at those thresholds.
    pub wave_scales: [f32; 4],
}

impl Default for WaveScaleConfig {
    fn default() -> Self {
        Self {
            sample_radius: DEFAULT_SAMPLE_RADIUS,
            min_scale: MIN_WAVE_SCALE,
            max_scale: MAX_WAVE_SCALE,
            volume_thresholds: [
                VOLUME_THRESHOLD_PUDDLE,
                VOLUME_THRESHOLD_POND,
                VOLUME_THRESHOLD_LAKE,
                VOLUME_THRESHOLD_OCEAN,
            ],
            wave_scales: [
                0.1, // Puddle
                0.3, // Pond
                0.6, // Lake
                1.0, // Ocean
            ],
        }
    }
}

impl WaveScaleConfig {
    /// Wider window with larger thresholds, for coarse grids of big water.
    pub fn broad() -> Self {
        Self {
            sample_radius: 5,
            volume_thresholds: [3.0, 15.0, 40.0, 80.0],
            ..Default::default()
        }
    }
}

// ============================================================================
// Volume Sampling
// ============================================================================

/// Sum of water volume in the `(2r+1)²` window around `(x, y)`, clipped to
/// the grid.
pub fn local_volume(grid: &GridState, x: usize, y: usize, radius: i32, cell_area: f32) -> f32 {
    let r = radius.max(0) as i64;
    let mut total = 0.0f64;
    for dy in -r..=r {
        for dx in -r..=r {
            total += grid.depth_at(x as i64 + dx, y as i64 + dy) as f64;
        }
    }
    (total * cell_area as f64) as f32
}

/// Fills `out` with the wave scale of every cell.
pub fn compute_scale_field(
    grid: &GridState,
    config: &WaveScaleConfig,
    cell_area: f32,
    table: &mut Vec<f64>,
    out: &mut Vec<f32>,
) {
    let width = grid.width();
    let height = grid.height();
    let depth = grid.depth();

    // Summed-area table with a zero border row/column.
    let stride = width + 1;
    table.clear();
    table.resize(stride * (height + 1), 0.0);
    for y in 0..height {
        let mut row_sum = 0.0f64;
        for x in 0..width {
            row_sum += depth[y * width + x] as f64;
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }

    let r = config.sample_radius.max(0) as usize;
    out.clear();
    out.resize(width * height, 0.0);
    for y in 0..height {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(width);
            let sum = table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
                + table[y0 * stride + x0];
            let volume = (sum.max(0.0) * cell_area as f64) as f32;
            out[y * width + x] = volume_to_wave_scale(volume, config);
        }
    }
}

// ============================================================================
// Wave Scale Mapping
// ============================================================================

/// Maps local water volume to a wave scale factor.
///
/// Interpolates between the configured levels with smoothstep, from
/// `min_scale` at zero volume to `max_scale` above the ocean threshold.
pub fn volume_to_wave_scale(local_volume: f32, config: &WaveScaleConfig) -> f32 {
    let thresholds = &config.volume_thresholds;
    let scales = &config.wave_scales;

    if local_volume <= thresholds[0] {
        let t = if thresholds[0] > 0.0 {
            local_volume / thresholds[0]
        } else {
            1.0
        };
        return lerp(config.min_scale, scales[0], smoothstep(t));
    }

    for i in 0..3 {
        if local_volume < thresholds[i + 1] {
            let span = thresholds[i + 1] - thresholds[i];
            let t = if span > 0.0 {
                (local_volume - thresholds[i]) / span
            } else {
                1.0
            };
            return lerp(scales[i], scales[i + 1], smoothstep(t));
        }
    }

    config.max_scale
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_to_wave_scale_thresholds() {
        let config = WaveScaleConfig::default();

        let scale = volume_to_wave_scale(0.5, &config);
        assert!(scale < config.wave_scales[0]);
        assert!(scale > config.min_scale);

        let scale = volume_to_wave_scale(VOLUME_THRESHOLD_POND, &config);
        assert!((scale - config.wave_scales[1]).abs() < 0.01);

        let scale = volume_to_wave_scale(VOLUME_THRESHOLD_OCEAN * 2.0, &config);
        assert!((scale - config.max_scale).abs() < 0.001);
    }

    #[test]
    fn test_volume_to_wave_scale_monotonic() {
        let config = WaveScaleConfig::default();

        let mut prev_scale = 0.0;
        for i in 0..100 {
            let scale = volume_to_wave_scale(i as f32, &config);
            assert!(
                scale >= prev_scale,
                "Wave scale should increase with volume: {} -> {}",
                prev_scale,
                scale
            );
            prev_scale = scale;
        }
    }

    #[test]
    fn test_scale_field_matches_direct_window_sum() {
        let mut grid = GridState::new(9, 7).unwrap();
        for i in 0..grid.len() {
            grid.add_depth(i, (i % 5) as f32 * 0.4);
        }
        let config = WaveScaleConfig::default();
        let mut table = Vec::new();
        let mut field = Vec::new();
        compute_scale_field(&grid, &config, 1.0, &mut table, &mut field);

        for (x, y) in [(0, 0), (4, 3), (8, 6), (2, 5)] {
            let direct = volume_to_wave_scale(
                local_volume(&grid, x, y, config.sample_radius, 1.0),
                &config,
            );
            assert!((field[y * 9 + x] - direct).abs() < 1e-5);
        }
    }

    #[test]
    fn test_dry_grid_is_minimum_scale() {
        let grid = GridState::new(4, 4).unwrap();
        let config = WaveScaleConfig::default();
        let mut table = Vec::new();
        let mut field = Vec::new();
        compute_scale_field(&grid, &config, 1.0, &mut table, &mut field);
        assert!(field.iter().all(|&s| (s - config.min_scale).abs() < 1e-6));
    }
}
