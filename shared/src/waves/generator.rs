//! Cosmetic wave displacement generator.
//!
//! ## Design Principles
//! - Output is a separate per-cell buffer; it never feeds `depth` or the ledger
//! - Reads grid state only, so it can run beside the gradient phase
//! - Ambient generation is driven by a seeded RNG and is reproducible
//!
//! ## Per-tick Algorithm
//! 1. Age every source and prune expired ones
//! 2. Spawn ambient wind and flow sources
//! 3. Sum contributions of all sources within their radius for wet cells,
//!    scaled by local water volume
//! 4. Smooth with the 8-neighbour mean, then clamp

use bevy::math::Vec2;
use noiz::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::VecDeque;

use super::kinds::{evaluate, SampleContext};
use super::scale::compute_scale_field;
use super::source::{WaveKind, WaveSource};
use crate::collaborators::AtmosphereProvider;
use crate::config::WaveConfig;
use crate::grid::{GridState, NEIGHBOR_OFFSETS};

/// Lifetime (s) of ambient wind sources.
const WIND_SOURCE_LIFETIME: f32 = 6.0;

/// Influence radius (cells) of ambient wind sources.
const WIND_SOURCE_RADIUS: f32 = 24.0;

/// Lifetime (s) of ambient flow sources.
const FLOW_SOURCE_LIFETIME: f32 = 2.0;

/// Influence radius (cells) of ambient flow sources.
const FLOW_SOURCE_RADIUS: f32 = 6.0;

/// Amplitude (m) of ambient flow sources at reference speed.
const FLOW_SOURCE_AMPLITUDE: f32 = 0.03;

/// Random cells probed per tick when looking for a fast-flow spawn site.
const FLOW_PROBES_PER_TICK: usize = 4;

/// Random cells probed when placing a wind source on water.
const WIND_PLACEMENT_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveStats {
    pub active_sources: usize,
    pub spawned: usize,
    pub expired: usize,
    pub evicted: usize,
}

pub struct WaveGenerator {
    width: usize,
    height: usize,
    /// Oldest first.
    sources: VecDeque<WaveSource>,
    displacement: Vec<f32>,
    scratch: Vec<f32>,
    scale_field: Vec<f32>,
    scale_table: Vec<f64>,
    rng: StdRng,
    noise: Noise<common_noise::Perlin>,
    pub stats: WaveStats,
}

impl WaveGenerator {
    pub fn new(width: usize, height: usize, config: &WaveConfig) -> Self {
        let mut noise = Noise::<common_noise::Perlin>::default();
        noise.set_seed(config.seed as u32);
        Self {
            width,
            height,
            sources: VecDeque::new(),
            displacement: vec![0.0; width * height],
            scratch: vec![0.0; width * height],
            scale_field: vec![0.0; width * height],
            scale_table: Vec::new(),
            rng: StdRng::seed_from_u64(config.seed),
            noise,
            stats: WaveStats::default(),
        }
    }

    /// Drops every source and zeroes the buffer at the new size.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.sources.clear();
        self.displacement = vec![0.0; width * height];
        self.scratch = vec![0.0; width * height];
        self.scale_field = vec![0.0; width * height];
        self.stats = WaveStats::default();
    }

    /// Removes all sources and flattens the surface.
    pub fn clear(&mut self) {
        self.sources.clear();
        self.displacement.fill(0.0);
        self.stats.active_sources = 0;
    }

    /// Adds a source, evicting the oldest when over `max_sources`.
    pub fn add_source(&mut self, source: WaveSource, max_sources: usize) {
        if source.is_expired() || source.amplitude <= 0.0 {
            return;
        }
        log::trace!(
            "[WAVES] {} source at {:?}, amplitude {:.3}",
            source.kind.name(),
            source.origin,
            source.amplitude
        );
        self.sources.push_back(source);
        self.stats.spawned += 1;
        while self.sources.len() > max_sources {
            self.sources.pop_front();
            self.stats.evicted += 1;
        }
        self.stats.active_sources = self.sources.len();
    }

    /// Collision ring at `cell_pos` (cell coordinates) for `volume` m³ of
    /// impacting water.
    pub fn splash(&mut self, grid: &GridState, cell_pos: Vec2, volume: f32, cell_size: f32, config: &WaveConfig) {
        if !cell_pos.is_finite() || !volume.is_finite() || volume <= 0.0 {
            return;
        }
        let depth = grid.bilinear_sample(crate::grid::Field::Depth, cell_pos.x, cell_pos.y);
        let mut source = WaveSource::collision(cell_pos, volume, depth, cell_size);
        source.amplitude = source.amplitude.min(config.max_displacement);
        self.add_source(source, config.max_sources);
    }

    pub fn sources(&self) -> impl Iterator<Item = &WaveSource> {
        self.sources.iter()
    }

    pub fn active_sources(&self) -> usize {
        self.sources.len()
    }

    /// Per-cell vertical offsets (m), row-major.
    pub fn displacement(&self) -> &[f32] {
        &self.displacement
    }

    pub fn displacement_at(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0.0;
        }
        self.displacement[y as usize * self.width + x as usize]
    }

    /// Bilinear displacement at fractional cell coordinates.
    pub fn sample_displacement(&self, fx: f32, fy: f32) -> f32 {
        crate::grid::bilinear(&self.displacement, self.width, self.height, fx, fy)
    }

    /// Advances all sources by `dt` and rebuilds the displacement buffer.
    pub fn update(
        &mut self,
        grid: &GridState,
        atmosphere: &dyn AtmosphereProvider,
        config: &WaveConfig,
        cell_size: f32,
        dt: f32,
    ) -> usize {
        if grid.width() != self.width || grid.height() != self.height {
            self.resize(grid.width(), grid.height());
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.age_and_prune(dt);
        self.spawn_ambient(grid, atmosphere, config, dt);
        self.accumulate(grid, config, cell_size);
        self.smooth_and_clamp(grid, config);

        self.stats.active_sources = self.sources.len();
        log::debug!(
            "[WAVES] {} active sources ({} expired, {} evicted so far)",
            self.stats.active_sources,
            self.stats.expired,
            self.stats.evicted
        );
        self.stats.active_sources
    }

    fn age_and_prune(&mut self, dt: f32) {
        let before = self.sources.len();
        for source in &mut self.sources {
            source.age += dt;
        }
        self.sources.retain(|s| !s.is_expired());
        self.stats.expired += before - self.sources.len();
    }

    fn spawn_ambient(
        &mut self,
        grid: &GridState,
        atmosphere: &dyn AtmosphereProvider,
        config: &WaveConfig,
        dt: f32,
    ) {
        let (width, height) = (grid.width(), grid.height());
        if dt <= 0.0 || width == 0 || height == 0 {
            return;
        }

        // Wind
        let wind = atmosphere.wind_at(width / 2, height / 2);
        let chance = config.wind_spawn_rate * wind.length() * dt;
        if chance > 0.0 && self.rng.gen::<f32>() < chance {
            for _ in 0..WIND_PLACEMENT_ATTEMPTS {
                let (x, y) = (self.rng.gen_range(0..width), self.rng.gen_range(0..height));
                let depth = grid.depth_at(x as i64, y as i64);
                if depth > config.wet_threshold {
                    let local_wind = atmosphere.wind_at(x, y);
                    let mut source = WaveSource::wind(
                        Vec2::new(x as f32, y as f32),
                        local_wind,
                        depth,
                        WIND_SOURCE_LIFETIME,
                        WIND_SOURCE_RADIUS,
                    );
                    source.phase = self.rng.gen_range(0.0..std::f32::consts::TAU);
                    self.add_source(source, config.max_sources);
                    break;
                }
            }
        }

        // Fast flow
        for _ in 0..FLOW_PROBES_PER_TICK {
            let (x, y) = (self.rng.gen_range(0..width), self.rng.gen_range(0..height));
            let velocity = grid.velocity_at(x as i64, y as i64);
            let speed = velocity.length();
            if grid.depth_at(x as i64, y as i64) <= config.wet_threshold
                || speed <= config.flow_wave_speed
            {
                continue;
            }
            let mut source = WaveSource::new(
                WaveKind::Flow {
                    wavelength: (speed * 0.5).max(0.2),
                },
                Vec2::new(x as f32, y as f32),
                FLOW_SOURCE_AMPLITUDE,
                1.5,
                FLOW_SOURCE_LIFETIME,
                FLOW_SOURCE_RADIUS,
            );
            source.phase = self.rng.gen_range(0.0..std::f32::consts::TAU);
            self.add_source(source, config.max_sources);
        }
    }

    fn accumulate(&mut self, grid: &GridState, config: &WaveConfig, cell_size: f32) {
        let width = grid.width();
        compute_scale_field(
            grid,
            &config.scale,
            cell_size * cell_size,
            &mut self.scale_table,
            &mut self.scale_field,
        );

        let sources: Vec<&WaveSource> = self.sources.iter().collect();
        let scale_field = &self.scale_field;
        let noise = &self.noise;
        let wet_threshold = config.wet_threshold;
        let depth = grid.depth();
        let (vx, vy) = (grid.velocity_x(), grid.velocity_y());

        self.scratch
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let fy = y as f32;
                // Sources whose radius reaches this row
                let reaching: Vec<&WaveSource> = sources
                    .iter()
                    .copied()
                    .filter(|s| (s.origin.y - fy).abs() <= s.radius)
                    .collect();

                for (x, value) in row.iter_mut().enumerate() {
                    let i = y * width + x;
                    let d = depth[i];
                    if d <= wet_threshold || reaching.is_empty() {
                        *value = 0.0;
                        continue;
                    }
                    let ctx = SampleContext {
                        pos: Vec2::new(x as f32, fy),
                        depth: d,
                        velocity: Vec2::new(vx[i], vy[i]),
                        cell_size,
                    };
                    let sum: f32 = reaching.iter().map(|s| evaluate(s, &ctx, noise)).sum();
                    *value = sum * scale_field[i];
                }
            });
    }

    /// Blends each wet cell toward its neighbour mean, writing the result
    /// into the displacement buffer.
    fn smooth_and_clamp(&mut self, grid: &GridState, config: &WaveConfig) {
        let width = self.width;
        let height = self.height;
        let s = config.smoothing.clamp(0.0, 1.0);
        let limit = config.max_displacement.max(0.0);
        let raw = &self.scratch;
        let depth = grid.depth();
        let wet_threshold = config.wet_threshold;

        self.displacement
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let i = y * width + x;
                    if depth[i] <= wet_threshold {
                        *out = 0.0;
                        continue;
                    }
                    let mut sum = 0.0;
                    let mut count = 0;
                    for offset in NEIGHBOR_OFFSETS {
                        let nx = x as i64 + offset.x as i64;
                        let ny = y as i64 + offset.y as i64;
                        if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                            sum += raw[ny as usize * width + nx as usize];
                            count += 1;
                        }
                    }
                    let mean = if count > 0 { sum / count as f32 } else { raw[i] };
                    let value = (1.0 - s) * raw[i] + s * mean;
                    *out = if value.is_finite() {
                        value.clamp(-limit, limit)
                    } else {
                        0.0
                    };
                }
            });
    }
}
