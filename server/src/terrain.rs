//! Procedural terrain for headless runs.
//!
//! Heights are layered Perlin noise over a shallow bowl, so water poured
//! anywhere has valleys to collect in and a rim to spill over.

use bevy::prelude::*;
use hydro_shared::HeightField;
use noiz::prelude::*;

/// Octaves of noise layered on top of each other.
const OCTAVES: u32 = 4;

/// Amplitude falloff per octave.
const PERSISTENCE: f32 = 0.5;

/// Fraction of the relief given to the bowl.
const BOWL_SHARE: f32 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSettings {
    pub width: usize,
    pub height: usize,
    pub seed: u32,
    /// Peak-to-trough elevation range (m).
    pub relief: f32,
    /// Noise frequency in cycles per cell.
    pub scale: f32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            seed: 0,
            relief: 8.0,
            scale: 0.03,
        }
    }
}

/// Elevation (m) at one cell.
fn sample_height(
    x: usize,
    y: usize,
    perlin: &Noise<common_noise::Perlin>,
    settings: &TerrainSettings,
) -> f32 {
    let mut amplitude = 1.0;
    let mut frequency = settings.scale;
    let mut total = 0.0;
    let mut norm = 0.0;
    for _ in 0..OCTAVES {
        let sample_pos = Vec2::new(x as f32 * frequency, y as f32 * frequency);
        total += perlin.sample_for::<f32>(sample_pos) * amplitude;
        norm += amplitude;
        amplitude *= PERSISTENCE;
        frequency *= 2.0;
    }
    let noise = 0.5 + 0.5 * (total / norm).clamp(-1.0, 1.0);

    // 0 at the centre, 1 at the corners
    let half = Vec2::new(settings.width as f32, settings.height as f32) * 0.5;
    let offset = (Vec2::new(x as f32, y as f32) - half) / half.max(Vec2::ONE);
    let bowl = (offset.length_squared() * 0.5).min(1.0);

    settings.relief * ((1.0 - BOWL_SHARE) * noise + BOWL_SHARE * bowl)
}

pub fn generate_heightfield(settings: &TerrainSettings) -> HeightField {
    let mut perlin = Noise::<common_noise::Perlin>::default();
    perlin.set_seed(settings.seed);

    let mut heights = Vec::with_capacity(settings.width * settings.height);
    for y in 0..settings.height {
        for x in 0..settings.width {
            heights.push(sample_height(x, y, &perlin, settings));
        }
    }

    let (min, max) = heights
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));
    debug!(
        "Generated {}x{} terrain (seed {}), elevation {:.2}..{:.2} m",
        settings.width, settings.height, settings.seed, min, max
    );

    HeightField::from_heights(settings.width, settings.height, heights)
}
