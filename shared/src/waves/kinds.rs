//! One evaluation function per [`WaveKind`].
//!
//! Every function returns the raw oscillation of a source at a cell; the
//! shared lifetime envelope and radial taper are applied by [`evaluate`].
//! Distances are converted from cells to metres before any dispersion math.

use bevy::math::Vec2;
use noiz::prelude::*;
use std::f32::consts::{PI, TAU};

use super::source::{smoothstep, wind_wavelength, WaveKind, WaveSource};
use crate::constants::{GRAVITY, SURFACE_TENSION_OVER_DENSITY};

/// Local speed (m/s) at which flow waves reach their nominal amplitude.
pub const REFERENCE_FLOW_SPEED: f32 = 2.0;

/// Cap on the flow-speed amplitude gain.
pub const MAX_FLOW_GAIN: f32 = 2.0;

/// Fraction of the influence radius over which contributions taper to 0.
const RADIAL_TAPER: f32 = 0.3;

/// Depth floor (m) for `tanh(k·h)`.
const MIN_DISPERSION_DEPTH: f32 = 1.0e-3;

// ============================================================================
// Dispersion relations
// ============================================================================

/// Gravity waves: `ω² = g·k·tanh(k·h)`.
#[inline]
pub fn gravity_omega(k: f32, depth: f32) -> f32 {
    (GRAVITY * k * (k * depth.max(MIN_DISPERSION_DEPTH)).tanh()).sqrt()
}

/// Capillary-gravity waves: `ω² = (g·k + (σ/ρ)·k³)·tanh(k·h)`.
#[inline]
pub fn capillary_gravity_omega(k: f32, depth: f32) -> f32 {
    ((GRAVITY * k + SURFACE_TENSION_OVER_DENSITY * k * k * k)
        * (k * depth.max(MIN_DISPERSION_DEPTH)).tanh())
    .sqrt()
}

/// Pure capillary waves: `ω² = (σ/ρ)·k³`.
#[inline]
pub fn capillary_omega(k: f32) -> f32 {
    (SURFACE_TENSION_OVER_DENSITY * k * k * k).sqrt()
}

// ============================================================================
// Evaluation
// ============================================================================

/// Local grid state seen by a source at one cell.
#[derive(Debug, Clone, Copy)]
pub struct SampleContext {
    /// Cell coordinates.
    pub pos: Vec2,
    pub depth: f32,
    pub velocity: Vec2,
    pub cell_size: f32,
}

/// Contribution (m) of `source` at the cell described by `ctx`, or 0 when
/// the cell is outside the source's radius.
pub fn evaluate(source: &WaveSource, ctx: &SampleContext, noise: &Noise<common_noise::Perlin>) -> f32 {
    let distance = source.distance_squared(ctx.pos).sqrt();
    if source.radius <= 0.0 || distance > source.radius {
        return 0.0;
    }
    let taper = 1.0 - smoothstep((distance / source.radius - (1.0 - RADIAL_TAPER)) / RADIAL_TAPER);
    let weight = source.amplitude * source.envelope() * taper;
    if weight == 0.0 {
        return 0.0;
    }

    let offset = (ctx.pos - source.origin) * ctx.cell_size;
    let omega_t = TAU * source.frequency * source.age;

    let raw = match source.kind {
        WaveKind::Wind {
            direction,
            wind_speed,
        } => wind(offset, direction, wind_speed, omega_t, source.phase),
        WaveKind::Gravity {
            direction,
            wavelength,
        } => plane_wave(offset, direction, wavelength, omega_t, source.phase),
        WaveKind::Turbulent { scale, seed } => {
            turbulent(ctx.pos, scale, seed, source.age * source.frequency, noise)
        }
        WaveKind::Collision {
            ring_speed,
            ring_width,
        } => collision(offset.length(), ring_speed, ring_width, source.age, source.lifetime),
        WaveKind::Flow { wavelength } => {
            flow(offset, ctx.velocity, wavelength, omega_t, source.phase)
        }
        WaveKind::Capillary { wavelength } => capillary(
            offset.length(),
            wavelength,
            0.5 * source.radius * ctx.cell_size,
            omega_t,
            source.phase,
        ),
    };
    weight * raw
}

/// Directional plane wave along `direction`.
#[inline]
fn plane_wave(offset: Vec2, direction: Vec2, wavelength: f32, omega_t: f32, phase: f32) -> f32 {
    if wavelength <= 0.0 {
        return 0.0;
    }
    let k = TAU / wavelength;
    (k * direction.dot(offset) - omega_t + phase).sin()
}

/// Plane wave whose wavelength follows the wind speed.
#[inline]
fn wind(offset: Vec2, direction: Vec2, wind_speed: f32, omega_t: f32, phase: f32) -> f32 {
    plane_wave(offset, direction, wind_wavelength(wind_speed), omega_t, phase)
}

/// Noise chop in `[-1, 1]` drifting diagonally over time.
#[inline]
fn turbulent(pos: Vec2, scale: f32, seed: u32, drift: f32, noise: &Noise<common_noise::Perlin>) -> f32 {
    // Distinct seeds sample distant regions of the same noise field.
    let seed_offset = Vec2::new((seed % 1024) as f32 * 97.31, (seed / 1024 % 1024) as f32 * 61.73);
    let sample = pos * scale + seed_offset + Vec2::splat(drift);
    noise.sample_for::<f32>(sample).clamp(-1.0, 1.0)
}

/// Gaussian ring of radius `ring_speed·age`, thinning with distance and age.
#[inline]
fn collision(distance: f32, ring_speed: f32, ring_width: f32, age: f32, lifetime: f32) -> f32 {
    if ring_width <= 0.0 {
        return 0.0;
    }
    let ring_radius = ring_speed * age;
    let x = (distance - ring_radius) / ring_width;
    let decay = if lifetime > 0.0 {
        (1.0 - age / lifetime).max(0.0)
    } else {
        0.0
    };
    (-x * x).exp() * (PI * x).cos() * decay / (1.0 + distance).sqrt()
}

/// Ripples along the local flow; still water gives nothing.
#[inline]
fn flow(offset: Vec2, velocity: Vec2, wavelength: f32, omega_t: f32, phase: f32) -> f32 {
    let speed = velocity.length();
    if speed <= f32::EPSILON || wavelength <= 0.0 {
        return 0.0;
    }
    let gain = (speed / REFERENCE_FLOW_SPEED).min(MAX_FLOW_GAIN);
    gain * plane_wave(offset, velocity / speed, wavelength, omega_t, phase)
}

/// Radial ripples decaying exponentially with distance.
#[inline]
fn capillary(distance: f32, wavelength: f32, decay_length: f32, omega_t: f32, phase: f32) -> f32 {
    if wavelength <= 0.0 || decay_length <= 0.0 {
        return 0.0;
    }
    let k = TAU / wavelength;
    (-distance / decay_length).exp() * (k * distance - omega_t + phase).sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pos: Vec2) -> SampleContext {
        SampleContext {
            pos,
            depth: 1.0,
            velocity: Vec2::ZERO,
            cell_size: 1.0,
        }
    }

    fn mid_life(mut source: WaveSource) -> WaveSource {
        source.age = source.lifetime * 0.5;
        source
    }

    #[test]
    fn test_dispersion_limits() {
        let k = TAU / 10.0;
        // Deep water: ω ≈ √(g·k)
        assert!((gravity_omega(k, 1000.0) - (GRAVITY * k).sqrt()).abs() < 1e-4);
        // Shallow water: ω ≈ k·√(g·h)
        let shallow = gravity_omega(k, 0.01);
        assert!((shallow - k * (GRAVITY * 0.01).sqrt()).abs() / shallow < 0.01);
        // Surface tension only matters for short waves
        assert!(capillary_gravity_omega(k, 1000.0) > gravity_omega(k, 1000.0));
        assert!(capillary_omega(TAU / 0.005) > capillary_omega(TAU / 0.05));
    }

    #[test]
    fn test_outside_radius_is_zero() {
        let noise = Noise::<common_noise::Perlin>::default();
        let source = mid_life(WaveSource::capillary(Vec2::ZERO, 0.5, 1.0, 4.0, 3.0));
        assert_eq!(evaluate(&source, &ctx(Vec2::new(5.0, 0.0)), &noise), 0.0);
    }

    #[test]
    fn test_flow_waves_need_motion() {
        let noise = Noise::<common_noise::Perlin>::default();
        let source = mid_life(WaveSource::new(
            WaveKind::Flow { wavelength: 2.0 },
            Vec2::ZERO,
            1.0,
            0.5,
            4.0,
            10.0,
        ));
        let still = ctx(Vec2::new(0.3, 0.0));
        assert_eq!(evaluate(&source, &still, &noise), 0.0);

        let moving = SampleContext {
            velocity: Vec2::new(3.0, 0.0),
            ..still
        };
        assert!(evaluate(&source, &moving, &noise).abs() > 0.0);
    }

    #[test]
    fn test_collision_ring_moves_outward() {
        let ring = |distance: f32, age: f32| collision(distance, 2.0, 0.5, age, 3.0);
        // At age 1 the ring sits at 2 m
        assert!(ring(2.0, 1.0) > ring(0.0, 1.0).abs());
        assert!(ring(2.0, 1.0) > ring(4.0, 1.0).abs());
    }

    #[test]
    fn test_contributions_are_bounded_by_amplitude() {
        let noise = Noise::<common_noise::Perlin>::default();
        let sources = [
            WaveSource::wind(Vec2::ZERO, Vec2::new(4.0, 1.0), 1.0, 6.0, 12.0),
            WaveSource::gravity(Vec2::ZERO, Vec2::Y, 3.0, 0.3, 2.0, 6.0, 12.0),
            WaveSource::collision(Vec2::ZERO, 4.0, 1.0, 1.0),
            WaveSource::capillary(Vec2::ZERO, 0.2, 0.05, 2.0, 6.0),
            WaveSource::new(
                WaveKind::Turbulent { scale: 0.3, seed: 7 },
                Vec2::ZERO,
                0.2,
                0.5,
                6.0,
                12.0,
            ),
        ];
        for source in sources {
            let source = mid_life(source);
            for i in 0..20 {
                let pos = Vec2::new(i as f32 * 0.37, i as f32 * 0.21);
                let value = evaluate(&source, &ctx(pos), &noise);
                assert!(
                    value.abs() <= source.amplitude + 1e-5,
                    "{} exceeded amplitude: {}",
                    source.kind.name(),
                    value
                );
            }
        }
    }
}
