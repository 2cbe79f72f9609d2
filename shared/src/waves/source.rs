//! Wave sources: parametric, time-limited contributors to the displacement
//! buffer.

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use super::kinds::{capillary_omega, capillary_gravity_omega, gravity_omega};
use crate::constants::GRAVITY;

/// Fraction of the lifetime spent fading in.
const FADE_IN_FRACTION: f32 = 0.1;

/// Fraction of the lifetime spent fading out.
const FADE_OUT_FRACTION: f32 = 0.3;

/// Scale factor from the fully developed wind-sea wavelength `2πU²/g` to the
/// short, young waves a gust raises on a small water body.
pub const WIND_WAVELENGTH_FACTOR: f32 = 0.05;

/// Shortest wind wavelength (m), roughly the capillary-gravity minimum.
pub const MIN_WIND_WAVELENGTH: f32 = 0.017;

/// Wind wave amplitude per (m/s)² of wind.
pub const WIND_AMPLITUDE_PER_SPEED_SQ: f32 = 0.002;

/// Collision amplitude per √(m³) of impacting water.
pub const SPLASH_AMPLITUDE_PER_SQRT_VOLUME: f32 = 0.05;

/// Per-type parameters of a wave source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WaveKind {
    /// Wind-driven plane wave with capillary-gravity dispersion.
    Wind { direction: Vec2, wind_speed: f32 },
    /// Plane swell with deep/shallow gravity dispersion.
    Gravity { direction: Vec2, wavelength: f32 },
    /// Perlin-noise chop drifting with time.
    Turbulent { scale: f32, seed: u32 },
    /// Expanding ring from an impact point.
    Collision { ring_speed: f32, ring_width: f32 },
    /// Ripples aligned with local flow; amplitude follows local speed.
    Flow { wavelength: f32 },
    /// Short radial surface-tension ripples.
    Capillary { wavelength: f32 },
}

impl WaveKind {
    pub fn name(&self) -> &'static str {
        match self {
            WaveKind::Wind { .. } => "wind",
            WaveKind::Gravity { .. } => "gravity",
            WaveKind::Turbulent { .. } => "turbulent",
            WaveKind::Collision { .. } => "collision",
            WaveKind::Flow { .. } => "flow",
            WaveKind::Capillary { .. } => "capillary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSource {
    pub kind: WaveKind,
    /// Origin in cell coordinates.
    pub origin: Vec2,
    /// Peak displacement (m).
    pub amplitude: f32,
    /// Temporal frequency (Hz).
    pub frequency: f32,
    /// Phase offset (rad).
    pub phase: f32,
    /// Seconds since spawn.
    pub age: f32,
    pub lifetime: f32,
    /// Influence radius in cells.
    pub radius: f32,
}

impl WaveSource {
    /// A source with the frequency given directly.
    pub fn new(kind: WaveKind, origin: Vec2, amplitude: f32, frequency: f32, lifetime: f32, radius: f32) -> Self {
        Self {
            kind,
            origin,
            amplitude: finite_non_negative(amplitude),
            frequency: finite_non_negative(frequency),
            phase: 0.0,
            age: 0.0,
            lifetime: finite_non_negative(lifetime),
            radius: finite_non_negative(radius),
        }
    }

    /// Wind waves whose wavelength and amplitude follow the wind speed.
    pub fn wind(origin: Vec2, wind: Vec2, depth: f32, lifetime: f32, radius: f32) -> Self {
        let wind_speed = wind.length();
        let direction = wind.normalize_or(Vec2::X);
        let wavelength = wind_wavelength(wind_speed);
        let k = TAU / wavelength;
        Self::new(
            WaveKind::Wind {
                direction,
                wind_speed,
            },
            origin,
            WIND_AMPLITUDE_PER_SPEED_SQ * wind_speed * wind_speed,
            capillary_gravity_omega(k, depth) / TAU,
            lifetime,
            radius,
        )
    }

    /// Gravity swell of the given wavelength (m).
    pub fn gravity(origin: Vec2, direction: Vec2, wavelength: f32, amplitude: f32, depth: f32, lifetime: f32, radius: f32) -> Self {
        let wavelength = wavelength.max(MIN_WIND_WAVELENGTH);
        Self::new(
            WaveKind::Gravity {
                direction: direction.normalize_or(Vec2::X),
                wavelength,
            },
            origin,
            amplitude,
            gravity_omega(TAU / wavelength, depth) / TAU,
            lifetime,
            radius,
        )
    }

    /// Impact ring travelling at shallow-water wave speed `√(g·h)`.
    pub fn collision(origin: Vec2, volume: f32, depth: f32, cell_size: f32) -> Self {
        let ring_speed = (GRAVITY * depth.max(0.05)).sqrt().min(8.0);
        let lifetime = 3.0;
        let ring_width = cell_size.max(0.1);
        let radius = (ring_speed * lifetime + 2.0 * ring_width) / cell_size.max(1.0e-3);
        Self::new(
            WaveKind::Collision {
                ring_speed,
                ring_width,
            },
            origin,
            SPLASH_AMPLITUDE_PER_SQRT_VOLUME * volume.max(0.0).sqrt(),
            1.0,
            lifetime,
            radius,
        )
    }

    pub fn capillary(origin: Vec2, wavelength: f32, amplitude: f32, lifetime: f32, radius: f32) -> Self {
        let wavelength = wavelength.max(1.0e-3);
        Self::new(
            WaveKind::Capillary { wavelength },
            origin,
            amplitude,
            capillary_omega(TAU / wavelength) / TAU,
            lifetime,
            radius,
        )
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.age >= self.lifetime
    }

    /// Fade-in/fade-out weight in `[0, 1]`.
    pub fn envelope(&self) -> f32 {
        if self.lifetime <= 0.0 {
            return 0.0;
        }
        let t = (self.age / self.lifetime).clamp(0.0, 1.0);
        let fade_in = smoothstep(t / FADE_IN_FRACTION);
        let fade_out = smoothstep((1.0 - t) / FADE_OUT_FRACTION);
        fade_in * fade_out
    }

    /// Squared cell distance from the origin to `pos`.
    #[inline]
    pub fn distance_squared(&self, pos: Vec2) -> f32 {
        self.origin.distance_squared(pos)
    }

    #[inline]
    pub fn reaches(&self, pos: Vec2) -> bool {
        self.distance_squared(pos) <= self.radius * self.radius
    }
}

/// Young wind-sea wavelength (m) for a wind speed (m/s).
pub fn wind_wavelength(wind_speed: f32) -> f32 {
    (TAU * wind_speed * wind_speed / GRAVITY * WIND_WAVELENGTH_FACTOR).max(MIN_WIND_WAVELENGTH)
}

#[inline]
pub(crate) fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn finite_non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_fades_both_ends() {
        let mut source = WaveSource::new(
            WaveKind::Capillary { wavelength: 0.1 },
            Vec2::ZERO,
            1.0,
            1.0,
            10.0,
            4.0,
        );
        assert_eq!(source.envelope(), 0.0);
        source.age = 5.0;
        assert!((source.envelope() - 1.0).abs() < 1e-6);
        source.age = 10.0;
        assert_eq!(source.envelope(), 0.0);
        assert!(source.is_expired());
    }

    #[test]
    fn test_wind_wavelength_grows_with_speed() {
        assert_eq!(wind_wavelength(0.0), MIN_WIND_WAVELENGTH);
        assert!(wind_wavelength(10.0) > wind_wavelength(5.0));
    }

    #[test]
    fn test_wind_source_follows_wind() {
        let source = WaveSource::wind(Vec2::ZERO, Vec2::new(0.0, 6.0), 2.0, 5.0, 10.0);
        match source.kind {
            WaveKind::Wind {
                direction,
                wind_speed,
            } => {
                assert!((direction - Vec2::Y).length() < 1e-6);
                assert!((wind_speed - 6.0).abs() < 1e-6);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(source.frequency > 0.0);
        assert!(source.amplitude > 0.0);
    }

    #[test]
    fn test_invalid_parameters_are_neutralised() {
        let source = WaveSource::new(
            WaveKind::Flow { wavelength: 1.0 },
            Vec2::ZERO,
            f32::NAN,
            -2.0,
            f32::INFINITY,
            -1.0,
        );
        assert_eq!(source.amplitude, 0.0);
        assert_eq!(source.frequency, 0.0);
        assert_eq!(source.lifetime, 0.0);
        assert!(source.is_expired());
    }
}
