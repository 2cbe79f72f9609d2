//! Atmosphere collaborator: receives evaporated water and supplies wind.

use bevy::math::Vec2;

pub trait AtmosphereProvider: Send + Sync {
    /// Notification that `amount` (m³) evaporated from the surface.
    fn receive_evaporation(&mut self, amount: f64);

    /// Notification that `amount` (m³) precipitated back onto the surface.
    fn release_precipitation(&mut self, _amount: f64) {}

    /// Wind velocity (m/s) over cell `(x, y)`.
    fn wind_at(&self, x: usize, y: usize) -> Vec2;
}

/// Uniform wind and a single humidity reservoir.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientAtmosphere {
    pub wind: Vec2,
    /// Water vapour held (m³).
    pub humidity: f64,
}

impl AmbientAtmosphere {
    pub fn with_wind(wind: Vec2) -> Self {
        Self {
            wind,
            humidity: 0.0,
        }
    }
}

impl AtmosphereProvider for AmbientAtmosphere {
    fn receive_evaporation(&mut self, amount: f64) {
        self.humidity += amount;
    }

    fn release_precipitation(&mut self, amount: f64) {
        self.humidity = (self.humidity - amount).max(0.0);
    }

    fn wind_at(&self, _x: usize, _y: usize) -> Vec2 {
        self.wind
    }
}
