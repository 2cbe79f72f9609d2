//! Fixed-substep accumulator.
//!
//! Frame time is accumulated and spent in whole substeps. Leftover time below
//! one substep carries to the next call; time beyond `max_substeps` in a
//! single call is dropped so a slow frame cannot trigger a catch-up spiral.

/// Fraction of a substep forgiven when dividing accumulated time, so that
/// e.g. `3.0 * (1/60)` computed in f32 still yields three whole substeps.
const SUBSTEP_SLACK: f64 = 1.0e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct SubstepClock {
    substep: f64,
    max_substeps: u32,
    accumulator: f64,
    /// Total simulated time dropped by the substep cap (s).
    dropped_time: f64,
    /// Total substeps handed out.
    elapsed_substeps: u64,
}

impl SubstepClock {
    pub fn new(substep: f32, max_substeps: u32) -> Self {
        Self {
            substep: (substep as f64).max(1.0e-6),
            max_substeps: max_substeps.max(1),
            accumulator: 0.0,
            dropped_time: 0.0,
            elapsed_substeps: 0,
        }
    }

    /// Adds `delta_time` and returns how many substeps to run now.
    pub fn advance(&mut self, delta_time: f32) -> u32 {
        let dt = if delta_time.is_finite() && delta_time > 0.0 {
            delta_time as f64
        } else {
            0.0
        };
        self.accumulator += dt;

        let whole = (self.accumulator / self.substep + SUBSTEP_SLACK).floor();
        let mut steps = whole as u64;
        self.accumulator = (self.accumulator - whole * self.substep).max(0.0);

        if steps > self.max_substeps as u64 {
            let dropped = (steps - self.max_substeps as u64) as f64 * self.substep;
            self.dropped_time += dropped;
            log::warn!(
                "[CLOCK] Substep cap hit: running {} of {} substeps, dropping {:.4}s",
                self.max_substeps,
                steps,
                dropped
            );
            steps = self.max_substeps as u64;
        }

        self.elapsed_substeps += steps;
        steps as u32
    }

    #[inline]
    pub fn substep(&self) -> f32 {
        self.substep as f32
    }

    #[inline]
    pub fn max_substeps(&self) -> u32 {
        self.max_substeps
    }

    /// Time waiting for the next substep (s).
    #[inline]
    pub fn leftover(&self) -> f64 {
        self.accumulator
    }

    #[inline]
    pub fn dropped_time(&self) -> f64 {
        self.dropped_time
    }

    #[inline]
    pub fn elapsed_substeps(&self) -> u64 {
        self.elapsed_substeps
    }

    /// Changes substep length and cap, keeping pending time.
    pub fn reconfigure(&mut self, substep: f32, max_substeps: u32) {
        self.substep = (substep as f64).max(1.0e-6);
        self.max_substeps = max_substeps.max(1);
    }

    /// Discards pending time.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leftover_carries_between_calls() {
        let mut clock = SubstepClock::new(0.1, 8);
        assert_eq!(clock.advance(0.05), 0);
        assert!((clock.leftover() - 0.05).abs() < 1e-6);
        assert_eq!(clock.advance(0.06), 1);
        assert!((clock.leftover() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_cap_drops_excess() {
        let mut clock = SubstepClock::new(0.1, 3);
        assert_eq!(clock.advance(1.05), 3);
        // Fraction below one substep is kept, the seven extra substeps are dropped.
        assert!((clock.leftover() - 0.05).abs() < 1e-6);
        assert!((clock.dropped_time() - 0.7).abs() < 1e-6);
        assert_eq!(clock.elapsed_substeps(), 3);
    }

    #[test]
    fn test_exact_multiples_are_not_lost_to_rounding() {
        let mut clock = SubstepClock::new(1.0 / 60.0, 8);
        assert_eq!(clock.advance(1.0 / 30.0), 2);
        let mut total = 0;
        for _ in 0..60 {
            total += clock.advance(1.0 / 60.0);
        }
        assert_eq!(total, 60);
    }

    #[test]
    fn test_invalid_delta_counts_as_zero() {
        let mut clock = SubstepClock::new(0.1, 8);
        assert_eq!(clock.advance(f32::NAN), 0);
        assert_eq!(clock.advance(-5.0), 0);
        assert_eq!(clock.advance(f32::INFINITY), 0);
        assert_eq!(clock.leftover(), 0.0);
    }
}
