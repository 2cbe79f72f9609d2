//! Runtime invariant validation for the ledger and the grid it mirrors.
//!
//! Validated invariants:
//! 1. **Closure**: total volume changed only by external flows.
//! 2. **Surface agreement**: the ledger's Surface volume matches
//!    `Σ depth * cell_area` on the grid.
//! 3. **Non-negativity**: no cell holds negative (or NaN) depth.
//!
//! Violations are logged with `warn!` and counted; nothing is repaired.

use bevy_log::warn;
use serde::{Deserialize, Serialize};

use super::book::{ConservationLedger, LedgerSnapshot};
use super::domain::Domain;
use crate::grid::GridState;

/// Relative tolerance on Surface agreement. The grid stores f32 depths, so
/// agreement degrades with total volume.
pub const SURFACE_RELATIVE_TOLERANCE: f64 = 1.0e-5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConservationReport {
    pub tick: u64,
    pub closure_error: f64,
    /// Ledger Surface minus the grid's measured surface volume.
    pub surface_drift: f64,
    pub negative_cells: usize,
    pub total_volume: f64,
    pub ok: bool,
}

/// Counts violations across checks.
#[derive(Debug, Clone, Default)]
pub struct ConservationAudit {
    pub checks: u64,
    pub closure_violations: u32,
    pub drift_violations: u32,
    pub negativity_violations: u32,
    pub last: Option<ConservationReport>,
}

impl ConservationAudit {
    pub fn check(
        &mut self,
        ledger: &ConservationLedger,
        grid: &GridState,
        cell_area: f32,
        baseline: &LedgerSnapshot,
        epsilon: f64,
    ) -> ConservationReport {
        self.checks += 1;

        let closure_error = ledger.closure_error(baseline);
        let measured = grid.surface_volume(cell_area);
        let surface_drift = ledger.volume(Domain::Surface) - measured;
        let negative_cells = grid.negative_cells();
        let drift_tolerance = epsilon.max(measured.abs() * SURFACE_RELATIVE_TOLERANCE);

        let mut ok = true;

        if closure_error.abs() > epsilon {
            warn!(
                "Invariant violation: ledger closure error {:.6} m³ at tick {} (epsilon {:.6})",
                closure_error,
                ledger.tick(),
                epsilon
            );
            self.closure_violations += 1;
            ok = false;
        }

        if surface_drift.abs() > drift_tolerance {
            warn!(
                "Invariant violation: ledger surface {:.6} m³ differs from grid {:.6} m³",
                ledger.volume(Domain::Surface),
                measured
            );
            self.drift_violations += 1;
            ok = false;
        }

        if negative_cells > 0 {
            warn!(
                "Invariant violation: {} cells with negative or NaN depth",
                negative_cells
            );
            self.negativity_violations += 1;
            ok = false;
        }

        let report = ConservationReport {
            tick: ledger.tick(),
            closure_error,
            surface_drift,
            negative_cells,
            total_volume: ledger.total_volume(),
            ok,
        };
        self.last = Some(report);
        report
    }

    pub fn total_violations(&self) -> u32 {
        self.closure_violations + self.drift_violations + self.negativity_violations
    }
}
