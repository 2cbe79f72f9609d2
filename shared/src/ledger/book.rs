//! The conservation ledger: the only path by which water changes domain.
//!
//! ## Design Principles
//! - Every movement is clamped to what the source domain holds; callers use
//!   the returned actual amount, never the request
//! - Internal transfers and external injections/withdrawals are counted
//!   separately so closure can be checked as
//!   `Δtotal - Δ(injected - withdrawn) ≈ 0`
//! - Cumulative counters are never truncated; only the record log is bounded

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::domain::Domain;
use super::record::{RecordKind, TransferReason, TransferRecord};
use crate::config::constants::AUDIT_CAPACITY;

/// Frozen ledger totals, used as the baseline of a closure check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub tick: u64,
    pub volumes: [f64; Domain::COUNT],
    pub total: f64,
    pub net_external: f64,
}

impl LedgerSnapshot {
    #[inline]
    pub fn volume(&self, domain: Domain) -> f64 {
        self.volumes[domain.index()]
    }
}

#[derive(Debug, Clone)]
pub struct ConservationLedger {
    volumes: [f64; Domain::COUNT],
    injected: [f64; Domain::COUNT],
    withdrawn: [f64; Domain::COUNT],
    /// `transferred[from][to]`, cumulative.
    transferred: [[f64; Domain::COUNT]; Domain::COUNT],
    records: VecDeque<TransferRecord>,
    capacity: usize,
    evicted_records: u64,
    tick: u64,
}

impl Default for ConservationLedger {
    fn default() -> Self {
        Self::new(AUDIT_CAPACITY)
    }
}

impl ConservationLedger {
    /// Empty ledger keeping at most `capacity` audit records.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            volumes: [0.0; Domain::COUNT],
            injected: [0.0; Domain::COUNT],
            withdrawn: [0.0; Domain::COUNT],
            transferred: [[0.0; Domain::COUNT]; Domain::COUNT],
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted_records: 0,
            tick: 0,
        }
    }

    // ========================================================================
    // Movement
    // ========================================================================

    /// Moves up to `amount` from `from` to `to`, returning the actual volume.
    ///
    /// Never fails: requests beyond the source's volume are clamped, and
    /// non-positive or NaN requests move nothing and leave no record.
    pub fn transfer(
        &mut self,
        from: Domain,
        to: Domain,
        amount: f64,
        cell: Option<usize>,
        reason: TransferReason,
    ) -> f64 {
        if !is_positive(amount) || from == to {
            return 0.0;
        }

        let actual = amount.min(self.available(from));
        self.volumes[from.index()] -= actual;
        self.volumes[to.index()] += actual;
        self.transferred[from.index()][to.index()] += actual;

        if actual < amount {
            log::trace!(
                "[LEDGER] {} -> {} clamped: requested {:.6}, moved {:.6}",
                from,
                to,
                amount,
                actual
            );
        }

        self.push_record(TransferRecord {
            kind: RecordKind::Transfer,
            from: Some(from),
            to: Some(to),
            cell,
            requested: amount,
            actual,
            tick: self.tick,
            reason,
        });
        actual
    }

    /// Off-grid drainage.
    pub fn transfer_surface_to_groundwater(&mut self, cell: Option<usize>, amount: f64) -> f64 {
        self.transfer(
            Domain::Surface,
            Domain::Groundwater,
            amount,
            cell,
            TransferReason::EdgeDrainage,
        )
    }

    pub fn transfer_surface_to_atmosphere(&mut self, cell: Option<usize>, amount: f64) -> f64 {
        self.transfer(
            Domain::Surface,
            Domain::Atmosphere,
            amount,
            cell,
            TransferReason::Evaporation,
        )
    }

    pub fn transfer_surface_to_soil_moisture(&mut self, cell: Option<usize>, amount: f64) -> f64 {
        self.transfer(
            Domain::Surface,
            Domain::SoilMoisture,
            amount,
            cell,
            TransferReason::Infiltration,
        )
    }

    /// Returns previously evaporated water to the surface.
    pub fn transfer_atmosphere_to_surface(&mut self, cell: Option<usize>, amount: f64) -> f64 {
        self.transfer(
            Domain::Atmosphere,
            Domain::Surface,
            amount,
            cell,
            TransferReason::Precipitation,
        )
    }

    /// Adds water from outside the system. Non-finite or non-positive
    /// amounts are ignored.
    pub fn inject(
        &mut self,
        domain: Domain,
        amount: f64,
        cell: Option<usize>,
        reason: TransferReason,
    ) -> f64 {
        if !is_positive(amount) || !amount.is_finite() {
            return 0.0;
        }

        self.volumes[domain.index()] += amount;
        self.injected[domain.index()] += amount;
        self.push_record(TransferRecord {
            kind: RecordKind::Injection,
            from: None,
            to: Some(domain),
            cell,
            requested: amount,
            actual: amount,
            tick: self.tick,
            reason,
        });
        amount
    }

    /// Removes up to `amount` from the system, returning the actual volume.
    pub fn withdraw(
        &mut self,
        domain: Domain,
        amount: f64,
        cell: Option<usize>,
        reason: TransferReason,
    ) -> f64 {
        if !is_positive(amount) {
            return 0.0;
        }

        let actual = amount.min(self.available(domain));
        self.volumes[domain.index()] -= actual;
        self.withdrawn[domain.index()] += actual;
        self.push_record(TransferRecord {
            kind: RecordKind::Withdrawal,
            from: Some(domain),
            to: None,
            cell,
            requested: amount,
            actual,
            tick: self.tick,
            reason,
        });
        actual
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Volume that may leave `domain` right now.
    #[inline]
    pub fn available(&self, domain: Domain) -> f64 {
        self.volumes[domain.index()].max(0.0)
    }

    #[inline]
    pub fn volume(&self, domain: Domain) -> f64 {
        self.volumes[domain.index()]
    }

    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    pub fn injected(&self, domain: Domain) -> f64 {
        self.injected[domain.index()]
    }

    pub fn withdrawn(&self, domain: Domain) -> f64 {
        self.withdrawn[domain.index()]
    }

    /// Cumulative `Σ injected - Σ withdrawn` over all domains.
    pub fn net_external(&self) -> f64 {
        self.injected.iter().sum::<f64>() - self.withdrawn.iter().sum::<f64>()
    }

    /// Cumulative volume moved from `from` to `to`.
    #[inline]
    pub fn transferred(&self, from: Domain, to: Domain) -> f64 {
        self.transferred[from.index()][to.index()]
    }

    /// Volume created or destroyed since `baseline`, net of external flows.
    /// Zero (within float noise) for a consistent ledger.
    pub fn closure_error(&self, baseline: &LedgerSnapshot) -> f64 {
        (self.total_volume() - baseline.total) - (self.net_external() - baseline.net_external)
    }

    /// Audit records, oldest first. At most `capacity` are retained.
    pub fn records(&self) -> impl Iterator<Item = &TransferRecord> {
        self.records.iter()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Records pushed out of the bounded log so far.
    pub fn evicted_records(&self) -> u64 {
        self.evicted_records
    }

    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advances the tick stamp written into new records.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            tick: self.tick,
            volumes: self.volumes,
            total: self.total_volume(),
            net_external: self.net_external(),
        }
    }

    fn push_record(&mut self, record: TransferRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
            self.evicted_records += 1;
        }
        self.records.push_back(record);
    }
}

#[inline]
fn is_positive(amount: f64) -> bool {
    !amount.is_nan() && amount > 0.0
}
