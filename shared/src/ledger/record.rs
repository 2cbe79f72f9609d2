//! Audit trail entries written by the ledger.

use serde::{Deserialize, Serialize};

use super::domain::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Internal movement between two domains.
    Transfer,
    /// Water entering the system from outside.
    Injection,
    /// Water leaving the system.
    Withdrawal,
}

/// Why a volume moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferReason {
    EdgeDrainage,
    Evaporation,
    Infiltration,
    Precipitation,
    UserAdd,
    UserRemove,
    Spring,
    /// Surface water discarded when the grid is rebuilt.
    GridReset,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub kind: RecordKind,
    /// `None` for injections.
    pub from: Option<Domain>,
    /// `None` for withdrawals.
    pub to: Option<Domain>,
    /// Grid cell the movement is attributed to, if it is cell-local.
    pub cell: Option<usize>,
    pub requested: f64,
    pub actual: f64,
    pub tick: u64,
    pub reason: TransferReason,
}

impl TransferRecord {
    /// Volume asked for but not delivered.
    #[inline]
    pub fn shortfall(&self) -> f64 {
        (self.requested - self.actual).max(0.0)
    }
}
