//! Conservation ledger: per-domain volumes, transfers and their audit trail.

pub mod audit;
pub mod book;
pub mod domain;
pub mod record;

pub use audit::{ConservationAudit, ConservationReport};
pub use book::{ConservationLedger, LedgerSnapshot};
pub use domain::Domain;
pub use record::{RecordKind, TransferReason, TransferRecord};
