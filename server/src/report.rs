//! End-of-run ledger report.

use bevy_log::info;
use hydro_shared::ledger::{ConservationReport, TransferRecord};
use hydro_shared::{Domain, HydroSimulation};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path};

/// Records copied into the report, newest last.
const REPORT_RECORDS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTotals {
    pub domain: Domain,
    pub volume: f64,
    pub injected: f64,
    pub withdrawn: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub width: usize,
    pub height: usize,
    pub ticks: u64,
    pub substeps: u64,
    pub dropped_time: f64,
    pub domains: Vec<DomainTotals>,
    pub surface_measured: f64,
    pub wet_cells: usize,
    pub max_depth: f32,
    pub active_waves: usize,
    pub audit: ConservationReport,
    pub audit_violations: u32,
    pub records_evicted: u64,
    pub recent_records: Vec<TransferRecord>,
}

impl RunReport {
    pub fn collect(simulation: &mut HydroSimulation) -> Self {
        let audit = simulation.audit();
        let ledger = simulation.ledger();
        let grid = simulation.grid();
        let cell_area = simulation.config().cell_area();

        let domains = Domain::ALL
            .iter()
            .map(|&domain| DomainTotals {
                domain,
                volume: ledger.volume(domain),
                injected: ledger.injected(domain),
                withdrawn: ledger.withdrawn(domain),
            })
            .collect();

        let skip = ledger.record_count().saturating_sub(REPORT_RECORDS);
        let recent_records = ledger.records().skip(skip).cloned().collect();

        Self {
            width: grid.width(),
            height: grid.height(),
            ticks: ledger.tick(),
            substeps: simulation.engine().clock().elapsed_substeps(),
            dropped_time: simulation.engine().clock().dropped_time(),
            domains,
            surface_measured: grid.surface_volume(cell_area),
            wet_cells: grid.wet_cells(simulation.config().waves.wet_threshold),
            max_depth: grid.max_depth(),
            active_waves: simulation.waves().active_sources(),
            audit,
            audit_violations: simulation.audit_state().total_violations(),
            records_evicted: ledger.evicted_records(),
            recent_records,
        }
    }
}

pub fn save_report(report: &RunReport, file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    // RON Serialization config
    let pretty_config = PrettyConfig::new()
        .with_depth_limit(3)
        .with_separate_tuple_members(true)
        .with_enumerate_arrays(true);

    let serialized = ron::ser::to_string_pretty(report, pretty_config)?;
    let mut file = File::create(file_path)?;
    file.write_all(serialized.as_bytes())?;
    info!("Ledger report saved to {}", file_path.display());
    Ok(())
}
