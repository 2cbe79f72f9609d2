pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod flow;
pub mod grid;
pub mod ledger;
pub mod plugin;
pub mod sets;
pub mod simulation;
pub mod waves;

pub use collaborators::{
    AmbientAtmosphere, AtmosphereProvider, CoordinateSystem, FlatTerrain, GeologyProvider,
    GridTransform, HeightField, ImpermeableBedrock, SoilColumns, TerrainProvider,
};
pub use config::{EdgeMode, HydroConfig, HydroPreset, WaveConfig};
pub use constants::*;
pub use error::{GridError, GridResult};
pub use grid::{Field, GridState};
pub use ledger::{ConservationLedger, ConservationReport, Domain, TransferReason};
pub use plugin::{HydroStatus, HydrologyPlugin, WaterCommand};
pub use sets::HydroUpdateSet;
pub use simulation::{HydroSimulation, Spring, SpringId, TickSummary};
