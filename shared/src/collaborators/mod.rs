//! Interfaces to the systems this core does not own.
//!
//! The simulation holds handles to these collaborators instead of reaching
//! through a global controller:
//!
//! ```text
//!   TerrainProvider ──heights──▶ ┌──────────────────┐ ──evaporation──▶ AtmosphereProvider
//!   CoordinateSystem ─world↔cell─▶│  HydroSimulation │ ◀──────wind──────
//!                                 └──────────────────┘ ──infiltration/drainage──▶ GeologyProvider
//! ```
//!
//! Each trait ships with a simple default implementation so the core can run
//! standalone (tests, headless host).

pub mod atmosphere;
pub mod coords;
pub mod geology;
pub mod terrain;

pub use atmosphere::{AmbientAtmosphere, AtmosphereProvider};
pub use coords::{CoordinateSystem, GridTransform};
pub use geology::{GeologyProvider, ImpermeableBedrock, SoilColumns};
pub use terrain::{FlatTerrain, HeightField, TerrainProvider};
