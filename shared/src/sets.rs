use bevy::prelude::*;

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum HydroUpdateSet {
    /// External collaborators (brushes, weather, terrain edits) write commands.
    Commands,
    /// Physics substeps, exchanges and wave generation.
    Simulate,
    /// Ledger/grid consistency checks.
    Audit,
}
