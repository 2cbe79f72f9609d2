use serde::{Deserialize, Serialize};
use std::fmt;

/// A water reservoir tracked by the conservation ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    /// Water standing on the grid (`Σ depth * cell_area`).
    Surface,
    Atmosphere,
    /// Soil moisture held by the geology collaborator.
    SoilMoisture,
    /// Deep storage, including everything drained off the grid edge.
    Groundwater,
}

impl Domain {
    pub const COUNT: usize = 4;

    pub const ALL: [Domain; Self::COUNT] = [
        Domain::Surface,
        Domain::Atmosphere,
        Domain::SoilMoisture,
        Domain::Groundwater,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Domain::Surface => 0,
            Domain::Atmosphere => 1,
            Domain::SoilMoisture => 2,
            Domain::Groundwater => 3,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Surface => "surface",
            Domain::Atmosphere => "atmosphere",
            Domain::SoilMoisture => "soil-moisture",
            Domain::Groundwater => "groundwater",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_match_all_order() {
        for (i, domain) in Domain::ALL.iter().enumerate() {
            assert_eq!(domain.index(), i);
        }
    }
}
