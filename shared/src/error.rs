//! Configuration errors for the hydrology core.
//!
//! Bounds problems and insufficient volume are never errors: they clamp and
//! report through return values. Only invalid grid shapes are rejected.

use thiserror::Error;

pub type GridResult<T> = Result<T, GridError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Width or height of zero.
    #[error("invalid grid dimensions {width}x{height}: both must be non-zero")]
    InvalidDimensions { width: usize, height: usize },

    /// Requested grid is larger than the supported maximum (or overflows).
    #[error("grid of {cells} cells exceeds the maximum of {max}")]
    TooManyCells { cells: usize, max: usize },

    /// Terrain collaborator reports a shape that differs from the grid.
    #[error("terrain is {actual:?} but grid expects {expected:?}")]
    TerrainMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Validates a requested grid shape, returning the cell count.
pub fn validate_dimensions(width: usize, height: usize, max_cells: usize) -> GridResult<usize> {
    if width == 0 || height == 0 {
        return Err(GridError::InvalidDimensions { width, height });
    }
    match width.checked_mul(height) {
        Some(cells) if cells <= max_cells => Ok(cells),
        Some(cells) => Err(GridError::TooManyCells {
            cells,
            max: max_cells,
        }),
        None => Err(GridError::TooManyCells {
            cells: usize::MAX,
            max: max_cells,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimensions_rejected() {
        assert_eq!(
            validate_dimensions(0, 5, 100),
            Err(GridError::InvalidDimensions {
                width: 0,
                height: 5
            })
        );
        assert!(validate_dimensions(5, 0, 100).is_err());
    }

    #[test]
    fn test_oversized_grid_rejected() {
        assert!(matches!(
            validate_dimensions(11, 10, 100),
            Err(GridError::TooManyCells { cells: 110, .. })
        ));
        assert!(matches!(
            validate_dimensions(usize::MAX, 2, 100),
            Err(GridError::TooManyCells { .. })
        ));
    }

    #[test]
    fn test_valid_dimensions() {
        assert_eq!(validate_dimensions(3, 3, 100), Ok(9));
    }
}
