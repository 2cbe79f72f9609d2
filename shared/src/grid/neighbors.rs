//! 8-connected neighbourhood used by the flow engine.

use bevy::math::IVec2;
use std::f32::consts::FRAC_1_SQRT_2;

/// Number of neighbours per cell.
pub const NEIGHBOR_COUNT: usize = 8;

/// Offsets of the 8 neighbours, orthogonal first.
pub const NEIGHBOR_OFFSETS: [IVec2; NEIGHBOR_COUNT] = [
    IVec2::new(1, 0),
    IVec2::new(-1, 0),
    IVec2::new(0, 1),
    IVec2::new(0, -1),
    IVec2::new(1, 1),
    IVec2::new(-1, -1),
    IVec2::new(1, -1),
    IVec2::new(-1, 1),
];

/// Flow weight per direction: diagonals share a corner, not an edge, so
/// they conduct less.
pub const NEIGHBOR_WEIGHTS: [f32; NEIGHBOR_COUNT] = [
    1.0,
    1.0,
    1.0,
    1.0,
    FRAC_1_SQRT_2,
    FRAC_1_SQRT_2,
    FRAC_1_SQRT_2,
    FRAC_1_SQRT_2,
];

/// Unit direction vectors matching [`NEIGHBOR_OFFSETS`].
pub const NEIGHBOR_DIRECTIONS: [[f32; 2]; NEIGHBOR_COUNT] = [
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [FRAC_1_SQRT_2, FRAC_1_SQRT_2],
    [-FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
    [FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
    [-FRAC_1_SQRT_2, FRAC_1_SQRT_2],
];

/// Index of the opposite direction for each direction.
pub const OPPOSITE: [usize; NEIGHBOR_COUNT] = [1, 0, 3, 2, 5, 4, 7, 6];

/// Resolves the neighbour of `(x, y)` in direction `dir` on a
/// `width × height` grid, returning its row-major index if in range.
#[inline]
pub fn neighbor_index(x: usize, y: usize, dir: usize, width: usize, height: usize) -> Option<usize> {
    let offset = NEIGHBOR_OFFSETS[dir];
    let nx = x as i64 + offset.x as i64;
    let ny = y as i64 + offset.y as i64;
    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
        None
    } else {
        Some(ny as usize * width + nx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposites_cancel() {
        for dir in 0..NEIGHBOR_COUNT {
            let back = OPPOSITE[dir];
            assert_eq!(NEIGHBOR_OFFSETS[dir] + NEIGHBOR_OFFSETS[back], IVec2::ZERO);
            assert_eq!(OPPOSITE[back], dir);
        }
    }

    #[test]
    fn test_directions_are_unit_and_aligned() {
        for dir in 0..NEIGHBOR_COUNT {
            let [dx, dy] = NEIGHBOR_DIRECTIONS[dir];
            assert!(((dx * dx + dy * dy).sqrt() - 1.0).abs() < 1e-6);
            assert_eq!(dx.round() as i32, NEIGHBOR_OFFSETS[dir].x);
            assert_eq!(dy.round() as i32, NEIGHBOR_OFFSETS[dir].y);
        }
    }

    #[test]
    fn test_neighbor_index_bounds() {
        assert_eq!(neighbor_index(0, 0, 1, 3, 3), None);
        assert_eq!(neighbor_index(0, 0, 0, 3, 3), Some(1));
        assert_eq!(neighbor_index(1, 1, 4, 3, 3), Some(8));
        assert_eq!(neighbor_index(2, 2, 4, 3, 3), None);
    }
}
