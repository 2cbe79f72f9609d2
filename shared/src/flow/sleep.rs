//! Tile sleeping for settled water.
//!
//! ## Design Principles
//! - The grid is split into square tiles; a tile whose transport activity
//!   stays below a threshold for long enough "sleeps"
//! - Sleeping tiles are skipped by the gradient phase, except for cells on
//!   their border with an awake tile, so inflow is never blocked
//! - Sleeping only withholds outflow, it never moves or removes water
//!
//! ## Wake Triggers
//! - Water added or removed inside the tile
//! - Inflow delivered from a neighbouring tile
//! - Terrain edits inside the tile
//! - Grid resize (all state is rebuilt awake)

use bevy::math::UVec2;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Tile edge length in cells.
pub const SLEEP_TILE_SIZE: usize = 16;

/// Minimum number of stable substeps before a tile can sleep.
pub const MIN_STABLE_SUBSTEPS_TO_SLEEP: u32 = 60;

/// Maximum transported volume (sum of absolute cell deltas, m³) per substep
/// for a tile to be considered stable.
pub const STABILITY_VOLUME_THRESHOLD: f32 = 1.0e-4;

/// Number of substeps a tile remains awake after being woken.
pub const MIN_AWAKE_SUBSTEPS_AFTER_WAKE: u32 = 10;

// ============================================================================
// Sleep State Tracking
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileSleepState {
    #[default]
    Awake,
    Asleep,
    /// Recently woken; cannot fall asleep yet.
    Waking,
}

#[derive(Debug, Clone, Default)]
pub struct TileState {
    pub state: TileSleepState,
    /// Consecutive stable substeps (resets on activity).
    pub stable_substeps: u32,
    pub substeps_since_wake: u32,
    /// Transported volume recorded during the current substep.
    pub volume_delta: f32,
}

impl TileState {
    #[inline]
    pub fn is_asleep(&self) -> bool {
        self.state == TileSleepState::Asleep
    }

    /// Updates state from the substep's activity and clears it.
    fn update(&mut self) {
        let active = self.volume_delta >= STABILITY_VOLUME_THRESHOLD;
        match self.state {
            TileSleepState::Awake => {
                if active {
                    self.stable_substeps = 0;
                } else {
                    self.stable_substeps += 1;
                    if self.stable_substeps >= MIN_STABLE_SUBSTEPS_TO_SLEEP {
                        self.state = TileSleepState::Asleep;
                    }
                }
            }
            TileSleepState::Waking => {
                self.substeps_since_wake += 1;
                if self.substeps_since_wake >= MIN_AWAKE_SUBSTEPS_AFTER_WAKE {
                    self.state = TileSleepState::Awake;
                    self.substeps_since_wake = 0;
                }
            }
            TileSleepState::Asleep => {
                // Inflow from an awake neighbour
                if active {
                    self.wake();
                }
            }
        }
        self.volume_delta = 0.0;
    }

    fn wake(&mut self) {
        if self.state == TileSleepState::Asleep {
            self.state = TileSleepState::Waking;
            self.substeps_since_wake = 0;
        }
        self.stable_substeps = 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepStats {
    pub sleeping_tiles: usize,
    pub awake_tiles: usize,
    pub waking_tiles: usize,
    /// Tile-substeps skipped so far.
    pub substeps_saved: u64,
}

/// Sleep state for every tile of the grid.
#[derive(Debug, Clone)]
pub struct TileSleepManager {
    enabled: bool,
    grid_width: usize,
    grid_height: usize,
    tiles_x: usize,
    tiles_y: usize,
    tiles: Vec<TileState>,
    pub stats: SleepStats,
}

impl TileSleepManager {
    pub fn new(grid_width: usize, grid_height: usize, enabled: bool) -> Self {
        let tiles_x = grid_width.div_ceil(SLEEP_TILE_SIZE).max(1);
        let tiles_y = grid_height.div_ceil(SLEEP_TILE_SIZE).max(1);
        Self {
            enabled,
            grid_width,
            grid_height,
            tiles_x,
            tiles_y,
            tiles: vec![TileState::default(); tiles_x * tiles_y],
            stats: SleepStats::default(),
        }
    }

    /// Rebuilds all tiles awake for a new grid size.
    pub fn resize(&mut self, grid_width: usize, grid_height: usize) {
        *self = Self::new(grid_width, grid_height, self.enabled);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.wake_all("sleeping disabled");
        }
        self.enabled = enabled;
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn tile_dimensions(&self) -> UVec2 {
        UVec2::new(self.tiles_x as u32, self.tiles_y as u32)
    }

    #[inline]
    fn tile_of(&self, x: usize, y: usize) -> usize {
        (y / SLEEP_TILE_SIZE) * self.tiles_x + x / SLEEP_TILE_SIZE
    }

    pub fn tile(&self, tx: usize, ty: usize) -> Option<&TileState> {
        if tx < self.tiles_x && ty < self.tiles_y {
            self.tiles.get(ty * self.tiles_x + tx)
        } else {
            None
        }
    }

    #[inline]
    fn tile_asleep(&self, tx: i64, ty: i64) -> bool {
        if tx < 0 || ty < 0 || tx >= self.tiles_x as i64 || ty >= self.tiles_y as i64 {
            // Off-grid counts as asleep so it never forces evaluation
            return true;
        }
        self.tiles[ty as usize * self.tiles_x + tx as usize].is_asleep()
    }

    /// Whether the gradient phase must evaluate cell `(x, y)`.
    #[inline]
    pub fn should_simulate(&self, x: usize, y: usize) -> bool {
        if !self.enabled {
            return true;
        }
        let tx = (x / SLEEP_TILE_SIZE) as i64;
        let ty = (y / SLEEP_TILE_SIZE) as i64;
        if !self.tile_asleep(tx, ty) {
            return true;
        }

        // Border cells of a sleeping tile next to an awake tile stay live.
        let lx = x % SLEEP_TILE_SIZE;
        let ly = y % SLEEP_TILE_SIZE;
        let dxs: &[i64] = match lx {
            0 => &[-1, 0],
            _ if lx == SLEEP_TILE_SIZE - 1 || x + 1 == self.grid_width => &[0, 1],
            _ => &[0],
        };
        let dys: &[i64] = match ly {
            0 => &[-1, 0],
            _ if ly == SLEEP_TILE_SIZE - 1 || y + 1 == self.grid_height => &[0, 1],
            _ => &[0],
        };
        for &dy in dys {
            for &dx in dxs {
                if (dx != 0 || dy != 0) && !self.tile_asleep(tx + dx, ty + dy) {
                    return true;
                }
            }
        }
        false
    }

    /// Adds transported volume to the tile containing `(x, y)`.
    #[inline]
    pub fn record_activity(&mut self, x: usize, y: usize, volume_delta: f32) {
        let tile = self.tile_of(x, y);
        if let Some(state) = self.tiles.get_mut(tile) {
            state.volume_delta += volume_delta.abs();
        }
    }

    /// Wakes the tile containing cell `(x, y)`.
    pub fn wake_cell(&mut self, x: usize, y: usize, reason: &str) {
        if x >= self.grid_width || y >= self.grid_height {
            return;
        }
        let tile = self.tile_of(x, y);
        if let Some(state) = self.tiles.get_mut(tile) {
            if state.is_asleep() {
                log::debug!(
                    "[SLEEP] Waking tile ({}, {}): {}",
                    x / SLEEP_TILE_SIZE,
                    y / SLEEP_TILE_SIZE,
                    reason
                );
            }
            state.wake();
        }
    }

    /// Wakes every tile overlapping the cell rectangle `[min, max]`.
    pub fn wake_region(&mut self, min: UVec2, max: UVec2, reason: &str) {
        if self.grid_width == 0 || self.grid_height == 0 {
            return;
        }
        let max_x = (max.x as usize).min(self.grid_width - 1);
        let max_y = (max.y as usize).min(self.grid_height - 1);
        let (min_x, min_y) = (min.x as usize, min.y as usize);
        if min_x > max_x || min_y > max_y {
            return;
        }
        for ty in min_y / SLEEP_TILE_SIZE..=max_y / SLEEP_TILE_SIZE {
            for tx in min_x / SLEEP_TILE_SIZE..=max_x / SLEEP_TILE_SIZE {
                self.wake_cell(tx * SLEEP_TILE_SIZE, ty * SLEEP_TILE_SIZE, reason);
            }
        }
    }

    pub fn wake_all(&mut self, reason: &str) {
        let mut woken = 0;
        for state in &mut self.tiles {
            if state.is_asleep() {
                woken += 1;
            }
            state.wake();
        }
        if woken > 0 {
            log::debug!("[SLEEP] Woke {} tiles: {}", woken, reason);
        }
    }

    /// Advances every tile after a substep (call once per substep, after
    /// the apply phase has recorded activity).
    pub fn update_all(&mut self) {
        if !self.enabled {
            self.tiles.iter_mut().for_each(|t| t.volume_delta = 0.0);
            return;
        }

        let mut stats = SleepStats {
            substeps_saved: self.stats.substeps_saved,
            ..Default::default()
        };
        let mut fell_asleep = 0;

        for state in &mut self.tiles {
            let was_asleep = state.is_asleep();
            state.update();
            if !was_asleep && state.is_asleep() {
                fell_asleep += 1;
            }
            match state.state {
                TileSleepState::Asleep => stats.sleeping_tiles += 1,
                TileSleepState::Awake => stats.awake_tiles += 1,
                TileSleepState::Waking => stats.waking_tiles += 1,
            }
        }

        stats.substeps_saved += stats.sleeping_tiles as u64;
        if fell_asleep > 0 {
            log::debug!(
                "[SLEEP] {} tiles fell asleep ({} sleeping, {} awake)",
                fell_asleep,
                stats.sleeping_tiles,
                stats.awake_tiles + stats.waking_tiles
            );
        }
        self.stats = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(manager: &mut TileSleepManager) {
        for _ in 0..MIN_STABLE_SUBSTEPS_TO_SLEEP {
            manager.update_all();
        }
    }

    #[test]
    fn test_stable_tiles_fall_asleep() {
        let mut manager = TileSleepManager::new(32, 16, true);
        assert!(manager.should_simulate(5, 5));

        settle(&mut manager);

        assert_eq!(manager.stats.sleeping_tiles, 2);
        assert!(!manager.should_simulate(5, 5));
    }

    #[test]
    fn test_activity_prevents_sleep() {
        let mut manager = TileSleepManager::new(16, 16, true);
        for _ in 0..MIN_STABLE_SUBSTEPS_TO_SLEEP * 2 {
            manager.record_activity(3, 3, 1.0);
            manager.update_all();
        }
        assert_eq!(manager.stats.sleeping_tiles, 0);
    }

    #[test]
    fn test_inflow_wakes_sleeping_tile() {
        let mut manager = TileSleepManager::new(16, 16, true);
        settle(&mut manager);
        assert!(manager.tile(0, 0).unwrap().is_asleep());

        manager.record_activity(0, 0, 0.5);
        manager.update_all();

        assert_eq!(manager.tile(0, 0).unwrap().state, TileSleepState::Waking);
        assert!(manager.should_simulate(8, 8));
    }

    #[test]
    fn test_border_cells_next_to_awake_tile_stay_live() {
        let mut manager = TileSleepManager::new(32, 16, true);
        settle(&mut manager);
        manager.wake_cell(20, 4, "test");

        // Right border of the sleeping left tile touches the awake tile.
        assert!(manager.should_simulate(15, 4));
        // Interior of the sleeping tile stays skipped.
        assert!(!manager.should_simulate(7, 4));
    }

    #[test]
    fn test_wake_cooldown() {
        let mut manager = TileSleepManager::new(16, 16, true);
        settle(&mut manager);
        manager.wake_region(UVec2::ZERO, UVec2::new(3, 3), "manual");

        for _ in 0..MIN_AWAKE_SUBSTEPS_AFTER_WAKE {
            manager.update_all();
        }
        assert_eq!(manager.tile(0, 0).unwrap().state, TileSleepState::Awake);
    }

    #[test]
    fn test_disabled_never_sleeps() {
        let mut manager = TileSleepManager::new(16, 16, false);
        settle(&mut manager);
        assert!(manager.should_simulate(1, 1));
        assert!(!manager.tile(0, 0).unwrap().is_asleep());
    }
}
