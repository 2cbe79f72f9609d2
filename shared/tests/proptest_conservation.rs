//! Property-based tests for the hydrology core using proptest
//!
//! These tests verify invariants hold across random initial fields:
//! - No negative (or NaN) depth after any public operation
//! - Total volume is unchanged by ticks without external input
//! - A cell never plans to send more than it holds
//! - Removing what was added restores the Surface volume

use std::sync::Arc;

use bevy::math::Vec2;
use hydro_shared::{
    Domain, EdgeMode, HeightField, HydroConfig, HydroSimulation, SoilColumns,
};
use proptest::prelude::*;

const MAX_SIDE: usize = 10;
const SUBSTEPS: usize = 20;

/// Width, height, terrain and initial depth per cell.
fn field() -> impl Strategy<Value = (usize, usize, Vec<f32>, Vec<f32>)> {
    (2..=MAX_SIDE, 2..=MAX_SIDE).prop_flat_map(|(width, height)| {
        let cells = width * height;
        (
            Just(width),
            Just(height),
            prop::collection::vec(0.0f32..3.0, cells),
            prop::collection::vec(prop_oneof![Just(0.0f32), 0.0f32..5.0], cells),
        )
    })
}

fn edge_mode() -> impl Strategy<Value = EdgeMode> {
    prop_oneof![
        Just(EdgeMode::Closed),
        Just(EdgeMode::Outflow),
        (-1.0f32..2.0).prop_map(|level| EdgeMode::Sink { level }),
    ]
}

fn build(
    width: usize,
    height: usize,
    terrain: Vec<f32>,
    depths: &[f32],
    config: HydroConfig,
) -> HydroSimulation {
    let terrain = Arc::new(HeightField::from_heights(width, height, terrain));
    let mut sim = HydroSimulation::new(config, terrain)
        .unwrap()
        .with_geology(SoilColumns::new(width * height, 0.05));
    for (i, &depth) in depths.iter().enumerate() {
        sim.add_water_to_cell(i % width, i / width, depth as f64);
    }
    sim
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_depth_never_negative((width, height, terrain, depths) in field(), edge_mode in edge_mode()) {
        let config = HydroConfig {
            edge_mode,
            evaporation_rate: 1.0e-3,
            infiltration_rate: 1.0e-2,
            ..HydroConfig::default()
        };
        let mut sim = build(width, height, terrain, &depths, config);
        let substep = sim.config().substep;

        for _ in 0..SUBSTEPS {
            sim.tick(substep);
            prop_assert!(sim.grid().depth().iter().all(|&d| d >= 0.0));
        }
        sim.remove_water(Vec2::new(1.0, 1.0), 100.0, 3.0);
        prop_assert_eq!(sim.grid().negative_cells(), 0);
    }

    #[test]
    fn test_ticks_conserve_total_volume((width, height, terrain, depths) in field(), edge_mode in edge_mode()) {
        let config = HydroConfig {
            edge_mode,
            evaporation_rate: 1.0e-3,
            infiltration_rate: 1.0e-2,
            ..HydroConfig::default()
        };
        let mut sim = build(width, height, terrain, &depths, config);
        let before = sim.ledger().total_volume();
        let substep = sim.config().substep;

        for _ in 0..SUBSTEPS {
            sim.tick(substep);
        }

        prop_assert!((sim.ledger().total_volume() - before).abs() < 1e-6);
        let surface = sim.ledger().volume(Domain::Surface);
        let measured = sim.grid().surface_volume(1.0);
        prop_assert!((surface - measured).abs() < 1e-3_f64.max(measured * 1e-5));
        prop_assert!(sim.audit().ok);
    }

    #[test]
    fn test_outflow_bounded_by_cell_volume((width, height, terrain, depths) in field(), edge_mode in edge_mode()) {
        let config = HydroConfig {
            edge_mode,
            flow_rate: 50.0,
            ..HydroConfig::transport_only()
        };
        let sim = build(width, height, terrain, &depths, config);
        let mut engine = sim.engine().clone();
        engine.compute(sim.grid(), sim.config(), sim.config().substep);

        for (i, &depth) in sim.grid().depth().iter().enumerate() {
            let out = engine.plan().total_outflow(i);
            prop_assert!(out <= depth * (1.0 + 1.0e-5) + 1.0e-7, "cell {} sends {} of {}", i, out, depth);
        }
    }

    #[test]
    fn test_remove_undoes_add(
        (width, height, terrain, depths) in field(),
        x in 0.0f32..1.0,
        y in 0.0f32..1.0,
        amount in 0.01f64..40.0,
        radius in 0.0f32..4.0,
    ) {
        let mut sim = build(width, height, terrain, &depths, HydroConfig::transport_only());
        let location = Vec2::new(x * width as f32, y * height as f32);
        let before = sim.ledger().volume(Domain::Surface);

        let added = sim.add_water(location, amount, radius);
        let removed = sim.remove_water(location, added, radius);

        prop_assert!((added - amount).abs() < 1e-12);
        prop_assert!((removed - added).abs() < 1e-4 * added.max(1.0));
        prop_assert!((sim.ledger().volume(Domain::Surface) - before).abs() < 1e-4 * added.max(1.0));
    }
}
