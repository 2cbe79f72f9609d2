//! Flow physics: gradient-driven transport, edge drainage and exchange.

pub mod apply;
pub mod clock;
pub mod engine;
pub mod exchange;
pub mod gradient;
pub mod sleep;

pub use clock::SubstepClock;
pub use engine::{FlowEngine, SubstepReport};
pub use gradient::{OutflowPlan, MAX_EDGE_FRACTION};
pub use sleep::{TileSleepManager, SLEEP_TILE_SIZE};
