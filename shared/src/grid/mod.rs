pub mod neighbors;
pub mod state;

pub use neighbors::*;
pub use state::{bilinear, Field, GridState};
