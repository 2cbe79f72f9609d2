//! Cosmetic wave/displacement generation.

pub mod generator;
pub mod kinds;
pub mod scale;
pub mod source;

pub use generator::{WaveGenerator, WaveStats};
pub use scale::WaveScaleConfig;
pub use source::{WaveKind, WaveSource};
