//! High-level operations composed from the engine optimizers.

pub mod generate;
pub mod statistics;
