//! Step-through reconstruction of recorded games for debugging.

pub mod engine;

pub use engine::{ReplayEngine, ReplayHistory};
