//! Configuration constants for the engine.

pub mod constants;

pub use constants::*;
