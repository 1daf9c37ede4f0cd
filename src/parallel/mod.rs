//! Parallel execution support for the parser passes
//!
//! Provides bounded fan-out over independent files or types.

mod executor;

pub use executor::{fan_out, pool_size, try_fan_out};
