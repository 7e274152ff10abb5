//! Parallel query generation, execution, filtering and statistics for pqgen

pub mod generator;
pub mod pool;
pub mod sink;
pub mod stats;

pub use generator::*;
pub use pool::*;
pub use sink::*;
pub use stats::*;
