//! `pqgen`: convenience façade that re-exports `pqgen-core`, `pqgen-shared` and `pqgen-pool`.

#![deny(missing_docs)]

/// Re-export **everything** from pqgen-core at the crate root, so users can `use pqgen::*;`.
#[doc(inline)]
pub use pqgen_core::*;

/// Batch generation, execution and statistics.
#[doc(inline)]
pub use pqgen_pool::{
    save_queries, ExecutionStatistics, GenerateOptions, Generator, QueryFilter, QueryPool,
    QueryStatistics,
};

/// Configuration and logging bootstrap.
#[doc(inline)]
pub use pqgen_shared::{GenerationConfig, ObservabilitySystem, PqgenConfig};

/// Also expose the member crates as nested modules for `pqgen::core::...` paths.
pub use pqgen_core as core;
/// See [`pqgen_pool`].
pub use pqgen_pool as pool;
/// See [`pqgen_shared`].
pub use pqgen_shared as shared;
