//! Shared configuration, observability and retry logic for pqgen

pub mod config;
pub mod observability;
pub mod retry;

pub use config::*;
pub use observability::*;
pub use retry::*;
