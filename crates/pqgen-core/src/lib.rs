//! Core types for pqgen: schema model, query operations and the recursive
//! query builder.

pub mod builder;
pub mod consistency;
pub mod error;
pub mod executor;
pub mod frame;
pub mod operation;
pub mod query;
pub mod schema;
pub mod structure;

pub use builder::*;
pub use consistency::*;
pub use error::*;
pub use executor::*;
pub use frame::*;
pub use operation::*;
pub use query::*;
pub use schema::*;
pub use structure::*;
