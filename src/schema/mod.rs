//! Schema registry: per-entity column metadata, registered once at startup.

mod registry;
mod types;

pub use registry::*;
pub use types::*;
