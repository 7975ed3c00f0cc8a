//! Safe SQL builder: identifiers quoted, values always bound as parameters.

mod builder;
pub use builder::*;
