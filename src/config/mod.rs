//! Spawn options and bridge configuration.

mod loader;
mod options;

pub use loader::*;
pub use options::*;
