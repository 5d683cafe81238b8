//! Global configuration, resolved from environment variables,
//! a YAML file and the built-in defaults, in this order of priority.

mod base;
mod constant;
mod entity;

pub use base::*;
pub use constant::*;
pub use entity::*;
