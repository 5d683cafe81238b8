//! mod `api` is the entry point of flowguard for applications.
//!
//! Initialize flowguard before loading rules, in one of three ways:
//!
//!  1. `init_default()`, using the environment and the defaults.
//!  2. `init_with_config(config_entity: config::ConfigEntity)`, using a hand-built entity.
//!  3. `init_with_config_file(config_path)`, using a YAML file.
//!
//! Then guard a resource with [`EntryBuilder`], and exit the returned entry when the call completes.

mod base;
mod init;
mod slot_chain;
mod supplier;

pub use base::*;
pub use init::*;
pub use slot_chain::*;
pub use supplier::*;
