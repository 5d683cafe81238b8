#![cfg_attr(docsrs, feature(doc_cfg))]

//! # flowguard
//!
//! flowguard is an in-process resource protection engine. For every guarded operation,
//! a "resource", it decides whether the call proceeds, waits in a queue, or is rejected,
//! based on live statistics and rules: **flow control**, **traffic shaping**,
//! **param flow control**, **circuit breaking**, **system adaptive protection**
//! and **origin authority**.
//!
//! flowguard adopts the Chain-of-Responsibility pattern. The rules are checked by the slots
//! of a `base::SlotChain` on every entry, and the statistics are completed on exit.
//! Generally, using flowguard takes these steps:
//! 1. Initialize the configuration.
//! 2. Load the rules of the resources.
//! 3. Build an entry at the start of the guarded code, exit it at the end.
//!
//! ## Optional features
//!
//! - logger_env: Use `env_logger` to initialize logging.
//! - logger_log4rs: Use `log4rs` to initialize logging, with the file named in the config.
//!
//! ## Initialization
//!
//! - `init_default()`: configuration from the environment, defaults for the rest.
//! - `init_with_config_file(config_path: &mut String)`: configuration from a YAML file.
//! - `init_with_config(config_entity: ConfigEntity)`: a hand-built `ConfigEntity`.
//!
//! ```rust
//! use flowguard::{init_default, logging};
//! init_default().unwrap_or_else(|err| logging::error!("{:?}", err));
//! ```
//!
//! ## Guarding a resource
//!
//! `EntryBuilder::build()` returns an error carrying a `base::BlockError` when the call is blocked.
//!
//! ```rust
//! use flowguard::{base, EntryBuilder};
//! let entry_builder = EntryBuilder::new("some_resource".into())
//!     .with_traffic_type(base::TrafficType::Inbound);
//! match entry_builder.build() {
//!     Ok(entry) => {
//!         // The request is allowed to be processed.
//!         entry.exit().unwrap();
//!     }
//!     Err(err) => {
//!         // The request is blocked, there is no entry to exit.
//!         let _reason = base::BlockError::from_error(&err);
//!     }
//! }
//! ```
//!
//! ## Loading rules
//!
//! `load_rules()` of a rule kind replaces all the rules of that kind,
//! `load_rules_of_resource()` replaces the ones of a single resource.
//! Both return `false` when the rules equal the loaded ones.
//!
//! ```rust
//! use flowguard::flow;
//! use std::sync::Arc;
//! flow::load_rules(vec![Arc::new(flow::Rule {
//!     resource: "example".into(),
//!     threshold: 10.0,
//!     calculate_strategy: flow::CalculateStrategy::Direct,
//!     control_strategy: flow::ControlStrategy::Reject,
//!     ..Default::default()
//! })]);
//! ```
//!
//! Rules kept in an external source are pulled with `api::RuleSupplier`
//! and `api::refresh_rules_of_resource`.

/// Entry API, initialization and the default slot chains.
pub mod api;
/// Core implementations: the statistic structures over sliding windows,
/// call contexts, the rule managers and slots of every rule kind, and the configuration.
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
// Utility functions for flowguard.
pub mod utils;

// re-export precludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
