//! Run configuration: a TOML file merged with command-line overrides.

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::{build_memory_config, build_run_config};
