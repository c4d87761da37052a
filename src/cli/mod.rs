//! CLI-specific functionality for the `pier` binary
//!
//! This module contains argument parsing, configuration discovery and the
//! subcommand implementations.

pub mod args;
pub mod commands;
pub mod config;

pub use args::{Args, BuildConfig, ConnectionConfig, ExecutionMode, RunConfig};
pub use config::ConfigDiscovery;
