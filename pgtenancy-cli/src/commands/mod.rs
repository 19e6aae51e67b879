//! CLI command implementations.

pub mod config;
pub mod install;
pub mod migrate;
pub mod tenant;
