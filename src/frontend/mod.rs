//! Frontend components
//!
//! This module contains the CLI runner and the configuration layer that
//! form the user-facing interface of crossbind.

pub mod cli;
pub mod config;

pub use cli::main as cli_main;
pub use config::BridgeConfig;
