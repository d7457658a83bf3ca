//! Command-line interface for music-bridge.
//!
//! This module provides CLI commands for querying the federated catalog and
//! managing users and their remote-service credentials.

mod commands;

pub use commands::{Cli, Commands, run_command};
