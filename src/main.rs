//! Music Bridge - a local music catalog federated with a remote streaming
//! catalog.
//!
//! Catalog queries (search, browse, favorites) transparently merge locally
//! stored items with results from the remote service; remote entities are
//! materialized into the local catalog on first sight.

pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod federation;
pub mod model;
pub mod spotify;
pub mod store;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("music_bridge=info".parse().unwrap()))
        .init();

    cli::run_command(&args)?;
    Ok(())
}
