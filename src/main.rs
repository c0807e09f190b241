//! Sync Steam Workshop downloads into a DayZ dedicated server.

#![deny(rust_2018_idioms)]
#![warn(missing_docs, clippy::all)]

use clap::Parser;
use color_eyre::eyre::Result;
use modsync::app::sync_mods;
use modsync::cli::Cli;
use modsync::common::init_tracing;
use modsync::config::Config;
use modsync::utils::net::{Offline, SteamWorkshop};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    color_eyre::install()?;
    init_tracing(cli.verbose)?;

    if let Some(param) = &cli.param {
        debug!("ignoring parameter {param:?}");
    }

    let config = Config::resolve(&cli).await?;
    debug!(?config);

    if config.offline {
        sync_mods(&config, &Offline).await?;
        return Ok(());
    }

    match SteamWorkshop::new() {
        Ok(workshop) => sync_mods(&config, &workshop).await?,
        Err(e) => {
            warn!("workshop lookups disabled, could not set up HTTP client: {e}");
            sync_mods(&config, &Offline).await?
        }
    };

    Ok(())
}
