//! Constants and process-wide setup shared by the binary and the library.

use std::io::IsTerminal;

use color_eyre::eyre::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// DayZ dedicated server directory, relative to the base directory.
pub const DEFAULT_SERVER_DIR: &str = "dayz/223350";
/// Steam app id of the DayZ client, under which workshop items are downloaded.
pub const DEFAULT_WORKSHOP_APP_ID: u32 = 221100;
/// Optional settings file looked up in the base directory.
pub const CONFIG_FILE: &str = "modsync.toml";

/// Manifest file name, inside the server root.
pub const MANIFEST_FILE: &str = "Mods.json";
/// Marker file that flags a relocated mod as server-only.
pub const SERVER_ONLY_FLAG: &str = "server_only.flag";
/// Shared key folder name, inside the server root.
pub const KEYS_DIR: &str = "keys";

/// Sent as the `User-Agent` header on every workshop request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the verbosity flag when it is set.
pub fn init_tracing(verbosity: u8) -> Result<()> {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false),
        )
        .with(ErrorLayer::default())
        .try_init()?;

    Ok(())
}
