//! Sync Steam Workshop downloads into a DayZ dedicated server.
//!
//! Downloaded mods are moved from `steamapps/workshop/content/<app id>/<id>`
//! into `@<Name>` folders in the server root, their `.bikey` files are copied
//! into the shared `keys` folder, and `Mods.json` is rewritten with the
//! resolved folder names.

#![deny(rust_2018_idioms)]
#![warn(missing_docs, clippy::all)]

/// The sync pipeline.
pub mod app;
pub mod cli;
pub mod common;
pub mod config;
pub mod metadata;
pub mod types;
pub mod utils;
