//! Resolution of the server layout.
//!
//! Defaults are derived from the base directory (the executable's directory
//! unless overridden), then patched by an optional `modsync.toml` next to it,
//! then by command line flags.

use std::env::current_exe;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use tokio::fs;
use tracing::debug;

use crate::cli::Cli;
use crate::common::{
    CONFIG_FILE, DEFAULT_SERVER_DIR, DEFAULT_WORKSHOP_APP_ID, KEYS_DIR, MANIFEST_FILE,
};

/// Contents of `modsync.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    /// Server root, absolute or relative to the base directory
    pub server_dir: Option<PathBuf>,
    /// App id the workshop items were downloaded for
    pub workshop_app_id: Option<u32>,
    /// Disable workshop name lookups
    pub offline: Option<bool>,
}

impl FileSettings {
    /// Read settings from `path`. A missing file is not an error.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        let data = match fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).wrap_err(format!("Failed to read {}", path.display()));
            }
        };

        let settings =
            toml::from_str(&data).wrap_err(format!("Failed to parse {}", path.display()))?;
        Ok(Some(settings))
    }
}

/// Immutable paths and switches for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// DayZ dedicated server directory; must exist
    pub server_root: PathBuf,
    /// `steamapps/workshop`, removed once drained
    pub workshop_root: PathBuf,
    /// `content/<app id>`, holding one folder per workshop id
    pub content_dir: PathBuf,
    /// Flattened destination for `.bikey` files
    pub keys_dir: PathBuf,
    /// `Mods.json`
    pub manifest_path: PathBuf,
    /// App id the workshop items were downloaded for
    pub workshop_app_id: u32,
    /// Skip the workshop page lookup entirely
    pub offline: bool,
}

impl Config {
    /// Derive the full layout from a server root.
    pub fn new(server_root: PathBuf, workshop_app_id: u32, offline: bool) -> Self {
        let workshop_root = server_root.join("steamapps").join("workshop");
        let content_dir = workshop_root
            .join("content")
            .join(workshop_app_id.to_string());

        Self {
            keys_dir: server_root.join(KEYS_DIR),
            manifest_path: server_root.join(MANIFEST_FILE),
            workshop_root,
            content_dir,
            server_root,
            workshop_app_id,
            offline,
        }
    }

    /// Default layout below `base_dir`.
    pub fn from_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self::new(
            base_dir.as_ref().join(DEFAULT_SERVER_DIR),
            DEFAULT_WORKSHOP_APP_ID,
            false,
        )
    }

    /// Merge defaults, the settings file and command line flags.
    pub async fn resolve(cli: &Cli) -> Result<Self> {
        let base_dir = match &cli.base_dir {
            Some(dir) => dir.clone(),
            None => current_exe()
                .wrap_err("Failed to get current executable path")?
                .parent()
                .ok_or_else(|| eyre!("Executable has no parent directory"))?
                .to_path_buf(),
        };
        debug!(base_dir = %base_dir.display(), "resolving layout");

        let settings = FileSettings::from_file(base_dir.join(CONFIG_FILE))
            .await?
            .unwrap_or_default();

        Ok(Self::merge(&base_dir, settings, cli))
    }

    fn merge(base_dir: &Path, settings: FileSettings, cli: &Cli) -> Self {
        let server_dir = cli
            .server_dir
            .clone()
            .or(settings.server_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVER_DIR));

        Self::new(
            // `join` keeps absolute paths as they are
            base_dir.join(server_dir),
            settings.workshop_app_id.unwrap_or(DEFAULT_WORKSHOP_APP_ID),
            cli.offline || settings.offline.unwrap_or(false),
        )
    }
}
