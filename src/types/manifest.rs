use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use super::WorkshopId;

/// The ID lists of `Mods.json`.
///
/// Name lists and joined strings in the file are derived output and are
/// ignored when reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    /// Mods loaded by both client and server
    #[serde(default, deserialize_with = "nullable_list")]
    pub client_server_ids: Vec<WorkshopId>,
    /// Mods loaded by the server only
    #[serde(default, deserialize_with = "nullable_list")]
    pub server_only_ids: Vec<WorkshopId>,
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<WorkshopId>, D::Error>
where D: Deserializer<'de> {
    Ok(Option::<Vec<WorkshopId>>::deserialize(deserializer)?.unwrap_or_default())
}

/// What gets written back to `Mods.json`.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct ManifestOutput<'a> {
    pub client_server_ids: &'a [WorkshopId],
    pub server_only_ids: &'a [WorkshopId],
    pub client_server_names: Vec<&'a str>,
    pub server_only_names: Vec<&'a str>,
    /// Ready to paste into `-mod=`
    pub client_server_joined: String,
    /// Ready to paste into `-serverMod=`
    pub server_only_joined: String,
}

impl Manifest {
    /// Load the manifest, degrading to empty lists if it is missing, empty or
    /// malformed.
    pub async fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let data = match fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no manifest at {}, continuing without id lists", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("failed to read manifest {}: {e}", path.display());
                return Self::default();
            }
        };

        Self::parse(&data).unwrap_or_else(|e| {
            warn!("ignoring malformed manifest {}: {e}", path.display());
            Self::default()
        })
    }

    /// Parse manifest text. Blank input yields empty lists.
    pub fn parse(data: &str) -> serde_json::Result<Self> {
        // tolerate a UTF-8 BOM, which some editors on Windows add
        let data = data.trim_start_matches('\u{feff}');
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(data)
    }

    /// Whether either list has entries. Without lists, server-only status is
    /// taken from sentinel files instead.
    pub fn has_lists(&self) -> bool {
        !self.client_server_ids.is_empty() || !self.server_only_ids.is_empty()
    }

    /// Whether `id` is listed as server-only.
    pub fn is_server_only(&self, id: &WorkshopId) -> bool {
        self.server_only_ids.contains(id)
    }

    /// Whether `id` appears in either list.
    pub fn is_listed(&self, id: &WorkshopId) -> bool {
        self.is_server_only(id) || self.client_server_ids.contains(id)
    }

    /// Build the output document. IDs without an entry in `names` (unresolved
    /// this run) are left out of the name lists.
    pub fn render<'a>(&'a self, names: &'a HashMap<WorkshopId, String>) -> ManifestOutput<'a> {
        let lookup = move |ids: &'a [WorkshopId]| -> Vec<&'a str> {
            ids.iter()
                .filter_map(|id| names.get(id).map(String::as_str))
                .collect()
        };

        let client_server_names = lookup(&self.client_server_ids);
        let server_only_names = lookup(&self.server_only_ids);

        ManifestOutput {
            client_server_ids: &self.client_server_ids,
            server_only_ids: &self.server_only_ids,
            client_server_joined: client_server_names.iter().join(";"),
            server_only_joined: server_only_names.iter().join(";"),
            client_server_names,
            server_only_names,
        }
    }

    /// Overwrite the manifest at `path` with the rendered output.
    pub async fn save<P: AsRef<Path>>(
        &self,
        path: P,
        names: &HashMap<WorkshopId, String>,
    ) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(&self.render(names))?;

        fs::write(path, data)
            .await
            .wrap_err(format!("Failed to write manifest {}", path.display()))?;
        debug!("wrote {}", path.display());

        Ok(())
    }
}
