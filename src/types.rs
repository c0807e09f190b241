//! Domain types shared across the pipeline.

/// Reading and writing `Mods.json`.
pub mod manifest;
/// Case-insensitive name sets.
pub mod names;

use std::path::PathBuf;

use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

/// Characters that are not allowed in Windows file names.
const ILLEGAL_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Numeric Steam Workshop identifier, kept as text.
///
/// Deserializes from either a JSON string or a JSON number, and always
/// serializes back as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct WorkshopId(String);

impl WorkshopId {
    /// Wrap an id, trimming surrounding whitespace.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// Borrow the textual id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<WorkshopId> for String {
    fn from(id: WorkshopId) -> Self {
        id.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for WorkshopId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => WorkshopId::new(s),
            RawId::Number(n) => WorkshopId::new(n.to_string()),
        }
    }
}

/// A mod folder as downloaded by Steam, named by its workshop id.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct ModFolder {
    /// Workshop id (the folder name)
    pub id: WorkshopId,
    /// Location under the workshop content directory
    pub path: PathBuf,
}

/// Display name of a mod, with illegal file name characters replaced by `-`.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub struct ModName(String);

impl ModName {
    /// Sanitize a raw display name.
    pub fn new(raw: &str) -> Self {
        Self(
            raw.chars()
                .map(|c| if ILLEGAL_CHARS.contains(&c) { '-' } else { c })
                .collect(),
        )
    }

    /// Destination folder name in the server root, `@<name>`.
    pub fn folder_name(&self) -> String {
        format!("@{}", self.0)
    }
}
