//! Display names from the config files shipped inside a mod.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

/// Checked in order; the first file with a usable name wins.
pub const METADATA_FILES: [&str; 2] = ["meta.cpp", "mod.cpp"];

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r#"(?m)^[ \t]*name[ \t]*=[ \t]*"([^"]*)""#).unwrap();
}

/// Extract the value of the first `name = "..."` line.
///
/// Returns `None` if there is no such line or its value is blank.
pub fn parse_name(contents: &str) -> Option<String> {
    let contents = contents.trim_start_matches('\u{feff}');
    let caps = NAME_RE.captures(contents)?;
    let name = caps[1].trim();

    (!name.is_empty()).then(|| name.to_string())
}

/// Look for a display name in the mod's metadata files.
pub fn read_local_name(mod_dir: &Path) -> Option<String> {
    METADATA_FILES.iter().find_map(|file| {
        let path = mod_dir.join(file);
        // mods are not always saved as UTF-8
        let bytes = std::fs::read(&path).ok()?;
        let name = parse_name(&String::from_utf8_lossy(&bytes));

        match &name {
            Some(name) => debug!("found name {name:?} in {file}"),
            None => trace!("no name in {}", path.display()),
        }
        name
    })
}
