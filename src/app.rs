use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::{debug, error, info, info_span, warn, Instrument};
use walkdir::WalkDir;

use crate::common::SERVER_ONLY_FLAG;
use crate::config::Config;
use crate::metadata;
use crate::types::manifest::Manifest;
use crate::types::names::CaseInsensitiveSet;
use crate::types::{ModFolder, ModName, WorkshopId};
use crate::utils::fs::{is_dir_empty, move_dir};
use crate::utils::net::NameLookup;

/// Counters for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Mods moved into the server root
    pub relocated: usize,
    /// Mods left in place because they could not be named or moved
    pub skipped: usize,
    /// Relocated mods classified as server-only
    pub server_only: usize,
    /// `.bikey` files copied into the keys folder
    pub keys_copied: usize,
    /// Whether the drained workshop tree was removed
    pub workshop_removed: bool,
}

enum Outcome {
    Skipped,
    Relocated {
        folder_name: String,
        server_only: bool,
        keys_copied: usize,
    },
}

/// How server-only status is decided for this run.
enum Classifier<'a> {
    /// The manifest lists ids explicitly.
    Listed(&'a Manifest),
    /// No lists; destinations that carried a sentinel before the run keep it.
    Sentinels(CaseInsensitiveSet),
}

impl Classifier<'_> {
    fn is_server_only(&self, id: &WorkshopId, folder_name: &str) -> bool {
        match self {
            Classifier::Listed(manifest) => {
                if !manifest.is_listed(id) {
                    warn!("{id} is not listed in the manifest, treating it as client+server");
                }
                manifest.is_server_only(id)
            }
            Classifier::Sentinels(flagged) => flagged.contains(folder_name),
        }
    }
}

/// Move every downloaded workshop mod into the server root, copy their keys
/// and rewrite the manifest.
///
/// Only a missing server root (or a manifest that cannot be written) is an
/// error; problems with individual mods are logged and skipped.
pub async fn sync_mods<L: NameLookup>(config: &Config, lookup: &L) -> Result<Summary> {
    if !config.server_root.is_dir() {
        return Err(eyre!(
            "Server root {} does not exist",
            config.server_root.display()
        ));
    }

    let manifest = Manifest::load(&config.manifest_path).await;

    if !config.content_dir.is_dir() {
        info!(
            "no workshop content at {}, nothing to do",
            config.content_dir.display()
        );
        return Ok(Summary::default());
    }

    let sources = list_mod_folders(&config.content_dir)?;
    if sources.is_empty() {
        info!("no workshop mods downloaded, nothing to do");
        return Ok(Summary::default());
    }
    info!("found {} workshop mod(s)", sources.len());

    // must run before anything is moved, relocation replaces the old folders
    let classifier = if manifest.has_lists() {
        Classifier::Listed(&manifest)
    } else {
        let flagged = scan_server_only(&config.server_root)?;
        debug!("{} existing mod(s) flagged server-only", flagged.len());
        Classifier::Sentinels(flagged)
    };

    let mut summary = Summary::default();
    let mut names: HashMap<WorkshopId, String> = HashMap::new();

    for source in &sources {
        let outcome = process_mod(config, lookup, &classifier, source)
            .instrument(info_span!("mod", id = %source.id))
            .await;

        match outcome {
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Relocated {
                folder_name,
                server_only,
                keys_copied,
            } => {
                summary.relocated += 1;
                summary.server_only += usize::from(server_only);
                summary.keys_copied += keys_copied;
                names.insert(source.id.clone(), folder_name);
            }
        }
    }

    summary.workshop_removed = match cleanup_workshop(config) {
        Ok(removed) => removed,
        Err(e) => {
            warn!("failed to clean up {}: {e}", config.workshop_root.display());
            false
        }
    };

    manifest.save(&config.manifest_path, &names).await?;

    info!(
        relocated = summary.relocated,
        skipped = summary.skipped,
        server_only = summary.server_only,
        keys = summary.keys_copied,
        "sync finished"
    );

    Ok(summary)
}

async fn process_mod<L: NameLookup>(
    config: &Config,
    lookup: &L,
    classifier: &Classifier<'_>,
    source: &ModFolder,
) -> Outcome {
    let Some(raw_name) = resolve_name(source, lookup).await else {
        error!("could not determine a name for workshop item {}, skipping", source.id);
        return Outcome::Skipped;
    };

    let folder_name = ModName::new(&raw_name).folder_name();
    let dest = match relocate(source, &config.server_root, &folder_name) {
        Ok(dest) => dest,
        Err(e) => {
            error!("{e:#}");
            return Outcome::Skipped;
        }
    };
    info!("installed {folder_name}");

    let server_only = classifier.is_server_only(&source.id, &folder_name);
    if let Err(e) = sync_sentinel(&dest, server_only) {
        error!("failed to update {SERVER_ONLY_FLAG} in {folder_name}: {e}");
    }

    let keys_copied = if server_only {
        info!("{folder_name} is server-only, not copying keys");
        0
    } else {
        distribute_keys(&dest, &config.keys_dir).unwrap_or_else(|e| {
            error!("failed to copy keys of {folder_name}: {e:#}");
            0
        })
    };

    Outcome::Relocated {
        folder_name,
        server_only,
        keys_copied,
    }
}

/// Workshop folders, sorted by id.
fn list_mod_folders(content_dir: &Path) -> Result<Vec<ModFolder>> {
    let mut folders = std::fs::read_dir(content_dir)
        .wrap_err(format!("Failed to read {}", content_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| {
            ModFolder::new(
                WorkshopId::new(entry.file_name().to_string_lossy()),
                entry.path(),
            )
        })
        .collect::<Vec<_>>();

    folders.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(folders)
}

/// Names of `@` folders in the server root that carry a sentinel.
fn scan_server_only(server_root: &Path) -> Result<CaseInsensitiveSet> {
    let flagged = std::fs::read_dir(server_root)
        .wrap_err(format!("Failed to read {}", server_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join(SERVER_ONLY_FLAG).is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('@'))
        .collect();

    Ok(flagged)
}

async fn resolve_name<L: NameLookup>(source: &ModFolder, lookup: &L) -> Option<String> {
    if let Some(name) = metadata::read_local_name(&source.path) {
        return Some(name);
    }

    match lookup.lookup(&source.id).await {
        Ok(name) => {
            debug!("workshop page names {} {name:?}", source.id);
            Some(name)
        }
        Err(e) => {
            debug!("workshop lookup for {} failed: {e}", source.id);
            None
        }
    }
}

/// Replace `<server root>/<folder_name>` with the source folder.
fn relocate(source: &ModFolder, server_root: &Path, folder_name: &str) -> Result<PathBuf> {
    let dest = server_root.join(folder_name);

    if dest.exists() {
        debug!("replacing existing {folder_name}");
        std::fs::remove_dir_all(&dest)
            .wrap_err(format!("Failed to remove old {}", dest.display()))?;
    }

    move_dir(&source.path, &dest).wrap_err(format!(
        "Failed to move {} to {}",
        source.path.display(),
        dest.display()
    ))?;

    Ok(dest)
}

/// Make the sentinel in `mod_dir` agree with `server_only`.
fn sync_sentinel(mod_dir: &Path, server_only: bool) -> std::io::Result<()> {
    let flag = mod_dir.join(SERVER_ONLY_FLAG);

    match (server_only, flag.exists()) {
        (true, false) => {
            std::fs::File::create(&flag)?;
            debug!("created {}", flag.display());
        }
        (false, true) => {
            std::fs::remove_file(&flag)?;
            debug!("removed {}", flag.display());
        }
        _ => {}
    }

    Ok(())
}

fn is_key_dir(name: &str) -> bool {
    name.eq_ignore_ascii_case("key") || name.eq_ignore_ascii_case("keys")
}

fn is_bikey(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bikey"))
}

/// Copy every `.bikey` below a `key`/`keys` directory of `mod_dir` into
/// `keys_dir`, flattened. Returns the number of distinct key files written.
fn distribute_keys(mod_dir: &Path, keys_dir: &Path) -> Result<usize> {
    let key_dirs: Vec<PathBuf> = WalkDir::new(mod_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| is_key_dir(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();

    if key_dirs.is_empty() {
        info!("no key directory in {}", mod_dir.display());
        return Ok(0);
    }

    // nested key dirs would list the same file twice
    let bikeys: BTreeSet<PathBuf> = key_dirs
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|entry| entry.ok()))
        .filter(|entry| entry.file_type().is_file() && is_bikey(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    if bikeys.is_empty() {
        debug!("no .bikey files in {}", mod_dir.display());
        return Ok(0);
    }

    std::fs::create_dir_all(keys_dir)
        .wrap_err(format!("Failed to create {}", keys_dir.display()))?;

    // flattened, so equal file names from different key dirs land on one file
    let mut copied = BTreeSet::new();
    for key in &bikeys {
        let Some(file_name) = key.file_name() else {
            continue;
        };
        std::fs::copy(key, keys_dir.join(file_name))
            .wrap_err(format!("Failed to copy {}", key.display()))?;
        debug!("copied {}", file_name.to_string_lossy());
        copied.insert(file_name.to_os_string());
    }

    Ok(copied.len())
}

/// Remove the workshop tree once its content directory is drained.
fn cleanup_workshop(config: &Config) -> std::io::Result<bool> {
    if !is_dir_empty(&config.content_dir)? {
        debug!("unprocessed mods remain, keeping the workshop folder");
        return Ok(false);
    }

    std::fs::remove_dir_all(&config.workshop_root)?;
    info!("removed {}", config.workshop_root.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::utils::net::LookupError;

    /// Serves names from a fixed table instead of the workshop.
    struct Stub(HashMap<&'static str, &'static str>);

    impl Stub {
        fn empty() -> Self {
            Self(HashMap::new())
        }
    }

    impl NameLookup for Stub {
        async fn lookup(&self, id: &WorkshopId) -> Result<String, LookupError> {
            self.0
                .get(id.as_str())
                .map(|name| name.to_string())
                .ok_or(LookupError::NoTitle)
        }
    }

    fn setup() -> (tempfile::TempDir, Config) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::from_base_dir(tmp.path());
        fs::create_dir_all(&config.server_root).unwrap();
        (tmp, config)
    }

    /// Create a downloaded mod with an optional `meta.cpp` name and key files.
    fn add_mod(config: &Config, id: &str, name: Option<&str>, keys: &[&str]) -> PathBuf {
        let dir = config.content_dir.join(id);
        fs::create_dir_all(dir.join("addons")).unwrap();
        fs::write(dir.join("addons/data.pbo"), "pbo").unwrap();
        if let Some(name) = name {
            fs::write(
                dir.join("meta.cpp"),
                format!("protocol = 1;\npublishedid = {id};\nname = \"{name}\";\n"),
            )
            .unwrap();
        }
        for key in keys {
            let path = dir.join(key);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, key.as_bytes()).unwrap();
        }
        dir
    }

    fn write_manifest(config: &Config, json: &str) {
        fs::write(&config.manifest_path, json).unwrap();
    }

    fn read_manifest(config: &Config) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(&config.manifest_path).unwrap()).unwrap()
    }

    fn key_files(config: &Config) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(&config.keys_dir)
            .map(|dir| {
                dir.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    #[tokio::test]
    async fn missing_server_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::from_base_dir(tmp.path());

        let err = sync_mods(&config, &Stub::empty()).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn nothing_to_do() {
        let (_tmp, config) = setup();
        assert_eq!(sync_mods(&config, &Stub::empty()).await.unwrap(), Summary::default());

        // content dir present but empty
        fs::create_dir_all(&config.content_dir).unwrap();
        assert_eq!(sync_mods(&config, &Stub::empty()).await.unwrap(), Summary::default());

        assert!(!config.manifest_path.exists());
        assert!(config.content_dir.exists());
    }

    #[tokio::test]
    async fn listed_server_only_mod() {
        let (_tmp, config) = setup();
        write_manifest(&config, r#"{"ServerOnlyIds": ["123"]}"#);
        let source = add_mod(&config, "123", Some("Test Mod"), &["keys/test.bikey"]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.relocated, 1);
        assert_eq!(summary.server_only, 1);
        assert_eq!(summary.keys_copied, 0);

        let dest = config.server_root.join("@Test Mod");
        assert!(dest.join("addons/data.pbo").is_file());
        assert!(dest.join(SERVER_ONLY_FLAG).is_file());
        assert!(!source.exists());
        assert!(key_files(&config).is_empty());

        let manifest = read_manifest(&config);
        assert_eq!(manifest["ServerOnlyIds"], serde_json::json!(["123"]));
        assert_eq!(manifest["ServerOnlyNames"], serde_json::json!(["@Test Mod"]));
        assert_eq!(manifest["ServerOnlyJoined"], "@Test Mod");
        assert_eq!(manifest["ClientServerJoined"], "");
    }

    #[tokio::test]
    async fn client_mod_keys_are_copied() {
        let (_tmp, config) = setup();
        write_manifest(
            &config,
            r#"{"ClientServerIds": ["1559212036", "1564026768"], "ServerOnlyIds": []}"#,
        );
        // shipped with a stale sentinel, which must be dropped
        let source = add_mod(
            &config,
            "1559212036",
            Some("Community Framework"),
            &["Keys/Jacob_Mango_V3.bikey", "Keys/readme.txt", SERVER_ONLY_FLAG],
        );
        add_mod(&config, "1564026768", Some("Dabs Framework"), &["addons/Key/dabs.BIKEY"]);
        assert!(source.join(SERVER_ONLY_FLAG).exists());

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.relocated, 2);
        assert_eq!(summary.server_only, 0);
        assert_eq!(summary.keys_copied, 2);

        assert!(!config
            .server_root
            .join("@Community Framework")
            .join(SERVER_ONLY_FLAG)
            .exists());
        assert_eq!(key_files(&config), vec!["Jacob_Mango_V3.bikey", "dabs.BIKEY"]);

        let manifest = read_manifest(&config);
        assert_eq!(
            manifest["ClientServerJoined"],
            "@Community Framework;@Dabs Framework"
        );
    }

    #[tokio::test]
    async fn unresolvable_mod_is_skipped() {
        let (_tmp, config) = setup();
        let source = add_mod(&config, "999", None, &[]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.relocated, 0);
        assert!(!summary.workshop_removed);

        assert!(source.join("addons/data.pbo").is_file());
        assert!(config.workshop_root.exists());

        let manifest = read_manifest(&config);
        assert_eq!(manifest["ClientServerIds"], serde_json::json!([]));
        assert_eq!(manifest["ClientServerNames"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn workshop_name_fallback_and_sanitizing() {
        let (_tmp, config) = setup();
        write_manifest(&config, r#"{"ClientServerIds": ["42", "43"]}"#);
        add_mod(&config, "42", None, &[]);
        add_mod(&config, "43", None, &[]);

        let lookup = Stub(HashMap::from([("42", "Banking: Plus?")]));
        let summary = sync_mods(&config, &lookup).await.unwrap();
        assert_eq!(summary.relocated, 1);
        assert_eq!(summary.skipped, 1);

        assert!(config.server_root.join("@Banking- Plus-").is_dir());
        assert!(config.content_dir.join("43").is_dir());

        // 43 stays listed but has no name this run
        let manifest = read_manifest(&config);
        assert_eq!(manifest["ClientServerIds"], serde_json::json!(["42", "43"]));
        assert_eq!(manifest["ClientServerNames"], serde_json::json!(["@Banking- Plus-"]));
    }

    #[tokio::test]
    async fn sentinels_persist_without_lists() {
        let (_tmp, config) = setup();
        let previous = config.server_root.join("@Admin Tools");
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join(SERVER_ONLY_FLAG), "").unwrap();
        fs::create_dir_all(config.server_root.join("@Old Client")).unwrap();

        add_mod(&config, "1", Some("Admin Tools"), &["keys/admin.bikey"]);
        add_mod(&config, "2", Some("Old Client"), &["keys/client.bikey"]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.relocated, 2);
        assert_eq!(summary.server_only, 1);

        assert!(previous.join(SERVER_ONLY_FLAG).is_file());
        assert!(previous.join("keys/admin.bikey").is_file());
        assert!(!config
            .server_root
            .join("@Old Client")
            .join(SERVER_ONLY_FLAG)
            .exists());
        assert_eq!(key_files(&config), vec!["client.bikey"]);
    }

    #[tokio::test]
    async fn sentinel_scan_ignores_case() {
        let (_tmp, config) = setup();
        let previous = config.server_root.join("@admin tools");
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join(SERVER_ONLY_FLAG), "").unwrap();
        add_mod(&config, "1", Some("Admin Tools"), &["keys/admin.bikey"]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.server_only, 1);
        assert!(config
            .server_root
            .join("@Admin Tools")
            .join(SERVER_ONLY_FLAG)
            .is_file());
        assert!(key_files(&config).is_empty());
    }

    #[tokio::test]
    async fn drained_workshop_is_removed() {
        let (_tmp, config) = setup();
        add_mod(&config, "1", Some("One"), &[]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert!(summary.workshop_removed);
        assert!(!config.workshop_root.exists());
        assert!(config.server_root.join("steamapps").exists());
        assert!(config.server_root.join("@One").is_dir());
    }

    #[tokio::test]
    async fn repeated_runs_are_stable() {
        let (_tmp, config) = setup();
        write_manifest(&config, r#"{"ClientServerIds": ["7"]}"#);

        for _ in 0..2 {
            add_mod(&config, "7", Some("Seven"), &["keys/seven.bikey"]);
            let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
            assert_eq!(summary.relocated, 1);
        }

        assert_eq!(key_files(&config), vec!["seven.bikey"]);
        let manifest = read_manifest(&config);
        assert_eq!(manifest["ClientServerIds"], serde_json::json!(["7"]));
        assert_eq!(manifest["ClientServerNames"], serde_json::json!(["@Seven"]));
    }

    #[test]
    fn sentinel_toggles() {
        let tmp = tempfile::tempdir().unwrap();
        let flag = tmp.path().join(SERVER_ONLY_FLAG);

        sync_sentinel(tmp.path(), true).unwrap();
        sync_sentinel(tmp.path(), true).unwrap();
        assert!(flag.is_file());
        assert_eq!(fs::metadata(&flag).unwrap().len(), 0);

        sync_sentinel(tmp.path(), false).unwrap();
        sync_sentinel(tmp.path(), false).unwrap();
        assert!(!flag.exists());
    }

    #[test]
    fn key_dir_names() {
        assert!(is_key_dir("keys"));
        assert!(is_key_dir("Key"));
        assert!(is_key_dir("KEYS"));
        assert!(!is_key_dir("keystore"));
        assert!(is_bikey(Path::new("a/b.BiKey")));
        assert!(!is_bikey(Path::new("a/b.bisign")));
    }

    #[tokio::test]
    async fn existing_destination_is_replaced() {
        let (_tmp, config) = setup();
        write_manifest(&config, r#"{"ClientServerIds": ["5"]}"#);

        let old = config.server_root.join("@Old");
        fs::create_dir_all(old.join("stale")).unwrap();
        fs::write(old.join("stale/x"), "leftover").unwrap();
        fs::write(old.join(SERVER_ONLY_FLAG), "").unwrap();
        fs::create_dir_all(&config.keys_dir).unwrap();
        fs::write(config.keys_dir.join("k.bikey"), "old key").unwrap();

        add_mod(&config, "5", Some("Old"), &["keys/k.bikey"]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.relocated, 1);
        assert_eq!(summary.keys_copied, 1);

        assert!(!old.join("stale").exists());
        assert!(!old.join(SERVER_ONLY_FLAG).exists());
        assert!(old.join("addons/data.pbo").is_file());
        assert_eq!(
            fs::read_to_string(config.keys_dir.join("k.bikey")).unwrap(),
            "keys/k.bikey"
        );
        assert_eq!(key_files(&config), vec!["k.bikey"]);
    }

    #[tokio::test]
    async fn unlisted_id_is_client_server() {
        let (_tmp, config) = setup();
        write_manifest(&config, r#"{"ClientServerIds": ["1"]}"#);
        add_mod(&config, "1", Some("One"), &[]);
        add_mod(&config, "9", Some("Unlisted"), &["keys/u.bikey"]);

        let summary = sync_mods(&config, &Stub::empty()).await.unwrap();
        assert_eq!(summary.relocated, 2);
        assert_eq!(summary.server_only, 0);

        let unlisted = config.server_root.join("@Unlisted");
        assert!(unlisted.is_dir());
        assert!(!unlisted.join(SERVER_ONLY_FLAG).exists());
        assert_eq!(key_files(&config), vec!["u.bikey"]);

        let manifest = read_manifest(&config);
        assert_eq!(manifest["ClientServerIds"], serde_json::json!(["1"]));
        assert_eq!(manifest["ClientServerNames"], serde_json::json!(["@One"]));
        assert_eq!(manifest["ServerOnlyNames"], serde_json::json!([]));
        assert_eq!(manifest["ClientServerJoined"], "@One");
    }

    #[test]
    fn same_key_name_counts_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mod_dir = tmp.path().join("@Dup");
        let keys_dir = tmp.path().join("keys");
        for dir in ["keys", "addons/Key"] {
            fs::create_dir_all(mod_dir.join(dir)).unwrap();
            fs::write(mod_dir.join(dir).join("a.bikey"), dir).unwrap();
        }

        assert_eq!(distribute_keys(&mod_dir, &keys_dir).unwrap(), 1);
        assert_eq!(fs::read_dir(&keys_dir).unwrap().count(), 1);
        assert!(keys_dir.join("a.bikey").is_file());
    }
}
