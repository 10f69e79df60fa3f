//! One-time import of the pre-database flat storage
//!
//! The legacy format is a flat string map (a browser localStorage snapshot
//! saved as a JSON object file): `mdp-list` holds the JSON-encoded pad list and
//! `smde_<name>` holds each pad's text.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::store::PadStore;
use crate::db::StoreError;
use crate::logging::Logger;

pub const LEGACY_LIST_KEY: &str = "mdp-list";
pub const LEGACY_PAD_PREFIX: &str = "smde_";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Failed to access legacy storage: {0}")]
    Io(#[from] io::Error),

    #[error("Legacy storage is not a JSON object of strings: {0}")]
    BadFile(serde_json::Error),

    #[error("Legacy pad list is not a JSON array of names: {0}")]
    BadList(serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Flat string map, optionally backed by a file
#[derive(Debug, Default)]
pub struct LegacyStorage {
    path: Option<PathBuf>,
    items: BTreeMap<String, String>,
}

impl LegacyStorage {
    /// Read the snapshot at `path`; `None` when there is no file
    pub fn load(path: &Path) -> Result<Option<Self>, MigrationError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let items = if text.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&text).map_err(MigrationError::BadFile)?
        };

        Ok(Some(Self {
            path: Some(path.to_path_buf()),
            items,
        }))
    }

    pub fn in_memory(items: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            path: None,
            items: items.into_iter().collect(),
        }
    }

    pub fn get_item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every item and rewrite the backing file as an empty object
    pub fn clear(&mut self) -> Result<(), MigrationError> {
        self.items.clear();
        if let Some(path) = &self.path {
            fs::write(path, "{}")?;
        }
        Ok(())
    }
}

/// Copy legacy pads into the store and clear the legacy storage.
///
/// Returns the migrated list, or `None` when there was nothing to migrate.
/// The list and every pad are written in one transaction; the legacy storage
/// is only cleared after that commits.
pub fn migrate(
    store: &PadStore,
    legacy: &mut LegacyStorage,
    log: &Logger,
) -> Result<Option<Vec<String>>, MigrationError> {
    let Some(raw_list) = legacy.get_item(LEGACY_LIST_KEY) else {
        return Ok(None);
    };

    log.info(format_args!("Found legacy pad storage"));
    log.trace(format_args!("Legacy pad list: {}", raw_list));
    let pads: Vec<String> = serde_json::from_str(raw_list).map_err(MigrationError::BadList)?;

    let keys = store.keys();
    if store.kv().get(&keys.list_key)?.is_some() {
        // An earlier run committed but could not clear the legacy file
        log.warn(format_args!(
            "Pad list already present, not importing legacy pads again"
        ));
        return Ok(None);
    }

    store.kv().tx(|t| {
        t.set(
            &keys.list_key,
            &Value::String(serde_json::to_string(&pads)?),
        )?;
        for name in &pads {
            let old_key = format!("{}{}", LEGACY_PAD_PREFIX, name);
            let new_key = keys.content_key(name);
            log.trace(format_args!("Copying \"{}\" to \"{}\"", old_key, new_key));
            let content = legacy.get_item(&old_key).unwrap_or_default();
            t.set(&new_key, &Value::String(content.to_string()))?;
        }
        Ok(())
    })?;

    log.trace(format_args!("Clearing legacy storage"));
    if let Err(e) = legacy.clear() {
        log.error(format_args!("Failed to clear legacy storage: {}", e));
    }
    log.info(format_args!("Migrated {} legacy pads", pads.len()));
    Ok(Some(pads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PadKeys;
    use crate::db::KvStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> PadStore {
        let kv = Arc::new(KvStore::new(dir.path().join("pads.db"), Logger::quiet("KV")));
        PadStore::new(kv, PadKeys::default(), Logger::quiet("PADS"))
    }

    fn legacy_snapshot() -> Vec<(String, String)> {
        vec![
            (LEGACY_LIST_KEY.to_string(), r#"["home","ideas"]"#.to_string()),
            ("smde_home".to_string(), "# Welcome".to_string()),
            ("smde_ideas".to_string(), "- offline mode".to_string()),
            ("unrelated".to_string(), "x".to_string()),
        ]
    }

    #[test]
    fn test_migrate_copies_pads_and_clears() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let mut legacy = LegacyStorage::in_memory(legacy_snapshot());

        let migrated = migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap();

        assert_eq!(migrated, Some(vec!["home".to_string(), "ideas".to_string()]));
        assert_eq!(store.load_pad_list().unwrap(), vec!["home", "ideas"]);
        assert_eq!(store.get_pad("home").unwrap(), "# Welcome");
        assert_eq!(store.get_pad("ideas").unwrap(), "- offline mode");
        assert!(legacy.is_empty());
    }

    #[test]
    fn test_second_run_is_noop() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let mut legacy = LegacyStorage::in_memory(legacy_snapshot());
        migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap();
        store.save_pad("home", "edited since").unwrap();

        let again = migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap();

        assert_eq!(again, None);
        assert_eq!(store.get_pad("home").unwrap(), "edited since");
    }

    #[test]
    fn test_uncleared_legacy_file_is_not_imported_twice() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let unwritable = dir.path().join("no-such-dir").join("legacy.json");
        let mut legacy = LegacyStorage {
            path: Some(unwritable.clone()),
            items: legacy_snapshot().into_iter().collect(),
        };

        let migrated = migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap();
        assert_eq!(migrated, Some(vec!["home".to_string(), "ideas".to_string()]));
        store.save_pad("home", "edited since").unwrap();

        let mut leftover = LegacyStorage {
            path: Some(unwritable),
            items: legacy_snapshot().into_iter().collect(),
        };
        let again = migrate(&store, &mut leftover, &Logger::quiet("PADS")).unwrap();

        assert_eq!(again, None);
        assert_eq!(store.get_pad("home").unwrap(), "edited since");
        assert_eq!(store.load_pad_list().unwrap(), vec!["home", "ideas"]);
    }

    #[test]
    fn test_missing_legacy_entry_becomes_empty() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let mut legacy = LegacyStorage::in_memory(vec![(
            LEGACY_LIST_KEY.to_string(),
            r#"["ghost"]"#.to_string(),
        )]);

        migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap();

        assert_eq!(
            store.kv().get("mdp_pad_ghost").unwrap(),
            Some(Value::String(String::new()))
        );
    }

    #[test]
    fn test_bad_list_keeps_legacy_file() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let path = dir.path().join("legacy.json");
        fs::write(&path, r#"{"mdp-list": "not json", "smde_home": "keep me"}"#).unwrap();

        let mut legacy = LegacyStorage::load(&path).unwrap().unwrap();
        let err = migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap_err();

        assert!(matches!(err, MigrationError::BadList(_)));
        assert!(fs::read_to_string(&path).unwrap().contains("keep me"));
        assert_eq!(store.kv().size().unwrap(), 0);
    }

    #[test]
    fn test_file_backed_clear() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let path = dir.path().join("legacy.json");
        fs::write(
            &path,
            r#"{"mdp-list": "[\"home\"]", "smde_home": "from disk"}"#,
        )
        .unwrap();

        let mut legacy = LegacyStorage::load(&path).unwrap().unwrap();
        migrate(&store, &mut legacy, &Logger::quiet("PADS")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert_eq!(store.get_pad("home").unwrap(), "from disk");
        let reloaded = LegacyStorage::load(&path).unwrap().unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(LegacyStorage::load(&dir.path().join("absent.json")).unwrap().is_none());
    }
}
