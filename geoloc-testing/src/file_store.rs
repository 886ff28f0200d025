use std::{
    collections::BTreeMap,
    fs, io,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

use geoloc_logic::KeyValueStore;

use crate::prelude::*;

/// [KeyValueStore] kept in a JSON object on disk, rewritten in full on every change
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse store {}", path.display()))?,
            Err(why) if why.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(why) => {
                return Err(why).with_context(|| format!("Failed to read store {}", path.display()));
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Written to a sibling file and renamed over the old one, the file is never partially written
    fn persist(&self, entries: &BTreeMap<String, String>) -> Result {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize store")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).context("Failed to write store")?;
        fs::rename(&tmp, &self.path).context("Failed to replace store")
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TraceSource;
    use geoloc_logic::{Coordinates, LocationReading, STORAGE_KEY, create_watcher, encode_record};
    use tempfile::TempDir;

    fn test_path() -> (PathBuf, TempDir) {
        let dir = TempDir::new().unwrap();
        (dir.path().join("nested").join("store.json"), dir)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (path, _dir) = test_path();
        let store = FileStore::open(&path).expect("Failed to open");
        assert_eq!(store.get("pos").unwrap(), None);
        assert!(!path.exists(), "Opening shouldn't create the file");
    }

    #[test]
    fn test_values_survive_reopen() {
        let (path, _dir) = test_path();

        let store = FileStore::open(&path).unwrap();
        store.set("pos", "abc".to_string()).unwrap();
        store.set("other", "xyz".to_string()).unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("pos").unwrap().as_deref(), Some("abc"));

        store.remove("pos").unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("pos").unwrap(), None);
        assert_eq!(store.get("other").unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn test_corrupt_file_fails_open() {
        let (path, _dir) = test_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(FileStore::open(&path).is_err());
    }

    #[tokio::test]
    async fn test_watcher_restores_across_runs() {
        let (path, _dir) = test_path();
        let saved = LocationReading::new(1000, Coordinates::new(59.33, 18.07, 12.0));

        // Seed the file the way a previous run would have
        let store = FileStore::open(&path).unwrap();
        store
            .set(STORAGE_KEY, encode_record(&saved).unwrap())
            .unwrap();
        drop(store);

        let watcher = create_watcher(
            TraceSource::new(Vec::new()),
            FileStore::open(&path).unwrap(),
            Default::default(),
        );

        assert_eq!(watcher.saved_location(), Some(saved));
        assert_eq!(watcher.previous_location(), None);
    }
}
