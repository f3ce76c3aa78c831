//! File-backed credential store (feature-gated).

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};

use relaylink_core::{CredentialStore, StoreError, StoreKey};

/// Durable store persisted as one JSON object.
///
/// The whole map is rewritten on every change through a uniquely named,
/// synced temporary file and a rename, so a crash leaves either the old or
/// the new contents. Keys this crate does not know about are preserved.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e)),
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "opened credential file");

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        let json = serde_json::to_vec_pretty(values)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(key.as_str())
            .cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::Poisoned)?;
        let previous = values.insert(key.as_str().to_owned(), value.to_owned());

        if let Err(e) = self.persist(&values) {
            // Keep memory in line with disk.
            match previous {
                Some(old) => values.insert(key.as_str().to_owned(), old),
                None => values.remove(key.as_str()),
            };
            return Err(e);
        }
        Ok(())
    }

    fn clear(&self, key: StoreKey) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::Poisoned)?;
        let Some(previous) = values.remove(key.as_str()) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&values) {
            values.insert(key.as_str().to_owned(), previous);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path).unwrap();
        store.set(StoreKey::SessionFlag, "true").unwrap();
        store.set(StoreKey::AccessToken, "A").unwrap();
        store.set(StoreKey::Email, "ana@example.com").unwrap();
        store.clear(StoreKey::Email).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.session_flag().unwrap());
        assert_eq!(reopened.get(StoreKey::AccessToken).unwrap().as_deref(), Some("A"));
        assert_eq!(reopened.get(StoreKey::Email).unwrap(), None);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested/absent.json")).unwrap();
        assert_eq!(store.get(StoreKey::RefreshToken).unwrap(), None);

        store.set(StoreKey::RefreshToken, "R").unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn uses_dashboard_key_names_and_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"i18nextLng":"vi","accessToken":"A"}"#).unwrap();

        let store = FileStore::open(&path).unwrap();
        store.set(StoreKey::BrokerUsername, "aio-user").unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["i18nextLng"], "vi");
        assert_eq!(raw["accessToken"], "A");
        assert_eq!(raw["AIO_USERNAME"], "aio-user");
    }

    #[test]
    fn stores_sharing_a_file_leave_it_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = FileStore::open(&path).unwrap();
                    for n in 0..20 {
                        store.set(StoreKey::AccessToken, &format!("{writer}-{n}")).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.get(StoreKey::AccessToken).unwrap().is_some());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("session.json")]);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(FileStore::open(&path), Err(StoreError::Corrupt(_))));
    }
}
