//! One-JSON-file-per-entity persistence with write-then-rename durability
//! (§4.4 "the in-memory state is not advanced until the write commits",
//! §5 "the write-then-rename idiom copies the request, fsyncs, then updates
//! the map pointer"). Every directory-backed entity store in the workspace
//! (consent manager requests, tickets, policies) goes through this.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A directory of `<id>.json` files. Stateless — callers keep their own
/// in-memory index and call through to this for persistence.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if absent) a directory-backed store at `dir`. Also
    /// sweeps any leftover `.tmp` files from a prior crash mid-write
    /// (§5 "the consent manager tolerates stale `.tmp` files by deleting
    /// them at load time").
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "tmp").unwrap_or(false) {
                let _ = fs::remove_file(entry.path());
            }
        }
        crate::raw::restrict_secret_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entity_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Serialises `value` to a temp file, fsyncs, then atomically renames
    /// it onto `<id>.json`. A crash between the write and the rename leaves
    /// only a `.tmp` file, which `open` sweeps away on next start — the
    /// previous committed value (if any) is never torn.
    pub fn save<T: Serialize>(&self, id: &str, value: &T) -> io::Result<()> {
        let final_path = self.entity_path(id);
        let tmp_path = self.dir.join(format!("{id}.json.tmp"));

        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        {
            let mut f = fs::File::create(&tmp_path)?;
            use std::io::Write;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        crate::raw::restrict_secret_file(&tmp_path)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(&self, id: &str) -> io::Result<Option<T>> {
        let path = self.entity_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }

    pub fn delete(&self, id: &str) -> io::Result<()> {
        let path = self.entity_path(id);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Every entity id present, derived from `<id>.json` file names
    /// (directory-walk listing, §4.4).
    pub fn list_ids(&self) -> io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Loads every entity in the store, skipping ids that fail to parse
    /// (logged by the caller, not here, so this module stays logging-free).
    pub fn load_all<T: DeserializeOwned>(&self) -> io::Result<Vec<(String, T)>> {
        let mut out = Vec::new();
        for id in self.list_ids()? {
            if let Some(value) = self.load::<T>(&id)? {
                out.push((id, value));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Thing {
        value: u32,
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save("abc", &Thing { value: 42 }).unwrap();
        let loaded: Thing = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded, Thing { value: 42 });
    }

    #[test]
    fn missing_entity_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let loaded: Option<Thing> = store.load("missing").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn stale_tmp_file_is_swept_on_open() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("leftover.json.tmp"), b"{}").unwrap();
        let _store = FileStore::open(dir.path()).unwrap();
        assert!(!dir.path().join("leftover.json.tmp").exists());
    }

    #[test]
    fn list_ids_and_load_all() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save("b", &Thing { value: 2 }).unwrap();
        store.save("a", &Thing { value: 1 }).unwrap();
        assert_eq!(store.list_ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
        let all: Vec<(String, Thing)> = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn delete_removes_entity() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save("x", &Thing { value: 1 }).unwrap();
        store.delete("x").unwrap();
        let loaded: Option<Thing> = store.load("x").unwrap();
        assert!(loaded.is_none());
    }
}
