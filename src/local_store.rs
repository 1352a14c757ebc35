use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::anyhow;
use directories::ProjectDirs;

pub const REFERRAL_CODE_KEY: &str = "referral_code";

const STORE_FILE: &str = "local_store.json";

/// Client-local key-value storage persisted as one JSON file.
pub struct LocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    /// Opens the store under `data_dir`, or under the platform data directory
    /// when none is given.
    pub fn open(data_dir: Option<&str>) -> Result<Self, anyhow::Error> {
        let dir = match data_dir {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("app", "portal", "package-portal")
                .ok_or_else(|| anyhow!("Could not resolve a data directory."))?
                .data_dir()
                .to_path_buf(),
        };

        fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join(STORE_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Local store lock poisoned."))?;

        Ok(self.read()?.remove(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Local store lock poisoned."))?;

        let mut entries = self.read()?;
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Local store lock poisoned."))?;

        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }

        Ok(())
    }

    fn read(&self) -> Result<BTreeMap<String, String>, anyhow::Error> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), anyhow::Error> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().to_str()).unwrap();

        assert_eq!(store.get(REFERRAL_CODE_KEY).unwrap(), None);

        store.set(REFERRAL_CODE_KEY, "alice").unwrap();
        assert_eq!(store.get(REFERRAL_CODE_KEY).unwrap().as_deref(), Some("alice"));

        store.remove(REFERRAL_CODE_KEY).unwrap();
        assert_eq!(store.get(REFERRAL_CODE_KEY).unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        LocalStore::open(dir.path().to_str())
            .unwrap()
            .set(REFERRAL_CODE_KEY, "bob")
            .unwrap();

        let reopened = LocalStore::open(dir.path().to_str()).unwrap();
        assert_eq!(reopened.get(REFERRAL_CODE_KEY).unwrap().as_deref(), Some("bob"));
    }
}
