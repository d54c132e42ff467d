//! JSON file credential store

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::RwLock;

use crate::error::{DispatchError, Result};

use super::{CredentialStore, StoreKey};

/// Credential store persisted as one flat JSON object
///
/// Every mutation rewrites the file. On unix the file is created with mode
/// `0600`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file starts empty
    ///
    /// # Errors
    /// Returns `Store` if the file exists but cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                DispatchError::store(format!("Failed to read {}: {e}", path.display()))
            })?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    DispatchError::store(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened credential store {} ({} keys)", path.display(), values.len());

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy, write it, and keep it only if the write
    /// succeeded
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<()> {
        let mut values = self.values.write();
        let mut next = values.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let serialized = serde_json::to_string_pretty(values)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| {
            DispatchError::store(format!("Failed to open {}: {e}", self.path.display()))
        })?;
        file.write_all(serialized.as_bytes()).map_err(|e| {
            DispatchError::store(format!("Failed to write {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

impl CredentialStore for JsonFileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self.values.read().get(key.as_str()).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.as_str().to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        self.update(|values| values.remove(key.as_str()).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.update(|values| {
            values.clear();
            true
        })
    }
}
