//! Durable per-namespace record of externally resolved components.
//!
//! Layout: `<storage_path>/<namespace>.json`

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// One registered component and the config files it contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub key: String,

    #[serde(default)]
    pub configs: Vec<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryRecord {
    namespace: String,

    #[serde(default)]
    components: Vec<RegistryEntry>,
}

/// Registry bound to one namespace (`unit`, `e2e`, `generic`, ...).
#[derive(Debug)]
pub struct ComponentRegistry {
    storage_path: PathBuf,
    namespace: String,
    entries: Vec<RegistryEntry>,
}

impl ComponentRegistry {
    pub fn create(storage_path: impl Into<PathBuf>, namespace: &str) -> Self {
        Self {
            storage_path: storage_path.into(),
            namespace: namespace.to_lowercase(),
            entries: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// File backing this namespace.
    pub fn registry_file(&self) -> PathBuf {
        self.storage_path.join(format!("{}.json", self.namespace))
    }

    /// Read the persisted record. A missing file yields an empty registry.
    pub async fn load(&mut self) -> Result<()> {
        let file = self.registry_file();
        let raw = match tokio::fs::read(&file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %file.display(), "no registry file, starting empty");
                self.entries.clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let record: RegistryRecord = serde_json::from_slice(&raw).map_err(|e| {
            PipelineError::Registry(format!("corrupt registry {}: {e}", file.display()))
        })?;
        self.entries = record.components;
        debug!(
            namespace = %self.namespace,
            components = self.entries.len(),
            "registry loaded"
        );
        Ok(())
    }

    /// Persist the record atomically.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.storage_path)?;

        let record = RegistryRecord {
            namespace: self.namespace.clone(),
            components: self.entries.clone(),
        };
        let body = serde_json::to_vec_pretty(&record)?;

        // Atomic write: write to temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.storage_path)?;
        tmp.write_all(&body)?;
        tmp.persist(self.registry_file()).map_err(|e| e.error)?;
        Ok(())
    }

    /// Registered component identifiers, in registration order.
    pub fn list_keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Config files contributed by all entries, in entry order, without
    /// duplicates.
    pub fn configs(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .flat_map(|e| e.configs.iter())
            .filter(|c| seen.insert((*c).clone()))
            .cloned()
            .collect()
    }

    /// Add or replace the entry for `key`.
    pub fn add(&mut self, key: &str, configs: Vec<PathBuf>) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.configs = configs,
            None => self.entries.push(RegistryEntry {
                key: key.to_string(),
                configs,
            }),
        }
    }

    /// Remove the entry for `key`; returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        before != self.entries.len()
    }
}
