//! A single configured asset source.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::container::Container;
use crate::emitter::Emitter;
use crate::error::{PipelineError, Result};
use crate::event::{AssetPayload, ModuleStats, ModuleSummary, Payload, MODULE_EMIT_ASSET};
use crate::metrics::METRICS;
use crate::pattern::AssetFilter;

/// One module: a root directory walked for assets.
#[derive(Debug)]
pub struct EmitModule {
    key: String,
    container: Arc<Container>,
    root: PathBuf,
    stats: Mutex<ModuleStats>,
}

impl EmitModule {
    /// Build a module from its prepared container. `root` defaults to the
    /// container's base directory.
    pub fn new(key: impl Into<String>, container: Container) -> Self {
        let root = container
            .get_as::<String>("root")
            .ok()
            .flatten()
            .map(PathBuf::from)
            .unwrap_or_else(|| container.base_dir().to_path_buf());

        Self {
            key: key.into(),
            container: Arc::new(container),
            root,
            stats: Mutex::new(ModuleStats::default()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn stats(&self) -> ModuleStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            key: self.key.clone(),
            root: self.root.clone(),
            stats: self.stats(),
            container: self.container.clone(),
        }
    }

    pub fn dump_stats(&self) -> String {
        serde_json::to_string_pretty(&self.stats()).unwrap_or_default()
    }

    fn failure(&self, source: anyhow::Error) -> PipelineError {
        PipelineError::ModuleProcessing {
            module: self.key.clone(),
            source,
        }
    }

    /// Validate preconditions: the root must be an existing directory.
    pub async fn check(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.root).await.map_err(|e| {
            self.failure(anyhow!("root {} is not accessible: {e}", self.root.display()))
        })?;
        if !metadata.is_dir() {
            return Err(self.failure(anyhow!("root {} is not a directory", self.root.display())));
        }
        Ok(())
    }

    /// Collect the root's files in file-name order, off the runtime thread.
    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let listing = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter(|entry| entry.as_ref().map_or(true, |e| e.file_type().is_file()))
                .map(|entry| entry.map(walkdir::DirEntry::into_path))
                .collect::<std::result::Result<Vec<_>, walkdir::Error>>()
        })
        .await
        .map_err(|e| self.failure(e.into()))?;

        listing.map_err(|e| self.failure(e.into()))
    }

    /// Announce every accepted file of the root, in file-name order, with a
    /// blocking [`MODULE_EMIT_ASSET`] event.
    ///
    /// Each announcement is awaited before the next one is made.
    pub async fn process(&self, emitter: &Emitter, filter: &AssetFilter) -> Result<ModuleStats> {
        let metadata = self
            .container
            .get("meta")
            .cloned()
            .unwrap_or(Value::Null);
        let root_abs = if self.root.is_absolute() {
            self.root.clone()
        } else {
            std::env::current_dir()?.join(&self.root)
        };

        for path in self.list_files().await? {
            let relative = path
                .strip_prefix(&self.root)
                .map_err(|e| self.failure(e.into()))?;
            let file = to_slash(relative);
            let accepted = filter.accepts(&file);
            self.stats
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .record(accepted);

            if !accepted {
                debug!(module = %self.key, file = %file, "asset ignored");
                continue;
            }

            METRICS.inc_assets_emitted();
            let payload = AssetPayload {
                file_abs: root_abs.join(relative),
                file,
                module: self.key.clone(),
                metadata: metadata.clone(),
            };
            emitter
                .emit_blocking(MODULE_EMIT_ASSET, Payload::Asset(payload))
                .await?;
        }

        Ok(self.stats())
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
