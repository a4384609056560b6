//! YAML configuration loading.
//!
//! The root document is `<path>/.convoy.yml`. Files contributed by the
//! component registry are merged on top of it: objects merge key by key,
//! any other value from a later file replaces the earlier one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use convoy_core::Container;
use serde_json::{Map, Value};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = ".convoy.yml";

/// Merge `overlay` into `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Read one YAML document. An empty document is an empty object.
pub async fn load_yaml(path: &Path) -> Result<Value> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid YAML in {}", path.display()))?;
    Ok(match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

/// Load the root config of the project at `dir` and merge `extra` files
/// over it, in order.
pub async fn load_root(dir: &Path, extra: &[PathBuf]) -> Result<Container> {
    let file = dir.join(CONFIG_FILE_NAME);
    let mut data = load_yaml(&file).await?;

    for path in extra {
        debug!(file = %path.display(), "merging component configuration");
        let overlay = load_yaml(path).await?;
        deep_merge(&mut data, overlay);
    }

    let file = if file.is_absolute() {
        file
    } else {
        std::env::current_dir()?.join(file)
    };
    Ok(Container::from_file("root", data, &file))
}
