//! Hierarchical, path-addressed configuration store.
//!
//! A [`Container`] is mutated only through `&mut` access, which its owning
//! component holds while it prepares the config. Once shared (as
//! `Arc<Container>`) it is read-only for everyone.
//!
//! [`ContainerTransformer`] applies an ordered list of asynchronous value
//! mappings to a container, failing fast on the first error.

use std::future::Future;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pattern::PatternSet;
use crate::sequential::{Sequential, Step};

/// Path-addressed configuration snapshot.
///
/// Paths are dot-separated object keys (`wait.timeout`). The empty path
/// addresses the root. Key order is insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    name: String,
    data: Value,
    base_dir: PathBuf,
    source_file: Option<PathBuf>,
}

impl Container {
    /// Create a container. `null` data becomes an empty object.
    pub fn new(name: impl Into<String>, data: Value, base_dir: impl Into<PathBuf>) -> Self {
        let data = match data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            name: name.into(),
            data,
            base_dir: base_dir.into(),
            source_file: None,
        }
    }

    /// Create a container for data read from `file`; the base directory is
    /// the file's parent.
    pub fn from_file(name: impl Into<String>, data: Value, file: &Path) -> Self {
        let base_dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut container = Self::new(name, data, base_dir);
        container.source_file = Some(file.to_path_buf());
        container
    }

    /// Build a new container from the section at `path`, inheriting this
    /// container's base directory and source file.
    pub fn section(&self, name: impl Into<String>, path: &str) -> Option<Container> {
        let data = self.get(path)?.clone();
        Some(Container {
            name: name.into(),
            data: match data {
                Value::Null => Value::Object(Map::new()),
                other => other,
            },
            base_dir: self.base_dir.clone(),
            source_file: self.source_file.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// The whole document.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Value at `path`, if present.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.data);
        }
        path.split('.')
            .try_fold(&self.data, |node, key| node.as_object()?.get(key))
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Typed value at `path`; `Ok(None)` when absent.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Typed value at `path`, or `default` when absent or of the wrong shape.
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        match self.get_as(path) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                debug!(container = %self.name, path = %path, error = %e, "falling back to default");
                default
            }
        }
    }

    /// Replace the value at `path`, creating intermediate objects.
    pub fn set(&mut self, path: &str, value: Value) {
        if path.is_empty() {
            self.data = value;
            return;
        }

        let mut node = &mut self.data;
        for key in path.split('.') {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
                _ => return,
            };
        }
        *node = value;
    }

    /// Top-level keys in insertion order.
    pub fn list_keys(&self) -> Vec<String> {
        self.data
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Ordered, human-readable view for debug logging.
    pub fn dump(&self) -> String {
        let body = serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| "{}".to_string());
        format!("[{}] {}", self.name, body)
    }
}

type TransformFn = Box<dyn FnOnce(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

struct TransformEntry {
    path: String,
    default: Value,
    transform: TransformFn,
}

/// Ordered pipeline of `(path, mapping)` pairs applied once to a container.
pub struct ContainerTransformer {
    container: Container,
    entries: Vec<TransformEntry>,
}

impl ContainerTransformer {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            entries: Vec::new(),
        }
    }

    /// Map the value at `path` (or `default` when absent) through `f`.
    pub fn add<F, Fut>(mut self, path: &str, default: Value, f: F) -> Self
    where
        F: FnOnce(Value) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.entries.push(TransformEntry {
            path: path.to_string(),
            default,
            transform: Box::new(move |value| f(value).boxed()),
        });
        self
    }

    /// Validate the pattern list at `path` and normalise it to a list.
    pub fn add_pattern(self, path: &str) -> Self {
        self.add(path, Value::Array(Vec::new()), |value| async move {
            PatternSet::normalize(value)
        })
    }

    /// Resolve the path (or list of paths) at `path` against `base`.
    /// Absent values stay absent unless `default` is given.
    pub fn add_path(self, path: &str, base: PathBuf, default: Option<&str>) -> Self {
        let default = default.map_or(Value::Null, |d| Value::String(d.to_string()));
        self.add(path, default, move |value| async move {
            resolve_paths(value, &base)
        })
    }

    /// Apply every transformer in order. The first failure aborts with
    /// [`PipelineError::Config`].
    pub async fn transform(self) -> Result<Container> {
        let steps: Vec<Step<'static, Container, PipelineError>> = self
            .entries
            .into_iter()
            .map(|entry| {
                Sequential::step(move |mut container: Container| async move {
                    let current = container
                        .get(&entry.path)
                        .cloned()
                        .unwrap_or(entry.default);
                    let mapped = (entry.transform)(current).await.map_err(|e| {
                        PipelineError::config(container.name(), format!("{}: {e:#}", entry.path))
                    })?;
                    if !mapped.is_null() {
                        container.set(&entry.path, mapped);
                    }
                    Ok(container)
                })
            })
            .collect();

        Sequential::all(steps, self.container).await
    }
}

fn resolve_paths(value: Value, base: &Path) -> anyhow::Result<Value> {
    let resolve = |raw: &str| -> Value {
        let candidate = Path::new(raw);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base.join(candidate)
        };
        Value::String(resolved.to_string_lossy().into_owned())
    };

    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(resolve(&s)),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(resolve(s)),
                other => anyhow::bail!("expected a path string, got {other}"),
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Value::Array),
        other => anyhow::bail!("expected a path or a list of paths, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Container {
        Container::new(
            "e2e",
            json!({
                "pattern": ["*.e2e.js"],
                "wait": { "timeout": 500, "uri": ["http://localhost:8080"] },
                "reporter": "spec"
            }),
            "/work",
        )
    }

    #[test]
    fn test_get_dotted_path() {
        let c = sample();
        assert_eq!(c.get("wait.timeout"), Some(&json!(500)));
        assert_eq!(c.get("wait.missing"), None);
        assert_eq!(c.get("reporter.nested"), None);
        assert!(c.has("pattern"));
    }

    #[test]
    fn test_get_or_defaults() {
        let c = sample();
        assert_eq!(c.get_or("wait.timeout", 15_000u64), 500);
        assert_eq!(c.get_or("wait.interval", 200u64), 200);
        // Wrong shape falls back too.
        assert_eq!(c.get_or("reporter", 3u32), 3);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut c = sample();
        c.set("screenshot.path", json!("/tmp/shots"));
        c.set("reporter.kind", json!("dot"));
        assert_eq!(c.get("screenshot.path"), Some(&json!("/tmp/shots")));
        assert_eq!(c.get("reporter.kind"), Some(&json!("dot")));
    }

    #[test]
    fn test_list_keys_keeps_insertion_order() {
        let c = Container::new("root", json!({ "zeta": 1, "$": {}, "alpha": 2 }), ".");
        assert_eq!(c.list_keys(), vec!["zeta", "$", "alpha"]);
    }

    #[test]
    fn test_section_inherits_base_dir() {
        let root = Container::from_file(
            "root",
            json!({ "$": { "emit": { "pattern": "*.js" } } }),
            Path::new("/repo/.convoy.yml"),
        );
        let emit = root.section("emit", "$.emit").unwrap();
        assert_eq!(emit.base_dir(), Path::new("/repo"));
        assert_eq!(emit.source_file(), Some(Path::new("/repo/.convoy.yml")));
        assert!(root.section("e2e", "$.e2e").is_none());
    }

    #[test]
    fn test_dump_is_ordered() {
        let c = Container::new("m", json!({ "b": 1, "a": 2 }), ".");
        let dump = c.dump();
        assert!(dump.starts_with("[m]"));
        assert!(dump.find("\"b\"").unwrap() < dump.find("\"a\"").unwrap());
    }

    #[tokio::test]
    async fn test_transformer_applies_in_order() {
        let container = Container::new("emit", json!({ "pattern": "*.js", "root": "src" }), "/repo");
        let result = ContainerTransformer::new(container)
            .add_pattern("pattern")
            .add_pattern("ignore")
            .add_path("root", PathBuf::from("/repo"), None)
            .add("count", json!(1), |v| async move {
                Ok(json!(v.as_i64().unwrap_or(0) + 1))
            })
            .transform()
            .await
            .unwrap();

        assert_eq!(result.get("pattern"), Some(&json!(["*.js"])));
        assert_eq!(result.get("ignore"), Some(&json!([])));
        assert_eq!(
            result.get("root"),
            Some(&json!(PathBuf::from("/repo/src").to_string_lossy()))
        );
        assert_eq!(result.get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_transformer_fails_fast() {
        let container = Container::new("emit", json!({ "pattern": ["/[/"] }), ".");
        let reached = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = reached.clone();

        let err = ContainerTransformer::new(container)
            .add_pattern("pattern")
            .add("later", Value::Null, move |v| async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(v)
            })
            .transform()
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Config { ref section, .. } if section == "emit"));
        assert!(!reached.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_absolute_paths_untouched() {
        let container = Container::new("m", json!({ "root": "/abs/dir" }), "/repo");
        let result = ContainerTransformer::new(container)
            .add_path("root", PathBuf::from("/repo"), Some("."))
            .transform()
            .await
            .unwrap();
        assert_eq!(result.get("root"), Some(&json!("/abs/dir")));
    }
}
