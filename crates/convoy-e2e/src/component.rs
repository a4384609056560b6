//! The `e2e` component.
//!
//! Collects assets announced by the emit component, then runs one test
//! session over all of them once every module has been processed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use convoy_core::event::{MODULES_PROCESS_END, MODULE_EMIT_ASSET};
use convoy_core::{
    AssetFilter, Component, ConfigWait, Container, ContainerTransformer, Emitter, ModuleStats,
    Payload, PipelineError, RunOutcome, EMIT_COMPONENT,
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::events::{E2E_ASSET_ADD, E2E_ASSET_SKIP, E2E_SESSION_END, E2E_SESSION_START};
use crate::runner::{E2eRunner, SessionConfig};
use crate::wait::{UriWaiter, DEFAULT_WAIT_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};

pub const E2E_COMPONENT: &str = "e2e";

/// Priority of the asset subscription.
pub const E2E_PRIORITY: i32 = 10;

#[derive(Debug, Default)]
struct SessionState {
    assets: Vec<PathBuf>,
    stats: ModuleStats,
}

/// Runs the configured test command over every matching asset.
///
/// Config section `$.e2e`:
///
/// ```yaml
/// e2e:
///   pattern: ["*.e2e.js"]
///   ignore: ["node_modules/"]
///   command: npx testcafe chrome:headless
///   timeout: 600          # seconds, 0 = none
///   cwd: .
///   wait:
///     uri: http://localhost:8080
///     timeout: 15000      # ms
///     interval: 200       # ms
/// ```
#[derive(Default)]
pub struct E2eComponent {
    container: Option<Arc<Container>>,
    filter: Arc<AssetFilter>,
    state: Arc<Mutex<SessionState>>,
    modules_done: Arc<Notify>,
}

impl E2eComponent {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> ModuleStats {
        self.lock().stats
    }

    /// Absolute paths of the accepted assets, in announcement order.
    pub fn assets(&self) -> Vec<PathBuf> {
        self.lock().assets.clone()
    }

    pub fn dump_stats(&self) -> String {
        serde_json::to_string_pretty(&self.stats()).unwrap_or_default()
    }

    fn session_config(container: &Container) -> anyhow::Result<SessionConfig> {
        let command: Vec<String> = container
            .get_as("command")?
            .context("e2e.command is not configured")?;
        Ok(SessionConfig {
            command,
            timeout_secs: container.get_or("timeout", 0),
            working_dir: container.get_as::<PathBuf>("cwd")?,
        })
    }

    fn waiter(container: &Container) -> anyhow::Result<UriWaiter> {
        UriWaiter::new(
            Duration::from_millis(container.get_or("wait.timeout", DEFAULT_WAIT_TIMEOUT_MS)),
            Duration::from_millis(container.get_or("wait.interval", DEFAULT_WAIT_INTERVAL_MS)),
        )
    }
}

/// Accept a whitespace-separated string or a list of strings.
fn normalize_command(value: Value) -> anyhow::Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(json!(s.split_whitespace().collect::<Vec<_>>())),
        Value::Array(items) if items.iter().all(Value::is_string) => Ok(Value::Array(items)),
        other => bail!("expected a command string or list of strings, got {other}"),
    }
}

/// Accept a single string or a list of strings.
fn normalize_list(value: Value) -> anyhow::Result<Value> {
    match value {
        Value::Null => Ok(json!([])),
        Value::String(s) => Ok(json!([s])),
        Value::Array(items) if items.iter().all(Value::is_string) => Ok(Value::Array(items)),
        other => bail!("expected a string or list of strings, got {other}"),
    }
}

#[async_trait]
impl Component for E2eComponent {
    fn name(&self) -> &str {
        E2E_COMPONENT
    }

    fn dependencies(&self) -> Vec<String> {
        vec![EMIT_COMPONENT.to_string()]
    }

    async fn wait_config(
        &mut self,
        _emitter: &Emitter,
        root: &Arc<Container>,
    ) -> convoy_core::Result<Option<Arc<Container>>> {
        let Some(container) = ConfigWait::resolve(&*self, root).await? else {
            return Ok(None);
        };
        let filter = AssetFilter::from_container(&container)
            .map_err(|e| PipelineError::config(E2E_COMPONENT, format!("{e:#}")))?;
        self.filter = Arc::new(filter);
        self.container = Some(container.clone());
        Ok(Some(container))
    }

    async fn prepare_config(&self, section: Container) -> convoy_core::Result<Container> {
        let base = section.base_dir().to_path_buf();
        ContainerTransformer::new(section)
            .add_pattern("pattern")
            .add_pattern("ignore")
            .add("command", Value::Null, |v| async move { normalize_command(v) })
            .add("wait.uri", Value::Null, |v| async move { normalize_list(v) })
            .add_path("cwd", base, None)
            .transform()
            .await
    }

    fn attach(&self, emitter: &Emitter) {
        let filter = self.filter.clone();
        let state = self.state.clone();
        let bus = emitter.clone();
        emitter.on_blocking_with_priority(MODULE_EMIT_ASSET, E2E_PRIORITY, move |payload| {
            let filter = filter.clone();
            let state = state.clone();
            let bus = bus.clone();
            async move {
                let (accepted, file_abs) = match payload.as_asset() {
                    Some(asset) => (filter.accepts(&asset.file), asset.file_abs.clone()),
                    None => return Ok(()),
                };
                state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .stats
                    .record(accepted);

                if !accepted {
                    bus.emit_blocking(E2E_ASSET_SKIP, payload).await?;
                    return Ok(());
                }

                bus.emit_blocking(E2E_ASSET_ADD, payload).await?;
                state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .assets
                    .push(file_abs);
                Ok::<_, anyhow::Error>(())
            }
        });

        let modules_done = self.modules_done.clone();
        emitter.on(MODULES_PROCESS_END, move |_| {
            modules_done.notify_one();
            futures::future::ready(Ok(()))
        });
    }

    async fn run(&self, emitter: &Emitter) -> anyhow::Result<RunOutcome> {
        let container = self
            .container
            .clone()
            .context("e2e component run before its config was resolved")?;

        self.modules_done.notified().await;

        let assets = self.assets();
        if assets.is_empty() {
            info!(processed = 0, "no e2e test assets, nothing to run");
            debug!(stats = %self.dump_stats(), "e2e stats");
            return Ok(RunOutcome::Completed);
        }

        let config = Self::session_config(&container)?;
        let uris: Vec<String> = container.get_or("wait.uri", Vec::new());
        Self::waiter(&container)?.wait_all(&uris).await?;

        emitter
            .emit_blocking(
                E2E_SESSION_START,
                Payload::Json(json!({ "assets": assets.len() })),
            )
            .await?;

        let outcome = E2eRunner::execute(&config, &assets).await;
        let summary = match &outcome {
            Ok(result) => serde_json::to_value(result)?,
            Err(e) => json!({ "error": e.to_string() }),
        };
        emitter
            .emit_blocking(E2E_SESSION_END, Payload::Json(summary))
            .await?;

        let result = outcome?;
        if !result.passed() {
            warn!(
                exit_code = result.exit_code,
                stdout = %result.stdout,
                stderr = %result.stderr,
                "e2e session failed"
            );
            bail!(
                "end-to-end session failed with exit code {}",
                result.exit_code
            );
        }

        info!(
            processed = self.stats().processed,
            duration_ms = result.duration_ms,
            "finished processing e2e test assets"
        );
        debug!(stats = %self.dump_stats(), "e2e stats");
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::AssetPayload;
    use std::path::Path;

    fn root(e2e: Value) -> Arc<Container> {
        Arc::new(Container::from_file(
            "root",
            json!({ "$": { "e2e": e2e } }),
            Path::new("/repo/.convoy.yml"),
        ))
    }

    fn asset(file: &str) -> Payload {
        Payload::Asset(AssetPayload {
            file: file.to_string(),
            file_abs: PathBuf::from("/repo/web").join(file),
            module: "web".to_string(),
            metadata: Value::Null,
        })
    }

    #[tokio::test]
    async fn test_prepare_config_normalizes_values() {
        let mut e2e = E2eComponent::new();
        let container = e2e
            .wait_config(
                &Emitter::new(),
                &root(json!({
                    "pattern": "*.e2e.js",
                    "command": "npx testcafe chrome",
                    "cwd": "web",
                    "wait": { "uri": "http://localhost:8080" }
                })),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(container.get("pattern"), Some(&json!(["*.e2e.js"])));
        assert_eq!(container.get("ignore"), Some(&json!([])));
        assert_eq!(
            container.get("command"),
            Some(&json!(["npx", "testcafe", "chrome"]))
        );
        assert_eq!(container.get("cwd"), Some(&json!("/repo/web")));
        assert_eq!(
            container.get("wait.uri"),
            Some(&json!(["http://localhost:8080"]))
        );

        let config = E2eComponent::session_config(&container).unwrap();
        assert_eq!(config.timeout_secs, 0);
        assert_eq!(config.working_dir, Some(PathBuf::from("/repo/web")));
    }

    #[tokio::test]
    async fn test_invalid_command_is_config_error() {
        let mut e2e = E2eComponent::new();
        let err = e2e
            .wait_config(&Emitter::new(), &root(json!({ "command": 42 })))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[tokio::test]
    async fn test_missing_section_skips() {
        let mut e2e = E2eComponent::new();
        let root = Arc::new(Container::new("root", json!({ "$": {} }), "/repo"));
        assert!(e2e
            .wait_config(&Emitter::new(), &root)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_assets_routed_by_pattern() {
        let emitter = Emitter::new();
        let mut e2e = E2eComponent::new();
        e2e.wait_config(
            &emitter,
            &root(json!({ "pattern": "*.e2e.js", "ignore": "skip/" })),
        )
        .await
        .unwrap();
        e2e.attach(&emitter);

        let routed = Arc::new(Mutex::new(Vec::new()));
        for event in [E2E_ASSET_ADD, E2E_ASSET_SKIP] {
            let routed = routed.clone();
            emitter.on_blocking(event, move |payload| {
                let file = payload.as_asset().map(|a| a.file.clone()).unwrap_or_default();
                routed.lock().unwrap().push(format!("{event}:{file}"));
                futures::future::ready(Ok(()))
            });
        }

        for file in ["a.e2e.js", "skip/b.e2e.js", "c.js"] {
            emitter
                .emit_blocking(MODULE_EMIT_ASSET, asset(file))
                .await
                .unwrap();
        }

        assert_eq!(
            *routed.lock().unwrap(),
            vec![
                "e2e.asset.add:a.e2e.js",
                "e2e.asset.skip:skip/b.e2e.js",
                "e2e.asset.skip:c.js"
            ]
        );
        assert_eq!(e2e.assets(), vec![PathBuf::from("/repo/web/a.e2e.js")]);
        let stats = e2e.stats();
        assert_eq!((stats.total, stats.processed, stats.ignored), (3, 1, 2));
    }

    #[tokio::test]
    async fn test_run_without_assets_skips_session() {
        let emitter = Emitter::new();
        let mut e2e = E2eComponent::new();
        // `false` would fail the run if it were executed.
        e2e.wait_config(
            &emitter,
            &root(json!({ "pattern": "*.e2e.js", "command": "false" })),
        )
        .await
        .unwrap();
        e2e.attach(&emitter);

        emitter.emit(MODULES_PROCESS_END, Payload::None);
        e2e.run(&emitter).await.unwrap();
        assert_eq!(e2e.stats(), ModuleStats::default());
    }

    #[test]
    fn test_normalize_helpers() {
        assert_eq!(normalize_command(Value::Null).unwrap(), Value::Null);
        assert!(normalize_command(json!(["a", 1])).is_err());
        assert_eq!(normalize_list(json!("x")).unwrap(), json!(["x"]));
        assert_eq!(normalize_list(Value::Null).unwrap(), json!([]));
    }
}
