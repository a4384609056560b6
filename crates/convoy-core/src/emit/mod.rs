//! The asset pipeline.
//!
//! [`EmitComponent`] turns every top-level config key other than
//! [`MAIN_CONFIG_KEY`] into an [`EmitModule`] and drives the modules one at
//! a time:
//!
//! ```text
//! modules.process.start                      (non-blocking)
//! for each module, in declaration order:
//!     check
//!     module.process.start                   (blocking)
//!     module.emit.asset  x accepted files    (blocking, one at a time)
//!     module.process.end                     (blocking)
//! modules.process.end                        (deferred, non-blocking)
//! ```

pub mod module;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::component::{Component, ConfigWait, RunOutcome, MAIN_CONFIG_KEY};
use crate::container::{Container, ContainerTransformer};
use crate::emitter::Emitter;
use crate::error::{PipelineError, Result};
use crate::event::{
    ModuleSummary, Payload, MODULES_PROCESS_END, MODULES_PROCESS_START, MODULE_PROCESS_END,
    MODULE_PROCESS_START,
};
use crate::pattern::AssetFilter;
use crate::sequential::{Sequential, Step};

pub use module::EmitModule;

/// Name (and config section) of the emit component.
pub const EMIT_COMPONENT: &str = "emit";

/// Discovers configured modules and streams their assets as events.
#[derive(Default)]
pub struct EmitComponent {
    container: Option<Arc<Container>>,
    modules: Vec<Arc<EmitModule>>,
    skipped_modules: Vec<String>,
}

impl EmitComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module keys to leave out of this run.
    pub fn with_skipped_modules(mut self, keys: Vec<String>) -> Self {
        self.skipped_modules = keys;
        self
    }

    pub fn modules(&self) -> &[Arc<EmitModule>] {
        &self.modules
    }

    /// Build a module container, resolving a relative `root` against the
    /// main container's base directory.
    pub async fn prepare_module_config(
        &self,
        module_config: Container,
        main: &Container,
    ) -> Result<Container> {
        ContainerTransformer::new(module_config)
            .add_path("root", main.base_dir().to_path_buf(), Some("."))
            .transform()
            .await
    }

    fn summaries(&self) -> Vec<ModuleSummary> {
        self.modules.iter().map(|m| m.summary()).collect()
    }

    fn register_debuggers(&self, emitter: &Emitter) {
        emitter.on(MODULES_PROCESS_START, |payload| async move {
            if let Payload::Modules(modules) = &payload {
                let keys: Vec<&str> = modules.iter().map(|m| m.key.as_str()).collect();
                info!(count = modules.len(), modules = %keys.join(", "), "start processing modules");
            }
            Ok(())
        });

        emitter.on(MODULES_PROCESS_END, |payload| async move {
            if let Payload::Modules(modules) = &payload {
                let keys: Vec<&str> = modules.iter().map(|m| m.key.as_str()).collect();
                info!(count = modules.len(), modules = %keys.join(", "), "finished processing modules");
            }
            Ok(())
        });

        emitter.on(MODULE_PROCESS_START, |payload| async move {
            if let Some(module) = payload.as_module() {
                debug!(module = %module.key, config = %module.container.dump(), "start processing module");
            }
            Ok(())
        });

        emitter.on(MODULE_PROCESS_END, |payload| async move {
            if let Some(module) = payload.as_module() {
                debug!(
                    module = %module.key,
                    total = module.stats.total,
                    processed = module.stats.processed,
                    ignored = module.stats.ignored,
                    "finished processing module"
                );
            }
            Ok(())
        });
    }
}

#[async_trait]
impl Component for EmitComponent {
    fn name(&self) -> &str {
        EMIT_COMPONENT
    }

    async fn wait_config(
        &mut self,
        _emitter: &Emitter,
        root: &Arc<Container>,
    ) -> Result<Option<Arc<Container>>> {
        let Some(container) = ConfigWait::resolve(&*self, root).await? else {
            return Ok(None);
        };

        let keys: Vec<String> = root
            .list_keys()
            .into_iter()
            .filter(|key| key != MAIN_CONFIG_KEY)
            .filter(|key| {
                let skipped = self.skipped_modules.contains(key);
                if skipped {
                    info!(module = %key, "module skipped");
                }
                !skipped
            })
            .collect();

        for key in &keys {
            let section = root
                .section(key.as_str(), key)
                .ok_or_else(|| PipelineError::config(key, "module section vanished"))?;
            let prepared = self.prepare_module_config(section, &container).await?;
            self.modules.push(Arc::new(EmitModule::new(key.as_str(), prepared)));
        }

        if !keys.is_empty() {
            info!(modules = %keys.join(", "), "modules to emit");
        }

        self.container = Some(container.clone());
        Ok(Some(container))
    }

    async fn prepare_config(&self, section: Container) -> Result<Container> {
        ContainerTransformer::new(section)
            .add_pattern("pattern")
            .add_pattern("ignore")
            .transform()
            .await
    }

    fn attach(&self, emitter: &Emitter) {
        self.register_debuggers(emitter);
    }

    async fn run(&self, emitter: &Emitter) -> anyhow::Result<RunOutcome> {
        let container = self
            .container
            .clone()
            .context("emit component run before its config was resolved")?;
        let filter = AssetFilter::from_container(&container)?;

        emitter.emit(MODULES_PROCESS_START, Payload::Modules(self.summaries()));

        let steps: Vec<Step<'_, (), PipelineError>> = self
            .modules
            .iter()
            .map(|module| {
                let filter = &filter;
                Sequential::step(move |()| async move {
                    module.check().await?;
                    emitter
                        .emit_blocking(MODULE_PROCESS_START, Payload::Module(module.summary()))
                        .await?;
                    module.process(emitter, filter).await?;
                    emitter
                        .emit_blocking(MODULE_PROCESS_END, Payload::Module(module.summary()))
                        .await
                })
            })
            .collect();

        Sequential::all(steps, ()).await?;

        emitter.emit_deferred(MODULES_PROCESS_END, Payload::Modules(self.summaries()));
        Ok(RunOutcome::Completed)
    }
}
