//! Config-based readiness: resolve `$.<name>` into a prepared container.

use std::sync::Arc;

use tracing::{debug, info};

use super::{Component, MAIN_CONFIG_KEY};
use crate::container::Container;
use crate::error::{PipelineError, Result};

/// Resolves a component's named configuration section.
pub struct ConfigWait;

impl ConfigWait {
    /// Path of a component's section in the root document.
    pub fn section_path(name: &str) -> String {
        format!("{MAIN_CONFIG_KEY}.{name}")
    }

    /// Look up the component's section in `root`, build its container and
    /// pass it through [`Component::prepare_config`].
    ///
    /// Returns `Ok(None)` when the section is absent and the component is
    /// not mandatory.
    pub async fn resolve<C>(component: &C, root: &Container) -> Result<Option<Arc<Container>>>
    where
        C: Component + ?Sized,
    {
        let name = component.name();
        let path = Self::section_path(name);

        let Some(section) = root.section(name, &path) else {
            if component.is_mandatory() {
                return Err(PipelineError::config(
                    name,
                    format!("missing mandatory section '{path}'"),
                ));
            }
            info!(component = %name, "no config section, component skipped");
            return Ok(None);
        };

        let prepared = component.prepare_config(section).await?;
        debug!(component = %name, config = %prepared.dump(), "config prepared");
        Ok(Some(Arc::new(prepared)))
    }
}
