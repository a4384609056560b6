//! Component capability set and the reusable lifecycle behaviours.
//!
//! A component is a named pipeline stage. Its lifecycle:
//!
//! ```text
//! Created -> ConfigPending -> ConfigReady -> Running -> Done | Failed
//!                         \-> Skipped
//! ```
//!
//! Behaviour is composed rather than inherited:
//! - [`ConfigWait`] resolves a component's `$.<name>` section into a
//!   prepared [`Container`].
//! - [`Gated`] wraps any component so that `run` waits on the readiness
//!   signals of its declared dependencies.

pub mod config;
pub mod gate;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::container::Container;
use crate::emitter::Emitter;
use crate::error::Result;

pub use config::ConfigWait;
pub use gate::{DependencyGate, GateOutcome, Gated};

/// Reserved top-level section holding per-component configuration.
pub const MAIN_CONFIG_KEY: &str = "$";

/// Lifecycle state of a component within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Created,
    ConfigPending,
    ConfigReady,
    Skipped,
    Running,
    Done,
    Failed,
}

impl ComponentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Done | Self::Failed)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::ConfigPending => "config_pending",
            Self::ConfigReady => "config_ready",
            Self::Skipped => "skipped",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a component's `run` ended, short of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    #[default]
    Completed,
    /// The component chose not to do its work, e.g. because a dependency
    /// was skipped.
    Skipped,
}

impl RunOutcome {
    /// Terminal state recorded for this outcome.
    pub fn state(self) -> ComponentState {
        match self {
            Self::Completed => ComponentState::Done,
            Self::Skipped => ComponentState::Skipped,
        }
    }
}

/// A pluggable pipeline stage.
#[async_trait]
pub trait Component: Send + Sync {
    /// Unique name within the active set; also the config section key.
    fn name(&self) -> &str;

    /// Names of components whose readiness gates this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether a missing config section is an error rather than a skip.
    fn is_mandatory(&self) -> bool {
        false
    }

    /// Resolve this component's configuration. `Ok(None)` means skip.
    async fn wait_config(
        &mut self,
        emitter: &Emitter,
        root: &Arc<Container>,
    ) -> Result<Option<Arc<Container>>>;

    /// Transform the raw section into the component's container.
    ///
    /// The section already carries the base directory and source file of
    /// the document it came from.
    async fn prepare_config(&self, section: Container) -> Result<Container> {
        Ok(section)
    }

    /// Attach subscriptions. Called once, inside the registration batch,
    /// before any component runs.
    fn attach(&self, _emitter: &Emitter) {}

    /// Do the work. An error is fatal to the whole run.
    async fn run(&self, emitter: &Emitter) -> anyhow::Result<RunOutcome>;
}
