//! Error taxonomy for the orchestration engine.

use thiserror::Error;

/// Errors that abort a pipeline run.
///
/// Failures inside non-blocking handlers never surface here; they are
/// logged by the [`Emitter`](crate::Emitter) and the run continues.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error in '{section}': {message}")]
    Config { section: String, message: String },

    #[error("component '{component}' depends on '{dependency}', which is not in the active set")]
    DependencyResolution {
        component: String,
        dependency: String,
    },

    #[error("duplicate component name: {0}")]
    DuplicateComponent(String),

    #[error("blocking handler for '{event}' rejected: {source}")]
    BlockingRejection {
        event: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("module '{module}' failed: {source}")]
    ModuleProcessing {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("component '{component}' failed: {source}")]
    ComponentFailed {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Config`].
    pub fn config(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            section: section.into(),
            message: message.into(),
        }
    }

    /// Whether the error was raised before any component started running.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::DependencyResolution { .. } | Self::DuplicateComponent(_)
        )
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
