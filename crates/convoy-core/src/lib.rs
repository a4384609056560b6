//! Convoy Core Library
//!
//! Event bus, hierarchical configuration, component lifecycle and the asset
//! pipeline that the Convoy runner is assembled from.

pub mod cache;
pub mod component;
pub mod container;
pub mod emit;
pub mod emitter;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pattern;
pub mod pipeline;
pub mod registry;
pub mod sequential;
pub mod telemetry;

pub use cache::fs::VolatileDriver;
pub use cache::{CacheDriver, CacheError, MemoryDriver};

pub use component::{
    Component, ComponentState, ConfigWait, DependencyGate, GateOutcome, Gated, RunOutcome,
    MAIN_CONFIG_KEY,
};

pub use container::{Container, ContainerTransformer};

pub use emit::{EmitComponent, EmitModule, EMIT_COMPONENT};

pub use emitter::{Emitter, Handler, HandlerFuture, RegistrationBatch, DEFAULT_PRIORITY};

pub use error::{PipelineError, Result};

pub use event::{AssetPayload, ModuleStats, ModuleSummary, Payload};

pub use metrics::{MetricsSnapshot, METRICS};

pub use pattern::{AssetFilter, Pattern, PatternError, PatternSet};

pub use pipeline::{ComponentOutcome, Pipeline, PipelineReport};

pub use registry::{ComponentRegistry, RegistryEntry};

pub use sequential::{Sequential, Step};
