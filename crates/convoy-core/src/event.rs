//! Event names and payloads exchanged between the core and components.
//!
//! The names are the wire contract: plugins integrate by subscribing to or
//! publishing on them, with no compile-time knowledge of each other.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::container::Container;

/// Non-blocking: all modules are about to be processed.
pub const MODULES_PROCESS_START: &str = "modules.process.start";

/// Non-blocking, deferred: every module has been processed.
pub const MODULES_PROCESS_END: &str = "modules.process.end";

/// Blocking: a single module passed `check` and is about to be walked.
pub const MODULE_PROCESS_START: &str = "module.process.start";

/// Blocking: a single module has been fully walked.
pub const MODULE_PROCESS_END: &str = "module.process.end";

/// Blocking: one accepted file was discovered by a module.
pub const MODULE_EMIT_ASSET: &str = "module.emit.asset";

/// Blocking: a component finished its config phase and may satisfy dependents.
pub const COMPONENT_READY: &str = "component.ready";

/// Blocking: a component resolved to skip; its dependents cannot run.
pub const COMPONENT_SKIPPED: &str = "component.skipped";

/// Counters kept per module while it is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModuleStats {
    pub total: u64,
    pub processed: u64,
    pub ignored: u64,
}

impl ModuleStats {
    /// Record one file and whether it was accepted.
    pub fn record(&mut self, accepted: bool) {
        self.total += 1;
        if accepted {
            self.processed += 1;
        } else {
            self.ignored += 1;
        }
    }
}

/// Snapshot of a module handed to module-level subscribers.
#[derive(Debug, Clone)]
pub struct ModuleSummary {
    pub key: String,
    pub root: PathBuf,
    pub stats: ModuleStats,
    pub container: Arc<Container>,
}

/// One file discovered by a module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetPayload {
    /// Path relative to the module root, `/`-separated.
    pub file: String,

    /// Absolute path on disk.
    pub file_abs: PathBuf,

    /// Key of the module that discovered the file.
    pub module: String,

    /// The module's `meta` section, `Value::Null` when absent.
    pub metadata: Value,
}

/// Data carried by an emitted event.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Component(String),
    Modules(Vec<ModuleSummary>),
    Module(ModuleSummary),
    Asset(AssetPayload),
    Json(Value),
}

impl Payload {
    /// The asset, when this payload carries one.
    pub fn as_asset(&self) -> Option<&AssetPayload> {
        match self {
            Payload::Asset(asset) => Some(asset),
            _ => None,
        }
    }

    /// The module summary, when this payload carries one.
    pub fn as_module(&self) -> Option<&ModuleSummary> {
        match self {
            Payload::Module(module) => Some(module),
            _ => None,
        }
    }

    /// The component name, when this payload carries one.
    pub fn as_component(&self) -> Option<&str> {
        match self {
            Payload::Component(name) => Some(name),
            _ => None,
        }
    }
}
