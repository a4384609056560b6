//! Dependency gating through readiness events.
//!
//! A dependency satisfies its dependents by emitting
//! [`COMPONENT_READY`](crate::event::COMPONENT_READY) with its name. The
//! pipeline does this for every component after the config phase, but any
//! component may emit the signal itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Component, RunOutcome};
use crate::container::Container;
use crate::emitter::Emitter;
use crate::error::Result;
use crate::event::{COMPONENT_READY, COMPONENT_SKIPPED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Ready,
    Skipped,
}

/// Result of waiting on a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Every dependency signalled readiness.
    Satisfied,
    /// The named dependency was skipped.
    Unsatisfied(String),
}

/// Tracks readiness signals for a fixed list of dependencies.
pub struct DependencyGate {
    dependencies: Vec<String>,
    seen: Arc<watch::Sender<BTreeMap<String, Signal>>>,
}

impl DependencyGate {
    pub fn new(dependencies: Vec<String>) -> Self {
        let (tx, _rx) = watch::channel(BTreeMap::new());
        Self {
            dependencies,
            seen: Arc::new(tx),
        }
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Subscribe to readiness signals. Must happen before they are emitted.
    pub fn attach(&self, emitter: &Emitter) {
        for (event, signal) in [
            (COMPONENT_READY, Signal::Ready),
            (COMPONENT_SKIPPED, Signal::Skipped),
        ] {
            let seen = self.seen.clone();
            let wanted = self.dependencies.clone();
            emitter.on_blocking(event, move |payload| {
                if let Some(name) = payload.as_component() {
                    if wanted.iter().any(|d| d == name) {
                        debug!(dependency = %name, ?signal, "dependency signal observed");
                        let name = name.to_string();
                        seen.send_modify(|map| {
                            map.insert(name, signal);
                        });
                    }
                }
                futures::future::ready(Ok(()))
            });
        }
    }

    fn evaluate(&self, seen: &BTreeMap<String, Signal>) -> Option<GateOutcome> {
        let mut pending = false;
        for dependency in &self.dependencies {
            match seen.get(dependency) {
                Some(Signal::Skipped) => return Some(GateOutcome::Unsatisfied(dependency.clone())),
                Some(Signal::Ready) => {}
                None => pending = true,
            }
        }
        (!pending).then_some(GateOutcome::Satisfied)
    }

    /// Resolve once every dependency has signalled.
    pub async fn wait(&self) -> GateOutcome {
        let mut rx = self.seen.subscribe();
        loop {
            if let Some(outcome) = self.evaluate(&rx.borrow_and_update()) {
                return outcome;
            }
            // The sender lives as long as `self`, so this cannot close.
            if rx.changed().await.is_err() {
                return GateOutcome::Satisfied;
            }
        }
    }
}

/// Wraps a component so its `run` waits for its dependencies.
pub struct Gated<C> {
    inner: C,
    gate: DependencyGate,
}

impl<C: Component> Gated<C> {
    pub fn new(inner: C) -> Self {
        let gate = DependencyGate::new(inner.dependencies());
        Self { inner, gate }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Component> Component for Gated<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dependencies(&self) -> Vec<String> {
        self.gate.dependencies().to_vec()
    }

    fn is_mandatory(&self) -> bool {
        self.inner.is_mandatory()
    }

    async fn wait_config(
        &mut self,
        emitter: &Emitter,
        root: &Arc<Container>,
    ) -> Result<Option<Arc<Container>>> {
        self.inner.wait_config(emitter, root).await
    }

    async fn prepare_config(&self, section: Container) -> Result<Container> {
        self.inner.prepare_config(section).await
    }

    fn attach(&self, emitter: &Emitter) {
        self.gate.attach(emitter);
        self.inner.attach(emitter);
    }

    async fn run(&self, emitter: &Emitter) -> anyhow::Result<RunOutcome> {
        match self.gate.wait().await {
            GateOutcome::Satisfied => self.inner.run(emitter).await,
            GateOutcome::Unsatisfied(dependency) => {
                warn!(
                    component = %self.name(),
                    dependency = %dependency,
                    "dependency was skipped, skipping"
                );
                Ok(RunOutcome::Skipped)
            }
        }
    }
}
