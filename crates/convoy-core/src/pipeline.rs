//! Run orchestration for an active component set.
//!
//! A run goes through four phases:
//!
//! 1. validation: names are unique and every declared dependency is in the
//!    active set
//! 2. config: each component resolves its configuration, in declaration
//!    order
//! 3. attach: every ready component subscribes inside one registration
//!    batch, then readiness (or skip) signals are emitted
//! 4. run: ready components run concurrently; the first failure aborts the
//!    rest

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::component::{Component, ComponentState, RunOutcome};
use crate::container::Container;
use crate::emitter::Emitter;
use crate::error::{PipelineError, Result};
use crate::event::{Payload, COMPONENT_READY, COMPONENT_SKIPPED};
use crate::metrics::{MetricsSnapshot, METRICS};

/// Final state of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentOutcome {
    pub name: String,
    pub state: ComponentState,

    /// Wall time spent in `run`; zero for components skipped at config time.
    pub duration_ms: u64,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Outcomes in declaration order.
    pub outcomes: Vec<ComponentOutcome>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Bus activity during the run. Counters are process-wide, so runs
    /// that overlap see each other's activity.
    pub metrics: MetricsSnapshot,
}

impl PipelineReport {
    /// Number of components that ran to completion.
    pub fn ran_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == ComponentState::Done)
            .count()
    }

    /// Number of components skipped for lack of configuration.
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == ComponentState::Skipped)
            .count()
    }

    pub fn state_of(&self, name: &str) -> Option<ComponentState> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.state)
    }
}

/// Orchestrator owning the active component set and its event bus.
#[derive(Default)]
pub struct Pipeline {
    emitter: Emitter,
    components: Vec<Box<dyn Component>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing bus, e.g. one a caller has already subscribed to.
    pub fn with_emitter(emitter: Emitter) -> Self {
        Self {
            emitter,
            components: Vec::new(),
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn add<C: Component + 'static>(&mut self, component: C) -> &mut Self {
        self.components.push(Box::new(component));
        self
    }

    pub fn add_boxed(&mut self, component: Box<dyn Component>) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Names of the active components in declaration order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Check name uniqueness and dependency presence.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for component in &self.components {
            if !names.insert(component.name()) {
                return Err(PipelineError::DuplicateComponent(
                    component.name().to_string(),
                ));
            }
        }

        for component in &self.components {
            if let Some(missing) = component
                .dependencies()
                .into_iter()
                .find(|dep| !names.contains(dep.as_str()))
            {
                return Err(PipelineError::DependencyResolution {
                    component: component.name().to_string(),
                    dependency: missing,
                });
            }
        }

        Ok(())
    }

    /// Execute every phase against `root`.
    ///
    /// Setup errors are returned before any component runs. A component
    /// failure aborts the remaining runs and is returned as
    /// [`PipelineError::ComponentFailed`].
    pub async fn run(&mut self, root: Arc<Container>) -> Result<PipelineReport> {
        let start = Instant::now();
        let baseline = METRICS.snapshot();
        self.validate()?;
        let emitter = self.emitter.clone();

        info!(components = %self.component_names().join(", "), "starting pipeline");

        let mut states = Vec::with_capacity(self.components.len());
        for component in self.components.iter_mut() {
            debug!(component = %component.name(), state = %ComponentState::ConfigPending, "resolving config");
            let state = match component.wait_config(&emitter, &root).await? {
                Some(_) => ComponentState::ConfigReady,
                None => ComponentState::Skipped,
            };
            debug!(component = %component.name(), state = %state, "config phase finished");
            states.push(state);
        }

        let batch = emitter.begin_batch();
        for (component, state) in self.components.iter().zip(&states) {
            if *state == ComponentState::ConfigReady {
                component.attach(&emitter);
            }
        }
        for (component, state) in self.components.iter().zip(&states) {
            let event = match state {
                ComponentState::ConfigReady => COMPONENT_READY,
                _ => COMPONENT_SKIPPED,
            };
            emitter
                .emit_blocking(event, Payload::Component(component.name().to_string()))
                .await?;
        }
        batch.close();

        let runs = self
            .components
            .iter()
            .zip(&states)
            .filter(|(_, state)| **state == ComponentState::ConfigReady)
            .map(|(component, _)| {
                let emitter = &emitter;
                async move {
                    let name = component.name().to_string();
                    let started = Instant::now();
                    info!(component = %name, "component running");

                    let outcome: RunOutcome = component
                        .run(emitter)
                        .await
                        .map_err(|source| PipelineError::ComponentFailed {
                            component: name.clone(),
                            source,
                        })?;

                    let state = outcome.state();
                    let duration_ms = started.elapsed().as_millis() as u64;
                    info!(component = %name, state = %state, duration_ms, "component finished");
                    Ok::<_, PipelineError>(ComponentOutcome {
                        name,
                        state,
                        duration_ms,
                    })
                }
            });

        let finished = match futures::future::try_join_all(runs).await {
            Ok(finished) => finished,
            Err(e) => {
                error!(error = %e, "pipeline aborted");
                METRICS.snapshot().since(baseline).log();
                return Err(e);
            }
        };

        let mut finished = finished.into_iter();
        let outcomes: Vec<ComponentOutcome> = self
            .components
            .iter()
            .zip(&states)
            .filter_map(|(component, state)| match state {
                ComponentState::ConfigReady => finished.next(),
                _ => Some(ComponentOutcome {
                    name: component.name().to_string(),
                    state: ComponentState::Skipped,
                    duration_ms: 0,
                }),
            })
            .collect();

        let report = PipelineReport {
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
            metrics: METRICS.snapshot().since(baseline),
        };
        info!(
            ran = report.ran_count(),
            skipped = report.skipped_count(),
            duration_ms = report.duration_ms,
            "pipeline finished"
        );
        report.metrics.log();
        Ok(report)
    }
}
