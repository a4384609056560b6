//! Link-time component resolution.

use std::collections::BTreeMap;

use convoy_core::{Component, EmitComponent, Gated, EMIT_COMPONENT};
use convoy_e2e::{E2eComponent, E2E_COMPONENT};
use tracing::{debug, warn};

/// Prefix that may precede a component identifier (`convoy-e2e`).
pub const COMPONENT_PREFIX: &str = "convoy-";

/// Per-run options handed to component constructors.
#[derive(Debug, Clone, Default)]
pub struct FactoryContext {
    pub skip_modules: Vec<String>,
}

pub type Constructor = fn(&FactoryContext) -> Box<dyn Component>;

/// Identifier to constructor table.
pub struct ComponentFactory {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl ComponentFactory {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Factory holding every component linked into this binary.
    pub fn builtin() -> Self {
        let mut factory = Self::empty();
        factory.register(EMIT_COMPONENT, |ctx| -> Box<dyn Component> {
            Box::new(EmitComponent::new().with_skipped_modules(ctx.skip_modules.clone()))
        });
        factory.register(E2E_COMPONENT, |_| -> Box<dyn Component> {
            Box::new(Gated::new(E2eComponent::new()))
        });
        factory
    }

    pub fn register(&mut self, identifier: &'static str, constructor: Constructor) {
        self.constructors.insert(identifier, constructor);
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    /// Canonical identifier: lowercased, without [`COMPONENT_PREFIX`].
    pub fn canonical(identifier: &str) -> String {
        let lower = identifier.trim().to_lowercase();
        lower
            .strip_prefix(COMPONENT_PREFIX)
            .map(str::to_string)
            .unwrap_or(lower)
    }

    pub fn create(&self, identifier: &str, ctx: &FactoryContext) -> Option<Box<dyn Component>> {
        let canonical = Self::canonical(identifier);
        self.constructors.get(canonical.as_str()).map(|ctor| ctor(ctx))
    }

    /// Instantiate `builtin` minus `disabled`, then every `additional`
    /// identifier. Unknown and repeated identifiers are logged and ignored.
    pub fn assemble(
        &self,
        builtin: &[&str],
        disabled: &[String],
        additional: &[String],
        ctx: &FactoryContext,
    ) -> Vec<Box<dyn Component>> {
        let disabled: Vec<String> = disabled.iter().map(|d| Self::canonical(d)).collect();
        let mut seen: Vec<String> = Vec::new();
        let mut components = Vec::new();

        let requested = builtin
            .iter()
            .map(|id| (Self::canonical(id), true))
            .chain(additional.iter().map(|id| (Self::canonical(id), false)));

        for (id, is_builtin) in requested {
            if is_builtin && disabled.contains(&id) {
                debug!(component = %id, "component disabled");
                continue;
            }
            if seen.contains(&id) {
                debug!(component = %id, "component already active");
                continue;
            }
            match self.create(&id, ctx) {
                Some(component) => {
                    seen.push(id);
                    components.push(component);
                }
                None => warn!(component = %id, "unable to resolve component, ignoring it"),
            }
        }

        components
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(components: &[Box<dyn Component>]) -> Vec<&str> {
        components.iter().map(|c| c.name()).collect()
    }

    #[test]
    fn test_builtin_identifiers() {
        assert_eq!(ComponentFactory::builtin().identifiers(), vec!["e2e", "emit"]);
    }

    #[test]
    fn test_canonical_strips_prefix() {
        assert_eq!(ComponentFactory::canonical("Convoy-E2E"), "e2e");
        assert_eq!(ComponentFactory::canonical("emit"), "emit");
    }

    #[test]
    fn test_e2e_is_gated_on_emit() {
        let component = ComponentFactory::builtin()
            .create("e2e", &FactoryContext::default())
            .unwrap();
        assert_eq!(component.dependencies(), vec!["emit"]);
    }

    #[test]
    fn test_assemble_filters_and_dedups() {
        let factory = ComponentFactory::builtin();
        let components = factory.assemble(
            &["emit", "e2e"],
            &["e2e".to_string()],
            &[
                "convoy-emit".to_string(),
                "does-not-exist".to_string(),
                "convoy-e2e".to_string(),
            ],
            &FactoryContext::default(),
        );
        assert_eq!(names(&components), vec!["emit", "e2e"]);
    }
}
