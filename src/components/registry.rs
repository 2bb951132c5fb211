//! Typed component registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ComponentError, HalldyllError, Result};

use super::ecs::{EcsService, EcsTaskDefinition};
use super::{Component, ComponentKind, ComponentParams};

/// Builds a component handle from its parameters.
pub type ComponentConstructor =
    Arc<dyn Fn(ComponentParams) -> Result<Box<dyn Component>> + Send + Sync>;

/// Error for a constructor handed parameters of another kind.
fn mismatched(expected: ComponentKind, params: &ComponentParams) -> HalldyllError {
    ComponentError::MismatchedParams {
        kind: expected.to_string(),
        params: params.kind().to_string(),
    }
    .into()
}

/// Maps component kinds to their constructors.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    /// Registered constructors.
    constructors: HashMap<ComponentKind, ComponentConstructor>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry backed by ECS.
    #[must_use]
    pub fn ecs(client: &aws_sdk_ecs::Client) -> Self {
        let mut registry = Self::new();

        let td_client = client.clone();
        registry.register(ComponentKind::TaskDefinition, move |params| match params {
            ComponentParams::TaskDefinition(p) => {
                Ok(Box::new(EcsTaskDefinition::new(td_client.clone(), p)))
            }
            other => Err(mismatched(ComponentKind::TaskDefinition, &other)),
        });

        let service_client = client.clone();
        registry.register(ComponentKind::Service, move |params| match params {
            ComponentParams::Service(p) => Ok(Box::new(EcsService::new(service_client.clone(), p))),
            other => Err(mismatched(ComponentKind::Service, &other)),
        });

        registry
    }

    /// Registers a constructor, replacing any previous one for the kind.
    pub fn register<F>(&mut self, kind: ComponentKind, constructor: F)
    where
        F: Fn(ComponentParams) -> Result<Box<dyn Component>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
    }

    /// Builds a component handle for the given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if no constructor is registered for the kind.
    pub fn load(&self, params: ComponentParams) -> Result<Box<dyn Component>> {
        let kind = params.kind();
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| ComponentError::NotRegistered {
                kind: kind.to_string(),
            })?;

        debug!("Loading {kind} component");
        constructor(params)
    }

    /// Returns true if a constructor is registered for the kind.
    #[must_use]
    pub fn is_registered(&self, kind: ComponentKind) -> bool {
        self.constructors.contains_key(&kind)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::TaskDefinitionParams;
    use crate::testing::{FakeComponents, sample_config};

    #[test]
    fn test_unregistered_kind() {
        let registry = ComponentRegistry::new();
        let params = ComponentParams::TaskDefinition(TaskDefinitionParams::for_instance(
            &sample_config("web").service,
        ));

        assert!(!registry.is_registered(ComponentKind::TaskDefinition));
        assert!(matches!(
            registry.load(params),
            Err(HalldyllError::Component(ComponentError::NotRegistered { .. }))
        ));
    }

    #[test]
    fn test_load_dispatches_on_kind() {
        let fakes = FakeComponents::new();
        let registry = fakes.registry();
        let params = ComponentParams::TaskDefinition(TaskDefinitionParams::for_instance(
            &sample_config("web").service,
        ));

        let component = registry.load(params).expect("registered");
        assert_eq!(component.kind(), ComponentKind::TaskDefinition);
    }
}
