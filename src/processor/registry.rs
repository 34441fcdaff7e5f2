// src/processor/registry.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{KbflowError, Result};
use crate::processor::ProcessorBody;
use crate::processor::builtin;
use crate::types::Role;

/// Builds a processor body from a step's parameters, validating them.
pub type ProcessorFactory =
    Arc<dyn Fn(&serde_json::Value) -> anyhow::Result<Arc<dyn ProcessorBody>> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    role: Role,
    factory: ProcessorFactory,
}

/// Maps processor names to the role they implement and a factory.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, e)| (name, e.role)))
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in processors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register (or replace) a processor.
    pub fn register<F>(&mut self, name: impl Into<String>, role: Role, factory: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Arc<dyn ProcessorBody>> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            Entry {
                role,
                factory: Arc::new(factory),
            },
        );
    }

    /// Register a ready-made body that ignores step parameters.
    pub fn register_body(&mut self, name: impl Into<String>, role: Role, body: Arc<dyn ProcessorBody>) {
        self.register(name, role, move |_| Ok(Arc::clone(&body)));
    }

    pub fn role_of(&self, name: &str) -> Option<Role> {
        self.entries.get(name).map(|e| e.role)
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, Role)> {
        self.entries.iter().map(|(name, e)| (name.as_str(), e.role))
    }

    /// Check that `name` exists and implements `role`.
    pub fn check(&self, step: &str, name: &str, role: Role) -> Result<()> {
        self.entry_for(step, name, role).map(|_| ())
    }

    /// Build the body for a step.
    pub fn instantiate(
        &self,
        step: &str,
        name: &str,
        role: Role,
        parameters: &serde_json::Value,
    ) -> Result<Arc<dyn ProcessorBody>> {
        let entry = self.entry_for(step, name, role)?;
        (entry.factory)(parameters).map_err(|err| KbflowError::Instantiation {
            step: step.to_string(),
            processor: name.to_string(),
            message: format!("{err:#}"),
        })
    }

    fn entry_for(&self, step: &str, name: &str, role: Role) -> Result<&Entry> {
        let instantiation = |message: String| KbflowError::Instantiation {
            step: step.to_string(),
            processor: name.to_string(),
            message,
        };
        match self.entries.get(name) {
            None => Err(instantiation("unknown processor".to_string())),
            Some(entry) if entry.role != role => Err(instantiation(format!(
                "processor implements role {}, step requires {role}",
                entry.role
            ))),
            Some(entry) => Ok(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_with_their_roles() {
        let registry = ProcessorRegistry::with_builtins();
        assert_eq!(registry.role_of("ntriples-file"), Some(Role::Source));
        assert_eq!(registry.role_of("ntriples-inline"), Some(Role::Source));
        assert_eq!(registry.role_of("property-alias"), Some(Role::Transformation));
        assert_eq!(registry.role_of("equivalent-value"), Some(Role::Mapping));
        assert_eq!(registry.role_of("manual-mapping"), Some(Role::Mapping));
        assert_eq!(registry.role_of("correspondence-count"), Some(Role::Meta));
    }

    #[test]
    fn role_mismatch_is_an_instantiation_error() {
        let registry = ProcessorRegistry::with_builtins();
        let err = registry
            .instantiate("s", "equivalent-value", Role::Source, &serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, KbflowError::Instantiation { .. }));
    }

    #[test]
    fn bad_parameters_are_an_instantiation_error() {
        let registry = ProcessorRegistry::with_builtins();
        let err = registry
            .instantiate("s", "ntriples-file", Role::Source, &serde_json::json!({ "wrong": 1 }))
            .unwrap_err();
        assert!(matches!(err, KbflowError::Instantiation { ref message, .. } if message.contains("path")));
    }

    #[test]
    fn unknown_processor_is_rejected() {
        let registry = ProcessorRegistry::new();
        assert!(registry.check("s", "nope", Role::Meta).is_err());
    }
}
