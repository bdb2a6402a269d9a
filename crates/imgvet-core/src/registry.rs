//! Name → factory registry for checks.
//!
//! Adding a policy means registering a factory here; the engine only ever
//! sees `Arc<dyn Check>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::check::{Check, Collaborators};
use crate::checks::{ApprovedCheck, DiyCheck, APPROVED_CHECK, DIY_CHECK};
use crate::config::VetConfig;
use crate::error::{VetError, VetResult};

/// Builds a check from the shared collaborators and the engine config.
pub type CheckFactory = Arc<dyn Fn(&Collaborators, &VetConfig) -> Arc<dyn Check> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CheckRegistry {
    factories: BTreeMap<String, CheckFactory>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in policy.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(APPROVED_CHECK, |collaborators, _| {
            ApprovedCheck::factory(collaborators)
        });
        registry.register(DIY_CHECK, |_, config| {
            DiyCheck::new(config.trusted_prefixes.iter().cloned()).into_check()
        });
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Collaborators, &VetConfig) -> Arc<dyn Check> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build `config.enabled_checks` in configured order. Repeated names are
    /// collapsed; an unknown name fails the whole build.
    pub fn build(
        &self,
        collaborators: &Collaborators,
        config: &VetConfig,
    ) -> VetResult<Vec<Arc<dyn Check>>> {
        let mut seen = std::collections::HashSet::new();
        let mut checks = Vec::new();
        for name in &config.enabled_checks {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| VetError::UnknownCheck(name.clone()))?;
            checks.push(factory(collaborators, config));
        }
        if checks.is_empty() {
            return Err(VetError::NoChecks);
        }
        Ok(checks)
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}
