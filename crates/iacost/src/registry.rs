//! resource type registry and adapter dispatch
//!
//! A [Registry] is built once (usually [Registry::builtin]) and then only read. Dispatching never fails: a
//! declaration either becomes a [CostResource] or is skipped with a [SkipReason].
use crate::resources::{self, AdapterDefaults, AdapterFn, AdapterInput, SchemaMismatch};
use crate::schema::{CostResource, ResourceDeclaration};
use crate::usage::UsageSource;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

/// Binds a resource type to its adapter
#[derive(Debug, Clone, Copy)]
pub struct RegistryItem {
    pub name: &'static str,
    /// Caveats shown to users
    pub notes: &'static [&'static str],
    pub adapter: AdapterFn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No adapter is registered for the resource type
    NoAdapter,
    SchemaMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedResource {
    pub address: String,
    pub resource_type: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatched {
    Resource(CostResource),
    Skipped(SkippedResource),
}

#[derive(Debug)]
pub struct Registry {
    items: HashMap<&'static str, RegistryItem>,
    defaults: AdapterDefaults,
}

impl Registry {
    /// Fails when two items share a resource type
    pub fn new(
        items: impl IntoIterator<Item = RegistryItem>,
        defaults: AdapterDefaults,
    ) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::new();

        for item in items {
            if by_name.insert(item.name, item).is_some() {
                return Err(RegistryError::DuplicateResourceType(item.name));
            }
        }

        Ok(Self {
            items: by_name,
            defaults,
        })
    }

    /// All shipped adapters
    pub fn builtin(defaults: AdapterDefaults) -> Result<Self, RegistryError> {
        let items = resources::azure::registry_items()
            .into_iter()
            .chain(resources::aws::registry_items());
        Self::new(items, defaults)
    }

    pub fn get(&self, resource_type: &str) -> Option<&RegistryItem> {
        self.items.get(resource_type)
    }

    /// Registered items, sorted by resource type
    pub fn items(&self) -> Vec<&RegistryItem> {
        let mut items: Vec<_> = self.items.values().collect();
        items.sort_by_key(|item| item.name);
        items
    }

    pub fn dispatch(&self, declaration: &ResourceDeclaration, usage: &dyn UsageSource) -> Dispatched {
        let skipped = |reason| {
            Dispatched::Skipped(SkippedResource {
                address: declaration.address.clone(),
                resource_type: declaration.resource_type.clone(),
                reason,
            })
        };

        let Some(item) = self.get(&declaration.resource_type) else {
            tracing::debug!(
                address = %declaration.address,
                resource_type = %declaration.resource_type,
                "no adapter"
            );
            return skipped(SkipReason::NoAdapter);
        };

        let input = AdapterInput::new(
            declaration,
            usage.usage_for(&declaration.usage_key),
            &self.defaults,
        );
        match (item.adapter)(&input) {
            Ok(resource) => Dispatched::Resource(resource),
            Err(SchemaMismatch { expected, found }) => {
                tracing::warn!(
                    "Skipping resource {} as it did not have the expected type (expected {expected}, got {found})",
                    declaration.address
                );
                skipped(SkipReason::SchemaMismatch { expected, found })
            }
        }
    }

    /// Dispatch on a pool of `workers` threads, results are in input order
    #[tracing::instrument(level = "debug", skip_all, fields(count = declarations.len()))]
    pub fn dispatch_all(
        &self,
        declarations: &[ResourceDeclaration],
        usage: &dyn UsageSource,
        workers: usize,
    ) -> Result<Vec<Dispatched>, RegistryError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("iacost-dispatch-{i}"))
            .build()?;

        Ok(pool.install(|| {
            declarations
                .par_iter()
                .map(|declaration| self.dispatch(declaration, usage))
                .collect()
        }))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Resource type {0} is registered more than once")]
    DuplicateResourceType(&'static str),
    #[error("Unable to start dispatch workers")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
