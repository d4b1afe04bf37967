//! providers: one per unit of work
//!
//! A unit of work is either a single artifact (plan, state, template) or a configuration root together with the
//! overlay files of one environment. [build_providers] constructs the providers of many units on a worker pool; a
//! unit whose provider cannot be constructed is logged and dropped without affecting the others.
mod functions;
pub mod plan_binary;
pub mod plan_json;
pub mod template;
pub mod terraform;
pub mod terragrunt;

pub use plan_binary::{PlanRenderer, TerraformCli};

use crate::format::{SourceFormat, Sniffer};
use crate::registry::{Dispatched, Registry, RegistryError, SkippedResource};
use crate::schema::{CostResource, ResourceDeclaration};
use crate::usage::UsageSource;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Produces the resource declarations of one unit of work
pub trait Provider: Send + Sync + std::fmt::Debug {
    fn metadata(&self) -> &ProjectMetadata;

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError>;
}

#[derive(derive_new::new, Debug, Clone, PartialEq, Serialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub format: SourceFormat,
    pub path: PathBuf,
    pub environment: Option<String>,
    /// Overlay files in evaluation order (later files take precedence)
    pub var_files: Vec<PathBuf>,
}

/// Input of [build_providers]
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOfWork {
    Artifact {
        name: String,
        path: PathBuf,
        format: SourceFormat,
    },
    Root {
        name: String,
        path: PathBuf,
        is_nested_tool: bool,
        environment: Option<String>,
        /// Absolute paths, in evaluation order
        var_files: Vec<PathBuf>,
    },
}

impl UnitOfWork {
    pub fn name(&self) -> &str {
        match self {
            UnitOfWork::Artifact { name, .. } | UnitOfWork::Root { name, .. } => name,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            UnitOfWork::Artifact { path, .. } | UnitOfWork::Root { path, .. } => path,
        }
    }
}

/// Shared collaborators of all providers of a run
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub sniffer: Sniffer,
    pub plan_renderer: Arc<dyn PlanRenderer>,
    /// Bounds of Terraform/Terragrunt evaluation
    pub limits: terraform::Limits,
}

impl Default for ProviderContext {
    fn default() -> Self {
        Self {
            sniffer: Sniffer::default(),
            plan_renderer: Arc::new(TerraformCli::default()),
            limits: terraform::Limits::default(),
        }
    }
}

/// Construct the provider of one unit
pub fn build_provider(
    unit: &UnitOfWork,
    context: &ProviderContext,
) -> Result<Box<dyn Provider>, ProviderError> {
    match unit {
        UnitOfWork::Artifact { name, path, format } => {
            let metadata = ProjectMetadata::new(name.clone(), *format, path.clone(), None, vec![]);
            let provider: Box<dyn Provider> = match format {
                SourceFormat::PlanJson => Box::new(plan_json::PlanJsonProvider::load(metadata)?),
                SourceFormat::StateJson => Box::new(plan_json::StateJsonProvider::load(metadata)?),
                SourceFormat::PlanBinary => Box::new(plan_binary::PlanBinaryProvider::load(
                    metadata,
                    context.plan_renderer.clone(),
                )?),
                SourceFormat::DeclarativeTemplate => {
                    Box::new(template::TemplateProvider::load(metadata)?)
                }
                other => return Err(ProviderError::NotAnArtifact(*other)),
            };
            Ok(provider)
        }
        UnitOfWork::Root {
            name,
            path,
            is_nested_tool,
            environment,
            var_files,
        } => {
            let format = if *is_nested_tool {
                SourceFormat::NestedToolDir
            } else {
                SourceFormat::ImperativeDir
            };
            let metadata = ProjectMetadata::new(
                name.clone(),
                format,
                path.clone(),
                environment.clone(),
                var_files.clone(),
            );

            let provider: Box<dyn Provider> = if *is_nested_tool {
                Box::new(terragrunt::TerragruntProvider::load(
                    metadata,
                    &context.sniffer,
                    context.limits,
                )?)
            } else {
                Box::new(terraform::TerraformDirProvider::load(
                    metadata,
                    context.limits,
                )?)
            };
            Ok(provider)
        }
    }
}

/// Construct the providers of all `units` on a pool of `workers` threads
///
/// The result keeps the order of `units`. Units that fail are logged and left out.
#[tracing::instrument(level = "debug", skip_all, fields(units = units.len()))]
pub fn build_providers(
    units: &[UnitOfWork],
    context: &ProviderContext,
    workers: usize,
) -> Result<Vec<Box<dyn Provider>>, ProviderError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("iacost-provider-{i}"))
        .build()?;

    let providers: Vec<Option<Box<dyn Provider>>> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| match build_provider(unit, context) {
                Ok(provider) => Some(provider),
                Err(err) => {
                    tracing::warn!(
                        project = unit.name(),
                        path = %unit.path().display(),
                        error = &err as &dyn std::error::Error,
                        "skipping project"
                    );
                    None
                }
            })
            .collect()
    });

    Ok(providers.into_iter().flatten().collect())
}

/// Costed resources of one provider
#[derive(Debug, Clone, Serialize)]
pub struct Breakdown {
    pub metadata: ProjectMetadata,
    pub resources: Vec<CostResource>,
    pub skipped: Vec<SkippedResource>,
}

/// Dispatch every declaration of `provider`
pub fn breakdown(
    provider: &dyn Provider,
    registry: &Registry,
    usage: &dyn UsageSource,
    workers: usize,
) -> Result<Breakdown, ProviderError> {
    let declarations = provider.declarations()?;
    let mut resources = vec![];
    let mut skipped = vec![];

    for outcome in registry.dispatch_all(&declarations, usage, workers)? {
        match outcome {
            Dispatched::Resource(resource) => resources.push(resource),
            Dispatched::Skipped(resource) => skipped.push(resource),
        }
    }

    Ok(Breakdown {
        metadata: provider.metadata().clone(),
        resources,
        skipped,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("Unable to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} is missing `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    #[error(transparent)]
    Template(#[from] crate::template::TemplateError),
    #[error(transparent)]
    Load(#[from] crate::hcl_files::LoadError),
    #[error("Invalid variable file {path}: {reason}")]
    InvalidVarFile { path: PathBuf, reason: String },
    #[error("Unable to render plan {path}: {message}")]
    Render { path: PathBuf, message: String },
    #[error("Module source {0} is not a local path")]
    UnsupportedSource(String),
    #[error("No terragrunt configuration in {0}")]
    NoNestedToolConfig(PathBuf),
    #[error("{0} is not a single artifact format")]
    NotAnArtifact(SourceFormat),
    #[error("Unable to start provider workers")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn failed_units_do_not_affect_siblings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("good")).unwrap();
        std::fs::write(
            dir.path().join("good/main.tf"),
            r#"resource "azurerm_linux_virtual_machine" "web" { size = "Standard_B1s" }"#,
        )
        .unwrap();

        let units = vec![
            UnitOfWork::Root {
                name: "missing".into(),
                path: dir.path().join("missing"),
                is_nested_tool: false,
                environment: None,
                var_files: vec![],
            },
            UnitOfWork::Root {
                name: "good".into(),
                path: dir.path().join("good"),
                is_nested_tool: false,
                environment: None,
                var_files: vec![],
            },
            UnitOfWork::Artifact {
                name: "plan".into(),
                path: dir.path().join("plan.json"),
                format: SourceFormat::PlanJson,
            },
        ];

        let providers = build_providers(&units, &ProviderContext::default(), 4).unwrap();
        let names: Vec<_> = providers.iter().map(|p| p.metadata().name.as_str()).collect();
        assert_eq!(names, vec!["good"]);
    }
}
