//! Terragrunt directories
//!
//! Only the parts of `terragrunt.hcl` that select and parameterize the Terraform module are read:
//! - `terraform { source = ... }`, local paths only (`../modules//vpc` is supported)
//! - `inputs`, which rank above variable defaults and below overlay files
//! - `locals`, so inputs may refer to them
//!
//! Functions (`find_in_parent_folders()`, ...) and `dependency` outputs are not available; inputs that use them
//! are dropped.
use super::terraform::{self, resolve_locals, Limits, Scope, Variables};
use super::{ProjectMetadata, Provider, ProviderError};
use crate::format::Sniffer;
use crate::hcl_files::HclFiles;
use crate::locator::{is_local_source, local_source_dir, normalize};
use crate::schema::ResourceDeclaration;
use crate::value::Value;
use hcl::eval::Evaluate;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct TerragruntProvider {
    metadata: ProjectMetadata,
    module_dir: PathBuf,
    body: hcl::Body,
    assigned: Variables,
    limits: Limits,
}

/// What is used from a nested-tool configuration file
#[derive(Debug, Default, PartialEq)]
struct TerragruntConfig {
    source: Option<String>,
    inputs: Variables,
}

impl TerragruntProvider {
    pub fn load(
        metadata: ProjectMetadata,
        sniffer: &Sniffer,
        limits: Limits,
    ) -> Result<Self, ProviderError> {
        let config_path = sniffer
            .nested_tool_config(&metadata.path)
            .ok_or_else(|| ProviderError::NoNestedToolConfig(metadata.path.clone()))?;
        let config = read_config(&config_path)?;

        let module_dir = match &config.source {
            None => metadata.path.clone(),
            Some(source) if is_local_source(source) || Path::new(source).is_absolute() => {
                normalize(&metadata.path.join(local_source_dir(source)))
            }
            Some(source) => return Err(ProviderError::UnsupportedSource(source.clone())),
        };
        tracing::debug!(config=%config_path.display(), module=%module_dir.display(), inputs = config.inputs.len(), "terragrunt configuration");

        let body = terraform::load_module(&module_dir)?;
        let mut assigned = config.inputs;
        assigned.extend(terraform::read_var_files(&metadata.var_files)?);

        Ok(Self {
            metadata,
            module_dir,
            body,
            assigned,
            limits,
        })
    }
}

impl Provider for TerragruntProvider {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError> {
        Ok(terraform::evaluate(
            &self.module_dir,
            &self.body,
            self.assigned.clone(),
            self.limits,
        ))
    }
}

fn read_config(path: &Path) -> Result<TerragruntConfig, ProviderError> {
    if path.to_string_lossy().ends_with(".json") {
        return read_json_config(path);
    }

    let mut files = HclFiles::default();
    files.load_file(path)?;
    let body = files.to_body();

    let mut scope = Scope::default();
    resolve_locals(&body, &mut scope);
    let context = scope.context();

    let source = body
        .blocks()
        .filter(|block| block.identifier() == "terraform")
        .flat_map(|block| block.body.attributes())
        .find(|attribute| attribute.key() == "source")
        .and_then(|attribute| match attribute.expr().evaluate(&context) {
            Ok(hcl::Value::String(source)) => Some(source),
            _ => None,
        });

    let mut inputs = Variables::new();
    if let Some(expr) = body
        .attributes()
        .find(|attribute| attribute.key() == "inputs")
        .map(|attribute| attribute.expr())
    {
        match (expr.evaluate(&context), expr) {
            (Ok(hcl::Value::Object(object)), _) => inputs = object,
            // some inputs are not statically known, keep the others
            (Err(_), hcl::Expression::Object(object)) => {
                for (key, value) in object.iter() {
                    let key = match key {
                        hcl::expr::ObjectKey::Identifier(ident) => ident.as_str().to_string(),
                        hcl::expr::ObjectKey::Expression(hcl::Expression::String(key)) => key.clone(),
                        _ => continue,
                    };
                    match value.evaluate(&context) {
                        Ok(value) => {
                            inputs.insert(key, value);
                        }
                        Err(err) => tracing::debug!(input = %key, %err, "dropping input"),
                    }
                }
            }
            (Ok(other), _) => {
                tracing::warn!(path=%path.display(), "inputs is not an object but {other:?}")
            }
            (Err(err), _) => tracing::warn!(path=%path.display(), %err, "unable to evaluate inputs"),
        }
    }

    Ok(TerragruntConfig { source, inputs })
}

fn read_json_config(path: &Path) -> Result<TerragruntConfig, ProviderError> {
    let contents = std::fs::read(path).map_err(|source| ProviderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json: serde_json::Value =
        serde_json::from_slice(&contents).map_err(|source| ProviderError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let source = json
        .pointer("/terraform/source")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let inputs = match json.get("inputs") {
        Some(serde_json::Value::Object(object)) => object
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.clone()).to_hcl()))
            .collect(),
        _ => Variables::new(),
    };

    Ok(TerragruntConfig { source, inputs })
}
