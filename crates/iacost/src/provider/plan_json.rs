//! Terraform plan and state JSON (`terraform show -json`)
use super::{ProjectMetadata, Provider, ProviderError};
use crate::format::strip_wrapper;
use crate::schema::ResourceDeclaration;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Module {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    child_modules: Vec<Module>,
}

#[derive(Deserialize, Debug)]
struct Resource {
    address: String,
    #[serde(default)]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    provider_name: String,
    #[serde(default)]
    values: serde_json::Value,
}

#[derive(Deserialize, Debug, Default)]
struct Values {
    #[serde(default)]
    root_module: Module,
}

#[derive(Deserialize, Debug)]
struct ProviderConfig {
    #[serde(default)]
    name: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    expressions: serde_json::Value,
}

#[derive(Deserialize, Debug, Default)]
struct Configuration {
    #[serde(default)]
    provider_config: HashMap<String, ProviderConfig>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct Plan {
    planned_values: Option<Values>,
    #[serde(default)]
    configuration: Configuration,
}

#[derive(Deserialize, Debug)]
struct State {
    values: Option<Values>,
}

impl Plan {
    pub(crate) fn parse(path: &Path, contents: &[u8]) -> Result<Self, ProviderError> {
        let (json, _) = strip_wrapper(contents);
        serde_json::from_slice(json).map_err(|source| ProviderError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Constant `region` of each unaliased provider block, by provider name
    ///
    /// Root module blocks (`aws`) take precedence over those of child modules (`module.db:aws`).
    fn provider_regions(&self) -> HashMap<&str, String> {
        let mut configs: Vec<_> = self
            .configuration
            .provider_config
            .iter()
            .filter(|(_, config)| config.alias.is_none())
            .collect();
        configs.sort_by(|(a, _), (b, _)| (!a.contains(':'), a).cmp(&(!b.contains(':'), b)));

        configs
            .into_iter()
            .filter_map(|(_, config)| {
                let region = config
                    .expressions
                    .pointer("/region/constant_value")?
                    .as_str()?;
                Some((config.name.as_str(), region.to_string()))
            })
            .collect()
    }

    pub(crate) fn declarations(&self) -> Vec<ResourceDeclaration> {
        let regions = self.provider_regions();
        let mut declarations = vec![];
        if let Some(values) = &self.planned_values {
            collect(&values.root_module, &regions, &mut declarations);
        }
        declarations
    }
}

/// Walk `module` and its children depth first, skipping data sources
fn collect(
    module: &Module,
    regions: &HashMap<&str, String>,
    declarations: &mut Vec<ResourceDeclaration>,
) {
    tracing::trace!(module = module.address.as_deref().unwrap_or("root"), "collecting resources");

    for resource in &module.resources {
        if resource.mode == "data" {
            continue;
        }

        // registry.terraform.io/hashicorp/aws -> aws
        let provider = resource
            .provider_name
            .rsplit('/')
            .next()
            .unwrap_or_default();
        declarations.push(
            ResourceDeclaration::terraform(
                &resource.address,
                &resource.resource_type,
                resource.values.clone().into(),
            )
            .with_provider_region(regions.get(provider).cloned()),
        );
    }

    for child in &module.child_modules {
        collect(child, regions, declarations);
    }
}

fn read(metadata: &ProjectMetadata) -> Result<Vec<u8>, ProviderError> {
    std::fs::read(&metadata.path).map_err(|source| ProviderError::Io {
        path: metadata.path.clone(),
        source,
    })
}

#[derive(Debug)]
pub struct PlanJsonProvider {
    metadata: ProjectMetadata,
    plan: Plan,
}

impl PlanJsonProvider {
    pub fn load(metadata: ProjectMetadata) -> Result<Self, ProviderError> {
        let plan = Plan::parse(&metadata.path, &read(&metadata)?)?;
        if plan.planned_values.is_none() {
            return Err(ProviderError::MissingField {
                path: metadata.path,
                field: "planned_values",
            });
        }

        Ok(Self { metadata, plan })
    }
}

impl Provider for PlanJsonProvider {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError> {
        Ok(self.plan.declarations())
    }
}

#[derive(Debug)]
pub struct StateJsonProvider {
    metadata: ProjectMetadata,
    values: Values,
}

impl StateJsonProvider {
    pub fn load(metadata: ProjectMetadata) -> Result<Self, ProviderError> {
        let contents = read(&metadata)?;
        let (json, _) = strip_wrapper(&contents);
        let state: State = serde_json::from_slice(json).map_err(|source| ProviderError::Json {
            path: metadata.path.clone(),
            source,
        })?;

        let Some(values) = state.values else {
            return Err(ProviderError::MissingField {
                path: metadata.path,
                field: "values",
            });
        };

        Ok(Self { metadata, values })
    }
}

impl Provider for StateJsonProvider {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError> {
        let mut declarations = vec![];
        collect(&self.values.root_module, &HashMap::new(), &mut declarations);
        Ok(declarations)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::SourceFormat;
    use crate::schema::SchemaHandle;
    use pretty_assertions::assert_eq;

    const PLAN: &str = r#"{
      "format_version": "1.2",
      "planned_values": {
        "root_module": {
          "resources": [
            {
              "address": "azurerm_linux_virtual_machine.web",
              "mode": "managed",
              "type": "azurerm_linux_virtual_machine",
              "provider_name": "registry.terraform.io/hashicorp/azurerm",
              "values": { "size": "Standard_B2s" }
            },
            {
              "address": "data.aws_ami.ubuntu",
              "mode": "data",
              "type": "aws_ami",
              "provider_name": "registry.terraform.io/hashicorp/aws",
              "values": {}
            }
          ],
          "child_modules": [
            {
              "address": "module.db",
              "resources": [
                {
                  "address": "module.db.aws_db_instance.this",
                  "mode": "managed",
                  "type": "aws_db_instance",
                  "provider_name": "registry.terraform.io/hashicorp/aws",
                  "values": { "instance_class": "db.t3.micro" }
                }
              ]
            }
          ]
        }
      },
      "configuration": {
        "provider_config": {
          "aws": {
            "name": "aws",
            "full_name": "registry.terraform.io/hashicorp/aws",
            "expressions": { "region": { "constant_value": "eu-central-1" } }
          },
          "module.db:aws": {
            "name": "aws",
            "full_name": "registry.terraform.io/hashicorp/aws",
            "module_address": "module.db",
            "expressions": { "region": { "constant_value": "ap-south-1" } }
          },
          "aws.west": {
            "name": "aws",
            "alias": "west",
            "expressions": { "region": { "constant_value": "us-west-2" } }
          }
        }
      }
    }"#;

    fn metadata(path: &Path, format: SourceFormat) -> ProjectMetadata {
        ProjectMetadata::new("test".into(), format, path.to_path_buf(), None, vec![])
    }

    #[test]
    fn root_provider_region_wins() {
        let plan = Plan::parse(Path::new("plan.json"), PLAN.as_bytes()).unwrap();
        let regions = plan.provider_regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions.get("aws").map(String::as_str), Some("eu-central-1"));
    }

    #[test]
    fn plan_walks_child_modules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, PLAN).unwrap();

        let provider = PlanJsonProvider::load(metadata(&path, SourceFormat::PlanJson)).unwrap();
        let declarations = provider.declarations().unwrap();

        let summary: Vec<_> = declarations
            .iter()
            .map(|d| (d.address.as_str(), d.provider_region.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("azurerm_linux_virtual_machine.web", None),
                ("module.db.aws_db_instance.this", Some("eu-central-1")),
            ]
        );

        let SchemaHandle::Terraform(values) = &declarations[0].handle else {
            panic!("expected terraform values");
        };
        assert_eq!(values.string("size"), "Standard_B2s");
    }

    #[test]
    fn state_uses_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"format_version":"1.0","values":{"root_module":{"resources":[
                {"address":"azurerm_application_gateway.gw","mode":"managed","type":"azurerm_application_gateway","values":{}}
            ]}}}"#,
        )
        .unwrap();

        let provider = StateJsonProvider::load(metadata(&path, SourceFormat::StateJson)).unwrap();
        let declarations = provider.declarations().unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].resource_type, "azurerm_application_gateway");
    }

    #[test]
    fn plan_without_planned_values_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"format_version":"1.2"}"#).unwrap();

        let err = PlanJsonProvider::load(metadata(&path, SourceFormat::PlanJson)).unwrap_err();
        assert!(matches!(err, ProviderError::MissingField { field: "planned_values", .. }));
    }
}
