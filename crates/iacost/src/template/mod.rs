//! CloudFormation templates
//!
//! Every probe and every full parse of a template goes through the process-wide [TemplateGate] returned by [gate].
//! The gate serializes template parsing so that no two parses ever run at the same time, no matter whether they are
//! issued while sniffing formats or while a provider loads its declarations.
//!
//! Templates are read as YAML (JSON documents are valid YAML). The short-form intrinsic tags of the YAML flavour are
//! rewritten into their long form so the rest of the crate only ever sees one representation:
//!
//! | short form          | long form                        |
//! |---------------------|----------------------------------|
//! | `!Ref Name`         | `{ "Ref": "Name" }`              |
//! | `!GetAtt Db.Port`   | `{ "Fn::GetAtt": ["Db", "Port"] }` |
//! | `!Sub "${A}-x"`     | `{ "Fn::Sub": "${A}-x" }`        |
mod resources;

pub use resources::{
    ApiGatewayV2Api, CfnResource, CfnTag, DbInstance, EcsService, Scalar, SsmParameter,
};

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Serializes every template parse in the process
#[derive(Debug, Default)]
pub struct TemplateGate {
    lock: Mutex<()>,
}

/// The process-wide template gate
pub fn gate() -> &'static TemplateGate {
    static GATE: OnceLock<TemplateGate> = OnceLock::new();
    GATE.get_or_init(TemplateGate::default)
}

impl TemplateGate {
    /// Returns true when `path` parses as a template declaring at least one resource
    pub fn probe(&self, path: &Path) -> bool {
        match self.parse(path) {
            Ok(template) => !template.resources.is_empty(),
            Err(err) => {
                tracing::trace!(path=%path.display(), %err, "not a template");
                false
            }
        }
    }

    pub fn parse(&self, path: &Path) -> Result<Template, TemplateError> {
        // a poisoned lock only means another parse panicked; the guarded state is `()`
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let contents = std::fs::read(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: serde_yaml::Value = serde_yaml::from_slice(&contents)?;
        Template::from_json(yaml_to_json(document))
    }
}

/// A parsed template
#[derive(Debug, Default)]
pub struct Template {
    pub parameters: IndexMap<String, serde_json::Value>,
    pub resources: IndexMap<String, TemplateResource>,
}

#[derive(Debug, Clone)]
pub struct TemplateResource {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: serde_json::Value,
}

impl Template {
    pub fn from_json(document: serde_json::Value) -> Result<Self, TemplateError> {
        let serde_json::Value::Object(mut root) = document else {
            return Err(TemplateError::NotAMapping);
        };

        let parameters = match root.remove("Parameters") {
            Some(serde_json::Value::Object(parameters)) => parameters.into_iter().collect(),
            _ => IndexMap::new(),
        };

        let Some(serde_json::Value::Object(declared)) = root.remove("Resources") else {
            return Err(TemplateError::NoResources);
        };

        let mut resources = IndexMap::new();
        for (logical_id, mut resource) in declared {
            let Some(resource_type) = resource.get("Type").and_then(|t| t.as_str()) else {
                return Err(TemplateError::MissingType(logical_id));
            };
            let resource_type = resource_type.to_string();
            let properties = resource
                .get_mut("Properties")
                .map(serde_json::Value::take)
                .unwrap_or(serde_json::Value::Object(Default::default()));

            resources.insert(
                logical_id.clone(),
                TemplateResource {
                    logical_id,
                    resource_type,
                    properties,
                },
            );
        }

        Ok(Self {
            parameters,
            resources,
        })
    }

    /// Properties of `resource` with `Ref`s to parameters that declare a `Default` replaced by that default
    pub fn resolved_properties(&self, resource: &TemplateResource) -> serde_json::Value {
        let mut properties = resource.properties.clone();
        self.resolve_refs(&mut properties);
        properties
    }

    fn resolve_refs(&self, value: &mut serde_json::Value) {
        if let Some(default) = self.parameter_default(value) {
            *value = default.clone();
            return;
        }

        match value {
            serde_json::Value::Object(map) => {
                for child in map.values_mut() {
                    self.resolve_refs(child);
                }
            }
            serde_json::Value::Array(items) => {
                for child in items {
                    self.resolve_refs(child);
                }
            }
            _ => {}
        }
    }

    /// Default of the parameter `value` refers to, if `value` is a lone `Ref`
    fn parameter_default<'a>(&'a self, value: &serde_json::Value) -> Option<&'a serde_json::Value> {
        let map = value.as_object().filter(|map| map.len() == 1)?;
        let name = map.get("Ref")?.as_str()?;
        self.parameters.get(name)?.get("Default")
    }
}

/// Convert a YAML document into JSON, expanding short-form intrinsic function tags
pub fn yaml_to_json(value: serde_yaml::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Json::Number)
                    .unwrap_or(Json::Null)
            }
        }
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(items) => Json::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => {
            let mut object = serde_json::Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        tracing::debug!(?other, "skipping non-scalar mapping key");
                        continue;
                    }
                };
                object.insert(key, yaml_to_json(value));
            }
            Json::Object(object)
        }
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let name = tag.trim_start_matches('!');
            let inner = yaml_to_json(tagged.value);

            let (key, inner) = match (name, inner) {
                ("Ref", inner) => ("Ref".to_string(), inner),
                ("GetAtt", Json::String(path)) => {
                    let parts = match path.split_once('.') {
                        Some((resource, attribute)) => vec![resource.into(), attribute.into()],
                        None => vec![Json::String(path.clone())],
                    };
                    ("Fn::GetAtt".to_string(), Json::Array(parts))
                }
                (name, inner) => (format!("Fn::{name}"), inner),
            };

            let mut object = serde_json::Map::new();
            object.insert(key, inner);
            Json::Object(object)
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("Unable to read template {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse template")]
    Parse(#[from] serde_yaml::Error),
    #[error("Template is not a mapping")]
    NotAMapping,
    #[error("Template declares no Resources section")]
    NoResources,
    #[error("Resource {0} has no Type")]
    MissingType(String),
}
