//! resource adapters
//!
//! An adapter reads one [ResourceDeclaration] into a typed resource, merges the usage overlay and builds the
//! [CostResource]. Adapters are plain functions: they only read their input and can run concurrently.
//!
//! Each typed resource follows the same steps:
//! 1. `from_*` extracts fields, replacing absent ones with defaults
//! 2. `populate_usage` overlays usage values
//! 3. `build_resource` computes cost components from the final field values
pub mod aws;
pub mod azure;

use crate::schema::{CostResource, ResourceDeclaration, SchemaHandle};
use crate::template::{CfnResource, CfnTag};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hours in an average month
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Values used when a declaration does not say
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterDefaults {
    /// Region of AWS resources whose source does not carry one
    pub region: String,
    /// Location of Azure resources without a `location`
    pub azure_region: String,
    /// Allocated storage of database instances whose template does not state a number
    pub db_allocated_storage_gb: f64,
}

impl Default for AdapterDefaults {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            azure_region: "eastus".to_string(),
            db_allocated_storage_gb: 100.0,
        }
    }
}

#[derive(derive_new::new, Debug, Clone, Copy)]
pub struct AdapterInput<'a> {
    pub declaration: &'a ResourceDeclaration,
    pub usage: Option<&'a Value>,
    pub defaults: &'a AdapterDefaults,
}

impl AdapterInput<'_> {
    /// Usage overlay of the resource, `Null` if none was supplied
    pub fn usage(&self) -> &Value {
        static NO_USAGE: Value = Value::Null;
        self.usage.unwrap_or(&NO_USAGE)
    }

    fn terraform(&self) -> Result<&Value, SchemaMismatch> {
        match &self.declaration.handle {
            SchemaHandle::Terraform(values) => Ok(values),
            other => Err(SchemaMismatch::new("terraform object", other.describe())),
        }
    }

    fn cloudformation(&self) -> Result<&CfnResource, SchemaMismatch> {
        match &self.declaration.handle {
            SchemaHandle::CloudFormation(resource) => Ok(resource),
            other => Err(SchemaMismatch::new("cloudformation resource", other.describe())),
        }
    }

    /// Region of a resource whose source does not carry one
    fn fallback_region(&self) -> String {
        self.declaration
            .provider_region
            .clone()
            .unwrap_or_else(|| self.defaults.region.clone())
    }
}

/// The declaration handle does not have the shape the adapter reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaMismatch {
    pub expected: String,
    pub found: String,
}

impl SchemaMismatch {
    pub fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl std::fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

pub type AdapterFn = fn(&AdapterInput) -> Result<CostResource, SchemaMismatch>;

/// `tags = { ... }` of a Terraform resource
pub(crate) fn terraform_tags(values: &Value) -> BTreeMap<String, String> {
    let Some(tags) = values.get("tags").and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    tags.iter()
        .filter_map(|(key, value)| Some((key.clone(), scalar_string(value)?)))
        .collect()
}

/// `Tags: [{Key, Value}]` of a CloudFormation resource
pub(crate) fn cfn_tag_list(tags: Option<&[CfnTag]>) -> BTreeMap<String, String> {
    tags.unwrap_or_default()
        .iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect()
}

/// `Tags: {key: value}` of a CloudFormation resource
pub(crate) fn cfn_tag_map(tags: Option<&serde_json::Value>) -> BTreeMap<String, String> {
    let Some(serde_json::Value::Object(tags)) = tags else {
        return BTreeMap::new();
    };

    tags.iter()
        .filter_map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Decimal(d) => Some(d.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}
