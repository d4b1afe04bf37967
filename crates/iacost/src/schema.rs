//! format independent resource model
//!
//! Providers produce [ResourceDeclaration]s, adapters turn them into [CostResource]s.
use crate::template::CfnResource;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// The format specific part of a declaration
#[derive(Debug, Clone)]
pub enum SchemaHandle {
    /// Attribute values of a Terraform resource (from plan/state JSON or static evaluation)
    Terraform(Value),
    /// Typed properties of a CloudFormation resource
    CloudFormation(CfnResource),
}

impl SchemaHandle {
    /// Short description used in mismatch warnings
    pub fn describe(&self) -> String {
        match self {
            SchemaHandle::Terraform(value) => format!("terraform {}", value.kind()),
            SchemaHandle::CloudFormation(CfnResource::Other { resource_type, .. }) => {
                format!("untyped cloudformation {resource_type}")
            }
            SchemaHandle::CloudFormation(resource) => {
                format!("cloudformation {}", resource.type_name())
            }
        }
    }
}

/// One resource found by a provider, ready for dispatch
#[derive(Debug, Clone)]
pub struct ResourceDeclaration {
    /// Unique within a provider, e.g. `module.vpc.aws_vpc.this[0]` or a template logical id
    pub address: String,
    pub resource_type: String,
    pub handle: SchemaHandle,
    /// Key of the usage overlay entry for this resource
    pub usage_key: String,
    /// Region configured on the provider block that owns the resource, if known
    pub provider_region: Option<String>,
}

impl ResourceDeclaration {
    pub fn terraform(address: impl Into<String>, resource_type: impl Into<String>, values: Value) -> Self {
        let address = address.into();
        Self {
            usage_key: address.clone(),
            address,
            resource_type: resource_type.into(),
            handle: SchemaHandle::Terraform(values),
            provider_region: None,
        }
    }

    pub fn cloudformation(logical_id: impl Into<String>, resource: CfnResource) -> Self {
        let address = logical_id.into();
        Self {
            usage_key: address.clone(),
            address,
            resource_type: resource.type_name().to_string(),
            handle: SchemaHandle::CloudFormation(resource),
            provider_region: None,
        }
    }

    pub fn with_provider_region(mut self, region: Option<String>) -> Self {
        self.provider_region = region;
        self
    }
}

/// A priced line item of a resource (prices themselves are looked up elsewhere)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostComponent {
    pub name: String,
    pub unit: String,
    /// `None` when the quantity depends on usage that was not supplied
    pub monthly_quantity: Option<f64>,
    /// Attributes identifying the price
    pub price_filter: BTreeMap<String, String>,
}

impl CostComponent {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, monthly_quantity: Option<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            monthly_quantity,
            price_filter: BTreeMap::new(),
        }
    }

    pub fn filter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.price_filter.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostResource {
    pub name: String,
    pub resource_type: String,
    pub region: String,
    pub cost_components: Vec<CostComponent>,
    pub tags: BTreeMap<String, String>,
}
