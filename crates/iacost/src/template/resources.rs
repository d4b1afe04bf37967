//! typed CloudFormation resource properties
//!
//! Only the properties the shipped adapters read are modelled. Unknown properties are ignored.
use crate::value::Value;
use serde::Deserialize;

/// Properties of one template resource, typed by its `Type`
#[derive(Debug, Clone)]
pub enum CfnResource {
    DbInstance(DbInstance),
    SsmParameter(SsmParameter),
    EcsService(EcsService),
    ApiGatewayV2Api(ApiGatewayV2Api),
    /// A resource type without a typed model, or properties that did not fit the model
    Other {
        resource_type: String,
        properties: Value,
    },
}

impl CfnResource {
    pub fn from_properties(resource_type: &str, properties: serde_json::Value) -> Self {
        let typed = match resource_type {
            DbInstance::TYPE => serde_json::from_value(properties.clone()).map(Self::DbInstance),
            SsmParameter::TYPE => {
                serde_json::from_value(properties.clone()).map(Self::SsmParameter)
            }
            EcsService::TYPE => serde_json::from_value(properties.clone()).map(Self::EcsService),
            ApiGatewayV2Api::TYPE => {
                serde_json::from_value(properties.clone()).map(Self::ApiGatewayV2Api)
            }
            _ => {
                return Self::Other {
                    resource_type: resource_type.to_string(),
                    properties: properties.into(),
                }
            }
        };

        typed.unwrap_or_else(|err| {
            tracing::warn!(resource_type, %err, "resource properties do not match the expected shape");
            Self::Other {
                resource_type: resource_type.to_string(),
                properties: properties.into(),
            }
        })
    }

    /// Name of the variant, used in diagnostics
    pub fn type_name(&self) -> &str {
        match self {
            CfnResource::DbInstance(_) => DbInstance::TYPE,
            CfnResource::SsmParameter(_) => SsmParameter::TYPE,
            CfnResource::EcsService(_) => EcsService::TYPE,
            CfnResource::ApiGatewayV2Api(_) => ApiGatewayV2Api::TYPE,
            CfnResource::Other { resource_type, .. } => resource_type,
        }
    }
}

/// A scalar that templates write either as a YAML/JSON scalar or as a string
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::String(s) => s.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::String(s) => s.trim().to_ascii_lowercase().parse().ok(),
            Scalar::Number(_) => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CfnTag {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    #[serde(rename = "DBInstanceClass")]
    pub db_instance_class: Option<String>,
    pub engine: Option<String>,
    pub license_model: Option<String>,
    pub storage_type: Option<String>,
    pub allocated_storage: Option<Scalar>,
    pub backup_retention_period: Option<Scalar>,
    pub enable_performance_insights: Option<Scalar>,
    #[serde(rename = "MultiAZ")]
    pub multi_az: Option<Scalar>,
    pub iops: Option<Scalar>,
    pub tags: Option<Vec<CfnTag>>,
}

impl DbInstance {
    pub const TYPE: &'static str = "AWS::RDS::DBInstance";
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SsmParameter {
    pub tier: Option<String>,
    /// `{ key: value }` map
    pub tags: Option<serde_json::Value>,
}

impl SsmParameter {
    pub const TYPE: &'static str = "AWS::SSM::Parameter";
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct EcsService {
    pub launch_type: Option<String>,
    pub desired_count: Option<Scalar>,
    /// Usually a `Ref` to a task definition; inline JSON documents are read for cpu/memory
    pub task_definition: Option<serde_json::Value>,
    pub tags: Option<Vec<CfnTag>>,
}

impl EcsService {
    pub const TYPE: &'static str = "AWS::ECS::Service";
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ApiGatewayV2Api {
    pub protocol_type: Option<String>,
    /// `{ key: value }` map
    pub tags: Option<serde_json::Value>,
}

impl ApiGatewayV2Api {
    pub const TYPE: &'static str = "AWS::ApiGatewayV2::Api";
}
