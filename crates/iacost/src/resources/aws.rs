//! AWS CloudFormation resources
use super::{cfn_tag_list, cfn_tag_map, AdapterInput, SchemaMismatch, HOURS_PER_MONTH};
use crate::registry::RegistryItem;
use crate::schema::{CostComponent, CostResource};
use crate::template::{ApiGatewayV2Api, CfnResource, DbInstance, EcsService, SsmParameter};
use crate::value::Value;
use std::collections::BTreeMap;

pub fn registry_items() -> Vec<RegistryItem> {
    vec![
        RegistryItem {
            name: ApiGatewayV2Api::TYPE,
            notes: &["ApiGatewayV2 Apis are not yet supported."],
            adapter: api_gateway_v2_api,
        },
        RegistryItem {
            name: DbInstance::TYPE,
            notes: &["DB instances are not yet supported."],
            adapter: db_instance,
        },
        RegistryItem {
            name: EcsService::TYPE,
            notes: &["ECS Services are not yet supported."],
            adapter: ecs_service,
        },
        RegistryItem {
            name: SsmParameter::TYPE,
            notes: &["SSM Parameters are not yet supported."],
            adapter: ssm_parameter,
        },
    ]
}

fn usage_f64(usage: &Value, key: &str) -> Option<f64> {
    usage.get(key).and_then(Value::as_f64)
}

fn mismatch(expected: &str, input: &AdapterInput) -> SchemaMismatch {
    SchemaMismatch::new(expected, input.declaration.handle.describe())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RdsInstance {
    pub address: String,
    pub region: String,
    pub instance_class: String,
    pub engine: String,
    pub license_model: String,
    pub storage_type: String,
    pub allocated_storage_gb: f64,
    pub backup_retention_period: i64,
    pub performance_insights_enabled: bool,
    pub multi_az: bool,
    pub iops: f64,
    pub monthly_standard_io_requests: Option<f64>,
    pub additional_backup_storage_gb: Option<f64>,
    pub monthly_additional_performance_insights_requests: Option<f64>,
    pub tags: BTreeMap<String, String>,
}

impl RdsInstance {
    fn populate_usage(&mut self, usage: &Value) {
        if let Some(requests) = usage_f64(usage, "monthly_standard_io_requests") {
            self.monthly_standard_io_requests = Some(requests);
        }
        if let Some(gb) = usage_f64(usage, "additional_backup_storage_gb") {
            self.additional_backup_storage_gb = Some(gb);
        }
        if let Some(requests) = usage_f64(usage, "monthly_additional_performance_insights_requests")
        {
            self.monthly_additional_performance_insights_requests = Some(requests);
        }
    }

    fn database_engine(&self) -> &str {
        let engine = self.engine.to_lowercase();
        match engine.as_str() {
            "postgres" => "PostgreSQL",
            "mariadb" => "MariaDB",
            "aurora" | "aurora-mysql" => "Aurora MySQL",
            "aurora-postgresql" => "Aurora PostgreSQL",
            e if e.starts_with("oracle") => "Oracle",
            e if e.starts_with("sqlserver") => "SQL Server",
            _ => "MySQL",
        }
    }

    fn build_resource(self) -> CostResource {
        let deployment = if self.multi_az { "Multi-AZ" } else { "Single-AZ" };
        let engine = self.database_engine().to_string();
        let mut cost_components = vec![];

        cost_components.push(
            CostComponent::new(
                format!("Database instance (on-demand, {deployment}, {})", self.instance_class),
                "hours",
                Some(HOURS_PER_MONTH),
            )
            .filter("service", "AmazonRDS")
            .filter("region", &self.region)
            .filter("instanceType", &self.instance_class)
            .filter("databaseEngine", &engine)
            .filter("deploymentOption", deployment)
            .filter("licenseModel", &self.license_model),
        );

        let storage_type = if self.storage_type.is_empty() {
            "gp2"
        } else {
            self.storage_type.as_str()
        };
        let storage_name = match storage_type {
            "standard" => "Storage (magnetic)".to_string(),
            "io1" | "io2" => format!("Storage (provisioned IOPS SSD, {storage_type})"),
            other => format!("Storage (general purpose SSD, {other})"),
        };
        cost_components.push(
            CostComponent::new(storage_name, "GB", Some(self.allocated_storage_gb))
                .filter("service", "AmazonRDS")
                .filter("region", &self.region)
                .filter("volumeApiName", storage_type)
                .filter("deploymentOption", deployment),
        );

        match storage_type {
            "standard" => cost_components.push(
                CostComponent::new(
                    "I/O requests",
                    "1M requests",
                    self.monthly_standard_io_requests.map(|r| r / 1_000_000.0),
                )
                .filter("service", "AmazonRDS")
                .filter("region", &self.region)
                .filter("group", "RDS I/O Operation"),
            ),
            "io1" | "io2" if self.iops > 0.0 => cost_components.push(
                CostComponent::new("Provisioned IOPS", "IOPS", Some(self.iops))
                    .filter("service", "AmazonRDS")
                    .filter("region", &self.region)
                    .filter("deploymentOption", deployment),
            ),
            _ => {}
        }

        if self.backup_retention_period > 0 {
            cost_components.push(
                CostComponent::new(
                    "Additional backup storage",
                    "GB",
                    self.additional_backup_storage_gb,
                )
                .filter("service", "AmazonRDS")
                .filter("region", &self.region)
                .filter("usagetype", "BackupUsage")
                .filter("databaseEngine", &engine),
            );
        }

        if self.performance_insights_enabled {
            cost_components.push(
                CostComponent::new(
                    "Performance Insights API",
                    "1000 requests",
                    self.monthly_additional_performance_insights_requests
                        .map(|r| r / 1000.0),
                )
                .filter("service", "AmazonRDS")
                .filter("region", &self.region)
                .filter("usagetype", "PI_API"),
            );
        }

        CostResource {
            name: self.address,
            resource_type: DbInstance::TYPE.to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn db_instance(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let CfnResource::DbInstance(db) = input.cloudformation()? else {
        return Err(mismatch(DbInstance::TYPE, input));
    };

    let allocated_storage_gb = db
        .allocated_storage
        .as_ref()
        .and_then(|storage| storage.as_f64())
        .unwrap_or(input.defaults.db_allocated_storage_gb);

    let mut instance = RdsInstance {
        address: input.declaration.address.clone(),
        region: input.fallback_region(),
        instance_class: db.db_instance_class.clone().unwrap_or_default(),
        engine: db.engine.clone().unwrap_or_default(),
        license_model: db.license_model.clone().unwrap_or_default(),
        storage_type: db.storage_type.clone().unwrap_or_default(),
        allocated_storage_gb,
        backup_retention_period: db
            .backup_retention_period
            .as_ref()
            .and_then(|period| period.as_i64())
            .unwrap_or(1),
        performance_insights_enabled: db
            .enable_performance_insights
            .as_ref()
            .and_then(|enabled| enabled.as_bool())
            .unwrap_or(false),
        multi_az: db
            .multi_az
            .as_ref()
            .and_then(|multi_az| multi_az.as_bool())
            .unwrap_or(false),
        iops: db
            .iops
            .as_ref()
            .and_then(|iops| iops.as_f64())
            .unwrap_or(0.0),
        monthly_standard_io_requests: None,
        additional_backup_storage_gb: None,
        monthly_additional_performance_insights_requests: None,
        tags: cfn_tag_list(db.tags.as_deref()),
    };
    instance.populate_usage(input.usage());

    Ok(instance.build_resource())
}

#[derive(Debug, Clone, PartialEq)]
pub struct FargateService {
    pub address: String,
    pub region: String,
    pub launch_type: String,
    pub desired_count: i64,
    pub memory_gb: f64,
    pub vcpu: f64,
    pub inference_accelerator_device_type: String,
    pub tags: BTreeMap<String, String>,
}

/// Task size read from an inline task definition document
#[derive(Debug, Default, PartialEq)]
struct TaskSize {
    memory_gb: f64,
    vcpu: f64,
    accelerator: String,
}

impl TaskSize {
    /// Task definitions are usually `Ref`s; only inline documents (objects or JSON strings) carry a size
    fn from_task_definition(task_definition: Option<&serde_json::Value>) -> Self {
        let document = match task_definition {
            Some(serde_json::Value::String(s)) => match serde_json::from_str(s) {
                Ok(document) => document,
                Err(err) => {
                    tracing::debug!(%err, "task definition is not an inline document");
                    return Self::default();
                }
            },
            Some(document @ serde_json::Value::Object(_)) => document.clone(),
            _ => return Self::default(),
        };
        let document: Value = document.into();

        // cpu units (1024 per vCPU) and MiB, as in the task definition schema
        Self {
            memory_gb: document.get("Memory").and_then(Value::as_f64).unwrap_or(0.0) / 1024.0,
            vcpu: document.get("Cpu").and_then(Value::as_f64).unwrap_or(0.0) / 1024.0,
            accelerator: document.string("InferenceAccelerator.DeviceType"),
        }
    }
}

impl FargateService {
    fn populate_usage(&mut self, usage: &Value) {
        if let Some(count) = usage.get("desired_count").and_then(Value::as_i64) {
            self.desired_count = count;
        }
    }

    fn build_resource(self) -> CostResource {
        let mut cost_components = vec![];
        let count = self.desired_count as f64;

        // EC2 backed services are priced through their instances
        if self.launch_type.eq_ignore_ascii_case("FARGATE") {
            cost_components.push(
                CostComponent::new(
                    "Per GB per hour",
                    "GB",
                    Some(self.memory_gb * count * HOURS_PER_MONTH),
                )
                .filter("service", "AmazonECS")
                .filter("region", &self.region)
                .filter("usagetype", "Fargate-GB-Hours"),
            );
            cost_components.push(
                CostComponent::new(
                    "Per vCPU per hour",
                    "CPU",
                    Some(self.vcpu * count * HOURS_PER_MONTH),
                )
                .filter("service", "AmazonECS")
                .filter("region", &self.region)
                .filter("usagetype", "Fargate-vCPU-Hours:perCPU"),
            );
        }

        if !self.inference_accelerator_device_type.is_empty() {
            cost_components.push(
                CostComponent::new(
                    format!(
                        "Inference accelerator ({})",
                        self.inference_accelerator_device_type
                    ),
                    "hours",
                    Some(count * HOURS_PER_MONTH),
                )
                .filter("service", "AmazonEI")
                .filter("region", &self.region)
                .filter("acceleratorType", &self.inference_accelerator_device_type),
            );
        }

        CostResource {
            name: self.address,
            resource_type: EcsService::TYPE.to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn ecs_service(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let CfnResource::EcsService(service) = input.cloudformation()? else {
        return Err(mismatch(EcsService::TYPE, input));
    };

    let size = TaskSize::from_task_definition(service.task_definition.as_ref());
    let mut fargate = FargateService {
        address: input.declaration.address.clone(),
        region: input.fallback_region(),
        launch_type: service.launch_type.clone().unwrap_or_default(),
        desired_count: service
            .desired_count
            .as_ref()
            .and_then(|count| count.as_i64())
            .unwrap_or(0),
        memory_gb: size.memory_gb,
        vcpu: size.vcpu,
        inference_accelerator_device_type: size.accelerator,
        tags: cfn_tag_list(service.tags.as_deref()),
    };
    fargate.populate_usage(input.usage());

    Ok(fargate.build_resource())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub address: String,
    pub region: String,
    /// `Standard`, `Advanced` or `Intelligent-Tiering`
    pub tier: String,
    pub parameter_storage_hours: Option<f64>,
    /// `standard`, `advanced` or `higher`
    pub api_throughput_limit: Option<String>,
    pub monthly_api_interactions: Option<f64>,
    pub tags: BTreeMap<String, String>,
}

impl Parameter {
    fn populate_usage(&mut self, usage: &Value) {
        if let Some(hours) = usage_f64(usage, "parameter_storage_hrs") {
            self.parameter_storage_hours = Some(hours);
        }
        if let Some(limit) = usage.get("api_throughput_limit").and_then(Value::as_str) {
            self.api_throughput_limit = Some(limit.to_lowercase());
        }
        if let Some(interactions) = usage_f64(usage, "monthly_api_interactions") {
            self.monthly_api_interactions = Some(interactions);
        }
    }

    fn build_resource(self) -> CostResource {
        let mut cost_components = vec![];

        if self.tier.eq_ignore_ascii_case("Advanced") {
            cost_components.push(
                CostComponent::new(
                    "Parameter storage (advanced)",
                    "months",
                    Some(self.parameter_storage_hours.unwrap_or(HOURS_PER_MONTH) / HOURS_PER_MONTH),
                )
                .filter("service", "AWSSystemsManager")
                .filter("region", &self.region)
                .filter("usagetype", "PS-Advanced-Param-Tier1"),
            );
        }

        let throughput = self.api_throughput_limit.as_deref().unwrap_or("standard");
        if throughput != "standard" {
            cost_components.push(
                CostComponent::new(
                    format!("API interactions ({throughput})"),
                    "10k interactions",
                    self.monthly_api_interactions.map(|i| i / 10_000.0),
                )
                .filter("service", "AWSSystemsManager")
                .filter("region", &self.region)
                .filter("usagetype", "PS-Param-Processed-Tier2"),
            );
        }

        CostResource {
            name: self.address,
            resource_type: SsmParameter::TYPE.to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn ssm_parameter(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let CfnResource::SsmParameter(parameter) = input.cloudformation()? else {
        return Err(mismatch(SsmParameter::TYPE, input));
    };

    let mut parameter = Parameter {
        address: input.declaration.address.clone(),
        region: input.fallback_region(),
        tier: parameter
            .tier
            .clone()
            .unwrap_or_else(|| "Standard".to_string()),
        parameter_storage_hours: None,
        api_throughput_limit: None,
        monthly_api_interactions: None,
        tags: cfn_tag_map(parameter.tags.as_ref()),
    };
    parameter.populate_usage(input.usage());

    Ok(parameter.build_resource())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiGatewayV2 {
    pub address: String,
    pub region: String,
    /// `HTTP` or `WEBSOCKET`
    pub protocol_type: String,
    pub monthly_requests: Option<f64>,
    pub request_size_kb: f64,
    pub monthly_messages: Option<f64>,
    pub message_size_kb: f64,
    pub monthly_connection_mins: Option<f64>,
    pub tags: BTreeMap<String, String>,
}

impl ApiGatewayV2 {
    fn populate_usage(&mut self, usage: &Value) {
        self.monthly_requests = usage_f64(usage, "monthly_requests").or(self.monthly_requests);
        self.monthly_messages = usage_f64(usage, "monthly_messages").or(self.monthly_messages);
        self.monthly_connection_mins =
            usage_f64(usage, "monthly_connection_mins").or(self.monthly_connection_mins);
        if let Some(kb) = usage_f64(usage, "request_size_kb") {
            self.request_size_kb = kb;
        }
        if let Some(kb) = usage_f64(usage, "message_size_kb") {
            self.message_size_kb = kb;
        }
    }

    fn build_resource(self) -> CostResource {
        let mut cost_components = vec![];

        if self.protocol_type.eq_ignore_ascii_case("WEBSOCKET") {
            // messages are metered in 32 KB increments
            let increments = (self.message_size_kb / 32.0).ceil().max(1.0);
            cost_components.push(
                CostComponent::new(
                    "Messages (first 1B)",
                    "1M messages",
                    self.monthly_messages
                        .map(|messages| messages * increments / 1_000_000.0),
                )
                .filter("service", "AmazonApiGateway")
                .filter("region", &self.region)
                .filter("usagetype", "ApiGatewayMessage"),
            );
            cost_components.push(
                CostComponent::new(
                    "Connection duration",
                    "1M minutes",
                    self.monthly_connection_mins.map(|mins| mins / 1_000_000.0),
                )
                .filter("service", "AmazonApiGateway")
                .filter("region", &self.region)
                .filter("usagetype", "ApiGatewayMinute"),
            );
        } else {
            // requests are metered in 512 KB increments
            let increments = (self.request_size_kb / 512.0).ceil().max(1.0);
            cost_components.push(
                CostComponent::new(
                    "Requests (first 300M)",
                    "1M requests",
                    self.monthly_requests
                        .map(|requests| requests * increments / 1_000_000.0),
                )
                .filter("service", "AmazonApiGateway")
                .filter("region", &self.region)
                .filter("usagetype", "ApiGatewayHttpRequest"),
            );
        }

        CostResource {
            name: self.address,
            resource_type: ApiGatewayV2Api::TYPE.to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn api_gateway_v2_api(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let CfnResource::ApiGatewayV2Api(api) = input.cloudformation()? else {
        return Err(mismatch(ApiGatewayV2Api::TYPE, input));
    };

    let mut gateway = ApiGatewayV2 {
        address: input.declaration.address.clone(),
        region: input.fallback_region(),
        protocol_type: api.protocol_type.clone().unwrap_or_default(),
        monthly_requests: None,
        request_size_kb: 0.0,
        monthly_messages: None,
        message_size_kb: 0.0,
        monthly_connection_mins: None,
        tags: cfn_tag_map(api.tags.as_ref()),
    };
    gateway.populate_usage(input.usage());

    Ok(gateway.build_resource())
}
