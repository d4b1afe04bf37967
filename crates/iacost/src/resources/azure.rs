//! azurerm Terraform resources
use super::{terraform_tags, AdapterInput, SchemaMismatch, HOURS_PER_MONTH};
use crate::registry::RegistryItem;
use crate::schema::{CostComponent, CostResource};
use crate::value::Value;

pub fn registry_items() -> Vec<RegistryItem> {
    vec![
        RegistryItem {
            name: "azurerm_application_gateway",
            notes: &[],
            adapter: application_gateway,
        },
        RegistryItem {
            name: "azurerm_linux_virtual_machine",
            notes: &[
                "Non-standard images such as RHEL are not supported.",
                "Low priority, Spot and Reserved instances are not supported.",
            ],
            adapter: linux_virtual_machine,
        },
        RegistryItem {
            name: "azurerm_windows_virtual_machine",
            notes: &["Low priority, Spot and Reserved instances are not supported."],
            adapter: windows_virtual_machine,
        },
    ]
}

/// `West Europe` -> `westeurope`
fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn lookup_region(input: &AdapterInput, values: &Value) -> String {
    match values.get("location").and_then(Value::as_str) {
        Some(location) if !location.is_empty() => normalize_location(location),
        _ => input
            .declaration
            .provider_region
            .clone()
            .unwrap_or_else(|| input.defaults.azure_region.clone()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagedDisk {
    /// `storage_account_type`, e.g. `Premium_LRS`
    pub disk_type: String,
    pub disk_size_gb: i64,
    pub monthly_disk_operations: Option<f64>,
}

/// Size of a disk created from a marketplace image without `disk_size_gb`
const DEFAULT_OS_DISK_SIZE_GB: i64 = 30;

const DISK_TIERS: [(i64, &str); 14] = [
    (4, "1"),
    (8, "2"),
    (16, "3"),
    (32, "4"),
    (64, "6"),
    (128, "10"),
    (256, "15"),
    (512, "20"),
    (1024, "30"),
    (2048, "40"),
    (4096, "50"),
    (8192, "60"),
    (16384, "70"),
    (32767, "80"),
];

impl ManagedDisk {
    fn from_os_disk(values: &Value) -> Option<Self> {
        let disk = values.get("os_disk.0")?;
        Some(Self {
            disk_type: disk.string("storage_account_type"),
            disk_size_gb: disk.int("disk_size_gb"),
            monthly_disk_operations: None,
        })
    }

    fn populate_usage(&mut self, usage: &Value) {
        if let Some(operations) = usage.get("monthly_disk_operations").and_then(Value::as_f64) {
            self.monthly_disk_operations = Some(operations);
        }
    }

    /// `P10`, `E4`, `S30`... or `None` for unknown storage types
    fn sku_name(&self) -> Option<String> {
        let prefix = match self.disk_type.as_str() {
            "Standard_LRS" => "S",
            "StandardSSD_LRS" | "StandardSSD_ZRS" => "E",
            "Premium_LRS" | "Premium_ZRS" => "P",
            _ => return None,
        };

        let size = if self.disk_size_gb > 0 {
            self.disk_size_gb
        } else {
            DEFAULT_OS_DISK_SIZE_GB
        };
        let (_, tier) = DISK_TIERS
            .iter()
            .find(|(max_size, _)| size <= *max_size)
            .or(DISK_TIERS.last())?;

        Some(format!("{prefix}{tier}"))
    }

    fn redundancy(&self) -> &str {
        self.disk_type.rsplit('_').next().unwrap_or("LRS")
    }

    fn cost_components(&self, region: &str) -> Vec<CostComponent> {
        let Some(sku) = self.sku_name() else {
            tracing::debug!(disk_type = %self.disk_type, "unknown disk type");
            return vec![];
        };

        let mut components = vec![CostComponent::new(
            format!("Storage ({sku}, {})", self.redundancy()),
            "months",
            Some(1.0),
        )
        .filter("service", "Storage")
        .filter("region", region)
        .filter("skuName", format!("{sku} {}", self.redundancy()))];

        // premium disks include operations
        if !sku.starts_with('P') {
            components.push(
                CostComponent::new(
                    "Disk operations",
                    "10k operations",
                    self.monthly_disk_operations.map(|ops| ops / 10_000.0),
                )
                .filter("service", "Storage")
                .filter("region", region)
                .filter("meterName", "Disk Operations"),
            );
        }

        components
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinuxVirtualMachine {
    pub address: String,
    pub region: String,
    pub size: String,
    pub ultra_ssd_enabled: bool,
    pub os_disk: Option<ManagedDisk>,
    pub monthly_hours: Option<f64>,
    pub tags: std::collections::BTreeMap<String, String>,
}

impl LinuxVirtualMachine {
    fn populate_usage(&mut self, usage: &Value) {
        if let Some(hours) = usage.get("monthly_hrs").and_then(Value::as_f64) {
            self.monthly_hours = Some(hours);
        }
        if let (Some(disk), Some(disk_usage)) = (&mut self.os_disk, usage.get("os_disk")) {
            disk.populate_usage(disk_usage);
        }
    }

    fn build_resource(self) -> CostResource {
        let mut cost_components = vec![instance_component(
            format!("Instance usage (Linux, pay as you go, {})", self.size),
            &self.region,
            &self.size,
            self.monthly_hours,
        )];
        cost_components.extend(vm_disk_components(
            &self.region,
            self.ultra_ssd_enabled,
            self.os_disk.as_ref(),
        ));

        CostResource {
            name: self.address,
            resource_type: "azurerm_linux_virtual_machine".to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn linux_virtual_machine(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let values = input.terraform()?;

    let mut vm = LinuxVirtualMachine {
        address: input.declaration.address.clone(),
        region: lookup_region(input, values),
        size: values.string("size"),
        ultra_ssd_enabled: values.bool("additional_capabilities.0.ultra_ssd_enabled"),
        os_disk: ManagedDisk::from_os_disk(values),
        monthly_hours: None,
        tags: terraform_tags(values),
    };
    vm.populate_usage(input.usage());

    Ok(vm.build_resource())
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowsVirtualMachine {
    pub address: String,
    pub region: String,
    pub size: String,
    /// `None`, `Windows_Client` or `Windows_Server`
    pub license_type: String,
    pub ultra_ssd_enabled: bool,
    pub os_disk: Option<ManagedDisk>,
    pub monthly_hours: Option<f64>,
    pub tags: std::collections::BTreeMap<String, String>,
}

impl WindowsVirtualMachine {
    fn has_hybrid_benefit(&self) -> bool {
        matches!(self.license_type.as_str(), "Windows_Client" | "Windows_Server")
    }

    fn populate_usage(&mut self, usage: &Value) {
        if let Some(hours) = usage.get("monthly_hrs").and_then(Value::as_f64) {
            self.monthly_hours = Some(hours);
        }
        if let (Some(disk), Some(disk_usage)) = (&mut self.os_disk, usage.get("os_disk")) {
            disk.populate_usage(disk_usage);
        }
    }

    fn build_resource(self) -> CostResource {
        let purchase = if self.has_hybrid_benefit() {
            "Azure Hybrid Benefit"
        } else {
            "pay as you go"
        };
        let mut instance = instance_component(
            format!("Instance usage (Windows, {purchase}, {})", self.size),
            &self.region,
            &self.size,
            self.monthly_hours,
        );
        // hybrid benefit is billed at the linux rate
        let os = if self.has_hybrid_benefit() { "Linux" } else { "Windows" };
        instance = instance.filter("os", os);

        let mut cost_components = vec![instance];
        cost_components.extend(vm_disk_components(
            &self.region,
            self.ultra_ssd_enabled,
            self.os_disk.as_ref(),
        ));

        CostResource {
            name: self.address,
            resource_type: "azurerm_windows_virtual_machine".to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn windows_virtual_machine(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let values = input.terraform()?;

    let mut vm = WindowsVirtualMachine {
        address: input.declaration.address.clone(),
        region: lookup_region(input, values),
        size: values.string("size"),
        license_type: values.string("license_type"),
        ultra_ssd_enabled: values.bool("additional_capabilities.0.ultra_ssd_enabled"),
        os_disk: ManagedDisk::from_os_disk(values),
        monthly_hours: None,
        tags: terraform_tags(values),
    };
    vm.populate_usage(input.usage());

    Ok(vm.build_resource())
}

fn instance_component(name: String, region: &str, size: &str, hours: Option<f64>) -> CostComponent {
    CostComponent::new(name, "hours", Some(hours.unwrap_or(HOURS_PER_MONTH)))
        .filter("service", "Virtual Machines")
        .filter("region", region)
        .filter("armSkuName", size)
}

fn vm_disk_components(
    region: &str,
    ultra_ssd_enabled: bool,
    os_disk: Option<&ManagedDisk>,
) -> Vec<CostComponent> {
    let mut components = vec![];

    if ultra_ssd_enabled {
        components.push(
            CostComponent::new("Ultra disk reservation (if unattached)", "vCPU", None)
                .filter("service", "Storage")
                .filter("region", region)
                .filter("meterName", "Reservation per vCPU Provisioned"),
        );
    }

    if let Some(disk) = os_disk {
        components.extend(disk.cost_components(region));
    }

    components
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationGateway {
    pub address: String,
    pub region: String,
    pub sku_name: String,
    pub sku_capacity: i64,
    pub autoscaling_min_capacity: Option<i64>,
    pub monthly_data_processed_gb: Option<f64>,
    pub capacity_units: Option<f64>,
    pub tags: std::collections::BTreeMap<String, String>,
}

impl ApplicationGateway {
    fn is_v2(&self) -> bool {
        self.sku_name.ends_with("_v2")
    }

    /// `Standard_Medium` -> (`standard`, `medium`), `WAF_v2` -> (`waf`, `v2`)
    fn tier_and_size(&self) -> (String, String) {
        let (tier, size) = self
            .sku_name
            .split_once('_')
            .unwrap_or((self.sku_name.as_str(), ""));
        (tier.to_lowercase(), size.to_lowercase())
    }

    fn populate_usage(&mut self, usage: &Value) {
        if let Some(gb) = usage.get("monthly_data_processed_gb").and_then(Value::as_f64) {
            self.monthly_data_processed_gb = Some(gb);
        }
        if let Some(units) = usage.get("capacity_units").and_then(Value::as_f64) {
            self.capacity_units = Some(units);
        }
    }

    fn build_resource(self) -> CostResource {
        let (tier, size) = self.tier_and_size();
        let mut cost_components = vec![];

        if self.is_v2() {
            let capacity_units = self.capacity_units.or_else(|| {
                self.autoscaling_min_capacity
                    .or(Some(self.sku_capacity))
                    .filter(|capacity| *capacity > 0)
                    .map(|capacity| capacity as f64)
            });

            cost_components.push(
                CostComponent::new(format!("Gateway usage ({tier} v2)"), "hours", Some(HOURS_PER_MONTH))
                    .filter("service", "Application Gateway")
                    .filter("region", &self.region)
                    .filter("skuName", &self.sku_name)
                    .filter("meterName", "Fixed Cost"),
            );
            cost_components.push(
                CostComponent::new(
                    format!("Capacity units ({tier} v2)"),
                    "CU",
                    capacity_units.map(|units| units * HOURS_PER_MONTH),
                )
                .filter("service", "Application Gateway")
                .filter("region", &self.region)
                .filter("skuName", &self.sku_name)
                .filter("meterName", "Capacity Units"),
            );
        } else {
            let instances = self.sku_capacity.max(1) as f64;
            cost_components.push(
                CostComponent::new(
                    format!("Gateway usage ({tier}, {size})"),
                    "hours",
                    Some(HOURS_PER_MONTH * instances),
                )
                .filter("service", "Application Gateway")
                .filter("region", &self.region)
                .filter("skuName", &self.sku_name),
            );
            cost_components.push(
                CostComponent::new(
                    "Data processing (0-10TB)",
                    "GB",
                    self.monthly_data_processed_gb,
                )
                .filter("service", "Application Gateway")
                .filter("region", &self.region)
                .filter("meterName", format!("{size} Data Processed")),
            );
        }

        CostResource {
            name: self.address,
            resource_type: "azurerm_application_gateway".to_string(),
            region: self.region,
            cost_components,
            tags: self.tags,
        }
    }
}

pub fn application_gateway(input: &AdapterInput) -> Result<CostResource, SchemaMismatch> {
    let values = input.terraform()?;

    let autoscaling_min_capacity = values
        .exists("autoscale_configuration.0.min_capacity")
        .then(|| values.int("autoscale_configuration.0.min_capacity"));

    let mut gateway = ApplicationGateway {
        address: input.declaration.address.clone(),
        region: lookup_region(input, values),
        sku_name: values.string("sku.0.name"),
        sku_capacity: values.int("sku.0.capacity"),
        autoscaling_min_capacity,
        monthly_data_processed_gb: None,
        capacity_units: None,
        tags: terraform_tags(values),
    };
    gateway.populate_usage(input.usage());

    Ok(gateway.build_resource())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::AdapterDefaults;
    use crate::schema::ResourceDeclaration;
    use crate::template::CfnResource;
    use pretty_assertions::assert_eq;

    fn declaration(resource_type: &str, values: serde_json::Value) -> ResourceDeclaration {
        ResourceDeclaration::terraform(format!("{resource_type}.this"), resource_type, values.into())
    }

    fn names(resource: &CostResource) -> Vec<&str> {
        resource
            .cost_components
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    #[test]
    fn linux_vm() {
        let declaration = declaration(
            "azurerm_linux_virtual_machine",
            serde_json::json!({
                "location": "West Europe",
                "size": "Standard_B2s",
                "os_disk": [{ "storage_account_type": "StandardSSD_LRS", "disk_size_gb": 64 }],
                "tags": { "env": "prod" },
            }),
        );
        let usage: Value = serde_json::json!({
            "monthly_hrs": 100,
            "os_disk": { "monthly_disk_operations": 50000 },
        })
        .into();
        let defaults = AdapterDefaults::default();

        let resource =
            linux_virtual_machine(&AdapterInput::new(&declaration, Some(&usage), &defaults)).unwrap();

        assert_eq!(resource.region, "westeurope");
        assert_eq!(
            names(&resource),
            vec![
                "Instance usage (Linux, pay as you go, Standard_B2s)",
                "Storage (E6, LRS)",
                "Disk operations",
            ]
        );
        assert_eq!(resource.cost_components[0].monthly_quantity, Some(100.0));
        assert_eq!(resource.cost_components[2].monthly_quantity, Some(5.0));
        assert_eq!(resource.tags.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn linux_vm_defaults() {
        let declaration = declaration(
            "azurerm_linux_virtual_machine",
            serde_json::json!({
                "size": "Standard_D2s_v3",
                "additional_capabilities": [{ "ultra_ssd_enabled": true }],
                "os_disk": [{ "storage_account_type": "Premium_LRS" }],
            }),
        );
        let defaults = AdapterDefaults::default();

        let resource =
            linux_virtual_machine(&AdapterInput::new(&declaration, None, &defaults)).unwrap();

        assert_eq!(resource.region, "eastus");
        assert_eq!(
            names(&resource),
            vec![
                "Instance usage (Linux, pay as you go, Standard_D2s_v3)",
                "Ultra disk reservation (if unattached)",
                "Storage (P4, LRS)",
            ]
        );
        assert_eq!(resource.cost_components[0].monthly_quantity, Some(HOURS_PER_MONTH));
    }

    #[test]
    fn windows_vm_hybrid_benefit() {
        let declaration = declaration(
            "azurerm_windows_virtual_machine",
            serde_json::json!({
                "location": "eastus2",
                "size": "Standard_D4s_v3",
                "license_type": "Windows_Server",
            }),
        );
        let defaults = AdapterDefaults::default();

        let resource =
            windows_virtual_machine(&AdapterInput::new(&declaration, None, &defaults)).unwrap();

        assert_eq!(
            names(&resource),
            vec!["Instance usage (Windows, Azure Hybrid Benefit, Standard_D4s_v3)"]
        );
        assert_eq!(
            resource.cost_components[0].price_filter.get("os").map(String::as_str),
            Some("Linux")
        );
    }

    #[test]
    fn application_gateway_v2_autoscaling() {
        let declaration = declaration(
            "azurerm_application_gateway",
            serde_json::json!({
                "location": "northeurope",
                "sku": [{ "name": "WAF_v2", "tier": "WAF_v2" }],
                "autoscale_configuration": [{ "min_capacity": 2, "max_capacity": 10 }],
            }),
        );
        let defaults = AdapterDefaults::default();

        let resource =
            application_gateway(&AdapterInput::new(&declaration, None, &defaults)).unwrap();

        assert_eq!(
            names(&resource),
            vec!["Gateway usage (waf v2)", "Capacity units (waf v2)"]
        );
        assert_eq!(
            resource.cost_components[1].monthly_quantity,
            Some(2.0 * HOURS_PER_MONTH)
        );
    }

    #[test]
    fn application_gateway_v1() {
        let declaration = declaration(
            "azurerm_application_gateway",
            serde_json::json!({
                "sku": [{ "name": "Standard_Medium", "capacity": 2 }],
            }),
        );
        let usage: Value = serde_json::json!({ "monthly_data_processed_gb": 500 }).into();
        let defaults = AdapterDefaults::default();

        let resource =
            application_gateway(&AdapterInput::new(&declaration, Some(&usage), &defaults)).unwrap();

        assert_eq!(
            names(&resource),
            vec!["Gateway usage (standard, medium)", "Data processing (0-10TB)"]
        );
        assert_eq!(
            resource.cost_components[0].monthly_quantity,
            Some(2.0 * HOURS_PER_MONTH)
        );
        assert_eq!(resource.cost_components[1].monthly_quantity, Some(500.0));
    }

    #[test]
    fn cloudformation_handle_is_a_mismatch() {
        let declaration = ResourceDeclaration {
            resource_type: "azurerm_linux_virtual_machine".into(),
            ..ResourceDeclaration::cloudformation(
                "Vm",
                CfnResource::Other {
                    resource_type: "AWS::EC2::Instance".into(),
                    properties: Value::Null,
                },
            )
        };
        let defaults = AdapterDefaults::default();

        let err = linux_virtual_machine(&AdapterInput::new(&declaration, None, &defaults))
            .unwrap_err();
        assert_eq!(err.expected, "terraform object");
        assert_eq!(err.found, "untyped cloudformation AWS::EC2::Instance");
    }

    #[test]
    fn disk_tiers() {
        let disk = |disk_type: &str, disk_size_gb| ManagedDisk {
            disk_type: disk_type.to_string(),
            disk_size_gb,
            monthly_disk_operations: None,
        };
        assert_eq!(disk("Premium_LRS", 128).sku_name().as_deref(), Some("P10"));
        assert_eq!(disk("Premium_LRS", 129).sku_name().as_deref(), Some("P15"));
        assert_eq!(disk("Standard_LRS", 99999).sku_name().as_deref(), Some("S80"));
        assert_eq!(disk("UltraSSD_LRS", 10).sku_name(), None);
    }
}
