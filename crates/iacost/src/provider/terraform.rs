//! static evaluation of a Terraform configuration directory
//!
//! Nothing is planned or applied. Each module is evaluated with `hcl::eval` against
//! - `var`: declared defaults, overridden by assigned values (module arguments, overlay files)
//! - `local`: resolved iteratively until no further local can be evaluated
//! - `path` and `terraform`
//! - `count.index` / `each.key` / `each.value` inside expanded instances
//!
//! An attribute that depends on something only known after apply (another resource, a data source, an unknown
//! function) is left out of the resource values.
use super::{functions, ProjectMetadata, Provider, ProviderError};
use crate::hcl_files::{HclFiles, LoadError};
use crate::locator::{is_local_source, local_source_dir, normalize};
use crate::schema::ResourceDeclaration;
use crate::value::Value;
use hcl::eval::{Context, Evaluate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_MODULE_DEPTH: usize = 10;
pub const DEFAULT_MAX_INSTANCES: usize = 10_000;

/// Bounds of the static evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// How deep local module calls are followed
    pub max_module_depth: usize,
    /// Instances expanded from one `count`/`for_each`; larger expansions are truncated
    pub max_instances: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_module_depth: DEFAULT_MAX_MODULE_DEPTH,
            max_instances: DEFAULT_MAX_INSTANCES,
        }
    }
}

/// Resource meta-arguments, never part of the resource values
const RESOURCE_META_ARGUMENTS: &[&str] = &["count", "for_each", "provider", "depends_on"];
const MODULE_META_ARGUMENTS: &[&str] = &[
    "source",
    "version",
    "count",
    "for_each",
    "providers",
    "depends_on",
];
const IGNORED_BLOCKS: &[&str] = &["lifecycle", "provisioner", "connection", "dynamic"];

pub(crate) type Variables = hcl::Map<String, hcl::Value>;

#[derive(Debug)]
pub struct TerraformDirProvider {
    metadata: ProjectMetadata,
    body: hcl::Body,
    assigned: Variables,
    limits: Limits,
}

impl TerraformDirProvider {
    /// Parses the root module and all overlay files; either failing fails the unit
    pub fn load(metadata: ProjectMetadata, limits: Limits) -> Result<Self, ProviderError> {
        let body = load_module(&metadata.path)?;
        let assigned = read_var_files(&metadata.var_files)?;

        Ok(Self {
            metadata,
            body,
            assigned,
            limits,
        })
    }
}

impl Provider for TerraformDirProvider {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError> {
        Ok(evaluate(
            &self.metadata.path,
            &self.body,
            self.assigned.clone(),
            self.limits,
        ))
    }
}

pub(crate) fn load_module(dir: &Path) -> Result<hcl::Body, LoadError> {
    let mut files = HclFiles::default();
    files.load_directory(dir)?;
    Ok(files.to_body())
}

/// Merge overlay files in order, later files take precedence
pub(crate) fn read_var_files(paths: &[PathBuf]) -> Result<Variables, ProviderError> {
    let mut variables = Variables::new();
    for path in paths {
        variables.extend(read_var_file(path)?);
    }
    Ok(variables)
}

fn read_var_file(path: &Path) -> Result<Variables, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidVarFile {
        path: path.to_path_buf(),
        reason,
    };

    if path.to_string_lossy().ends_with(".json") {
        let contents = std::fs::read(path).map_err(|source| ProviderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let json: serde_json::Value =
            serde_json::from_slice(&contents).map_err(|source| ProviderError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let serde_json::Value::Object(object) = json else {
            return Err(invalid("expected a JSON object".to_string()));
        };
        return Ok(object
            .into_iter()
            .map(|(key, value)| (key, Value::from(value).to_hcl()))
            .collect());
    }

    let mut files = HclFiles::default();
    files.load_file(path)?;
    if files.blocks().next().is_some() {
        return Err(invalid("blocks are not allowed in variable files".to_string()));
    }

    let context = functions::context();
    let mut variables = Variables::new();
    for (_, _, attribute) in files.attributes() {
        let expr: hcl::Expression = attribute.value.clone().into();
        let value = expr
            .evaluate(&context)
            .map_err(|err| invalid(err.to_string()))?;
        variables.insert(attribute.key.value().as_str().to_string(), value);
    }
    Ok(variables)
}

/// Evaluate the module in `dir` and every local module it calls
pub(crate) fn evaluate(
    dir: &Path,
    body: &hcl::Body,
    assigned: Variables,
    limits: Limits,
) -> Vec<ResourceDeclaration> {
    let mut evaluation = Evaluation {
        root_dir: dir,
        limits,
        declarations: vec![],
    };
    evaluation.module(dir, body, assigned, "", 0, &HashMap::new());
    evaluation.declarations
}

/// Variables visible to expressions; a fresh [Context] is built from them on demand
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    vars: hcl::Map<String, hcl::Value>,
}

impl Scope {
    pub(crate) fn set(&mut self, name: &str, value: hcl::Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub(crate) fn context(&self) -> Context<'static> {
        let mut context = functions::context();
        for (name, value) in &self.vars {
            context.declare_var(hcl::Identifier::unchecked(name), value.clone());
        }
        context
    }
}

/// One expanded `count`/`for_each` instance
#[derive(Debug, Clone, PartialEq)]
enum Instance {
    Single,
    Index(u64),
    Key(String, hcl::Value),
}

impl Instance {
    fn address(&self, base: &str) -> String {
        match self {
            Instance::Single => base.to_string(),
            Instance::Index(index) => format!("{base}[{index}]"),
            Instance::Key(key, _) => format!("{base}[\"{key}\"]"),
        }
    }

    fn bind(&self, scope: &mut Scope) {
        match self {
            Instance::Single => {}
            Instance::Index(index) => {
                scope.set("count", object([("index", hcl::Value::from(*index))]));
            }
            Instance::Key(key, value) => {
                scope.set(
                    "each",
                    object([("key", hcl::Value::from(key.as_str())), ("value", value.clone())]),
                );
            }
        }
    }
}

struct Evaluation<'a> {
    root_dir: &'a Path,
    limits: Limits,
    declarations: Vec<ResourceDeclaration>,
}

impl Evaluation<'_> {
    #[tracing::instrument(level = "debug", skip(self, dir, body, assigned, inherited_regions), fields(dir = %dir.display()))]
    fn module(
        &mut self,
        dir: &Path,
        body: &hcl::Body,
        assigned: Variables,
        prefix: &str,
        depth: usize,
        inherited_regions: &HashMap<String, String>,
    ) {
        let mut scope = Scope::default();
        scope.set(
            "path",
            object([
                ("module", path_value(dir)),
                ("root", path_value(self.root_dir)),
                ("cwd", path_value(self.root_dir)),
            ]),
        );
        scope.set("terraform", object([("workspace", hcl::Value::from("default"))]));

        let mut variables = Variables::new();
        let context = scope.context();
        for block in blocks(body, "variable") {
            let Some(name) = label(block, 0) else {
                continue;
            };
            let default = attribute(&block.body, "default")
                .and_then(|expr| expr.evaluate(&context).ok())
                .unwrap_or(hcl::Value::Null);
            variables.insert(name.to_string(), default);
        }
        variables.extend(assigned);
        scope.set("var", hcl::Value::Object(variables));

        resolve_locals(body, &mut scope);
        let context = scope.context();

        let mut regions = inherited_regions.clone();
        for block in blocks(body, "provider") {
            if attribute(&block.body, "alias").is_some() {
                continue;
            }
            let (Some(provider), Some(region)) = (label(block, 0), attribute(&block.body, "region"))
            else {
                continue;
            };
            if let Ok(hcl::Value::String(region)) = region.evaluate(&context) {
                regions.insert(provider.to_string(), region);
            }
        }

        for block in blocks(body, "resource") {
            let (Some(resource_type), Some(name)) = (label(block, 0), label(block, 1)) else {
                continue;
            };
            let base = format!("{prefix}{resource_type}.{name}");
            // azurerm_linux_virtual_machine -> azurerm
            let provider = resource_type.split('_').next().unwrap_or(resource_type);
            let region = regions.get(provider).cloned();

            for instance in instances(&block.body, &context, &base, self.limits.max_instances) {
                let mut scope = scope.clone();
                instance.bind(&mut scope);
                let values = arguments(&block.body, &scope.context(), RESOURCE_META_ARGUMENTS);

                self.declarations.push(
                    ResourceDeclaration::terraform(
                        instance.address(&base),
                        resource_type,
                        hcl::Value::Object(values).into(),
                    )
                    .with_provider_region(region.clone()),
                );
            }
        }

        for block in blocks(body, "module") {
            self.module_call(block, dir, &scope, prefix, depth, &regions);
        }
    }

    fn module_call(
        &mut self,
        block: &hcl::Block,
        dir: &Path,
        scope: &Scope,
        prefix: &str,
        depth: usize,
        regions: &HashMap<String, String>,
    ) {
        let Some(name) = label(block, 0) else {
            return;
        };
        let base = format!("{prefix}module.{name}");
        let context = scope.context();

        let source = match attribute(&block.body, "source").map(|expr| expr.evaluate(&context)) {
            Some(Ok(hcl::Value::String(source))) => source,
            _ => {
                tracing::debug!(module = %base, "module source is not a literal string");
                return;
            }
        };
        if !is_local_source(&source) {
            tracing::debug!(module = %base, %source, "not following remote module source");
            return;
        }
        if depth >= self.limits.max_module_depth {
            tracing::warn!(module = %base, depth, "module depth limit reached");
            return;
        }

        let module_dir = normalize(&dir.join(local_source_dir(&source)));
        let module_body = match load_module(&module_dir) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(
                    module = %base,
                    dir = %module_dir.display(),
                    error = &err as &dyn std::error::Error,
                    "unable to load module"
                );
                return;
            }
        };

        for instance in instances(&block.body, &context, &base, self.limits.max_instances) {
            let mut scope = scope.clone();
            instance.bind(&mut scope);
            let inputs = arguments(&block.body, &scope.context(), MODULE_META_ARGUMENTS);

            self.module(
                &module_dir,
                &module_body,
                inputs,
                &format!("{}.", instance.address(&base)),
                depth + 1,
                regions,
            );
        }
    }
}

/// Resolve `locals` blocks into `local`, repeating until no further local can be evaluated
pub(crate) fn resolve_locals(body: &hcl::Body, scope: &mut Scope) {
    let mut pending: Vec<(&str, &hcl::Expression)> = blocks(body, "locals")
        .flat_map(|block| block.body.attributes())
        .map(|attribute| (attribute.key(), attribute.expr()))
        .collect();
    let mut locals = hcl::Map::new();

    loop {
        scope.set("local", hcl::Value::Object(locals.clone()));
        let context = scope.context();

        let mut resolved = vec![];
        pending.retain(|(name, expr)| match expr.evaluate(&context) {
            Ok(value) => {
                resolved.push((name.to_string(), value));
                false
            }
            Err(_) => true,
        });

        if resolved.is_empty() {
            break;
        }
        locals.extend(resolved);
    }

    for (name, _) in pending {
        tracing::trace!(local = name, "local is not statically known");
    }
}

/// Expand `count` / `for_each`
///
/// A `count` that is not statically known yields one instance, an unknown `for_each` yields none.
fn instances(body: &hcl::Body, context: &Context, address: &str, max_instances: usize) -> Vec<Instance> {
    let mut instances = if let Some(count) = attribute(body, "count") {
        match count.evaluate(context) {
            Ok(hcl::Value::Number(count)) if count.as_u64().is_some() => {
                let count = count.as_u64().unwrap_or_default();
                if count > max_instances as u64 {
                    tracing::warn!(
                        address,
                        count,
                        max_instances,
                        "count exceeds the instance limit, truncating"
                    );
                }
                return (0..count.min(max_instances as u64))
                    .map(Instance::Index)
                    .collect();
            }
            _ => {
                tracing::debug!(address, "count is not statically known, assuming one instance");
                vec![Instance::Index(0)]
            }
        }
    } else if let Some(for_each) = attribute(body, "for_each") {
        match for_each.evaluate(context) {
            Ok(hcl::Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| Instance::Key(key, value))
                .collect(),
            Ok(hcl::Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    hcl::Value::String(key) => {
                        let value = hcl::Value::from(key.as_str());
                        Some(Instance::Key(key, value))
                    }
                    _ => None,
                })
                .collect(),
            _ => {
                tracing::debug!(address, "for_each is not statically known, skipping");
                vec![]
            }
        }
    } else {
        vec![Instance::Single]
    };

    if instances.len() > max_instances {
        tracing::warn!(
            address,
            count = instances.len(),
            max_instances,
            "for_each exceeds the instance limit, truncating"
        );
        instances.truncate(max_instances);
    }
    instances
}

/// Attributes and nested blocks of `body` as an object; nested blocks become arrays of objects
fn arguments(body: &hcl::Body, context: &Context, skip: &[&str]) -> Variables {
    let mut values = Variables::new();

    for attribute in body.attributes() {
        if skip.contains(&attribute.key()) {
            continue;
        }
        match attribute.expr().evaluate(context) {
            Ok(value) => {
                values.insert(attribute.key().to_string(), value);
            }
            Err(err) => {
                tracing::trace!(attribute = attribute.key(), %err, "attribute is not statically known")
            }
        }
    }

    for block in body.blocks() {
        if IGNORED_BLOCKS.contains(&block.identifier()) {
            continue;
        }
        let nested = hcl::Value::Object(arguments(&block.body, context, &[]));
        let entry = values
            .entry(block.identifier().to_string())
            .or_insert_with(|| hcl::Value::Array(vec![]));
        if let hcl::Value::Array(items) = entry {
            items.push(nested);
        }
    }

    values
}

fn blocks<'a>(body: &'a hcl::Body, ident: &'a str) -> impl Iterator<Item = &'a hcl::Block> + 'a {
    body.blocks().filter(move |block| block.identifier() == ident)
}

fn label(block: &hcl::Block, index: usize) -> Option<&str> {
    block.labels().get(index).map(|label| label.as_str())
}

fn attribute<'a>(body: &'a hcl::Body, key: &str) -> Option<&'a hcl::Expression> {
    body.attributes()
        .find(|attribute| attribute.key() == key)
        .map(|attribute| attribute.expr())
}

fn object<const N: usize>(entries: [(&str, hcl::Value); N]) -> hcl::Value {
    hcl::Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

fn path_value(path: &Path) -> hcl::Value {
    hcl::Value::from(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::SourceFormat;
    use crate::schema::SchemaHandle;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn declarations(dir: &Path, var_files: Vec<PathBuf>, depth: usize) -> Vec<ResourceDeclaration> {
        let metadata = ProjectMetadata::new(
            "test".into(),
            SourceFormat::ImperativeDir,
            dir.to_path_buf(),
            None,
            var_files,
        );
        let limits = Limits {
            max_module_depth: depth,
            ..Default::default()
        };
        TerraformDirProvider::load(metadata, limits)
            .unwrap()
            .declarations()
            .unwrap()
    }

    fn values(declaration: &ResourceDeclaration) -> &Value {
        let SchemaHandle::Terraform(values) = &declaration.handle else {
            panic!("expected terraform values");
        };
        values
    }

    #[test]
    fn variables_overlays_and_locals() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.tf",
            r#"
            variable "size" { default = "Standard_B1s" }
            variable "env" { default = "dev" }

            locals { name = "${local.prefix}-web" }
            locals { prefix = "app-${var.env}" }

            resource "azurerm_linux_virtual_machine" "web" {
              name           = local.name
              size           = var.size
              admin_password = random_password.admin.result
              count          = 1

              os_disk {
                caching = "ReadWrite"
              }

              lifecycle {
                ignore_changes = [tags]
              }
            }
            "#,
        );
        let first = write(dir.path(), "dev.tfvars", r#"size = "Standard_B2s""#);
        let second = write(dir.path(), "override.tfvars.json", r#"{"size": "Standard_D2s_v3"}"#);

        let declarations = declarations(dir.path(), vec![first, second], DEFAULT_MAX_MODULE_DEPTH);
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].address, "azurerm_linux_virtual_machine.web[0]");

        let values = values(&declarations[0]);
        assert_eq!(values.string("name"), "app-dev-web");
        assert_eq!(values.string("size"), "Standard_D2s_v3");
        assert_eq!(values.string("os_disk.0.caching"), "ReadWrite");
        assert!(!values.exists("admin_password"));
        assert!(!values.exists("count"));
        assert!(!values.exists("lifecycle"));
    }

    #[test]
    fn count_and_for_each_expand_instances() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.tf",
            r#"
            variable "disks" {
              default = { data = "Premium_LRS", logs = "Standard_LRS" }
            }

            resource "azurerm_managed_disk" "disk" {
              for_each             = var.disks
              name                 = each.key
              storage_account_type = each.value
            }

            resource "azurerm_linux_virtual_machine" "node" {
              count = length(["a", "b"])
              name  = "node-${count.index}"
            }

            resource "azurerm_linux_virtual_machine" "none" {
              count = 0
            }
            "#,
        );

        let declarations = declarations(dir.path(), vec![], DEFAULT_MAX_MODULE_DEPTH);
        let summary: Vec<_> = declarations
            .iter()
            .map(|d| (d.address.as_str(), values(d).string("name")))
            .collect();
        assert_eq!(
            summary,
            vec![
                (r#"azurerm_managed_disk.disk["data"]"#, "data".to_string()),
                (r#"azurerm_managed_disk.disk["logs"]"#, "logs".to_string()),
                ("azurerm_linux_virtual_machine.node[0]", "node-0".to_string()),
                ("azurerm_linux_virtual_machine.node[1]", "node-1".to_string()),
            ]
        );
        assert_eq!(values(&declarations[1]).string("storage_account_type"), "Standard_LRS");
    }

    #[test]
    fn instance_expansion_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.tf",
            r#"
            resource "azurerm_managed_disk" "many" {
              count = 3000000
            }

            resource "azurerm_managed_disk" "keyed" {
              for_each = { a = 1, b = 2, c = 3 }
            }
            "#,
        );
        let metadata = ProjectMetadata::new(
            "test".into(),
            SourceFormat::ImperativeDir,
            dir.path().to_path_buf(),
            None,
            vec![],
        );
        let limits = Limits {
            max_instances: 2,
            ..Default::default()
        };

        let addresses: Vec<_> = TerraformDirProvider::load(metadata, limits)
            .unwrap()
            .declarations()
            .unwrap()
            .into_iter()
            .map(|d| d.address)
            .collect();
        assert_eq!(
            addresses,
            vec![
                "azurerm_managed_disk.many[0]",
                "azurerm_managed_disk.many[1]",
                r#"azurerm_managed_disk.keyed["a"]"#,
                r#"azurerm_managed_disk.keyed["b"]"#,
            ]
        );
    }

    #[test]
    fn local_modules_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.tf",
            r#"
            provider "aws" { region = "eu-west-1" }
            provider "aws" {
              alias  = "us"
              region = "us-west-2"
            }

            module "vm" {
              source = "./modules//vm"
              size   = "Standard_B2s"
            }

            module "registry" {
              source  = "Azure/compute/azurerm"
              version = "5.0.0"
            }
            "#,
        );
        write(
            dir.path(),
            "modules/vm/main.tf",
            r#"
            variable "size" {}
            resource "azurerm_linux_virtual_machine" "this" { size = var.size }
            resource "aws_db_instance" "db" {}
            "#,
        );

        let declarations = declarations(dir.path(), vec![], DEFAULT_MAX_MODULE_DEPTH);
        let summary: Vec<_> = declarations
            .iter()
            .map(|d| (d.address.as_str(), d.provider_region.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("module.vm.azurerm_linux_virtual_machine.this", None),
                ("module.vm.aws_db_instance.db", Some("eu-west-1")),
            ]
        );
        assert_eq!(values(&declarations[0]).string("size"), "Standard_B2s");
    }

    #[test]
    fn module_depth_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", r#"module "a" { source = "./a" }"#);
        write(
            dir.path(),
            "a/main.tf",
            r#"
            module "b" { source = "../b" }
            resource "azurerm_managed_disk" "a" {}
            "#,
        );
        write(dir.path(), "b/main.tf", r#"resource "azurerm_managed_disk" "b" {}"#);

        let addresses = |depth| -> Vec<String> {
            declarations(dir.path(), vec![], depth)
                .into_iter()
                .map(|d| d.address)
                .collect()
        };
        assert_eq!(addresses(0), Vec::<String>::new());
        assert_eq!(addresses(1), vec!["module.a.azurerm_managed_disk.a"]);
        assert_eq!(
            addresses(2),
            vec![
                "module.a.azurerm_managed_disk.a",
                "module.a.module.b.azurerm_managed_disk.b",
            ]
        );
    }

    #[test]
    fn invalid_var_file_fails_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", r#"variable "size" {}"#);
        let var_file = write(dir.path(), "broken.tfvars", r#"size = {"#);

        let metadata = ProjectMetadata::new(
            "test".into(),
            SourceFormat::ImperativeDir,
            dir.path().to_path_buf(),
            None,
            vec![var_file],
        );
        let err = TerraformDirProvider::load(metadata, Limits::default()).unwrap_err();
        assert!(matches!(err, ProviderError::Load(LoadError::HclParseFailed { .. })));
    }

    #[test]
    fn missing_directory_fails_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ProjectMetadata::new(
            "test".into(),
            SourceFormat::ImperativeDir,
            dir.path().join("missing"),
            None,
            vec![],
        );
        assert!(TerraformDirProvider::load(metadata, Limits::default()).is_err());
    }
}
