//! Detection over a fixture repository
//!
//! Builds a small mono-repo with environments, a local module, a Terragrunt directory and tool caches in a temporary
//! directory and checks which projects are found.

use iacost::config::{Config, ProjectConfig};
use iacost::detect::{detect, DetectOptions};
use iacost::format::{SourceFormat, Sniffer};
use serde::Serialize;
use std::path::Path;

fn write(root: &Path, name: &str, contents: &str) {
    let path = root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "envs/app/main.tf",
        r#"
        variable "size" { default = "Standard_B1s" }

        module "vm" {
          source = "../../modules/vm"
          size   = var.size
        }
        "#,
    );
    write(root, "envs/app/terraform.tfvars", r#"size = "Standard_B2s""#);
    write(root, "envs/app/staging.tfvars", r#"size = "Standard_D2s_v3""#);
    write(root, "envs/app/prod.tfvars", r#"size = "Standard_D4s_v3""#);
    write(
        root,
        "modules/vm/main.tf",
        r#"
        variable "size" {}
        resource "azurerm_linux_virtual_machine" "this" { size = var.size }
        "#,
    );
    write(
        root,
        "live/terragrunt.hcl",
        r#"
        terraform { source = "../modules//vm" }
        inputs = { size = "Standard_E2s_v3" }
        "#,
    );
    write(root, "envs/app/.terraform/modules/cache/main.tf", "");
    write(root, ".github/main.tf", "");

    dir
}

#[derive(Serialize)]
struct Project {
    name: String,
    format: SourceFormat,
    var_files: Vec<String>,
}

fn projects(root: &Path, config: &Config) -> Vec<Project> {
    let project = ProjectConfig {
        name: Some("repo".into()),
        ..ProjectConfig::new(root)
    };
    let options = DetectOptions {
        workers: 4,
        ..Default::default()
    };

    detect(&project, config, &options)
        .unwrap()
        .iter()
        .map(|provider| {
            let metadata = provider.metadata();
            Project {
                name: metadata.name.clone(),
                format: metadata.format,
                var_files: metadata
                    .var_files
                    .iter()
                    .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                    .collect(),
            }
        })
        .collect()
}

#[test]
fn detects_environments_and_nested_tool_roots() {
    let dir = fixture();
    let root = dir.path().canonicalize().unwrap();

    insta::assert_yaml_snapshot!(projects(&root, &Config::default()), @r###"
    ---
    - name: repo/envs/app-prod
      format: terraform_dir
      var_files:
        - terraform.tfvars
        - prod.tfvars
    - name: repo/envs/app-staging
      format: terraform_dir
      var_files:
        - terraform.tfvars
        - staging.tfvars
    - name: repo/live
      format: terragrunt_dir
      var_files: []
    "###);
}

#[test]
fn excluded_dirs_and_env_overrides() {
    let dir = fixture();
    let root = dir.path().canonicalize().unwrap();

    let config = Config::from_yaml(
        r#"
autodetect:
  exclude_dirs: [live]
  path_overrides:
    - path: envs/app
      exclude: [staging]
"#,
    )
    .unwrap();

    let names: Vec<_> = projects(&root, &config).into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["repo/envs/app-prod"]);
}

#[test]
fn nested_tool_marker_depth() {
    let dir = tempfile::tempdir().unwrap();
    let sniffer = Sniffer::default();

    write(dir.path(), "a/b/c/terragrunt.hcl", "");
    write(dir.path(), "a/.terraform/terragrunt.hcl", "");
    assert_eq!(sniffer.classify(dir.path()), SourceFormat::NestedToolDir);

    let deep = tempfile::tempdir().unwrap();
    write(deep.path(), "a/b/c/d/e/f/terragrunt.hcl", "");
    assert_eq!(sniffer.classify(deep.path()), SourceFormat::ImperativeDir);
}
