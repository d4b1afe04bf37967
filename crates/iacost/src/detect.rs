//! detection: from a project path to providers
//!
//! 1. the path is classified by the [Sniffer](crate::format::Sniffer)
//! 2. a single artifact (plan, state, template) is one unit of work
//! 3. anything else is scanned for configuration roots; each root is one unit of work per environment, or a single
//!    unit when it has no environments or when its overlay files are user-authored
//! 4. the providers of all units are built on a worker pool
use crate::config::{Config, ProjectConfig};
use crate::locator::{LocatorConfig, LocatorError, ProjectLocator, RootPath};
use crate::provider::{build_providers, Provider, ProviderContext, ProviderError, UnitOfWork};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DetectOptions {
    /// Size of the provider worker pool
    pub workers: usize,
    /// Give up on detection after this long; no partial result is returned
    pub timeout: Option<Duration>,
    pub context: ProviderContext,
    /// Paths changed by the commit under test, relative to the project path
    pub changed_objects: Vec<PathBuf>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout: None,
            context: ProviderContext::default(),
            changed_objects: vec![],
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(4)
}

/// Detect all units of work of `project` and build their providers
///
/// Fails when `project.path` does not exist, when nothing could be detected or when the timeout expires.
pub fn detect(
    project: &ProjectConfig,
    config: &Config,
    options: &DetectOptions,
) -> Result<Vec<Box<dyn Provider>>, DetectError> {
    let Some(timeout) = options.timeout else {
        return detect_providers(project, config, options);
    };

    let (sender, receiver) = mpsc::channel();
    let (project, config, options) = (project.clone(), config.clone(), options.clone());
    std::thread::Builder::new()
        .name("iacost-detect".to_string())
        .spawn(move || {
            // the receiver is gone once the timeout expired
            let _ = sender.send(detect_providers(&project, &config, &options));
        })
        .map_err(DetectError::Spawn)?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(?timeout, "detection timed out, discarding results");
            Err(DetectError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(DetectError::Aborted),
    }
}

fn detect_providers(
    project: &ProjectConfig,
    config: &Config,
    options: &DetectOptions,
) -> Result<Vec<Box<dyn Provider>>, DetectError> {
    let units = plan_units(project, config, options)?;
    let providers = build_providers(&units, &options.context, options.workers)?;

    if providers.is_empty() {
        return Err(DetectError::CouldNotDetect(project.path.clone()));
    }
    Ok(providers)
}

/// Units of work of `project`, in a stable order
#[tracing::instrument(level = "debug", skip_all, fields(path = %project.path.display()))]
pub fn plan_units(
    project: &ProjectConfig,
    config: &Config,
    options: &DetectOptions,
) -> Result<Vec<UnitOfWork>, DetectError> {
    let path = &project.path;
    if !path.exists() {
        return Err(DetectError::NotFound(path.clone()));
    }

    let sniffer = &options.context.sniffer;
    let format = sniffer.classify(path);
    let name = project
        .name
        .clone()
        .unwrap_or_else(|| path.display().to_string());
    tracing::debug!(%format, "classified project");

    if format.is_single_artifact() {
        return Ok(vec![UnitOfWork::Artifact {
            name,
            path: path.clone(),
            format,
        }]);
    }

    let locator = ProjectLocator::new(locator_config(project, config, options), sniffer.clone())?;
    let roots = locator.find_roots(path)?;
    if roots.is_empty() {
        return Err(DetectError::CouldNotDetect(path.clone()));
    }

    let user_authored = config.is_from_file() || !project.var_files.is_empty();
    let units = roots
        .iter()
        .flat_map(|root| root_units(&locator, root, &name, project, user_authored))
        .collect();

    Ok(units)
}

fn locator_config(project: &ProjectConfig, config: &Config, options: &DetectOptions) -> LocatorConfig {
    let autodetect = &config.autodetect;

    LocatorConfig {
        excluded_dirs: project
            .exclude_paths
            .iter()
            .chain(&autodetect.exclude_dirs)
            .cloned()
            .collect(),
        included_dirs: autodetect.include_dirs.clone(),
        path_overrides: autodetect.path_overrides.clone(),
        env_names: autodetect.env_names.clone(),
        changed_objects: options.changed_objects.clone(),
        use_all_paths: project.include_all_paths,
        skip_auto_detection: project.skip_autodetect,
        fallback_to_include_paths: !config.is_from_file(),
    }
}

fn root_units(
    locator: &ProjectLocator,
    root: &RootPath,
    project_name: &str,
    project: &ProjectConfig,
    user_authored: bool,
) -> Vec<UnitOfWork> {
    let name = if root.rel_path == Path::new(".") {
        project_name.to_string()
    } else {
        format!("{project_name}/{}", root.rel_path.display())
    };
    let unit = |name: String, environment: Option<String>, var_files: Vec<PathBuf>| UnitOfWork::Root {
        name,
        path: root.path.clone(),
        is_nested_tool: root.is_nested_tool,
        environment,
        var_files,
    };
    let absolute = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
        paths.into_iter().map(|p| root.path.join(p)).collect()
    };

    let grouping = locator.environments(root);

    if user_authored {
        // auto-loaded files still apply; the user's files follow in the given order
        let mut var_files: Vec<PathBuf> = grouping
            .global
            .iter()
            .filter(|file| file.is_auto)
            .map(|file| root.path.join(&file.rel_path))
            .collect();
        var_files.extend(project.var_files.iter().map(|p| project.path.join(p)));
        return vec![unit(name, None, var_files)];
    }

    if grouping.environments.is_empty() {
        return vec![unit(name, None, absolute(grouping.global_paths()))];
    }

    grouping
        .environments
        .iter()
        .map(|env| {
            unit(
                format!("{name}-{}", env.name),
                Some(env.name.clone()),
                absolute(env.ordered_paths()),
            )
        })
        .collect()
}

#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("No such file or directory {0}")]
    NotFound(PathBuf),
    #[error("could not detect project type for '{}'", .0.display())]
    CouldNotDetect(PathBuf),
    #[error("Detection did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Detection stopped unexpectedly")]
    Aborted,
    #[error("Unable to start detection")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::SourceFormat;
    use crate::provider::PlanRenderer;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::Arc;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn project(path: &Path) -> ProjectConfig {
        ProjectConfig {
            name: Some("infra".into()),
            ..ProjectConfig::new(path)
        }
    }

    fn summary(providers: &[Box<dyn Provider>], root: &Path) -> Vec<(String, Vec<String>)> {
        providers
            .iter()
            .map(|provider| {
                let metadata = provider.metadata();
                let var_files = metadata
                    .var_files
                    .iter()
                    .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
                    .collect();
                (metadata.name.clone(), var_files)
            })
            .collect()
    }

    const MAIN: &str = r#"
        variable "size" { default = "Standard_B1s" }
        resource "azurerm_linux_virtual_machine" "vm" { size = var.size }
    "#;

    #[test]
    fn one_provider_per_environment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "main.tf", MAIN);
        write(&root, "terraform.tfvars", r#"size = "Standard_B2s""#);
        write(&root, "staging.tfvars", r#"size = "Standard_D2s_v3""#);
        write(&root, "prod.tfvars", r#"size = "Standard_D4s_v3""#);

        let providers = detect(&project(&root), &Config::default(), &DetectOptions::default()).unwrap();
        assert_eq!(
            summary(&providers, &root),
            vec![
                (
                    "infra-prod".to_string(),
                    vec!["terraform.tfvars".to_string(), "prod.tfvars".to_string()]
                ),
                (
                    "infra-staging".to_string(),
                    vec!["terraform.tfvars".to_string(), "staging.tfvars".to_string()]
                ),
            ]
        );
        assert_eq!(providers[0].metadata().environment.as_deref(), Some("prod"));
        assert_eq!(providers[0].metadata().format, SourceFormat::ImperativeDir);
    }

    #[test]
    fn explicit_var_files_bypass_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "main.tf", MAIN);
        write(&root, "terraform.tfvars", r#"size = "Standard_B2s""#);
        write(&root, "staging.tfvars", r#"size = "Standard_D2s_v3""#);
        write(&root, "prod.tfvars", r#"size = "Standard_D4s_v3""#);

        let project = ProjectConfig {
            var_files: vec!["staging.tfvars".into(), "prod.tfvars".into()],
            ..project(&root)
        };
        let providers = detect(&project, &Config::default(), &DetectOptions::default()).unwrap();
        assert_eq!(
            summary(&providers, &root),
            vec![(
                "infra".to_string(),
                vec![
                    "terraform.tfvars".to_string(),
                    "staging.tfvars".to_string(),
                    "prod.tfvars".to_string(),
                ]
            )]
        );
    }

    #[test]
    fn skip_autodetect_over_terragrunt_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "modules/vm/main.tf", MAIN);
        write(
            &root,
            "live/prod/terragrunt.hcl",
            r#"terraform { source = "../../modules//vm" }"#,
        );

        let project = ProjectConfig {
            skip_autodetect: true,
            ..project(&root.join("live"))
        };
        let providers = detect(&project, &Config::default(), &DetectOptions::default()).unwrap();
        assert_eq!(summary(&providers, &root), vec![("infra/prod".to_string(), vec![])]);
        assert_eq!(providers[0].metadata().format, SourceFormat::NestedToolDir);
        assert_eq!(providers[0].declarations().unwrap().len(), 1);
    }

    #[test]
    fn roots_without_environments_are_one_unit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "network/main.tf", MAIN);
        write(&root, "network/defaults.auto.tfvars", r#"size = "Standard_B2s""#);
        write(&root, "compute/main.tf", MAIN);

        let units = plan_units(&project(&root), &Config::default(), &DetectOptions::default()).unwrap();
        let names: Vec<_> = units.iter().map(|u| u.name().to_string()).collect();
        assert_eq!(names, vec!["infra/compute", "infra/network"]);

        let UnitOfWork::Root { var_files, environment, .. } = &units[1] else {
            panic!("expected a root");
        };
        assert_eq!(environment, &None);
        assert_eq!(var_files, &vec![root.join("network/defaults.auto.tfvars")]);
    }

    #[test]
    fn single_artifact_is_one_unit() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plan.json",
            r#"{"format_version":"1.2","planned_values":{"root_module":{}}}"#,
        );

        let providers = detect(
            &ProjectConfig::new(dir.path().join("plan.json")),
            &Config::default(),
            &DetectOptions::default(),
        )
        .unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].metadata().format, SourceFormat::PlanJson);
    }

    #[test]
    fn missing_and_empty_paths() {
        let dir = tempfile::tempdir().unwrap();

        let err = detect(
            &ProjectConfig::new(dir.path().join("missing")),
            &Config::default(),
            &DetectOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DetectError::NotFound(_)));

        let err = detect(&ProjectConfig::new(dir.path()), &Config::default(), &DetectOptions::default())
            .unwrap_err();
        assert!(matches!(err, DetectError::CouldNotDetect(_)));
        assert!(err.to_string().starts_with("could not detect project type for '"));
    }

    #[derive(Debug)]
    struct Slow;

    impl PlanRenderer for Slow {
        fn render(&self, _plan: &Path) -> Result<Vec<u8>, ProviderError> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(br#"{"format_version":"1.2","planned_values":{"root_module":{}}}"#.to_vec())
        }
    }

    #[test]
    fn timeout_discards_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.out");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        zip.start_file("tfplan", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"binary plan").unwrap();
        zip.finish().unwrap();

        let options = DetectOptions {
            timeout: Some(Duration::from_millis(50)),
            context: ProviderContext {
                plan_renderer: Arc::new(Slow),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = detect(&ProjectConfig::new(&path), &Config::default(), &options).unwrap_err();
        assert!(matches!(err, DetectError::Timeout(_)));
    }
}
