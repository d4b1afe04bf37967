//! configuration file
//!
//! ```yaml
//! version: 0.1
//! projects:
//!   - path: infra/prod
//!     name: production
//!     var_files: [prod.tfvars]
//!     usage_file: usage.yml
//!   - path: infra/modules
//!     include_all_paths: true
//! autodetect:
//!   env_names: [dev, prod]
//!   exclude_dirs: ["legacy/**"]
//!   path_overrides:
//!     - path: infra/shared
//!       only: [prod]
//! defaults:
//!   region: eu-west-1
//! ```
//!
//! Relative project and usage file paths are relative to the directory of the configuration file, var files are
//! relative to their project.
use crate::locator::PathOverride;
use crate::resources::AdapterDefaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_FILE_VERSION: &str = "0.1";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    #[serde(default)]
    pub autodetect: AutodetectConfig,
    #[serde(default)]
    pub defaults: AdapterDefaults,
    /// Path of the file this was loaded from
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    /// User-authored overlay files, used verbatim and in this order
    #[serde(default, alias = "terraform_var_files")]
    pub var_files: Vec<PathBuf>,
    /// Directory patterns not scanned below this project
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Keep directories called as local modules as roots
    #[serde(default)]
    pub include_all_paths: bool,
    /// Treat `path` as the only root
    #[serde(default)]
    pub skip_autodetect: bool,
    #[serde(default)]
    pub usage_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AutodetectConfig {
    #[serde(default)]
    pub env_names: Vec<String>,
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub path_overrides: Vec<PathOverride>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    version: Option<serde_json::Value>,
    #[serde(flatten)]
    config: Config,
}

impl ProjectConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Config {
    /// A configuration of a single project, as given on the command line
    pub fn for_project(project: ProjectConfig) -> Self {
        Self {
            projects: vec![project],
            ..Default::default()
        }
    }

    /// Was this configuration read from a file?
    ///
    /// Projects of a configuration file are user-authored: their overlay files are never grouped into environments.
    pub fn is_from_file(&self) -> bool {
        self.config_file.is_some()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path=%path.display(), "loading config file");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&contents)?;
        if config.projects.is_empty() {
            return Err(ConfigError::NoProjects(path.to_path_buf()));
        }

        let base = path.parent().unwrap_or(Path::new(""));
        for project in &mut config.projects {
            project.resolve(base);
        }
        config.config_file = Some(path.to_path_buf());

        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents)?;

        if let Some(version) = raw.version {
            let version = match version {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            if version != SUPPORTED_CONFIG_FILE_VERSION {
                return Err(ConfigError::UnsupportedVersion(version));
            }
        }

        Ok(raw.config)
    }
}

impl ProjectConfig {
    fn resolve(&mut self, base: &Path) {
        self.path = base.join(&self.path);
        for var_file in &mut self.var_files {
            *var_file = self.path.join(&*var_file);
        }
        if let Some(usage_file) = &mut self.usage_file {
            *usage_file = base.join(&*usage_file);
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unsupported config file version {0}, expected {SUPPORTED_CONFIG_FILE_VERSION}")]
    UnsupportedVersion(String),
    #[error("Config file {0} does not list any projects")]
    NoProjects(PathBuf),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iacost.yml");
        std::fs::write(
            &path,
            r#"
version: 0.1
projects:
  - path: infra/prod
    name: production
    terraform_var_files: [prod.tfvars, /abs/extra.tfvars]
    usage_file: usage.yml
    skip_autodetect: true
autodetect:
  env_names: [live]
  exclude_dirs: ["legacy/**"]
  path_overrides:
    - path: infra/shared
      only: [prod]
defaults:
  region: eu-west-1
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.is_from_file());

        let project = &config.projects[0];
        assert_eq!(project.path, dir.path().join("infra/prod"));
        assert_eq!(project.name.as_deref(), Some("production"));
        assert_eq!(
            project.var_files,
            vec![
                dir.path().join("infra/prod/prod.tfvars"),
                PathBuf::from("/abs/extra.tfvars"),
            ]
        );
        assert_eq!(project.usage_file, Some(dir.path().join("usage.yml")));
        assert!(project.skip_autodetect);
        assert!(!project.include_all_paths);

        assert_eq!(config.autodetect.env_names, vec!["live"]);
        assert_eq!(
            config.autodetect.path_overrides,
            vec![PathOverride {
                path: "infra/shared".into(),
                only: vec!["prod".into()],
                exclude: vec![],
            }]
        );

        assert_eq!(config.defaults.region, "eu-west-1");
        assert_eq!(config.defaults.db_allocated_storage_gb, 100.0);
    }

    #[test]
    fn version_is_checked() {
        let err = Config::from_yaml("version: 0.2\nprojects: []").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion(v) if v == "0.2"));

        assert!(Config::from_yaml("projects: [{path: .}]").is_ok());
    }

    #[test]
    fn config_without_projects_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iacost.yml");
        std::fs::write(&path, "version: 0.1\n").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::NoProjects(_))));
    }

    #[test]
    fn command_line_project_is_not_from_file() {
        let config = Config::for_project(ProjectConfig::new("."));
        assert!(!config.is_from_file());
        assert_eq!(config.defaults, AdapterDefaults::default());
    }
}
