//! overlay (variable) files and their grouping into environments
//!
//! A configuration root is often deployed several times with different variable files, one set per environment:
//!
//! ```text
//! root/
//! ├── main.tf
//! ├── terraform.tfvars      global: applies to every environment
//! ├── common.tfvars         global: root level, no environment token
//! ├── staging.tfvars        environment "staging"
//! ├── prod.tfvars           environment "prod"
//! └── envs/
//!     └── dev/
//!         └── terraform.tfvars   environment "dev" (taken from the directory)
//! ```
//!
//! [group] partitions the overlay files of one root into [Environment]s. Global files are shared by all environments
//! and are never part of an environment's scoped files.
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name suffixes of overlay files
pub const VAR_FILE_SUFFIXES: [&str; 2] = [".tfvars", ".tfvars.json"];

/// Overlay files Terraform loads without being asked to
pub const DEFAULT_VAR_FILES: [&str; 2] = ["terraform.tfvars", "terraform.tfvars.json"];

pub const DEFAULT_ENV_NAMES: [&str; 21] = [
    "dev",
    "develop",
    "development",
    "test",
    "testing",
    "qa",
    "uat",
    "stage",
    "stg",
    "staging",
    "preprod",
    "prod",
    "prd",
    "production",
    "live",
    "sandbox",
    "demo",
    "int",
    "integration",
    "perf",
    "dr",
];

const TOKEN_DELIMITERS: [char; 3] = ['-', '_', '.'];

pub fn is_var_file(name: &str) -> bool {
    VAR_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// `terraform.tfvars(.json)` or `*.auto.tfvars(.json)`
pub fn is_auto_var_file(name: &str) -> bool {
    DEFAULT_VAR_FILES.contains(&name)
        || name.ends_with(".auto.tfvars")
        || name.ends_with(".auto.tfvars.json")
}

fn is_default_var_file(name: &str) -> bool {
    DEFAULT_VAR_FILES.contains(&name)
}

/// File name without the overlay suffixes, `prod.auto.tfvars.json` -> `prod`
fn var_file_stem(name: &str) -> &str {
    let stem = name
        .strip_suffix(".tfvars.json")
        .or_else(|| name.strip_suffix(".tfvars"))
        .unwrap_or(name);
    stem.strip_suffix(".auto").unwrap_or(stem)
}

/// Recognized environment name tokens (lowercase)
#[derive(Debug, Clone, PartialEq)]
pub struct EnvNames(Vec<String>);

impl Default for EnvNames {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_NAMES)
    }
}

impl EnvNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        )
    }

    /// Does `stem` equal a token or carry one as a delimited suffix or prefix?
    pub fn matches(&self, stem: &str) -> bool {
        let stem = stem.to_lowercase();

        self.0.iter().any(|name| {
            if stem == *name {
                return true;
            }

            let suffix = stem
                .strip_suffix(name.as_str())
                .is_some_and(|rest| rest.ends_with(TOKEN_DELIMITERS));
            let prefix = stem
                .strip_prefix(name.as_str())
                .is_some_and(|rest| rest.starts_with(TOKEN_DELIMITERS));

            suffix || prefix
        })
    }
}

/// A variable file found near a configuration root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayFile {
    /// Relative to the root directory
    pub rel_path: PathBuf,
    /// Environment the file is scoped to, if any
    pub env_name: Option<String>,
    /// Matches the auto-loaded naming convention
    pub is_auto: bool,
}

impl OverlayFile {
    pub fn classify(rel_path: PathBuf, env_names: &EnvNames) -> Self {
        let name = rel_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = var_file_stem(&name);
        let is_auto = is_auto_var_file(&name);
        let parent = rel_path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());

        let env_name = match parent {
            // auto files in the root apply everywhere
            None if is_auto => None,
            None if env_names.matches(stem) => Some(stem.to_string()),
            None => None,
            // auto files in subdirectories belong to the directory
            Some(dir) if is_auto => Some(dir),
            Some(_) if env_names.matches(stem) => Some(stem.to_string()),
            Some(dir) if env_names.matches(&dir) => Some(dir),
            Some(_) => None,
        };

        Self {
            rel_path,
            env_name,
            is_auto,
        }
    }

    pub fn is_root_level(&self) -> bool {
        self.rel_path
            .parent()
            .map_or(true, |parent| parent.as_os_str().is_empty())
    }

    /// Applies to every environment of the root
    pub fn is_global(&self) -> bool {
        self.is_root_level() && self.env_name.is_none()
    }

    fn file_name(&self) -> String {
        self.rel_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Terraform's own load order: `terraform.tfvars*`, then `*.auto.tfvars*`, then everything else
    fn load_rank(&self) -> u8 {
        let name = self.file_name();
        if is_default_var_file(&name) {
            0
        } else if self.is_auto {
            1
        } else {
            2
        }
    }
}

/// A named set of overlay files for one deployment target
#[derive(Debug, Clone, Serialize)]
pub struct Environment {
    pub name: String,
    /// Files scoped to this environment only
    pub var_files: Vec<OverlayFile>,
    /// Files shared by every environment of the root
    #[serde(skip)]
    pub global: Arc<[OverlayFile]>,
}

impl Environment {
    /// Global files followed by the scoped ones; later files take precedence
    pub fn ordered_paths(&self) -> Vec<PathBuf> {
        self.global
            .iter()
            .chain(&self.var_files)
            .map(|file| file.rel_path.clone())
            .collect()
    }
}

/// Restricts which environments of a root are kept
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvFilter {
    pub only: Vec<String>,
    pub exclude: Vec<String>,
}

impl EnvFilter {
    pub fn allows(&self, name: &str) -> bool {
        let listed = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(name));

        (self.only.is_empty() || listed(&self.only)) && !listed(&self.exclude)
    }
}

/// Result of grouping the overlay files of one root
#[derive(Debug, Clone)]
pub struct Grouping {
    pub global: Arc<[OverlayFile]>,
    pub environments: Vec<Environment>,
}

impl Grouping {
    pub fn global_paths(&self) -> Vec<PathBuf> {
        self.global.iter().map(|file| file.rel_path.clone()).collect()
    }
}

/// Partition overlay files into environments
///
/// Files scoped to an environment rejected by `filter` are dropped along with it. Files that are neither global nor
/// scoped are ignored.
pub fn group(files: &[OverlayFile], filter: &EnvFilter) -> Grouping {
    let mut global: Vec<OverlayFile> = files.iter().filter(|f| f.is_global()).cloned().collect();
    global.sort_by(|a, b| {
        (a.load_rank(), &a.rel_path).cmp(&(b.load_rank(), &b.rel_path))
    });
    let global: Arc<[OverlayFile]> = global.into();

    let mut scoped: std::collections::BTreeMap<String, Vec<OverlayFile>> = Default::default();
    for file in files {
        let Some(name) = &file.env_name else {
            if !file.is_global() {
                tracing::debug!(path=%file.rel_path.display(), "overlay file matches no environment");
            }
            continue;
        };

        if !filter.allows(name) {
            tracing::debug!(path=%file.rel_path.display(), env=%name, "environment filtered out");
            continue;
        }

        scoped.entry(name.clone()).or_default().push(file.clone());
    }

    let environments = scoped
        .into_iter()
        .map(|(name, mut var_files)| {
            var_files.sort_by(|a, b| {
                (a.load_rank(), &a.rel_path).cmp(&(b.load_rank(), &b.rel_path))
            });
            Environment {
                name,
                var_files,
                global: global.clone(),
            }
        })
        .collect();

    Grouping {
        global,
        environments,
    }
}
