//! discovery of independently deployable configuration roots
//!
//! [ProjectLocator::find_roots] walks a directory tree (depth first, in file name order) and collects
//!
//! - candidate directories: directories that directly contain `*.tf` files
//! - Terragrunt directories: recorded as roots with [RootPath::is_nested_tool] set, never descended into
//! - overlay files (`*.tfvars`, `*.tfvars.json`)
//!
//! A candidate that another candidate calls as a local module (`source = "./modules/vpc"`) is a module, not a root.
//! Overlay files are attached to the closest root above them.
//!
//! Which directories are walked is decided in this order:
//! 1. hidden and tool-internal directories are never walked
//! 2. directories matching a path override or an included pattern are always walked
//! 3. directories matching an excluded pattern are skipped, unless a path override or an included pattern may match
//!    below them: then they are passed through without being candidates or contributing overlay files
mod patterns;

pub use patterns::PathPatterns;

use crate::environment::{self, EnvFilter, EnvNames, Grouping, OverlayFile};
use crate::format::{self, Sniffer, NESTED_TOOL_MAX_DEPTH};
use crate::hcl_files::{self, HclFiles};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Restrict or exclude environments of the roots below `path`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PathOverride {
    /// Directory pattern (gitignore semantics)
    pub path: String,
    /// Keep only these environments
    #[serde(default)]
    pub only: Vec<String>,
    /// Drop these environments
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LocatorConfig {
    /// Directory patterns that are not scanned
    pub excluded_dirs: Vec<String>,
    /// Directory patterns that are always scanned and always roots
    pub included_dirs: Vec<String>,
    pub path_overrides: Vec<PathOverride>,
    /// Recognized environment names, defaults to [environment::DEFAULT_ENV_NAMES] when empty
    pub env_names: Vec<String>,
    /// Paths (relative to the scanned path) changed by the commit under test
    pub changed_objects: Vec<PathBuf>,
    /// Keep every candidate, including directories called as modules
    pub use_all_paths: bool,
    /// The scanned path is the only root
    pub skip_auto_detection: bool,
    /// Treat every candidate as a root when no root is found otherwise
    pub fallback_to_include_paths: bool,
}

/// One independently deployable configuration root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootPath {
    pub path: PathBuf,
    /// Relative to the scanned path (`.` for the scanned path itself)
    pub rel_path: PathBuf,
    pub is_nested_tool: bool,
    /// Relative to [RootPath::path], sorted
    pub var_files: Vec<OverlayFile>,
    /// Local modules called by this root
    pub module_dirs: Vec<PathBuf>,
}

impl RootPath {
    fn new(path: PathBuf, scan_root: &Path, is_nested_tool: bool) -> Self {
        let rel_path = match path.strip_prefix(scan_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self {
            path,
            rel_path,
            is_nested_tool,
            var_files: vec![],
            module_dirs: vec![],
        }
    }

    /// Was anything in this root touched by `changed` (absolute paths)?
    fn is_affected_by(&self, changed: &[PathBuf]) -> bool {
        changed.iter().any(|path| {
            path.starts_with(&self.path) || self.module_dirs.iter().any(|dir| path.starts_with(dir))
        })
    }
}

/// How the walk treats a directory
#[derive(Debug, Clone, Copy, PartialEq)]
enum Walk {
    Scan,
    /// Descend, but the directory itself is excluded
    PassThrough,
    Skip,
}

#[derive(Debug)]
struct Candidate {
    dir: PathBuf,
    module_dirs: Vec<PathBuf>,
}

impl Candidate {
    fn to_root(&self, scan_root: &Path) -> RootPath {
        let mut root = RootPath::new(self.dir.clone(), scan_root, false);
        root.module_dirs = self.module_dirs.clone();
        root
    }
}

#[derive(Debug)]
pub struct ProjectLocator {
    config: LocatorConfig,
    sniffer: Sniffer,
    env_names: EnvNames,
    excluded: PathPatterns,
    included: PathPatterns,
    /// Union of all path override patterns
    overridden: PathPatterns,
    overrides: Vec<(PathPatterns, PathOverride)>,
}

impl ProjectLocator {
    /// Compiles all directory patterns of `config`
    pub fn new(config: LocatorConfig, sniffer: Sniffer) -> Result<Self, LocatorError> {
        let env_names = if config.env_names.is_empty() {
            EnvNames::default()
        } else {
            EnvNames::new(&config.env_names)
        };

        let override_paths: Vec<&str> = config
            .path_overrides
            .iter()
            .map(|o| o.path.as_str())
            .collect();
        let overrides = config
            .path_overrides
            .iter()
            .map(|o| Ok((PathPatterns::new(&[&o.path])?, o.clone())))
            .collect::<Result<_, LocatorError>>()?;

        Ok(Self {
            excluded: PathPatterns::new(&config.excluded_dirs)?,
            included: PathPatterns::new(&config.included_dirs)?,
            overridden: PathPatterns::new(&override_paths)?,
            overrides,
            config,
            sniffer,
            env_names,
        })
    }

    pub fn env_names(&self) -> &EnvNames {
        &self.env_names
    }

    /// Environment restrictions from path overrides matching `root`
    pub fn env_filter(&self, root: &RootPath) -> EnvFilter {
        let mut filter = EnvFilter::default();

        for (patterns, path_override) in &self.overrides {
            if patterns.matches(&root.rel_path, true) {
                filter.only.extend(path_override.only.iter().cloned());
                filter.exclude.extend(path_override.exclude.iter().cloned());
            }
        }

        filter
    }

    /// Group the overlay files of `root` into environments
    pub fn environments(&self, root: &RootPath) -> Grouping {
        environment::group(&root.var_files, &self.env_filter(root))
    }

    /// Find all configuration roots at or below `path`, sorted by path
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn find_roots(&self, path: &Path) -> Result<Vec<RootPath>, LocatorError> {
        let scan_root = path.canonicalize().map_err(|source| LocatorError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if !scan_root.is_dir() {
            return Ok(vec![]);
        }

        let mut roots = if self.config.skip_auto_detection {
            self.single_root(&scan_root)
        } else {
            self.detect_roots(&scan_root)
        };

        let var_files = self.var_files(&scan_root, &roots);
        self.attach_var_files(&mut roots, var_files);

        if !self.config.changed_objects.is_empty() {
            let changed: Vec<PathBuf> = self
                .config
                .changed_objects
                .iter()
                .map(|p| normalize(&scan_root.join(p)))
                .collect();

            roots.retain(|root| {
                let affected = root.is_affected_by(&changed);
                if !affected {
                    tracing::debug!(root=%root.path.display(), "no changes, skipping");
                }
                affected
            });
        }

        roots.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(count = roots.len(), "found roots");
        Ok(roots)
    }

    /// The scanned path as the only root
    ///
    /// A directory without configuration files of its own that only holds Terragrunt directories yields those.
    fn single_root(&self, scan_root: &Path) -> Vec<RootPath> {
        if self.sniffer.is_nested_tool_dir(scan_root) {
            return vec![RootPath::new(scan_root.to_path_buf(), scan_root, true)];
        }

        let has_config_files =
            hcl_files::config_files_in(scan_root).is_ok_and(|files| !files.is_empty());
        if !has_config_files {
            let nested = self
                .sniffer
                .nested_tool_dirs(scan_root, NESTED_TOOL_MAX_DEPTH);
            if !nested.is_empty() {
                tracing::debug!(count = nested.len(), "path holds terragrunt directories");
                return nested
                    .into_iter()
                    .map(|dir| RootPath::new(dir, scan_root, true))
                    .collect();
            }
        }

        let mut root = RootPath::new(scan_root.to_path_buf(), scan_root, false);
        root.module_dirs = scan_candidate(scan_root).module_dirs;
        vec![root]
    }

    fn detect_roots(&self, scan_root: &Path) -> Vec<RootPath> {
        let mut candidates = vec![];
        let mut nested = vec![];

        let mut it = walkdir::WalkDir::new(scan_root)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = it.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(%err, "skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            if entry.depth() > 0 {
                match self.walk(scan_root, entry.path()) {
                    Walk::Scan => {}
                    Walk::PassThrough => continue,
                    Walk::Skip => {
                        it.skip_current_dir();
                        continue;
                    }
                }
            }

            if self.sniffer.is_nested_tool_dir(entry.path()) {
                tracing::trace!(dir=%entry.path().display(), "terragrunt directory");
                nested.push(entry.path().to_path_buf());
                it.skip_current_dir();
                continue;
            }

            match hcl_files::config_files_in(entry.path()) {
                Ok(files) if !files.is_empty() => candidates.push(scan_candidate(entry.path())),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(dir=%entry.path().display(), %err, "could not read directory")
                }
            }
        }

        let called: HashSet<&Path> = candidates
            .iter()
            .flat_map(|c| c.module_dirs.iter().map(PathBuf::as_path))
            .collect();

        let mut roots: Vec<RootPath> = candidates
            .iter()
            .filter(|candidate| {
                let is_module = called.contains(candidate.dir.as_path());
                let is_included = self.included.matches(rel(scan_root, &candidate.dir), true);
                if is_module && !is_included && !self.config.use_all_paths {
                    tracing::debug!(dir=%candidate.dir.display(), "called as module, not a root");
                    return false;
                }
                true
            })
            .map(|candidate| candidate.to_root(scan_root))
            .collect();

        roots.extend(
            nested
                .into_iter()
                .map(|dir| RootPath::new(dir, scan_root, true)),
        );

        if roots.is_empty() && self.config.fallback_to_include_paths && !candidates.is_empty() {
            tracing::debug!("no roots detected, treating every directory as a root");
            roots = candidates
                .iter()
                .map(|candidate| candidate.to_root(scan_root))
                .collect();
        }

        roots
    }

    fn walk(&self, scan_root: &Path, dir: &Path) -> Walk {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if format::is_skipped_dir(&name) {
            return Walk::Skip;
        }

        let rel = rel(scan_root, dir);
        if self.overridden.matches(rel, true) || self.included.matches(rel, true) {
            return Walk::Scan;
        }

        if !self.excluded.matches(rel, true) {
            return Walk::Scan;
        }

        if self.overridden.may_match_below(rel) || self.included.may_match_below(rel) {
            tracing::trace!(dir=%dir.display(), "excluded, passing through to forced directories");
            Walk::PassThrough
        } else {
            Walk::Skip
        }
    }

    /// All overlay files in walked directories
    ///
    /// Terragrunt directories contribute their own overlay files but not those of their subdirectories.
    fn var_files(&self, scan_root: &Path, roots: &[RootPath]) -> Vec<PathBuf> {
        let nested: HashSet<&Path> = roots
            .iter()
            .filter(|root| root.is_nested_tool)
            .map(|root| root.path.as_path())
            .collect();

        let mut files = vec![];
        let mut passed_through: HashSet<PathBuf> = HashSet::new();
        let mut it = walkdir::WalkDir::new(scan_root)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = it.next() {
            let Ok(entry) = entry else {
                continue;
            };

            if entry.file_type().is_dir() {
                let is_nested_child = entry
                    .path()
                    .parent()
                    .is_some_and(|parent| nested.iter().any(|n| parent.starts_with(n)));
                if entry.depth() > 0 {
                    if is_nested_child {
                        it.skip_current_dir();
                        continue;
                    }
                    match self.walk(scan_root, entry.path()) {
                        Walk::Scan => {}
                        Walk::PassThrough => {
                            passed_through.insert(entry.path().to_path_buf());
                        }
                        Walk::Skip => it.skip_current_dir(),
                    }
                }
                continue;
            }

            let in_passed_through = entry
                .path()
                .parent()
                .is_some_and(|parent| passed_through.contains(parent));
            if !in_passed_through && environment::is_var_file(&entry.file_name().to_string_lossy()) {
                files.push(entry.path().to_path_buf());
            }
        }

        files
    }

    fn attach_var_files(&self, roots: &mut [RootPath], var_files: Vec<PathBuf>) {
        for file in var_files {
            let owner = roots
                .iter_mut()
                .filter(|root| file.starts_with(&root.path))
                .max_by_key(|root| root.path.components().count());

            let Some(owner) = owner else {
                tracing::debug!(path=%file.display(), "overlay file belongs to no root");
                continue;
            };

            let Ok(rel_path) = file.strip_prefix(&owner.path) else {
                continue;
            };
            let overlay = OverlayFile::classify(rel_path.to_path_buf(), &self.env_names);
            owner.var_files.push(overlay);
        }

        for root in roots {
            root.var_files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        }
    }
}

fn rel<'p>(scan_root: &Path, dir: &'p Path) -> &'p Path {
    dir.strip_prefix(scan_root).unwrap_or(dir)
}

/// Parse the `*.tf` files of `dir` and record the local modules it calls
fn scan_candidate(dir: &Path) -> Candidate {
    let mut files = HclFiles::default();
    if let Err(err) = files.load_directory(dir) {
        tracing::warn!(dir=%dir.display(), %err, "could not parse configuration, keeping directory as a candidate");
    }

    let mut module_dirs: Vec<PathBuf> = files
        .blocks_named("module")
        .filter_map(|block| {
            let source = block
                .body
                .attributes()
                .find(|attribute| attribute.key.value().as_str() == "source")?;
            let expr: hcl::Expression = source.value.clone().into();
            let hcl::Expression::String(source) = expr else {
                return None;
            };
            is_local_source(&source).then(|| normalize(&dir.join(local_source_dir(&source))))
        })
        .collect();
    module_dirs.sort();
    module_dirs.dedup();

    Candidate {
        dir: dir.to_path_buf(),
        module_dirs,
    }
}

pub(crate) fn is_local_source(source: &str) -> bool {
    source.starts_with("./") || source.starts_with("../")
}

/// `../modules//vpc` -> `../modules/vpc`
pub(crate) fn local_source_dir(source: &str) -> PathBuf {
    PathBuf::from(source.replace("//", "/"))
}

/// Lexically resolve `.` and `..` components
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[derive(thiserror::Error, Debug)]
pub enum LocatorError {
    #[error("Unable to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid directory pattern {pattern}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn rel_paths(roots: &[RootPath]) -> Vec<String> {
        roots
            .iter()
            .map(|r| r.rel_path.display().to_string())
            .collect()
    }

    fn locator(config: LocatorConfig) -> ProjectLocator {
        ProjectLocator::new(config, Sniffer::default()).expect("valid patterns")
    }

    #[test]
    fn normalize_paths() {
        assert_eq!(
            normalize(Path::new("/repo/app/../modules/./vpc")),
            PathBuf::from("/repo/modules/vpc")
        );
        assert_eq!(local_source_dir("../modules//vpc"), PathBuf::from("../modules/vpc"));
    }

    #[test]
    fn called_modules_are_not_roots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/main.tf", r#"module "vpc" { source = "../modules/vpc" }"#);
        write(dir.path(), "modules/vpc/main.tf", r#"resource "aws_vpc" "this" {}"#);
        write(dir.path(), "other/main.tf", r#"resource "aws_instance" "web" {}"#);

        let roots = locator(LocatorConfig::default())
            .find_roots(dir.path())
            .unwrap();
        assert_eq!(rel_paths(&roots), vec!["app", "other"]);
        assert_eq!(roots[0].module_dirs, vec![dir.path().canonicalize().unwrap().join("modules/vpc")]);

        let all = locator(LocatorConfig {
            use_all_paths: true,
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();
        assert_eq!(rel_paths(&all), vec!["app", "modules/vpc", "other"]);
    }

    #[test]
    fn only_direct_config_files_make_a_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "live/README.md", "");
        write(dir.path(), "live/app/main.tf", "");

        let roots = locator(LocatorConfig::default())
            .find_roots(dir.path())
            .unwrap();
        assert_eq!(rel_paths(&roots), vec!["live/app"]);
    }

    #[test]
    fn excluded_hidden_and_internal_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/main.tf", "");
        write(dir.path(), "app/.terraform/modules/x/main.tf", "");
        write(dir.path(), ".github/main.tf", "");
        write(dir.path(), "legacy/main.tf", "");
        write(dir.path(), "legacy/keep/main.tf", "");

        let roots = locator(LocatorConfig {
            excluded_dirs: vec!["legacy".into()],
            path_overrides: vec![PathOverride {
                path: "legacy/keep".into(),
                ..Default::default()
            }],
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();

        assert_eq!(rel_paths(&roots), vec!["app", "legacy/keep"]);

        let roots = locator(LocatorConfig {
            excluded_dirs: vec!["legacy".into()],
            included_dirs: vec!["legacy/keep".into()],
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();
        assert_eq!(rel_paths(&roots), vec!["app", "legacy/keep"]);

        let roots = locator(LocatorConfig {
            excluded_dirs: vec!["legacy/*".into()],
            included_dirs: vec!["legacy/keep".into()],
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();
        assert_eq!(rel_paths(&roots), vec!["app", "legacy", "legacy/keep"]);
    }

    #[test]
    fn nested_tool_roots_are_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "live/prod/terragrunt.hcl", "");
        write(dir.path(), "live/prod/prod.tfvars", "");
        write(dir.path(), "live/prod/sub/main.tf", "");
        write(dir.path(), "live/prod/sub/ignored.tfvars", "");

        let roots = locator(LocatorConfig::default())
            .find_roots(dir.path())
            .unwrap();
        assert_eq!(rel_paths(&roots), vec!["live/prod"]);
        assert!(roots[0].is_nested_tool);
        assert_eq!(roots[0].var_files.len(), 1);
        assert_eq!(roots[0].var_files[0].rel_path, PathBuf::from("prod.tfvars"));
    }

    #[test]
    fn overlay_files_attach_to_the_closest_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "");
        write(dir.path(), "terraform.tfvars", "");
        write(dir.path(), "envs/prod/terraform.tfvars", "");
        write(dir.path(), "child/main.tf", "");
        write(dir.path(), "child/dev.tfvars", "");

        let roots = locator(LocatorConfig::default())
            .find_roots(dir.path())
            .unwrap();
        assert_eq!(rel_paths(&roots), vec![".", "child"]);

        let top: Vec<_> = roots[0].var_files.iter().map(|f| f.rel_path.clone()).collect();
        assert_eq!(
            top,
            vec![PathBuf::from("envs/prod/terraform.tfvars"), PathBuf::from("terraform.tfvars")]
        );
        assert_eq!(roots[1].var_files[0].env_name.as_deref(), Some("dev"));
    }

    #[test]
    fn skip_auto_detection_uses_the_path_itself() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "");
        write(dir.path(), "sub/main.tf", "");
        write(dir.path(), "prod.tfvars", "");

        let roots = locator(LocatorConfig {
            skip_auto_detection: true,
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();

        assert_eq!(rel_paths(&roots), vec!["."]);
        assert!(!roots[0].is_nested_tool);
        assert_eq!(roots[0].var_files.len(), 1);
    }

    #[test]
    fn skip_auto_detection_over_terragrunt_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "live/prod/terragrunt.hcl", "");
        write(dir.path(), "live/prod/prod.tfvars", "");
        write(dir.path(), "live/staging/terragrunt.hcl", "");

        let locator = locator(LocatorConfig {
            skip_auto_detection: true,
            ..Default::default()
        });

        let roots = locator.find_roots(&dir.path().join("live")).unwrap();
        assert_eq!(rel_paths(&roots), vec!["prod", "staging"]);
        assert!(roots.iter().all(|root| root.is_nested_tool));
        assert_eq!(roots[0].var_files.len(), 1);

        let roots = locator.find_roots(&dir.path().join("live/prod")).unwrap();
        assert_eq!(rel_paths(&roots), vec!["."]);
        assert!(roots[0].is_nested_tool);
    }

    #[test]
    fn fallback_treats_every_candidate_as_root() {
        let dir = tempfile::tempdir().unwrap();
        // two directories calling each other leave no root
        write(dir.path(), "a/main.tf", r#"module "b" { source = "../b" }"#);
        write(dir.path(), "b/main.tf", r#"module "a" { source = "../a" }"#);

        let none = locator(LocatorConfig::default())
            .find_roots(dir.path())
            .unwrap();
        assert!(none.is_empty());

        let roots = locator(LocatorConfig {
            fallback_to_include_paths: true,
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();
        assert_eq!(rel_paths(&roots), vec!["a", "b"]);
    }

    #[test]
    fn changed_objects_limit_roots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/main.tf", r#"module "vpc" { source = "../modules/vpc" }"#);
        write(dir.path(), "modules/vpc/main.tf", "");
        write(dir.path(), "other/main.tf", "");

        let roots = locator(LocatorConfig {
            changed_objects: vec!["modules/vpc/main.tf".into()],
            ..Default::default()
        })
        .find_roots(dir.path())
        .unwrap();
        assert_eq!(rel_paths(&roots), vec!["app"]);
    }

    #[test]
    fn unparseable_config_is_still_a_candidate() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken/main.tf", "resource {{{");

        let roots = locator(LocatorConfig::default())
            .find_roots(dir.path())
            .unwrap();
        assert_eq!(rel_paths(&roots), vec!["broken"]);
    }

    #[test]
    fn path_override_filters_environments() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/main.tf", "");
        write(dir.path(), "app/dev.tfvars", "");
        write(dir.path(), "app/prod.tfvars", "");

        let locator = locator(LocatorConfig {
            path_overrides: vec![PathOverride {
                path: "app".into(),
                only: vec!["prod".into()],
                exclude: vec![],
            }],
            ..Default::default()
        });
        let roots = locator.find_roots(dir.path()).unwrap();
        let grouping = locator.environments(&roots[0]);

        let names: Vec<_> = grouping.environments.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["prod"]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = ProjectLocator::new(
            LocatorConfig {
                excluded_dirs: vec!["a/**/[".into()],
                ..Default::default()
            },
            Sniffer::default(),
        )
        .expect_err("must fail");
        assert!(matches!(err, LocatorError::InvalidPattern { .. }));
    }
}
