//! source format detection
//!
//! [Sniffer::classify] looks at a single path and decides what it is. Probes run from the most to the least precise
//! and the first match wins:
//!
//! 1. CloudFormation template (through the [template gate](crate::template::gate))
//! 2. Terraform plan JSON (`format_version` + `planned_values`)
//! 3. Terraform state JSON (`format_version` + `values`)
//! 4. Terraform binary plan (zip archive with a `tfplan` entry)
//! 5. directories: Terragrunt (marker file within [NESTED_TOOL_MAX_DEPTH] levels) or plain Terraform
//!
//! A failing probe (unreadable file, invalid archive, invalid JSON, ...) never errors, it simply does not match.
use serde::de::IgnoredAny;
use std::path::{Path, PathBuf};

/// Marker files of a Terragrunt directory
pub const NESTED_TOOL_CONFIG_FILES: [&str; 2] = ["terragrunt.hcl", "terragrunt.hcl.json"];

/// Overrides the Terragrunt marker file name, absolute or relative to the directory
pub const NESTED_TOOL_CONFIG_ENV: &str = "TERRAGRUNT_CONFIG";

/// How deep below a directory a Terragrunt marker is looked for
pub const NESTED_TOOL_MAX_DEPTH: usize = 5;

/// Cache/output directories of the tools involved; never scanned
pub const INTERNAL_DIRS: [&str; 3] = [".terraform", ".terragrunt-cache", ".iacost"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    #[serde(rename = "terraform_plan_json")]
    PlanJson,
    #[serde(rename = "terraform_plan_binary")]
    PlanBinary,
    #[serde(rename = "terraform_state_json")]
    StateJson,
    #[serde(rename = "cloudformation")]
    DeclarativeTemplate,
    #[serde(rename = "terraform_dir")]
    ImperativeDir,
    #[serde(rename = "terragrunt_dir")]
    NestedToolDir,
    Unknown,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::PlanJson => "terraform_plan_json",
            SourceFormat::PlanBinary => "terraform_plan_binary",
            SourceFormat::StateJson => "terraform_state_json",
            SourceFormat::DeclarativeTemplate => "cloudformation",
            SourceFormat::ImperativeDir => "terraform_dir",
            SourceFormat::NestedToolDir => "terragrunt_dir",
            SourceFormat::Unknown => "unknown",
        }
    }

    /// Formats that describe exactly one artifact (and thus one project)
    pub fn is_single_artifact(&self) -> bool {
        matches!(
            self,
            SourceFormat::PlanJson
                | SourceFormat::PlanBinary
                | SourceFormat::StateJson
                | SourceFormat::DeclarativeTemplate
        )
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies paths into [SourceFormat]s
#[derive(Debug, Clone, Default)]
pub struct Sniffer {
    /// Value of [NESTED_TOOL_CONFIG_ENV], if set
    nested_config_override: Option<PathBuf>,
}

impl Sniffer {
    pub fn new(nested_config_override: Option<PathBuf>) -> Self {
        Self {
            nested_config_override,
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var_os(NESTED_TOOL_CONFIG_ENV).map(PathBuf::from))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn classify(&self, path: &Path) -> SourceFormat {
        if crate::template::gate().probe(path) {
            return SourceFormat::DeclarativeTemplate;
        }

        if path.is_file() {
            if let Ok(contents) = std::fs::read(path) {
                if is_plan_json(path, &contents) {
                    return SourceFormat::PlanJson;
                }

                if is_state_json(path, &contents) {
                    return SourceFormat::StateJson;
                }
            }

            if is_plan_binary(path) {
                return SourceFormat::PlanBinary;
            }
        }

        if path.is_dir() {
            if self.is_nested_tool_tree(path, NESTED_TOOL_MAX_DEPTH) {
                return SourceFormat::NestedToolDir;
            }

            return SourceFormat::ImperativeDir;
        }

        SourceFormat::Unknown
    }

    /// Path of the Terragrunt config file that makes `dir` a Terragrunt directory, if any
    pub fn nested_tool_config(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(config) = &self.nested_config_override {
            let config = if config.is_absolute() {
                config.clone()
            } else {
                dir.join(config)
            };
            return config.is_file().then_some(config);
        }

        NESTED_TOOL_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    pub fn is_nested_tool_dir(&self, dir: &Path) -> bool {
        self.nested_tool_config(dir).is_some()
    }

    /// Is `dir`, or any directory at most `max_depth` levels below it, a Terragrunt directory?
    pub fn is_nested_tool_tree(&self, dir: &Path, max_depth: usize) -> bool {
        !self.find_nested_tool_dirs(dir, max_depth, true).is_empty()
    }

    /// Terragrunt directories at most `max_depth` levels below `dir` (including `dir`), sorted
    ///
    /// A Terragrunt directory is not searched further.
    pub fn nested_tool_dirs(&self, dir: &Path, max_depth: usize) -> Vec<PathBuf> {
        let mut dirs = self.find_nested_tool_dirs(dir, max_depth, false);
        dirs.sort();
        dirs
    }

    fn find_nested_tool_dirs(&self, dir: &Path, max_depth: usize, first_only: bool) -> Vec<PathBuf> {
        let mut found = vec![];
        let mut worklist = vec![(dir.to_path_buf(), 0)];

        while let Some((current, depth)) = worklist.pop() {
            if self.is_nested_tool_dir(&current) {
                found.push(current);
                if first_only {
                    break;
                }
                continue;
            }

            if depth >= max_depth {
                continue;
            }

            let Ok(entries) = std::fs::read_dir(&current) else {
                continue;
            };
            for entry in entries.flatten() {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir && !is_skipped_dir(&entry.file_name().to_string_lossy()) {
                    worklist.push((entry.path(), depth + 1));
                }
            }
        }

        found
    }
}

pub fn is_internal_dir(name: &str) -> bool {
    INTERNAL_DIRS.contains(&name)
}

/// Hidden and tool-internal directories are never scanned
pub fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || is_internal_dir(name)
}

#[derive(serde::Deserialize)]
struct PlanHeader {
    #[serde(default)]
    format_version: Option<String>,
    #[serde(default)]
    planned_values: Option<IgnoredAny>,
}

#[derive(serde::Deserialize)]
struct StateHeader {
    #[serde(default)]
    format_version: Option<String>,
    #[serde(default)]
    values: Option<IgnoredAny>,
}

fn is_plan_json(path: &Path, contents: &[u8]) -> bool {
    let (json, stripped) = strip_wrapper(contents);
    let Ok(header) = serde_json::from_slice::<PlanHeader>(json) else {
        return false;
    };

    if stripped {
        tracing::info!(
            path = %path.display(),
            "Stripped wrapper output (to make it a valid JSON file) since setup-terraform GitHub Action was used without terraform_wrapper: false"
        );
    }

    header.format_version.is_some_and(|v| !v.is_empty()) && header.planned_values.is_some()
}

fn is_state_json(path: &Path, contents: &[u8]) -> bool {
    let (json, stripped) = strip_wrapper(contents);
    let Ok(header) = serde_json::from_slice::<StateHeader>(json) else {
        return false;
    };

    if stripped {
        tracing::debug!(path = %path.display(), "Stripped setup-terraform wrapper output");
    }

    header.format_version.is_some_and(|v| !v.is_empty()) && header.values.is_some()
}

fn is_plan_binary(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    let Ok(mut archive) = zip::ZipArchive::new(file) else {
        return false;
    };

    let found = archive.by_name("tfplan").is_ok();
    found
}

/// Strip the log lines CI wrappers print around a JSON document
///
/// Wrapped output looks like
/// ```text
/// [command]/home/runner/work/_temp/terraform-bin show -json plan.out
/// {"format_version":"1.2", ...}
/// ::debug::Terraform exited with code 0.
/// ```
/// Returns the JSON object and whether anything was stripped. Input that does not look wrapped is returned as is.
pub fn strip_wrapper(contents: &[u8]) -> (&[u8], bool) {
    let Some(first) = contents.iter().position(|b| !b.is_ascii_whitespace()) else {
        return (contents, false);
    };
    if contents[first] == b'{' {
        return (contents, false);
    }

    let mut offset = 0;
    let mut start = None;
    for line in contents.split_inclusive(|b| *b == b'\n') {
        let indent = line.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if line.get(indent) == Some(&b'{') {
            start = Some(offset + indent);
            break;
        }
        offset += line.len();
    }
    let Some(start) = start else {
        return (contents, false);
    };

    let rest = &contents[start..];
    let mut stream = serde_json::Deserializer::from_slice(rest).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => (&rest[..stream.byte_offset()], true),
        _ => (contents, false),
    }
}
