//! usage overlays
//!
//! A usage file supplies estimated operational metrics per resource address:
//!
//! ```yaml
//! version: 0.1
//! resource_usage:
//!   azurerm_linux_virtual_machine.web:
//!     monthly_hrs: 300
//!   aws_instance.worker[*]:
//!     monthly_hrs: 100
//! ```
//!
//! A `[*]` key applies to every instance of a counted resource without an exact entry.
use crate::value::Value;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SUPPORTED_USAGE_FILE_VERSION: &str = "0.1";

/// Looks up the usage overlay of a resource
pub trait UsageSource: Sync {
    fn usage_for(&self, address: &str) -> Option<&Value>;
}

/// No usage is known for any resource
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUsage;

impl UsageSource for NoUsage {
    fn usage_for(&self, _address: &str) -> Option<&Value> {
        None
    }
}

#[derive(Debug, Default)]
pub struct UsageFile {
    resource_usage: IndexMap<String, Value>,
}

#[derive(Deserialize)]
struct RawUsageFile {
    #[serde(default)]
    version: Option<serde_json::Value>,
    #[serde(default)]
    resource_usage: IndexMap<String, serde_json::Value>,
}

impl UsageFile {
    pub fn load(path: &Path) -> Result<Self, UsageError> {
        tracing::debug!(path=%path.display(), "loading usage file");

        let contents = std::fs::read_to_string(path).map_err(|source| UsageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, UsageError> {
        let raw: RawUsageFile = serde_yaml::from_str(contents)?;

        if let Some(version) = raw.version {
            let version = match version {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            if version != SUPPORTED_USAGE_FILE_VERSION {
                return Err(UsageError::UnsupportedVersion(version));
            }
        }

        Ok(Self {
            resource_usage: raw
                .resource_usage
                .into_iter()
                .map(|(address, usage)| (address, usage.into()))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.resource_usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_usage.is_empty()
    }
}

impl UsageSource for UsageFile {
    fn usage_for(&self, address: &str) -> Option<&Value> {
        if let Some(usage) = self.resource_usage.get(address) {
            return Some(usage);
        }

        let wildcard = wildcard_address(address)?;
        self.resource_usage.get(&wildcard)
    }
}

/// `aws_instance.web[3]` -> `aws_instance.web[*]`
fn wildcard_address(address: &str) -> Option<String> {
    let open = address.rfind('[')?;
    address
        .ends_with(']')
        .then(|| format!("{}[*]", &address[..open]))
}

#[derive(thiserror::Error, Debug)]
pub enum UsageError {
    #[error("Unable to read usage file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid usage file")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unsupported usage file version {0}, expected {SUPPORTED_USAGE_FILE_VERSION}")]
    UnsupportedVersion(String),
}
