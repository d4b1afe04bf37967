//! binary Terraform plans (`terraform plan -out`)
//!
//! The archive format is private to Terraform, so the plan is rendered to JSON by a [PlanRenderer] and then read
//! like any other plan JSON.
use super::plan_json::Plan;
use super::{ProjectMetadata, Provider, ProviderError};
use crate::schema::ResourceDeclaration;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Renders a binary plan as plan JSON
pub trait PlanRenderer: Send + Sync + std::fmt::Debug {
    fn render(&self, plan: &Path) -> Result<Vec<u8>, ProviderError>;
}

/// Runs `terraform show -json <plan>` next to the plan file
#[derive(Debug, Clone)]
pub struct TerraformCli {
    pub binary: PathBuf,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
        }
    }
}

impl PlanRenderer for TerraformCli {
    #[tracing::instrument(level = "debug", skip(self), fields(binary = %self.binary.display()))]
    fn render(&self, plan: &Path) -> Result<Vec<u8>, ProviderError> {
        let render_err = |message: String| ProviderError::Render {
            path: plan.to_path_buf(),
            message,
        };

        let working_dir = plan
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = plan.file_name().map(Path::new).unwrap_or(plan);
        let output = Command::new(&self.binary)
            .args(["show", "-no-color", "-json"])
            .arg(file_name)
            .current_dir(working_dir)
            .output()
            .map_err(|err| render_err(format!("failed to run {}: {err}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(render_err(stderr.trim().to_string()));
        }

        Ok(output.stdout)
    }
}

#[derive(Debug)]
pub struct PlanBinaryProvider {
    metadata: ProjectMetadata,
    plan: Plan,
}

impl PlanBinaryProvider {
    pub fn load(
        metadata: ProjectMetadata,
        renderer: Arc<dyn PlanRenderer>,
    ) -> Result<Self, ProviderError> {
        let json = renderer.render(&metadata.path)?;
        let plan = Plan::parse(&metadata.path, &json)?;

        Ok(Self { metadata, plan })
    }
}

impl Provider for PlanBinaryProvider {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError> {
        Ok(self.plan.declarations())
    }
}
