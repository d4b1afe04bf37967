//! CloudFormation templates
use super::{ProjectMetadata, Provider, ProviderError};
use crate::schema::ResourceDeclaration;
use crate::template::{self, CfnResource, Template};

#[derive(Debug)]
pub struct TemplateProvider {
    metadata: ProjectMetadata,
    template: Template,
}

impl TemplateProvider {
    /// Parses the template through the process-wide template gate
    pub fn load(metadata: ProjectMetadata) -> Result<Self, ProviderError> {
        let template = template::gate().parse(&metadata.path)?;
        Ok(Self { metadata, template })
    }
}

impl Provider for TemplateProvider {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    fn declarations(&self) -> Result<Vec<ResourceDeclaration>, ProviderError> {
        Ok(self
            .template
            .resources
            .values()
            .map(|resource| {
                let properties = self.template.resolved_properties(resource);
                ResourceDeclaration::cloudformation(
                    &resource.logical_id,
                    CfnResource::from_properties(&resource.resource_type, properties),
                )
            })
            .collect())
    }
}
