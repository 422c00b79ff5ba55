//! Catalog-wide governed-access settings.
//!
//! New databases and tables get no implicit grants; every access has to be
//! granted explicitly. The producer's deploy role and both catalog-domain
//! roles administer the governance layer.

use super::registration::RegistrationOutputs;
use super::storage::StorageOutputs;
use crate::config::{Environment, ProducerConfig};
use crate::error::Result;
use crate::graph::{Component, Expr, LogicalId, ResourceGraph};
use crate::resources::{DataLakeSettings, LakeResource, Resource};
use tracing::info;

/// What later assemblers need from the governance step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceOutputs {
    pub settings: LogicalId,
    pub artifact_location: LogicalId,
}

/// Declares the settings and registers the artifact bucket as a governed
/// location accessed through the service-linked role.
///
/// # Errors
/// Returns an error if an id is taken or a referenced node is undeclared.
pub fn provision(
    graph: &mut ResourceGraph,
    env: &Environment,
    producer: &ProducerConfig,
    registration: &RegistrationOutputs,
    storage: &StorageOutputs,
) -> Result<GovernanceOutputs> {
    let settings = graph.add(
        Component::Governance,
        LogicalId::new("LFDataLakeSettings")?,
        Resource::DataLakeSettings(DataLakeSettings {
            admins: vec![
                Expr::literal(producer.deploy_role_arn(&env.partition)),
                registration.manage_access_role_arn(),
                registration.provisioning_role_arn(),
            ],
            create_database_default_permissions: Vec::new(),
            create_table_default_permissions: Vec::new(),
        }),
    )?;

    let artifact_location = graph.add(
        Component::Governance,
        LogicalId::new("S3Resource")?,
        Resource::LakeResource(LakeResource {
            resource_arn: storage.bucket_arn(),
            use_service_linked_role: true,
        }),
    )?;

    info!(
        "Declared governed-access settings {} and registered {}",
        settings, storage.bucket_name
    );
    Ok(GovernanceOutputs {
        settings,
        artifact_location,
    })
}
