//! Private, versioned, encrypted buckets.
//!
//! The artifact bucket holds what the registration workflow produces. The
//! same hardened declaration is reused by the top-level assembler for the
//! test datasource bucket.

use super::encryption::EncryptionOutputs;
use crate::config::Environment;
use crate::error::Result;
use crate::graph::{Component, Expr, LogicalId, ResourceGraph};
use crate::iam::{PolicyDocument, PolicyStatement, Principal};
use crate::naming::{self, ApplicationQualifier};
use crate::resources::{AccessControl, Bucket, Resource};
use tracing::info;

/// What later assemblers need from the storage step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOutputs {
    pub bucket: LogicalId,
    pub bucket_name: String,
}

impl StorageOutputs {
    /// The bucket ARN, resolved by the provisioning engine
    pub fn bucket_arn(&self) -> Expr {
        Expr::arn_of(&self.bucket)
    }
}

/// Declares the registration artifact bucket.
///
/// The name is `{qualifier}-datazone-artifact-{producerAccount}-{domainRegion}`.
///
/// # Errors
/// Returns an error if the id is taken or the key is undeclared.
pub fn provision(
    graph: &mut ResourceGraph,
    env: &Environment,
    qualifier: &ApplicationQualifier,
    producer_account: &str,
    domain_region: &str,
    encryption: &EncryptionOutputs,
) -> Result<StorageOutputs> {
    let bucket_name = naming::artifact_bucket_name(qualifier, producer_account, domain_region);
    let bucket = declare_secure_bucket(
        graph,
        Component::Storage,
        LogicalId::new("DatazoneEnvBucket")?,
        &bucket_name,
        encryption.key_arn(),
        env,
    )?;

    info!("Declared artifact bucket {}", bucket_name);
    Ok(StorageOutputs {
        bucket,
        bucket_name,
    })
}

/// Declares a bucket with the deployment's storage hardening:
/// versioning, SSE-KMS with bucket keys, all public access blocked,
/// log-delivery-write ACL, SSL-only access, and retention on teardown.
///
/// # Errors
/// Returns an error if `id` is taken or the key is undeclared.
pub fn declare_secure_bucket(
    graph: &mut ResourceGraph,
    component: Component,
    id: LogicalId,
    bucket_name: &str,
    key_arn: Expr,
    env: &Environment,
) -> Result<LogicalId> {
    let bucket_arn = env.bucket_arn(bucket_name);
    let policy = PolicyDocument::new().with(
        PolicyStatement::deny()
            .principal(Principal::Any)
            .actions(["s3:*"])
            .resources([bucket_arn.clone(), format!("{}/*", bucket_arn)])
            .condition("Bool", "aws:SecureTransport", ["false"]),
    );

    graph.add(
        component,
        id,
        Resource::Bucket(Bucket {
            name: bucket_name.to_string(),
            versioned: true,
            encryption_key: Some(key_arn),
            bucket_key_enabled: true,
            block_public_access: true,
            access_control: AccessControl::LogDeliveryWrite,
            retain: true,
            policy,
        }),
    )
}
