//! Top-level assembly of a deployment graph.
//!
//! Builds the key, the artifact bucket, the registration resources, the
//! governed-access settings and the test datasource bucket, resolves the
//! configured datasets into descriptors and finally declares every
//! dataset's discovery resources. The result is a validated graph ready to
//! be rendered.

use crate::components::{
    EncryptionOutputs, GovernanceOutputs, ProcessingOutputs, RegistrationOutputs, StorageOutputs,
    encryption, governance, processing, registration, storage,
};
use crate::config::{BucketSourceConfig, DatasetConfig, DeploymentConfig};
use crate::dataset::{BucketOwnership, DatasetDescriptor, OwnedBucket};
use crate::error::Result;
use crate::graph::{Component, Expr, LogicalId, ResourceGraph};
use crate::naming;
use tracing::{debug, info};

/// Logical id of the test datasource bucket
pub const TEST_BUCKET_ID: &str = "DatazoneTestDataSourceBucket";

/// The managed bucket datasets of kind `managed` read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBucket {
    pub id: LogicalId,
    pub name: String,
}

/// A fully assembled deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub graph: ResourceGraph,
    pub encryption: EncryptionOutputs,
    pub storage: StorageOutputs,
    pub registration: RegistrationOutputs,
    pub governance: GovernanceOutputs,
    pub test_bucket: TestBucket,
    pub datasets: Vec<DatasetDescriptor>,
    pub processing: ProcessingOutputs,
}

/// Validates `config` and assembles its resource graph.
///
/// # Errors
/// Returns the first configuration, dataset or graph error encountered.
pub fn build_deployment(config: &DeploymentConfig) -> Result<Deployment> {
    config.validate()?;
    let qualifier = config.qualifier()?;
    let env = &config.deployment;
    let producer_account = &config.producer.account_id;
    let domain_region = &config.domain.region;

    let mut graph = ResourceGraph::new();

    let encryption = encryption::provision(&mut graph, env)?;
    let storage = storage::provision(
        &mut graph,
        env,
        &qualifier,
        producer_account,
        domain_region,
        &encryption,
    )?;
    let registration =
        registration::provision(&mut graph, env, &qualifier, &config.domain, &storage)?;
    let governance =
        governance::provision(&mut graph, env, &config.producer, &registration, &storage)?;

    let test_bucket_name = naming::test_bucket_name(&qualifier, producer_account, domain_region);
    let test_bucket_id = storage::declare_secure_bucket(
        &mut graph,
        Component::Root,
        LogicalId::new(TEST_BUCKET_ID)?,
        &test_bucket_name,
        encryption.key_arn(),
        env,
    )?;
    let test_bucket = TestBucket {
        id: test_bucket_id,
        name: test_bucket_name,
    };

    let datasets = resolve_datasets(&config.datasets, &test_bucket, &encryption);
    let processing = processing::provision(
        &mut graph,
        env,
        &qualifier,
        &encryption.key_arn(),
        &datasets,
    )?;
    graph.depend_component_on(Component::Processing, &test_bucket.id)?;

    graph.validate()?;
    info!(
        "Assembled deployment graph with {} resources for {} datasets",
        graph.len(),
        datasets.len()
    );

    Ok(Deployment {
        graph,
        encryption,
        storage,
        registration,
        governance,
        test_bucket,
        datasets,
        processing,
    })
}

/// Turns configured datasets into descriptors.
///
/// Managed datasets read from the test datasource bucket and are protected
/// by the deployment key; external ones carry their own bucket and key.
pub fn resolve_datasets(
    datasets: &[DatasetConfig],
    test_bucket: &TestBucket,
    encryption: &EncryptionOutputs,
) -> Vec<DatasetDescriptor> {
    datasets
        .iter()
        .map(|dataset| {
            let (bucket, bucket_name, key_arn) = match &dataset.bucket {
                BucketSourceConfig::Managed => (
                    BucketOwnership::Owned(OwnedBucket {
                        bucket: test_bucket.id.clone(),
                        key: Some(encryption.key.clone()),
                    }),
                    test_bucket.name.clone(),
                    encryption.key_arn(),
                ),
                BucketSourceConfig::External { name, key_arn } => (
                    BucketOwnership::External,
                    name.clone(),
                    Expr::literal(key_arn),
                ),
            };
            debug!("Resolved dataset {} onto bucket {}", dataset.name, bucket_name);

            DatasetDescriptor {
                name: dataset.name.clone(),
                bucket,
                bucket_name,
                key_prefix: dataset.key_prefix.clone(),
                key_arn,
                registration: dataset.registration,
                schedule: dataset.schedule.clone(),
            }
        })
        .collect()
}
