//! Per-dataset discovery resources.
//!
//! Each dataset gets a catalog database, a crawler with its own execution
//! role and least-privilege policy, and governed grants for that role. When
//! the source bucket belongs to this deployment, statements are appended to
//! the bucket policy and the key policy so the governance and catalog-domain
//! roles can read the data.
//!
//! All datasets share one crawler security configuration. It is declared
//! once here and threaded into every crawler by reference.

use crate::config::Environment;
use crate::dataset::{BucketOwnership, DatasetDescriptor, OwnedBucket, check_distinct_datasets};
use crate::error::Result;
use crate::graph::{Component, Expr, LogicalId, ResourceGraph};
use crate::iam::{PolicyDocument, PolicyStatement, Principal};
use crate::naming::{self, ApplicationQualifier, DatasetNames};
use crate::resources::{
    Crawler, GlueDatabase, LakePermission, LakePermissions, LakeScope, PolicyAttachment,
    Resource, Role, SecurityConfiguration,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Tag carrying the dataset's registration flag as `"true"` or `"false"`
pub const REGISTRATION_TAG: &str = "dzRegistration";

/// Baseline policy every crawler role carries
pub const CRAWLER_MANAGED_POLICY: &str = "service-role/AWSGlueServiceRole";

/// Permissions on the dataset's database
pub const DATABASE_PERMISSIONS: [LakePermission; 3] = [
    LakePermission::CreateTable,
    LakePermission::Describe,
    LakePermission::Alter,
];

/// Permissions on every table of the dataset's database
pub const TABLE_PERMISSIONS: [LakePermission; 4] = [
    LakePermission::Alter,
    LakePermission::Describe,
    LakePermission::Insert,
    LakePermission::Select,
];

const CRAWLER_POLICY_NAME: &str = "GlueCrawlerPolicy";
const KEY_READ_SID: &str = "AllowDatazoneRoles";

/// Every id declared for one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetResources {
    pub dataset: String,
    pub names: DatasetNames,
    pub database: LogicalId,
    pub crawler_role: LogicalId,
    pub crawler: LogicalId,
    pub database_grant: LogicalId,
    pub table_grant: LogicalId,
    /// Statement appended to the owned bucket's key policy
    pub key_attachment: Option<LogicalId>,
    /// Statement appended to the owned bucket's policy
    pub bucket_attachment: Option<LogicalId>,
}

/// What the processing step declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutputs {
    pub security_configuration: LogicalId,
    pub datasets: Vec<DatasetResources>,
}

impl ProcessingOutputs {
    /// Looks up the resources of one dataset by name
    pub fn dataset(&self, name: &str) -> Option<&DatasetResources> {
        self.datasets.iter().find(|d| d.dataset == name)
    }
}

/// ARN patterns of the principals allowed to read owned dataset buckets:
/// the governance service-linked role, catalog-domain environment roles and
/// the registration function's role.
pub fn governance_reader_patterns(env: &Environment) -> [String; 3] {
    [
        env.lakeformation_service_role_arn(),
        env.role_arn("datazone_*"),
        env.role_arn(super::registration::FUNCTION_ROLE_NAME),
    ]
}

/// Least-privilege policy for one dataset's crawler role.
///
/// Table and partition mutation is allowed inside the dataset's database;
/// the database itself is read-only and can never be dropped.
pub fn crawler_policy(
    env: &Environment,
    bucket_name: &str,
    names: &DatasetNames,
    key_arn: &Expr,
) -> PolicyDocument {
    let bucket_arn = env.bucket_arn(bucket_name);
    PolicyDocument::new()
        .with(
            PolicyStatement::allow()
                .actions(["s3:ListAllMyBuckets", "s3:ListAccessPoints"])
                .any_resource(),
        )
        .with(
            PolicyStatement::allow()
                .actions(["s3:ListBucket", "s3:GetBucketLocation"])
                .resources([bucket_arn.clone()]),
        )
        .with(
            PolicyStatement::allow()
                .actions([
                    "s3:PutObject",
                    "s3:PutObjectAcl",
                    "s3:GetObject",
                    "s3:GetObjectAcl",
                    "s3:GetObjectVersion",
                    "s3:DeleteObject",
                ])
                .resources([format!("{}/*", bucket_arn)]),
        )
        .with(
            PolicyStatement::allow()
                .actions([
                    "glue:Get*",
                    "glue:BatchGet*",
                    "glue:CreateTable",
                    "glue:UpdateTable",
                    "glue:DeleteTableVersion",
                    "glue:DeleteTable",
                    "glue:BatchCreatePartition",
                ])
                .resources([
                    format!("arn:{}:glue:*:{}:catalog", env.partition, env.account_id),
                    env.glue_arn(&format!("database/{}", names.database)),
                    env.glue_arn(&format!("table/{}/*", names.database)),
                ]),
        )
        // the crawl engine reads the default database internally
        .with(
            PolicyStatement::allow()
                .actions(["glue:GetDatabase"])
                .resources([env.glue_arn("database/default")]),
        )
        .with(
            PolicyStatement::allow()
                .actions([
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:AssociateKmsKey",
                ])
                .resources([env.logs_arn("log-group:/aws-glue/crawlers*")]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["logs:PutLogEvents"])
                .resources([env.logs_arn(&format!(
                    "log-group:/aws-glue/crawlers:log-stream:{}",
                    names.crawler
                ))]),
        )
        // the location read during a crawl is only known at crawl time
        .with(
            PolicyStatement::allow()
                .actions(["lakeformation:GetDataAccess"])
                .any_resource(),
        )
        .with(
            PolicyStatement::allow()
                .actions(["kms:Encrypt", "kms:Decrypt"])
                .resources([key_arn.clone()]),
        )
}

/// Declares the shared security configuration and every dataset's
/// resources.
///
/// Datasets are independent of each other: the names and edges produced for
/// one dataset do not depend on where it sits in `datasets`.
///
/// # Errors
/// Returns `InvalidDataset` for a malformed or repeated descriptor, and a
/// graph error if a declaration collides with an existing one.
pub fn provision(
    graph: &mut ResourceGraph,
    env: &Environment,
    qualifier: &ApplicationQualifier,
    deployment_key_arn: &Expr,
    datasets: &[DatasetDescriptor],
) -> Result<ProcessingOutputs> {
    for dataset in datasets {
        dataset.validate()?;
    }
    check_distinct_datasets(datasets.iter().map(|dataset| dataset.name.as_str()))?;

    let security_configuration = graph.add(
        Component::Processing,
        LogicalId::new("CrawlerCwSecurityConfiguration")?,
        Resource::SecurityConfiguration(SecurityConfiguration {
            name: naming::security_configuration_name(qualifier),
            cloudwatch_key_arn: deployment_key_arn.clone(),
        }),
    )?;

    let mut declared = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        declared.push(provision_dataset(
            graph,
            env,
            qualifier,
            &security_configuration,
            dataset,
        )?);
    }

    info!("Declared discovery resources for {} datasets", declared.len());
    Ok(ProcessingOutputs {
        security_configuration,
        datasets: declared,
    })
}

fn provision_dataset(
    graph: &mut ResourceGraph,
    env: &Environment,
    qualifier: &ApplicationQualifier,
    security_configuration: &LogicalId,
    dataset: &DatasetDescriptor,
) -> Result<DatasetResources> {
    let names = DatasetNames::derive(qualifier, &dataset.name);
    names.check_limits(&dataset.name)?;
    let id = |suffix: &str| LogicalId::derive(&[dataset.name.as_str(), suffix]);

    let database = graph.add(
        Component::Processing,
        id("GlueDatabase")?,
        Resource::GlueDatabase(GlueDatabase {
            catalog_id: env.account_id.clone(),
            name: names.database.clone(),
            description: format!("{} Glue Database", dataset.name),
            location_uri: dataset.location_uri(),
        }),
    )?;

    let crawler_role = graph.add(
        Component::Processing,
        id("GlueCrawlerRole")?,
        Resource::Role(Role {
            name: names.crawler_role.clone(),
            trust: PolicyDocument::new().with(
                PolicyStatement::allow()
                    .principal(Principal::Service("glue.amazonaws.com".to_string()))
                    .actions(["sts:AssumeRole"]),
            ),
            inline_policies: BTreeMap::from([(
                CRAWLER_POLICY_NAME.to_string(),
                crawler_policy(env, &dataset.bucket_name, &names, &dataset.key_arn),
            )]),
            managed_policy_arns: vec![env.managed_policy_arn(CRAWLER_MANAGED_POLICY)],
        }),
    )?;

    let crawler = graph.add(
        Component::Processing,
        id("GlueCrawler")?,
        Resource::Crawler(Crawler {
            name: names.crawler.clone(),
            description: format!("Glue Crawler for the {} dataset", dataset.name),
            role: Expr::arn_of(&crawler_role),
            database_name: names.database.clone(),
            s3_target: dataset.location_uri(),
            table_prefix: names.table_prefix.clone(),
            security_configuration: Expr::reference(security_configuration),
            schedule: dataset.schedule.clone(),
            tags: BTreeMap::from([(
                REGISTRATION_TAG.to_string(),
                dataset.registration.to_string(),
            )]),
        }),
    )?;
    graph.depends_on(&crawler, &crawler_role)?;

    // the database is referenced by name only, so ordering must be explicit
    let database_grant = graph.add(
        Component::Processing,
        id("GlueCrawlerDBPermissions")?,
        Resource::Permissions(LakePermissions {
            principal: Expr::arn_of(&crawler_role),
            scope: LakeScope::Database {
                catalog_id: env.account_id.clone(),
                name: names.database.clone(),
            },
            permissions: DATABASE_PERMISSIONS.to_vec(),
        }),
    )?;
    graph.depends_on(&database_grant, &database)?;

    let (key_attachment, bucket_attachment) = match &dataset.bucket {
        BucketOwnership::Owned(owned) => {
            let (key, bucket) = attach_reader_statements(graph, env, dataset, owned)?;
            (key, Some(bucket))
        }
        BucketOwnership::External => {
            warn!(
                "Dataset {} reads from external bucket {}; its owner must grant governance read access",
                dataset.name, dataset.bucket_name
            );
            (None, None)
        }
    };

    let table_grant = graph.add(
        Component::Processing,
        id("GlueCrawlerTablePermissions")?,
        Resource::Permissions(LakePermissions {
            principal: Expr::arn_of(&crawler_role),
            scope: LakeScope::TableWildcard {
                catalog_id: env.account_id.clone(),
                database_name: names.database.clone(),
            },
            permissions: TABLE_PERMISSIONS.to_vec(),
        }),
    )?;
    for target in [&crawler, &crawler_role, &database] {
        graph.depends_on(&table_grant, target)?;
    }

    debug!(
        "Dataset {}: database {}, crawler {}, registration {}",
        dataset.name, names.database, names.crawler, dataset.registration
    );

    Ok(DatasetResources {
        dataset: dataset.name.clone(),
        names,
        database,
        crawler_role,
        crawler,
        database_grant,
        table_grant,
        key_attachment,
        bucket_attachment,
    })
}

/// Appends the governance-read statements to an owned bucket and, when the
/// bucket has one, its key.
fn attach_reader_statements(
    graph: &mut ResourceGraph,
    env: &Environment,
    dataset: &DatasetDescriptor,
    owned: &OwnedBucket,
) -> Result<(Option<LogicalId>, LogicalId)> {
    let readers = governance_reader_patterns(env);
    // one key policy collects a statement per dataset, so sids carry the name
    let key_sid = LogicalId::derive(&[KEY_READ_SID, dataset.name.as_str()])?;

    let key_attachment = match &owned.key {
        Some(key) => Some(graph.add(
            Component::Processing,
            LogicalId::derive(&[dataset.name.as_str(), "KeyReaderStatement"])?,
            Resource::PolicyAttachment(PolicyAttachment {
                target: key.clone(),
                statement: PolicyStatement::allow()
                    .sid(key_sid.as_str())
                    .principal(Principal::Any)
                    .actions(["kms:Decrypt", "kms:Describe*", "kms:Get*"])
                    .any_resource()
                    .condition("StringLike", "aws:PrincipalArn", readers.clone()),
            }),
        )?),
        None => None,
    };

    let bucket_arn = env.bucket_arn(&dataset.bucket_name);
    let bucket_attachment = graph.add(
        Component::Processing,
        LogicalId::derive(&[dataset.name.as_str(), "BucketReaderStatement"])?,
        Resource::PolicyAttachment(PolicyAttachment {
            target: owned.bucket.clone(),
            statement: PolicyStatement::allow()
                .principal(Principal::Any)
                .actions(["s3:Get*", "s3:List*"])
                .resources([format!("{}/*", bucket_arn), bucket_arn])
                .condition("StringLike", "aws:PrincipalArn", readers),
        }),
    )?;

    Ok((key_attachment, bucket_attachment))
}

#[cfg(test)]
mod tests;
