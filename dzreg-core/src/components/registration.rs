//! Catalog-domain roles, the registration function and its trigger.
//!
//! Two roles are trusted by the catalog-domain service: one manages access
//! to catalog objects, the other provisions environments. The registration
//! function ships as an external asset; only its role, environment and
//! trigger are declared here. Every successful crawl, whichever dataset it
//! belongs to, invokes the function. Filtering by dataset is left to the
//! function, which reads the crawler's registration tag.

use super::storage::StorageOutputs;
use crate::config::{DomainConfig, Environment};
use crate::error::Result;
use crate::graph::{Component, Expr, LogicalId, ResourceGraph};
use crate::iam::{PolicyDocument, PolicyStatement, Principal};
use crate::naming::ApplicationQualifier;
use crate::resources::{
    EventPattern, EventRule, Function, FunctionPermission, Resource, Role, RuleTarget,
};
use std::collections::BTreeMap;
use tracing::info;

pub const FUNCTION_NAME: &str = "datazone-dataset-registration";
pub const FUNCTION_ROLE_NAME: &str = "dz-dataset-registration-lambda-role";
pub const FUNCTION_RUNTIME: &str = "python3.12";
pub const FUNCTION_HANDLER: &str = "dataset-register.lambda_handler";
pub const FUNCTION_ASSET: &str = "src/lambda-functions/datazone-integration";
pub const FUNCTION_TIMEOUT_SECONDS: u32 = 600;

/// Delivery retries on top of the first attempt
pub const RETRY_ATTEMPTS: u32 = 2;

pub const CRAWLER_EVENT_SOURCE: &str = "aws.glue";
pub const CRAWLER_EVENT_DETAIL_TYPE: &str = "Glue Crawler State Change";
pub const CRAWLER_SUCCEEDED: &str = "Succeeded";

pub const MANAGE_ACCESS_MANAGED_POLICY: &str =
    "service-role/AmazonDataZoneGlueManageAccessRolePolicy";
pub const PROVISIONING_MANAGED_POLICY: &str = "AmazonDataZoneRedshiftGlueProvisioningPolicy";

const DOMAIN_SERVICE: &str = "datazone.amazonaws.com";
const REGISTRATION_POLICY_NAME: &str = "datazoneDatasetRegistrationAccessPolicy";

/// Environment keys read by the registration function.
pub mod env_keys {
    pub const PROJECT_NAME: &str = "DPP_USECASE";
    pub const MANAGE_ACCESS_ROLE_NAME: &str = "DZ_BP_MANAGE_ACCESS_ROLE_NAME";
    pub const PROVISIONING_ROLE_NAME: &str = "DZ_BP_PROVISIONING_ROLE_NAME";
    pub const ARTIFACT_BUCKET: &str = "DZ_BP_S3_BUCKET";
    pub const DOMAIN_NAME: &str = "DZ_DOMAIN_NAME";
    pub const REGISTRATION_ROLE_ARN: &str = "DZ_REG_ROLE_ARN";
}

/// What later assemblers need from the registration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutputs {
    pub manage_access_role: LogicalId,
    pub manage_access_role_name: String,
    pub provisioning_role: LogicalId,
    pub provisioning_role_name: String,
    pub function_role: LogicalId,
    pub function: LogicalId,
    pub rule: LogicalId,
    pub invoke_permission: LogicalId,
}

impl RegistrationOutputs {
    /// ARN of the manage-access role
    pub fn manage_access_role_arn(&self) -> Expr {
        Expr::arn_of(&self.manage_access_role)
    }

    /// ARN of the provisioning role
    pub fn provisioning_role_arn(&self) -> Expr {
        Expr::arn_of(&self.provisioning_role)
    }
}

/// `DataZoneGlueAccess-{region}-{domainName}`
pub fn manage_access_role_name(catalog_region: &str, domain_name: &str) -> String {
    format!("DataZoneGlueAccess-{}-{}", catalog_region, domain_name)
}

/// `DataZoneProvisioning-{domainAccountId}`
pub fn provisioning_role_name(domain_account_id: &str) -> String {
    format!("DataZoneProvisioning-{}", domain_account_id)
}

/// Event pattern matching successful crawler runs
pub fn crawler_success_pattern() -> EventPattern {
    EventPattern {
        source: vec![CRAWLER_EVENT_SOURCE.to_string()],
        detail_type: vec![CRAWLER_EVENT_DETAIL_TYPE.to_string()],
        detail: BTreeMap::from([(
            "state".to_string(),
            vec![CRAWLER_SUCCEEDED.to_string()],
        )]),
    }
}

fn domain_trust(domain: &DomainConfig) -> PolicyDocument {
    PolicyDocument::new().with(
        PolicyStatement::allow()
            .principal(Principal::Service(DOMAIN_SERVICE.to_string()))
            .actions(["sts:AssumeRole"])
            .condition("StringEquals", "aws:SourceAccount", [domain.account_id.clone()]),
    )
}

/// Least-privilege policy for the registration function's role.
pub fn registration_policy(
    env: &Environment,
    qualifier: &ApplicationQualifier,
    domain: &DomainConfig,
    manage_access_role: &LogicalId,
    provisioning_role: &LogicalId,
) -> PolicyDocument {
    let label = qualifier.label();
    PolicyDocument::new()
        .with(
            PolicyStatement::allow()
                .actions(["kms:Decrypt", "kms:GenerateDataKey"])
                .any_resource()
                .condition("StringEquals", "aws:ResourceAccount", [domain.account_id.clone()]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["sts:AssumeRole"])
                .resources([domain.registration_role_arn(&env.partition)]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["glue:GetCrawler", "glue:GetDatabase", "glue:GetTags"])
                .resources([
                    env.glue_arn(&format!("database/{}-*", label)),
                    env.glue_arn(&format!("crawler/{}-*", label)),
                ]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["lakeformation:RegisterResource"])
                .resources([env.lakeformation_catalog_arn()]),
        )
        // domain-level actions take no resource scope
        .with(
            PolicyStatement::allow()
                .actions([
                    "datazone:PutEnvironmentBlueprintConfiguration",
                    "datazone:ListEnvironmentBlueprints",
                    "sts:GetCallerIdentity",
                ])
                .any_resource(),
        )
        .with(
            PolicyStatement::allow()
                .actions(["iam:GetRole", "iam:PassRole"])
                .resources([
                    Expr::arn_of(manage_access_role),
                    Expr::arn_of(provisioning_role),
                ]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["iam:GetRole", "iam:GetRolePolicy", "iam:PutRolePolicy"])
                .resources([env.lakeformation_service_role_arn()]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["logs:CreateLogGroup"])
                .resources([env.logs_arn("*")]),
        )
        .with(
            PolicyStatement::allow()
                .actions(["logs:CreateLogStream", "logs:PutLogEvents"])
                .resources([env.logs_arn(&format!(
                    "log-group:/aws/lambda/{}:*",
                    FUNCTION_NAME
                ))]),
        )
}

/// Declares the domain roles, the function, its role, the trigger rule and
/// the permission that lets the rule invoke the function.
///
/// # Errors
/// Returns an error if an id is taken or a referenced node is undeclared.
pub fn provision(
    graph: &mut ResourceGraph,
    env: &Environment,
    qualifier: &ApplicationQualifier,
    domain: &DomainConfig,
    storage: &StorageOutputs,
) -> Result<RegistrationOutputs> {
    let manage_access_role_name = manage_access_role_name(&env.region, &domain.name);
    let manage_access_role = graph.add(
        Component::Registration,
        LogicalId::derive(&[qualifier.label(), "dzManageAccessRole"])?,
        Resource::Role(Role {
            name: manage_access_role_name.clone(),
            trust: domain_trust(domain),
            inline_policies: BTreeMap::new(),
            managed_policy_arns: vec![env.managed_policy_arn(MANAGE_ACCESS_MANAGED_POLICY)],
        }),
    )?;

    let provisioning_role_name = provisioning_role_name(&domain.account_id);
    let provisioning_role = graph.add(
        Component::Registration,
        LogicalId::derive(&[qualifier.label(), "dzProvisioningRole"])?,
        Resource::Role(Role {
            name: provisioning_role_name.clone(),
            trust: domain_trust(domain),
            inline_policies: BTreeMap::new(),
            managed_policy_arns: vec![env.managed_policy_arn(PROVISIONING_MANAGED_POLICY)],
        }),
    )?;

    let function_role = graph.add(
        Component::Registration,
        LogicalId::new("DzDsRegLambdaRole")?,
        Resource::Role(Role {
            name: FUNCTION_ROLE_NAME.to_string(),
            trust: PolicyDocument::new().with(
                PolicyStatement::allow()
                    .principal(Principal::Service("lambda.amazonaws.com".to_string()))
                    .actions(["sts:AssumeRole"]),
            ),
            inline_policies: BTreeMap::from([(
                REGISTRATION_POLICY_NAME.to_string(),
                registration_policy(
                    env,
                    qualifier,
                    domain,
                    &manage_access_role,
                    &provisioning_role,
                ),
            )]),
            managed_policy_arns: Vec::new(),
        }),
    )?;

    let environment = BTreeMap::from([
        (
            env_keys::PROJECT_NAME.to_string(),
            Expr::literal(&domain.project_name),
        ),
        (
            env_keys::MANAGE_ACCESS_ROLE_NAME.to_string(),
            Expr::reference(&manage_access_role),
        ),
        (
            env_keys::PROVISIONING_ROLE_NAME.to_string(),
            Expr::reference(&provisioning_role),
        ),
        (
            env_keys::ARTIFACT_BUCKET.to_string(),
            Expr::reference(&storage.bucket),
        ),
        (env_keys::DOMAIN_NAME.to_string(), Expr::literal(&domain.name)),
        (
            env_keys::REGISTRATION_ROLE_ARN.to_string(),
            Expr::literal(domain.registration_role_arn(&env.partition)),
        ),
    ]);

    let function = graph.add(
        Component::Registration,
        LogicalId::new("DzDatasetRegisterFunction")?,
        Resource::Function(Function {
            name: FUNCTION_NAME.to_string(),
            runtime: FUNCTION_RUNTIME.to_string(),
            handler: FUNCTION_HANDLER.to_string(),
            code_asset: FUNCTION_ASSET.to_string(),
            role: Expr::arn_of(&function_role),
            environment,
            timeout_seconds: FUNCTION_TIMEOUT_SECONDS,
        }),
    )?;

    let rule = graph.add(
        Component::Registration,
        LogicalId::new("GlueCrawlerEventRule")?,
        Resource::EventRule(EventRule {
            pattern: crawler_success_pattern(),
            targets: vec![RuleTarget {
                id: "Target0".to_string(),
                arn: Expr::arn_of(&function),
                retry_attempts: RETRY_ATTEMPTS,
            }],
        }),
    )?;

    let invoke_permission = graph.add(
        Component::Registration,
        LogicalId::new("GlueCrawlerEventRuleInvokePermission")?,
        Resource::FunctionPermission(FunctionPermission {
            function: Expr::arn_of(&function),
            principal: "events.amazonaws.com".to_string(),
            source_arn: Expr::arn_of(&rule),
        }),
    )?;

    info!(
        "Declared registration function {} triggered by crawler success events",
        FUNCTION_NAME
    );

    Ok(RegistrationOutputs {
        manage_access_role,
        manage_access_role_name,
        provisioning_role,
        provisioning_role_name,
        function_role,
        function,
        rule,
        invoke_permission,
    })
}
