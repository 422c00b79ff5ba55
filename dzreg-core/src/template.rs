//! Provisioning-engine adapter.
//!
//! Renders a [`ResourceGraph`] as a CloudFormation-style JSON template.
//! Every edge of the graph becomes a `DependsOn` entry, so the engine sees
//! the same ordering the graph encodes whether or not a property value
//! connects the two resources. Policy attachments are not resources of
//! their own: their statements are folded into the key policy or the bucket
//! policy they target.

use crate::error::{DzRegError, Result};
use crate::graph::{Expr, LogicalId, Node, ResourceGraph};
use crate::iam::{PolicyDocument, PolicyStatement};
use crate::resources::{
    AccessControl, Bucket, Crawler, DataLakeSettings, EventRule, Function, FunctionPermission, KmsKey,
    LakePermission, LakePermissions, LakeScope, Resource, Role,
};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Template format version emitted in every template
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Description emitted in every template
pub const TEMPLATE_DESCRIPTION: &str =
    "Dataset discovery and catalog-domain registration resources";

/// Metadata key naming the assembler that declared a resource
pub const COMPONENT_METADATA_KEY: &str = "dzreg:component";

/// Metadata key pointing at a function's code directory
pub const ASSET_METADATA_KEY: &str = "aws:asset:path";

/// Suffix of the bucket-policy resource rendered next to each bucket
const BUCKET_POLICY_SUFFIX: &str = "Policy";

/// Renders the whole graph.
///
/// # Errors
/// Returns `DependencyCycle` if the graph has no valid order, and a
/// configuration error if an attachment targets something other than a key
/// or bucket, or a generated id collides with a declared one.
pub fn render(graph: &ResourceGraph) -> Result<Value> {
    let order = graph.deployment_order()?;
    let attachments = collect_attachments(graph)?;

    let mut resources = Map::new();
    for node in order {
        let folded = attachments.get(&node.id).map(Vec::as_slice).unwrap_or(&[]);
        match &node.resource {
            Resource::PolicyAttachment(_) => continue,
            Resource::Bucket(bucket) => {
                let policy_id = format!("{}{}", node.id, BUCKET_POLICY_SUFFIX);
                if graph.find(&policy_id).is_some() {
                    return Err(DzRegError::configuration(format!(
                        "bucket policy id {} collides with a declared resource",
                        policy_id
                    )));
                }
                let policy = extend_policy(&bucket.policy, folded);
                resources.insert(node.id.to_string(), render_node(graph, node, folded)?);
                if !policy.statements().is_empty() {
                    resources.insert(policy_id, render_bucket_policy(node, &policy));
                }
            }
            _ => {
                resources.insert(node.id.to_string(), render_node(graph, node, folded)?);
            }
        }
    }

    debug!("Rendered template with {} resources", resources.len());
    Ok(json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": TEMPLATE_DESCRIPTION,
        "Resources": Value::Object(resources),
    }))
}

/// Renders the graph as pretty-printed JSON.
///
/// # Errors
/// Returns any rendering error, or `Serialization` if encoding fails.
pub fn render_string(graph: &ResourceGraph) -> Result<String> {
    let template = render(graph)?;
    serde_json::to_string_pretty(&template)
        .map_err(|e| DzRegError::serialization("template", e))
}

/// Attachment statements grouped by target, in declaration order.
fn collect_attachments(
    graph: &ResourceGraph,
) -> Result<BTreeMap<LogicalId, Vec<PolicyStatement>>> {
    let mut grouped: BTreeMap<LogicalId, Vec<PolicyStatement>> = BTreeMap::new();
    for node in graph.nodes() {
        let Resource::PolicyAttachment(attachment) = &node.resource else {
            continue;
        };
        match graph.get(&attachment.target).map(|n| &n.resource) {
            Some(Resource::KmsKey(_) | Resource::Bucket(_)) => grouped
                .entry(attachment.target.clone())
                .or_default()
                .push(attachment.statement.clone()),
            Some(other) => {
                return Err(DzRegError::configuration(format!(
                    "policy attachment {} targets {} ({}), which has no resource policy",
                    node.id,
                    attachment.target,
                    other.type_name()
                )));
            }
            None => return Err(DzRegError::unknown_resource(attachment.target.as_str())),
        }
    }
    Ok(grouped)
}

fn extend_policy(policy: &PolicyDocument, extra: &[PolicyStatement]) -> PolicyDocument {
    let mut extended = policy.clone();
    for statement in extra {
        extended.push(statement.clone());
    }
    extended
}

/// Every rendered node this one must follow. Attachments are folded into
/// their target, so edges to them are dropped.
fn depends_on(graph: &ResourceGraph, id: &LogicalId) -> Vec<String> {
    let targets: BTreeSet<String> = graph
        .dependencies_of(id)
        .into_iter()
        .filter(|target| {
            !matches!(
                graph.get(target).map(|n| &n.resource),
                Some(Resource::PolicyAttachment(_))
            )
        })
        .map(ToString::to_string)
        .collect();
    targets.into_iter().collect()
}

fn render_node(graph: &ResourceGraph, node: &Node, folded: &[PolicyStatement]) -> Result<Value> {
    let (properties, retain) = match &node.resource {
        Resource::KmsKey(key) => (render_key(key, folded), key.retain),
        Resource::KmsAlias(alias) => (
            json!({
                "AliasName": alias.name,
                "TargetKeyId": alias.target.to_json(),
            }),
            false,
        ),
        Resource::Bucket(bucket) => (render_bucket(bucket), bucket.retain),
        Resource::Role(role) => (render_role(role), false),
        Resource::GlueDatabase(database) => (
            json!({
                "CatalogId": database.catalog_id,
                "DatabaseInput": {
                    "Name": database.name,
                    "Description": database.description,
                    "LocationUri": database.location_uri,
                },
            }),
            false,
        ),
        Resource::SecurityConfiguration(config) => (
            json!({
                "Name": config.name,
                "EncryptionConfiguration": {
                    "CloudWatchEncryption": {
                        "CloudWatchEncryptionMode": "SSE-KMS",
                        "KmsKeyArn": config.cloudwatch_key_arn.to_json(),
                    },
                },
            }),
            false,
        ),
        Resource::Crawler(crawler) => (render_crawler(crawler), false),
        Resource::Permissions(grant) => (render_grant(grant), false),
        Resource::DataLakeSettings(settings) => (render_settings(settings), false),
        Resource::LakeResource(resource) => (
            json!({
                "ResourceArn": resource.resource_arn.to_json(),
                "UseServiceLinkedRole": resource.use_service_linked_role,
            }),
            false,
        ),
        Resource::Function(function) => (render_function(function), false),
        Resource::FunctionPermission(permission) => (render_permission(permission), false),
        Resource::EventRule(rule) => (render_rule(rule), false),
        Resource::PolicyAttachment(_) => {
            return Err(DzRegError::configuration(format!(
                "policy attachment {} cannot be rendered on its own",
                node.id
            )));
        }
    };

    let mut metadata = Map::new();
    metadata.insert(
        COMPONENT_METADATA_KEY.to_string(),
        json!(node.component.as_str()),
    );
    if let Resource::Function(function) = &node.resource {
        metadata.insert(ASSET_METADATA_KEY.to_string(), json!(function.code_asset));
    }

    let mut rendered = Map::new();
    rendered.insert("Type".to_string(), json!(node.resource.type_name()));
    rendered.insert("Properties".to_string(), properties);
    let dependencies = depends_on(graph, &node.id);
    if !dependencies.is_empty() {
        rendered.insert("DependsOn".to_string(), json!(dependencies));
    }
    rendered.insert("Metadata".to_string(), Value::Object(metadata));
    if retain {
        rendered.insert("DeletionPolicy".to_string(), json!("Retain"));
        rendered.insert("UpdateReplacePolicy".to_string(), json!("Retain"));
    }
    Ok(Value::Object(rendered))
}

fn render_key(key: &KmsKey, folded: &[PolicyStatement]) -> Value {
    json!({
        "Description": key.description,
        "KeyPolicy": extend_policy(&key.policy, folded).to_json(),
    })
}

fn render_bucket(bucket: &Bucket) -> Value {
    let mut properties = Map::new();
    properties.insert("BucketName".to_string(), json!(bucket.name));
    if bucket.versioned {
        properties.insert(
            "VersioningConfiguration".to_string(),
            json!({ "Status": "Enabled" }),
        );
    }
    if let Some(key) = &bucket.encryption_key {
        properties.insert(
            "BucketEncryption".to_string(),
            json!({
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": {
                        "SSEAlgorithm": "aws:kms",
                        "KMSMasterKeyID": key.to_json(),
                    },
                    "BucketKeyEnabled": bucket.bucket_key_enabled,
                }],
            }),
        );
    }
    if bucket.block_public_access {
        properties.insert(
            "PublicAccessBlockConfiguration".to_string(),
            json!({
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            }),
        );
    }
    properties.insert(
        "AccessControl".to_string(),
        json!(bucket.access_control.as_str()),
    );
    // ACL-based log delivery needs object-writer ownership
    if bucket.access_control != AccessControl::Private {
        properties.insert(
            "OwnershipControls".to_string(),
            json!({ "Rules": [{ "ObjectOwnership": "ObjectWriter" }] }),
        );
    }
    Value::Object(properties)
}

fn render_bucket_policy(bucket: &Node, policy: &PolicyDocument) -> Value {
    json!({
        "Type": "AWS::S3::BucketPolicy",
        "Properties": {
            "Bucket": Expr::reference(&bucket.id).to_json(),
            "PolicyDocument": policy.to_json(),
        },
        "DependsOn": [bucket.id.as_str()],
        "Metadata": { COMPONENT_METADATA_KEY: bucket.component.as_str() },
    })
}

fn render_role(role: &Role) -> Value {
    let mut properties = Map::new();
    properties.insert("RoleName".to_string(), json!(role.name));
    properties.insert(
        "AssumeRolePolicyDocument".to_string(),
        role.trust.to_json(),
    );
    if !role.inline_policies.is_empty() {
        let policies: Vec<Value> = role
            .inline_policies
            .iter()
            .map(|(name, document)| {
                json!({ "PolicyName": name, "PolicyDocument": document.to_json() })
            })
            .collect();
        properties.insert("Policies".to_string(), json!(policies));
    }
    if !role.managed_policy_arns.is_empty() {
        properties.insert(
            "ManagedPolicyArns".to_string(),
            json!(role.managed_policy_arns),
        );
    }
    Value::Object(properties)
}

fn render_crawler(crawler: &Crawler) -> Value {
    json!({
        "Name": crawler.name,
        "Description": crawler.description,
        "Role": crawler.role.to_json(),
        "DatabaseName": crawler.database_name,
        "Targets": { "S3Targets": [{ "Path": crawler.s3_target }] },
        "TablePrefix": crawler.table_prefix,
        "CrawlerSecurityConfiguration": crawler.security_configuration.to_json(),
        "Schedule": { "ScheduleExpression": crawler.schedule },
        "Tags": crawler.tags,
    })
}

fn permission_names(permissions: &[LakePermission]) -> Vec<&'static str> {
    permissions.iter().map(LakePermission::as_str).collect()
}

fn render_grant(grant: &LakePermissions) -> Value {
    let resource = match &grant.scope {
        LakeScope::Database { catalog_id, name } => json!({
            "DatabaseResource": { "CatalogId": catalog_id, "Name": name },
        }),
        LakeScope::TableWildcard {
            catalog_id,
            database_name,
        } => json!({
            "TableResource": {
                "CatalogId": catalog_id,
                "DatabaseName": database_name,
                "TableWildcard": {},
            },
        }),
    };
    json!({
        "DataLakePrincipal": { "DataLakePrincipalIdentifier": grant.principal.to_json() },
        "Resource": resource,
        "Permissions": permission_names(&grant.permissions),
    })
}

fn render_settings(settings: &DataLakeSettings) -> Value {
    let admins: Vec<Value> = settings
        .admins
        .iter()
        .map(|admin| json!({ "DataLakePrincipalIdentifier": admin.to_json() }))
        .collect();
    json!({
        "Admins": admins,
        "CreateDatabaseDefaultPermissions": permission_names(&settings.create_database_default_permissions),
        "CreateTableDefaultPermissions": permission_names(&settings.create_table_default_permissions),
    })
}

fn render_function(function: &Function) -> Value {
    let variables: Map<String, Value> = function
        .environment
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    json!({
        "FunctionName": function.name,
        "Runtime": function.runtime,
        "Handler": function.handler,
        "Role": function.role.to_json(),
        "Timeout": function.timeout_seconds,
        // resolved to an uploaded archive by the asset publisher
        "Code": { "AssetPath": function.code_asset },
        "Environment": { "Variables": variables },
    })
}

fn render_permission(permission: &FunctionPermission) -> Value {
    json!({
        "Action": "lambda:InvokeFunction",
        "FunctionName": permission.function.to_json(),
        "Principal": permission.principal,
        "SourceArn": permission.source_arn.to_json(),
    })
}

fn render_rule(rule: &EventRule) -> Value {
    let targets: Vec<Value> = rule
        .targets
        .iter()
        .map(|target| {
            json!({
                "Id": target.id,
                "Arn": target.arn.to_json(),
                "RetryPolicy": { "MaximumRetryAttempts": target.retry_attempts },
            })
        })
        .collect();
    json!({
        "State": "ENABLED",
        "EventPattern": {
            "source": rule.pattern.source,
            "detail-type": rule.pattern.detail_type,
            "detail": rule.pattern.detail,
        },
        "Targets": targets,
    })
}
