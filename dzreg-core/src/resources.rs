//! Resource declarations that make up a deployment graph.
//!
//! These are descriptive values only. Each kind knows its template type name
//! and which other nodes its properties point at; rendering lives in
//! [`crate::template`].

use crate::graph::{Expr, LogicalId};
use crate::iam::{PolicyDocument, PolicyStatement};
use std::collections::BTreeMap;

/// Any declaration the assemblers can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    KmsKey(KmsKey),
    KmsAlias(KmsAlias),
    Bucket(Bucket),
    Role(Role),
    GlueDatabase(GlueDatabase),
    SecurityConfiguration(SecurityConfiguration),
    Crawler(Crawler),
    Permissions(LakePermissions),
    DataLakeSettings(DataLakeSettings),
    LakeResource(LakeResource),
    Function(Function),
    FunctionPermission(FunctionPermission),
    EventRule(EventRule),
    PolicyAttachment(PolicyAttachment),
}

impl Resource {
    /// Template type name of the declaration
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::KmsKey(_) => "AWS::KMS::Key",
            Self::KmsAlias(_) => "AWS::KMS::Alias",
            Self::Bucket(_) => "AWS::S3::Bucket",
            Self::Role(_) => "AWS::IAM::Role",
            Self::GlueDatabase(_) => "AWS::Glue::Database",
            Self::SecurityConfiguration(_) => "AWS::Glue::SecurityConfiguration",
            Self::Crawler(_) => "AWS::Glue::Crawler",
            Self::Permissions(_) => "AWS::LakeFormation::Permissions",
            Self::DataLakeSettings(_) => "AWS::LakeFormation::DataLakeSettings",
            Self::LakeResource(_) => "AWS::LakeFormation::Resource",
            Self::Function(_) => "AWS::Lambda::Function",
            Self::FunctionPermission(_) => "AWS::Lambda::Permission",
            Self::EventRule(_) => "AWS::Events::Rule",
            Self::PolicyAttachment(_) => "Dzreg::ResourcePolicyStatement",
        }
    }

    /// Every node this declaration's properties point at
    pub fn references(&self) -> Vec<&LogicalId> {
        match self {
            Self::KmsKey(key) => key.policy.references(),
            Self::KmsAlias(alias) => alias.target.referenced_id().into_iter().collect(),
            Self::Bucket(bucket) => {
                let mut refs = bucket.policy.references();
                refs.extend(bucket.encryption_key.iter().filter_map(Expr::referenced_id));
                refs
            }
            Self::Role(role) => {
                let mut refs = role.trust.references();
                refs.extend(role.inline_policies.values().flat_map(PolicyDocument::references));
                refs
            }
            Self::GlueDatabase(_) => Vec::new(),
            Self::SecurityConfiguration(config) => {
                config.cloudwatch_key_arn.referenced_id().into_iter().collect()
            }
            Self::Crawler(crawler) => [&crawler.role, &crawler.security_configuration]
                .into_iter()
                .filter_map(Expr::referenced_id)
                .collect(),
            Self::Permissions(grant) => grant.principal.referenced_id().into_iter().collect(),
            Self::DataLakeSettings(settings) => settings
                .admins
                .iter()
                .filter_map(Expr::referenced_id)
                .collect(),
            Self::LakeResource(resource) => {
                resource.resource_arn.referenced_id().into_iter().collect()
            }
            Self::Function(function) => std::iter::once(&function.role)
                .chain(function.environment.values())
                .filter_map(Expr::referenced_id)
                .collect(),
            Self::FunctionPermission(permission) => [&permission.function, &permission.source_arn]
                .into_iter()
                .filter_map(Expr::referenced_id)
                .collect(),
            Self::EventRule(rule) => rule
                .targets
                .iter()
                .filter_map(|target| target.arn.referenced_id())
                .collect(),
            Self::PolicyAttachment(attachment) => {
                let mut refs = vec![&attachment.target];
                refs.extend(attachment.statement.references());
                refs
            }
        }
    }
}

/// Symmetric encryption key with its key policy.
#[derive(Debug, Clone, PartialEq)]
pub struct KmsKey {
    pub description: String,
    pub policy: PolicyDocument,
    pub retain: bool,
}

/// Friendly name pointing at a key.
#[derive(Debug, Clone, PartialEq)]
pub struct KmsAlias {
    /// Full alias name including the `alias/` prefix
    pub name: String,
    pub target: Expr,
}

/// Canned bucket ACLs used by this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessControl {
    Private,
    LogDeliveryWrite,
}

impl AccessControl {
    /// Template spelling of the ACL
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "Private",
            Self::LogDeliveryWrite => "LogDeliveryWrite",
        }
    }
}

/// Object storage bucket and its bucket policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub versioned: bool,
    /// Key ARN for SSE-KMS; `None` leaves the account default
    pub encryption_key: Option<Expr>,
    pub bucket_key_enabled: bool,
    pub block_public_access: bool,
    pub access_control: AccessControl,
    pub retain: bool,
    pub policy: PolicyDocument,
}

/// IAM role with trust policy and attached permissions.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub trust: PolicyDocument,
    /// policy name -> document
    pub inline_policies: BTreeMap<String, PolicyDocument>,
    pub managed_policy_arns: Vec<String>,
}

/// Catalog database scoped to a storage location.
#[derive(Debug, Clone, PartialEq)]
pub struct GlueDatabase {
    pub catalog_id: String,
    pub name: String,
    pub description: String,
    pub location_uri: String,
}

/// Shared crawler security configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfiguration {
    pub name: String,
    pub cloudwatch_key_arn: Expr,
}

/// Scheduled crawler over one storage path.
#[derive(Debug, Clone, PartialEq)]
pub struct Crawler {
    pub name: String,
    pub description: String,
    pub role: Expr,
    pub database_name: String,
    pub s3_target: String,
    pub table_prefix: String,
    pub security_configuration: Expr,
    pub schedule: String,
    pub tags: BTreeMap<String, String>,
}

/// Governed-access permission names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LakePermission {
    CreateTable,
    Describe,
    Alter,
    Insert,
    Select,
}

impl LakePermission {
    /// Template spelling of the permission
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTable => "CREATE_TABLE",
            Self::Describe => "DESCRIBE",
            Self::Alter => "ALTER",
            Self::Insert => "INSERT",
            Self::Select => "SELECT",
        }
    }
}

/// Catalog object a governed grant applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LakeScope {
    /// A single database
    Database { catalog_id: String, name: String },
    /// Every table in a database
    TableWildcard {
        catalog_id: String,
        database_name: String,
    },
}

/// A (principal, resource, permission-set) grant.
#[derive(Debug, Clone, PartialEq)]
pub struct LakePermissions {
    pub principal: Expr,
    pub scope: LakeScope,
    pub permissions: Vec<LakePermission>,
}

/// Catalog-wide governed-access settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLakeSettings {
    pub admins: Vec<Expr>,
    pub create_database_default_permissions: Vec<LakePermission>,
    pub create_table_default_permissions: Vec<LakePermission>,
}

/// Storage location registered with the governance layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LakeResource {
    pub resource_arn: Expr,
    pub use_service_linked_role: bool,
}

/// Function deployed from an external asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub runtime: String,
    pub handler: String,
    /// Directory holding the function code, relative to the repository root
    pub code_asset: String,
    pub role: Expr,
    pub environment: BTreeMap<String, Expr>,
    pub timeout_seconds: u32,
}

/// Resource-based permission letting a service invoke a function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPermission {
    pub function: Expr,
    pub principal: String,
    pub source_arn: Expr,
}

/// Event pattern of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPattern {
    pub source: Vec<String>,
    pub detail_type: Vec<String>,
    /// detail field -> accepted values
    pub detail: BTreeMap<String, Vec<String>>,
}

impl EventPattern {
    /// Whether an event with the given envelope and detail fields matches.
    ///
    /// Mirrors the routing layer's semantics for exact-value lists: every
    /// listed field must be present with one of the accepted values.
    pub fn matches(&self, source: &str, detail_type: &str, detail: &BTreeMap<String, String>) -> bool {
        self.source.iter().any(|s| s == source)
            && self.detail_type.iter().any(|t| t == detail_type)
            && self.detail.iter().all(|(field, accepted)| {
                detail
                    .get(field)
                    .is_some_and(|value| accepted.iter().any(|a| a == value))
            })
    }
}

/// Rule target with delivery retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTarget {
    pub id: String,
    pub arn: Expr,
    pub retry_attempts: u32,
}

/// Event routing rule.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRule {
    pub pattern: EventPattern,
    pub targets: Vec<RuleTarget>,
}

/// A statement appended to the resource policy of an existing key or bucket.
///
/// Kept as its own node so the graph records which dataset asked for it; the
/// template adapter folds it into the target's policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyAttachment {
    pub target: LogicalId,
    pub statement: PolicyStatement,
}
