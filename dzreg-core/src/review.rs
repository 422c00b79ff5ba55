//! Security review helpers.
//!
//! Some identity policies grant actions on every resource, either because
//! the action takes no resource scope or because the resource is only known
//! at run time. These are reported for a human reviewer and left as they
//! are.

use crate::graph::{LogicalId, ResourceGraph};
use crate::iam::Effect;
use crate::resources::Resource;
use std::fmt;

/// An `Allow` statement in a role's inline policy scoped to `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardGrant {
    pub role: LogicalId,
    pub role_name: String,
    pub policy: String,
    pub actions: Vec<String>,
    /// Whether the statement narrows the grant with a condition
    pub conditioned: bool,
}

impl fmt::Display for WildcardGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) policy {} allows [{}] on *{}",
            self.role_name,
            self.role,
            self.policy,
            self.actions.join(", "),
            if self.conditioned {
                " with a condition"
            } else {
                ""
            }
        )
    }
}

/// Lists every wildcard-resource `Allow` in role inline policies, in
/// declaration order.
pub fn wildcard_grants(graph: &ResourceGraph) -> Vec<WildcardGrant> {
    let mut grants = Vec::new();
    for node in graph.nodes() {
        let Resource::Role(role) = &node.resource else {
            continue;
        };
        for (policy, document) in &role.inline_policies {
            for statement in document.statements() {
                if statement.effect == Effect::Allow && statement.has_wildcard_resource() {
                    grants.push(WildcardGrant {
                        role: node.id.clone(),
                        role_name: role.name.clone(),
                        policy: policy.clone(),
                        actions: statement.actions.clone(),
                        conditioned: !statement.conditions.is_empty(),
                    });
                }
            }
        }
    }
    grants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Component;
    use crate::iam::{PolicyDocument, PolicyStatement};
    use crate::resources::Role;
    use std::collections::BTreeMap;

    fn role(statements: Vec<PolicyStatement>) -> Resource {
        let mut document = PolicyDocument::new();
        for statement in statements {
            document.push(statement);
        }
        Resource::Role(Role {
            name: "crawler".to_string(),
            trust: PolicyDocument::new(),
            inline_policies: BTreeMap::from([("Inline".to_string(), document)]),
            managed_policy_arns: Vec::new(),
        })
    }

    #[test]
    fn test_reports_wildcards_only() {
        let mut graph = ResourceGraph::new();
        graph
            .add(
                Component::Processing,
                LogicalId::new("CrawlerRole").unwrap(),
                role(vec![
                    PolicyStatement::allow()
                        .actions(["lakeformation:GetDataAccess"])
                        .any_resource(),
                    PolicyStatement::allow()
                        .actions(["glue:GetTable"])
                        .resources(["arn:aws:glue:eu-west-1:1:table/db/*"]),
                    PolicyStatement::deny().actions(["s3:*"]).any_resource(),
                ]),
            )
            .unwrap();

        let grants = wildcard_grants(&graph);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].actions, vec!["lakeformation:GetDataAccess"]);
        assert!(!grants[0].conditioned);
        assert_eq!(
            grants[0].to_string(),
            "crawler (CrawlerRole) policy Inline allows [lakeformation:GetDataAccess] on *"
        );
    }

    #[test]
    fn test_conditioned_grant_flagged_as_such() {
        let mut graph = ResourceGraph::new();
        graph
            .add(
                Component::Registration,
                LogicalId::new("FunctionRole").unwrap(),
                role(vec![
                    PolicyStatement::allow()
                        .actions(["kms:Decrypt"])
                        .any_resource()
                        .condition("StringEquals", "aws:ResourceAccount", ["123456789012"]),
                ]),
            )
            .unwrap();

        let grants = wildcard_grants(&graph);
        assert_eq!(grants.len(), 1);
        assert!(grants[0].conditioned);
        assert!(grants[0].to_string().ends_with("with a condition"));
    }
}
