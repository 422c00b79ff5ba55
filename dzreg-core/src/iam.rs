//! IAM policy documents as plain data.
//!
//! Statements are built with a small builder and rendered to the standard
//! JSON policy grammar. Action matching follows IAM wildcard rules (`*` and
//! `?`, case-insensitive) so callers can ask whether a document would grant
//! a given action.

use crate::graph::{Expr, LogicalId};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// IAM policy language version emitted for every document
pub const POLICY_VERSION: &str = "2012-10-17";

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    /// Name used in the policy grammar
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// Who a resource or trust policy statement applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Any principal (`"*"`); only safe with a condition attached
    Any,
    /// A service principal such as `glue.amazonaws.com`
    Service(String),
    /// The root principal of an account
    AccountRoot { partition: String, account_id: String },
    /// A specific IAM principal ARN
    Arn(Expr),
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
    /// operator -> condition key -> values
    pub conditions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl PolicyStatement {
    /// Starts an `Allow` statement
    pub fn allow() -> Self {
        Self::with_effect(Effect::Allow)
    }

    /// Starts a `Deny` statement
    pub fn deny() -> Self {
        Self::with_effect(Effect::Deny)
    }

    fn with_effect(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            principals: Vec::new(),
            actions: Vec::new(),
            resources: Vec::new(),
            conditions: BTreeMap::new(),
        }
    }

    /// Builder method to set the statement id
    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Builder method to add a principal
    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    /// Builder method to add actions
    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Builder method to add resources
    pub fn resources<I, E>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    /// Builder method to scope the statement to every resource
    pub fn any_resource(self) -> Self {
        self.resources(["*"])
    }

    /// Builder method to add a condition
    pub fn condition<I, S>(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions
            .entry(operator.into())
            .or_default()
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Whether the statement names `action`, honouring wildcards
    pub fn covers_action(&self, action: &str) -> bool {
        self.actions
            .iter()
            .any(|pattern| action_matches(pattern, action))
    }

    /// Whether any resource entry is the bare `*` wildcard
    pub fn has_wildcard_resource(&self) -> bool {
        self.resources
            .iter()
            .any(|resource| resource.as_literal() == Some("*"))
    }

    /// Whether the statement applies to any principal
    pub fn has_any_principal(&self) -> bool {
        self.principals.contains(&Principal::Any)
    }

    /// Nodes referenced from principals and resources
    pub fn references(&self) -> Vec<&LogicalId> {
        let principal_refs = self.principals.iter().filter_map(|principal| match principal {
            Principal::Arn(expr) => expr.referenced_id(),
            _ => None,
        });
        self.resources
            .iter()
            .filter_map(Expr::referenced_id)
            .chain(principal_refs)
            .collect()
    }

    /// Renders the statement in policy JSON form
    pub fn to_json(&self) -> Value {
        let mut statement = Map::new();
        if let Some(sid) = &self.sid {
            statement.insert("Sid".to_string(), json!(sid));
        }
        statement.insert("Effect".to_string(), json!(self.effect.as_str()));
        if !self.principals.is_empty() {
            statement.insert("Principal".to_string(), render_principals(&self.principals));
        }
        statement.insert("Action".to_string(), collapse(self.actions.iter().map(|a| json!(a))));
        if !self.resources.is_empty() {
            statement.insert(
                "Resource".to_string(),
                collapse(self.resources.iter().map(Expr::to_json)),
            );
        }
        if !self.conditions.is_empty() {
            let conditions: Map<String, Value> = self
                .conditions
                .iter()
                .map(|(operator, keys)| {
                    let keys: Map<String, Value> = keys
                        .iter()
                        .map(|(key, values)| {
                            (key.clone(), collapse(values.iter().map(|v| json!(v))))
                        })
                        .collect();
                    (operator.clone(), Value::Object(keys))
                })
                .collect();
            statement.insert("Condition".to_string(), Value::Object(conditions));
        }
        Value::Object(statement)
    }
}

/// One element renders as a scalar, several as an array.
fn collapse(values: impl Iterator<Item = Value>) -> Value {
    let mut values: Vec<Value> = values.collect();
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

fn render_principals(principals: &[Principal]) -> Value {
    if principals.contains(&Principal::Any) {
        return json!("*");
    }

    let mut services = Vec::new();
    let mut aws = Vec::new();
    for principal in principals {
        match principal {
            Principal::Service(service) => services.push(json!(service)),
            Principal::AccountRoot {
                partition,
                account_id,
            } => aws.push(json!(format!("arn:{}:iam::{}:root", partition, account_id))),
            Principal::Arn(expr) => aws.push(expr.to_json()),
            Principal::Any => {}
        }
    }

    let mut rendered = Map::new();
    if !aws.is_empty() {
        rendered.insert("AWS".to_string(), collapse(aws.into_iter()));
    }
    if !services.is_empty() {
        rendered.insert("Service".to_string(), collapse(services.into_iter()));
    }
    Value::Object(rendered)
}

/// An ordered list of statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Creates an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to append a statement
    pub fn with(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Appends a statement
    pub fn push(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    /// Statements in declaration order
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Whether any `Allow` statement covers `action`
    pub fn allows_action(&self, action: &str) -> bool {
        self.statements
            .iter()
            .any(|statement| statement.effect == Effect::Allow && statement.covers_action(action))
    }

    /// Nodes referenced by any statement
    pub fn references(&self) -> Vec<&LogicalId> {
        self.statements
            .iter()
            .flat_map(PolicyStatement::references)
            .collect()
    }

    /// Renders the document in policy JSON form
    pub fn to_json(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Matches an IAM action pattern against a concrete action.
///
/// `*` matches any run of characters and `?` exactly one; comparison is
/// case-insensitive as in IAM.
pub fn action_matches(pattern: &str, action: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let action: Vec<char> = action.to_ascii_lowercase().chars().collect();

    let (mut p, mut a) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while a < action.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == action[a]) {
            p = p.saturating_add(1);
            a = a.saturating_add(1);
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, a));
            p = p.saturating_add(1);
        } else if let Some((star, matched)) = backtrack {
            let next = matched.saturating_add(1);
            p = star.saturating_add(1);
            a = next;
            backtrack = Some((star, next));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
