//! Deployment-wide encryption key.
//!
//! One key protects catalog metadata, crawler logs and the buckets this
//! deployment creates. The account root and the region's log-delivery
//! service may encrypt and decrypt with it.

use crate::config::Environment;
use crate::error::Result;
use crate::graph::{Component, Expr, LogicalId, ResourceGraph};
use crate::iam::{PolicyDocument, PolicyStatement};
use crate::resources::{KmsAlias, KmsKey, Resource};
use tracing::info;

/// Alias attached to the key
pub const KEY_ALIAS: &str = "alias/glue-kms-key-test";

/// Actions granted by an encrypt/decrypt grant
pub const ENCRYPT_DECRYPT_ACTIONS: [&str; 4] = [
    "kms:Decrypt",
    "kms:Encrypt",
    "kms:ReEncrypt*",
    "kms:GenerateDataKey*",
];

/// What later assemblers need from the encryption step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOutputs {
    pub key: LogicalId,
    pub alias: LogicalId,
}

impl EncryptionOutputs {
    /// The key ARN, resolved by the provisioning engine
    pub fn key_arn(&self) -> Expr {
        Expr::arn_of(&self.key)
    }
}

/// Declares the key and its alias.
///
/// # Errors
/// Returns an error if the ids are already taken in `graph`.
pub fn provision(graph: &mut ResourceGraph, env: &Environment) -> Result<EncryptionOutputs> {
    let policy = PolicyDocument::new()
        .with(
            PolicyStatement::allow()
                .sid("EnableRootAdministration")
                .principal(env.root_principal())
                .actions(["kms:*"])
                .any_resource(),
        )
        .with(
            PolicyStatement::allow()
                .sid("AllowAccountEncryptDecrypt")
                .principal(env.root_principal())
                .actions(ENCRYPT_DECRYPT_ACTIONS)
                .any_resource(),
        )
        // crawler log groups are encrypted with this key
        .with(
            PolicyStatement::allow()
                .sid("AllowLogDeliveryEncryptDecrypt")
                .principal(env.logs_service_principal())
                .actions(ENCRYPT_DECRYPT_ACTIONS)
                .any_resource(),
        );

    let key = graph.add(
        Component::Encryption,
        LogicalId::new("GlueEncryptionKey")?,
        Resource::KmsKey(KmsKey {
            description: "Kms key to encrypt Glue Catalogs".to_string(),
            policy,
            retain: true,
        }),
    )?;

    let alias = graph.add(
        Component::Encryption,
        LogicalId::new("GlueEncryptionKeyAlias")?,
        Resource::KmsAlias(KmsAlias {
            name: KEY_ALIAS.to_string(),
            target: Expr::reference(&key),
        }),
    )?;

    info!("Declared deployment encryption key {}", key);
    Ok(EncryptionOutputs { key, alias })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::Principal;

    #[test]
    fn test_key_grants_root_and_log_delivery() {
        let mut graph = ResourceGraph::new();
        let env = Environment::new("991651053978", "eu-west-1");
        let outputs = provision(&mut graph, &env).unwrap();

        let Some(Resource::KmsKey(key)) = graph.get(&outputs.key).map(|n| &n.resource) else {
            panic!("key node missing");
        };
        assert!(key.retain);

        let logs = Principal::Service("logs.eu-west-1.amazonaws.com".to_string());
        let log_statement = key
            .policy
            .statements()
            .iter()
            .find(|s| s.principals.contains(&logs))
            .expect("log delivery statement");
        assert!(log_statement.covers_action("kms:Decrypt"));
        assert!(log_statement.covers_action("kms:Encrypt"));
        assert!(log_statement.covers_action("kms:GenerateDataKey"));

        assert!(
            key.policy
                .statements()
                .iter()
                .any(|s| s.principals.contains(&env.root_principal())
                    && s.covers_action("kms:Decrypt"))
        );
    }

    #[test]
    fn test_alias_references_key() {
        let mut graph = ResourceGraph::new();
        let env = Environment::new("991651053978", "eu-west-1");
        let outputs = provision(&mut graph, &env).unwrap();

        assert!(graph.dependencies_of(&outputs.alias).contains(&outputs.key));
        assert_eq!(
            outputs.key_arn(),
            Expr::GetAtt {
                id: outputs.key.clone(),
                attribute: "Arn".to_string()
            }
        );
    }

    #[test]
    fn test_provision_twice_fails() {
        let mut graph = ResourceGraph::new();
        let env = Environment::new("991651053978", "eu-west-1");
        provision(&mut graph, &env).unwrap();
        assert!(provision(&mut graph, &env).is_err());
    }
}
