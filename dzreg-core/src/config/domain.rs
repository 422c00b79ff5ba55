//! Catalog-domain and data-producer identities.

use super::environment::validate_account_id;
use crate::error::{DzRegError, Result};
use serde::{Deserialize, Serialize};

fn default_assumed_role() -> String {
    "dz-assumable-env-dataset-registration-role".to_string()
}

/// Identifies the catalog domain datasets are registered into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain name as shown in the catalog service
    pub name: String,
    /// Account that owns the domain
    pub account_id: String,
    /// Region the domain lives in
    pub region: String,
    /// Role in the domain account the registration function assumes
    #[serde(default = "default_assumed_role")]
    pub assumed_role: String,
    /// Project inside the domain that receives registered datasets
    pub project_name: String,
}

impl DomainConfig {
    /// Validates the domain identity.
    ///
    /// # Errors
    /// Returns error if a required value is empty or the account id is malformed
    pub fn validate(&self) -> Result<()> {
        require_non_empty("domain.name", &self.name)?;
        validate_account_id("domain.account_id", &self.account_id)?;
        require_non_empty("domain.region", &self.region)?;
        require_non_empty("domain.assumed_role", &self.assumed_role)?;
        require_non_empty("domain.project_name", &self.project_name)?;
        Ok(())
    }

    /// ARN of the cross-account registration role
    pub fn registration_role_arn(&self, partition: &str) -> String {
        format!(
            "arn:{}:iam::{}:role/{}",
            partition, self.account_id, self.assumed_role
        )
    }
}

/// Producer account and the role that deploys catalog resources in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub account_id: String,
    /// Name of the deployment role, made a governed-access administrator
    pub deploy_role: String,
}

impl ProducerConfig {
    /// Validates the producer identity.
    ///
    /// # Errors
    /// Returns error if the account id is malformed or the role is empty
    pub fn validate(&self) -> Result<()> {
        validate_account_id("producer.account_id", &self.account_id)?;
        require_non_empty("producer.deploy_role", &self.deploy_role)?;
        Ok(())
    }

    /// ARN of the deployment role
    pub fn deploy_role_arn(&self, partition: &str) -> String {
        format!(
            "arn:{}:iam::{}:role/{}",
            partition, self.account_id, self.deploy_role
        )
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DzRegError::configuration(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> DomainConfig {
        DomainConfig {
            name: "corp-domain".to_string(),
            account_id: "123456789012".to_string(),
            region: "eu-west-1".to_string(),
            assumed_role: default_assumed_role(),
            project_name: "analytics".to_string(),
        }
    }

    #[test]
    fn test_registration_role_arn() {
        assert_eq!(
            domain().registration_role_arn("aws"),
            "arn:aws:iam::123456789012:role/dz-assumable-env-dataset-registration-role"
        );
    }

    #[test]
    fn test_domain_validation() {
        assert!(domain().validate().is_ok());

        let mut missing_project = domain();
        missing_project.project_name = String::new();
        let error = missing_project.validate().unwrap_err();
        assert!(error.to_string().contains("domain.project_name"));
    }

    #[test]
    fn test_producer_deploy_role_arn() {
        let producer = ProducerConfig {
            account_id: "991651053978".to_string(),
            deploy_role: "cdk-hnb659fds-cfn-exec-role-991651053978-eu-west-1".to_string(),
        };
        assert!(producer.validate().is_ok());
        assert_eq!(
            producer.deploy_role_arn("aws"),
            "arn:aws:iam::991651053978:role/cdk-hnb659fds-cfn-exec-role-991651053978-eu-west-1"
        );
    }
}
