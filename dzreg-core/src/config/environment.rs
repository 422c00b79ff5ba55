//! Producer environment the graph is built for.
//!
//! Holds the account, region and partition every ARN in the graph is
//! formatted against.

use crate::error::{DzRegError, Result};
use crate::iam::Principal;
use serde::{Deserialize, Serialize};

fn default_partition() -> String {
    "aws".to_string()
}

/// Account, region and partition of the deployment.
///
/// # Example
/// ```rust
/// use dzreg_core::config::Environment;
///
/// let env = Environment::new("991651053978", "eu-west-1");
/// assert_eq!(
///     env.role_arn("dz-dataset-registration-lambda-role"),
///     "arn:aws:iam::991651053978:role/dz-dataset-registration-lambda-role"
/// );
/// assert!(env.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Twelve-digit account id
    pub account_id: String,
    /// Region code, e.g. `eu-west-1`
    pub region: String,
    /// ARN partition
    #[serde(default = "default_partition")]
    pub partition: String,
}

impl Environment {
    /// Creates an environment in the standard partition.
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            partition: default_partition(),
        }
    }

    /// Validates the environment values.
    ///
    /// # Errors
    /// Returns error if the account id is malformed or region/partition is empty
    pub fn validate(&self) -> Result<()> {
        validate_account_id("deployment.account_id", &self.account_id)?;

        if self.region.trim().is_empty() {
            return Err(DzRegError::configuration("deployment.region cannot be empty"));
        }

        if self.partition.trim().is_empty() {
            return Err(DzRegError::configuration(
                "deployment.partition cannot be empty",
            ));
        }

        Ok(())
    }

    /// ARN of a role in this account
    pub fn role_arn(&self, name: &str) -> String {
        format!("arn:{}:iam::{}:role/{}", self.partition, self.account_id, name)
    }

    /// ARN of an AWS-managed policy
    pub fn managed_policy_arn(&self, name: &str) -> String {
        format!("arn:{}:iam::aws:policy/{}", self.partition, name)
    }

    /// ARN of a bucket
    pub fn bucket_arn(&self, bucket_name: &str) -> String {
        format!("arn:{}:s3:::{}", self.partition, bucket_name)
    }

    /// ARN of a catalog object in this account and region
    pub fn glue_arn(&self, resource: &str) -> String {
        format!(
            "arn:{}:glue:{}:{}:{}",
            self.partition, self.region, self.account_id, resource
        )
    }

    /// ARN of a log resource in this account and region
    pub fn logs_arn(&self, resource: &str) -> String {
        format!(
            "arn:{}:logs:{}:{}:{}",
            self.partition, self.region, self.account_id, resource
        )
    }

    /// ARN of this account's catalog in the governance service
    pub fn lakeformation_catalog_arn(&self) -> String {
        format!(
            "arn:{}:lakeformation:{}:{}:catalog:{}",
            self.partition, self.region, self.account_id, self.account_id
        )
    }

    /// ARN of the governance service-linked data-access role
    pub fn lakeformation_service_role_arn(&self) -> String {
        self.role_arn(
            "aws-service-role/lakeformation.amazonaws.com/AWSServiceRoleForLakeFormationDataAccess",
        )
    }

    /// Root principal of this account
    pub fn root_principal(&self) -> Principal {
        Principal::AccountRoot {
            partition: self.partition.clone(),
            account_id: self.account_id.clone(),
        }
    }

    /// Region-scoped log-delivery service principal
    pub fn logs_service_principal(&self) -> Principal {
        Principal::Service(format!("logs.{}.amazonaws.com", self.region))
    }
}

/// Checks that `value` is a twelve-digit account id.
///
/// # Errors
/// Returns a configuration error naming `field` otherwise.
pub fn validate_account_id(field: &str, value: &str) -> Result<()> {
    if value.len() != 12 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(DzRegError::configuration(format!(
            "{} must be a 12-digit account id, got '{}'",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arn_formatting() {
        let env = Environment::new("991651053978", "eu-west-1");

        assert_eq!(
            env.glue_arn("database/default"),
            "arn:aws:glue:eu-west-1:991651053978:database/default"
        );
        assert_eq!(
            env.logs_arn("log-group:/aws-glue/crawlers*"),
            "arn:aws:logs:eu-west-1:991651053978:log-group:/aws-glue/crawlers*"
        );
        assert_eq!(env.bucket_arn("data"), "arn:aws:s3:::data");
        assert_eq!(
            env.lakeformation_catalog_arn(),
            "arn:aws:lakeformation:eu-west-1:991651053978:catalog:991651053978"
        );
        assert_eq!(
            env.managed_policy_arn("service-role/AWSGlueServiceRole"),
            "arn:aws:iam::aws:policy/service-role/AWSGlueServiceRole"
        );
    }

    #[test]
    fn test_partition_is_respected() {
        let mut env = Environment::new("991651053978", "cn-north-1");
        env.partition = "aws-cn".to_string();
        assert!(env.role_arn("x").starts_with("arn:aws-cn:iam::"));
    }

    #[test]
    fn test_account_id_validation() {
        assert!(validate_account_id("a", "123456789012").is_ok());
        assert!(validate_account_id("a", "12345678901").is_err());
        assert!(validate_account_id("a", "12345678901x").is_err());
        assert!(validate_account_id("a", "").is_err());
    }

    #[test]
    fn test_empty_region_rejected() {
        let env = Environment::new("991651053978", " ");
        assert!(env.validate().is_err());
    }

    #[test]
    fn test_logs_principal_is_region_scoped() {
        let env = Environment::new("991651053978", "eu-west-1");
        assert_eq!(
            env.logs_service_principal(),
            Principal::Service("logs.eu-west-1.amazonaws.com".to_string())
        );
    }
}
