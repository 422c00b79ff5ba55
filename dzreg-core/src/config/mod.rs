//! Deployment configuration.
//!
//! A single TOML document describes the producer environment, the catalog
//! domain, the producer's deployment role and the datasets to onboard. It is
//! read once when the graph is built:
//! - `Environment`: account, region and partition of the deployment
//! - `DomainConfig` / `ProducerConfig`: the identities on both sides
//! - `DatasetConfig`: one entry per dataset

mod dataset;
mod domain;
mod environment;

pub use dataset::{BucketSourceConfig, DatasetConfig};
pub use domain::{DomainConfig, ProducerConfig};
pub use environment::{Environment, validate_account_id};

use crate::dataset::{check_distinct_datasets, validate_dataset_name, validate_schedule};
use crate::error::{DzRegError, Result};
use crate::naming::{ApplicationQualifier, DatasetNames};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete input for one deployment graph.
///
/// # Example
/// ```rust
/// use dzreg_core::config::DeploymentConfig;
///
/// let config = DeploymentConfig::from_toml_str(r#"
/// application_qualifier = "datazone"
///
/// [deployment]
/// account_id = "991651053978"
/// region = "eu-west-1"
///
/// [domain]
/// name = "corp-domain"
/// account_id = "123456789012"
/// region = "eu-west-1"
/// project_name = "analytics"
///
/// [producer]
/// account_id = "991651053978"
/// deploy_role = "cdk-hnb659fds-cfn-exec-role-991651053978-eu-west-1"
/// "#).unwrap();
///
/// assert!(config.validate().is_ok());
/// assert!(config.datasets.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Prefix for every derived name
    pub application_qualifier: String,
    pub deployment: Environment,
    pub domain: DomainConfig,
    pub producer: ProducerConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

impl DeploymentConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    /// Returns `ConfigParse` if the document does not match the expected shape.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        toml::from_str(document).map_err(|e| DzRegError::ConfigParse {
            context: "configuration document".to_string(),
            source: e,
        })
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read and `ConfigParse` if it is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path).map_err(|e| DzRegError::Io {
            context: format!("Failed to read {}", path.display()),
            source: e,
        })?;
        toml::from_str(&document).map_err(|e| DzRegError::ConfigParse {
            context: path.display().to_string(),
            source: e,
        })
    }

    /// The parsed application qualifier.
    ///
    /// # Errors
    /// Returns a configuration error if the qualifier is malformed.
    pub fn qualifier(&self) -> Result<ApplicationQualifier> {
        ApplicationQualifier::new(&self.application_qualifier)
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    /// Returns the first configuration or dataset error found.
    pub fn validate(&self) -> Result<()> {
        let qualifier = self.qualifier()?;
        self.deployment.validate()?;
        self.domain.validate()?;
        self.producer.validate()?;

        for dataset in &self.datasets {
            validate_dataset_name(&dataset.name)?;
        }
        check_distinct_datasets(self.datasets.iter().map(|dataset| dataset.name.as_str()))?;

        for dataset in &self.datasets {
            DatasetNames::derive(&qualifier, &dataset.name).check_limits(&dataset.name)?;
            validate_schedule(&dataset.name, &dataset.schedule)?;

            if let BucketSourceConfig::External { name, key_arn } = &dataset.bucket {
                if name.trim().is_empty() {
                    return Err(DzRegError::invalid_dataset(
                        &dataset.name,
                        "external bucket name cannot be empty",
                    ));
                }
                if !key_arn.starts_with("arn:") {
                    return Err(DzRegError::invalid_dataset(
                        &dataset.name,
                        format!("external key ARN '{}' is not an ARN", key_arn),
                    ));
                }
            }
        }

        Ok(())
    }
}
