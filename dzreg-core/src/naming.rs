//! Deterministic resource names.
//!
//! All names are pure functions of the application qualifier and a handful
//! of identifiers, so the same configuration always yields the same graph.

use crate::error::{DzRegError, Result};

/// IAM role names are limited to this many characters
pub const MAX_ROLE_NAME_LEN: usize = 64;

/// Catalog database and crawler names are limited to this many characters
pub const MAX_CATALOG_NAME_LEN: usize = 255;

/// Short deployment-scoped prefix for every derived name.
///
/// Stored lowercased; `Datazone` and `datazone` are the same qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationQualifier(String);

impl ApplicationQualifier {
    /// Creates a qualifier from user input.
    ///
    /// # Errors
    /// Returns a configuration error if the value is empty or contains
    /// characters other than ASCII letters, digits and `-`.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(DzRegError::configuration(
                "application_qualifier cannot be empty",
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DzRegError::configuration(format!(
                "application_qualifier '{}' may only contain letters, digits and '-'",
                raw
            )));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The lowercased label used in names
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationQualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names derived for one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetNames {
    /// `{qualifier}-{dataset}-db`
    pub database: String,
    /// `{qualifier}-{dataset}-data-crawler`
    pub crawler: String,
    /// `AWSGlueCrawlerRole-{qualifier}-{dataset}`
    pub crawler_role: String,
    /// `{qualifier}-{dataset}-`
    pub table_prefix: String,
}

impl DatasetNames {
    /// Derives every per-dataset name.
    ///
    /// # Example
    /// ```rust
    /// use dzreg_core::naming::{ApplicationQualifier, DatasetNames};
    ///
    /// let qualifier = ApplicationQualifier::new("datazone").unwrap();
    /// let names = DatasetNames::derive(&qualifier, "testdata");
    /// assert_eq!(names.database, "datazone-testdata-db");
    /// assert_eq!(names.crawler, "datazone-testdata-data-crawler");
    /// assert_eq!(names.crawler_role, "AWSGlueCrawlerRole-datazone-testdata");
    /// ```
    pub fn derive(qualifier: &ApplicationQualifier, dataset: &str) -> Self {
        let label = qualifier.label();
        Self {
            database: format!("{}-{}-db", label, dataset),
            crawler: format!("{}-{}-data-crawler", label, dataset),
            crawler_role: format!("AWSGlueCrawlerRole-{}-{}", label, dataset),
            table_prefix: format!("{}-{}-", label, dataset),
        }
    }

    /// Checks the derived names against service length limits.
    ///
    /// # Errors
    /// Returns `InvalidDataset` naming the first name that is too long.
    pub fn check_limits(&self, dataset: &str) -> Result<()> {
        if self.crawler_role.len() > MAX_ROLE_NAME_LEN {
            return Err(DzRegError::invalid_dataset(
                dataset,
                format!(
                    "crawler role name '{}' exceeds {} characters",
                    self.crawler_role, MAX_ROLE_NAME_LEN
                ),
            ));
        }
        for name in [&self.database, &self.crawler] {
            if name.len() > MAX_CATALOG_NAME_LEN {
                return Err(DzRegError::invalid_dataset(
                    dataset,
                    format!("'{}' exceeds {} characters", name, MAX_CATALOG_NAME_LEN),
                ));
            }
        }
        Ok(())
    }
}

/// Name of the shared crawler security configuration
pub fn security_configuration_name(qualifier: &ApplicationQualifier) -> String {
    format!("{}-Crawler-Security-Config", qualifier.label())
}

/// Name of the registration artifact bucket
pub fn artifact_bucket_name(
    qualifier: &ApplicationQualifier,
    producer_account: &str,
    domain_region: &str,
) -> String {
    labelled_bucket_name(qualifier, "datazone-artifact", producer_account, domain_region)
}

/// Name of the test datasource bucket created by the top-level assembler
pub fn test_bucket_name(
    qualifier: &ApplicationQualifier,
    producer_account: &str,
    domain_region: &str,
) -> String {
    labelled_bucket_name(
        qualifier,
        "datazone-test-datasource",
        producer_account,
        domain_region,
    )
}

fn labelled_bucket_name(
    qualifier: &ApplicationQualifier,
    label: &str,
    producer_account: &str,
    domain_region: &str,
) -> String {
    format!(
        "{}-{}-{}-{}",
        qualifier.label(),
        label.to_ascii_lowercase(),
        producer_account,
        domain_region
    )
}
