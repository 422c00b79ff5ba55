//! Dataset descriptors consumed by the processing assembler.
//!
//! A descriptor says where a dataset lives, which key protects it, how often
//! to crawl it and whether its crawls should lead to catalog registration.
//! Whether the source bucket is managed by this deployment is a tagged
//! variant, so every consumer has to handle the external case explicitly.

use crate::error::{DzRegError, Result};
use crate::graph::{Expr, LogicalId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Glue schedules are six-field cron expressions wrapped in `cron(...)`
const CRON_PATTERN: &str = r"^cron\(\S+( \S+){5}\)$";

static CRON_REGEX: OnceLock<Regex> = OnceLock::new();

fn cron_regex() -> Result<&'static Regex> {
    if let Some(regex) = CRON_REGEX.get() {
        return Ok(regex);
    }
    let compiled = Regex::new(CRON_PATTERN).map_err(|e| {
        DzRegError::configuration(format!("Failed to compile schedule pattern: {}", e))
    })?;
    Ok(CRON_REGEX.get_or_init(|| compiled))
}

/// A source bucket declared in the same graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedBucket {
    /// Bucket node
    pub bucket: LogicalId,
    /// Key node protecting the bucket, if it is one of ours
    pub key: Option<LogicalId>,
}

/// Who manages the dataset's source bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOwnership {
    /// Managed by this deployment; its policies can be extended
    Owned(OwnedBucket),
    /// Supplied by someone else. Governance-read statements are not emitted
    /// and the external owner must grant equivalent access themselves.
    External,
}

/// One dataset to onboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetDescriptor {
    /// Unique within a deployment; fragment of every derived name
    pub name: String,
    pub bucket: BucketOwnership,
    pub bucket_name: String,
    /// Prefix inside the bucket, may be empty
    pub key_prefix: String,
    /// ARN of the key protecting the bucket
    pub key_arn: Expr,
    /// Whether completed crawls should lead to catalog registration
    pub registration: bool,
    /// `cron(...)` schedule for periodic discovery
    pub schedule: String,
}

impl DatasetDescriptor {
    /// `s3://{bucket}/{prefix}` location used by the database and crawler
    pub fn location_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket_name, self.key_prefix)
    }

    /// Whether this dataset's bucket is managed by the deployment
    pub fn owns_bucket(&self) -> bool {
        matches!(self.bucket, BucketOwnership::Owned(_))
    }

    /// Validates the descriptor fields that feed derived names and schedules.
    ///
    /// # Errors
    /// Returns `InvalidDataset` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_dataset_name(&self.name)?;

        if self.bucket_name.trim().is_empty() {
            return Err(DzRegError::invalid_dataset(
                &self.name,
                "bucket name cannot be empty",
            ));
        }

        if let Some(key_arn) = self.key_arn.as_literal()
            && !key_arn.starts_with("arn:")
        {
            return Err(DzRegError::invalid_dataset(
                &self.name,
                format!("key ARN '{}' is not an ARN", key_arn),
            ));
        }

        validate_schedule(&self.name, &self.schedule)
    }
}

/// Checks that a dataset name is usable as a name fragment.
///
/// # Errors
/// Returns `InvalidDataset` if the name is empty or has characters outside
/// ASCII letters, digits, `-` and `_`.
pub fn validate_dataset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DzRegError::invalid_dataset(name, "name cannot be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DzRegError::invalid_dataset(
            name,
            "name may only contain letters, digits, '-' and '_'",
        ));
    }
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(DzRegError::invalid_dataset(
            name,
            "name must contain at least one letter or digit",
        ));
    }
    Ok(())
}

/// Checks that no two datasets share a name or a logical-id prefix.
///
/// Separators are dropped and the first letter of each part is upper-cased
/// when ids are derived, so `sales-eu` and `sales_eu` would declare the same
/// resources.
///
/// # Errors
/// Returns `InvalidDataset` for the second dataset of a clashing pair.
pub fn check_distinct_datasets<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut prefixes: HashMap<LogicalId, &str> = HashMap::new();
    for name in names {
        let prefix = LogicalId::derive(&[name])?;
        if let Some(other) = prefixes.insert(prefix.clone(), name) {
            let reason = if other == name {
                "dataset names must be unique within a deployment".to_string()
            } else {
                format!(
                    "resource ids derived from this name ({}...) clash with dataset '{}'",
                    prefix, other
                )
            };
            return Err(DzRegError::invalid_dataset(name, reason));
        }
    }
    Ok(())
}

/// Checks that `schedule` is a six-field `cron(...)` expression.
///
/// # Errors
/// Returns `InvalidDataset` for anything else.
pub fn validate_schedule(dataset: &str, schedule: &str) -> Result<()> {
    if !cron_regex()?.is_match(schedule) {
        return Err(DzRegError::invalid_dataset(
            dataset,
            format!(
                "schedule '{}' must be a cron expression such as 'cron(0 1 * * ? *)'",
                schedule
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DatasetDescriptor {
        DatasetDescriptor {
            name: "testdata".to_string(),
            bucket: BucketOwnership::External,
            bucket_name: "producer-bucket".to_string(),
            key_prefix: "raw/".to_string(),
            key_arn: Expr::literal("arn:aws:kms:eu-west-1:991651053978:key/abc"),
            registration: true,
            schedule: "cron(0 1 * * ? *)".to_string(),
        }
    }

    #[test]
    fn test_location_uri() {
        assert_eq!(descriptor().location_uri(), "s3://producer-bucket/raw/");

        let mut empty_prefix = descriptor();
        empty_prefix.key_prefix = String::new();
        assert_eq!(empty_prefix.location_uri(), "s3://producer-bucket/");
    }

    #[test]
    fn test_valid_descriptor() {
        assert!(descriptor().validate().is_ok());
        assert!(!descriptor().owns_bucket());
    }

    #[test]
    fn test_schedule_validation() {
        assert!(validate_schedule("d", "cron(0 1 * * ? *)").is_ok());
        assert!(validate_schedule("d", "cron(15 12 * * ? *)").is_ok());
        assert!(validate_schedule("d", "rate(1 day)").is_err());
        assert!(validate_schedule("d", "cron(0 1 * *)").is_err());
        assert!(validate_schedule("d", "").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_dataset_name("sales_eu-2024").is_ok());
        assert!(validate_dataset_name("").is_err());
        assert!(validate_dataset_name("sales eu").is_err());
        assert!(validate_dataset_name("sales/eu").is_err());
        assert!(validate_dataset_name("-_").is_err());
    }

    #[test]
    fn test_separator_variants_clash() {
        assert!(check_distinct_datasets(["sales-eu", "sales-us", "testdata"]).is_ok());

        let error = check_distinct_datasets(["sales-eu", "sales_eu"]).unwrap_err();
        match error {
            DzRegError::InvalidDataset { dataset, reason } => {
                assert_eq!(dataset, "sales_eu");
                assert!(reason.contains("'sales-eu'"), "{}", reason);
            }
            other => panic!("expected invalid dataset, got {:?}", other),
        }

        assert!(check_distinct_datasets(["testdata", "Testdata"]).is_err());
        let error = check_distinct_datasets(["testdata", "testdata"]).unwrap_err();
        assert!(error.to_string().contains("unique"));
    }

    #[test]
    fn test_literal_key_must_be_arn() {
        let mut bad_key = descriptor();
        bad_key.key_arn = Expr::literal("not-an-arn");
        let error = bad_key.validate().unwrap_err();
        assert!(error.to_string().contains("not an ARN"));
    }

    #[test]
    fn test_referenced_key_skips_arn_check() {
        let mut owned = descriptor();
        let key = LogicalId::new("GlueEncryptionKey").unwrap();
        owned.key_arn = Expr::arn_of(&key);
        owned.bucket = BucketOwnership::Owned(OwnedBucket {
            bucket: LogicalId::new("TestBucket").unwrap(),
            key: Some(key),
        });
        assert!(owned.validate().is_ok());
        assert!(owned.owns_bucket());
    }
}
