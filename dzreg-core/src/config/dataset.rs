//! Per-dataset entries of the configuration file.

use serde::{Deserialize, Serialize};

/// Where a configured dataset's bucket comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketSourceConfig {
    /// The test datasource bucket created by this deployment
    Managed,
    /// A bucket owned elsewhere
    External {
        /// Bucket name
        name: String,
        /// ARN of the key protecting the bucket
        key_arn: String,
    },
}

/// One `[[datasets]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub bucket: BucketSourceConfig,
    #[serde(default)]
    pub key_prefix: String,
    pub registration: bool,
    pub schedule: String,
}
