//! Resource-graph assembly for dataset discovery and catalog registration.
//!
//! Turns a deployment configuration (catalog domain, producer identity and
//! the datasets to onboard) into an immutable graph of typed resource
//! declarations joined by explicit dependency edges, then renders that graph
//! as a template for a provisioning engine.
//!
//! Nothing here calls a cloud API. Naming, policy scoping and ordering are
//! all decided while the graph is built, so they can be tested without a
//! deployment.
//!
//! # Example
//! ```rust
//! use dzreg_core::{DeploymentConfig, build_deployment, template};
//!
//! let config = DeploymentConfig::from_toml_str(r#"
//! application_qualifier = "datazone"
//!
//! [deployment]
//! account_id = "991651053978"
//! region = "eu-west-1"
//!
//! [domain]
//! name = "corp-domain"
//! account_id = "123456789012"
//! region = "eu-west-1"
//! project_name = "analytics"
//!
//! [producer]
//! account_id = "991651053978"
//! deploy_role = "cdk-hnb659fds-cfn-exec-role-991651053978-eu-west-1"
//!
//! [[datasets]]
//! name = "testdata"
//! registration = true
//! schedule = "cron(0 1 * * ? *)"
//! bucket = { kind = "managed" }
//! "#)?;
//!
//! let deployment = build_deployment(&config)?;
//! let rendered = template::render(&deployment.graph)?;
//! assert!(rendered["Resources"]["TestdataGlueCrawler"].is_object());
//! # Ok::<(), dzreg_core::DzRegError>(())
//! ```

pub mod assembly;
pub mod components;
pub mod config;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod iam;
pub mod logging;
pub mod naming;
pub mod resources;
pub mod review;
pub mod template;
pub mod validation;

// Re-export commonly used types
pub use assembly::{Deployment, build_deployment};
pub use config::{DatasetConfig, DeploymentConfig, DomainConfig, Environment, ProducerConfig};
pub use dataset::{BucketOwnership, DatasetDescriptor, OwnedBucket};
pub use error::{DzRegError, Result};
pub use graph::{Component, Edge, EdgeKind, Expr, LogicalId, Node, ResourceGraph};
pub use logging::init_logging;
pub use review::{WildcardGrant, wildcard_grants};
pub use validation::{ValidationError, validate_template};
