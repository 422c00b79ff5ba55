//! Template validation.
//!
//! A rendered template is checked against an embedded JSON Schema and then
//! against the security rules every deployment must satisfy:
//! - an `Allow` statement open to any principal must carry a condition
//! - no inline role policy may grant `glue:DeleteDatabase`
//!
//! # Example
//! ```rust
//! use dzreg_core::validation::validate_template;
//! use serde_json::json;
//!
//! let template = json!({
//!     "AWSTemplateFormatVersion": "2010-09-09",
//!     "Resources": {}
//! });
//! assert!(validate_template(&template).is_ok());
//! ```

use crate::iam::action_matches;
use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Template validation errors with per-field reporting
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// The template does not match the schema
    #[error("Schema validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// A policy in the template breaks a security rule
    #[error("Security validation failed: {reason}")]
    SecurityViolation { reason: String },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

/// Actions no inline role policy may grant
const FORBIDDEN_ROLE_ACTIONS: &[&str] = &["glue:DeleteDatabase"];

/// Embedded schema for rendered templates
const TEMPLATE_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "dzreg deployment template",
  "type": "object",
  "required": ["AWSTemplateFormatVersion", "Resources"],
  "properties": {
    "AWSTemplateFormatVersion": { "const": "2010-09-09" },
    "Description": { "type": "string" },
    "Resources": {
      "type": "object",
      "propertyNames": { "pattern": "^[A-Za-z0-9]+$" },
      "additionalProperties": { "$ref": "#/$defs/resource" }
    }
  },
  "$defs": {
    "resource": {
      "type": "object",
      "required": ["Type", "Properties"],
      "properties": {
        "Type": { "type": "string", "pattern": "^AWS::[A-Za-z0-9]+::[A-Za-z0-9]+$" },
        "Properties": { "type": "object" },
        "DependsOn": {
          "type": "array",
          "items": { "type": "string", "pattern": "^[A-Za-z0-9]+$" },
          "uniqueItems": true
        },
        "Metadata": { "type": "object" },
        "DeletionPolicy": { "enum": ["Delete", "Retain", "Snapshot"] },
        "UpdateReplacePolicy": { "enum": ["Delete", "Retain", "Snapshot"] }
      },
      "additionalProperties": false
    }
  }
}"##;

static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Compiles the embedded schema on first use.
///
/// # Errors
/// Returns `SchemaCompilation` if the embedded schema is malformed.
pub fn initialize_template_validator() -> Result<&'static Validator, ValidationError> {
    if let Some(validator) = COMPILED_SCHEMA.get() {
        return Ok(validator);
    }

    let schema_json: Value =
        serde_json::from_str(TEMPLATE_SCHEMA).map_err(|e| ValidationError::SchemaCompilation {
            message: format!("Failed to parse embedded schema: {}", e),
        })?;

    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        ValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {}", e),
        }
    })?;

    Ok(COMPILED_SCHEMA.get_or_init(|| compiled))
}

/// Validates a rendered template.
///
/// # Errors
/// Returns `ValidationFailed` listing every schema error, or
/// `SecurityViolation` for the first policy that breaks a security rule.
pub fn validate_template(template: &Value) -> Result<(), ValidationError> {
    let schema = initialize_template_validator()?;

    let errors: Vec<String> = schema
        .iter_errors(template)
        .map(|error| error.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    validate_security_constraints(template)
}

/// Parses and validates a template from its JSON text.
///
/// # Errors
/// Returns `JsonParsing` for malformed JSON, otherwise as [`validate_template`].
pub fn validate_template_str(text: &str) -> Result<Value, ValidationError> {
    let template: Value = serde_json::from_str(text)?;
    validate_template(&template)?;
    Ok(template)
}

fn validate_security_constraints(template: &Value) -> Result<(), ValidationError> {
    let Some(resources) = template.get("Resources").and_then(Value::as_object) else {
        return Ok(());
    };

    for (id, resource) in resources {
        let properties = &resource["Properties"];
        for (path, document) in policy_documents(properties) {
            for statement in statements(document) {
                check_open_principal(id, &path, statement)?;
            }
        }

        if resource["Type"] == "AWS::IAM::Role" {
            check_role_inline_policies(id, properties)?;
        }
    }
    Ok(())
}

/// Every policy document embedded in a resource's properties, with the
/// property path it was found under.
fn policy_documents(properties: &Value) -> Vec<(String, &Value)> {
    let mut documents = Vec::new();
    for key in ["KeyPolicy", "PolicyDocument", "AssumeRolePolicyDocument"] {
        if let Some(document) = properties.get(key) {
            documents.push((key.to_string(), document));
        }
    }
    if let Some(policies) = properties.get("Policies").and_then(Value::as_array) {
        for (index, policy) in policies.iter().enumerate() {
            if let Some(document) = policy.get("PolicyDocument") {
                documents.push((format!("Policies[{}]", index), document));
            }
        }
    }
    documents
}

fn statements(document: &Value) -> Vec<&Value> {
    match document.get("Statement") {
        Some(Value::Array(statements)) => statements.iter().collect(),
        Some(statement @ Value::Object(_)) => vec![statement],
        _ => Vec::new(),
    }
}

fn is_open_principal(principal: &Value) -> bool {
    match principal {
        Value::String(value) => value == "*",
        Value::Object(map) => map.get("AWS").is_some_and(|aws| match aws {
            Value::String(value) => value == "*",
            Value::Array(values) => values.iter().any(|v| v == "*"),
            _ => false,
        }),
        _ => false,
    }
}

fn check_open_principal(id: &str, path: &str, statement: &Value) -> Result<(), ValidationError> {
    if statement["Effect"] != "Allow" {
        return Ok(());
    }
    let open = statement.get("Principal").is_some_and(is_open_principal);
    let conditioned = statement
        .get("Condition")
        .and_then(Value::as_object)
        .is_some_and(|conditions| !conditions.is_empty());

    if open && !conditioned {
        return Err(ValidationError::SecurityViolation {
            reason: format!(
                "{}.{} allows any principal without a condition",
                id, path
            ),
        });
    }
    Ok(())
}

fn actions(statement: &Value) -> Vec<&str> {
    match statement.get("Action") {
        Some(Value::String(action)) => vec![action.as_str()],
        Some(Value::Array(actions)) => actions.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn check_role_inline_policies(id: &str, properties: &Value) -> Result<(), ValidationError> {
    let Some(policies) = properties.get("Policies").and_then(Value::as_array) else {
        return Ok(());
    };

    for policy in policies {
        let name = policy["PolicyName"].as_str().unwrap_or("<unnamed>");
        for statement in statements(&policy["PolicyDocument"]) {
            if statement["Effect"] != "Allow" {
                continue;
            }
            for pattern in actions(statement) {
                if let Some(forbidden) = FORBIDDEN_ROLE_ACTIONS
                    .iter()
                    .find(|action| action_matches(pattern, action))
                {
                    return Err(ValidationError::SecurityViolation {
                        reason: format!(
                            "role {} policy {} grants {} via '{}'",
                            id, name, forbidden, pattern
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}
