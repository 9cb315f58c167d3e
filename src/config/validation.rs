//! Configuration validation using JSON Schema and field rules

use crate::config::loader::ConfigFormat;
use crate::config::{Config, TransportConfig};
use schemars::schema_for;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use validator::Validate;

/// Validation error
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Configuration validator
pub struct ConfigValidator {
    schema: Value,
}

impl ConfigValidator {
    /// Create a new validator with the generated schema
    pub fn new() -> Self {
        let schema = schema_for!(Config);
        Self {
            schema: serde_json::to_value(&schema).unwrap_or_default(),
        }
    }

    /// Get the JSON Schema for the configuration
    pub fn get_schema(&self) -> &Value {
        &self.schema
    }

    /// Export the schema to a JSON string
    pub fn export_schema(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_default()
    }

    /// Parse raw content and validate it
    pub fn validate_str(&self, content: &str, format: ConfigFormat) -> Result<(), Vec<ValidationError>> {
        let config = format
            .parse(content)
            .map_err(|e| vec![ValidationError::new("root", e.to_string())])?;
        self.validate(&config)
    }

    pub fn validate(&self, config: &Config) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(validation_errors) = config.validate() {
            for (field, field_errors) in validation_errors.field_errors() {
                for error in field_errors {
                    errors.push(ValidationError::new(
                        field.to_string(),
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| error.code.to_string()),
                    ));
                }
            }
            for (section, nested) in validation_errors.errors() {
                if let validator::ValidationErrorsKind::Struct(inner) = nested {
                    for (field, field_errors) in inner.field_errors() {
                        for error in field_errors {
                            errors.push(ValidationError::new(
                                format!("{}.{}", section, field),
                                format!("invalid value ({})", error.code),
                            ));
                        }
                    }
                }
            }
        }

        self.validate_server_configs(config, &mut errors);
        self.validate_router_config(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server_configs(&self, config: &Config, errors: &mut Vec<ValidationError>) {
        let mut names = HashSet::new();

        for (idx, server) in config.servers.iter().enumerate() {
            if !names.insert(&server.name) {
                errors.push(ValidationError::new(
                    format!("servers[{}].name", idx),
                    format!("Duplicate server name: {}", server.name),
                ));
            }

            if server.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("servers[{}].name", idx),
                    "Server name cannot be empty",
                ));
            }

            match &server.transport {
                TransportConfig::Stdio { command, .. } if command.trim().is_empty() => {
                    errors.push(ValidationError::new(
                        format!("servers[{}].transport.command", idx),
                        "Server command cannot be empty",
                    ));
                }
                TransportConfig::Tcp { address } if address.trim().is_empty() => {
                    errors.push(ValidationError::new(
                        format!("servers[{}].transport.address", idx),
                        "Server address cannot be empty",
                    ));
                }
                _ => {}
            }

            if server.timeout_ms == Some(0) {
                errors.push(ValidationError::new(
                    format!("servers[{}].timeout_ms", idx),
                    "Timeout must be greater than 0",
                ));
            }
        }
    }

    fn validate_router_config(&self, config: &Config, errors: &mut Vec<ValidationError>) {
        for (name, value) in [
            ("router.reasoning_confidence", config.router.reasoning_confidence),
            ("router.tool_confidence", config.router.tool_confidence),
            ("router.communication_confidence", config.router.communication_confidence),
            ("router.fallback_confidence", config.router.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ValidationError::new(
                    name,
                    "Confidence must be between 0.0 and 1.0",
                ));
            }
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
