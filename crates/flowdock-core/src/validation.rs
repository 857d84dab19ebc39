//! Validation of submitted component definitions
//!
//! Validation is strict about identity and executability (`name`, `code`)
//! and deliberately silent about everything else: malformed ports or meta
//! are handled by the compiler's fallbacks, never rejected here.

use thiserror::Error;

use crate::definition::{ComponentDefinition, ComponentId};

/// Represents a validation error for a submitted component definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Error code (should be a constant identifier)
    pub code: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Offending field, if the error is tied to one
    pub field: Option<&'static str>,
}

impl ValidationError {
    fn missing(field: &'static str, message: &str) -> Self {
        Self {
            code: error_codes::MISSING_REQUIRED_FIELD,
            message: message.to_string(),
            field: Some(field),
        }
    }
}

/// Validation error codes
pub mod error_codes {
    /// Missing required field
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_COMPONENT_MISSING_REQUIRED_FIELD";

    /// Name contains characters outside `[A-Za-z0-9_]`
    pub const INVALID_NAME: &str = "ERR_COMPONENT_INVALID_NAME";
}

/// Check that a definition can be registered and return its canonical id.
///
/// Fails when `name` or `code` is absent or empty, or when `name` contains
/// anything other than ASCII letters, digits and underscores.
pub fn validate_definition(definition: &ComponentDefinition) -> Result<ComponentId, ValidationError> {
    let name = match definition.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ValidationError::missing("name", "Component name is required")),
    };

    if definition.code.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::missing("code", "Component code is required"));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError {
            code: error_codes::INVALID_NAME,
            message: "Component name must contain only letters, numbers, and underscores".to_string(),
            field: Some("name"),
        });
    }

    Ok(ComponentId::from_name(name))
}
