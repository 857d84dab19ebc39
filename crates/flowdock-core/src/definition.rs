//! Component definitions as submitted by API callers
//!
//! A definition is transient: it is validated, compiled and then dropped.
//! Only the compiled body (plus its sidecar metadata) outlives the request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// A component definition submitted for registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    /// Required. Becomes the canonical id after sanitization.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Required. Raw body of the per-message handler.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub readme: Option<String>,
    /// Markup fragment rendered in the designer's settings panel
    #[serde(default)]
    pub settings: Option<String>,
    /// Either a port list or a JSON string encoding one
    #[serde(default)]
    pub inputs: Option<Value>,
    /// Either a port list or a JSON string encoding one
    #[serde(default)]
    pub outputs: Option<Value>,
    /// Either a meta object or a JSON string encoding one
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl ComponentDefinition {
    /// Create a definition with only the two required fields set
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            code: Some(code.into()),
            ..Default::default()
        }
    }

    /// The submitted name, or an empty string when absent
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Display name, falling back to the raw name
    pub fn display_name_or_name(&self) -> &str {
        non_empty(self.display_name.as_deref()).unwrap_or_else(|| self.name_str())
    }
}

/// Returns the value when it is present and not empty
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Canonical component id: the lowercased name restricted to `[a-z0-9_]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    /// Sanitize a raw component name into an id.
    ///
    /// Characters outside `[a-z0-9_]` (after lowercasing) become `_`. For a
    /// name that already passed validation this is a plain lowercase.
    pub fn from_name(name: &str) -> Self {
        let id = name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(id)
    }

    /// Get the string representation of the id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An input or output port of a component.
///
/// Only `id` and `name` are known here; any other attribute a caller sends
/// (colour, type hints) is carried through to the compiled body untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Port {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    /// The port as a JSON object: `id`, `name`, then the extra attributes
    pub fn to_value(&self) -> Value {
        let mut entry = Map::new();
        if !self.id.is_empty() {
            entry.insert("id".to_string(), Value::String(self.id.clone()));
        }
        if !self.name.is_empty() {
            entry.insert("name".to_string(), Value::String(self.name.clone()));
        }
        for (key, value) in &self.extra {
            entry.insert(key.clone(), value.clone());
        }
        Value::Object(entry)
    }

    pub fn default_inputs() -> Vec<Port> {
        vec![Port::new("input", "Input")]
    }

    pub fn single_output() -> Vec<Port> {
        vec![Port::new("output", "Output")]
    }

    pub fn output_and_error() -> Vec<Port> {
        vec![Port::new("output", "Output"), Port::new("error", "Error")]
    }
}

/// Designer flags of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentMeta {
    pub readonly: bool,
    pub singleton: bool,
    pub hidden: bool,
    pub remove: bool,
}

impl Default for ComponentMeta {
    fn default() -> Self {
        Self {
            readonly: false,
            singleton: false,
            hidden: false,
            remove: true,
        }
    }
}

/// Decode a field that may arrive either structured or as a JSON string.
///
/// Returns `None` when the field is absent, empty, or cannot be decoded into
/// `T`; in the latter case a fallback warning is logged so the caller can
/// substitute its default.
pub fn decode_dual_encoded<T: DeserializeOwned>(
    raw: Option<&Value>,
    field: &str,
    component: &str,
) -> Option<T> {
    let decoded = match raw {
        None | Some(Value::Null) => return None,
        Some(Value::String(text)) if text.is_empty() => return None,
        Some(Value::String(text)) => serde_json::from_str::<T>(text),
        Some(other) => serde_json::from_value::<T>(other.clone()),
    };

    match decoded {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%component, %field, error = %err, "Failed to parse field, using default");
            None
        }
    }
}
