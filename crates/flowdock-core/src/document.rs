//! The shared flow document
//!
//! One JSON object holds everything the engine persists: the global
//! `variables`, the component registry under `components`, and one entry per
//! flow definition under every other key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Reserved key holding the global variable bag
pub const VARIABLES_KEY: &str = "variables";

/// Reserved key holding the component registry
pub const COMPONENTS_KEY: &str = "components";

/// Whether a top-level key is reserved rather than a flow id
pub fn is_reserved_key(key: &str) -> bool {
    key == VARIABLES_KEY || key == COMPONENTS_KEY
}

/// The persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    /// Registry: component id -> compiled body. Values are not guaranteed to
    /// be strings; anything else is carried along untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Map<String, Value>>,

    /// Flow id -> flow definition, in document order
    #[serde(flatten)]
    pub flows: Map<String, Value>,
}

/// Outcome of copying one component into every flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    /// Flows that received the component
    pub added: Vec<String>,
    /// Flows that already had an entry under the id
    pub skipped: Vec<String>,
    /// Flows whose definition is not an object and could not be touched
    pub invalid: Vec<String>,
}

impl Document {
    /// Parse a persisted document. Empty input is an empty document.
    pub fn from_slice(data: &[u8]) -> serde_json::Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(data)
    }

    /// The registry map, created if absent
    pub fn components_mut(&mut self) -> &mut Map<String, Value> {
        self.components.get_or_insert_with(Map::new)
    }

    /// Registry entry for `id`, whatever its shape
    pub fn component(&self, id: &str) -> Option<&Value> {
        self.components.as_ref().and_then(|c| c.get(id))
    }

    /// Flow ids in document order
    pub fn flow_ids(&self) -> Vec<String> {
        self.flows
            .keys()
            .filter(|key| !is_reserved_key(key))
            .cloned()
            .collect()
    }

    /// Typed view of one flow
    pub fn flow(&self, flow_id: &str) -> Option<serde_json::Result<FlowDefinition>> {
        self.flows
            .get(flow_id)
            .map(|value| serde_json::from_value(value.clone()))
    }

    /// Replace one flow with its typed form
    pub fn set_flow(&mut self, flow_id: &str, flow: &FlowDefinition) -> serde_json::Result<()> {
        let value = serde_json::to_value(flow)?;
        self.flows.insert(flow_id.to_string(), value);
        Ok(())
    }

    /// Copy `body` into every flow's local component map under `id`,
    /// leaving flows that already hold an entry for `id` untouched.
    pub fn propagate_component(&mut self, id: &str, body: &str) -> Propagation {
        let mut result = Propagation::default();

        for (flow_id, flow) in self.flows.iter_mut() {
            if is_reserved_key(flow_id) {
                continue;
            }

            let Some(flow) = flow.as_object_mut() else {
                warn!(%flow_id, "Flow definition is not an object, skipping");
                result.invalid.push(flow_id.clone());
                continue;
            };

            let components = flow
                .entry(COMPONENTS_KEY)
                .or_insert_with(|| Value::Object(Map::new()));
            if components.is_null() {
                *components = Value::Object(Map::new());
            }

            let Some(components) = components.as_object_mut() else {
                warn!(%flow_id, "Flow components entry is not an object, skipping");
                result.invalid.push(flow_id.clone());
                continue;
            };

            if components.contains_key(id) {
                debug!(component_id = %id, %flow_id, "Component already exists in flow, skipping");
                result.skipped.push(flow_id.clone());
                continue;
            }

            components.insert(id.to_string(), Value::String(body.to_string()));
            debug!(component_id = %id, %flow_id, "Added component to flow");
            result.added.push(flow_id.clone());
        }

        result
    }
}

/// Process-wide execution settings every flow is re-initialized with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRuntimeSettings {
    pub directory: String,
    pub sandbox: bool,
    pub env: String,
    /// Memory limit applied to flows that do not set their own
    pub memory: u64,
    pub asfiles: bool,
    pub worker: Option<String>,
}

impl Default for FlowRuntimeSettings {
    fn default() -> Self {
        Self {
            directory: "flowstream/".to_string(),
            sandbox: false,
            env: "dev".to_string(),
            memory: 0,
            asfiles: false,
            worker: None,
        }
    }
}

/// One flow definition.
///
/// Only the fields this crate touches are typed; the rest of the engine's
/// record is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(default, deserialize_with = "lenient")]
    pub components: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables2: Option<Value>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    #[serde(default, deserialize_with = "lenient_memory", skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub asfiles: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read a typed flow field, treating null or a value of the wrong shape as
/// the default. The engine accepts such flows, so they must still load.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(raw).unwrap_or_else(|err| {
        warn!(error = %err, "Ignoring flow field with unexpected type");
        T::default()
    }))
}

/// Memory limit as a number or a numeric string
fn lenient_memory<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text.trim().parse().ok()),
        Value::Number(number) => Ok(number.as_u64()),
        _ => Ok(None),
    }
}

impl FlowDefinition {
    /// Re-derive the transient execution settings before a (re)load.
    ///
    /// A flow keeps its own non-zero memory limit; everything else is
    /// overwritten from `settings`, and `variables2` becomes a copy of the
    /// document's global variables.
    pub fn apply_runtime_settings(&mut self, settings: &FlowRuntimeSettings, variables: Option<&Value>) {
        self.variables2 = Some(variables.cloned().unwrap_or_else(|| Value::Object(Map::new())));
        self.directory = Some(settings.directory.clone());
        self.sandbox = Some(settings.sandbox);
        self.env = Some(settings.env.clone());
        if self.memory.unwrap_or(0) == 0 {
            self.memory = Some(settings.memory);
        }
        self.asfiles = Some(settings.asfiles);
        self.worker = settings.worker.clone().map(Value::String);
    }
}
