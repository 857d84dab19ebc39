//! Flowdock Core
//!
//! Domain types for dynamically registered flow components: the submitted
//! [`ComponentDefinition`], its validation, the template compiler that turns
//! it into a [`CompiledComponent`], the display metadata derived from it, and
//! the shared [`Document`] every flow definition lives in.

pub mod compiler;
pub mod definition;
pub mod document;
pub mod metadata;
pub mod validation;

pub use compiler::{compile, escape_code, CompileProfile, Compilation, CompiledComponent};
pub use definition::{ComponentDefinition, ComponentId, ComponentMeta, Port};
pub use document::{
    is_reserved_key, Document, FlowDefinition, FlowRuntimeSettings, Propagation, COMPONENTS_KEY,
    VARIABLES_KEY,
};
pub use metadata::{ComponentMetadata, ComponentSummary};
pub use validation::{error_codes, validate_definition, ValidationError};

/// Author marker written into every component registered through the API
pub const API_AUTHOR: &str = "API";
