//! Template compiler
//!
//! Renders a [`ComponentDefinition`] into the single-string module format the
//! flow engine loads natively: a server-side `<script total>` module, a
//! `<readme>`, a `<settings>` fragment, a `<style>` block, the client-side
//! lifecycle `<script>` and the `<body>` markup shown in the designer.
//!
//! Compilation is a pure function of its inputs. Only three characters of
//! the user code are escaped (backslash, single quote, line feed). Nothing
//! else is touched, so a code body containing a section close tag such as
//! `</script>` ends its section early and corrupts the generated structure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::definition::{decode_dual_encoded, non_empty, ComponentDefinition, ComponentId, ComponentMeta, Port};
use crate::metadata::{self, ComponentMetadata, ComponentSummary};
use crate::API_AUTHOR;

pub const DEFAULT_ICON: &str = "ti ti-code";
pub const DEFAULT_COLOR: &str = "#ff6600";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_README: &str = "API-registered component";
pub const DEFAULT_SETTINGS: &str = r#"<div class="padding">SETTINGS for this component (optional)</div>"#;

/// Which registration surface a component is compiled for.
///
/// The two surfaces disagree on some defaults; the disagreement is kept
/// as-is rather than unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileProfile {
    /// `POST /api/flow/register`
    #[default]
    Api,
    /// Programmatic registration through the library surface
    Library,
}

impl CompileProfile {
    /// Group used when the definition leaves it empty
    pub fn default_group(self) -> &'static str {
        match self {
            CompileProfile::Api => "Common",
            CompileProfile::Library => "Custom",
        }
    }

    /// Outputs written into the compiled body when none were given
    fn default_compiled_outputs(self) -> Vec<Port> {
        match self {
            CompileProfile::Api => Port::single_output(),
            CompileProfile::Library => Port::output_and_error(),
        }
    }

    /// Outputs recorded in the structured metadata when none were given
    fn default_metadata_outputs(self) -> Vec<Port> {
        Port::output_and_error()
    }
}

/// A compiled component body, stored verbatim in the document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompiledComponent(String);

impl CompiledComponent {
    /// Wrap a body read back from the document
    pub fn from_stored(body: impl Into<String>) -> Self {
        Self(body.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// SHA-256 of the body, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Raw contents of the first section opened by `<tag>`.
    ///
    /// The section ends at the first close tag of the element name, so
    /// `section("script total")` stops at the first `</script>`.
    pub fn section(&self, tag: &str) -> Option<&str> {
        let open = format!("<{}>", tag);
        let element = tag.split_whitespace().next()?;
        let close = format!("</{}>", element);

        let start = self.0.find(&open)? + open.len();
        let len = self.0[start..].find(&close)?;
        Some(&self.0[start..start + len])
    }

    /// The trimmed settings fragment, or an empty string
    pub fn settings(&self) -> &str {
        self.section("settings").map(str::trim).unwrap_or_default()
    }

    /// Display record recovered from the body text
    pub fn summary(&self) -> Option<ComponentSummary> {
        metadata::extract_summary(&self.0)
    }

    /// Whether the body declares the API author marker
    pub fn is_api_origin(&self) -> bool {
        metadata::extract_field(&self.0, "author").as_deref() == Some(API_AUTHOR)
    }
}

impl fmt::Display for CompiledComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of a compilation: the body plus its structured sidecar record
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub compiled: CompiledComponent,
    pub metadata: ComponentMetadata,
}

/// Escape user code for embedding: backslash, then single quote, then line feed.
pub fn escape_code(code: &str) -> String {
    code.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
}

/// Port list in the single-quoted literal form the engine expects
fn render_ports(ports: &[Port]) -> String {
    let list = Value::Array(ports.iter().map(Port::to_value).collect());
    list.to_string().replace('"', "'")
}

/// Compile a validated definition under `id`.
pub fn compile(definition: &ComponentDefinition, id: &ComponentId, profile: CompileProfile) -> Compilation {
    let component = id.as_str();

    let name = definition.display_name_or_name();
    let icon = non_empty(definition.icon.as_deref()).unwrap_or(DEFAULT_ICON);
    let group = non_empty(definition.group.as_deref()).unwrap_or(profile.default_group());
    let color = non_empty(definition.color.as_deref()).unwrap_or(DEFAULT_COLOR);
    let version = non_empty(definition.version.as_deref()).unwrap_or(DEFAULT_VERSION);
    let author = non_empty(definition.author.as_deref()).unwrap_or(API_AUTHOR);
    let readme = non_empty(definition.readme.as_deref()).unwrap_or(DEFAULT_README);
    let settings = non_empty(definition.settings.as_deref()).unwrap_or(DEFAULT_SETTINGS);

    let inputs: Option<Vec<Port>> = decode_dual_encoded(definition.inputs.as_ref(), "inputs", component);
    let outputs: Option<Vec<Port>> = decode_dual_encoded(definition.outputs.as_ref(), "outputs", component);
    let meta: ComponentMeta = decode_dual_encoded(definition.meta.as_ref(), "meta", component).unwrap_or_default();

    let inputs = inputs.unwrap_or_else(Port::default_inputs);
    let compiled_outputs = outputs.clone().unwrap_or_else(|| profile.default_compiled_outputs());
    let metadata_outputs = outputs.unwrap_or_else(|| profile.default_metadata_outputs());

    let code = escape_code(definition.code.as_deref().unwrap_or_default());

    let mut body = String::with_capacity(4096 + code.len());
    body.push_str(&render_module(ModuleFields {
        id: component,
        name,
        icon,
        author,
        version,
        group,
        inputs: &render_ports(&inputs),
        outputs: &render_ports(&compiled_outputs),
        code: &code,
    }));
    body.push_str("\n\n");
    body.push_str(&render_readme(name, group, icon, color));
    body.push_str("\n\n<settings>\n");
    body.push_str(settings);
    body.push_str("\n</settings>\n\n");
    body.push_str(STYLE_BLOCK);
    body.push_str("\n\n");
    body.push_str(CLIENT_SCRIPT);
    body.push_str("\n\n");
    body.push_str(&render_body(color));

    Compilation {
        compiled: CompiledComponent(body),
        metadata: ComponentMetadata {
            id: component.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            group: group.to_string(),
            color: color.to_string(),
            author: author.to_string(),
            version: version.to_string(),
            readme: readme.to_string(),
            settings: settings.to_string(),
            inputs,
            outputs: metadata_outputs,
            meta,
        },
    }
}

struct ModuleFields<'a> {
    id: &'a str,
    name: &'a str,
    icon: &'a str,
    author: &'a str,
    version: &'a str,
    group: &'a str,
    inputs: &'a str,
    outputs: &'a str,
    code: &'a str,
}

fn render_module(f: ModuleFields<'_>) -> String {
    format!(
        r#"<script total>

    exports.id = '{id}';
    exports.name = '{name}';
    exports.icon = '{icon}';
    exports.author = '{author}';
    exports.version = '{version}';
    exports.group = '{group}';
    exports.config = {{}};
    exports.inputs = {inputs};
    exports.outputs = {outputs};

    exports.make = function(instance, config) {{

        instance.message = function($) {{
            var data = $.data;

            // Execute user-provided code
            try {{
                {code}
            }} catch (e) {{
                console.error('Error in component {id}:', e);
                $.send('output', {{ error: e.message, originalData: data }});
            }}
        }};

        instance.configure = function() {{
            // Configuration changed
        }};

        instance.close = function() {{
            // Instance closed
        }};

        instance.vary = function(type) {{
            // Variables changed
        }};

        instance.configure();
    }};

</script>"#,
        id = f.id,
        name = f.name,
        icon = f.icon,
        author = f.author,
        version = f.version,
        group = f.group,
        inputs = f.inputs,
        outputs = f.outputs,
        code = f.code,
    )
}

fn render_readme(name: &str, group: &str, icon: &str, color: &str) -> String {
    format!(
        r#"<readme>
# {name}

Dynamically registered component via API.

**Group:** {group}
**Icon:** {icon}
**Color:** {color}

## Usage

This component was created via the REST API and processes input data using custom logic.

</readme>"#
    )
}

fn render_body(color: &str) -> String {
    format!(
        r#"<body>
    <header>
        <i class="$ICON" style="color:{color}"></i>$NAME
    </header>
    <footer>API-registered component</footer>
</body>"#
    )
}

const STYLE_BLOCK: &str = r#"<style>
    .CLASS footer { padding: 10px; font-size: 12px; }
</style>"#;

const CLIENT_SCRIPT: &str = r#"<script>

    // Client-side script for component lifecycle
    TOUCH(function(exports, reinit) {

        var name = exports.name + ' --> ' + exports.id;

        console.log(name, 'initialized' + (reinit ? ' : UPDATE' : ''));

        exports.settings = function(meta) {
            // Triggered when the user opens settings
            console.log(name, 'settings', meta);
        };

        exports.configure = function(config, isinit) {
            // Triggered when the config is changed
            console.log(name, 'configure', config);
        };

        exports.status = function(status, isinit) {
            // Triggered when the status is changed
            console.log(name, 'status', status);
        };

        exports.note = function(note, isinit) {
            // Triggered when the note is changed
            console.log(name, 'note', note);
        };

        exports.variables = function(variables) {
            // Triggered when the variables are changed
            console.log(name, 'variables', variables);
        };

        exports.variables2 = function(variables) {
            // Triggered when the variables2 are changed
            console.log(name, 'variables2', variables);
        };

        exports.redraw = function() {
            // Flow design has been redrawn
            console.log(name, 'redraw');
        };

        exports.move = function() {
            // Instance has changed position
            console.log(name, 'move');
        };

        exports.close = function() {
            // Triggered when the instance is closing due to some reasons
            console.log(name, 'close');
        };

    });

</script>"#;
