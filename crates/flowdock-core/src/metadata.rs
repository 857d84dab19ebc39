//! Display metadata for registered components
//!
//! Components registered by this process carry a structured
//! [`ComponentMetadata`] sidecar. Bodies that arrive any other way (written
//! by an older build, edited on disk) only have their text, so the listing
//! falls back to extracting the `exports.*` assignments with patterns.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::compiler::{DEFAULT_COLOR, DEFAULT_ICON, DEFAULT_VERSION};
use crate::definition::{ComponentMeta, Port};
use crate::API_AUTHOR;

/// Group reported for text-only entries that declare none
const FALLBACK_GROUP: &str = "Common";

lazy_static! {
    static ref ID_RE: Regex = export_pattern("id");
    static ref NAME_RE: Regex = export_pattern("name");
    static ref ICON_RE: Regex = export_pattern("icon");
    static ref GROUP_RE: Regex = export_pattern("group");
    static ref AUTHOR_RE: Regex = export_pattern("author");
    static ref VERSION_RE: Regex = export_pattern("version");
    static ref COLOR_RE: Regex = Regex::new(r#"style="color:([^"]+)""#).expect("valid color pattern");
}

fn export_pattern(field: &str) -> Regex {
    Regex::new(&format!(r#"exports\.{}\s*=\s*['"`]([^'"`]+)['"`]"#, field)).expect("valid export pattern")
}

/// Listing record for one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub group: String,
    pub color: String,
    pub author: String,
    pub version: String,
}

/// Structured record written alongside a compiled body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub group: String,
    pub color: String,
    pub author: String,
    pub version: String,
    pub readme: String,
    pub settings: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub meta: ComponentMeta,
}

impl ComponentMetadata {
    pub fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            icon: self.icon.clone(),
            group: self.group.clone(),
            color: self.color.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
        }
    }
}

/// Value of a single `exports.<field> = '...'` assignment
pub fn extract_field(body: &str, field: &str) -> Option<String> {
    let re: &Regex = match field {
        "id" => &ID_RE,
        "name" => &NAME_RE,
        "icon" => &ICON_RE,
        "group" => &GROUP_RE,
        "author" => &AUTHOR_RE,
        "version" => &VERSION_RE,
        _ => return None,
    };
    capture(re, body)
}

fn capture(re: &Regex, body: &str) -> Option<String> {
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Rebuild a listing record from body text.
///
/// Returns `None` unless both the id and the name can be extracted; the
/// remaining fields fall back to the registration defaults.
pub fn extract_summary(body: &str) -> Option<ComponentSummary> {
    let id = capture(&ID_RE, body)?;
    let name = capture(&NAME_RE, body)?;

    Some(ComponentSummary {
        id,
        name,
        icon: capture(&ICON_RE, body).unwrap_or_else(|| DEFAULT_ICON.to_string()),
        group: capture(&GROUP_RE, body).unwrap_or_else(|| FALLBACK_GROUP.to_string()),
        color: capture(&COLOR_RE, body).unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        author: capture(&AUTHOR_RE, body).unwrap_or_else(|| API_AUTHOR.to_string()),
        version: capture(&VERSION_RE, body).unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    })
}
