//! User-declared dataset columns.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result, ResultExt};

/// The closed set of column kinds a user can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free-form text. Tagged `"string"` on the wire.
    #[default]
    #[serde(rename = "string", alias = "text")]
    Text,
    Number,
    Boolean,
    /// Text in the first pass, replaced by an image URL during enrichment.
    Image,
}

impl FieldKind {
    /// Tag used in the prompt's field-type map.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Image => "image",
        }
    }

    /// JSON Schema primitive that values of this kind must satisfy.
    ///
    /// Image URLs are not format-checked; any string passes.
    pub fn json_type(self) -> &'static str {
        match self {
            Self::Text | Self::Image => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, Self::Image)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FieldKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "image" => Ok(Self::Image),
            other => Err(DatasetError::InvalidRequest(format!(
                "unknown field kind '{other}' (expected string, number, boolean or image)"
            ))),
        }
    }
}

/// One column of the dataset: a name, a kind and an optional free-text hint.
///
/// `meta` only influences generation for [`FieldKind::Image`], where it is
/// appended to the image prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub meta: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            meta: String::new(),
        }
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = meta.into();
        self
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn image(name: impl Into<String>, meta: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Image).with_meta(meta)
    }

    /// The entry every new form starts with.
    pub fn default_id() -> Self {
        Self::number("id").with_meta("unique identifier")
    }
}

/// Parses `name:kind` or `name:kind:meta`. Everything after the second colon is meta.
impl FromStr for FieldSpec {
    type Err = DatasetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        let kind = parts.next().ok_or_else(|| {
            DatasetError::InvalidRequest(format!("field '{s}' must look like name:kind[:meta]"))
        })?;
        if name.is_empty() {
            return Err(DatasetError::InvalidRequest(format!(
                "field '{s}' has an empty name"
            )));
        }
        let meta = parts.next().unwrap_or_default();
        Ok(Self::new(name, kind.parse()?).with_meta(meta))
    }
}

/// Load a field list from a JSON file holding an array of
/// `{"name", "type", "meta"}` objects.
pub fn load_fields(path: impl AsRef<Path>) -> Result<Vec<FieldSpec>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).with_context(format!("parsing fields file {}", path.display()))
}
