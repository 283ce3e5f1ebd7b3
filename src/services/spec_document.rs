use crate::errors::ToolError;
use serde_json::{Map, Value};
use std::path::Path;

/// A parsed OpenAPI document that is known to carry a `paths` object.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    raw: Value,
}

impl SpecDocument {
    pub fn from_value(raw: Value) -> Result<Self, ToolError> {
        if raw.is_null() {
            return Err(ToolError::invalid_spec("Specification document is empty"));
        }
        match raw.get("paths") {
            Some(Value::Object(_)) => Ok(Self { raw }),
            Some(_) => Err(ToolError::invalid_spec(
                "Specification `paths` must be an object",
            )),
            None => Err(ToolError::invalid_spec(
                "Specification is missing the `paths` section",
            )
            .with_hint("Point the server at an OpenAPI 3 document (JSON or YAML).")),
        }
    }

    pub fn paths(&self) -> &Map<String, Value> {
        static EMPTY: once_cell::sync::Lazy<Map<String, Value>> =
            once_cell::sync::Lazy::new(Map::new);
        self.raw
            .get("paths")
            .and_then(Value::as_object)
            .unwrap_or(&EMPTY)
    }

    pub fn components(&self) -> Option<&Map<String, Value>> {
        self.raw.get("components").and_then(Value::as_object)
    }

    /// First declared `servers[].url`, used when no base URL is configured.
    pub fn servers_url(&self) -> Option<&str> {
        self.raw
            .get("servers")
            .and_then(Value::as_array)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.raw
            .get("info")
            .and_then(|info| info.get("title"))
            .and_then(Value::as_str)
    }

    /// Follows a local `#/...` reference. Remote references are not supported.
    pub fn resolve_ref(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        self.raw.pointer(pointer)
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }
}

/// Parses a document body whose format is unknown: JSON first, then YAML.
pub fn parse_json_or_yaml(text: &str) -> Result<Value, ToolError> {
    let json_err = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    serde_yaml::from_str::<Value>(text).map_err(|yaml_err| {
        ToolError::parse_failure("Specification is neither valid JSON nor valid YAML").with_details(
            serde_json::json!({
                "json_error": json_err.to_string(),
                "yaml_error": yaml_err.to_string(),
            }),
        )
    })
}

/// Parses a local file body, choosing the format from its extension.
pub fn parse_for_path(path: &Path, text: &str) -> Result<Value, ToolError> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        serde_yaml::from_str::<Value>(text).map_err(|err| {
            ToolError::parse_failure(format!("Invalid YAML in {}: {}", path.display(), err))
        })
    } else {
        serde_json::from_str::<Value>(text).map_err(|err| {
            ToolError::parse_failure(format!("Invalid JSON in {}: {}", path.display(), err))
        })
    }
}
