use crate::services::schema::{ObjectSchema, SchemaNode};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("path") => ParameterLocation::Path,
            Some("header") => ParameterLocation::Header,
            Some("cookie") => ParameterLocation::Cookie,
            _ => ParameterLocation::Query,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: SchemaNode,
}

/// What the executor needs to turn a call back into an HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMetadata {
    /// Upper-case HTTP verb.
    pub http_method: String,
    pub original_path: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<ParameterDescriptor>,
    /// The request-body schema as declared, kept for request reconstruction.
    pub request_body_schema: Option<SchemaNode>,
    pub request_content_type: Option<String>,
}

impl OperationMetadata {
    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &ParameterDescriptor> + '_ {
        self.parameters
            .iter()
            .filter(move |param| param.location == location)
    }

    pub fn sends_query_only(&self) -> bool {
        matches!(self.http_method.as_str(), "GET" | "DELETE")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: SchemaNode,
    /// Shared by every variant multiplexed out of the same operation.
    #[serde(skip)]
    pub metadata: Arc<OperationMetadata>,
}

impl ToolDefinition {
    pub fn input_object(&self) -> Option<&ObjectSchema> {
        self.input_schema.as_object()
    }
}

/// Tools keyed by name in registration order. Registering an existing name
/// replaces the earlier definition in place.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: ToolDefinition) -> Option<ToolDefinition> {
        self.tools.insert(tool.name.clone(), tool)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::Annotations;

    fn tool(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: SchemaNode::Object(ObjectSchema::new()),
            metadata: Arc::new(OperationMetadata {
                http_method: "GET".to_string(),
                original_path: "/pets".to_string(),
                operation_id: None,
                parameters: vec![ParameterDescriptor {
                    name: "limit".to_string(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: SchemaNode::Integer(Annotations::default()),
                }],
                request_body_schema: None,
                request_content_type: None,
            }),
        }
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("listPets", "first"));
        registry.register(tool("other", "x"));
        let replaced = registry.register(tool("listPets", "second"));
        assert_eq!(replaced.map(|t| t.description), Some("first".to_string()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("listPets").map(|t| t.description.as_str()), Some("second"));
        assert_eq!(registry.names(), vec!["listPets", "other"]);
    }

    #[test]
    fn serializes_protocol_shape_without_metadata() {
        let value = serde_json::to_value(tool("listPets", "List pets")).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "name": "listPets",
                "description": "List pets",
                "inputSchema": {"type": "object"}
            })
        );
    }

    #[test]
    fn location_defaults_to_query() {
        assert_eq!(ParameterLocation::parse(Some("PATH")), ParameterLocation::Path);
        assert_eq!(ParameterLocation::parse(None), ParameterLocation::Query);
    }
}
