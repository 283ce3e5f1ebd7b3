use crate::constants::schema::HTTP_METHODS;
use crate::services::logger::Logger;
use crate::services::schema::{Annotations, ObjectSchema, SchemaNode, SchemaParser};
use crate::services::spec_document::SpecDocument;
use crate::services::tool_definition::{
    OperationMetadata, ParameterDescriptor, ParameterLocation, ToolDefinition, ToolRegistry,
};
use crate::utils::text::{sanitize_tool_name, split_segments};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Builds one or more tools per OpenAPI operation.
///
/// Malformed entries never abort derivation: reference-only path items,
/// operations, parameters and request bodies are skipped, and schemas without
/// a usable type degrade to `string`.
pub struct SchemaDeriver {
    logger: Logger,
    tool_prefix: Option<String>,
}

impl SchemaDeriver {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("deriver"),
            tool_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.tool_prefix = prefix
            .map(|p| sanitize_tool_name(&p))
            .filter(|p| !p.is_empty());
        self
    }

    pub fn derive(&self, spec: &SpecDocument) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for (path, item) in spec.paths() {
            let Some(item) = item.as_object() else {
                self.logger.debug("Skipping non-object path item", Some(&serde_json::json!({"path": path})));
                continue;
            };
            if item.contains_key("$ref") {
                self.logger.debug("Skipping reference path item", Some(&serde_json::json!({"path": path})));
                continue;
            }
            let shared_params = item.get("parameters").and_then(Value::as_array);
            for method in HTTP_METHODS {
                let Some(operation) = item.get(*method).and_then(Value::as_object) else {
                    continue;
                };
                if operation.contains_key("$ref") {
                    self.logger.debug(
                        "Skipping reference operation",
                        Some(&serde_json::json!({"path": path, "method": method})),
                    );
                    continue;
                }
                for tool in self.derive_operation(spec, path, method, shared_params, operation) {
                    if let Some(previous) = registry.register(tool) {
                        self.logger.warn(
                            "Tool name collision, keeping the later operation",
                            Some(&serde_json::json!({
                                "tool": previous.name,
                                "replaced": format!("{} {}", previous.metadata.http_method, previous.metadata.original_path),
                            })),
                        );
                    }
                }
            }
        }
        self.logger.info(
            "Derived tools",
            Some(&serde_json::json!({"count": registry.len()})),
        );
        registry
    }

    fn derive_operation(
        &self,
        spec: &SpecDocument,
        path: &str,
        method: &str,
        shared_params: Option<&Vec<Value>>,
        operation: &Map<String, Value>,
    ) -> Vec<ToolDefinition> {
        let parser = SchemaParser::new(Some(spec));
        let mut input = ObjectSchema::new();

        let parameters = self.collect_parameters(&parser, shared_params, operation.get("parameters"));
        for param in &parameters {
            input.insert_property(param.name.clone(), param.schema.clone());
            if param.required {
                input.mark_required(&param.name);
            }
        }

        let body = self.request_body(&parser, path, method, operation.get("requestBody"));
        if let Some((_, SchemaNode::Object(body_object))) = &body {
            for (name, node) in &body_object.properties {
                input.insert_property(name.clone(), node.clone());
                if body_object.is_required(name) {
                    input.mark_required(name);
                }
            }
        }
        let (request_content_type, request_body_schema) = match body {
            Some((content_type, schema)) => (Some(content_type), Some(schema)),
            None => (None, None),
        };

        let operation_id = operation
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let summary = operation.get("summary").and_then(Value::as_str);
        let description = operation.get("description").and_then(Value::as_str);

        let metadata = Arc::new(OperationMetadata {
            http_method: method.to_uppercase(),
            original_path: path.to_string(),
            operation_id: operation_id.clone(),
            parameters,
            request_body_schema,
            request_content_type,
        });
        let input_schema = SchemaNode::Object(input);

        let base = base_tool_name(operation_id.as_deref(), summary, method, path);
        variant_labels(&base, summary, description)
            .into_iter()
            .map(|(name, description)| ToolDefinition {
                name: self.prefixed(&name),
                description,
                input_schema: input_schema.clone(),
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Path-item parameters first, then operation parameters; an operation
    /// parameter with the same `name` and `in` replaces the shared one.
    fn collect_parameters(
        &self,
        parser: &SchemaParser<'_>,
        shared: Option<&Vec<Value>>,
        own: Option<&Value>,
    ) -> Vec<ParameterDescriptor> {
        let mut out: Vec<ParameterDescriptor> = Vec::new();
        let own = own.and_then(Value::as_array);
        for raw in shared.into_iter().flatten().chain(own.into_iter().flatten()) {
            let Some(param) = self.parameter_descriptor(parser, raw) else {
                continue;
            };
            match out
                .iter_mut()
                .find(|existing| existing.name == param.name && existing.location == param.location)
            {
                Some(existing) => *existing = param,
                None => out.push(param),
            }
        }
        out
    }

    fn parameter_descriptor(
        &self,
        parser: &SchemaParser<'_>,
        raw: &Value,
    ) -> Option<ParameterDescriptor> {
        let map = raw.as_object()?;
        if map.contains_key("$ref") {
            self.logger.debug("Skipping reference parameter", Some(raw));
            return None;
        }
        let Some(name) = map.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
            self.logger.debug("Skipping unnamed parameter", Some(raw));
            return None;
        };
        let type_name = map
            .get("schema")
            .and_then(|schema| parser.dereference(schema))
            .and_then(Value::as_object)
            .and_then(crate::services::schema::infer_type)
            .or_else(|| map.get("type").and_then(Value::as_str));
        let description = map.get("description").and_then(Value::as_str);
        Some(ParameterDescriptor {
            name: name.to_string(),
            location: ParameterLocation::parse(map.get("in").and_then(Value::as_str)),
            required: map.get("required").and_then(Value::as_bool).unwrap_or(false),
            schema: SchemaNode::coarse(type_name, Annotations::described(description)),
        })
    }

    /// Schema of the first declared content type, with its media type.
    fn request_body(
        &self,
        parser: &SchemaParser<'_>,
        path: &str,
        method: &str,
        raw: Option<&Value>,
    ) -> Option<(String, SchemaNode)> {
        let map = raw?.as_object()?;
        if map.contains_key("$ref") {
            self.logger.debug(
                "Skipping reference request body",
                Some(&serde_json::json!({"path": path, "method": method})),
            );
            return None;
        }
        let (content_type, media) = map.get("content")?.as_object()?.iter().next()?;
        let schema = media.get("schema")?;
        Some((content_type.clone(), parser.parse(schema)))
    }

    fn prefixed(&self, name: &str) -> String {
        match &self.tool_prefix {
            Some(prefix) => sanitize_tool_name(&format!("{}_{}", prefix.trim_end_matches('_'), name)),
            None => name.to_string(),
        }
    }
}

pub fn base_tool_name(
    operation_id: Option<&str>,
    summary: Option<&str>,
    method: &str,
    path: &str,
) -> String {
    [operation_id, summary]
        .into_iter()
        .flatten()
        .map(sanitize_tool_name)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| sanitize_tool_name(&format!("{} {}", method, path)))
}

/// Splits pipe-delimited summary/description text into `(name, description)`
/// pairs. The variant count is the larger segment count; the shorter list
/// wraps around.
pub fn variant_labels(
    base: &str,
    summary: Option<&str>,
    description: Option<&str>,
) -> Vec<(String, String)> {
    let summaries = split_segments(summary);
    let descriptions = split_segments(description);
    let count = summaries.len().max(descriptions.len()).max(1);

    (0..count)
        .map(|index| {
            let numbered = || {
                if count > 1 {
                    format!("{}_{}", base, index + 1)
                } else {
                    base.to_string()
                }
            };
            let name = if summaries.len() > 1 {
                let candidate = sanitize_tool_name(&summaries[index % summaries.len()]);
                if candidate.is_empty() {
                    numbered()
                } else {
                    candidate
                }
            } else {
                numbered()
            };
            let text = if !descriptions.is_empty() {
                descriptions[index % descriptions.len()].clone()
            } else if !summaries.is_empty() {
                summaries[index % summaries.len()].clone()
            } else {
                String::new()
            };
            (name, text)
        })
        .collect()
}
