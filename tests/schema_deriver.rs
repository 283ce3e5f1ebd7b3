use openapi_mcp::services::logger::{LogLevel, Logger};
use openapi_mcp::services::schema::SchemaNode;
use openapi_mcp::services::schema_deriver::SchemaDeriver;
use openapi_mcp::services::spec_document::SpecDocument;
use openapi_mcp::services::tool_definition::{ParameterLocation, ToolRegistry};
use serde_json::{json, Value};

fn derive(spec: Value) -> ToolRegistry {
    let document = SpecDocument::from_value(spec).expect("valid spec");
    SchemaDeriver::new(Logger::with_level("test", LogLevel::Error)).derive(&document)
}

fn schema_of(registry: &ToolRegistry, name: &str) -> Value {
    registry
        .get(name)
        .unwrap_or_else(|| panic!("missing tool {}", name))
        .input_schema
        .to_value()
}

#[test]
fn bare_operation_has_clean_schema() {
    let registry = derive(json!({"paths": {"/health": {"get": {"operationId": "health"}}}}));
    assert_eq!(registry.len(), 1);
    let schema = schema_of(&registry, "health");
    assert_eq!(schema, json!({"type": "object"}));
    assert!(schema.get("properties").is_none());
    assert!(schema.get("required").is_none());
}

#[test]
fn pipe_delimited_summary_multiplexes_tools() {
    let registry = derive(json!({"paths": {"/complete": {"post": {
        "operationId": "complete",
        "summary": "A|B|C",
        "description": "dA|dB",
        "parameters": [{"name": "model", "in": "query", "required": true, "schema": {"type": "string"}}]
    }}}}));
    assert_eq!(registry.names(), vec!["A", "B", "C"]);
    let descriptions: Vec<&str> = registry.list().map(|t| t.description.as_str()).collect();
    assert_eq!(descriptions, vec!["dA", "dB", "dA"]);

    let first = registry.get("A").expect("A");
    let third = registry.get("C").expect("C");
    assert_eq!(first.input_schema, third.input_schema);
    assert!(std::sync::Arc::ptr_eq(&first.metadata, &third.metadata));
}

#[test]
fn parameters_are_coarse_and_required_is_propagated() {
    let registry = derive(json!({
        "paths": {"/pets/{petId}": {
            "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "integer"}}],
            "get": {
                "operationId": "getPet",
                "parameters": [
                    {"name": "fields", "in": "query", "description": "Projection", "schema": {"type": "array", "items": {"type": "string"}}},
                    {"name": "verbose", "in": "query", "schema": {"$ref": "#/components/schemas/Flag"}},
                    {"name": "odd", "in": "query", "schema": {"oneOf": [{"type": "string"}]}},
                    {"$ref": "#/components/parameters/Trace"}
                ]
            }
        }},
        "components": {"schemas": {"Flag": {"type": "boolean"}}}
    }));
    let tool = registry.get("getPet").expect("tool");
    assert_eq!(
        tool.input_schema.to_value(),
        json!({
            "type": "object",
            "properties": {
                "petId": {"type": "integer"},
                "fields": {"type": "array", "description": "Projection"},
                "verbose": {"type": "boolean"},
                "odd": {"type": "string"}
            },
            "required": ["petId"]
        })
    );
    let path_params: Vec<&str> = tool
        .metadata
        .parameters_in(ParameterLocation::Path)
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(path_params, vec!["petId"]);
    assert_eq!(tool.metadata.http_method, "GET");
}

#[test]
fn request_body_properties_are_copied_and_schema_retained() {
    let registry = derive(json!({
        "paths": {"/chat": {"post": {
            "operationId": "createChat",
            "requestBody": {"content": {
                "application/json": {"schema": {"$ref": "#/components/schemas/ChatRequest"}},
                "text/plain": {"schema": {"type": "string"}}
            }}
        }}},
        "components": {"schemas": {
            "ChatRequest": {
                "type": "object",
                "required": ["model", "messages"],
                "properties": {
                    "model": {"type": "string", "enum": ["small", "large"]},
                    "messages": {"type": "array", "items": {"$ref": "#/components/schemas/Message"}},
                    "options": {"type": "object", "properties": {"temperature": {"type": "number"}}}
                }
            },
            "Message": {"type": "object", "properties": {"role": {"type": "string"}, "content": {"type": "string"}}}
        }}
    }));
    let tool = registry.get("createChat").expect("tool");
    let schema = tool.input_schema.to_value();
    assert_eq!(schema["required"], json!(["model", "messages"]));
    assert_eq!(schema["properties"]["model"]["enum"], json!(["small", "large"]));
    assert_eq!(
        schema["properties"]["messages"]["items"]["properties"]["role"],
        json!({"type": "string"})
    );
    assert_eq!(
        schema["properties"]["options"],
        json!({"type": "object", "properties": {"temperature": {"type": "number"}}})
    );
    assert_eq!(
        tool.metadata.request_content_type.as_deref(),
        Some("application/json")
    );
    assert!(matches!(
        tool.metadata.request_body_schema,
        Some(SchemaNode::Object(_))
    ));
}

#[test]
fn reference_entries_are_skipped_not_fatal() {
    let registry = derive(json!({"paths": {
        "/shared": {"$ref": "#/components/pathItems/Shared"},
        "/ok": {
            "get": {"operationId": "ok"},
            "put": {"$ref": "#/components/operations/Put"},
            "post": {"operationId": "okPost", "requestBody": {"$ref": "#/components/requestBodies/Body"}}
        },
        "/junk": "not an object"
    }}));
    assert_eq!(registry.names(), vec!["ok", "okPost"]);
    assert!(registry.get("okPost").expect("tool").metadata.request_body_schema.is_none());
}

#[test]
fn names_fall_back_to_method_and_path_and_collisions_keep_last() {
    let registry = derive(json!({"paths": {
        "/items/{id}": {"get": {}, "delete": {"summary": "Remove item"}},
        "/a": {"get": {"operationId": "dup", "description": "first"}},
        "/b": {"get": {"operationId": "dup", "description": "second"}}
    }}));
    assert_eq!(registry.names(), vec!["get_items_id", "Remove_item", "dup"]);
    let dup = registry.get("dup").expect("dup");
    assert_eq!(dup.description, "second");
    assert_eq!(dup.metadata.original_path, "/b");
}

#[test]
fn prefix_is_applied_to_every_variant() {
    let document = SpecDocument::from_value(json!({"paths": {"/x": {"get": {"summary": "One|Two"}}}}))
        .expect("valid");
    let registry = SchemaDeriver::new(Logger::with_level("test", LogLevel::Error))
        .with_prefix(Some("petstore".to_string()))
        .derive(&document);
    assert_eq!(registry.names(), vec!["petstore_One", "petstore_Two"]);
}
