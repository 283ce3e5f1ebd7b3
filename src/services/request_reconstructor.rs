use crate::config::DefaultsMap;
use crate::services::schema::SchemaNode;
use crate::services::tool_definition::ToolDefinition;
use crate::utils::merge::fill_unset;
use serde_json::{Map, Value};

/// Rebuilds the nested JSON body for a tool call.
///
/// Arguments may arrive flattened (`parent_child`) or nested (`parent.child`).
/// When the tool kept its request-body schema the schema decides the shape;
/// otherwise keys are split on their first underscore. Environment defaults
/// then fill whatever is still unset, so explicit arguments always win.
pub fn build(args: &Map<String, Value>, tool: &ToolDefinition, defaults: &DefaultsMap) -> Value {
    let mut body = match &tool.metadata.request_body_schema {
        Some(schema) => build_schema_guided(args, schema),
        None => build_generic(args),
    };
    fill_unset(&mut body, defaults.as_map());
    Value::Object(body)
}

pub fn build_schema_guided(args: &Map<String, Value>, schema: &SchemaNode) -> Map<String, Value> {
    let mut body = Map::new();
    let Some(object) = schema.as_object() else {
        return body;
    };
    for (parent, node) in &object.properties {
        match node {
            SchemaNode::Object(nested) if !nested.properties.is_empty() => {
                let nested_args = args.get(parent).and_then(Value::as_object);
                let mut out = Map::new();
                for child in nested.properties.keys() {
                    let flat_key = format!("{}_{}", parent, child);
                    let value = args
                        .get(&flat_key)
                        .or_else(|| nested_args.and_then(|nested| nested.get(child)));
                    if let Some(value) = value {
                        out.insert(child.clone(), value.clone());
                    }
                }
                if !out.is_empty() {
                    body.insert(parent.clone(), Value::Object(out));
                }
            }
            _ => {
                if let Some(value) = args.get(parent) {
                    body.insert(parent.clone(), value.clone());
                }
            }
        }
    }
    body
}

/// Splits each key on its first `_` and nests it one level deep. A scalar
/// `parent` and a flattened `parent_child` overwrite each other in argument
/// order; no reconciliation is attempted.
pub fn build_generic(args: &Map<String, Value>) -> Map<String, Value> {
    let mut body = Map::new();
    for (key, value) in args {
        match key.split_once('_') {
            Some((parent, child)) => {
                let slot = body
                    .entry(parent.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(nested) = slot {
                    nested.insert(child.to_string(), value.clone());
                }
            }
            None => {
                body.insert(key.clone(), value.clone());
            }
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn generic_splits_on_first_underscore_only() {
        let body = build_generic(&map(json!({"user_first_name": "Ada", "id": 7})));
        assert_eq!(Value::Object(body), json!({"user": {"first_name": "Ada"}, "id": 7}));
    }

    #[test]
    fn generic_collisions_are_last_write_wins() {
        let body = build_generic(&map(json!({"parent": 1, "parent_child": 2})));
        assert_eq!(Value::Object(body), json!({"parent": {"child": 2}}));
        let body = build_generic(&map(json!({"parent_child": 2, "parent": 1})));
        assert_eq!(Value::Object(body), json!({"parent": 1}));
    }
}
