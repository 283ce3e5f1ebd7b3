use crate::constants::schema::MAX_REF_DEPTH;
use crate::services::spec_document::SpecDocument;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Keywords consumed structurally; everything else on a node is kept verbatim.
const STRUCTURAL_KEYS: &[&str] = &["type", "description", "properties", "required", "items", "$ref"];
/// Composition keywords are not supported and are dropped rather than passed through.
const COMPOSITION_KEYS: &[&str] = &["oneOf", "allOf", "anyOf", "not"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub description: Option<String>,
    /// `enum`, `format`, `default`, `example`, ... copied as found.
    pub extra: Map<String, Value>,
}

impl Annotations {
    pub fn described(description: Option<&str>) -> Self {
        Self {
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            extra: Map::new(),
        }
    }

    fn from_raw(raw: &Map<String, Value>) -> Self {
        let extra = raw
            .iter()
            .filter(|(key, _)| {
                !STRUCTURAL_KEYS.contains(&key.as_str()) && !COMPOSITION_KEYS.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            description: raw
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            extra,
        }
    }

    fn write_into(&self, out: &mut Map<String, Value>) {
        if let Some(description) = &self.description {
            out.insert("description".to_string(), Value::String(description.clone()));
        }
        for (key, value) in &self.extra {
            out.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: IndexMap<String, SchemaNode>,
    /// Always a subset of `properties`, without duplicates.
    pub required: Vec<String>,
    pub annotations: Annotations,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a property. Replacing keeps the original position.
    pub fn insert_property(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.properties.insert(name.into(), node);
    }

    /// Marks a declared property as required. Unknown names are ignored.
    pub fn mark_required(&mut self, name: &str) -> bool {
        if !self.properties.contains_key(name) {
            return false;
        }
        if !self.required.iter().any(|existing| existing == name) {
            self.required.push(name.to_string());
        }
        true
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|existing| existing == name)
    }
}

/// A JSON-Schema subset closed over the six JSON value kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    String(Annotations),
    Number(Annotations),
    Integer(Annotations),
    Boolean(Annotations),
    Array {
        items: Option<Box<SchemaNode>>,
        annotations: Annotations,
    },
    Object(ObjectSchema),
}

impl SchemaNode {
    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaNode::String(_) => "string",
            SchemaNode::Number(_) => "number",
            SchemaNode::Integer(_) => "integer",
            SchemaNode::Boolean(_) => "boolean",
            SchemaNode::Array { .. } => "array",
            SchemaNode::Object(_) => "object",
        }
    }

    /// Builds a bare node from a type keyword. Unknown or missing types become `string`;
    /// arrays carry no `items` and objects no properties.
    pub fn coarse(type_name: Option<&str>, annotations: Annotations) -> Self {
        match type_name.unwrap_or("string") {
            "number" => SchemaNode::Number(annotations),
            "integer" => SchemaNode::Integer(annotations),
            "boolean" => SchemaNode::Boolean(annotations),
            "array" => SchemaNode::Array {
                items: None,
                annotations,
            },
            "object" => SchemaNode::Object(ObjectSchema {
                annotations,
                ..ObjectSchema::default()
            }),
            _ => SchemaNode::String(annotations),
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            SchemaNode::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        let annotations = match self {
            SchemaNode::String(a)
            | SchemaNode::Number(a)
            | SchemaNode::Integer(a)
            | SchemaNode::Boolean(a) => a,
            SchemaNode::Array { annotations, .. } => annotations,
            SchemaNode::Object(object) => &object.annotations,
        };
        annotations.description.as_deref()
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".to_string(), Value::String(self.type_name().to_string()));
        match self {
            SchemaNode::String(annotations)
            | SchemaNode::Number(annotations)
            | SchemaNode::Integer(annotations)
            | SchemaNode::Boolean(annotations) => annotations.write_into(&mut out),
            SchemaNode::Array { items, annotations } => {
                annotations.write_into(&mut out);
                if let Some(items) = items {
                    out.insert("items".to_string(), items.to_value());
                }
            }
            SchemaNode::Object(object) => {
                object.annotations.write_into(&mut out);
                if !object.properties.is_empty() {
                    let properties = object
                        .properties
                        .iter()
                        .map(|(name, node)| (name.clone(), node.to_value()))
                        .collect();
                    out.insert("properties".to_string(), Value::Object(properties));
                }
                if !object.required.is_empty() {
                    out.insert(
                        "required".to_string(),
                        Value::Array(object.required.iter().cloned().map(Value::String).collect()),
                    );
                }
            }
        }
        Value::Object(out)
    }
}

impl Serialize for SchemaNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Turns raw JSON-Schema values into [`SchemaNode`]s, following local `$ref`s
/// against the owning document.
pub struct SchemaParser<'a> {
    document: Option<&'a SpecDocument>,
}

impl<'a> SchemaParser<'a> {
    pub fn new(document: Option<&'a SpecDocument>) -> Self {
        Self { document }
    }

    pub fn parse(&self, raw: &Value) -> SchemaNode {
        self.parse_at(raw, 0)
    }

    /// Follows `$ref` chains until a concrete schema object is reached.
    pub fn dereference<'v>(&self, raw: &'v Value) -> Option<&'v Value>
    where
        'a: 'v,
    {
        let mut current = raw;
        for _ in 0..MAX_REF_DEPTH {
            match current.get("$ref").and_then(Value::as_str) {
                Some(reference) => current = self.document?.resolve_ref(reference)?,
                None => return Some(current),
            }
        }
        None
    }

    /// `ref_hops` counts `$ref` resolutions on the current path only. Cycles
    /// can only form through references, so plain nesting is unbounded.
    fn parse_at(&self, raw: &Value, ref_hops: usize) -> SchemaNode {
        if ref_hops >= MAX_REF_DEPTH {
            return SchemaNode::String(Annotations::default());
        }
        let Some(map) = raw.as_object() else {
            return SchemaNode::String(Annotations::default());
        };
        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            let local_description = map.get("description").and_then(Value::as_str);
            let resolved = self.document.and_then(|doc| doc.resolve_ref(reference));
            let mut node = match resolved {
                Some(target) => self.parse_at(target, ref_hops + 1),
                None => SchemaNode::String(Annotations::default()),
            };
            if let Some(description) = local_description {
                set_description(&mut node, description);
            }
            return node;
        }

        let annotations = Annotations::from_raw(map);
        match infer_type(map) {
            Some("object") => {
                let mut object = ObjectSchema {
                    annotations,
                    ..ObjectSchema::default()
                };
                if let Some(properties) = map.get("properties").and_then(Value::as_object) {
                    for (name, child) in properties {
                        object.insert_property(name.clone(), self.parse_at(child, ref_hops));
                    }
                }
                for name in required_names(map) {
                    object.mark_required(&name);
                }
                SchemaNode::Object(object)
            }
            Some("array") => SchemaNode::Array {
                items: map
                    .get("items")
                    .filter(|items| items.is_object())
                    .map(|items| Box::new(self.parse_at(items, ref_hops))),
                annotations,
            },
            other => SchemaNode::coarse(other, annotations),
        }
    }
}

/// Reads `type`, accepting the `["string", "null"]` form. Falls back to shape:
/// `properties` means object, `items` means array.
pub fn infer_type(map: &Map<String, Value>) -> Option<&str> {
    let declared = match map.get("type") {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null"),
        _ => None,
    };
    declared.or_else(|| {
        if map.contains_key("properties") {
            Some("object")
        } else if map.contains_key("items") {
            Some("array")
        } else {
            None
        }
    })
}

pub fn required_names(map: &Map<String, Value>) -> Vec<String> {
    map.get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn set_description(node: &mut SchemaNode, description: &str) {
    let annotations = match node {
        SchemaNode::String(a)
        | SchemaNode::Number(a)
        | SchemaNode::Integer(a)
        | SchemaNode::Boolean(a) => a,
        SchemaNode::Array { annotations, .. } => annotations,
        SchemaNode::Object(object) => &mut object.annotations,
    };
    annotations.description = Some(description.to_string());
}
