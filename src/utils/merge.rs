use serde_json::{Map, Value};

pub fn is_plain_object(value: &Value) -> bool {
    matches!(value, Value::Object(_))
}

fn is_unset(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Copies `defaults` into `target` wherever `target` has no value yet.
///
/// Scalars and arrays are assigned only into unset slots. Object defaults
/// descend into the matching nested object, creating it when unset; a value
/// already present in `target` is never replaced.
pub fn fill_unset(target: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, default) in defaults {
        match default {
            Value::Object(nested_defaults) => {
                if is_unset(target.get(key)) {
                    target.insert(key.clone(), Value::Object(Map::new()));
                }
                if let Some(Value::Object(nested)) = target.get_mut(key) {
                    fill_unset(nested, nested_defaults);
                }
            }
            _ => {
                if is_unset(target.get(key)) {
                    target.insert(key.clone(), default.clone());
                }
            }
        }
    }
}
