use crate::types::TypeDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A typed runtime value flowing through a pipeline graph.
///
/// The serde form is tagged (`{"t":"int","v":5}`) and is only used for
/// persisted suspension records; wire responses always go through
/// [`Value::to_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(BTreeMap<String, Value>),
    None,
}

impl Value {
    /// Convert a JSON value into a typed value according to `ty`.
    ///
    /// The conversion is table-driven over the descriptor variant; a
    /// mismatch returns a human-readable description of what failed,
    /// which callers wrap into `SkeinError::InputTypeMismatch`.
    pub fn from_json(ty: &TypeDescriptor, json: &JsonValue) -> Result<Value, String> {
        match ty {
            TypeDescriptor::Int => match json {
                JsonValue::Number(n) => n
                    .as_i64()
                    .map(Value::Int)
                    .ok_or_else(|| format!("expected Int, got non-integer number {n}")),
                other => Err(format!("expected Int, got {}", json_kind(other))),
            },
            TypeDescriptor::Float => match json {
                JsonValue::Number(n) => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("expected Float, got unrepresentable number {n}")),
                other => Err(format!("expected Float, got {}", json_kind(other))),
            },
            TypeDescriptor::Bool => match json {
                JsonValue::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(format!("expected Bool, got {}", json_kind(other))),
            },
            TypeDescriptor::Str => match json {
                JsonValue::String(s) => Ok(Value::Str(s.clone())),
                other => Err(format!("expected String, got {}", json_kind(other))),
            },
            TypeDescriptor::Optional(item) => match json {
                JsonValue::Null => Ok(Value::None),
                other => Value::from_json(item, other),
            },
            TypeDescriptor::List(item) => match json {
                JsonValue::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, entry) in items.iter().enumerate() {
                        out.push(
                            Value::from_json(item, entry)
                                .map_err(|e| format!("list index {i}: {e}"))?,
                        );
                    }
                    Ok(Value::List(out))
                }
                other => Err(format!("expected List<{item}>, got {}", json_kind(other))),
            },
            TypeDescriptor::Map(value_ty) => match json {
                JsonValue::Object(entries) => {
                    let mut out = BTreeMap::new();
                    for (k, v) in entries {
                        out.insert(
                            k.clone(),
                            Value::from_json(value_ty, v)
                                .map_err(|e| format!("map key `{k}`: {e}"))?,
                        );
                    }
                    Ok(Value::Map(out))
                }
                other => Err(format!("expected Map<{value_ty}>, got {}", json_kind(other))),
            },
            TypeDescriptor::Record(fields) => match json {
                JsonValue::Object(entries) => {
                    let mut out = BTreeMap::new();
                    for (name, field_ty) in fields {
                        match entries.get(name) {
                            Some(v) => {
                                out.insert(
                                    name.clone(),
                                    Value::from_json(field_ty, v)
                                        .map_err(|e| format!("field `{name}`: {e}"))?,
                                );
                            }
                            None if matches!(field_ty, TypeDescriptor::Optional(_)) => {
                                out.insert(name.clone(), Value::None);
                            }
                            None => return Err(format!("missing record field `{name}`")),
                        }
                    }
                    for key in entries.keys() {
                        if !fields.contains_key(key) {
                            return Err(format!("unexpected record field `{key}`"));
                        }
                    }
                    Ok(Value::Record(out))
                }
                other => Err(format!("expected {ty}, got {}", json_kind(other))),
            },
            TypeDescriptor::Union(variants) => {
                for variant in variants {
                    if let Ok(v) = Value::from_json(variant, json) {
                        return Ok(v);
                    }
                }
                Err(format!("no variant of {ty} matched {}", json_kind(json)))
            }
        }
    }

    /// Render as plain JSON for wire responses.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) | Value::Record(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::None => JsonValue::Null,
        }
    }

    /// Truthiness for boolean graph nodes; only `Bool` values qualify.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
