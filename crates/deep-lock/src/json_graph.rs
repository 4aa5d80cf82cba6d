//! Build object graphs from JSON documents.
//!
//! Plain JSON objects and arrays become ordinary objects and arrays.  Two
//! conventions extend plain JSON:
//!
//! - `{"$ref": "<json-pointer>"}` is an edge to the node at that pointer
//!   (`""` is the document root), which is how shared references and
//!   cycles are written down.
//! - `{"$kind": "<kind>", ...}` allocates a built-in instead of a plain
//!   object.  Remaining non-`$` fields become own properties.
//!
//! | `$kind`       | extra fields                 |
//! | ------------- | ---------------------------- |
//! | `function`    | `$name`                      |
//! | `arrow`       | `$name`                      |
//! | `date`        | `$epoch_ms`                  |
//! | `error`       | `$message`                   |
//! | `regexp`      | `$source`, `$flags`          |
//! | `map`, `set`, `weak_map`, `weak_set`, `promise` | |
//! | `array_buffer`, `uint8_array`, `data_view` | `$length` |
//! | `proxy`       |                              |
//!
//! Numbers must be integers representable as `i64`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::object_model::{
    FunctionKind, JsValue, ObjectError, ObjectHandle, PromiseState, TypedArrayKind,
};
use crate::realm::Realm;

const REF_KEY: &str = "$ref";
/// Largest `$length` a document may request.
pub const MAX_IMPORT_LENGTH: usize = 1 << 20;
const KIND_KEY: &str = "$kind";
const RESERVED_KEYS: [&str; 7] = [
    KIND_KEY,
    "$name",
    "$epoch_ms",
    "$message",
    "$source",
    "$flags",
    "$length",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonGraphError {
    #[error("unresolved reference `{target}` at `{pointer}`")]
    UnresolvedRef { pointer: String, target: String },
    #[error("number {value} at `{pointer}` is not an i64 integer")]
    UnsupportedNumber { pointer: String, value: String },
    #[error("unknown $kind `{kind}` at `{pointer}`")]
    UnknownKind { pointer: String, kind: String },
    #[error("field `{field}` at `{pointer}` {detail}")]
    InvalidField {
        pointer: String,
        field: String,
        detail: String,
    },
    #[error("object model: {0}")]
    Object(#[from] ObjectError),
}

/// Result of [`import_json`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedGraph {
    pub root: JsValue,
    /// Every allocated node keyed by its JSON pointer.
    pub nodes: BTreeMap<String, ObjectHandle>,
}

impl ImportedGraph {
    /// Node at `pointer`, if the document placed one there.
    pub fn node(&self, pointer: &str) -> Option<ObjectHandle> {
        self.nodes.get(pointer).copied()
    }
}

fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn child_pointer(parent: &str, token: &str) -> String {
    format!("{parent}/{}", escape_token(token))
}

fn ref_target(fields: &Map<String, Value>) -> Option<&str> {
    match (fields.len(), fields.get(REF_KEY)) {
        (1, Some(Value::String(target))) => Some(target.as_str()),
        _ => None,
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

fn str_field<'a>(
    fields: &'a Map<String, Value>,
    pointer: &str,
    field: &str,
) -> Result<Option<&'a str>, JsonGraphError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(JsonGraphError::InvalidField {
            pointer: pointer.to_string(),
            field: field.to_string(),
            detail: "must be a string".to_string(),
        }),
    }
}

fn int_field(
    fields: &Map<String, Value>,
    pointer: &str,
    field: &str,
) -> Result<Option<i64>, JsonGraphError> {
    match fields.get(field) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| JsonGraphError::InvalidField {
            pointer: pointer.to_string(),
            field: field.to_string(),
            detail: "must be an integer".to_string(),
        }),
    }
}

fn length_field(fields: &Map<String, Value>, pointer: &str) -> Result<usize, JsonGraphError> {
    let length = int_field(fields, pointer, "$length")?.unwrap_or(0);
    let invalid = |detail: String| JsonGraphError::InvalidField {
        pointer: pointer.to_string(),
        field: "$length".to_string(),
        detail,
    };
    let length = usize::try_from(length).map_err(|_| invalid("must not be negative".to_string()))?;
    if length > MAX_IMPORT_LENGTH {
        return Err(invalid(format!("must not exceed {MAX_IMPORT_LENGTH}")));
    }
    Ok(length)
}

struct Importer<'r> {
    realm: &'r mut Realm,
    nodes: BTreeMap<String, ObjectHandle>,
}

impl Importer<'_> {
    /// First pass: allocate one node per object/array so references can
    /// point forwards and backwards.
    fn allocate(&mut self, value: &Value, pointer: &str) -> Result<(), JsonGraphError> {
        match value {
            Value::Array(items) => {
                let handle = self.realm.new_array(vec![JsValue::Undefined; items.len()]);
                self.nodes.insert(pointer.to_string(), handle);
                for (i, item) in items.iter().enumerate() {
                    self.allocate(item, &child_pointer(pointer, &i.to_string()))?;
                }
            }
            Value::Object(fields) if ref_target(fields).is_some() => {}
            Value::Object(fields) => {
                let handle = self.allocate_kind(fields, pointer)?;
                self.nodes.insert(pointer.to_string(), handle);
                for (key, field) in fields.iter().filter(|(k, _)| !is_reserved(k)) {
                    self.allocate(field, &child_pointer(pointer, key))?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn allocate_kind(
        &mut self,
        fields: &Map<String, Value>,
        pointer: &str,
    ) -> Result<ObjectHandle, JsonGraphError> {
        let Some(kind) = str_field(fields, pointer, KIND_KEY)? else {
            return Ok(self.realm.new_object());
        };
        let realm = &mut *self.realm;
        let handle = match kind {
            "function" | "arrow" => {
                let name = str_field(fields, pointer, "$name")?.unwrap_or("");
                let fk = if kind == "arrow" {
                    FunctionKind::Arrow
                } else {
                    FunctionKind::Normal
                };
                let f = realm.new_function(name, fk);
                f.as_handle().ok_or_else(|| {
                    ObjectError::TypeError(format!("{f} is not a function object"))
                })?
            }
            "date" => realm.new_date(int_field(fields, pointer, "$epoch_ms")?.unwrap_or(0)),
            "error" => realm.new_error(str_field(fields, pointer, "$message")?.unwrap_or("")),
            "regexp" => realm.new_regexp(
                str_field(fields, pointer, "$source")?.unwrap_or("(?:)"),
                str_field(fields, pointer, "$flags")?.unwrap_or(""),
            ),
            "map" => realm.new_map(Vec::new())?,
            "set" => realm.new_set(Vec::new())?,
            "weak_map" => realm.new_weak_map(),
            "weak_set" => realm.new_weak_set(),
            "promise" => realm.new_promise(PromiseState::Pending),
            "array_buffer" => realm.new_array_buffer(length_field(fields, pointer)?)?,
            "uint8_array" => {
                realm.new_typed_array(TypedArrayKind::Uint8, length_field(fields, pointer)?)?
            }
            "data_view" => {
                let buffer = realm.new_array_buffer(length_field(fields, pointer)?)?;
                realm.new_data_view(buffer)?
            }
            "proxy" => {
                let target = realm.new_object();
                let handler = realm.new_object();
                realm.new_proxy(target, handler)
            }
            other => {
                return Err(JsonGraphError::UnknownKind {
                    pointer: pointer.to_string(),
                    kind: other.to_string(),
                });
            }
        };
        Ok(handle)
    }

    /// Second pass: write own properties now that every node exists.
    fn populate(&mut self, value: &Value, pointer: &str) -> Result<(), JsonGraphError> {
        let entries: Vec<(String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect(),
            Value::Object(fields) if ref_target(fields).is_none() => fields
                .iter()
                .filter(|(k, _)| !is_reserved(k))
                .map(|(k, v)| (k.clone(), v))
                .collect(),
            _ => return Ok(()),
        };
        let handle = self.node_at(pointer, pointer)?;
        for (key, field) in entries {
            let field_pointer = child_pointer(pointer, &key);
            let field_value = self.resolve(field, &field_pointer)?;
            // Built-in slots such as a function's `name` reject plain writes.
            if !self.realm.set(handle, key.as_str(), field_value)? {
                return Err(JsonGraphError::InvalidField {
                    pointer: pointer.to_string(),
                    field: key,
                    detail: "is a read-only built-in property".to_string(),
                });
            }
            self.populate(field, &field_pointer)?;
        }
        Ok(())
    }

    fn node_at(&self, target: &str, pointer: &str) -> Result<ObjectHandle, JsonGraphError> {
        self.nodes
            .get(target)
            .copied()
            .ok_or_else(|| JsonGraphError::UnresolvedRef {
                pointer: pointer.to_string(),
                target: target.to_string(),
            })
    }

    fn resolve(&self, value: &Value, pointer: &str) -> Result<JsValue, JsonGraphError> {
        Ok(match value {
            Value::Null => JsValue::Null,
            Value::Bool(b) => JsValue::Bool(*b),
            Value::Number(n) => JsValue::Int(n.as_i64().ok_or_else(|| {
                JsonGraphError::UnsupportedNumber {
                    pointer: pointer.to_string(),
                    value: n.to_string(),
                }
            })?),
            Value::String(s) => JsValue::Str(s.clone()),
            Value::Object(fields) => {
                let target = ref_target(fields).unwrap_or(pointer);
                self.realm.heap().value_of(self.node_at(target, pointer)?)
            }
            Value::Array(_) => self.realm.heap().value_of(self.node_at(pointer, pointer)?),
        })
    }
}

/// Allocate the graph described by `document` in `realm`.
///
/// A scalar document yields a primitive root and no nodes.
pub fn import_json(realm: &mut Realm, document: &Value) -> Result<ImportedGraph, JsonGraphError> {
    if let Value::Object(fields) = document
        && let Some(target) = ref_target(fields)
    {
        return Err(JsonGraphError::UnresolvedRef {
            pointer: String::new(),
            target: target.to_string(),
        });
    }
    let mut importer = Importer {
        realm,
        nodes: BTreeMap::new(),
    };
    importer.allocate(document, "")?;
    importer.populate(document, "")?;
    let root = importer.resolve(document, "")?;
    Ok(ImportedGraph {
        root,
        nodes: importer.nodes,
    })
}
