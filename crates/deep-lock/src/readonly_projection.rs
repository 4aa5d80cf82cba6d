//! Deep read-only projection.
//!
//! Two halves:
//!
//! - [`TypeShape`] and [`deep_readonly`]: a small structural type algebra
//!   that computes what a statically typed caller sees after a freeze.
//!   Builtins pass through, keyed collections become their read-only
//!   counterparts, arrays and object properties become read-only, unions
//!   distribute.
//! - [`DeepReadonly`]: the runtime handle returned by freezing entry
//!   points.  Reads go through to the heap; every write is rejected before
//!   it reaches the heap.
//!
//! [`LockMode`] ties the two to the action: only `freeze` yields the
//! read-only wrapper, `seal` and `preventExtensions` hand back the value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::graph_locker::{ROOT_PATH, join_path};
use crate::lock_action::LockAction;
use crate::object_model::{
    JsValue, ObjectError, ObjectHandle, ObjectHeap, ObjectKind, PropertyKey, array_index,
};
use crate::realm::Realm;

/// Path segment standing for "any array element".
pub const ELEMENT_SEGMENT: &str = "[*]";

// ---------------------------------------------------------------------------
// TypeShape
// ---------------------------------------------------------------------------

/// Structural type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeShape {
    String,
    Number,
    Boolean,
    BigInt,
    Symbol,
    Undefined,
    Null,
    Function,
    Date,
    Error,
    RegExp,
    Map {
        key: Box<TypeShape>,
        value: Box<TypeShape>,
    },
    ReadonlyMap {
        key: Box<TypeShape>,
        value: Box<TypeShape>,
    },
    WeakMap {
        key: Box<TypeShape>,
        value: Box<TypeShape>,
    },
    Set {
        member: Box<TypeShape>,
    },
    ReadonlySet {
        member: Box<TypeShape>,
    },
    WeakSet {
        member: Box<TypeShape>,
    },
    Promise {
        resolved: Box<TypeShape>,
    },
    Array {
        element: Box<TypeShape>,
        readonly: bool,
    },
    Object {
        properties: BTreeMap<String, PropertyShape>,
    },
    Union {
        members: Vec<TypeShape>,
    },
    Unknown,
    Any,
    Never,
    /// `Readonly<T>`: shallow read-only wrapper.
    Readonly {
        inner: Box<TypeShape>,
    },
}

/// One property of an object shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyShape {
    pub shape: TypeShape,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub optional: bool,
}

impl PropertyShape {
    pub fn mutable(shape: TypeShape) -> Self {
        Self {
            shape,
            readonly: false,
            optional: false,
        }
    }
}

impl TypeShape {
    pub fn array(element: TypeShape) -> Self {
        Self::Array {
            element: Box::new(element),
            readonly: false,
        }
    }

    pub fn map(key: TypeShape, value: TypeShape) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn set(member: TypeShape) -> Self {
        Self::Set {
            member: Box::new(member),
        }
    }

    /// Object shape with mutable, required properties.
    pub fn object<K: Into<String>>(properties: impl IntoIterator<Item = (K, TypeShape)>) -> Self {
        Self::Object {
            properties: properties
                .into_iter()
                .map(|(k, shape)| (k.into(), PropertyShape::mutable(shape)))
                .collect(),
        }
    }

    /// Primitive or one of the builtins that pass through unchanged.
    pub fn is_builtin(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Number
                | Self::Boolean
                | Self::BigInt
                | Self::Symbol
                | Self::Undefined
                | Self::Null
                | Self::Function
                | Self::Date
                | Self::Error
                | Self::RegExp
        )
    }

    /// Does a runtime value of this shape occupy a heap node?
    pub fn is_node(&self) -> bool {
        match self {
            Self::String
            | Self::Number
            | Self::Boolean
            | Self::BigInt
            | Self::Symbol
            | Self::Undefined
            | Self::Null
            | Self::Unknown
            | Self::Any
            | Self::Never => false,
            Self::Union { members } => members.iter().any(Self::is_node),
            Self::Readonly { inner } => inner.is_node(),
            _ => true,
        }
    }

    /// Shape of a plain JSON document: objects and arrays become mutable
    /// object and array shapes.  `$ref`/`$kind` import markers are not
    /// interpreted; use [`TypeShape::of_value`] on the imported graph.  Array elements of differing shapes form a union;
    /// an empty array has `never` elements.
    pub fn of_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(items) => {
                let mut members: Vec<TypeShape> = Vec::new();
                for item in items {
                    let shape = Self::of_json(item);
                    if !members.contains(&shape) {
                        members.push(shape);
                    }
                }
                let element = match members.len() {
                    0 => Self::Never,
                    1 => members.remove(0),
                    _ => Self::Union { members },
                };
                Self::array(element)
            }
            Value::Object(fields) => Self::object(fields.iter().map(|(k, v)| (k.clone(), Self::of_json(v)))),
        }
    }
}

impl TypeShape {
    /// Shape of a live value as the locker would see it.
    ///
    /// Own properties are read in `[[OwnPropertyKeys]]` order and each node
    /// is expanded only where a pre-order walk first reaches it; later
    /// edges to the same node are `unknown`, so the node paths of the shape
    /// are the paths the locker records.  Builtins pass through; binary
    /// views, proxies and collection contents are `unknown`.
    pub fn of_value(realm: &Realm, value: &JsValue) -> Result<Self, ObjectError> {
        let mut seen = BTreeSet::new();
        shape_of(realm.heap(), value, &mut seen)
    }
}

fn shape_of(
    heap: &ObjectHeap,
    value: &JsValue,
    seen: &mut BTreeSet<ObjectHandle>,
) -> Result<TypeShape, ObjectError> {
    let handle = match value {
        JsValue::Undefined => return Ok(TypeShape::Undefined),
        JsValue::Null => return Ok(TypeShape::Null),
        JsValue::Bool(_) => return Ok(TypeShape::Boolean),
        JsValue::Int(_) => return Ok(TypeShape::Number),
        JsValue::BigInt(_) => return Ok(TypeShape::BigInt),
        JsValue::Str(_) => return Ok(TypeShape::String),
        JsValue::Symbol(_) => return Ok(TypeShape::Symbol),
        JsValue::Object(h) | JsValue::Function(h) => *h,
    };
    let Some(kind) = heap.kind(handle)? else {
        return Ok(TypeShape::Unknown);
    };
    if kind.is_binary_view() || !seen.insert(handle) {
        return Ok(TypeShape::Unknown);
    }
    let unknown = || Box::new(TypeShape::Unknown);
    Ok(match kind {
        ObjectKind::Function(_) => TypeShape::Function,
        ObjectKind::Date => TypeShape::Date,
        ObjectKind::Error => TypeShape::Error,
        ObjectKind::RegExp => TypeShape::RegExp,
        ObjectKind::Map => TypeShape::Map {
            key: unknown(),
            value: unknown(),
        },
        ObjectKind::WeakMap => TypeShape::WeakMap {
            key: unknown(),
            value: unknown(),
        },
        ObjectKind::Set => TypeShape::Set { member: unknown() },
        ObjectKind::WeakSet => TypeShape::WeakSet { member: unknown() },
        ObjectKind::Promise => TypeShape::Promise { resolved: unknown() },
        ObjectKind::Array => {
            let mut members: Vec<TypeShape> = Vec::new();
            for key in heap.own_property_keys(handle)? {
                let PropertyKey::String(name) = &key else {
                    continue;
                };
                if array_index(name).is_none() {
                    continue;
                }
                let element = own_shape(heap, handle, &key, seen)?;
                if !members.contains(&element) {
                    members.push(element);
                }
            }
            TypeShape::array(match members.len() {
                0 => TypeShape::Never,
                1 => members.remove(0),
                _ => TypeShape::Union { members },
            })
        }
        ObjectKind::Ordinary
        | ObjectKind::ArrayBuffer
        | ObjectKind::TypedArray(_)
        | ObjectKind::DataView => {
            let mut properties = Vec::new();
            for key in heap.own_property_keys(handle)? {
                if let PropertyKey::String(name) = &key {
                    properties.push((name.clone(), own_shape(heap, handle, &key, seen)?));
                }
            }
            TypeShape::object(properties)
        }
    })
}

/// Accessors without an interpreter have no readable value.
fn own_shape(
    heap: &ObjectHeap,
    handle: ObjectHandle,
    key: &PropertyKey,
    seen: &mut BTreeSet<ObjectHandle>,
) -> Result<TypeShape, ObjectError> {
    match heap.get_own_value(handle, key)? {
        Some(value) => shape_of(heap, &value, seen),
        None => Ok(TypeShape::Unknown),
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn boxed(shape: &TypeShape) -> Box<TypeShape> {
    Box::new(deep_readonly(shape))
}

/// Project `shape` to its deeply read-only form.  Idempotent.
pub fn deep_readonly(shape: &TypeShape) -> TypeShape {
    match shape {
        s if s.is_builtin() => s.clone(),
        TypeShape::Map { key, value } | TypeShape::ReadonlyMap { key, value } => {
            TypeShape::ReadonlyMap {
                key: boxed(key),
                value: boxed(value),
            }
        }
        TypeShape::WeakMap { key, value } => TypeShape::WeakMap {
            key: boxed(key),
            value: boxed(value),
        },
        TypeShape::Set { member } | TypeShape::ReadonlySet { member } => TypeShape::ReadonlySet {
            member: boxed(member),
        },
        TypeShape::WeakSet { member } => TypeShape::WeakSet {
            member: boxed(member),
        },
        TypeShape::Promise { resolved } => TypeShape::Promise {
            resolved: boxed(resolved),
        },
        TypeShape::Array { element, .. } => TypeShape::Array {
            element: boxed(element),
            readonly: true,
        },
        TypeShape::Object { properties } => TypeShape::Object {
            properties: properties
                .iter()
                .map(|(name, prop)| {
                    (
                        name.clone(),
                        PropertyShape {
                            shape: deep_readonly(&prop.shape),
                            readonly: true,
                            optional: prop.optional,
                        },
                    )
                })
                .collect(),
        },
        TypeShape::Union { members } => TypeShape::Union {
            members: members.iter().map(deep_readonly).collect(),
        },
        TypeShape::Unknown => TypeShape::Unknown,
        TypeShape::Never => TypeShape::Never,
        TypeShape::Any => TypeShape::Readonly {
            inner: Box::new(TypeShape::Any),
        },
        TypeShape::Readonly { inner } => match inner.as_ref() {
            TypeShape::Any => shape.clone(),
            other => deep_readonly(other),
        },
        // Builtins are handled by the guard arm.
        _ => shape.clone(),
    }
}

/// Already a fixed point of [`deep_readonly`]?
pub fn is_deep_readonly(shape: &TypeShape) -> bool {
    deep_readonly(shape) == *shape
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn element_path(parent: &str) -> String {
    format!("{parent}{ELEMENT_SEGMENT}")
}

/// Visit every property slot reachable through object and array shapes,
/// passing `(path, readonly)`.  Collections and promises hold their
/// contents in internal slots and are not descended into.
fn walk_slots(shape: &TypeShape, path: &str, visit: &mut dyn FnMut(String, bool)) {
    match shape {
        TypeShape::Object { properties } => {
            for (name, prop) in properties {
                let child = join_path(path, name);
                visit(child.clone(), prop.readonly);
                walk_slots(&prop.shape, &child, visit);
            }
        }
        TypeShape::Array { element, readonly } => {
            let child = element_path(path);
            visit(child.clone(), *readonly);
            walk_slots(element, &child, visit);
        }
        TypeShape::Union { members } => {
            for member in members {
                walk_slots(member, path, visit);
            }
        }
        _ => {}
    }
}

/// Paths of property slots that reject writes.
pub fn readonly_paths(shape: &TypeShape) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    walk_slots(shape, ROOT_PATH, &mut |path, readonly| {
        if readonly {
            paths.insert(path);
        }
    });
    paths
}

/// Paths of property slots that still accept writes.
pub fn mutable_paths(shape: &TypeShape) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    walk_slots(shape, ROOT_PATH, &mut |path, readonly| {
        if !readonly {
            paths.insert(path);
        }
    });
    paths
}

fn walk_nodes(shape: &TypeShape, path: &str, out: &mut BTreeSet<String>) {
    if shape.is_node() {
        out.insert(path.to_string());
    }
    match shape {
        TypeShape::Object { properties } => {
            for (name, prop) in properties {
                walk_nodes(&prop.shape, &join_path(path, name), out);
            }
        }
        TypeShape::Array { element, .. } => walk_nodes(element, &element_path(path), out),
        TypeShape::Union { members } => {
            for member in members {
                walk_nodes(member, path, out);
            }
        }
        _ => {}
    }
}

/// Paths at which a value of `shape` places heap nodes, `$` included.
/// Comparable with the locker's visiting paths after [`generalize_path`].
pub fn node_paths(shape: &TypeShape) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    walk_nodes(shape, ROOT_PATH, &mut paths);
    paths
}

/// Replace concrete array indices with `[*]`: `$.a[3].b` -> `$.a[*].b`.
pub fn generalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find(']') {
            Some(close) if close > 0 && tail[..close].bytes().all(|b| b.is_ascii_digit()) => {
                out.push_str(ELEMENT_SEGMENT);
                rest = &tail[close + 1..];
            }
            _ => {
                out.push('[');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// DeepReadonly runtime wrapper
// ---------------------------------------------------------------------------

/// Read-only view of a frozen value.
///
/// Only reads are offered against the heap; the write methods exist so
/// callers get the same TypeError a strict-mode write to a frozen object
/// raises, without the heap being consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepReadonly {
    value: JsValue,
}

impl DeepReadonly {
    pub(crate) fn new(value: JsValue) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &JsValue {
        &self.value
    }

    pub fn into_inner(self) -> JsValue {
        self.value
    }

    /// `value[key]`, wrapped.  Reading from `null`/`undefined` fails.
    pub fn get(
        &self,
        realm: &Realm,
        key: impl Into<PropertyKey>,
    ) -> Result<DeepReadonly, ObjectError> {
        let key = key.into();
        match &self.value {
            JsValue::Undefined | JsValue::Null => Err(ObjectError::TypeError(format!(
                "Cannot read properties of {} (reading '{key}')",
                self.value
            ))),
            value => match value.as_handle() {
                Some(handle) => Ok(Self::new(realm.heap().get_property(handle, &key)?)),
                None => Ok(Self::new(JsValue::Undefined)),
            },
        }
    }

    /// Own keys; empty for primitives.
    pub fn keys(&self, realm: &Realm) -> Result<Vec<PropertyKey>, ObjectError> {
        match self.value.as_handle() {
            Some(handle) => realm.heap().own_property_keys(handle),
            None => Ok(Vec::new()),
        }
    }

    /// Entries of a map or set, both halves wrapped.
    pub fn entries(
        &self,
        realm: &Realm,
    ) -> Result<Vec<(DeepReadonly, DeepReadonly)>, ObjectError> {
        let handle = self.value.as_handle().ok_or_else(|| {
            ObjectError::TypeError(format!("{} is not a keyed collection", self.value))
        })?;
        Ok(realm
            .heap()
            .collection_entries(handle)?
            .into_iter()
            .map(|(k, v)| (Self::new(k), Self::new(v)))
            .collect())
    }

    pub fn set(&self, key: impl Into<PropertyKey>, _value: JsValue) -> Result<(), ObjectError> {
        Err(read_only_assignment(&key.into()))
    }

    pub fn define_property(
        &self,
        key: impl Into<PropertyKey>,
        _value: JsValue,
    ) -> Result<(), ObjectError> {
        Err(read_only_assignment(&key.into()))
    }

    pub fn delete(&self, key: impl Into<PropertyKey>) -> Result<(), ObjectError> {
        Err(ObjectError::TypeError(format!(
            "Cannot delete read only property '{}' of object",
            key.into()
        )))
    }

    /// `ReadonlyMap`/`ReadonlySet` have no insertion methods.
    pub fn insert(&self, _key: JsValue, _value: JsValue) -> Result<(), ObjectError> {
        Err(ObjectError::TypeError(
            "Cannot add entries to a read only collection".to_string(),
        ))
    }
}

fn read_only_assignment(key: &PropertyKey) -> ObjectError {
    ObjectError::TypeError(format!(
        "Cannot assign to read only property '{key}' of object"
    ))
}

// ---------------------------------------------------------------------------
// LockMode
// ---------------------------------------------------------------------------

/// Action chosen at compile time, with the value type it hands back.
pub trait LockMode {
    const ACTION: LockAction;
    type Output;

    fn project(value: JsValue) -> Self::Output;
}

/// `freeze`: the result is deeply read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Freeze;

/// `seal`: values stay writable, so the value comes back as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Seal;

#[derive(Debug, Clone, Copy, Default)]
pub struct PreventExtensions;

impl LockMode for Freeze {
    const ACTION: LockAction = LockAction::Freeze;
    type Output = DeepReadonly;

    fn project(value: JsValue) -> DeepReadonly {
        DeepReadonly::new(value)
    }
}

impl LockMode for Seal {
    const ACTION: LockAction = LockAction::Seal;
    type Output = JsValue;

    fn project(value: JsValue) -> JsValue {
        value
    }
}

impl LockMode for PreventExtensions {
    const ACTION: LockAction = LockAction::PreventExtensions;
    type Output = JsValue;

    fn project(value: JsValue) -> JsValue {
        value
    }
}
