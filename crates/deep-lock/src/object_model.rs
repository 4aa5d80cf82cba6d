//! ES2020 object model the lock traversal operates on.
//!
//! Key features:
//!
//! - **Property descriptors**: data vs accessor, configurable/enumerable/writable
//! - **Prototype chains**: `[[Prototype]]` internal slot, walked only by `[[Get]]`
//! - **Object kinds**: functions, arrays, dates, errors, regexps, keyed
//!   collections, promises, array buffers and binary views, each carrying
//!   its hidden state in internal slots rather than own properties
//! - **Lock primitives**: freeze, seal, preventExtensions per object
//! - **Proxy**: opaque exotic objects whose traps need an interpreter
//!
//! `BTreeMap`/`BTreeSet` for deterministic ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Serialize/deserialize `BTreeMap<PropertyKey, PropertyDescriptor>` as a
/// sorted sequence of `[key, descriptor]` pairs.  serde_json requires string
/// keys for JSON maps but `PropertyKey` is an enum.
mod properties_as_seq {
    use super::{BTreeMap, PropertyDescriptor, PropertyKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<PropertyKey, PropertyDescriptor>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&PropertyKey, &PropertyDescriptor)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PropertyKey, PropertyDescriptor>, D::Error> {
        let pairs: Vec<(PropertyKey, PropertyDescriptor)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Message raised by `%ThrowTypeError%` when a restricted property is read.
pub const RESTRICTED_PROPERTY_MESSAGE: &str = "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode functions or the arguments objects for calls to them";

// ---------------------------------------------------------------------------
// Keys and handles
// ---------------------------------------------------------------------------

/// Unique symbol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// Own-property key.  Integer indices are plain strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    String(String),
    Symbol(SymbolId),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

// ---------------------------------------------------------------------------
// Heap references
// ---------------------------------------------------------------------------

/// Index of an object in an [`ObjectHeap`].
///
/// Handles are the identity of a node: two handles are the same object iff
/// they compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A value stored in a property slot.
///
/// Functions are heap objects like any other; `Function` only records that
/// the referenced object is callable so `typeof` can be answered without a
/// heap lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    BigInt(i128),
    Str(String),
    Symbol(SymbolId),
    Object(ObjectHandle),
    Function(ObjectHandle),
}

impl JsValue {
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Heap handle if this value is of kind object or function.
    pub fn as_handle(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) | Self::Function(h) => Some(*h),
            _ => None,
        }
    }

    /// `typeof` result.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }

    /// `SameValue`; integers have no NaN or signed zero to special-case.
    pub fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::BigInt(n) => write!(f, "{n}n"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
            Self::Object(h) => write!(f, "[object#{}]", h.0),
            Self::Function(h) => write!(f, "[function#{}]", h.0),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// Attributes of one own property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyDescriptor {
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    /// Getter/setter pair; handles point at function objects.
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// What plain assignment creates: writable, enumerable, configurable.
    pub fn data(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable, configurable, non-enumerable data descriptor (built-in
    /// method slots).
    pub fn data_hidden(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// All attributes off.
    pub fn data_frozen(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Accessors are never writable in the `[[Set]]` sense used here.
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { writable, .. } => *writable,
            Self::Accessor { .. } => false,
        }
    }

    pub fn set_non_configurable(&mut self) {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => {
                *configurable = false;
            }
        }
    }

    /// Accessors have no `writable` attribute and are left alone.
    pub fn set_non_writable(&mut self) {
        if let Self::Data { writable, .. } = self {
            *writable = false;
        }
    }
}

/// Canonical array index: `"0"` or digits without a leading zero, below
/// `2^32 - 1`.  `"01"`, `"+1"` and `"4294967295"` are plain string keys.
pub fn array_index(key: &str) -> Option<u32> {
    let bytes = key.as_bytes();
    match bytes {
        [] => None,
        [b'0'] => Some(0),
        [b'0', ..] => None,
        _ if bytes.iter().all(u8::is_ascii_digit) => {
            key.parse::<u32>().ok().filter(|n| *n < u32::MAX)
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ObjectError
// ---------------------------------------------------------------------------

/// Failures of heap and lock primitives.  Everything a script would see
/// as a thrown `TypeError` renders with that prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectError {
    TypeError(String),
    /// Out-of-range lengths, e.g. `new ArrayBuffer(2 ** 53)`.
    RangeError(String),
    /// Dangling handle.
    ObjectNotFound(ObjectHandle),
    ProxyRevoked,
    PrototypeCycleDetected,
    PrototypeChainTooDeep { depth: u32, max: u32 },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Self::RangeError(msg) => write!(f, "RangeError: {msg}"),
            Self::ObjectNotFound(h) => write!(f, "object#{} not found", h.0),
            Self::ProxyRevoked => write!(f, "TypeError: proxy has been revoked"),
            Self::PrototypeCycleDetected => write!(f, "TypeError: prototype chain cycle detected"),
            Self::PrototypeChainTooDeep { depth, max } => {
                write!(
                    f,
                    "TypeError: prototype chain depth {depth} exceeds max {max}"
                )
            }
        }
    }
}

impl std::error::Error for ObjectError {}

// ---------------------------------------------------------------------------
// ObjectKind / InternalSlots
// ---------------------------------------------------------------------------

/// Flavor of a callable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// `function () {}`; owns a `prototype` object.
    Normal,
    /// `() => {}`, no own `prototype`.
    Arrow,
    /// Built-in function implemented by the host.
    Native,
    /// `%ThrowTypeError%`: throws whenever invoked.
    ThrowTypeError,
}

/// Element type of a typed array view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayKind {
    /// Bytes per element.
    pub fn element_size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 | Self::Uint8Clamped => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 | Self::BigInt64 | Self::BigUint64 => 8,
        }
    }

    pub fn constructor_name(self) -> &'static str {
        match self {
            Self::Int8 => "Int8Array",
            Self::Uint8 => "Uint8Array",
            Self::Uint8Clamped => "Uint8ClampedArray",
            Self::Int16 => "Int16Array",
            Self::Uint16 => "Uint16Array",
            Self::Int32 => "Int32Array",
            Self::Uint32 => "Uint32Array",
            Self::Float32 => "Float32Array",
            Self::Float64 => "Float64Array",
            Self::BigInt64 => "BigInt64Array",
            Self::BigUint64 => "BigUint64Array",
        }
    }
}

/// Which built-in an object is an instance of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Ordinary,
    Function(FunctionKind),
    Array,
    Date,
    Error,
    RegExp,
    Map,
    Set,
    WeakMap,
    WeakSet,
    Promise,
    ArrayBuffer,
    TypedArray(TypedArrayKind),
    DataView,
}

impl ObjectKind {
    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// `ArrayBuffer.isView`: typed arrays and data views, not the buffer.
    pub fn is_binary_view(self) -> bool {
        matches!(self, Self::TypedArray(_) | Self::DataView)
    }

    /// `Object.prototype.toString` tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Ordinary => "Object",
            Self::Function(_) => "Function",
            Self::Array => "Array",
            Self::Date => "Date",
            Self::Error => "Error",
            Self::RegExp => "RegExp",
            Self::Map => "Map",
            Self::Set => "Set",
            Self::WeakMap => "WeakMap",
            Self::WeakSet => "WeakSet",
            Self::Promise => "Promise",
            Self::ArrayBuffer => "ArrayBuffer",
            Self::TypedArray(kind) => kind.constructor_name(),
            Self::DataView => "DataView",
        }
    }
}

/// Settlement state of a promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromiseState {
    Pending,
    Fulfilled(JsValue),
    Rejected(JsValue),
}

/// Hidden per-kind state.  Nothing here is an own property, so nothing here
/// is affected by (or walked for) the lock primitives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InternalSlots {
    #[default]
    None,
    DateValue {
        epoch_ms: i64,
    },
    ErrorData {
        message: String,
    },
    RegExpMatcher {
        source: String,
        flags: String,
    },
    /// `[[MapData]]` (also used for WeakMap).
    MapData(Vec<(JsValue, JsValue)>),
    /// `[[SetData]]` (also used for WeakSet).
    SetData(Vec<JsValue>),
    Promise(PromiseState),
    ArrayBufferData(Vec<u8>),
    /// `[[ViewedArrayBuffer]]` window of a typed array or data view.
    ViewedBuffer {
        buffer: ObjectHandle,
        byte_offset: usize,
        byte_length: usize,
    },
}

// ---------------------------------------------------------------------------
// Ordinary objects
// ---------------------------------------------------------------------------

/// Bound on `[[Get]]` prototype walks.
const MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 1024;

/// A non-proxy object: own properties plus per-kind hidden state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinaryObject {
    /// Never followed by the lock traversal.
    pub prototype: Option<ObjectHandle>,
    pub extensible: bool,
    #[serde(with = "properties_as_seq")]
    pub properties: BTreeMap<PropertyKey, PropertyDescriptor>,
    pub kind: ObjectKind,
    pub slots: InternalSlots,
}

impl Default for OrdinaryObject {
    fn default() -> Self {
        Self {
            prototype: None,
            extensible: true,
            properties: BTreeMap::new(),
            kind: ObjectKind::Ordinary,
            slots: InternalSlots::None,
        }
    }
}

impl OrdinaryObject {
    pub fn with_prototype(proto: Option<ObjectHandle>) -> Self {
        Self {
            prototype: proto,
            ..Self::default()
        }
    }

    /// Create an object of `kind` carrying `slots`.
    pub fn of_kind(proto: Option<ObjectHandle>, kind: ObjectKind, slots: InternalSlots) -> Self {
        Self {
            prototype: proto,
            kind,
            slots,
            ..Self::default()
        }
    }

    pub fn is_callable(&self) -> bool {
        self.kind.is_callable()
    }

    /// Number of integer-indexed elements a binary view exposes.  These are
    /// always writable and configurable, so a view with elements can be
    /// neither sealed nor frozen.
    pub fn view_element_count(&self) -> usize {
        match (self.kind, &self.slots) {
            (ObjectKind::TypedArray(kind), InternalSlots::ViewedBuffer { byte_length, .. }) => {
                byte_length / kind.element_size()
            }
            _ => 0,
        }
    }

    // -- [[GetOwnProperty]] (§9.1.1) ---------------------------------------

    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    // -- [[DefineOwnProperty]] (§9.1.6) ------------------------------------

    /// Validate and apply `Desc` against the current descriptor of `P`.
    ///
    /// Returns `Ok(true)` if the property was successfully defined,
    /// `Ok(false)` if rejected (non-extensible or non-configurable conflict).
    pub fn define_own_property(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        let Some(current) = self.properties.get(&key) else {
            if !self.extensible {
                return Ok(false);
            }
            self.properties.insert(key, desc);
            return Ok(true);
        };

        if !current.is_configurable() {
            if desc.is_configurable() {
                return Ok(false);
            }
            if desc.is_enumerable() != current.is_enumerable() {
                return Ok(false);
            }
            if current.is_data() != desc.is_data() {
                return Ok(false);
            }
            if let (
                PropertyDescriptor::Data {
                    writable: current_w,
                    value: current_v,
                    ..
                },
                PropertyDescriptor::Data {
                    writable: new_w,
                    value: new_v,
                    ..
                },
            ) = (current, &desc)
                && !current_w
                && (*new_w || !current_v.same_value(new_v))
            {
                return Ok(false);
            }
            if let (
                PropertyDescriptor::Accessor {
                    get: cur_get,
                    set: cur_set,
                    ..
                },
                PropertyDescriptor::Accessor {
                    get: new_get,
                    set: new_set,
                    ..
                },
            ) = (current, &desc)
                && (cur_get != new_get || cur_set != new_set)
            {
                return Ok(false);
            }
        }
        self.properties.insert(key, desc);
        Ok(true)
    }

    // -- [[Delete]] (§9.1.10) -----------------------------------------------

    /// `[[Delete]](P)`; `false` when the property is non-configurable.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        if let Some(desc) = self.properties.get(key) {
            if !desc.is_configurable() {
                return false;
            }
        } else {
            return true;
        }
        self.properties.remove(key);
        true
    }

    // -- [[OwnPropertyKeys]] (§9.1.11) -------------------------------------

    /// Own keys in ES2020 order: integer indices (ascending), then string
    /// keys (BTreeMap order), then symbol keys.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut int_keys: Vec<(u32, PropertyKey)> = Vec::new();
        let mut str_keys: Vec<PropertyKey> = Vec::new();
        let mut sym_keys: Vec<PropertyKey> = Vec::new();

        for key in self.properties.keys() {
            match key {
                PropertyKey::String(s) => {
                    if let Some(n) = array_index(s) {
                        int_keys.push((n, key.clone()));
                    } else {
                        str_keys.push(key.clone());
                    }
                }
                PropertyKey::Symbol(_) => sym_keys.push(key.clone()),
            }
        }

        int_keys.sort_by_key(|(n, _)| *n);
        let mut result: Vec<PropertyKey> = int_keys.into_iter().map(|(_, k)| k).collect();
        result.extend(str_keys);
        result.extend(sym_keys);
        result
    }

    // -- Lock primitives ----------------------------------------------------

    /// `[[PreventExtensions]]()`.
    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    /// `Object.seal` semantics: non-extensible, every own property
    /// non-configurable, writability untouched.
    pub fn seal(&mut self) {
        self.extensible = false;
        for desc in self.properties.values_mut() {
            desc.set_non_configurable();
        }
    }

    /// `Object.freeze` semantics: sealed, and data properties non-writable.
    pub fn freeze(&mut self) {
        self.extensible = false;
        for desc in self.properties.values_mut() {
            desc.set_non_configurable();
            desc.set_non_writable();
        }
    }

    pub fn is_sealed(&self) -> bool {
        !self.extensible
            && self.view_element_count() == 0
            && self.properties.values().all(|d| !d.is_configurable())
    }

    pub fn is_frozen(&self) -> bool {
        self.is_sealed() && self.properties.values().all(|d| !d.is_writable())
    }
}

// ---------------------------------------------------------------------------
// Proxies
// ---------------------------------------------------------------------------

/// Proxy internal state.  The heap cannot run traps, so every object
/// operation on a proxy is a TypeError at this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyObject {
    /// Cleared on revocation, together with `handler`.
    pub target: Option<ObjectHandle>,
    pub handler: Option<ObjectHandle>,
}

impl ProxyObject {
    pub fn new(target: ObjectHandle, handler: ObjectHandle) -> Self {
        Self {
            target: Some(target),
            handler: Some(handler),
        }
    }

    pub fn revoke(&mut self) {
        self.target = None;
        self.handler = None;
    }

    pub fn is_revoked(&self) -> bool {
        self.target.is_none()
    }
}

// ---------------------------------------------------------------------------
// Heap entries
// ---------------------------------------------------------------------------

/// One heap slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManagedObject {
    Ordinary(OrdinaryObject),
    Proxy(ProxyObject),
}

impl ManagedObject {
    pub fn as_ordinary(&self) -> Option<&OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Proxy(_) => None,
        }
    }

    pub fn as_ordinary_mut(&mut self) -> Option<&mut OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Proxy(_) => None,
        }
    }
}

fn proxy_trap_error(trap: &str) -> ObjectError {
    ObjectError::TypeError(format!("proxy {trap} trap must be handled by interpreter"))
}

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

/// Arena of objects addressed by [`ObjectHandle`], plus the symbol table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectHeap {
    objects: Vec<ManagedObject>,
    next_symbol: u32,
    /// Only symbols created with a description appear here.
    symbol_descriptions: BTreeMap<SymbolId, String>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            next_symbol: 1,
            symbol_descriptions: BTreeMap::new(),
        }
    }

    pub fn alloc(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        self.alloc_object(OrdinaryObject::with_prototype(proto))
    }

    /// `Object.create(null)`.
    pub fn alloc_plain(&mut self) -> ObjectHandle {
        self.alloc(None)
    }

    /// Allocate a pre-built ordinary object.
    pub fn alloc_object(&mut self, object: OrdinaryObject) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(ManagedObject::Ordinary(object));
        handle
    }

    /// Allocate a Proxy object.
    pub fn alloc_proxy(&mut self, target: ObjectHandle, handler: ObjectHandle) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects
            .push(ManagedObject::Proxy(ProxyObject::new(target, handler)));
        handle
    }

    /// Allocate a new unique symbol.
    pub fn alloc_symbol(&mut self, description: Option<&str>) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        if let Some(desc) = description {
            self.symbol_descriptions.insert(id, desc.to_string());
        }
        id
    }

    pub fn symbol_description(&self, id: SymbolId) -> Option<&str> {
        self.symbol_descriptions.get(&id).map(String::as_str)
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&ManagedObject, ObjectError> {
        self.objects
            .get(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut ManagedObject, ObjectError> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    fn ordinary(&self, handle: ObjectHandle, trap: &str) -> Result<&OrdinaryObject, ObjectError> {
        match self.get(handle)? {
            ManagedObject::Ordinary(o) => Ok(o),
            ManagedObject::Proxy(p) if p.is_revoked() => Err(ObjectError::ProxyRevoked),
            ManagedObject::Proxy(_) => Err(proxy_trap_error(trap)),
        }
    }

    fn ordinary_mut(
        &mut self,
        handle: ObjectHandle,
        trap: &str,
    ) -> Result<&mut OrdinaryObject, ObjectError> {
        match self.get_mut(handle)? {
            ManagedObject::Ordinary(o) => Ok(o),
            ManagedObject::Proxy(p) if p.is_revoked() => Err(ObjectError::ProxyRevoked),
            ManagedObject::Proxy(_) => Err(proxy_trap_error(trap)),
        }
    }

    /// `Proxy.revocable(...).revoke()`.  Revoking twice is a no-op.
    pub fn revoke_proxy(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        match self.get_mut(handle)? {
            ManagedObject::Proxy(p) => {
                p.revoke();
                Ok(())
            }
            ManagedObject::Ordinary(_) => {
                Err(ObjectError::TypeError(format!("{handle} is not a proxy")))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Built-in kind of an ordinary object; `None` for proxies.
    pub fn kind(&self, handle: ObjectHandle) -> Result<Option<ObjectKind>, ObjectError> {
        Ok(self.get(handle)?.as_ordinary().map(|o| o.kind))
    }

    /// `ArrayBuffer.isView(v)`.  Proxies and unknown handles are not views.
    pub fn is_binary_view(&self, handle: ObjectHandle) -> bool {
        matches!(
            self.get(handle),
            Ok(ManagedObject::Ordinary(o)) if o.kind.is_binary_view()
        )
    }

    /// Is `handle` the `%ThrowTypeError%` intrinsic?
    pub fn is_thrower(&self, handle: ObjectHandle) -> bool {
        matches!(
            self.get(handle),
            Ok(ManagedObject::Ordinary(o))
                if o.kind == ObjectKind::Function(FunctionKind::ThrowTypeError)
        )
    }

    /// Wrap a handle as a value of the right `typeof`.
    pub fn value_of(&self, handle: ObjectHandle) -> JsValue {
        match self.get(handle) {
            Ok(ManagedObject::Ordinary(o)) if o.is_callable() => JsValue::Function(handle),
            _ => JsValue::Object(handle),
        }
    }

    // -- Property access ------------------------------------------------------

    /// Read an accessor's getter.  Only `%ThrowTypeError%` can be evaluated
    /// without an interpreter; any other getter yields `None`.
    fn read_accessor(&self, get: Option<ObjectHandle>) -> Result<Option<JsValue>, ObjectError> {
        match get {
            Some(getter) if self.is_thrower(getter) => Err(ObjectError::TypeError(
                RESTRICTED_PROPERTY_MESSAGE.to_string(),
            )),
            _ => Ok(None),
        }
    }

    /// Value stored in the own property `key`, without consulting the
    /// prototype chain.  `Ok(None)` when the property is absent or is an
    /// accessor whose getter needs an interpreter.
    pub fn get_own_value(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<JsValue>, ObjectError> {
        let o = self.ordinary(handle, "get")?;
        match o.get_own_property(key) {
            None => Ok(None),
            Some(PropertyDescriptor::Data { value, .. }) => Ok(Some(value.clone())),
            Some(PropertyDescriptor::Accessor { get, .. }) => self.read_accessor(*get),
        }
    }

    /// `[[Get]](O, P)`, following `[[Prototype]]`.
    pub fn get_property(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<JsValue, ObjectError> {
        let mut current = Some(handle);
        let mut depth: u32 = 0;
        let mut visited = BTreeSet::new();

        while let Some(h) = current {
            if depth > MAX_PROTOTYPE_CHAIN_DEPTH {
                return Err(ObjectError::PrototypeChainTooDeep {
                    depth,
                    max: MAX_PROTOTYPE_CHAIN_DEPTH,
                });
            }
            if !visited.insert(h) {
                return Err(ObjectError::PrototypeCycleDetected);
            }

            let o = self.ordinary(h, "get")?;
            if let Some(desc) = o.get_own_property(key) {
                return match desc {
                    PropertyDescriptor::Data { value, .. } => Ok(value.clone()),
                    PropertyDescriptor::Accessor { get, .. } => {
                        Ok(self.read_accessor(*get)?.unwrap_or(JsValue::Undefined))
                    }
                };
            }
            current = o.prototype;
            depth += 1;
        }

        Ok(JsValue::Undefined)
    }

    /// `[[Set]](O, P, V)` on an own data property, creating it if the object
    /// is extensible.  Returns `false` where strict mode would throw.
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        let o = self.ordinary_mut(handle, "set")?;
        match o.properties.get_mut(&key) {
            Some(PropertyDescriptor::Data {
                value: slot,
                writable: true,
                ..
            }) => {
                *slot = value;
                Ok(true)
            }
            Some(_) => Ok(false),
            None if o.extensible => {
                o.properties.insert(key, PropertyDescriptor::data(value));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn has_own(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        Ok(self
            .ordinary(handle, "getOwnPropertyDescriptor")?
            .has_own_property(key))
    }

    /// `[[Delete]](O, P)`.
    pub fn delete_property(
        &mut self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<bool, ObjectError> {
        Ok(self.ordinary_mut(handle, "deleteProperty")?.delete(key))
    }

    /// `Object.defineProperty(O, P, Desc)`.
    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        self.ordinary_mut(handle, "defineProperty")?
            .define_own_property(key, desc)
    }

    /// `Object.getOwnPropertyDescriptor(O, P)`.
    pub fn get_own_property_descriptor(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        Ok(self
            .ordinary(handle, "getOwnPropertyDescriptor")?
            .get_own_property(key)
            .cloned())
    }

    /// `Reflect.ownKeys(O)`: string keys then symbols, enumerable or not.
    pub fn own_property_keys(&self, handle: ObjectHandle) -> Result<Vec<PropertyKey>, ObjectError> {
        Ok(self.ordinary(handle, "ownKeys")?.own_property_keys())
    }

    /// `Object.getOwnPropertyNames(O)`.
    pub fn get_own_property_names(&self, handle: ObjectHandle) -> Result<Vec<String>, ObjectError> {
        Ok(self
            .own_property_keys(handle)?
            .into_iter()
            .filter_map(|k| match k {
                PropertyKey::String(s) => Some(s),
                PropertyKey::Symbol(_) => None,
            })
            .collect())
    }

    // -- Prototype ------------------------------------------------------------

    pub fn get_prototype_of(
        &self,
        handle: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.ordinary(handle, "getPrototypeOf")?.prototype)
    }

    /// `Object.setPrototypeOf(O, proto)`.
    pub fn set_prototype_of(
        &mut self,
        handle: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> Result<bool, ObjectError> {
        if let Some(p) = proto {
            let mut current = Some(p);
            let mut visited = BTreeSet::new();
            visited.insert(handle);
            while let Some(h) = current {
                if !visited.insert(h) {
                    return Err(ObjectError::PrototypeCycleDetected);
                }
                match self.get(h)? {
                    ManagedObject::Ordinary(o) => current = o.prototype,
                    ManagedObject::Proxy(_) => break,
                }
            }
        }

        let o = self.ordinary_mut(handle, "setPrototypeOf")?;
        if !o.extensible {
            return Ok(o.prototype == proto);
        }
        o.prototype = proto;
        Ok(true)
    }

    // -- Lock primitives --------------------------------------------------------

    /// `Object.isExtensible(O)`.
    pub fn is_extensible(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle, "isExtensible")?.extensible)
    }

    /// `Object.preventExtensions(O)`.
    pub fn prevent_extensions(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        self.ordinary_mut(handle, "preventExtensions")?
            .prevent_extensions();
        Ok(())
    }

    /// `Object.seal(O)`.
    pub fn seal(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        let o = self.ordinary_mut(handle, "preventExtensions")?;
        if o.view_element_count() > 0 {
            return Err(ObjectError::TypeError(
                "cannot seal array buffer views with elements".to_string(),
            ));
        }
        o.seal();
        Ok(())
    }

    /// `Object.freeze(O)`.
    pub fn freeze(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        let o = self.ordinary_mut(handle, "preventExtensions")?;
        if o.view_element_count() > 0 {
            return Err(ObjectError::TypeError(
                "cannot freeze array buffer views with elements".to_string(),
            ));
        }
        o.freeze();
        Ok(())
    }

    /// `Object.isFrozen(O)`.
    pub fn is_frozen(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle, "isExtensible")?.is_frozen())
    }

    /// `Object.isSealed(O)`.
    pub fn is_sealed(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle, "isExtensible")?.is_sealed())
    }

    // -- Internal slots -----------------------------------------------------------

    /// `Map.prototype.set` / `Set.prototype.add` (and the weak variants).
    /// Entries live in internal slots, so this works on frozen collections.
    pub fn collection_insert(
        &mut self,
        handle: ObjectHandle,
        key: JsValue,
        value: JsValue,
    ) -> Result<(), ObjectError> {
        let o = self.ordinary_mut(handle, "get")?;
        if matches!(o.kind, ObjectKind::WeakMap | ObjectKind::WeakSet) && key.as_handle().is_none() {
            return Err(ObjectError::TypeError(format!(
                "invalid value used in {}: {key}",
                o.kind.tag()
            )));
        }
        match &mut o.slots {
            InternalSlots::MapData(entries) => {
                if let Some(entry) = entries.iter_mut().find(|(k, _)| k.same_value(&key)) {
                    entry.1 = value;
                } else {
                    entries.push((key, value));
                }
                Ok(())
            }
            InternalSlots::SetData(members) => {
                if !members.iter().any(|m| m.same_value(&key)) {
                    members.push(key);
                }
                Ok(())
            }
            _ => Err(ObjectError::TypeError(format!(
                "{} is not a keyed collection",
                o.kind.tag()
            ))),
        }
    }

    /// `[key, value]` pairs of a keyed collection; set members pair with
    /// themselves, as `Set.prototype.entries` does.
    pub fn collection_entries(
        &self,
        handle: ObjectHandle,
    ) -> Result<Vec<(JsValue, JsValue)>, ObjectError> {
        let o = self.ordinary(handle, "get")?;
        match &o.slots {
            InternalSlots::MapData(entries) => Ok(entries.clone()),
            InternalSlots::SetData(members) => {
                Ok(members.iter().map(|m| (m.clone(), m.clone())).collect())
            }
            _ => Err(ObjectError::TypeError(format!(
                "{} is not a keyed collection",
                o.kind.tag()
            ))),
        }
    }

    /// Write one byte through a binary view into its viewed buffer.
    pub fn view_write_byte(
        &mut self,
        view: ObjectHandle,
        index: usize,
        byte: u8,
    ) -> Result<(), ObjectError> {
        let (buffer, offset) = match &self.ordinary(view, "set")?.slots {
            InternalSlots::ViewedBuffer {
                buffer,
                byte_offset,
                byte_length,
            } if index < *byte_length => (*buffer, byte_offset + index),
            _ => {
                return Err(ObjectError::TypeError(format!(
                    "byte index {index} is outside the view"
                )));
            }
        };
        match &mut self.ordinary_mut(buffer, "set")?.slots {
            InternalSlots::ArrayBufferData(bytes) if offset < bytes.len() => {
                bytes[offset] = byte;
                Ok(())
            }
            _ => Err(ObjectError::TypeError("detached array buffer".to_string())),
        }
    }

    /// Bytes of an array buffer.
    pub fn buffer_bytes(&self, buffer: ObjectHandle) -> Result<&[u8], ObjectError> {
        match &self.ordinary(buffer, "get")?.slots {
            InternalSlots::ArrayBufferData(bytes) => Ok(bytes.as_slice()),
            _ => Err(ObjectError::TypeError("not an ArrayBuffer".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn str_key(s: &str) -> PropertyKey {
        PropertyKey::String(s.to_string())
    }

    fn int_val(n: i64) -> JsValue {
        JsValue::Int(n)
    }

    // -----------------------------------------------------------------------
    // 1. Keys and values
    // -----------------------------------------------------------------------

    #[test]
    fn property_key_display() {
        assert_eq!(str_key("foo").to_string(), "foo");
        assert_eq!(PropertyKey::Symbol(SymbolId(42)).to_string(), "Symbol(42)");
    }

    #[test]
    fn js_value_typeof() {
        assert_eq!(JsValue::Null.type_name(), "object");
        assert_eq!(JsValue::BigInt(1).type_name(), "bigint");
        assert_eq!(JsValue::Function(ObjectHandle(0)).type_name(), "function");
        assert_eq!(JsValue::Int(1).as_handle(), None);
        assert_eq!(
            JsValue::Function(ObjectHandle(3)).as_handle(),
            Some(ObjectHandle(3))
        );
    }

    // -----------------------------------------------------------------------
    // 2. Define / delete
    // -----------------------------------------------------------------------

    #[test]
    fn define_own_property_non_extensible_rejects() {
        let mut obj = OrdinaryObject {
            extensible: false,
            ..Default::default()
        };
        let result = obj
            .define_own_property(str_key("x"), PropertyDescriptor::data(int_val(1)))
            .unwrap();
        assert!(!result);
    }

    #[test]
    fn define_own_property_non_configurable_rejects_reconfig() {
        let mut obj = OrdinaryObject::default();
        obj.define_own_property(str_key("x"), PropertyDescriptor::data_frozen(int_val(1)))
            .unwrap();
        let result = obj
            .define_own_property(str_key("x"), PropertyDescriptor::data(int_val(2)))
            .unwrap();
        assert!(!result);
        // Redefining with identical attributes is a no-op.
        let result = obj
            .define_own_property(str_key("x"), PropertyDescriptor::data_frozen(int_val(1)))
            .unwrap();
        assert!(result);
    }

    #[test]
    fn delete_non_configurable_rejected() {
        let mut obj = OrdinaryObject::default();
        obj.define_own_property(str_key("x"), PropertyDescriptor::data_frozen(int_val(1)))
            .unwrap();
        assert!(!obj.delete(&str_key("x")));
        assert!(obj.delete(&str_key("missing")));
    }

    #[test]
    fn own_property_keys_order() {
        let mut obj = OrdinaryObject::default();
        for (k, v) in [("b", 1), ("2", 2), ("0", 3), ("a", 4), ("10", 6)] {
            obj.define_own_property(str_key(k), PropertyDescriptor::data(int_val(v)))
                .unwrap();
        }
        obj.define_own_property(
            PropertyKey::Symbol(SymbolId(100)),
            PropertyDescriptor::data(int_val(5)),
        )
        .unwrap();

        let keys = obj.own_property_keys();
        assert_eq!(
            keys,
            vec![
                str_key("0"),
                str_key("2"),
                str_key("10"),
                str_key("a"),
                str_key("b"),
                PropertyKey::Symbol(SymbolId(100)),
            ]
        );
    }

    #[test]
    fn non_canonical_numeric_keys_order_as_strings() {
        let mut obj = OrdinaryObject::default();
        for k in ["4294967295", "01", "+1", "7", "4294967294", "b"] {
            obj.define_own_property(str_key(k), PropertyDescriptor::data(int_val(0)))
                .unwrap();
        }
        assert_eq!(
            obj.own_property_keys(),
            vec![
                str_key("7"),
                str_key("4294967294"),
                str_key("+1"),
                str_key("01"),
                str_key("4294967295"),
                str_key("b"),
            ]
        );
    }

    #[test]
    fn array_index_accepts_only_canonical_forms() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("4294967294"), Some(4_294_967_294));
        for key in ["", "00", "01", "+1", "-1", "1.0", "4294967295", "99999999999"] {
            assert_eq!(array_index(key), None, "{key:?}");
        }
    }

    // -----------------------------------------------------------------------
    // 3. Lock primitives
    // -----------------------------------------------------------------------

    #[test]
    fn freeze_makes_non_writable_non_configurable() {
        let mut obj = OrdinaryObject::default();
        obj.define_own_property(str_key("x"), PropertyDescriptor::data(int_val(1)))
            .unwrap();
        obj.freeze();
        assert!(obj.is_frozen());
        assert!(obj.is_sealed());
        let d = obj.get_own_property(&str_key("x")).unwrap();
        assert!(!d.is_configurable());
        assert!(!d.is_writable());
    }

    #[test]
    fn seal_keeps_writable() {
        let mut obj = OrdinaryObject::default();
        obj.define_own_property(str_key("x"), PropertyDescriptor::data(int_val(1)))
            .unwrap();
        obj.seal();
        assert!(obj.is_sealed());
        assert!(!obj.is_frozen());
        assert!(obj.get_own_property(&str_key("x")).unwrap().is_writable());
    }

    #[test]
    fn empty_non_extensible_is_sealed_and_frozen() {
        let mut obj = OrdinaryObject::default();
        obj.prevent_extensions();
        assert!(obj.is_sealed());
        assert!(obj.is_frozen());
    }

    #[test]
    fn accessor_survives_freeze_as_non_configurable() {
        let mut obj = OrdinaryObject::default();
        obj.define_own_property(
            str_key("acc"),
            PropertyDescriptor::Accessor {
                get: Some(ObjectHandle(9)),
                set: None,
                enumerable: true,
                configurable: true,
            },
        )
        .unwrap();
        obj.freeze();
        assert!(obj.is_frozen());
        assert!(obj.get_own_property(&str_key("acc")).unwrap().is_accessor());
    }

    #[test]
    fn heap_freeze_blocks_writes_and_additions() {
        let mut heap = ObjectHeap::new();
        let h = heap.alloc_plain();
        heap.set_property(h, str_key("x"), int_val(1)).unwrap();
        heap.freeze(h).unwrap();

        assert!(heap.is_frozen(h).unwrap());
        assert!(!heap.set_property(h, str_key("x"), int_val(2)).unwrap());
        assert!(!heap.set_property(h, str_key("y"), int_val(3)).unwrap());
        assert!(!heap.delete_property(h, &str_key("x")).unwrap());
    }

    #[test]
    fn heap_seal_allows_value_change() {
        let mut heap = ObjectHeap::new();
        let h = heap.alloc_plain();
        heap.set_property(h, str_key("x"), int_val(1)).unwrap();
        heap.seal(h).unwrap();

        assert!(heap.is_sealed(h).unwrap());
        assert!(!heap.is_frozen(h).unwrap());
        assert!(heap.set_property(h, str_key("x"), int_val(2)).unwrap());
        assert!(!heap.set_property(h, str_key("y"), int_val(3)).unwrap());
    }

    #[test]
    fn heap_refreeze_is_noop() {
        let mut heap = ObjectHeap::new();
        let h = heap.alloc_plain();
        heap.freeze(h).unwrap();
        heap.freeze(h).unwrap();
        heap.seal(h).unwrap();
        heap.prevent_extensions(h).unwrap();
        assert!(heap.is_frozen(h).unwrap());
    }

    #[test]
    fn proxy_lock_primitives_fail() {
        let mut heap = ObjectHeap::new();
        let t = heap.alloc_plain();
        let handler = heap.alloc_plain();
        let p = heap.alloc_proxy(t, handler);
        assert!(matches!(heap.freeze(p), Err(ObjectError::TypeError(_))));
        assert!(matches!(heap.seal(p), Err(ObjectError::TypeError(_))));
        assert!(matches!(
            heap.prevent_extensions(p),
            Err(ObjectError::TypeError(_))
        ));
        assert!(!heap.is_binary_view(p));
    }

    #[test]
    fn revoked_proxy_reports_revocation() {
        let mut heap = ObjectHeap::new();
        let t = heap.alloc_plain();
        let handler = heap.alloc_plain();
        let p = heap.alloc_proxy(t, handler);
        heap.revoke_proxy(p).unwrap();
        heap.revoke_proxy(p).unwrap();
        assert_eq!(heap.freeze(p), Err(ObjectError::ProxyRevoked));
        assert_eq!(heap.own_property_keys(p), Err(ObjectError::ProxyRevoked));
        assert!(heap.revoke_proxy(t).is_err());
    }

    #[test]
    fn typed_array_with_elements_cannot_freeze_or_seal() {
        let mut heap = ObjectHeap::new();
        let buffer = heap.alloc_object(OrdinaryObject::of_kind(
            None,
            ObjectKind::ArrayBuffer,
            InternalSlots::ArrayBufferData(vec![0; 8]),
        ));
        let view = heap.alloc_object(OrdinaryObject::of_kind(
            None,
            ObjectKind::TypedArray(TypedArrayKind::Uint32),
            InternalSlots::ViewedBuffer {
                buffer,
                byte_offset: 0,
                byte_length: 8,
            },
        ));
        assert!(heap.is_binary_view(view));
        assert!(!heap.is_binary_view(buffer));
        assert!(heap.freeze(view).is_err());
        assert!(heap.seal(view).is_err());
        heap.prevent_extensions(view).unwrap();
        assert!(!heap.is_extensible(view).unwrap());
        assert!(!heap.is_sealed(view).unwrap());
        // The buffer itself locks fine; its bytes are an internal slot.
        heap.freeze(buffer).unwrap();
        heap.view_write_byte(view, 3, 7).unwrap();
        assert_eq!(heap.buffer_bytes(buffer).unwrap()[3], 7);
    }

    // -----------------------------------------------------------------------
    // 4. Accessors and prototype lookups
    // -----------------------------------------------------------------------

    #[test]
    fn thrower_accessor_read_fails() {
        let mut heap = ObjectHeap::new();
        let thrower = heap.alloc_object(OrdinaryObject::of_kind(
            None,
            ObjectKind::Function(FunctionKind::ThrowTypeError),
            InternalSlots::None,
        ));
        let h = heap.alloc_plain();
        heap.define_property(
            h,
            str_key("caller"),
            PropertyDescriptor::Accessor {
                get: Some(thrower),
                set: Some(thrower),
                enumerable: false,
                configurable: true,
            },
        )
        .unwrap();
        let err = heap.get_own_value(h, &str_key("caller")).unwrap_err();
        assert_eq!(
            err,
            ObjectError::TypeError(RESTRICTED_PROPERTY_MESSAGE.to_string())
        );
        assert!(heap.get_property(h, &str_key("caller")).is_err());
    }

    #[test]
    fn plain_getter_yields_no_value() {
        let mut heap = ObjectHeap::new();
        let getter = heap.alloc_plain();
        let h = heap.alloc_plain();
        heap.define_property(
            h,
            str_key("lazy"),
            PropertyDescriptor::Accessor {
                get: Some(getter),
                set: None,
                enumerable: true,
                configurable: true,
            },
        )
        .unwrap();
        assert_eq!(heap.get_own_value(h, &str_key("lazy")).unwrap(), None);
        assert_eq!(
            heap.get_property(h, &str_key("lazy")).unwrap(),
            JsValue::Undefined
        );
    }

    #[test]
    fn get_property_walks_prototype_but_own_value_does_not() {
        let mut heap = ObjectHeap::new();
        let base = heap.alloc_plain();
        heap.set_property(base, str_key("inherited"), int_val(1))
            .unwrap();
        let child = heap.alloc(Some(base));
        assert_eq!(
            heap.get_property(child, &str_key("inherited")).unwrap(),
            int_val(1)
        );
        assert_eq!(
            heap.get_own_value(child, &str_key("inherited")).unwrap(),
            None
        );
    }

    #[test]
    fn set_prototype_of_rejects_cycles() {
        let mut heap = ObjectHeap::new();
        let a = heap.alloc_plain();
        let b = heap.alloc(Some(a));
        assert_eq!(
            heap.set_prototype_of(a, Some(b)),
            Err(ObjectError::PrototypeCycleDetected)
        );
        heap.prevent_extensions(b).unwrap();
        assert!(!heap.set_prototype_of(b, None).unwrap());
        assert!(heap.set_prototype_of(b, Some(a)).unwrap());
    }

    // -----------------------------------------------------------------------
    // 5. Collections
    // -----------------------------------------------------------------------

    #[test]
    fn frozen_map_still_accepts_entries() {
        let mut heap = ObjectHeap::new();
        let m = heap.alloc_object(OrdinaryObject::of_kind(
            None,
            ObjectKind::Map,
            InternalSlots::MapData(Vec::new()),
        ));
        heap.freeze(m).unwrap();
        heap.collection_insert(m, int_val(1), int_val(2)).unwrap();
        heap.collection_insert(m, int_val(1), int_val(3)).unwrap();
        assert_eq!(
            heap.collection_entries(m).unwrap(),
            vec![(int_val(1), int_val(3))]
        );
        let plain = heap.alloc_plain();
        assert!(heap.collection_entries(plain).is_err());
    }

    #[test]
    fn symbols_carry_descriptions() {
        let mut heap = ObjectHeap::new();
        let a = heap.alloc_symbol(Some("test"));
        let b = heap.alloc_symbol(None);
        assert_ne!(a, b);
        assert_eq!(heap.symbol_description(a), Some("test"));
        assert_eq!(heap.symbol_description(b), None);
    }

    #[test]
    fn ordinary_object_serde_roundtrip() {
        let mut obj = OrdinaryObject::of_kind(
            Some(ObjectHandle(1)),
            ObjectKind::RegExp,
            InternalSlots::RegExpMatcher {
                source: "a+".to_string(),
                flags: "g".to_string(),
            },
        );
        obj.define_own_property(
            PropertyKey::Symbol(SymbolId(4)),
            PropertyDescriptor::data(int_val(1)),
        )
        .unwrap();
        let json = serde_json::to_string(&obj).unwrap();
        let back: OrdinaryObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ObjectKind::RegExp);
        assert_eq!(back.properties, obj.properties);
        assert_eq!(back.slots, obj.slots);
    }
}
