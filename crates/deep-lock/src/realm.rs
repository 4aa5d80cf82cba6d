//! Realm: an object heap plus its intrinsic objects.
//!
//! Every constructor here mirrors what the corresponding ES2020 built-in
//! leaves behind as *own* properties, because own properties are exactly
//! what the lock traversal walks.  Hidden state goes into internal slots.

use serde::{Deserialize, Serialize};

use crate::object_model::{
    FunctionKind, InternalSlots, JsValue, ObjectError, ObjectHandle, ObjectHeap, ObjectKind,
    OrdinaryObject, PromiseState, PropertyDescriptor, PropertyKey, TypedArrayKind,
};

/// Handles of the intrinsic prototypes and functions of one realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub object_prototype: ObjectHandle,
    /// `%Function.prototype%`; carries the restricted `caller` and
    /// `arguments` accessors.
    pub function_prototype: ObjectHandle,
    pub throw_type_error: ObjectHandle,
    pub array_prototype: ObjectHandle,
    pub date_prototype: ObjectHandle,
    pub error_prototype: ObjectHandle,
    pub regexp_prototype: ObjectHandle,
    pub map_prototype: ObjectHandle,
    pub set_prototype: ObjectHandle,
    pub weak_map_prototype: ObjectHandle,
    pub weak_set_prototype: ObjectHandle,
    pub promise_prototype: ObjectHandle,
    pub array_buffer_prototype: ObjectHandle,
    pub typed_array_prototype: ObjectHandle,
    pub data_view_prototype: ObjectHandle,
}

/// A heap together with its intrinsics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    heap: ObjectHeap,
    intrinsics: Intrinsics,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

fn non_writable_hidden(value: JsValue) -> PropertyDescriptor {
    PropertyDescriptor::Data {
        value,
        writable: false,
        enumerable: false,
        configurable: true,
    }
}

fn install(heap: &mut ObjectHeap, target: ObjectHandle, key: &str, desc: PropertyDescriptor) {
    if let Some(o) = heap.get_mut(target).ok().and_then(|m| m.as_ordinary_mut()) {
        o.properties.insert(PropertyKey::from(key), desc);
    }
}

fn alloc_native(heap: &mut ObjectHeap, proto: ObjectHandle, name: &str) -> ObjectHandle {
    let f = heap.alloc_object(OrdinaryObject::of_kind(
        Some(proto),
        ObjectKind::Function(FunctionKind::Native),
        InternalSlots::None,
    ));
    install(heap, f, "length", non_writable_hidden(JsValue::Int(0)));
    install(heap, f, "name", non_writable_hidden(JsValue::Str(name.to_string())));
    f
}

fn install_methods(
    heap: &mut ObjectHeap,
    function_prototype: ObjectHandle,
    target: ObjectHandle,
    names: &[&str],
) {
    for name in names {
        let f = alloc_native(heap, function_prototype, name);
        install(
            heap,
            target,
            name,
            PropertyDescriptor::data_hidden(JsValue::Function(f)),
        );
    }
}

/// Allocate a built-in prototype object.  `roots` is
/// `(%Object.prototype%, %Function.prototype%)`.
fn alloc_prototype(
    heap: &mut ObjectHeap,
    roots: (ObjectHandle, ObjectHandle),
    methods: &[&str],
) -> ObjectHandle {
    let (object_prototype, function_prototype) = roots;
    let p = heap.alloc(Some(object_prototype));
    install_methods(heap, function_prototype, p, methods);
    p
}

impl Realm {
    /// Build a realm with all intrinsics installed.
    pub fn new() -> Self {
        let mut heap = ObjectHeap::new();

        let object_prototype = heap.alloc_plain();
        let function_prototype = heap.alloc_object(OrdinaryObject::of_kind(
            Some(object_prototype),
            ObjectKind::Function(FunctionKind::Native),
            InternalSlots::None,
        ));

        // %ThrowTypeError% is born frozen.
        let throw_type_error = heap.alloc_object(OrdinaryObject::of_kind(
            Some(function_prototype),
            ObjectKind::Function(FunctionKind::ThrowTypeError),
            InternalSlots::None,
        ));
        install(
            &mut heap,
            throw_type_error,
            "length",
            PropertyDescriptor::data_frozen(JsValue::Int(0)),
        );
        install(
            &mut heap,
            throw_type_error,
            "name",
            PropertyDescriptor::data_frozen(JsValue::Str(String::new())),
        );
        if let Some(o) = heap
            .get_mut(throw_type_error)
            .ok()
            .and_then(|m| m.as_ordinary_mut())
        {
            o.prevent_extensions();
        }

        install(
            &mut heap,
            function_prototype,
            "length",
            non_writable_hidden(JsValue::Int(0)),
        );
        install(
            &mut heap,
            function_prototype,
            "name",
            non_writable_hidden(JsValue::Str(String::new())),
        );
        for restricted in ["caller", "arguments"] {
            install(
                &mut heap,
                function_prototype,
                restricted,
                PropertyDescriptor::Accessor {
                    get: Some(throw_type_error),
                    set: Some(throw_type_error),
                    enumerable: false,
                    configurable: true,
                },
            );
        }
        install_methods(
            &mut heap,
            function_prototype,
            function_prototype,
            &["apply", "bind", "call", "toString"],
        );
        install_methods(
            &mut heap,
            function_prototype,
            object_prototype,
            &["hasOwnProperty", "isPrototypeOf", "toString", "valueOf"],
        );

        let roots = (object_prototype, function_prototype);
        let array_prototype = alloc_prototype(&mut heap, roots, &["map", "push", "slice"]);
        let date_prototype = alloc_prototype(&mut heap, roots, &["getTime", "toISOString"]);
        let error_prototype = alloc_prototype(&mut heap, roots, &["toString"]);
        install(
            &mut heap,
            error_prototype,
            "message",
            PropertyDescriptor::data_hidden(JsValue::Str(String::new())),
        );
        let regexp_prototype = alloc_prototype(&mut heap, roots, &["exec", "test"]);
        let map_prototype = alloc_prototype(&mut heap, roots, &["get", "has", "set", "delete"]);
        let set_prototype = alloc_prototype(&mut heap, roots, &["add", "has", "delete"]);
        let weak_map_prototype = alloc_prototype(&mut heap, roots, &["get", "has", "set", "delete"]);
        let weak_set_prototype = alloc_prototype(&mut heap, roots, &["add", "has", "delete"]);
        let promise_prototype = alloc_prototype(&mut heap, roots, &["then", "catch", "finally"]);
        let array_buffer_prototype = alloc_prototype(&mut heap, roots, &["slice"]);
        let typed_array_prototype = alloc_prototype(&mut heap, roots, &["fill", "subarray"]);
        let data_view_prototype = alloc_prototype(&mut heap, roots, &["getUint8", "setUint8"]);

        Self {
            heap,
            intrinsics: Intrinsics {
                object_prototype,
                function_prototype,
                throw_type_error,
                array_prototype,
                date_prototype,
                error_prototype,
                regexp_prototype,
                map_prototype,
                set_prototype,
                weak_map_prototype,
                weak_set_prototype,
                promise_prototype,
                array_buffer_prototype,
                typed_array_prototype,
                data_view_prototype,
            },
        }
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    // -- Convenience property access ---------------------------------------

    /// `O[P] = V`; `false` where strict mode would throw.
    pub fn set(
        &mut self,
        target: ObjectHandle,
        key: impl Into<PropertyKey>,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        self.heap.set_property(target, key.into(), value)
    }

    /// `O[P]` through the prototype chain.
    pub fn get(
        &self,
        target: ObjectHandle,
        key: impl Into<PropertyKey>,
    ) -> Result<JsValue, ObjectError> {
        self.heap.get_property(target, &key.into())
    }

    /// Handle stored at `target[key]`, if it is an object or function.
    pub fn get_handle(
        &self,
        target: ObjectHandle,
        key: impl Into<PropertyKey>,
    ) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.get(target, key)?.as_handle())
    }

    // -- Constructors ---------------------------------------------------------

    /// `{}`.
    pub fn new_object(&mut self) -> ObjectHandle {
        self.heap.alloc(Some(self.intrinsics.object_prototype))
    }

    /// `Object.create(proto)`.
    pub fn object_create(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        self.heap.alloc(proto)
    }

    /// `Symbol(description)`.
    pub fn new_symbol(&mut self, description: Option<&str>) -> JsValue {
        JsValue::Symbol(self.heap.alloc_symbol(description))
    }

    /// A user function.  `FunctionKind::Normal` functions own a `prototype`
    /// object whose `constructor` points back at the function.
    pub fn new_function(&mut self, name: &str, kind: FunctionKind) -> JsValue {
        let f = self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.function_prototype),
            ObjectKind::Function(kind),
            InternalSlots::None,
        ));
        install(&mut self.heap, f, "length", non_writable_hidden(JsValue::Int(0)));
        install(
            &mut self.heap,
            f,
            "name",
            non_writable_hidden(JsValue::Str(name.to_string())),
        );
        if kind == FunctionKind::Normal {
            let proto = self.new_object();
            install(
                &mut self.heap,
                proto,
                "constructor",
                PropertyDescriptor::data_hidden(JsValue::Function(f)),
            );
            install(
                &mut self.heap,
                f,
                "prototype",
                PropertyDescriptor::Data {
                    value: JsValue::Object(proto),
                    writable: true,
                    enumerable: false,
                    configurable: false,
                },
            );
        }
        JsValue::Function(f)
    }

    /// `[v0, v1, ...]`.
    pub fn new_array(&mut self, elements: Vec<JsValue>) -> ObjectHandle {
        let a = self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.array_prototype),
            ObjectKind::Array,
            InternalSlots::None,
        ));
        let len = elements.len() as i64;
        for (i, v) in elements.into_iter().enumerate() {
            install(&mut self.heap, a, &i.to_string(), PropertyDescriptor::data(v));
        }
        install(
            &mut self.heap,
            a,
            "length",
            PropertyDescriptor::Data {
                value: JsValue::Int(len),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        a
    }

    /// `new Date(epoch_ms)`.
    pub fn new_date(&mut self, epoch_ms: i64) -> ObjectHandle {
        self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.date_prototype),
            ObjectKind::Date,
            InternalSlots::DateValue { epoch_ms },
        ))
    }

    /// `new Error(message)`; `message` is an own, non-enumerable property.
    pub fn new_error(&mut self, message: &str) -> ObjectHandle {
        let e = self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.error_prototype),
            ObjectKind::Error,
            InternalSlots::ErrorData {
                message: message.to_string(),
            },
        ));
        install(
            &mut self.heap,
            e,
            "message",
            PropertyDescriptor::data_hidden(JsValue::Str(message.to_string())),
        );
        e
    }

    /// `/source/flags`, owning a writable, non-configurable `lastIndex`.
    pub fn new_regexp(&mut self, source: &str, flags: &str) -> ObjectHandle {
        let r = self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.regexp_prototype),
            ObjectKind::RegExp,
            InternalSlots::RegExpMatcher {
                source: source.to_string(),
                flags: flags.to_string(),
            },
        ));
        install(
            &mut self.heap,
            r,
            "lastIndex",
            PropertyDescriptor::Data {
                value: JsValue::Int(0),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        r
    }

    /// `new Map(entries)`.
    pub fn new_map(
        &mut self,
        entries: Vec<(JsValue, JsValue)>,
    ) -> Result<ObjectHandle, ObjectError> {
        let m = self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.map_prototype),
            ObjectKind::Map,
            InternalSlots::MapData(Vec::new()),
        ));
        for (k, v) in entries {
            self.heap.collection_insert(m, k, v)?;
        }
        Ok(m)
    }

    /// `new Set(members)`.
    pub fn new_set(&mut self, members: Vec<JsValue>) -> Result<ObjectHandle, ObjectError> {
        let s = self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.set_prototype),
            ObjectKind::Set,
            InternalSlots::SetData(Vec::new()),
        ));
        for v in members {
            self.heap.collection_insert(s, v.clone(), v)?;
        }
        Ok(s)
    }

    /// `new WeakMap()`.
    pub fn new_weak_map(&mut self) -> ObjectHandle {
        self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.weak_map_prototype),
            ObjectKind::WeakMap,
            InternalSlots::MapData(Vec::new()),
        ))
    }

    /// `new WeakSet()`.
    pub fn new_weak_set(&mut self) -> ObjectHandle {
        self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.weak_set_prototype),
            ObjectKind::WeakSet,
            InternalSlots::SetData(Vec::new()),
        ))
    }

    /// A promise already in `state`.
    pub fn new_promise(&mut self, state: PromiseState) -> ObjectHandle {
        self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.promise_prototype),
            ObjectKind::Promise,
            InternalSlots::Promise(state),
        ))
    }

    /// `new ArrayBuffer(byte_length)`, zero-filled.  A length the host
    /// cannot allocate is a RangeError rather than an abort.
    pub fn new_array_buffer(&mut self, byte_length: usize) -> Result<ObjectHandle, ObjectError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(byte_length).map_err(|_| {
            ObjectError::RangeError(format!("Array buffer allocation failed: {byte_length} bytes"))
        })?;
        bytes.resize(byte_length, 0);
        Ok(self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.array_buffer_prototype),
            ObjectKind::ArrayBuffer,
            InternalSlots::ArrayBufferData(bytes),
        )))
    }

    /// `new <Kind>Array(length)` over a fresh buffer.
    pub fn new_typed_array(
        &mut self,
        kind: TypedArrayKind,
        length: usize,
    ) -> Result<ObjectHandle, ObjectError> {
        let byte_length = length.checked_mul(kind.element_size()).ok_or_else(|| {
            ObjectError::RangeError(format!("Invalid typed array length: {length}"))
        })?;
        let buffer = self.new_array_buffer(byte_length)?;
        Ok(self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.typed_array_prototype),
            ObjectKind::TypedArray(kind),
            InternalSlots::ViewedBuffer {
                buffer,
                byte_offset: 0,
                byte_length,
            },
        )))
    }

    /// `new DataView(buffer)` over the whole buffer.
    pub fn new_data_view(&mut self, buffer: ObjectHandle) -> Result<ObjectHandle, ObjectError> {
        let byte_length = self.heap.buffer_bytes(buffer)?.len();
        Ok(self.heap.alloc_object(OrdinaryObject::of_kind(
            Some(self.intrinsics.data_view_prototype),
            ObjectKind::DataView,
            InternalSlots::ViewedBuffer {
                buffer,
                byte_offset: 0,
                byte_length,
            },
        )))
    }

    /// `new Proxy(target, handler)`.
    pub fn new_proxy(&mut self, target: ObjectHandle, handler: ObjectHandle) -> ObjectHandle {
        self.heap.alloc_proxy(target, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_model::RESTRICTED_PROPERTY_MESSAGE;

    #[test]
    fn function_prototype_restricted_properties_throw() {
        let realm = Realm::new();
        let fp = realm.intrinsics().function_prototype;
        for key in ["caller", "arguments"] {
            let err = realm.heap().get_own_value(fp, &key.into()).unwrap_err();
            assert_eq!(
                err,
                ObjectError::TypeError(RESTRICTED_PROPERTY_MESSAGE.to_string())
            );
        }
        assert!(
            realm
                .heap()
                .get_own_property_names(fp)
                .unwrap()
                .contains(&"call".to_string())
        );
    }

    #[test]
    fn throw_type_error_is_frozen() {
        let realm = Realm::new();
        let t = realm.intrinsics().throw_type_error;
        assert!(realm.heap().is_frozen(t).unwrap());
        assert!(realm.heap().is_thrower(t));
    }

    #[test]
    fn normal_function_owns_prototype_object() {
        let mut realm = Realm::new();
        let f = realm.new_function("f", FunctionKind::Normal);
        let fh = f.as_handle().unwrap();
        let proto = realm.get_handle(fh, "prototype").unwrap().unwrap();
        assert_eq!(realm.get(proto, "constructor").unwrap(), f);

        let arrow = realm.new_function("g", FunctionKind::Arrow);
        let gh = arrow.as_handle().unwrap();
        assert!(!realm.heap().has_own(gh, &"prototype".into()).unwrap());
        assert_eq!(
            realm.heap().get_prototype_of(gh).unwrap(),
            Some(realm.intrinsics().function_prototype)
        );
    }

    #[test]
    fn array_has_indices_and_hidden_length() {
        let mut realm = Realm::new();
        let a = realm.new_array(vec![JsValue::Int(1), JsValue::Int(2)]);
        assert_eq!(realm.get(a, "1").unwrap(), JsValue::Int(2));
        assert_eq!(realm.get(a, "length").unwrap(), JsValue::Int(2));
        let length = realm
            .heap()
            .get_own_property_descriptor(a, &"length".into())
            .unwrap()
            .unwrap();
        assert!(!length.is_enumerable());
        // `map` comes from Array.prototype, not an own property.
        assert!(!realm.heap().has_own(a, &"map".into()).unwrap());
        assert!(realm.get(a, "map").unwrap().is_callable());
    }

    #[test]
    fn typed_array_views_fresh_buffer() {
        let mut realm = Realm::new();
        let view = realm.new_typed_array(TypedArrayKind::Uint32, 4).unwrap();
        assert!(realm.heap().is_binary_view(view));
        let o = realm.heap().get(view).unwrap().as_ordinary().unwrap();
        assert_eq!(o.view_element_count(), 4);
    }

    #[test]
    fn oversized_buffers_are_range_errors() {
        let mut realm = Realm::new();
        let before = realm.heap().len();
        assert!(matches!(
            realm.new_typed_array(TypedArrayKind::Float64, usize::MAX / 2),
            Err(ObjectError::RangeError(_))
        ));
        assert!(matches!(
            realm.new_array_buffer(usize::MAX),
            Err(ObjectError::RangeError(_))
        ));
        assert_eq!(realm.heap().len(), before);
    }

    #[test]
    fn weak_map_rejects_primitive_keys() {
        let mut realm = Realm::new();
        let wm = realm.new_weak_map();
        assert!(
            realm
                .heap_mut()
                .collection_insert(wm, JsValue::Int(1), JsValue::Null)
                .is_err()
        );
        let key = realm.new_object();
        realm
            .heap_mut()
            .collection_insert(wm, JsValue::Object(key), JsValue::Null)
            .unwrap();
    }

    #[test]
    fn error_message_is_own_hidden() {
        let mut realm = Realm::new();
        let e = realm.new_error("boom");
        let d = realm
            .heap()
            .get_own_property_descriptor(e, &"message".into())
            .unwrap()
            .unwrap();
        assert_eq!(d.value(), Some(&JsValue::Str("boom".to_string())));
        assert!(!d.is_enumerable());
    }
}
