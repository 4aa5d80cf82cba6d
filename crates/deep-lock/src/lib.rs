#![forbid(unsafe_code)]

//! Deep freeze / seal / preventExtensions over an ES2020 object heap.
//!
//! [`deep_lock`] applies one lock action to a value and to every object or
//! function reachable from it through own properties, guarding against
//! cycles by identity.  [`deep_freeze`] and [`deep_lock_as`] additionally
//! hand back a read-only view when the action is `freeze`.

pub mod error;
pub mod graph_locker;
pub mod json_graph;
pub mod lock_action;
pub mod lock_verifier;
pub mod object_model;
pub mod probe_cli;
pub mod readonly_projection;
pub mod realm;

pub use error::DeepLockError;
pub use graph_locker::{DeepLocker, LockEvent, LockReport, LockStats, LockerConfig};
pub use lock_action::{DeepLockOptions, LockAction, Mutation, resolve_action};
pub use lock_verifier::{LockState, LockVerdict, verify_lock};
pub use object_model::{JsValue, ObjectError, ObjectHandle, PropertyKey};
pub use readonly_projection::{DeepReadonly, LockMode, TypeShape, deep_readonly};
pub use realm::Realm;

/// Lock `value` and everything reachable from it, returning `value`.
///
/// `options.action` selects `freeze` (default), `seal` or
/// `preventExtensions`.  An unrecognized action fails before any node is
/// touched.
pub fn deep_lock(
    realm: &mut Realm,
    value: JsValue,
    options: Option<&DeepLockOptions>,
) -> Result<JsValue, DeepLockError> {
    DeepLocker::default().lock(realm, value, options)
}

/// Deep-freeze `value` and return it behind a read-only view.
pub fn deep_freeze(realm: &mut Realm, value: JsValue) -> Result<DeepReadonly, DeepLockError> {
    deep_lock_as::<readonly_projection::Freeze>(realm, value)
}

/// Lock with an action fixed at compile time; the output type follows the
/// action (`Freeze` yields [`DeepReadonly`], the others the plain value).
pub fn deep_lock_as<A: LockMode>(
    realm: &mut Realm,
    value: JsValue,
) -> Result<A::Output, DeepLockError> {
    let report = DeepLocker::default().lock_with_action(realm, value, A::ACTION)?;
    Ok(A::project(report.root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readonly_projection::{PreventExtensions, Seal};

    #[test]
    fn deep_lock_returns_same_value() {
        let mut realm = Realm::new();
        let root = realm.new_object();
        let out = deep_lock(&mut realm, JsValue::Object(root), None).unwrap();
        assert_eq!(out, JsValue::Object(root));
        assert!(realm.heap().is_frozen(root).unwrap());
    }

    #[test]
    fn typed_entry_points_follow_action() {
        let mut realm = Realm::new();
        let a = realm.new_object();
        let b = realm.new_object();
        let c = realm.new_object();

        let frozen: DeepReadonly = deep_freeze(&mut realm, JsValue::Object(a)).unwrap();
        assert_eq!(frozen.value(), &JsValue::Object(a));

        let sealed: JsValue = deep_lock_as::<Seal>(&mut realm, JsValue::Object(b)).unwrap();
        assert_eq!(sealed, JsValue::Object(b));
        assert!(realm.heap().is_sealed(b).unwrap());

        let closed: JsValue =
            deep_lock_as::<PreventExtensions>(&mut realm, JsValue::Object(c)).unwrap();
        assert_eq!(closed, JsValue::Object(c));
        assert!(!realm.heap().is_extensible(c).unwrap());
    }
}
