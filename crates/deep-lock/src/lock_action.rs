//! Lock actions and the action resolver.
//!
//! | action            | add | modify | delete | reconfigure |
//! | ----------------- | --- | ------ | ------ | ----------- |
//! | preventExtensions |  -  |   +    |   +    |      +      |
//! | seal              |  -  |   +    |   -    |      -      |
//! | freeze            |  -  |   -    |   -    |      -      |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeepLockError;
use crate::object_model::{ObjectError, ObjectHandle, ObjectHeap};

// ---------------------------------------------------------------------------
// Mutation / LockAction
// ---------------------------------------------------------------------------

/// Kinds of mutation the permission matrix rules on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    AddProperty,
    ModifyValue,
    DeleteProperty,
    ReconfigureProperty,
}

impl Mutation {
    pub const ALL: [Mutation; 4] = [
        Self::AddProperty,
        Self::ModifyValue,
        Self::DeleteProperty,
        Self::ReconfigureProperty,
    ];
}

/// Immutability strength applied to every node.  Ordered weakest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum LockAction {
    PreventExtensions,
    Seal,
    #[default]
    Freeze,
}

impl LockAction {
    pub const ALL: [LockAction; 3] = [Self::PreventExtensions, Self::Seal, Self::Freeze];

    /// Name as accepted in `options.action`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreventExtensions => "preventExtensions",
            Self::Seal => "seal",
            Self::Freeze => "freeze",
        }
    }

    /// Recognize an action name (case-sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "freeze" => Some(Self::Freeze),
            "seal" => Some(Self::Seal),
            "preventExtensions" => Some(Self::PreventExtensions),
            _ => None,
        }
    }

    /// Permission matrix lookup.
    pub fn permits(self, mutation: Mutation) -> bool {
        match (self, mutation) {
            (_, Mutation::AddProperty) => false,
            (Self::PreventExtensions, _) => true,
            (Self::Seal, Mutation::ModifyValue) => true,
            (Self::Seal, _) | (Self::Freeze, _) => false,
        }
    }

    /// Apply the matching lock primitive to one object.  Reapplying to an
    /// already locked object is a no-op.
    pub fn apply(self, heap: &mut ObjectHeap, handle: ObjectHandle) -> Result<(), ObjectError> {
        match self {
            Self::PreventExtensions => heap.prevent_extensions(handle),
            Self::Seal => heap.seal(handle),
            Self::Freeze => heap.freeze(handle),
        }
    }

    /// Does `handle` currently satisfy this action's guarantees?
    pub fn is_satisfied_by(
        self,
        heap: &ObjectHeap,
        handle: ObjectHandle,
    ) -> Result<bool, ObjectError> {
        match self {
            Self::PreventExtensions => Ok(!heap.is_extensible(handle)?),
            Self::Seal => heap.is_sealed(handle),
            Self::Freeze => heap.is_frozen(handle),
        }
    }
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockAction {
    type Err = DeepLockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| DeepLockError::InvalidAction {
            action: s.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// DeepLockOptions
// ---------------------------------------------------------------------------

/// Options accepted by `deep_lock`.  Only `action` is recognized; other
/// fields are ignored.  The raw JSON value is kept so the resolver can
/// apply the same truthiness rules a dynamic caller would expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepLockOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
}

impl DeepLockOptions {
    pub fn with_action(action: LockAction) -> Self {
        Self {
            action: Some(Value::String(action.as_str().to_string())),
        }
    }

    /// Options naming an arbitrary (possibly unrecognized) action.
    pub fn with_action_name(name: &str) -> Self {
        Self {
            action: Some(Value::String(name.to_string())),
        }
    }

    /// Decode options from JSON text.
    pub fn from_json(text: &str) -> Result<Self, DeepLockError> {
        serde_json::from_str(text).map_err(|e| DeepLockError::InvalidOptions {
            detail: e.to_string(),
        })
    }
}

/// JSON falsiness: `null`, `false`, `0` and `""` count as "no action given".
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Resolve the requested action, defaulting to `freeze`.
pub fn resolve_action(options: Option<&DeepLockOptions>) -> Result<LockAction, DeepLockError> {
    let Some(requested) = options.and_then(|o| o.action.as_ref()) else {
        return Ok(LockAction::Freeze);
    };
    if is_falsy(requested) {
        return Ok(LockAction::Freeze);
    }
    match requested {
        Value::String(name) => name.parse(),
        other => Err(DeepLockError::InvalidAction {
            action: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn permission_matrix() {
        let expected = [
            (LockAction::PreventExtensions, [false, true, true, true]),
            (LockAction::Seal, [false, true, false, false]),
            (LockAction::Freeze, [false, false, false, false]),
        ];
        for (action, row) in expected {
            for (mutation, allowed) in Mutation::ALL.into_iter().zip(row) {
                assert_eq!(action.permits(mutation), allowed, "{action} {mutation:?}");
            }
        }
    }

    #[test]
    fn resolver_defaults_to_freeze() {
        assert_eq!(resolve_action(None).unwrap(), LockAction::Freeze);
        assert_eq!(
            resolve_action(Some(&DeepLockOptions::default())).unwrap(),
            LockAction::Freeze
        );
        for falsy in [json!(null), json!(false), json!(0), json!("")] {
            let options = DeepLockOptions {
                action: Some(falsy),
            };
            assert_eq!(resolve_action(Some(&options)).unwrap(), LockAction::Freeze);
        }
    }

    #[test]
    fn resolver_accepts_all_names() {
        for action in LockAction::ALL {
            let options = DeepLockOptions::with_action(action);
            assert_eq!(resolve_action(Some(&options)).unwrap(), action);
        }
    }

    #[test]
    fn resolver_rejects_unknown_names() {
        let err = resolve_action(Some(&DeepLockOptions::with_action_name("Freeze"))).unwrap_err();
        assert_eq!(
            err,
            DeepLockError::InvalidAction {
                action: "Freeze".to_string()
            }
        );
        let err = resolve_action(Some(&DeepLockOptions {
            action: Some(json!(5)),
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "Options action can't be 5");
    }

    #[test]
    fn options_from_json_ignores_unknown_fields() {
        let options = DeepLockOptions::from_json(r#"{"action":"seal","depth":3}"#).unwrap();
        assert_eq!(resolve_action(Some(&options)).unwrap(), LockAction::Seal);
        let empty = DeepLockOptions::from_json("{}").unwrap();
        assert_eq!(empty, DeepLockOptions::default());
        let err = DeepLockOptions::from_json("[").unwrap_err();
        assert_eq!(err.error_code(), "FE-DLOCK-0003");
    }

    #[test]
    fn action_serde_uses_option_names() {
        assert_eq!(
            serde_json::to_string(&LockAction::PreventExtensions).unwrap(),
            "\"preventExtensions\""
        );
        let back: LockAction = serde_json::from_str("\"seal\"").unwrap();
        assert_eq!(back, LockAction::Seal);
        assert_eq!("freeze".parse::<LockAction>().unwrap(), LockAction::Freeze);
    }
}
