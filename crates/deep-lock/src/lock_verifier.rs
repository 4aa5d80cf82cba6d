//! Post-condition check for a deep lock.
//!
//! Walks the same nodes the locker would (own properties, no prototype
//! links, binary views skipped, `%Function.prototype%` not enumerated) and
//! reports every node whose lock state is weaker than the action requires.
//! The heap is only read.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph_locker::{ROOT_PATH, child_nodes, key_path};
use crate::lock_action::LockAction;
use crate::object_model::{JsValue, ObjectError, ObjectHandle, ObjectHeap};
use crate::realm::Realm;

/// Observed integrity level of one object.  Ordered weakest first; each
/// level implies the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Extensible,
    NonExtensible,
    Sealed,
    Frozen,
}

impl LockState {
    pub fn observe(heap: &ObjectHeap, handle: ObjectHandle) -> Result<Self, ObjectError> {
        if heap.is_frozen(handle)? {
            Ok(Self::Frozen)
        } else if heap.is_sealed(handle)? {
            Ok(Self::Sealed)
        } else if !heap.is_extensible(handle)? {
            Ok(Self::NonExtensible)
        } else {
            Ok(Self::Extensible)
        }
    }

    /// Weakest state meeting `action`'s guarantees.
    pub fn required_by(action: LockAction) -> Self {
        match action {
            LockAction::PreventExtensions => Self::NonExtensible,
            LockAction::Seal => Self::Sealed,
            LockAction::Freeze => Self::Frozen,
        }
    }

    pub fn satisfies(self, action: LockAction) -> bool {
        self >= Self::required_by(action)
    }
}

/// A reachable node that does not meet the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockViolation {
    pub handle: ObjectHandle,
    pub path: String,
    pub observed: LockState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockVerdict {
    pub action: LockAction,
    /// Distinct nodes inspected.
    pub checked: u64,
    pub violations: Vec<LockViolation>,
}

impl LockVerdict {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every node reachable from `root` against `action`.
pub fn verify_lock(
    realm: &Realm,
    root: &JsValue,
    action: LockAction,
) -> Result<LockVerdict, ObjectError> {
    let mut verdict = LockVerdict {
        action,
        checked: 0,
        violations: Vec::new(),
    };
    let Some(root) = root.as_handle() else {
        return Ok(verdict);
    };

    let heap = realm.heap();
    let function_prototype = realm.intrinsics().function_prototype;
    let mut visited: BTreeSet<ObjectHandle> = BTreeSet::new();
    let mut work: Vec<(ObjectHandle, String)> = vec![(root, ROOT_PATH.to_string())];

    while let Some((handle, path)) = work.pop() {
        if !visited.insert(handle) {
            continue;
        }
        verdict.checked += 1;

        let observed = LockState::observe(heap, handle)?;
        if !observed.satisfies(action) {
            verdict.violations.push(LockViolation {
                handle,
                path: path.clone(),
                observed,
            });
        }

        if handle == function_prototype {
            continue;
        }
        let children = child_nodes(heap, handle)?;
        for (key, child) in children.edges.into_iter().rev() {
            work.push((child, key_path(heap, &path, &key)));
        }
    }

    Ok(verdict)
}
