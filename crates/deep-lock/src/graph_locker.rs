//! Cycle-safe deep lock traversal.
//!
//! Walks every object or function reachable from a root through *own*
//! properties (string and symbol keyed, enumerable or not) and applies one
//! lock action to each node exactly once.  Prototype links are never
//! followed and binary views are opaque leaves.
//!
//! The walk is depth-first pre-order.  It runs on an explicit work stack so
//! deep graphs cannot exhaust the native stack; children are pushed in
//! reverse key order, which reproduces the visiting order of the recursive
//! formulation exactly (and therefore which nodes end up locked if a lock
//! primitive fails halfway).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DeepLockError;
use crate::lock_action::{DeepLockOptions, LockAction, resolve_action};
use crate::object_model::{
    JsValue, ObjectError, ObjectHandle, ObjectHeap, ObjectKind, PropertyKey, array_index,
};
use crate::realm::Realm;

/// Component name stamped on every event.
pub const COMPONENT: &str = "deep_lock";

/// Path of the traversal root.
pub const ROOT_PATH: &str = "$";

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c == '$' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
}

/// Append a string-keyed segment: `$.a`, `$[0]`, `$["two words"]`.
pub fn join_path(parent: &str, key: &str) -> String {
    if array_index(key).is_some() {
        format!("{parent}[{key}]")
    } else if is_identifier(key) {
        format!("{parent}.{key}")
    } else {
        format!("{parent}[{}]", serde_json::Value::String(key.to_string()))
    }
}

/// Append any own-property key; symbols render by description.
pub fn key_path(heap: &ObjectHeap, parent: &str, key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(s) => join_path(parent, s),
        PropertyKey::Symbol(id) => match heap.symbol_description(*id) {
            Some(desc) => format!("{parent}[Symbol({desc})]"),
            None => format!("{parent}[Symbol({})]", id.0),
        },
    }
}

// ---------------------------------------------------------------------------
// Child enumeration shared with the verifier
// ---------------------------------------------------------------------------

/// Own-property edges of one node, split by how the traversal treats them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildNodes {
    /// Object/function values to descend into, in `[[OwnPropertyKeys]]` order.
    pub edges: Vec<(PropertyKey, ObjectHandle)>,
    /// Binary views found as property values; never descended into.
    pub binary_views: Vec<(PropertyKey, ObjectHandle)>,
}

/// Enumerate the own-property children of `handle`.
///
/// Reads each own key's value without touching the prototype chain.
/// Primitives and `null` are skipped; accessors yield nothing unless their
/// getter is `%ThrowTypeError%`, in which case the read fails.
pub fn child_nodes(heap: &ObjectHeap, handle: ObjectHandle) -> Result<ChildNodes, ObjectError> {
    let mut children = ChildNodes::default();
    for key in heap.own_property_keys(handle)? {
        if !heap.has_own(handle, &key)? {
            continue;
        }
        let Some(child) = heap.get_own_value(handle, &key)?.and_then(|v| v.as_handle()) else {
            continue;
        };
        if heap.is_binary_view(child) {
            children.binary_views.push((key, child));
        } else {
            children.edges.push((key, child));
        }
    }
    Ok(children)
}

// ---------------------------------------------------------------------------
// LockerConfig / LockEvent / LockStats
// ---------------------------------------------------------------------------

/// Configuration for a [`DeepLocker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockerConfig {
    /// Trace identifier stamped on every event.
    pub trace_id: String,
    /// Emit one event per visited node (`node_locked`, `cycle_skipped`,
    /// `binary_view_skipped`).  Summary events are always emitted.
    pub emit_node_events: bool,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            trace_id: "deep-lock".to_string(),
            emit_node_events: true,
        }
    }
}

/// Structured event emitted by the locker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    /// Monotonic sequence number for deterministic ordering.
    pub sequence: u64,
    pub trace_id: String,
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
    pub action: Option<LockAction>,
    pub handle: Option<u32>,
    pub path: Option<String>,
}

/// Counters from one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Distinct nodes the action was applied to.
    pub nodes_locked: u64,
    /// Edges that led back to an already visited node.
    pub revisits_skipped: u64,
    /// Binary-view property values left untouched.
    pub binary_views_skipped: u64,
    /// Times the walk stopped at `%Function.prototype%`.
    pub restricted_stops: u64,
}

/// One locked node and the first path it was reached by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedNode {
    pub handle: ObjectHandle,
    pub path: String,
    pub kind: Option<ObjectKind>,
}

/// Outcome of a successful traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReport {
    pub action: LockAction,
    /// The value passed in, returned unchanged in identity.
    pub root: JsValue,
    pub stats: LockStats,
    /// Locked nodes in visiting order.
    pub locked: Vec<LockedNode>,
}

impl LockReport {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Plain data with string map keys: serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn canonical_hash(&self) -> String {
        let digest = Sha256::digest(self.canonical_bytes());
        format!("sha256:{}", hex::encode(digest))
    }

    /// Was `handle` locked by this traversal?
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.locked.iter().any(|n| n.handle == handle)
    }
}

// ---------------------------------------------------------------------------
// DeepLocker
// ---------------------------------------------------------------------------

/// Stateful entry point: resolves options, runs traversals and keeps the
/// structured events they emit until drained.
#[derive(Debug, Clone, Default)]
pub struct DeepLocker {
    config: LockerConfig,
    event_sequence: u64,
    events: Vec<LockEvent>,
}

impl DeepLocker {
    pub fn new(config: LockerConfig) -> Self {
        Self {
            config,
            event_sequence: 0,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &LockerConfig {
        &self.config
    }

    /// Accumulated events, oldest first.
    pub fn events(&self) -> &[LockEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LockEvent> {
        std::mem::take(&mut self.events)
    }

    /// Lock everything reachable from `value` and return `value`.
    pub fn lock(
        &mut self,
        realm: &mut Realm,
        value: JsValue,
        options: Option<&DeepLockOptions>,
    ) -> Result<JsValue, DeepLockError> {
        Ok(self.lock_with_report(realm, value, options)?.root)
    }

    /// Resolve `options`, then lock; returns the full report.
    pub fn lock_with_report(
        &mut self,
        realm: &mut Realm,
        value: JsValue,
        options: Option<&DeepLockOptions>,
    ) -> Result<LockReport, DeepLockError> {
        let action = match resolve_action(options) {
            Ok(action) => action,
            Err(err) => {
                self.emit("action_rejected", "failure", Some(err.error_code()), None, None, None);
                return Err(err);
            }
        };
        self.emit("action_resolved", "success", None, Some(action), None, None);
        self.lock_with_action(realm, value, action)
    }

    /// Lock with an already resolved action.
    pub fn lock_with_action(
        &mut self,
        realm: &mut Realm,
        value: JsValue,
        action: LockAction,
    ) -> Result<LockReport, DeepLockError> {
        let mut stats = LockStats::default();
        let mut locked = Vec::new();

        if let Some(root) = value.as_handle() {
            self.traverse(realm, root, action, &mut stats, &mut locked)?;
        }

        self.emit(
            "traversal_complete",
            "success",
            None,
            Some(action),
            value.as_handle(),
            None,
        );
        Ok(LockReport {
            action,
            root: value,
            stats,
            locked,
        })
    }

    fn traverse(
        &mut self,
        realm: &mut Realm,
        root: ObjectHandle,
        action: LockAction,
        stats: &mut LockStats,
        locked: &mut Vec<LockedNode>,
    ) -> Result<(), DeepLockError> {
        let function_prototype = realm.intrinsics().function_prototype;
        let heap = realm.heap_mut();
        let mut visited: BTreeSet<ObjectHandle> = BTreeSet::new();
        let mut work: Vec<(ObjectHandle, String)> = vec![(root, ROOT_PATH.to_string())];

        while let Some((handle, path)) = work.pop() {
            if visited.contains(&handle) {
                stats.revisits_skipped += 1;
                self.emit_node("cycle_skipped", action, handle, path);
                continue;
            }

            if let Err(source) = action.apply(heap, handle) {
                return Err(self.fail(action, handle, path, source));
            }
            visited.insert(handle);
            stats.nodes_locked += 1;
            locked.push(LockedNode {
                handle,
                path: path.clone(),
                kind: heap.kind(handle).ok().flatten(),
            });
            self.emit_node("node_locked", action, handle, path.clone());

            // Reading Function.prototype's `caller`/`arguments` throws.
            if handle == function_prototype {
                stats.restricted_stops += 1;
                self.emit(
                    "restricted_stop",
                    "success",
                    None,
                    Some(action),
                    Some(handle),
                    Some(path),
                );
                continue;
            }

            let children = match child_nodes(heap, handle) {
                Ok(children) => children,
                Err(source) => return Err(self.fail(action, handle, path, source)),
            };
            for (key, view) in children.binary_views {
                stats.binary_views_skipped += 1;
                let view_path = key_path(heap, &path, &key);
                self.emit_node("binary_view_skipped", action, view, view_path);
            }
            for (key, child) in children.edges.into_iter().rev() {
                let next = key_path(heap, &path, &key);
                work.push((child, next));
            }
        }
        Ok(())
    }

    fn fail(
        &mut self,
        action: LockAction,
        handle: ObjectHandle,
        path: String,
        source: ObjectError,
    ) -> DeepLockError {
        let err = DeepLockError::UnexpectedLockFailure { handle, source };
        self.emit(
            "lock_failed",
            "failure",
            Some(err.error_code()),
            Some(action),
            Some(handle),
            Some(path),
        );
        err
    }

    fn emit_node(&mut self, event: &str, action: LockAction, handle: ObjectHandle, path: String) {
        if self.config.emit_node_events {
            self.emit(event, "success", None, Some(action), Some(handle), Some(path));
        }
    }

    fn emit(
        &mut self,
        event: &str,
        outcome: &str,
        error_code: Option<&str>,
        action: Option<LockAction>,
        handle: Option<ObjectHandle>,
        path: Option<String>,
    ) {
        self.event_sequence += 1;
        self.events.push(LockEvent {
            sequence: self.event_sequence,
            trace_id: self.config.trace_id.clone(),
            component: COMPONENT.to_string(),
            event: event.to_string(),
            outcome: outcome.to_string(),
            error_code: error_code.map(str::to_string),
            action,
            handle: handle.map(|h| h.0),
            path,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
