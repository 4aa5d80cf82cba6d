//! The read-only projection and the runtime locker must agree: every place
//! the projected type holds a node is a place the locker freezes, and
//! nothing else.  Holds for graphs whose builtins carry no object-valued
//! own properties, since builtin shapes pass through unchanged.

use std::collections::BTreeSet;

use deep_lock::graph_locker::DeepLocker;
use deep_lock::json_graph::import_json;
use deep_lock::readonly_projection::{
    Freeze, PreventExtensions, Seal, generalize_path, is_deep_readonly, mutable_paths,
    node_paths, readonly_paths,
};
use deep_lock::{
    DeepReadonly, JsValue, LockAction, Realm, TypeShape, deep_freeze, deep_lock_as,
    deep_readonly, verify_lock,
};
use serde_json::{Value, json};

fn documents() -> Vec<Value> {
    vec![
        json!({}),
        json!({"p1": {"p2": {"p3": {"num": 1}}}}),
        json!({"list": [{"x": 1}, {"y": [true, null]}], "name": "n"}),
        json!({"two words": {"0": {}}, "matrix": [[1, 2], [3]]}),
        json!([{"a": {}}, [], "tail"]),
    ]
}

fn generalized(paths: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    paths.into_iter().map(|p| generalize_path(&p)).collect()
}

#[test]
fn locked_nodes_match_projected_node_paths() {
    for document in documents() {
        let mut realm = Realm::new();
        let graph = import_json(&mut realm, &document).unwrap();
        let report = DeepLocker::default()
            .lock_with_action(&mut realm, graph.root.clone(), LockAction::Freeze)
            .unwrap();

        let runtime = generalized(report.locked.iter().map(|n| n.path.clone()));
        let projected = generalized(node_paths(&TypeShape::of_json(&document)));
        assert_eq!(runtime, projected, "document {document}");
        assert_eq!(report.stats.nodes_locked as usize, graph.nodes.len());
    }
}

fn linked_documents() -> Vec<Value> {
    vec![
        json!({"self": {"$ref": ""}, "d": {"$kind": "date", "$epoch_ms": 5}}),
        json!({
            "list": [{"x": 1}, {"$ref": "/list/0"}],
            "when": {"$kind": "date"},
            "err": {"$kind": "error", "$message": "m"},
            "back": {"$ref": ""},
            "shared": {"$ref": "/list"}
        }),
        json!({"a": {"b": {"$ref": "/c"}}, "c": {"d": [{"$kind": "map"}, {"$kind": "regexp"}]}}),
        json!({"bytes": {"$kind": "uint8_array", "$length": 2}, "buf": {"$kind": "array_buffer"}}),
    ]
}

#[test]
fn locked_nodes_match_projected_nodes_of_linked_graphs() {
    for document in linked_documents() {
        let mut realm = Realm::new();
        let graph = import_json(&mut realm, &document).unwrap();
        let shape = TypeShape::of_value(&realm, &graph.root).unwrap();
        let report = DeepLocker::default()
            .lock_with_action(&mut realm, graph.root.clone(), LockAction::Freeze)
            .unwrap();

        let runtime = generalized(report.locked.iter().map(|n| n.path.clone()));
        assert_eq!(runtime, generalized(node_paths(&shape)), "document {document}");
        let slots = readonly_paths(&deep_readonly(&shape));
        assert!(
            slots.iter().all(|p| !p.contains("$ref") && !p.contains("$kind")),
            "document {document}: {slots:?}"
        );
    }
}

#[test]
fn linked_graph_shape_resolves_markers() {
    let document = json!({"self": {"$ref": ""}, "d": {"$kind": "date", "$epoch_ms": 5}});
    let mut realm = Realm::new();
    let graph = import_json(&mut realm, &document).unwrap();
    let shape = TypeShape::of_value(&realm, &graph.root).unwrap();
    assert_eq!(
        shape,
        TypeShape::object([("d", TypeShape::Date), ("self", TypeShape::Unknown)])
    );
    let projected = deep_readonly(&shape);
    let expected: BTreeSet<String> = ["$.d", "$.self"].map(String::from).into();
    assert_eq!(readonly_paths(&projected), expected);
}

#[test]
fn heap_shape_matches_document_shape_for_plain_trees() {
    for document in documents() {
        let mut realm = Realm::new();
        let graph = import_json(&mut realm, &document).unwrap();
        assert_eq!(
            TypeShape::of_value(&realm, &graph.root).unwrap(),
            TypeShape::of_json(&document),
            "document {document}"
        );
    }
}

#[test]
fn projection_makes_every_slot_readonly() {
    for document in documents() {
        let shape = TypeShape::of_json(&document);
        let projected = deep_readonly(&shape);
        assert!(is_deep_readonly(&projected));
        assert!(mutable_paths(&projected).is_empty(), "document {document}");
        assert_eq!(readonly_paths(&projected), mutable_paths(&shape));
    }
}

#[test]
fn frozen_graphs_pass_verification() {
    for document in documents() {
        let mut realm = Realm::new();
        let graph = import_json(&mut realm, &document).unwrap();
        let frozen = deep_freeze(&mut realm, graph.root.clone()).unwrap();
        let verdict = verify_lock(&realm, frozen.value(), LockAction::Freeze).unwrap();
        assert!(verdict.is_clean(), "document {document}");
        assert_eq!(verdict.checked as usize, graph.nodes.len());
    }
}

#[test]
fn frozen_view_rejects_writes_and_heap_agrees() {
    let document = json!({"p1": {"p2": {"num": 1}}});
    let mut realm = Realm::new();
    let graph = import_json(&mut realm, &document).unwrap();
    let frozen: DeepReadonly = deep_freeze(&mut realm, graph.root.clone()).unwrap();

    let p2 = frozen.get(&realm, "p1").unwrap().get(&realm, "p2").unwrap();
    assert!(p2.set("num", JsValue::Int(2)).is_err());
    assert_eq!(p2.get(&realm, "num").unwrap().value(), &JsValue::Int(1));

    let p2_handle = graph.node("/p1/p2").unwrap();
    assert!(!realm.set(p2_handle, "num", JsValue::Int(2)).unwrap());
}

#[test]
fn return_type_follows_action() {
    let mut realm = Realm::new();
    let graph = import_json(&mut realm, &json!({"a": {}})).unwrap();
    let root = graph.root.clone();

    let sealed: JsValue = deep_lock_as::<Seal>(&mut realm, root.clone()).unwrap();
    assert_eq!(sealed, root);
    let closed: JsValue = deep_lock_as::<PreventExtensions>(&mut realm, root.clone()).unwrap();
    assert_eq!(closed, root);
    let frozen: DeepReadonly = deep_lock_as::<Freeze>(&mut realm, root.clone()).unwrap();
    assert_eq!(frozen.into_inner(), root);
}

#[test]
fn sealed_tree_keeps_slots_mutable_in_shape_terms() {
    // Seal returns the plain value; its shape is not projected.
    let document = json!({"a": {"b": 1}});
    let shape = TypeShape::of_json(&document);
    assert!(!is_deep_readonly(&shape));

    let mut realm = Realm::new();
    let graph = import_json(&mut realm, &document).unwrap();
    deep_lock_as::<Seal>(&mut realm, graph.root.clone()).unwrap();
    let a = graph.node("/a").unwrap();
    assert!(realm.set(a, "b", JsValue::Int(2)).unwrap());
    assert!(mutable_paths(&shape).contains("$.a.b"));
}
