#![no_main]

use deep_lock::graph_locker::DeepLocker;
use deep_lock::object_model::{FunctionKind, JsValue, ObjectHandle, TypedArrayKind};
use deep_lock::{LockAction, Realm, verify_lock};
use libfuzzer_sys::fuzz_target;

const MAX_NODES: usize = 32;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let action = LockAction::ALL[usize::from(data[0]) % LockAction::ALL.len()];
    let node_count = usize::from(data[1]) % MAX_NODES + 1;

    let mut realm = Realm::new();
    let nodes: Vec<ObjectHandle> = (0..node_count)
        .map(|i| match byte(data, i + 2) % 4 {
            0 => realm.new_array(Vec::new()),
            1 => realm
                .new_function("f", FunctionKind::Normal)
                .as_handle()
                .unwrap_or_else(|| realm.new_object()),
            _ => realm.new_object(),
        })
        .collect();

    // Remaining bytes in triples: (from, to, key); a high `to` byte places
    // a binary view instead of an edge between nodes.
    let edges = data.get(node_count + 2..).unwrap_or_default();
    for chunk in edges.chunks_exact(3) {
        let from = nodes[usize::from(chunk[0]) % node_count];
        let key = format!("k{}", chunk[2] % 8);
        let value = if chunk[1] >= 0xF0 {
            let Ok(view) = realm.new_typed_array(TypedArrayKind::Uint8, usize::from(chunk[1] & 3))
            else {
                continue;
            };
            JsValue::Object(view)
        } else {
            realm.heap().value_of(nodes[usize::from(chunk[1]) % node_count])
        };
        let _ = realm.set(from, key, value);
    }

    let root = realm.heap().value_of(nodes[0]);
    let report = DeepLocker::default()
        .lock_with_action(&mut realm, root.clone(), action)
        .expect("ordinary graphs lock without failure");
    assert!(report.stats.nodes_locked as usize <= node_count * 2);

    let verdict = verify_lock(&realm, &root, action).expect("verification reads only ordinary nodes");
    assert!(verdict.is_clean(), "{:?}", verdict.violations);
    assert_eq!(verdict.checked, report.stats.nodes_locked);
});

fn byte(data: &[u8], index: usize) -> u8 {
    data.get(index).copied().unwrap_or(0)
}
