//! Property tests: any sequence of writes leaves every instance, and a
//! freshly opened one, with the same view of the store.

use std::time::Duration;

use kvsync::{sync_step, LocalBus, MemoryBackend, MigrationEngine, Mirror, Store, StoredRecord};
use proptest::prelude::*;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
enum Op {
    Set(String, i64),
    Delete(String),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    let key = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string);
    prop_oneof![
        6 => (key.clone(), any::<i64>()).prop_map(|(k, v)| Op::Set(k, v)),
        3 => key.prop_map(Op::Delete),
        1 => Just(Op::Clear),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn mirror_of(store: &Store) -> Mirror {
    store.entries().get().into_iter().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn instances_converge(ops in prop::collection::vec((op(), any::<bool>()), 1..24)) {
        let (a_view, b_view, fresh_view, expected) = runtime().block_on(async {
            let (backend, bus) = (MemoryBackend::new(), LocalBus::new());
            let a = Store::builder(backend.clone(), bus.clone()).name("p").open();
            let b = Store::builder(backend.clone(), bus.clone()).name("p").open();
            a.suspend_until_init().await.unwrap();
            b.suspend_until_init().await.unwrap();

            let mut expected = Mirror::new();
            for (op, on_a) in ops {
                let target = if on_a { &a } else { &b };
                match op {
                    Op::Set(k, v) => {
                        expected.insert(k.clone(), json!(v));
                        target.set(k, json!(v)).await.unwrap();
                    }
                    Op::Delete(k) => {
                        expected.remove(&k);
                        target.delete(k).await.unwrap();
                    }
                    Op::Clear => {
                        expected.clear();
                        target.clear().await.unwrap();
                    }
                }
                // Serial writes: let the sibling catch up before the next one.
                let mut a_entries = a.entries();
                let mut b_entries = b.entries();
                let want: Vec<(String, Value)> =
                    expected.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let _ = tokio::time::timeout(Duration::from_secs(2), async {
                    a_entries.wait_for(|e| *e == want).await.ok();
                    b_entries.wait_for(|e| *e == want).await.ok();
                })
                .await;
            }

            let fresh = Store::builder(backend, bus).name("p").open();
            fresh.suspend_until_init().await.unwrap();
            (mirror_of(&a), mirror_of(&b), mirror_of(&fresh), expected)
        });

        prop_assert_eq!(&a_view, &expected);
        prop_assert_eq!(&b_view, &expected);
        prop_assert_eq!(&fresh_view, &expected);
    }

    #[test]
    fn migration_runs_exactly_the_pending_steps(
        stored in 0u32..6,
        target in 0u32..6,
        registered in prop::collection::btree_set(1u32..6, 0..6),
    ) {
        let migrated = runtime().block_on(async {
            let mut engine = MigrationEngine::new(target);
            for version in &registered {
                let version = *version;
                engine.register(version, sync_step(move |mut v| {
                    if let Some(trail) = v.as_array_mut() {
                        trail.push(json!(version));
                    }
                    Ok(v)
                }));
            }
            engine.migrate(StoredRecord::for_version(stored, json!([]))).await.unwrap()
        });

        let expected: Vec<Value> = registered
            .iter()
            .filter(|v| **v > stored && **v <= target)
            .map(|v| json!(v))
            .collect();
        prop_assert_eq!(migrated.value, Value::Array(expected));
        prop_assert_eq!(migrated.write_back, stored < target);
        prop_assert_eq!(migrated.version, stored.max(target));
    }
}
