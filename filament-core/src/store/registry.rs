//! Named store registry.
//!
//! Maps store names to membrane roots so whole-process snapshots can be
//! taken and restored by name. The registry is thread-local, matching the
//! single-threaded execution model of the cell runtime; a host serving
//! multiple logical sessions on one thread must call [`clear`] between
//! sessions, the registry does not isolate them automatically.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::Error;
use crate::membrane::{ObjectMembrane, Template};
use crate::reactive::panic_message;

/// A registered store: its membrane root plus the template it was built
/// from, kept so a receiving side can rebuild computed fields.
#[derive(Clone)]
pub struct StoreEntry {
    pub root: ObjectMembrane,
    pub template: Option<Template>,
}

thread_local! {
    static STORES: RefCell<IndexMap<String, StoreEntry>> = RefCell::new(IndexMap::new());
}

/// Register a membrane root under a name.
///
/// An empty name is a programmer error and fails synchronously. A name
/// collision overwrites the previous entry with a warning.
pub fn register(
    name: impl Into<String>,
    root: ObjectMembrane,
    template: Option<Template>,
) -> Result<(), Error> {
    let name = name.into();
    if name.is_empty() {
        return Err(Error::EmptyStoreName);
    }
    STORES.with(|stores| {
        if stores
            .borrow_mut()
            .insert(name.clone(), StoreEntry { root, template })
            .is_some()
        {
            warn!(store = %name, "store name already registered, overwriting");
        }
    });
    Ok(())
}

/// Remove a registered store. No-op for unknown names.
pub fn unregister(name: &str) {
    STORES.with(|stores| {
        stores.borrow_mut().shift_remove(name);
    });
}

/// Look up a registered store's membrane root.
pub fn get(name: &str) -> Option<ObjectMembrane> {
    STORES.with(|stores| stores.borrow().get(name).map(|entry| entry.root.clone()))
}

/// Look up a registered store's template.
pub fn get_template(name: &str) -> Option<Template> {
    STORES.with(|stores| {
        stores
            .borrow()
            .get(name)
            .and_then(|entry| entry.template.clone())
    })
}

/// The registered store names, in registration order.
pub fn names() -> Vec<String> {
    STORES.with(|stores| stores.borrow().keys().cloned().collect())
}

/// Drop every registered store. Hosts multiplexing sessions call this at
/// session boundaries.
pub fn clear() {
    STORES.with(|stores| stores.borrow_mut().clear());
}

/// Snapshot a membrane root into plain JSON.
///
/// Derived-backed fields are omitted and cycles serialize as `null`; see
/// [`ObjectMembrane::to_json`].
pub fn serialize(root: &ObjectMembrane) -> Value {
    root.to_json()
}

/// Restore a membrane root from a snapshot produced by [`serialize`].
///
/// Derived-backed fields named in the snapshot are ignored, so a stale or
/// hostile snapshot cannot overwrite a computed field.
pub fn deserialize(root: &ObjectMembrane, snapshot: &Value) -> Result<(), Error> {
    root.restore(snapshot)
}

/// Snapshot every registered store into a name → snapshot map.
///
/// A panic while serializing one store is caught and logged; that name is
/// absent from the result and the other stores still serialize.
pub fn serialize_all() -> Value {
    let entries: Vec<(String, ObjectMembrane)> = STORES.with(|stores| {
        stores
            .borrow()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.root.clone()))
            .collect()
    });

    let mut out = serde_json::Map::new();
    for (name, root) in entries {
        match catch_unwind(AssertUnwindSafe(|| serialize(&root))) {
            Ok(snapshot) => {
                out.insert(name, snapshot);
            }
            Err(payload) => {
                error!(store = %name, panic = %panic_message(&*payload), "failed to serialize store");
            }
        }
    }
    Value::Object(out)
}

/// Restore every registered store named in `snapshots`.
///
/// A failure restoring one store is logged and leaves that store
/// unchanged; the other stores still restore. Unknown names are skipped
/// with a warning.
pub fn deserialize_all(snapshots: &Value) -> Result<(), Error> {
    let map = snapshots.as_object().ok_or(Error::InvalidSnapshot)?;

    for (name, snapshot) in map {
        let Some(root) = get(name) else {
            warn!(store = %name, "snapshot names an unregistered store, skipping");
            continue;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| deserialize(&root, snapshot)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(store = %name, error = %err, "failed to restore store");
            }
            Err(payload) => {
                error!(store = %name, panic = %panic_message(&*payload), "failed to restore store");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root_from(value: Value) -> ObjectMembrane {
        ObjectMembrane::from_map(value.as_object().unwrap().clone())
    }

    #[test]
    fn register_rejects_empty_names() {
        let root = root_from(json!({}));
        assert!(matches!(
            register("", root, None),
            Err(Error::EmptyStoreName)
        ));
    }

    #[test]
    fn register_and_lookup() {
        clear();
        let root = root_from(json!({"n": 1}));
        register("app", root.clone(), None).unwrap();

        let found = get("app").unwrap();
        assert!(found.ptr_eq(&root));
        assert_eq!(names(), vec!["app"]);

        unregister("app");
        assert!(get("app").is_none());
    }

    #[test]
    fn collision_overwrites() {
        clear();
        let first = root_from(json!({"v": 1}));
        let second = root_from(json!({"v": 2}));
        register("dup", first, None).unwrap();
        register("dup", second.clone(), None).unwrap();

        assert!(get("dup").unwrap().ptr_eq(&second));
        assert_eq!(names().len(), 1);
    }

    #[test]
    fn stored_template_rebuilds_a_fresh_root() {
        clear();
        let template = Template::object([
            ("count", Template::value(2)),
            (
                "doubled",
                Template::computed(|m: &ObjectMembrane| {
                    json!(m.get("count").as_i64().unwrap_or(0) * 2)
                }),
            ),
        ]);
        let root = ObjectMembrane::from_template(template.clone()).unwrap();
        register("counter", root.clone(), Some(template)).unwrap();

        root.set("count", json!(8)).unwrap();
        let snapshot = serialize(&root);

        // A receiving side rebuilds the shape from the registered template,
        // then restores plain fields; computed fields recompute.
        let fresh =
            ObjectMembrane::from_template(get_template("counter").unwrap()).unwrap();
        deserialize(&fresh, &snapshot).unwrap();

        assert_eq!(fresh.get("count").as_i64(), Some(8));
        assert_eq!(fresh.get("doubled").as_i64(), Some(16));
    }

    #[test]
    fn serialize_all_collects_every_store() {
        clear();
        register("a", root_from(json!({"x": 1})), None).unwrap();
        register("b", root_from(json!({"y": [1, 2]})), None).unwrap();

        let all = serialize_all();
        assert_eq!(all, json!({"a": {"x": 1}, "b": {"y": [1, 2]}}));
    }

    #[test]
    fn deserialize_all_skips_unknown_and_restores_known() {
        clear();
        let root = root_from(json!({"x": 1}));
        register("known", root.clone(), None).unwrap();

        deserialize_all(&json!({
            "known": {"x": 42},
            "ghost": {"x": 0}
        }))
        .unwrap();

        assert_eq!(root.get("x").as_i64(), Some(42));
    }

    #[test]
    fn deserialize_all_rejects_non_objects() {
        assert!(matches!(
            deserialize_all(&json!([1, 2])),
            Err(Error::InvalidSnapshot)
        ));
    }

    #[test]
    fn one_bad_store_does_not_block_the_rest() {
        clear();
        let good = root_from(json!({"x": 1}));
        register("good", good.clone(), None).unwrap();
        register("bad", root_from(json!({"x": 1})), None).unwrap();

        // A snapshot whose shape mismatches a store is logged, not fatal.
        deserialize_all(&json!({
            "bad": {"x": {"deep": true}},
            "good": {"x": 7}
        }))
        .unwrap();

        assert_eq!(good.get("x").as_i64(), Some(7));
    }
}
