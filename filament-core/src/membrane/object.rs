//! Object-shaped membrane.
//!
//! Wraps a plain JSON object (or a template with computed/accessor fields)
//! so every field access becomes a cell operation. Fields materialize their
//! cells lazily, on first access; nested objects and arrays become nested
//! membranes stored as the value of the enclosing cell; dynamically added
//! fields are first-class.
//!
//! All access goes through the explicit accessor-dispatch API (`get`, `set`,
//! `has`, `keys`, `delete`, `raw`) backed by an internal field table. Raw
//! cell access accepts the reserved `$` prefix, so `raw("$count")` and
//! `raw("count")` both return the cell for `count`.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::template::{SetterFn, Template};
use super::value::{wrap_into_signal, wrap_value, write_wrapped, FieldValue};
use super::{FieldCell, Membrane, SIGNAL_PREFIX};
use crate::error::Error;
use crate::reactive::{Derived, Signal, SubscriptionId};

/// A field's backing cell, classified by write behavior.
#[derive(Clone)]
pub(crate) enum FieldSlot {
    /// Ordinary reactive cell.
    Plain(Signal<FieldValue>),
    /// Computed field from a bare compute function; plain assignment
    /// replaces it with an ordinary cell.
    Computed(Derived<FieldValue>),
    /// Accessor with a getter and no setter; writes fail.
    ReadOnly(Derived<FieldValue>),
    /// Accessor with getter and setter; writes route through the setter.
    Custom {
        get: Derived<FieldValue>,
        set: SetterFn,
    },
    /// Accessor with only a setter; reads see a plain cell.
    CustomWrite {
        cell: Signal<FieldValue>,
        set: SetterFn,
    },
}

impl FieldSlot {
    fn read(&self) -> FieldValue {
        match self {
            FieldSlot::Plain(sig) => sig.read(),
            FieldSlot::Computed(d) | FieldSlot::ReadOnly(d) => d.read(),
            FieldSlot::Custom { get, .. } => get.read(),
            FieldSlot::CustomWrite { cell, .. } => cell.read(),
        }
    }

    fn peek(&self) -> FieldValue {
        match self {
            FieldSlot::Plain(sig) => sig.peek(),
            FieldSlot::Computed(d) | FieldSlot::ReadOnly(d) => {
                d.peek().unwrap_or(FieldValue::Absent)
            }
            FieldSlot::Custom { get, .. } => get.peek().unwrap_or(FieldValue::Absent),
            FieldSlot::CustomWrite { cell, .. } => cell.peek(),
        }
    }

    fn to_cell(&self) -> FieldCell {
        match self {
            FieldSlot::Plain(sig) => FieldCell::Signal(sig.clone()),
            FieldSlot::Computed(d) | FieldSlot::ReadOnly(d) => FieldCell::Derived(d.clone()),
            FieldSlot::Custom { get, .. } => FieldCell::Derived(get.clone()),
            FieldSlot::CustomWrite { cell, .. } => FieldCell::Signal(cell.clone()),
        }
    }

    fn is_derived(&self) -> bool {
        matches!(
            self,
            FieldSlot::Computed(_) | FieldSlot::ReadOnly(_) | FieldSlot::Custom { .. }
        )
    }
}

/// A tracked field: either still a pending template (never accessed) or a
/// live cell.
enum Entry {
    Pending(Template),
    Live(FieldSlot),
}

struct ObjectInner {
    entries: RwLock<IndexMap<String, Entry>>,
}

/// Object-shaped reactive membrane. Cloning produces another handle to the
/// same wrapped object.
#[derive(Clone)]
pub struct ObjectMembrane {
    inner: Arc<ObjectInner>,
}

/// Non-owning handle, used by compute closures so a computed field does not
/// keep its own membrane alive in a cycle.
#[derive(Clone)]
pub struct WeakObjectMembrane {
    inner: Weak<ObjectInner>,
}

/// What `set` decided to do once the field table lock is released.
enum WriteAction {
    Done,
    WriteSignal(Signal<FieldValue>),
    Setter(SetterFn),
}

impl ObjectMembrane {
    /// Wrap a plain JSON object. Fields materialize lazily.
    pub fn from_map(map: serde_json::Map<String, Value>) -> Self {
        Self::from_templates(
            map.into_iter()
                .map(|(k, v)| (k, Template::Value(v)))
                .collect(),
        )
    }

    /// Build from field templates (plain, computed, and accessor fields).
    pub fn from_templates(fields: IndexMap<String, Template>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                entries: RwLock::new(
                    fields
                        .into_iter()
                        .map(|(k, t)| (k, Entry::Pending(t)))
                        .collect(),
                ),
            }),
        }
    }

    /// Build from a [`Template::Object`]; other template kinds fail.
    pub fn from_template(template: Template) -> Result<Self, Error> {
        match template {
            Template::Object(fields) => Ok(Self::from_templates(fields)),
            Template::Value(Value::Object(map)) => Ok(Self::from_map(map)),
            _ => Err(Error::NotWrappable("non-object template")),
        }
    }

    /// Get a non-owning handle.
    pub fn downgrade(&self) -> WeakObjectMembrane {
        WeakObjectMembrane {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Materialize (if needed) and return the field's slot.
    ///
    /// Cell construction never runs compute functions, so holding the
    /// field-table lock here cannot reenter this membrane.
    fn slot(&self, key: &str) -> Option<FieldSlot> {
        let mut entries = self.inner.entries.write();
        let template = match entries.get(key)? {
            Entry::Live(slot) => return Some(slot.clone()),
            Entry::Pending(template) => template.clone(),
        };
        let slot = materialize(template, self.downgrade());
        entries.insert(key.to_string(), Entry::Live(slot.clone()));
        Some(slot)
    }

    /// Read a field's value, registering a dependency on its cell.
    ///
    /// A field that was never present and never assigned reads as
    /// [`FieldValue::Absent`].
    pub fn get(&self, key: &str) -> FieldValue {
        match self.slot(key) {
            Some(slot) => slot.read(),
            None => FieldValue::Absent,
        }
    }

    /// Read a field and deep-unwrap it into plain JSON.
    pub fn get_json(&self, key: &str) -> Value {
        self.get(key).to_json()
    }

    /// Raw cell access: return the field's cell instead of its value.
    ///
    /// Accepts the reserved `$` prefix (`raw("$count")` ≡ `raw("count")`)
    /// and materializes the cell if the field has never been accessed.
    /// Returns `None` for fields that do not exist.
    pub fn raw(&self, key: &str) -> Option<FieldCell> {
        self.slot(strip_prefix(key)).map(|slot| slot.to_cell())
    }

    /// Write a field.
    ///
    /// Unknown fields are created (dynamic addition is first-class), object
    /// and array values are wrapped into nested membranes, computed fields
    /// are replaced by ordinary cells, and accessor fields route through
    /// their setter. Fails only for read-only fields (accessor `get`
    /// without `set`).
    pub fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        let action = {
            let mut entries = self.inner.entries.write();
            match entries.get_mut(key) {
                None => {
                    entries.insert(
                        key.to_string(),
                        Entry::Live(FieldSlot::Plain(wrap_into_signal(value.clone()))),
                    );
                    WriteAction::Done
                }
                Some(Entry::Pending(pending)) => {
                    let template = pending.clone();
                    match &template {
                        Template::Accessor {
                            get: Some(_),
                            set: None,
                        } => return Err(Error::ReadOnly(key.to_string())),
                        Template::Accessor { set: Some(_), .. } => {
                            let slot = materialize(template.clone(), self.downgrade());
                            let setter = match &slot {
                                FieldSlot::Custom { set, .. }
                                | FieldSlot::CustomWrite { set, .. } => Arc::clone(set),
                                _ => unreachable!("accessor with setter"),
                            };
                            entries.insert(key.to_string(), Entry::Live(slot));
                            WriteAction::Setter(setter)
                        }
                        // A plain assignment over a pending plain or
                        // computed field: nothing has observed the old
                        // cell, replace it wholesale.
                        _ => {
                            entries.insert(
                                key.to_string(),
                                Entry::Live(FieldSlot::Plain(wrap_into_signal(
                                    value.clone(),
                                ))),
                            );
                            WriteAction::Done
                        }
                    }
                }
                Some(Entry::Live(slot)) => match slot {
                    FieldSlot::Plain(sig) => WriteAction::WriteSignal(sig.clone()),
                    // Computed semantics are not composable with plain
                    // overwrite: the derived cell is replaced.
                    FieldSlot::Computed(_) => {
                        *slot = FieldSlot::Plain(wrap_into_signal(value.clone()));
                        WriteAction::Done
                    }
                    FieldSlot::ReadOnly(_) => {
                        return Err(Error::ReadOnly(key.to_string()))
                    }
                    FieldSlot::Custom { set, .. }
                    | FieldSlot::CustomWrite { set, .. } => {
                        WriteAction::Setter(Arc::clone(set))
                    }
                },
            }
        };

        match action {
            WriteAction::Done => {}
            WriteAction::WriteSignal(sig) => {
                // A newly assigned array gets this cell as its owner before
                // the write notifies anyone.
                write_wrapped(&sig, value);
            }
            WriteAction::Setter(set) => set(self, value),
        }
        Ok(())
    }

    /// Declare (or redeclare) a field from a template. This is how computed
    /// and accessor fields are added dynamically.
    pub fn define(&self, key: &str, template: Template) {
        let slot = materialize(template, self.downgrade());
        self.inner
            .entries
            .write()
            .insert(key.to_string(), Entry::Live(slot));
    }

    /// Delete a field: its cell is set to absent (notifying subscribers),
    /// then the field is removed from the table. No-op for missing fields.
    pub fn delete(&self, key: &str) {
        let slot = {
            let entries = self.inner.entries.read();
            match entries.get(key) {
                Some(Entry::Live(slot)) => Some(slot.clone()),
                _ => None,
            }
        };

        // Notify while the field is still enumerable, matching the
        // set-to-absent-then-remove contract.
        match slot {
            Some(FieldSlot::Plain(sig)) | Some(FieldSlot::CustomWrite { cell: sig, .. }) => {
                sig.write(FieldValue::Absent);
            }
            _ => {}
        }

        self.inner.entries.write().shift_remove(key);
    }

    /// Whether the field is tracked. Accepts the `$` prefix.
    pub fn has(&self, key: &str) -> bool {
        self.inner
            .entries
            .read()
            .contains_key(strip_prefix(key))
    }

    /// The tracked field names, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// The tracked field names spelled with the raw-cell `$` prefix, for
    /// tooling that enumerates cells.
    pub fn signal_keys(&self) -> Vec<String> {
        self.inner
            .entries
            .read()
            .keys()
            .map(|k| format!("{}{}", SIGNAL_PREFIX, k))
            .collect()
    }

    /// Number of tracked fields.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Watch a field's cell; see [`FieldCell::watch`]. Returns `None` for
    /// fields that do not exist.
    pub fn watch<F>(&self, key: &str, callback: F) -> Option<SubscriptionId>
    where
        F: Fn(&FieldValue, &FieldValue) + Send + Sync + 'static,
    {
        self.raw(key).map(|cell| cell.watch(callback))
    }

    /// Whether the field is backed by a derived cell (computed, or accessor
    /// with a getter). Such fields are skipped by serialization and
    /// protected from restoration.
    pub fn is_derived_field(&self, key: &str) -> bool {
        let entries = self.inner.entries.read();
        match entries.get(strip_prefix(key)) {
            Some(Entry::Pending(template)) => template.is_derived(),
            Some(Entry::Live(slot)) => slot.is_derived(),
            None => false,
        }
    }

    /// Deep-unwrap into a plain JSON object.
    ///
    /// Derived-backed fields are omitted (they are recomputed, not
    /// transported), absent fields are skipped, and a structure revisited
    /// during the walk serializes as `null`.
    pub fn to_json(&self) -> Value {
        self.to_plain(&mut HashSet::new())
    }

    pub(crate) fn to_plain(&self, visited: &mut HashSet<usize>) -> Value {
        if !visited.insert(self.ptr_id()) {
            return Value::Null;
        }

        let mut out = serde_json::Map::new();
        for key in self.keys() {
            if self.is_derived_field(&key) {
                continue;
            }
            let Some(slot) = self.slot(&key) else {
                continue;
            };
            match slot.peek() {
                FieldValue::Absent => {}
                FieldValue::Plain(v) => {
                    out.insert(key, v);
                }
                FieldValue::Nested(Membrane::Object(obj)) => {
                    out.insert(key, obj.to_plain(visited));
                }
                FieldValue::Nested(Membrane::Array(arr)) => {
                    out.insert(key, arr.to_plain(visited));
                }
            }
        }
        Value::Object(out)
    }

    /// Restore field values from a plain snapshot.
    ///
    /// Plain fields are overwritten (recursing into nested structure),
    /// missing fields are created through the normal `set` path, and
    /// derived-backed fields are never overwritten, even if the snapshot
    /// names them.
    pub fn restore(&self, snapshot: &Value) -> Result<(), Error> {
        let map = snapshot.as_object().ok_or(Error::InvalidSnapshot)?;

        for (key, incoming) in map {
            if self.is_derived_field(key) {
                continue;
            }
            match self.slot(key) {
                Some(FieldSlot::Plain(sig)) => {
                    match (sig.peek(), incoming) {
                        (FieldValue::Nested(Membrane::Object(obj)), Value::Object(_)) => {
                            obj.restore(incoming)?;
                        }
                        (FieldValue::Nested(Membrane::Array(arr)), Value::Array(items)) => {
                            arr.restore_elements(items)?;
                        }
                        _ => {
                            self.set(key, incoming.clone())?;
                        }
                    }
                }
                Some(FieldSlot::CustomWrite { cell, .. }) => {
                    // Restoration writes the backing cell directly rather
                    // than running application setters.
                    write_wrapped(&cell, incoming.clone());
                }
                Some(_) => {}
                None => {
                    self.set(key, incoming.clone())?;
                }
            }
        }
        Ok(())
    }
}

impl WeakObjectMembrane {
    /// Upgrade to a strong handle if the membrane is still alive.
    pub fn upgrade(&self) -> Option<ObjectMembrane> {
        self.inner.upgrade().map(|inner| ObjectMembrane { inner })
    }
}

impl PartialEq for ObjectMembrane {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::fmt::Debug for ObjectMembrane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectMembrane")
            .field("keys", &self.keys())
            .finish()
    }
}

fn strip_prefix(key: &str) -> &str {
    key.strip_prefix(SIGNAL_PREFIX).unwrap_or(key)
}

/// Build a live slot from a template. The typing rules are the same for
/// plain access, raw access, and dynamic assignment.
fn materialize(template: Template, parent: WeakObjectMembrane) -> FieldSlot {
    match template {
        Template::Value(v) => FieldSlot::Plain(wrap_into_signal(v)),
        Template::Object(fields) => FieldSlot::Plain(Signal::new(FieldValue::Nested(
            Membrane::Object(ObjectMembrane::from_templates(fields)),
        ))),
        Template::Array(elements) => {
            let arr = super::ArrayMembrane::from_templates(elements);
            let sig = Signal::new(FieldValue::Nested(Membrane::Array(arr.clone())));
            arr.set_owner(sig.downgrade());
            FieldSlot::Plain(sig)
        }
        Template::Computed(compute) => {
            FieldSlot::Computed(make_derived(compute, parent))
        }
        Template::Accessor {
            get: Some(compute),
            set: None,
        } => FieldSlot::ReadOnly(make_derived(compute, parent)),
        Template::Accessor {
            get: Some(compute),
            set: Some(set),
        } => FieldSlot::Custom {
            get: make_derived(compute, parent),
            set,
        },
        Template::Accessor {
            get: None,
            set: Some(set),
        } => FieldSlot::CustomWrite {
            cell: Signal::new(FieldValue::Absent),
            set,
        },
        Template::Accessor {
            get: None,
            set: None,
        } => FieldSlot::Plain(Signal::new(FieldValue::Absent)),
    }
}

fn make_derived(
    compute: super::template::ComputeFn,
    parent: WeakObjectMembrane,
) -> Derived<FieldValue> {
    Derived::new(move || match parent.upgrade() {
        Some(membrane) => wrap_value(compute(&membrane)),
        None => FieldValue::Absent,
    })
}
