//! Field templates.
//!
//! A template declares the shape of a reactive root: plain data, computed
//! fields, and accessor fields. The distinction between a plain value and a
//! computed field is explicit in the type rather than inferred from the
//! value.
//!
//! Compute and setter functions receive the enclosing object membrane, so a
//! computed field can read its sibling fields (and thereby track them as
//! dependencies).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::ObjectMembrane;

/// Compute function of a computed or accessor field.
pub type ComputeFn = Arc<dyn Fn(&ObjectMembrane) -> Value + Send + Sync>;

/// Setter function of an accessor field. Receives the enclosing membrane and
/// the value being written.
pub type SetterFn = Arc<dyn Fn(&ObjectMembrane, Value) + Send + Sync>;

/// Declares one field (or a whole nested structure) of a reactive root.
#[derive(Clone)]
pub enum Template {
    /// Plain JSON data, wrapped deeply on materialization.
    Value(Value),
    /// A computed field, backed by a derived cell. Assigning a plain value
    /// over it replaces it with an ordinary cell.
    Computed(ComputeFn),
    /// A get/set accessor field. `get` alone makes the field read-only;
    /// `set` alone makes a plain cell whose writes route through `set`.
    Accessor {
        get: Option<ComputeFn>,
        set: Option<SetterFn>,
    },
    /// A nested object with its own field templates.
    Object(IndexMap<String, Template>),
    /// A nested array with per-element templates.
    Array(Vec<Template>),
}

impl Template {
    /// Plain data template.
    pub fn value(value: impl Into<Value>) -> Self {
        Template::Value(value.into())
    }

    /// Computed field template.
    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&ObjectMembrane) -> Value + Send + Sync + 'static,
    {
        Template::Computed(Arc::new(compute))
    }

    /// Accessor field with both getter and setter.
    pub fn accessor<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&ObjectMembrane) -> Value + Send + Sync + 'static,
        S: Fn(&ObjectMembrane, Value) + Send + Sync + 'static,
    {
        Template::Accessor {
            get: Some(Arc::new(get)),
            set: Some(Arc::new(set)),
        }
    }

    /// Accessor field with only a getter; writes fail as read-only.
    pub fn getter<G>(get: G) -> Self
    where
        G: Fn(&ObjectMembrane) -> Value + Send + Sync + 'static,
    {
        Template::Accessor {
            get: Some(Arc::new(get)),
            set: None,
        }
    }

    /// Accessor field with only a setter; reads see a plain cell seeded
    /// with "absent", writes route through `set`.
    pub fn setter<S>(set: S) -> Self
    where
        S: Fn(&ObjectMembrane, Value) + Send + Sync + 'static,
    {
        Template::Accessor {
            get: None,
            set: Some(Arc::new(set)),
        }
    }

    /// Object template from `(name, template)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Template)>,
        K: Into<String>,
    {
        Template::Object(
            fields
                .into_iter()
                .map(|(k, t)| (k.into(), t))
                .collect(),
        )
    }

    /// Array template from element templates.
    pub fn array<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = Template>,
    {
        Template::Array(elements.into_iter().collect())
    }

    /// Whether materializing this template produces a derived-backed field
    /// (computed, or accessor with a getter).
    pub(crate) fn is_derived(&self) -> bool {
        matches!(
            self,
            Template::Computed(_) | Template::Accessor { get: Some(_), .. }
        )
    }
}

impl From<Value> for Template {
    fn from(value: Value) -> Self {
        Template::Value(value)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Template::Computed(_) => f.write_str("Computed(..)"),
            Template::Accessor { get, set } => f
                .debug_struct("Accessor")
                .field("get", &get.is_some())
                .field("set", &set.is_some())
                .finish(),
            Template::Object(fields) => {
                f.debug_map().entries(fields.iter()).finish()
            }
            Template::Array(elements) => f.debug_list().entries(elements.iter()).finish(),
        }
    }
}
