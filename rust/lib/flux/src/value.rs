use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::path::PathKey;

/// Insertion-ordered map node of a state tree.
pub type StateMap = IndexMap<String, StateValue>;

/// A node of the state tree.
///
/// Containers live behind `Arc`, so cloning any value is cheap (an atomic
/// increment) and unmodified subtrees can be shared between successive
/// states. Container identity is `Arc` identity; see [`StateValue::same`].
///
/// Map nodes keep insertion order, which is also the order in which
/// `commit` persists keys and `connect` projections are built.
#[derive(Clone, Default, PartialEq)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(Arc<str>),
    List(Arc<Vec<StateValue>>),
    Map(Arc<StateMap>),
}

impl StateValue {
    /// An empty map node.
    pub fn map() -> Self {
        StateValue::Map(Arc::new(StateMap::new()))
    }

    /// Build a map node from `(key, value)` pairs, keeping their order.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: StateMap = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        StateValue::Map(Arc::new(map))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, StateValue::Map(_))
    }

    pub fn as_map(&self) -> Option<&StateMap> {
        match self {
            StateValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            StateValue::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Look up a direct child.
    ///
    /// Maps are keyed by name; lists accept a decimal index.
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        match self {
            StateValue::Map(map) => map.get(key),
            StateValue::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Walk `path` from this node. An empty path returns the node itself.
    pub fn get_in(&self, path: &[PathKey]) -> Option<&StateValue> {
        path.iter().try_fold(self, |node, key| match (node, key) {
            (StateValue::List(items), PathKey::Index(i)) => items.get(*i),
            (node, PathKey::Index(i)) => node.get(&i.to_string()),
            (node, PathKey::Field(name)) => node.get(name),
        })
    }

    /// Identity comparison.
    ///
    /// Containers are the same only if they share one allocation; scalars
    /// compare by value.
    pub fn same(&self, other: &StateValue) -> bool {
        match (self, other) {
            (StateValue::Map(a), StateValue::Map(b)) => Arc::ptr_eq(a, b),
            (StateValue::List(a), StateValue::List(b)) => Arc::ptr_eq(a, b),
            (StateValue::Map(_) | StateValue::List(_), _)
            | (_, StateValue::Map(_) | StateValue::List(_)) => false,
            _ => self == other,
        }
    }

    /// Shallow merge, the way a component data bag applies `set_data`.
    ///
    /// Keys of a map `patch` overwrite keys of a map `self`; every other
    /// combination yields `patch`. An empty map patch returns `self`
    /// unchanged (same identity).
    pub fn merge(&self, patch: &StateValue) -> StateValue {
        match (self, patch) {
            (StateValue::Map(base), StateValue::Map(changes)) => {
                if changes.is_empty() {
                    return self.clone();
                }
                let mut next = base.as_ref().clone();
                for (key, value) in changes.iter() {
                    next.insert(key.clone(), value.clone());
                }
                StateValue::Map(Arc::new(next))
            }
            _ => patch.clone(),
        }
    }

    /// Convert to an owned `serde_json::Value` (deep copy).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StateValue::Null => serde_json::Value::Null,
            StateValue::Bool(b) => serde_json::Value::Bool(*b),
            StateValue::Number(n) => serde_json::Value::Number(n.clone()),
            StateValue::String(s) => serde_json::Value::String(s.to_string()),
            StateValue::List(items) => {
                serde_json::Value::Array(items.iter().map(StateValue::to_json).collect())
            }
            StateValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Debug for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<serde_json::Value> for StateValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => StateValue::Null,
            serde_json::Value::Bool(b) => StateValue::Bool(b),
            serde_json::Value::Number(n) => StateValue::Number(n),
            serde_json::Value::String(s) => StateValue::String(Arc::from(s)),
            serde_json::Value::Array(items) => {
                StateValue::List(Arc::new(items.into_iter().map(StateValue::from).collect()))
            }
            serde_json::Value::Object(map) => StateValue::Map(Arc::new(
                map.into_iter().map(|(k, v)| (k, StateValue::from(v))).collect(),
            )),
        }
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for StateValue {
                fn from(n: $t) -> Self {
                    StateValue::Number(serde_json::Number::from(n))
                }
            }
        )*
    };
}

from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for StateValue {
    /// Non-finite floats have no JSON representation and become `Null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(StateValue::Number)
            .unwrap_or(StateValue::Null)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::String(Arc::from(s))
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::String(Arc::from(s))
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(items: Vec<StateValue>) -> Self {
        StateValue::List(Arc::new(items))
    }
}

impl From<StateMap> for StateValue {
    fn from(map: StateMap) -> Self {
        StateValue::Map(Arc::new(map))
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StateValue::Null => serializer.serialize_unit(),
            StateValue::Bool(b) => serializer.serialize_bool(*b),
            StateValue::Number(n) => n.serialize(serializer),
            StateValue::String(s) => serializer.serialize_str(s),
            StateValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            StateValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(StateValue::from)
    }
}
