//! Structural-sharing updates along a key path.

use std::fmt;
use std::sync::Arc;

use crate::value::{StateMap, StateValue};

/// One segment of a state path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Field(String),
    Index(usize),
}

impl PathKey {
    /// Key under which this segment is stored in a map node.
    fn map_key(&self) -> String {
        match self {
            PathKey::Field(name) => name.clone(),
            PathKey::Index(i) => i.to_string(),
        }
    }

    /// Index this segment addresses in a list node, if any.
    fn list_index(&self) -> Option<usize> {
        match self {
            PathKey::Index(i) => Some(*i),
            PathKey::Field(name) => name.parse().ok(),
        }
    }

    /// Parse a path encoded as a state list of strings and non-negative
    /// integers, e.g. `["todos", 2, "done"]`.
    pub fn parse_list(value: &StateValue) -> Option<Vec<PathKey>> {
        value
            .as_list()?
            .iter()
            .map(|segment| match segment {
                StateValue::String(name) => Some(PathKey::Field(name.to_string())),
                StateValue::Number(n) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .map(PathKey::Index),
                _ => None,
            })
            .collect()
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Field(name.to_string())
    }
}

impl From<String> for PathKey {
    fn from(name: String) -> Self {
        PathKey::Field(name)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Field(name) => f.write_str(name),
            PathKey::Index(i) => write!(f, "{}", i),
        }
    }
}

/// How far past the end of a list a write may pad with nulls.
pub const MAX_LIST_GAP: usize = 1024;

/// Return a new tree equal to `state` except that the node at `path` is
/// `value`.
///
/// Every ancestor along `path` is a fresh shallow copy; every subtree off
/// the path is shared with `state`. An empty path returns `value`. Missing
/// or non-container nodes along the path are treated as empty maps, and
/// list writes past the end pad with nulls. A write [`MAX_LIST_GAP`] or
/// more slots past the end turns the list into a map keyed by decimal
/// index instead.
pub fn set_in(state: &StateValue, path: &[PathKey], value: StateValue) -> StateValue {
    let Some((key, rest)) = path.split_first() else {
        return value;
    };

    let list_index = key.list_index();
    if let (StateValue::List(items), Some(index)) = (state, list_index) {
        if index < items.len().saturating_add(MAX_LIST_GAP) {
            let mut clone: Vec<StateValue> = items.as_ref().clone();
            let child = clone.get(index).cloned().unwrap_or_default();
            let next = set_in(&child, rest, value);
            if index >= clone.len() {
                clone.resize(index + 1, StateValue::Null);
            }
            clone[index] = next;
            return StateValue::List(Arc::new(clone));
        }
    }

    let mut clone: StateMap = match state {
        StateValue::Map(map) => map.as_ref().clone(),
        StateValue::List(items) if list_index.is_some() => items
            .iter()
            .enumerate()
            .map(|(i, item)| (i.to_string(), item.clone()))
            .collect(),
        _ => StateMap::new(),
    };
    let name = key.map_key();
    let child = clone.get(&name).cloned().unwrap_or_default();
    let next = set_in(&child, rest, value);
    clone.insert(name, next);
    StateValue::Map(Arc::new(clone))
}
