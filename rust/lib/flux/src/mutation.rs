use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::FluxError;
use crate::path::{set_in, PathKey};
use crate::value::StateValue;

/// Reducer: `(payload, current_state) -> next_state`.
pub type MutationFn =
    Arc<dyn Fn(&StateValue, &StateValue) -> Result<StateValue, FluxError> + Send + Sync>;

/// Name of the mutation that returns the payload as the next state.
pub const DEFAULT_MUTATION: &str = "default";

/// Name of the mutation that applies `{ path, value }` with [`set_in`].
pub const SET_IN_MUTATION: &str = "setIn";

/// How `commit` picks its reducer.
#[derive(Clone)]
pub enum MutationSelector {
    /// Look the reducer up in the store's [`MutationRegistry`].
    Named(String),
    /// Use this reducer directly.
    Inline(MutationFn),
}

impl MutationSelector {
    pub fn inline<F>(func: F) -> Self
    where
        F: Fn(&StateValue, &StateValue) -> Result<StateValue, FluxError> + Send + Sync + 'static,
    {
        MutationSelector::Inline(Arc::new(func))
    }
}

impl Default for MutationSelector {
    fn default() -> Self {
        MutationSelector::Named(DEFAULT_MUTATION.to_string())
    }
}

impl From<&str> for MutationSelector {
    fn from(name: &str) -> Self {
        MutationSelector::Named(name.to_string())
    }
}

impl From<String> for MutationSelector {
    fn from(name: String) -> Self {
        MutationSelector::Named(name)
    }
}

impl fmt::Debug for MutationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationSelector::Named(name) => f.debug_tuple("Named").field(name).finish(),
            MutationSelector::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

/// Named reducers available to `commit`.
///
/// Starts out with `"default"` (replace with payload) and `"setIn"`
/// (payload `{ path: [..], value }`). Registering an existing name
/// replaces it.
pub struct MutationRegistry {
    mutations: RwLock<HashMap<String, MutationFn>>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        let registry = Self {
            mutations: RwLock::new(HashMap::new()),
        };
        registry.register(DEFAULT_MUTATION, |payload, _state| Ok(payload.clone()));
        registry.register(SET_IN_MUTATION, apply_set_in);
        registry
    }

    pub fn register<F>(&self, name: &str, func: F)
    where
        F: Fn(&StateValue, &StateValue) -> Result<StateValue, FluxError> + Send + Sync + 'static,
    {
        let mut mutations = self.mutations.write().unwrap();
        mutations.insert(name.to_string(), Arc::new(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mutations.read().unwrap().contains_key(name)
    }

    /// Resolve a selector to its reducer.
    pub fn resolve(&self, selector: &MutationSelector) -> Result<MutationFn, FluxError> {
        match selector {
            MutationSelector::Inline(func) => Ok(Arc::clone(func)),
            MutationSelector::Named(name) => self
                .mutations
                .read()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| FluxError::UnknownMutation(name.clone())),
        }
    }

    /// Run the selected reducer over `state`.
    pub fn apply(
        &self,
        selector: &MutationSelector,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, FluxError> {
        let func = self.resolve(selector)?;
        func(payload, state)
    }
}

impl Default for MutationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_set_in(payload: &StateValue, state: &StateValue) -> Result<StateValue, FluxError> {
    let invalid = |reason: &str| FluxError::InvalidPayload {
        mutation: SET_IN_MUTATION.to_string(),
        reason: reason.to_string(),
    };
    let path = payload
        .get("path")
        .ok_or_else(|| invalid("missing path"))?;
    let path = PathKey::parse_list(path)
        .ok_or_else(|| invalid("path must be a list of keys and indices"))?;
    let value = payload.get("value").cloned().unwrap_or_default();
    Ok(set_in(state, &path, value))
}
