use std::future::Future;
use std::sync::{Arc, RwLock};

use futures::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;
use tracing::warn;

use crate::error::FluxError;
use crate::store::ActionContext;
use crate::value::StateValue;

/// Future produced by `dispatch`.
pub type ActionFuture = BoxFuture<'static, Result<StateValue, FluxError>>;

/// Type-erased action stored in a registry.
///
/// Takes owned values so a pending output can be `'static`:
/// - `ActionContext`: `commit` / `dispatch` / `put` / `state` bound to the
///   dispatching core
/// - `StateValue`: the dispatch payload
pub type ActionFn = Arc<dyn Fn(ActionContext, StateValue) -> ActionOutput + Send + Sync>;

/// What an action returns.
///
/// `Ready` covers actions that finish synchronously; `Pending` carries
/// asynchronous work. `dispatch` normalises both into an [`ActionFuture`].
pub enum ActionOutput {
    Ready(Result<StateValue, FluxError>),
    Pending(ActionFuture),
}

impl ActionOutput {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<StateValue, FluxError>> + Send + 'static,
    {
        ActionOutput::Pending(fut.boxed())
    }

    /// Normalise into a future.
    ///
    /// A ready failure is returned as `Err` right away rather than wrapped
    /// in a failing future.
    pub fn into_future(self) -> Result<ActionFuture, FluxError> {
        match self {
            ActionOutput::Ready(Ok(value)) => Ok(future::ready(Ok(value)).boxed()),
            ActionOutput::Ready(Err(e)) => Err(e),
            ActionOutput::Pending(fut) => Ok(fut),
        }
    }
}

impl From<StateValue> for ActionOutput {
    fn from(value: StateValue) -> Self {
        ActionOutput::Ready(Ok(value))
    }
}

impl From<()> for ActionOutput {
    fn from(_: ()) -> Self {
        ActionOutput::Ready(Ok(StateValue::Null))
    }
}

impl From<Result<StateValue, FluxError>> for ActionOutput {
    fn from(result: Result<StateValue, FluxError>) -> Self {
        ActionOutput::Ready(result)
    }
}

impl From<Result<(), FluxError>> for ActionOutput {
    fn from(result: Result<(), FluxError>) -> Self {
        ActionOutput::Ready(result.map(|_| StateValue::Null))
    }
}

/// Name -> action table for one store.
///
/// Registering a name that already exists replaces the earlier action.
///
/// # Examples
///
/// ```ignore
/// let actions = ActionRegistry::new();
/// actions.register("increment", |ctx, _| {
///     let n = ctx.state().get("n").and_then(StateValue::as_i64).unwrap_or(0);
///     ctx.update(StateValue::from_entries([("n", n + 1)]))
/// });
/// ```
pub struct ActionRegistry {
    actions: RwLock<IndexMap<String, ActionFn>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(IndexMap::new()),
        }
    }

    /// Register an action under `name`.
    pub fn register<F, O>(&self, name: &str, action: F)
    where
        F: Fn(ActionContext, StateValue) -> O + Send + Sync + 'static,
        O: Into<ActionOutput>,
    {
        let action: ActionFn =
            Arc::new(move |ctx: ActionContext, payload: StateValue| -> ActionOutput {
                action(ctx, payload).into()
            });
        self.insert(name, action);
    }

    /// Builder form of [`ActionRegistry::register`].
    pub fn with<F, O>(self, name: &str, action: F) -> Self
    where
        F: Fn(ActionContext, StateValue) -> O + Send + Sync + 'static,
        O: Into<ActionOutput>,
    {
        self.register(name, action);
        self
    }

    /// Copy every action of `other` into this registry.
    pub fn merge(&self, other: &ActionRegistry) {
        for (name, action) in other.entries() {
            self.insert(&name, action);
        }
    }

    pub fn get(&self, name: &str) -> Option<ActionFn> {
        self.actions.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.read().unwrap().contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.actions.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Vec<(String, ActionFn)> {
        let actions = self.actions.read().unwrap();
        actions
            .iter()
            .map(|(name, action)| (name.clone(), Arc::clone(action)))
            .collect()
    }

    fn insert(&self, name: &str, action: ActionFn) {
        let mut actions = self.actions.write().unwrap();
        if actions.insert(name.to_string(), action).is_some() {
            warn!(action = name, "action registration shadows an earlier one");
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ActionRegistry {
    fn clone(&self) -> Self {
        Self {
            actions: RwLock::new(self.entries().into_iter().collect()),
        }
    }
}
