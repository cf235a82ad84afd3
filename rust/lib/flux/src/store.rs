use std::sync::{Arc, RwLock};
use std::thread;

use tracing::{debug, warn};

use crate::action::{ActionFn, ActionFuture, ActionOutput, ActionRegistry};
use crate::config::StoreConfig;
use crate::emitter::EventBus;
use crate::error::FluxError;
use crate::mutation::{MutationRegistry, MutationSelector, SET_IN_MUTATION};
use crate::persist::PersistStore;
use crate::value::{StateMap, StateValue};

/// Mutation type used when `commit` receives a state map instead of a name.
pub const UPDATE_MUTATION: &str = "update";

/// Holder of the data a [`StoreCore`] commits into.
///
/// `set_data` shallow-merges `patch` into the current data: top-level keys
/// of a map patch replace the existing entries and everything else is kept.
pub trait DataBag: Send + Sync {
    fn data(&self) -> StateValue;
    fn set_data(&self, patch: StateValue);
}

/// In-memory [`DataBag`].
pub struct LocalData {
    data: RwLock<StateValue>,
}

impl LocalData {
    pub fn new(initial: StateValue) -> Self {
        Self {
            data: RwLock::new(initial),
        }
    }
}

impl Default for LocalData {
    fn default() -> Self {
        Self::new(StateValue::map())
    }
}

impl DataBag for LocalData {
    fn data(&self) -> StateValue {
        self.data.read().unwrap().clone()
    }

    fn set_data(&self, patch: StateValue) {
        let mut data = self.data.write().unwrap();
        let next = data.merge(&patch);
        *data = next;
    }
}

/// First argument of `commit`.
#[derive(Debug, Clone)]
pub enum CommitKind {
    /// Named mutation type. Only used for logging.
    Named(String),
    /// A state map committed directly; it becomes the payload and the
    /// mutation type is `"update"`.
    State(StateValue),
}

impl From<&str> for CommitKind {
    fn from(name: &str) -> Self {
        CommitKind::Named(name.to_string())
    }
}

impl From<String> for CommitKind {
    fn from(name: String) -> Self {
        CommitKind::Named(name)
    }
}

impl From<StateValue> for CommitKind {
    fn from(state: StateValue) -> Self {
        CommitKind::State(state)
    }
}

/// Optional `commit` arguments.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Reducer to run. Defaults to `"default"`.
    pub mutation: MutationSelector,
    /// Persistence prefix for this commit. Falls back to the store config.
    pub namespace: Option<String>,
}

impl CommitOptions {
    pub fn mutation(mutation: impl Into<MutationSelector>) -> Self {
        Self {
            mutation: mutation.into(),
            namespace: None,
        }
    }

    /// Options for a `setIn` commit with payload `{ path, value }`.
    pub fn set_in() -> Self {
        Self::mutation(SET_IN_MUTATION)
    }

    pub fn persist(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// State shared by every core created from one store.
pub(crate) struct Shared {
    pub(crate) bus: Arc<EventBus<StateValue>>,
    pub(crate) actions: ActionRegistry,
    pub(crate) mutations: MutationRegistry,
    pub(crate) persistence: Option<Arc<dyn PersistStore>>,
    pub(crate) config: StoreConfig,
}

/// Commit and dispatch bound to one data holder.
///
/// The store itself and every instantiated component each own a
/// `StoreCore`. They share the store's bus, actions, mutations and
/// persistence, but commit into their own [`DataBag`] and resolve actions
/// against their own methods first.
#[derive(Clone)]
pub struct StoreCore {
    shared: Arc<Shared>,
    data: Arc<dyn DataBag>,
    methods: Arc<ActionRegistry>,
}

impl StoreCore {
    pub(crate) fn new(shared: Arc<Shared>, data: Arc<dyn DataBag>, methods: ActionRegistry) -> Self {
        Self {
            shared,
            data,
            methods: Arc::new(methods),
        }
    }

    /// Current data of this core's holder.
    pub fn state(&self) -> StateValue {
        self.data.data()
    }

    pub fn data_bag(&self) -> &Arc<dyn DataBag> {
        &self.data
    }

    pub fn bus(&self) -> &Arc<EventBus<StateValue>> {
        &self.shared.bus
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Actions local to this core, consulted before the store's.
    pub fn methods(&self) -> &ActionRegistry {
        &self.methods
    }

    // ====================================================================
    // Commit
    // ====================================================================

    /// Run a mutation and broadcast the result.
    ///
    /// 1. each top-level key of `payload` is persisted under
    ///    `namespace + key` when a namespace is in effect
    /// 2. the selected reducer computes the next state from
    ///    `(payload, state)`
    /// 3. the result is shallow-merged into the data holder
    /// 4. the full post-commit state is emitted on the update event
    ///
    /// Returns the post-commit state.
    pub fn commit(
        &self,
        kind: impl Into<CommitKind>,
        payload: StateValue,
        options: CommitOptions,
    ) -> Result<StateValue, FluxError> {
        let (kind, payload) = match kind.into() {
            CommitKind::Named(name) if !name.is_empty() => (name, payload),
            CommitKind::State(state) if state.is_map() => (UPDATE_MUTATION.to_string(), state),
            _ => return Err(FluxError::MissingMutationType),
        };

        let prev = self.state();
        debug!(kind = %kind, mutation = ?options.mutation, payload = %payload, prev = %prev, "commit");

        let namespace = options
            .namespace
            .as_deref()
            .or(self.shared.config.namespace.as_deref());
        if let Some(namespace) = namespace {
            self.persist(namespace, &payload)?;
        }

        let next = self.shared.mutations.apply(&options.mutation, &payload, &prev)?;
        self.data.set_data(next);

        let state = self.state();
        debug!(kind = %kind, next = %state, "committed");
        self.shared
            .bus
            .emit_event(self.shared.config.update_event.as_str(), std::slice::from_ref(&state));
        Ok(state)
    }

    /// `commit("update", payload)` with the default mutation.
    pub fn update(&self, payload: StateValue) -> Result<StateValue, FluxError> {
        self.commit(UPDATE_MUTATION, payload, CommitOptions::default())
    }

    fn persist(&self, namespace: &str, payload: &StateValue) -> Result<(), FluxError> {
        let Some(store) = &self.shared.persistence else {
            warn!(namespace, "commit requests persistence but no store is configured");
            return Ok(());
        };
        if let Some(fields) = payload.as_map() {
            for (key, value) in fields.iter() {
                store.set(&format!("{}{}", namespace, key), value)?;
            }
        }
        Ok(())
    }

    // ====================================================================
    // Actions
    // ====================================================================

    /// Invoke the action `name` and return a future of its result.
    ///
    /// Local methods shadow store actions of the same name. An unknown name
    /// or an action that fails synchronously is reported right away.
    pub fn dispatch(&self, name: &str, payload: StateValue) -> Result<ActionFuture, FluxError> {
        let action = self.resolve(name)?;
        debug!(action = name, payload = %payload, "dispatch");
        action(ActionContext::new(self.clone()), payload).into_future()
    }

    /// Invoke the action `name` without waiting for it.
    ///
    /// Asynchronous work is spawned on the current tokio runtime. Without a
    /// runtime it is driven to completion in place, or on a worker thread
    /// when the caller is itself running inside a futures executor. Its
    /// failures are logged.
    pub fn put(&self, name: &str, payload: StateValue) -> Result<(), FluxError> {
        let action = self.resolve(name)?;
        debug!(action = name, payload = %payload, "put");
        match action(ActionContext::new(self.clone()), payload) {
            ActionOutput::Ready(result) => result.map(|_| ()),
            ActionOutput::Pending(fut) => {
                let action_name = name.to_string();
                let task = async move {
                    if let Err(e) = fut.await {
                        warn!(action = %action_name, error = %e, "put action failed");
                    }
                };
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(task);
                    return Ok(());
                }
                match futures::executor::enter() {
                    Ok(guard) => {
                        drop(guard);
                        futures::executor::block_on(task);
                    }
                    Err(_) => {
                        // nested inside another executor
                        thread::Builder::new()
                            .name(format!("flux-put-{}", name))
                            .spawn(move || futures::executor::block_on(task))
                            .map_err(|e| FluxError::action(format!("spawn put worker: {}", e)))?;
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<ActionFn, FluxError> {
        self.methods
            .get(name)
            .or_else(|| self.shared.actions.get(name))
            .ok_or_else(|| FluxError::UnresolvedAction(name.to_string()))
    }

    // ====================================================================
    // Persistence
    // ====================================================================

    /// Load persisted values for every top-level key of the current data.
    ///
    /// Keys with a stored value under `namespace + key` are merged into the
    /// data holder; the rest keep their current value. Nothing is broadcast.
    pub fn hydrate(&self, namespace: &str) -> Result<StateValue, FluxError> {
        let current = self.state();
        let Some(store) = &self.shared.persistence else {
            warn!(namespace, "hydrate requested but no store is configured");
            return Ok(current);
        };
        let Some(fields) = current.as_map() else {
            return Ok(current.clone());
        };

        let mut restored = StateMap::new();
        for key in fields.keys() {
            if let Some(value) = store.get(&format!("{}{}", namespace, key))? {
                restored.insert(key.clone(), value);
            }
        }
        debug!(namespace, restored = restored.len(), "hydrate");
        if !restored.is_empty() {
            self.data.set_data(StateValue::from(restored));
        }
        Ok(self.state())
    }
}

/// What an action receives as its first argument.
///
/// Every call goes through the core that dispatched the action, so a
/// component action commits into the component's data.
#[derive(Clone)]
pub struct ActionContext {
    core: StoreCore,
}

impl ActionContext {
    pub(crate) fn new(core: StoreCore) -> Self {
        Self { core }
    }

    pub fn state(&self) -> StateValue {
        self.core.state()
    }

    pub fn commit(
        &self,
        kind: impl Into<CommitKind>,
        payload: StateValue,
        options: CommitOptions,
    ) -> Result<StateValue, FluxError> {
        self.core.commit(kind, payload, options)
    }

    pub fn update(&self, payload: StateValue) -> Result<StateValue, FluxError> {
        self.core.update(payload)
    }

    pub fn dispatch(&self, name: &str, payload: StateValue) -> Result<ActionFuture, FluxError> {
        self.core.dispatch(name, payload)
    }

    pub fn put(&self, name: &str, payload: StateValue) -> Result<(), FluxError> {
        self.core.put(name, payload)
    }

    pub fn core(&self) -> &StoreCore {
        &self.core
    }
}

// Compile-time check: StoreCore must be Send + Sync.
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<StoreCore>();
    assert::<ActionContext>();
    assert::<LocalData>();
}
