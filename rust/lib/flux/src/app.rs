use std::sync::Arc;

use crate::action::{ActionFuture, ActionOutput, ActionRegistry};
use crate::config::StoreConfig;
use crate::connect::{Component, ComponentConfig, Connect, Projection};
use crate::emitter::{EventBus, Listener, Subscription};
use crate::error::FluxError;
use crate::mutation::{MutationFn, MutationRegistry};
use crate::persist::PersistStore;
use crate::store::{ActionContext, CommitKind, CommitOptions, DataBag, LocalData, Shared, StoreCore};
use crate::value::StateValue;

/// Initial state and actions of a store.
pub struct StoreDefinition {
    pub state: StateValue,
    pub actions: ActionRegistry,
}

impl StoreDefinition {
    pub fn new(state: StateValue) -> Self {
        Self {
            state,
            actions: ActionRegistry::new(),
        }
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    /// Add one action.
    pub fn action<F, O>(self, name: &str, action: F) -> Self
    where
        F: Fn(ActionContext, StateValue) -> O + Send + Sync + 'static,
        O: Into<ActionOutput>,
    {
        self.actions.register(name, action);
        self
    }
}

impl Default for StoreDefinition {
    fn default() -> Self {
        Self::new(StateValue::map())
    }
}

/// Builder for [`Flux`].
pub struct FluxBuilder {
    definition: StoreDefinition,
    config: StoreConfig,
    persistence: Option<Arc<dyn PersistStore>>,
    bus: Option<Arc<EventBus<StateValue>>>,
    data: Option<Arc<dyn DataBag>>,
    mutations: Vec<(String, MutationFn)>,
}

impl FluxBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Key-value service used by namespaced commits and hydration.
    pub fn persistence(mut self, store: Arc<dyn PersistStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    /// Share an existing bus instead of creating one.
    pub fn bus(mut self, bus: Arc<EventBus<StateValue>>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Hold the store's own state in `data` instead of a [`LocalData`].
    /// The definition's state is merged into it.
    pub fn data_bag(mut self, data: Arc<dyn DataBag>) -> Self {
        self.data = Some(data);
        self
    }

    /// Register a named mutation alongside `default` and `setIn`.
    pub fn mutation<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&StateValue, &StateValue) -> Result<StateValue, FluxError> + Send + Sync + 'static,
    {
        self.mutations.push((name.to_string(), Arc::new(func)));
        self
    }

    pub fn build(self) -> Flux {
        let bus = self.bus.unwrap_or_default();
        bus.set_once_return_value(self.config.once_return_value);

        let mutations = MutationRegistry::new();
        for (name, func) in self.mutations {
            mutations.register(&name, move |payload, state| func(payload, state));
        }

        let shared = Arc::new(Shared {
            bus,
            actions: self.definition.actions,
            mutations,
            persistence: self.persistence,
            config: self.config,
        });

        let initial = self.definition.state;
        let data: Arc<dyn DataBag> = match self.data {
            Some(data) => {
                data.set_data(initial.clone());
                data
            }
            None => Arc::new(LocalData::new(initial.clone())),
        };
        let root = StoreCore::new(Arc::clone(&shared), data, ActionRegistry::new());

        Flux {
            shared,
            root,
            initial,
        }
    }
}

/// A store: one state tree, its actions, mutations and update bus.
///
/// Cloning is cheap and every clone drives the same store.
///
/// # Examples
///
/// ```ignore
/// let flux = Flux::new(
///     StoreDefinition::new(StateValue::from_entries([("count", 0)]))
///         .action("increment", |ctx, _| {
///             let n = ctx.state().get("count").and_then(StateValue::as_i64).unwrap_or(0);
///             ctx.update(StateValue::from_entries([("count", n + 1)]))
///         }),
/// );
///
/// let page = flux
///     .connect(Projection::keys(["count"]))
///     .apply(ComponentConfig::new(StateValue::map()));
/// let page = flux.instantiate(page);
/// page.mount()?;
///
/// flux.dispatch("increment", StateValue::Null)?.await?;
/// assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(1));
/// ```
#[derive(Clone)]
pub struct Flux {
    shared: Arc<Shared>,
    root: StoreCore,
    initial: StateValue,
}

impl Flux {
    pub fn new(definition: StoreDefinition) -> Self {
        Self::builder(definition).build()
    }

    pub fn builder(definition: StoreDefinition) -> FluxBuilder {
        FluxBuilder {
            definition,
            config: StoreConfig::default(),
            persistence: None,
            bus: None,
            data: None,
            mutations: Vec::new(),
        }
    }

    // ====================================================================
    // State
    // ====================================================================

    pub fn state(&self) -> StateValue {
        self.root.state()
    }

    /// State the store was defined with.
    pub fn initial_state(&self) -> &StateValue {
        &self.initial
    }

    // ====================================================================
    // Commit / dispatch
    // ====================================================================

    pub fn commit(
        &self,
        kind: impl Into<CommitKind>,
        payload: StateValue,
        options: CommitOptions,
    ) -> Result<StateValue, FluxError> {
        self.root.commit(kind, payload, options)
    }

    pub fn update(&self, payload: StateValue) -> Result<StateValue, FluxError> {
        self.root.update(payload)
    }

    pub fn dispatch(&self, name: &str, payload: StateValue) -> Result<ActionFuture, FluxError> {
        self.root.dispatch(name, payload)
    }

    pub fn put(&self, name: &str, payload: StateValue) -> Result<(), FluxError> {
        self.root.put(name, payload)
    }

    // ====================================================================
    // Subscriptions
    // ====================================================================

    /// Observe every post-commit state until the handle is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Subscription<StateValue>
    where
        F: Fn(&StateValue) + Send + Sync + 'static,
    {
        let listener = Listener::new(move |args: &[StateValue]| {
            if let Some(state) = args.first() {
                handler(state);
            }
            false
        });
        self.shared
            .bus
            .subscribe(&self.shared.config.update_event, listener)
    }

    // ====================================================================
    // Components
    // ====================================================================

    /// Wrap component configs so mounted components follow this store.
    pub fn connect(&self, projection: impl Into<Option<Projection>>) -> Connect {
        Connect::new(
            Arc::clone(&self.shared.bus),
            self.shared.config.update_event.clone(),
            projection.into(),
        )
    }

    /// Create a component whose data starts as the store's initial state
    /// with `config.data` merged over it.
    pub fn instantiate(&self, mut config: ComponentConfig) -> Component {
        config.data = self.initial.merge(&config.data);
        Component::new(self, config)
    }

    /// Core committing into `data` that resolves `methods` before the
    /// store's actions.
    pub fn core_for(&self, data: Arc<dyn DataBag>, methods: ActionRegistry) -> StoreCore {
        StoreCore::new(Arc::clone(&self.shared), data, methods)
    }

    // ====================================================================
    // Accessors
    // ====================================================================

    pub fn core(&self) -> &StoreCore {
        &self.root
    }

    pub fn bus(&self) -> &Arc<EventBus<StateValue>> {
        &self.shared.bus
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.shared.actions
    }

    pub fn mutations(&self) -> &MutationRegistry {
        &self.shared.mutations
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn persistence(&self) -> Option<&Arc<dyn PersistStore>> {
        self.shared.persistence.as_ref()
    }
}

impl Default for Flux {
    fn default() -> Self {
        Self::new(StoreDefinition::default())
    }
}

// Compile-time check: Flux must be Send + Sync.
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<Flux>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn state(v: serde_json::Value) -> StateValue {
        StateValue::from(v)
    }

    #[test]
    fn new_starts_from_definition() {
        let flux = Flux::new(StoreDefinition::new(state(json!({"a": 1}))));
        assert_eq!(flux.state(), state(json!({"a": 1})));
        assert_eq!(flux.initial_state(), &state(json!({"a": 1})));
    }

    #[test]
    fn default_is_empty_map() {
        let flux = Flux::default();
        assert_eq!(flux.state(), StateValue::map());
        assert!(flux.actions().is_empty());
    }

    #[test]
    fn actions_are_per_store() {
        let a = Flux::new(StoreDefinition::default().action("only_a", |_, _| ()));
        let b = Flux::new(StoreDefinition::default());
        assert!(a.dispatch("only_a", StateValue::Null).is_ok());
        assert!(matches!(
            b.dispatch("only_a", StateValue::Null),
            Err(FluxError::UnresolvedAction(_))
        ));
    }

    #[test]
    fn actions_registered_after_build_are_visible() {
        let flux = Flux::default();
        flux.actions().register("late", |_, _| StateValue::from(1i64));
        let fut = flux.dispatch("late", StateValue::Null).unwrap();
        assert_eq!(futures::executor::block_on(fut).unwrap(), StateValue::from(1i64));
    }

    #[test]
    fn custom_mutation_by_name() {
        let flux = Flux::new(StoreDefinition::new(state(json!({"items": []}))));
        flux.mutations().register("push", |payload, state| {
            let mut items = state
                .get("items")
                .and_then(StateValue::as_list)
                .map(<[StateValue]>::to_vec)
                .unwrap_or_default();
            items.push(payload.clone());
            Ok(StateValue::from_entries([("items", items)]))
        });
        flux.commit("push", StateValue::from("x"), CommitOptions::mutation("push"))
            .unwrap();
        assert_eq!(flux.state(), state(json!({"items": ["x"]})));
    }

    #[test]
    fn builder_registers_mutations() {
        let flux = Flux::builder(StoreDefinition::new(state(json!({"n": 1}))))
            .mutation("double", |_, state| {
                let n = state.get("n").and_then(StateValue::as_i64).unwrap_or(0);
                Ok(StateValue::from_entries([("n", n * 2)]))
            })
            .build();
        assert!(flux.mutations().contains("double"));
        flux.commit("double", StateValue::Null, CommitOptions::mutation("double"))
            .unwrap();
        assert_eq!(flux.state(), state(json!({"n": 2})));
    }

    #[test]
    fn clones_share_state() {
        let flux = Flux::default();
        let other = flux.clone();
        other.update(state(json!({"k": true}))).unwrap();
        assert_eq!(flux.state(), state(json!({"k": true})));
    }

    #[test]
    fn subscribe_until_dropped() {
        let flux = Flux::default();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let sub = flux.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        flux.update(state(json!({"a": 1}))).unwrap();
        flux.update(state(json!({"a": 2}))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        drop(sub);
        flux.update(state(json!({"a": 3}))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_bus_sees_both_stores() {
        let bus = Arc::new(EventBus::new());
        let a = Flux::builder(StoreDefinition::default()).bus(Arc::clone(&bus)).build();
        let b = Flux::builder(StoreDefinition::default()).bus(Arc::clone(&bus)).build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = a.subscribe(move |state| s.lock().unwrap().push(state.clone()));

        b.update(state(json!({"from": "b"}))).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn builder_applies_once_return_value() {
        let flux = Flux::builder(StoreDefinition::default())
            .config(StoreConfig {
                once_return_value: false,
                ..StoreConfig::default()
            })
            .build();
        assert!(!flux.bus().once_return_value());
    }

    #[test]
    fn builder_with_external_data_bag() {
        let bag = Arc::new(LocalData::new(state(json!({"external": 1}))));
        let flux = Flux::builder(StoreDefinition::new(state(json!({"count": 0}))))
            .data_bag(bag.clone())
            .build();
        assert_eq!(flux.state(), state(json!({"external": 1, "count": 0})));

        flux.update(state(json!({"count": 2}))).unwrap();
        assert_eq!(bag.data().get("count").and_then(StateValue::as_i64), Some(2));
    }

    #[test]
    fn instantiate_merges_config_data_over_initial() {
        let flux = Flux::new(StoreDefinition::new(state(json!({"count": 0, "title": "t"}))));
        flux.update(state(json!({"count": 5}))).unwrap();

        let component = flux.instantiate(ComponentConfig::new(state(json!({"title": "page"}))));
        assert_eq!(component.data(), state(json!({"count": 0, "title": "page"})));
    }
}
