//! Binding component data to a store.
//!
//! [`Connect::apply`] wraps a component's mount hook so that, once mounted,
//! every state broadcast is projected into the component's own data.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::debug;

use crate::action::{ActionFuture, ActionOutput, ActionRegistry};
use crate::app::Flux;
use crate::emitter::{EventBus, Listener, Subscription};
use crate::error::FluxError;
use crate::store::{ActionContext, CommitKind, CommitOptions, DataBag, LocalData, StoreCore};
use crate::value::{StateMap, StateValue};

/// Derives a prop from the full store state and the original component
/// config.
pub type DeriveFn = Arc<dyn Fn(&StateValue, &ComponentConfig) -> StateValue + Send + Sync>;

/// Runs after a component is mounted.
pub type MountHook = Arc<dyn Fn(&Component) + Send + Sync>;

/// Where one projected prop comes from.
#[derive(Clone)]
pub enum PropSource {
    /// Top-level key of the store state.
    Key(String),
    Derive(DeriveFn),
}

impl PropSource {
    pub fn derive<F>(func: F) -> Self
    where
        F: Fn(&StateValue, &ComponentConfig) -> StateValue + Send + Sync + 'static,
    {
        PropSource::Derive(Arc::new(func))
    }

    fn resolve(&self, state: &StateValue, config: &ComponentConfig) -> StateValue {
        match self {
            PropSource::Key(key) => state.get(key).cloned().unwrap_or_default(),
            PropSource::Derive(func) => func(state, config),
        }
    }
}

impl From<&str> for PropSource {
    fn from(key: &str) -> Self {
        PropSource::Key(key.to_string())
    }
}

impl From<String> for PropSource {
    fn from(key: String) -> Self {
        PropSource::Key(key)
    }
}

impl fmt::Debug for PropSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropSource::Key(key) => f.debug_tuple("Key").field(key).finish(),
            PropSource::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

/// Which parts of the store state a component receives.
#[derive(Clone, Debug)]
pub enum Projection {
    /// Copy these top-level keys unchanged.
    Keys(Vec<String>),
    /// Build each prop from its source, in insertion order.
    Mapping(IndexMap<String, PropSource>),
}

impl Projection {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Keys(keys.into_iter().map(Into::into).collect())
    }

    /// Empty mapping, to be filled with [`Projection::prop`].
    pub fn mapping() -> Self {
        Projection::Mapping(IndexMap::new())
    }

    /// Add a prop. A key list is turned into the equivalent mapping first.
    pub fn prop(self, name: impl Into<String>, source: impl Into<PropSource>) -> Self {
        let mut mapping = match self {
            Projection::Mapping(mapping) => mapping,
            Projection::Keys(keys) => keys
                .into_iter()
                .map(|key| (key.clone(), PropSource::Key(key)))
                .collect(),
        };
        mapping.insert(name.into(), source.into());
        Projection::Mapping(mapping)
    }

    /// Compute the props for `state`. Absent keys project to null.
    pub fn project(&self, state: &StateValue, config: &ComponentConfig) -> StateValue {
        let props: StateMap = match self {
            Projection::Keys(keys) => keys
                .iter()
                .map(|key| (key.clone(), state.get(key).cloned().unwrap_or_default()))
                .collect(),
            Projection::Mapping(mapping) => mapping
                .iter()
                .map(|(name, source)| (name.clone(), source.resolve(state, config)))
                .collect(),
        };
        StateValue::from(props)
    }
}

/// Update-event listener that writes projected props into one component.
pub struct Projector {
    projection: Arc<Projection>,
    config: Arc<ComponentConfig>,
}

impl Projector {
    pub fn new(projection: Arc<Projection>, config: Arc<ComponentConfig>) -> Self {
        Self { projection, config }
    }

    /// Listener that merges the projection of each broadcast into `target`.
    /// It never asks to be removed.
    pub fn listener(&self, target: Arc<dyn DataBag>) -> Listener<StateValue> {
        let projection = Arc::clone(&self.projection);
        let config = Arc::clone(&self.config);
        Listener::new(move |args: &[StateValue]| {
            let props = match args.first() {
                Some(state) => projection.project(state, &config),
                None => projection.project(&StateValue::map(), &config),
            };
            target.set_data(props);
            false
        })
    }

    pub fn subscribe(
        &self,
        bus: &Arc<EventBus<StateValue>>,
        event: &str,
        target: Arc<dyn DataBag>,
    ) -> Subscription<StateValue> {
        bus.subscribe(event, self.listener(target))
    }
}

/// Page/component definition handed to [`Connect::apply`] and
/// [`Flux::instantiate`].
#[derive(Clone)]
pub struct ComponentConfig {
    /// Initial component data.
    pub data: StateValue,
    /// Component actions. They shadow store actions of the same name.
    pub methods: ActionRegistry,
    pub did_mount: Option<MountHook>,
    /// Persistence prefix hydrated on mount. Falls back to the store config.
    pub namespace: Option<String>,
}

impl ComponentConfig {
    pub fn new(data: StateValue) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn method<F, O>(self, name: &str, action: F) -> Self
    where
        F: Fn(ActionContext, StateValue) -> O + Send + Sync + 'static,
        O: Into<ActionOutput>,
    {
        self.methods.register(name, action);
        self
    }

    pub fn on_mount<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Component) + Send + Sync + 'static,
    {
        self.did_mount = Some(Arc::new(hook));
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            data: StateValue::map(),
            methods: ActionRegistry::new(),
            did_mount: None,
            namespace: None,
        }
    }
}

impl fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("data", &self.data)
            .field("methods", &self.methods.names())
            .field("did_mount", &self.did_mount.is_some())
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Config transformer returned by [`Flux::connect`].
pub struct Connect {
    bus: Arc<EventBus<StateValue>>,
    event: String,
    projection: Option<Arc<Projection>>,
}

impl Connect {
    pub(crate) fn new(
        bus: Arc<EventBus<StateValue>>,
        event: String,
        projection: Option<Projection>,
    ) -> Self {
        Self {
            bus,
            event,
            projection: projection.map(Arc::new),
        }
    }

    /// Drop the projection: `apply` then only wraps the mount hook.
    pub fn without_projection(mut self) -> Self {
        self.projection = None;
        self
    }

    /// Return `config` with a mount hook that first subscribes a
    /// [`Projector`] (when a projection was given) and then runs the
    /// original hook. Data and methods are left as they are.
    pub fn apply(&self, config: ComponentConfig) -> ComponentConfig {
        let original = Arc::new(config.clone());
        let previous = config.did_mount.clone();
        let bus = Arc::clone(&self.bus);
        let event = self.event.clone();
        let projection = self.projection.clone();

        let hook: MountHook = Arc::new(move |component: &Component| {
            if let Some(projection) = &projection {
                let projector = Projector::new(Arc::clone(projection), Arc::clone(&original));
                let subscription = projector.subscribe(&bus, &event, component.data_bag());
                debug!(event = %event, "projector subscribed");
                component.hold(subscription);
            }
            if let Some(previous) = &previous {
                previous(component);
            }
        });

        ComponentConfig {
            did_mount: Some(hook),
            ..config
        }
    }
}

/// A mounted (or mountable) component instance.
///
/// Owns its data and the subscriptions created while mounting. Dropping
/// it, or calling [`Component::unmount`], detaches them from the bus.
pub struct Component {
    config: ComponentConfig,
    core: StoreCore,
    subscriptions: Mutex<Vec<Subscription<StateValue>>>,
    mounted: AtomicBool,
}

impl Component {
    pub fn new(flux: &Flux, config: ComponentConfig) -> Self {
        let data: Arc<dyn DataBag> = Arc::new(LocalData::new(config.data.clone()));
        Self::with_data_bag(flux, config, data)
    }

    /// Component whose data lives in `data`.
    pub fn with_data_bag(flux: &Flux, config: ComponentConfig, data: Arc<dyn DataBag>) -> Self {
        let core = flux.core_for(data, config.methods.clone());
        Self {
            config,
            core,
            subscriptions: Mutex::new(Vec::new()),
            mounted: AtomicBool::new(false),
        }
    }

    /// Hydrate from persistence when a namespace is set, then run the
    /// mount hook.
    ///
    /// Mounting an already mounted component is a no-op; call
    /// [`Component::unmount`] first to mount again.
    pub fn mount(&self) -> Result<(), FluxError> {
        if self.mounted.swap(true, Ordering::SeqCst) {
            debug!("component already mounted");
            return Ok(());
        }
        let namespace = self
            .config
            .namespace
            .clone()
            .or_else(|| self.core.config().namespace.clone());
        if let Some(namespace) = namespace {
            if let Err(e) = self.core.hydrate(&namespace) {
                self.mounted.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        if let Some(hook) = &self.config.did_mount {
            hook(self);
        }
        Ok(())
    }

    /// Release every subscription held by this component.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        let released: Vec<_> = self.subscriptions.lock().unwrap().drain(..).collect();
        debug!(count = released.len(), "component unmounted");
    }

    /// Keep `subscription` alive until unmount.
    pub fn hold(&self, subscription: Subscription<StateValue>) {
        self.subscriptions.lock().unwrap().push(subscription);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn data(&self) -> StateValue {
        self.core.state()
    }

    pub fn set_data(&self, patch: StateValue) {
        self.core.data_bag().set_data(patch);
    }

    pub fn data_bag(&self) -> Arc<dyn DataBag> {
        Arc::clone(self.core.data_bag())
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn core(&self) -> &StoreCore {
        &self.core
    }

    // ====================================================================
    // Store helpers
    // ====================================================================

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
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("data", &self.data())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::StoreDefinition;
    use crate::config::StoreConfig;
    use crate::path::PathKey;
    use crate::persist::{MemoryStore, PersistStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn state(v: serde_json::Value) -> StateValue {
        StateValue::from(v)
    }

    fn counter() -> Flux {
        Flux::new(
            StoreDefinition::new(state(json!({"count": 0, "user": {"name": "ann"}})))
                .action("increment", |ctx, _| {
                    let count = ctx.state().get("count").and_then(StateValue::as_i64).unwrap_or(0);
                    ctx.update(StateValue::from_entries([("count", count + 1)]))
                }),
        )
    }

    // ========================================================================
    // Projection
    // ========================================================================

    #[test]
    fn keys_copy_and_fill_null() {
        let projection = Projection::keys(["count", "missing"]);
        let props = projection.project(&state(json!({"count": 3, "other": 1})), &ComponentConfig::default());
        assert_eq!(props, state(json!({"count": 3, "missing": null})));
    }

    #[test]
    fn mapping_renames_and_derives() {
        let projection = Projection::mapping()
            .prop("n", "count")
            .prop(
                "greeting",
                PropSource::derive(|state, config| {
                    let name = state
                        .get_in(&[PathKey::from("user"), PathKey::from("name")])
                        .and_then(StateValue::as_str)
                        .unwrap_or("");
                    let prefix = config.data.get("prefix").and_then(StateValue::as_str).unwrap_or("hi");
                    StateValue::from(format!("{} {}", prefix, name))
                }),
            );
        let config = ComponentConfig::new(state(json!({"prefix": "hello"})));
        let props = projection.project(&state(json!({"count": 2, "user": {"name": "bo"}})), &config);
        assert_eq!(props, state(json!({"n": 2, "greeting": "hello bo"})));
    }

    #[test]
    fn prop_on_keys_extends_them() {
        let projection = Projection::keys(["a"]).prop("b", "c");
        let props = projection.project(&state(json!({"a": 1, "c": 2})), &ComponentConfig::default());
        assert_eq!(props, state(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn projection_shares_subtrees() {
        let store_state = state(json!({"user": {"name": "ann"}}));
        let props = Projection::keys(["user"]).project(&store_state, &ComponentConfig::default());
        assert!(props.get("user").unwrap().same(store_state.get("user").unwrap()));
    }

    // ========================================================================
    // Connect
    // ========================================================================

    #[tokio::test]
    async fn connected_component_follows_dispatch() {
        let flux = counter();
        let config = flux
            .connect(Projection::keys(["count"]))
            .apply(ComponentConfig::new(state(json!({"local": true}))));
        let page = flux.instantiate(config);
        page.mount().unwrap();

        flux.dispatch("increment", StateValue::Null).unwrap().await.unwrap();

        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(1));
        assert_eq!(page.data().get("local").and_then(StateValue::as_bool), Some(true));
    }

    #[test]
    fn original_mount_hook_runs_after_subscription() {
        let flux = counter();
        let seen = Arc::new(AtomicU64::new(0));
        let s = Arc::clone(&seen);
        let config = ComponentConfig::new(StateValue::map()).on_mount(move |component| {
            s.store(component.subscription_count() as u64, Ordering::SeqCst);
        });
        let page = flux.instantiate(flux.connect(Projection::keys(["count"])).apply(config));
        page.mount().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nothing_projected_before_mount() {
        let flux = counter();
        let page = flux.instantiate(flux.connect(Projection::keys(["count"])).apply(ComponentConfig::default()));
        flux.update(state(json!({"count": 9}))).unwrap();
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(0));
    }

    #[test]
    fn connect_without_projection_keeps_hook() {
        let flux = counter();
        let mounted = Arc::new(AtomicU64::new(0));
        let m = Arc::clone(&mounted);
        let config = ComponentConfig::default().on_mount(move |_| {
            m.fetch_add(1, Ordering::SeqCst);
        });
        let page = flux.instantiate(flux.connect(None::<Projection>).apply(config));
        page.mount().unwrap();

        assert_eq!(mounted.load(Ordering::SeqCst), 1);
        assert_eq!(page.subscription_count(), 0);
        assert!(!flux.bus().has_listeners("updateState"));
    }

    #[test]
    fn without_projection_subscribes_nothing() {
        let flux = counter();
        let connect = flux.connect(Projection::keys(["count"])).without_projection();
        let page = flux.instantiate(connect.apply(ComponentConfig::default()));
        page.mount().unwrap();
        assert_eq!(page.subscription_count(), 0);
    }

    #[test]
    fn unmount_detaches_projector() {
        let flux = counter();
        let page = flux.instantiate(flux.connect(Projection::keys(["count"])).apply(ComponentConfig::default()));
        page.mount().unwrap();
        assert_eq!(flux.bus().listeners("updateState").len(), 1);

        page.unmount();
        assert!(!flux.bus().has_listeners("updateState"));
        flux.update(state(json!({"count": 4}))).unwrap();
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(0));
    }

    #[test]
    fn mount_twice_keeps_one_projector() {
        let flux = counter();
        let hook_runs = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hook_runs);
        let config = ComponentConfig::default().on_mount(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let page = flux.instantiate(flux.connect(Projection::keys(["count"])).apply(config));

        page.mount().unwrap();
        page.mount().unwrap();
        assert!(page.is_mounted());
        assert_eq!(page.subscription_count(), 1);
        assert_eq!(flux.bus().listeners("updateState").len(), 1);
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);

        page.unmount();
        assert!(!page.is_mounted());
        page.mount().unwrap();
        assert_eq!(flux.bus().listeners("updateState").len(), 1);
        assert_eq!(hook_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_component_detaches_projector() {
        let flux = counter();
        {
            let page = flux.instantiate(flux.connect(Projection::keys(["count"])).apply(ComponentConfig::default()));
            page.mount().unwrap();
            assert!(flux.bus().has_listeners("updateState"));
        }
        assert!(!flux.bus().has_listeners("updateState"));
    }

    #[test]
    fn derive_sees_original_config() {
        let flux = counter();
        let projection = Projection::mapping().prop(
            "label",
            PropSource::derive(|state, config| {
                let tag = config.data.get("tag").and_then(StateValue::as_str).unwrap_or("?");
                let count = state.get("count").and_then(StateValue::as_i64).unwrap_or(0);
                StateValue::from(format!("{}:{}", tag, count))
            }),
        );
        let page = flux.instantiate(
            flux.connect(projection)
                .apply(ComponentConfig::new(state(json!({"tag": "t"})))),
        );
        page.mount().unwrap();
        flux.update(state(json!({"count": 2}))).unwrap();
        assert_eq!(page.data().get("label").and_then(StateValue::as_str), Some("t:2"));
    }

    // ========================================================================
    // Component
    // ========================================================================

    #[test]
    fn component_methods_shadow_store_actions() {
        let flux = counter();
        let page = flux.instantiate(
            ComponentConfig::new(state(json!({"count": 100}))).method("increment", |ctx, _| {
                let count = ctx.state().get("count").and_then(StateValue::as_i64).unwrap_or(0);
                ctx.update(StateValue::from_entries([("count", count + 10)]))
            }),
        );

        let fut = page.dispatch("increment", StateValue::Null).unwrap();
        futures::executor::block_on(fut).unwrap();

        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(110));
        assert_eq!(flux.state().get("count").and_then(StateValue::as_i64), Some(0));
    }

    #[test]
    fn component_falls_back_to_store_action() {
        let flux = counter();
        let page = flux.instantiate(ComponentConfig::default());
        let fut = page.dispatch("increment", StateValue::Null).unwrap();
        futures::executor::block_on(fut).unwrap();
        // the action commits through the component's own core
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(1));
        assert_eq!(flux.state().get("count").and_then(StateValue::as_i64), Some(0));
    }

    #[test]
    fn component_commit_broadcasts_on_store_bus() {
        let flux = counter();
        let page = flux.instantiate(ComponentConfig::default());
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let _sub = flux.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        page.update(state(json!({"count": 3}))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mount_hydrates_from_namespace() {
        let disk = Arc::new(MemoryStore::new());
        disk.set("todo:count", &StateValue::from(42i64)).unwrap();
        let flux = Flux::builder(StoreDefinition::new(state(json!({"count": 0}))))
            .persistence(disk)
            .build();

        let page = flux.instantiate(ComponentConfig::default().with_namespace("todo:"));
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(0));
        page.mount().unwrap();
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(42));
    }

    #[test]
    fn mount_uses_store_namespace() {
        let disk = Arc::new(MemoryStore::new());
        disk.set("app:count", &StateValue::from(7i64)).unwrap();
        let flux = Flux::builder(StoreDefinition::new(state(json!({"count": 0}))))
            .config(StoreConfig::default().with_namespace("app:"))
            .persistence(disk)
            .build();

        let page = flux.instantiate(ComponentConfig::default());
        page.mount().unwrap();
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(7));
    }

    #[test]
    fn set_data_merges() {
        let flux = counter();
        let page = flux.instantiate(ComponentConfig::default());
        page.set_data(state(json!({"extra": 1})));
        assert_eq!(page.data().get("extra").and_then(StateValue::as_i64), Some(1));
        assert_eq!(page.data().get("count").and_then(StateValue::as_i64), Some(0));
    }
}
