//! Flux: a mini-program style state store.
//!
//! One state tree per store, changed only through `commit`, with every
//! post-commit state broadcast on an event bus.
//!
//! # Pieces
//!
//! - [`EventBus`]: named and regex-selected events, once listeners and an
//!   opt-in "remove me" return value
//! - [`set_in`]: structural-sharing update along a key path
//! - [`MutationRegistry`]: named reducers, with `default` and `setIn` built in
//! - [`StoreCore`]: `commit` / `dispatch` / `put` bound to one data holder
//! - [`ActionRegistry`]: per-store named actions, sync or async
//! - [`Connect`] / [`Projector`]: keep component data in step with the store
//! - [`PersistStore`]: optional key-value persistence for namespaced commits
//!
//! # Example
//!
//! ```ignore
//! use openerp_flux::{Flux, StoreDefinition, StateValue, Projection, ComponentConfig};
//!
//! let flux = Flux::new(
//!     StoreDefinition::new(StateValue::from_entries([("count", 0)]))
//!         .action("increment", |ctx, _| {
//!             let n = ctx.state().get("count").and_then(StateValue::as_i64).unwrap_or(0);
//!             ctx.update(StateValue::from_entries([("count", n + 1)]))
//!         }),
//! );
//!
//! let page = flux.instantiate(
//!     flux.connect(Projection::keys(["count"]))
//!         .apply(ComponentConfig::default()),
//! );
//! page.mount()?;
//!
//! flux.dispatch("increment", StateValue::Null)?.await?;
//! ```

pub mod action;
pub mod app;
pub mod config;
pub mod connect;
pub mod emitter;
pub mod error;
pub mod mutation;
pub mod path;
pub mod persist;
pub mod store;
pub mod value;

// Re-export primary types at crate root.
pub use action::{ActionFn, ActionFuture, ActionOutput, ActionRegistry};
pub use app::{Flux, FluxBuilder, StoreDefinition};
pub use config::{StoreConfig, UPDATE_STATE_EVENT};
pub use connect::{Component, ComponentConfig, Connect, MountHook, Projection, Projector, PropSource};
pub use emitter::{EventBus, EventSelector, Listener, ListenerRecord, Subscription};
pub use error::{FluxError, PersistError};
pub use mutation::{MutationFn, MutationRegistry, MutationSelector, DEFAULT_MUTATION, SET_IN_MUTATION};
pub use path::{set_in, PathKey};
pub use persist::{MemoryStore, PersistStore, RedbStore};
pub use store::{ActionContext, CommitKind, CommitOptions, DataBag, LocalData, StoreCore};
pub use value::{StateMap, StateValue};
