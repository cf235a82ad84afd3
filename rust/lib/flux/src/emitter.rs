use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;
use regex::Regex;
use tracing::trace;

/// Listener callback: receives the emitted arguments, returns a flag that is
/// compared against the bus's once-return value for listeners that opt in.
pub type ListenerFn<A> = dyn Fn(&[A]) -> bool + Send + Sync;

/// A registered callback.
///
/// Identity is the identity of the wrapped closure: clones of one
/// `Listener` are the same listener, two `Listener::new` calls are not,
/// even for identical closures.
pub struct Listener<A> {
    func: Arc<ListenerFn<A>>,
    off_on_sentinel: bool,
}

impl<A> Listener<A> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[A]) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            off_on_sentinel: false,
        }
    }

    /// Opt in to removal whenever this listener returns the bus's
    /// once-return value (see [`EventBus::set_once_return_value`]).
    pub fn off_on_sentinel(mut self) -> Self {
        self.off_on_sentinel = true;
        self
    }

    /// Whether `self` and `other` wrap the same closure.
    pub fn same(&self, other: &Listener<A>) -> bool {
        Arc::as_ptr(&self.func) as *const () == Arc::as_ptr(&other.func) as *const ()
    }

    fn call(&self, args: &[A]) -> bool {
        (self.func)(args)
    }
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            off_on_sentinel: self.off_on_sentinel,
        }
    }
}

impl<A> fmt::Debug for Listener<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &(Arc::as_ptr(&self.func) as *const ()))
            .field("off_on_sentinel", &self.off_on_sentinel)
            .finish()
    }
}

/// A listener as stored in an event's sequence.
pub struct ListenerRecord<A> {
    pub listener: Listener<A>,
    pub once: bool,
}

impl<A> ListenerRecord<A> {
    pub fn once(listener: Listener<A>) -> Self {
        Self {
            listener,
            once: true,
        }
    }
}

impl<A> From<Listener<A>> for ListenerRecord<A> {
    fn from(listener: Listener<A>) -> Self {
        Self {
            listener,
            once: false,
        }
    }
}

impl<A> Clone for ListenerRecord<A> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            once: self.once,
        }
    }
}

impl<A> fmt::Debug for ListenerRecord<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRecord")
            .field("listener", &self.listener)
            .field("once", &self.once)
            .finish()
    }
}

/// Which events an operation applies to.
#[derive(Debug, Clone)]
pub enum EventSelector {
    /// One event, created on first use.
    Name(String),
    /// Every existing event whose name matches.
    Pattern(Regex),
}

impl From<&str> for EventSelector {
    fn from(name: &str) -> Self {
        EventSelector::Name(name.to_string())
    }
}

impl From<String> for EventSelector {
    fn from(name: String) -> Self {
        EventSelector::Name(name)
    }
}

impl From<Regex> for EventSelector {
    fn from(pattern: Regex) -> Self {
        EventSelector::Pattern(pattern)
    }
}

impl From<&Regex> for EventSelector {
    fn from(pattern: &Regex) -> Self {
        EventSelector::Pattern(pattern.clone())
    }
}

/// Batch form: each event name with the listeners to add or remove.
pub type ListenerMap<A> = Vec<(String, Vec<Listener<A>>)>;

/// Event name to listener records, in event creation order.
pub type EventTable<A> = IndexMap<String, Vec<ListenerRecord<A>>>;

/// Named-event publish/subscribe engine.
///
/// - Events are kept in creation order; listeners in registration order,
///   which is also the dispatch order.
/// - Registering the same listener twice under one event is a no-op.
/// - `once` records are removed right before their first invocation.
/// - A listener's return value only matters if it was built with
///   [`Listener::off_on_sentinel`]: such a listener is removed when it
///   returns the once-return value. Plain listeners are never removed by
///   what they return, whether `true` or `false`.
/// - Emission works on a snapshot: listeners added or removed while an
///   emission is in flight only affect later emissions.
///
/// Most operations return `&Self` so calls can be chained.
pub struct EventBus<A> {
    events: RwLock<EventTable<A>>,
    once_return: AtomicBool,
}

impl<A> EventBus<A> {
    /// Create a bus with no events and a once-return value of `true`.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(IndexMap::new()),
            once_return: AtomicBool::new(true),
        }
    }

    // ====================================================================
    // Inspection
    // ====================================================================

    /// Listener records per selected event.
    ///
    /// A `Name` selector always yields exactly one entry (creating the
    /// event if needed); a `Pattern` yields every matching event.
    pub fn get_listeners(&self, selector: impl Into<EventSelector>) -> EventTable<A> {
        let selector = selector.into();
        let mut events = self.events.write().unwrap();
        targets(&mut events, &selector)
            .into_iter()
            .map(|name| {
                let records = events.get(&name).cloned().unwrap_or_default();
                (name, records)
            })
            .collect()
    }

    /// Listener records of a single event, creating it if needed.
    pub fn listeners(&self, event: &str) -> Vec<ListenerRecord<A>> {
        let mut events = self.events.write().unwrap();
        events.entry(event.to_string()).or_default().clone()
    }

    /// Strip records down to their listeners.
    pub fn flatten_listeners(records: &[ListenerRecord<A>]) -> Vec<Listener<A>> {
        records.iter().map(|r| r.listener.clone()).collect()
    }

    /// Names of all defined events, in creation order.
    pub fn event_names(&self) -> Vec<String> {
        let events = self.events.read().unwrap();
        events.keys().cloned().collect()
    }

    /// Whether `event` currently has at least one listener.
    pub fn has_listeners(&self, event: &str) -> bool {
        let events = self.events.read().unwrap();
        events.get(event).is_some_and(|records| !records.is_empty())
    }

    // ====================================================================
    // Registration
    // ====================================================================

    /// Register a listener (or a prepared record) on the selected events.
    pub fn add_listener(
        &self,
        selector: impl Into<EventSelector>,
        record: impl Into<ListenerRecord<A>>,
    ) -> &Self {
        self.insert(&selector.into(), record.into());
        self
    }

    /// Alias of [`EventBus::add_listener`].
    pub fn on(&self, selector: impl Into<EventSelector>, record: impl Into<ListenerRecord<A>>) -> &Self {
        self.add_listener(selector, record)
    }

    /// Register a listener that removes itself the first time it fires.
    pub fn add_once_listener(&self, selector: impl Into<EventSelector>, listener: Listener<A>) -> &Self {
        self.add_listener(selector, ListenerRecord::once(listener))
    }

    /// Alias of [`EventBus::add_once_listener`].
    pub fn once(&self, selector: impl Into<EventSelector>, listener: Listener<A>) -> &Self {
        self.add_once_listener(selector, listener)
    }

    /// Register several listeners on the selected events.
    ///
    /// Listeners are applied last-to-first, so the last one in `listeners`
    /// ends up first in dispatch order.
    pub fn add_listeners(&self, selector: impl Into<EventSelector>, listeners: Vec<Listener<A>>) -> &Self {
        let selector = selector.into();
        for listener in listeners.into_iter().rev() {
            self.insert(&selector, listener.into());
        }
        self
    }

    /// Batch registration: every `(event, listeners)` entry in order.
    pub fn add_listener_map(&self, map: ListenerMap<A>) -> &Self {
        for (event, listeners) in map {
            self.add_listeners(event, listeners);
        }
        self
    }

    /// Ensure an event exists, with an empty sequence if it is new.
    pub fn define_event(&self, event: &str) -> &Self {
        let mut events = self.events.write().unwrap();
        events.entry(event.to_string()).or_default();
        self
    }

    pub fn define_events(&self, events: &[&str]) -> &Self {
        for event in events {
            self.define_event(event);
        }
        self
    }

    // ====================================================================
    // Removal
    // ====================================================================

    /// Remove a listener from the selected events. No-op when absent.
    pub fn remove_listener(&self, selector: impl Into<EventSelector>, listener: &Listener<A>) -> &Self {
        self.remove_from(&selector.into(), listener);
        self
    }

    /// Alias of [`EventBus::remove_listener`].
    pub fn off(&self, selector: impl Into<EventSelector>, listener: &Listener<A>) -> &Self {
        self.remove_listener(selector, listener)
    }

    pub fn remove_listeners(&self, selector: impl Into<EventSelector>, listeners: &[Listener<A>]) -> &Self {
        let selector = selector.into();
        for listener in listeners.iter().rev() {
            self.remove_from(&selector, listener);
        }
        self
    }

    /// Batch removal, symmetric to [`EventBus::add_listener_map`].
    pub fn remove_listener_map(&self, map: &ListenerMap<A>) -> &Self {
        for (event, listeners) in map {
            self.remove_listeners(event.as_str(), listeners);
        }
        self
    }

    /// Delete the selected events together with all their listeners.
    pub fn remove_event(&self, selector: impl Into<EventSelector>) -> &Self {
        let mut events = self.events.write().unwrap();
        match selector.into() {
            EventSelector::Name(name) => {
                events.shift_remove(&name);
            }
            EventSelector::Pattern(pattern) => {
                events.retain(|name, _| !pattern.is_match(name));
            }
        }
        self
    }

    /// Delete every event.
    pub fn remove_all_listeners(&self) -> &Self {
        self.events.write().unwrap().clear();
        self
    }

    // ====================================================================
    // Emission
    // ====================================================================

    /// Invoke every listener of the selected events with `args`.
    ///
    /// Listeners run synchronously, in registration order, without any
    /// internal lock held, so they may freely register, remove or emit.
    pub fn emit_event(&self, selector: impl Into<EventSelector>, args: &[A]) -> &Self {
        let selector = selector.into();
        let snapshot: Vec<(String, Vec<ListenerRecord<A>>)> = {
            let mut events = self.events.write().unwrap();
            targets(&mut events, &selector)
                .into_iter()
                .map(|name| {
                    let records = events.get(&name).cloned().unwrap_or_default();
                    (name, records)
                })
                .collect()
        };

        for (event, records) in snapshot {
            trace!(event = %event, listeners = records.len(), "emit");
            for record in records {
                if record.once {
                    self.remove_from(&selector, &record.listener);
                }
                let response = record.listener.call(args);
                if record.listener.off_on_sentinel && response == self.once_return_value() {
                    self.remove_from(&selector, &record.listener);
                }
            }
        }
        self
    }

    /// Alias of [`EventBus::emit_event`].
    pub fn trigger(&self, selector: impl Into<EventSelector>, args: &[A]) -> &Self {
        self.emit_event(selector, args)
    }

    /// Emit with arguments given as any iterable.
    pub fn emit<I>(&self, selector: impl Into<EventSelector>, args: I) -> &Self
    where
        I: IntoIterator<Item = A>,
    {
        let args: Vec<A> = args.into_iter().collect();
        self.emit_event(selector, &args)
    }

    /// Set the value that removes opted-in listeners when they return it.
    pub fn set_once_return_value(&self, value: bool) -> &Self {
        self.once_return.store(value, Ordering::Relaxed);
        self
    }

    pub fn once_return_value(&self) -> bool {
        self.once_return.load(Ordering::Relaxed)
    }

    // ====================================================================
    // Disposable subscriptions
    // ====================================================================

    /// Register `listener` on `event` and return a handle that removes it
    /// again when released or dropped.
    pub fn subscribe(self: &Arc<Self>, event: &str, listener: Listener<A>) -> Subscription<A> {
        self.add_listener(event, listener.clone());
        Subscription {
            bus: Arc::downgrade(self),
            event: event.to_string(),
            listener,
            active: true,
        }
    }

    // ====================================================================
    // Internals
    // ====================================================================

    fn insert(&self, selector: &EventSelector, record: ListenerRecord<A>) {
        let mut events = self.events.write().unwrap();
        for name in targets(&mut events, selector) {
            if let Some(records) = events.get_mut(&name) {
                if !records.iter().any(|r| r.listener.same(&record.listener)) {
                    records.push(record.clone());
                }
            }
        }
    }

    fn remove_from(&self, selector: &EventSelector, listener: &Listener<A>) {
        let mut events = self.events.write().unwrap();
        for name in targets(&mut events, selector) {
            if let Some(records) = events.get_mut(&name) {
                if let Some(index) = records.iter().position(|r| r.listener.same(listener)) {
                    records.remove(index);
                }
            }
        }
    }
}

impl<A> Default for EventBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Event names a selector applies to. Named events are created on demand.
fn targets<A>(events: &mut EventTable<A>, selector: &EventSelector) -> Vec<String> {
    match selector {
        EventSelector::Name(name) => {
            events.entry(name.clone()).or_default();
            vec![name.clone()]
        }
        EventSelector::Pattern(pattern) => events
            .keys()
            .filter(|name| pattern.is_match(name))
            .cloned()
            .collect(),
    }
}

/// Handle to a listener registered through [`EventBus::subscribe`].
///
/// The listener stays registered until the handle is released or dropped.
/// The handle does not keep the bus alive.
pub struct Subscription<A> {
    bus: Weak<EventBus<A>>,
    event: String,
    listener: Listener<A>,
    active: bool,
}

impl<A> Subscription<A> {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the listener now.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_listener(self.event.as_str(), &self.listener);
        }
    }
}

impl<A> Drop for Subscription<A> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<A> fmt::Debug for Subscription<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.active)
            .finish()
    }
}
