//! # Listener Registry
//!
//! Maps event names to ordered sequences of listeners and dispatches payloads
//! to them. This is the in-process half of the bus: it knows nothing about
//! transports and can be used on its own, or composed onto other values with
//! [`ListenerRegistry::attach`].
//!
//! ## Semantics
//!
//! - Listeners fire in registration order.
//! - Registering the same [`Listener`] twice stores two entries; both fire.
//! - [`ListenerRegistry::off`] removes every entry sharing the listener's identity.
//! - A [`Subscription`] removes only the single entry that produced it.
//! - `emit` snapshots the sequence before calling anything, and no lock is held
//!   while listeners run, so listeners may register or remove listeners freely.
//!   Such changes take effect from the next emit.
//! - A listener returning `Err` or panicking is logged and recorded in the
//!   [`DispatchReport`]; the remaining listeners still run.

use crate::envelope::ListenerEvent;
use crate::error::ListenerError;
use compact_str::CompactString;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

type ListenerFn = dyn Fn(&ListenerEvent) -> Result<(), ListenerError> + Send + Sync;

/// A callback handle.
///
/// Cloning a `Listener` yields the *same* callback as far as the registry is
/// concerned: identity is the shared closure, not the handle. Two listeners
/// built from two separate `Listener::new` calls are always distinct, even if
/// the closures are textually identical.
#[derive(Clone)]
pub struct Listener {
    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Wraps a fallible callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ListenerEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Wraps a callback that cannot fail.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&ListenerEvent) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            callback(event);
            Ok(())
        })
    }

    /// Returns true if both handles refer to the same callback.
    pub fn same_as(&self, other: &Listener) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.callback).cast::<()>(),
            Arc::as_ptr(&other.callback).cast::<()>(),
        )
    }

    fn call(&self, event: &ListenerEvent) -> Result<(), ListenerError> {
        (self.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("callback", &Arc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct RegistryInner {
    listeners: DashMap<CompactString, SmallVec<[Entry; 4]>>,
    next_id: AtomicU64,
    events_emitted: AtomicU64,
    listener_invocations: AtomicU64,
    listener_faults: AtomicU64,
}

impl RegistryInner {
    fn remove_entry(&self, event: &str, id: u64) -> bool {
        let Some(mut entries) = self.listeners.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    fn contains_entry(&self, event: &str, id: u64) -> bool {
        self.listeners
            .get(event)
            .map(|entries| entries.iter().any(|entry| entry.id == id))
            .unwrap_or(false)
    }
}

/// Unsubscribe token returned by [`ListenerRegistry::on`].
///
/// Holds only a weak reference to the registry: it never keeps a registry
/// alive, and becomes a no-op once the registry is gone.
#[derive(Clone)]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    event: CompactString,
    id: u64,
}

impl Subscription {
    /// Removes the entry this token was issued for.
    ///
    /// Returns `true` if an entry was removed. Calling it again, or after the
    /// listener was removed through `off`, returns `false`.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => {
                let removed = inner.remove_entry(&self.event, self.id);
                if removed {
                    debug!("🗑️ Unsubscribed listener #{} from '{}'", self.id, self.event);
                }
                removed
            }
            None => false,
        }
    }

    /// Whether the entry is still registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|inner| inner.contains_entry(&self.event, self.id))
            .unwrap_or(false)
    }

    /// The event name this token is bound to.
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

/// A listener failure recorded during one emit.
#[derive(Debug)]
pub struct ListenerFault {
    /// Zero-based position of the listener in the dispatch snapshot
    pub position: usize,
    pub error: ListenerError,
}

/// Summary of a single `emit`.
#[derive(Debug)]
pub struct DispatchReport {
    pub event: CompactString,
    /// Listeners that returned `Ok`
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked, in dispatch order
    pub faults: Vec<ListenerFault>,
}

impl DispatchReport {
    fn empty(event: &str) -> Self {
        Self {
            event: CompactString::new(event),
            delivered: 0,
            faults: Vec::new(),
        }
    }

    /// Number of listeners that were invoked.
    pub fn invoked(&self) -> usize {
        self.delivered + self.faults.len()
    }

    /// True when no listener failed.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Registry statistics for monitoring
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Listeners currently registered across all events
    pub total_listeners: usize,
    /// Number of `emit` calls, including those with no listeners
    pub events_emitted: u64,
    /// Number of listener invocations
    pub listener_invocations: u64,
    /// Number of invocations that returned an error or panicked
    pub listener_faults: u64,
}

/// The pub/sub capability: anything that can register, remove and dispatch
/// listeners by event name.
///
/// Implemented by [`ListenerRegistry`] itself and by [`Attached`] values, so
/// components can accept "something with listeners" without caring which.
pub trait EventEmitter {
    fn on(&self, event: &str, listener: Listener) -> Subscription;
    fn off(&self, event: &str, listener: &Listener);
    fn emit(&self, event: &str, payload: Value) -> DispatchReport;
    fn has(&self, event: &str) -> bool;
}

/// Event name to listener sequence map.
///
/// Cheap to clone; clones share the same underlying registry.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with `(event, listener)` pairs, in order.
    pub fn from_listeners<I, S>(listeners: I) -> Self
    where
        I: IntoIterator<Item = (S, Listener)>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        for (event, listener) in listeners {
            registry.on(event.as_ref(), listener);
        }
        registry
    }

    /// Appends `listener` to the sequence for `event`.
    pub fn on(&self, event: &str, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .listeners
            .entry(CompactString::new(event))
            .or_insert_with(SmallVec::new)
            .push(Entry { id, listener });

        debug!("📝 Registered listener #{} for '{}'", id, event);

        Subscription {
            registry: Arc::downgrade(&self.inner),
            event: CompactString::new(event),
            id,
        }
    }

    /// Removes every entry for `event` whose callback is `listener`.
    pub fn off(&self, event: &str, listener: &Listener) {
        let Some(mut entries) = self.inner.listeners.get_mut(event) else {
            return;
        };

        let before = entries.len();
        entries.retain(|entry| !entry.listener.same_as(listener));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("🗑️ Removed {} listener(s) from '{}'", removed, event);
        }
    }

    /// True iff `event` has at least one listener.
    pub fn has(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    /// Number of entries registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .listeners
            .get(event)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Event names that currently have listeners.
    pub fn events(&self) -> Vec<String> {
        self.inner
            .listeners
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().to_string())
            .collect()
    }

    /// Invokes every listener registered for `event` with `{event, data: payload}`.
    pub fn emit(&self, event: &str, payload: Value) -> DispatchReport {
        self.inner.events_emitted.fetch_add(1, Ordering::Relaxed);

        let snapshot: SmallVec<[Listener; 4]> = match self.inner.listeners.get(event) {
            Some(entries) => entries.iter().map(|entry| entry.listener.clone()).collect(),
            None => SmallVec::new(),
        };

        if snapshot.is_empty() {
            debug!("No listeners for event '{}'", event);
            return DispatchReport::empty(event);
        }

        debug!("📤 Emitting '{}' to {} listener(s)", event, snapshot.len());

        let notice = ListenerEvent::new(event, payload);
        let mut report = DispatchReport::empty(event);

        for (position, listener) in snapshot.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.call(&notice)));

            let error = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(error)) => error,
                Err(panic) => ListenerError::Panicked(panic_message(panic.as_ref())),
            };

            error!("❌ Listener {} for '{}' failed: {}", position, event, error);
            report.faults.push(ListenerFault { position, error });
        }

        self.inner
            .listener_invocations
            .fetch_add(report.invoked() as u64, Ordering::Relaxed);
        self.inner
            .listener_faults
            .fetch_add(report.faults.len() as u64, Ordering::Relaxed);

        report
    }

    /// Gives `target` pub/sub capability backed by this registry.
    pub fn attach<T>(&self, target: T) -> Attached<T> {
        Attached {
            target,
            registry: self.clone(),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_listeners: self
                .inner
                .listeners
                .iter()
                .map(|entry| entry.value().len())
                .sum(),
            events_emitted: self.inner.events_emitted.load(Ordering::Relaxed),
            listener_invocations: self.inner.listener_invocations.load(Ordering::Relaxed),
            listener_faults: self.inner.listener_faults.load(Ordering::Relaxed),
        }
    }
}

impl EventEmitter for ListenerRegistry {
    fn on(&self, event: &str, listener: Listener) -> Subscription {
        ListenerRegistry::on(self, event, listener)
    }

    fn off(&self, event: &str, listener: &Listener) {
        ListenerRegistry::off(self, event, listener)
    }

    fn emit(&self, event: &str, payload: Value) -> DispatchReport {
        ListenerRegistry::emit(self, event, payload)
    }

    fn has(&self, event: &str) -> bool {
        ListenerRegistry::has(self, event)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("events", &self.inner.listeners.len())
            .finish()
    }
}

/// A value composed with a listener registry.
///
/// Derefs to the wrapped value; the pub/sub operations come from
/// [`EventEmitter`] and always forward to the registry passed to
/// [`ListenerRegistry::attach`].
pub struct Attached<T> {
    target: T,
    registry: ListenerRegistry,
}

impl<T> Attached<T> {
    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Detaches, returning the wrapped value. The registry is unaffected.
    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T> Deref for Attached<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> EventEmitter for Attached<T> {
    fn on(&self, event: &str, listener: Listener) -> Subscription {
        self.registry.on(event, listener)
    }

    fn off(&self, event: &str, listener: &Listener) {
        self.registry.off(event, listener)
    }

    fn emit(&self, event: &str, payload: Value) -> DispatchReport {
        self.registry.emit(event, payload)
    }

    fn has(&self, event: &str) -> bool {
        self.registry.has(event)
    }
}

impl<T: fmt::Debug> fmt::Debug for Attached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attached")
            .field("target", &self.target)
            .field("registry", &self.registry)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
