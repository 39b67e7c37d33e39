//! Event dispatch registry
//!
//! Consumers subscribe to one kind of link event and receive a
//! [`SubscriptionId`] they later hand back to unsubscribe. Identifiers grow
//! monotonically from 1 and are never reused, so the map ordered by id is
//! also the registration order used for dispatch.
//!
//! Dispatch clones the matching handlers out of the lock before invoking
//! any of them. A handler may subscribe or unsubscribe while being
//! dispatched; the change applies from the next dispatch on.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::activity::ActivityReport;

/// Identifier handed out by [`EventRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// Returned when a subscription was refused
    pub const NONE: SubscriptionId = SubscriptionId(0);

    /// Raw identifier value
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this is the [`NONE`](Self::NONE) sentinel
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Kinds of event a consumer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Network joined
    Joined,
    /// Application downlink received
    DataReceived,
    /// Requested transmit interval changed
    DutyCycleChanged,
    /// Confirmed uplink acknowledged or given up on
    ConfirmResult,
    /// Activity snapshot published
    Activity,
}

/// Join callback
pub type JoinFn = Arc<dyn Fn() + Send + Sync>;
/// Downlink callback, receives the application payload
pub type ReceiveFn = Arc<dyn Fn(&[u8]) + Send + Sync>;
/// Duty-cycle callback, receives the new interval in seconds
pub type DutyCycleFn = Arc<dyn Fn(u32) + Send + Sync>;
/// Confirmation callback, receives whether the uplink was acknowledged
pub type ConfirmFn = Arc<dyn Fn(bool) + Send + Sync>;
/// Activity feed callback
pub type ActivityFn = Arc<dyn Fn(&ActivityReport) + Send + Sync>;

/// A callback, typed by the event it accepts
#[derive(Clone)]
pub enum Handler {
    /// See [`EventKind::Joined`]
    Joined(JoinFn),
    /// See [`EventKind::DataReceived`]
    DataReceived(ReceiveFn),
    /// See [`EventKind::DutyCycleChanged`]
    DutyCycleChanged(DutyCycleFn),
    /// See [`EventKind::ConfirmResult`]
    ConfirmResult(ConfirmFn),
    /// See [`EventKind::Activity`]
    Activity(ActivityFn),
}

impl Handler {
    /// Event kind this handler accepts
    pub fn kind(&self) -> EventKind {
        match self {
            Handler::Joined(_) => EventKind::Joined,
            Handler::DataReceived(_) => EventKind::DataReceived,
            Handler::DutyCycleChanged(_) => EventKind::DutyCycleChanged,
            Handler::ConfirmResult(_) => EventKind::ConfirmResult,
            Handler::Activity(_) => EventKind::Activity,
        }
    }
}

impl core::fmt::Debug for Handler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Handler").field(&self.kind()).finish()
    }
}

struct Inner {
    next_id: u32,
    capacity: usize,
    entries: BTreeMap<u32, Handler>,
}

impl Inner {
    fn insert(&mut self, handler: Handler) -> SubscriptionId {
        if self.entries.len() >= self.capacity || self.next_id == 0 {
            warn!("subscription refused, registry full or ids exhausted");
            return SubscriptionId::NONE;
        }
        let id = self.next_id;
        // Wraps to 0 after u32::MAX, which refuses every later subscription
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(id, handler);
        SubscriptionId(id)
    }

    fn remove(&mut self, id: SubscriptionId, kind: Option<EventKind>) -> bool {
        match self.entries.get(&id.0) {
            Some(handler) if kind.map_or(true, |k| handler.kind() == k) => {
                self.entries.remove(&id.0);
                true
            }
            _ => false,
        }
    }
}

/// Subscriptions for every event kind, shared between the link and its consumers
pub struct EventRegistry<M: RawMutex> {
    inner: Mutex<M, RefCell<Inner>>,
}

impl<M: RawMutex> EventRegistry<M> {
    /// Unbounded registry
    pub const fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Registry holding at most `capacity` subscriptions
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                next_id: 1,
                capacity,
                entries: BTreeMap::new(),
            })),
        }
    }

    /// Register `handler`. Returns [`SubscriptionId::NONE`] when the registry
    /// is full.
    pub fn subscribe(&self, handler: Handler) -> SubscriptionId {
        self.inner.lock(|cell| cell.borrow_mut().insert(handler))
    }

    /// Subscribe to [`EventKind::Joined`]
    pub fn on_join<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(Handler::Joined(Arc::new(f)))
    }

    /// Subscribe to [`EventKind::DataReceived`]
    pub fn on_receive<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.subscribe(Handler::DataReceived(Arc::new(f)))
    }

    /// Subscribe to [`EventKind::DutyCycleChanged`]
    pub fn on_duty_cycle<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.subscribe(Handler::DutyCycleChanged(Arc::new(f)))
    }

    /// Subscribe to [`EventKind::ConfirmResult`]
    pub fn on_confirm<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.subscribe(Handler::ConfirmResult(Arc::new(f)))
    }

    /// Subscribe to [`EventKind::Activity`]
    pub fn on_activity<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&ActivityReport) + Send + Sync + 'static,
    {
        self.subscribe(Handler::Activity(Arc::new(f)))
    }

    /// Remove the subscription `id`, whatever its kind. Unknown ids are
    /// ignored. Returns whether a subscription was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock(|cell| cell.borrow_mut().remove(id, None))
    }

    /// Remove `id` only if it is a join subscription
    pub fn remove_join(&self, id: SubscriptionId) -> bool {
        self.remove_kind(id, EventKind::Joined)
    }

    /// Remove `id` only if it is a downlink subscription
    pub fn remove_receive(&self, id: SubscriptionId) -> bool {
        self.remove_kind(id, EventKind::DataReceived)
    }

    /// Remove `id` only if it is a duty-cycle subscription
    pub fn remove_duty_cycle(&self, id: SubscriptionId) -> bool {
        self.remove_kind(id, EventKind::DutyCycleChanged)
    }

    /// Remove `id` only if it is a confirmation subscription
    pub fn remove_confirm(&self, id: SubscriptionId) -> bool {
        self.remove_kind(id, EventKind::ConfirmResult)
    }

    /// Remove `id` only if it is an activity subscription
    pub fn remove_activity(&self, id: SubscriptionId) -> bool {
        self.remove_kind(id, EventKind::Activity)
    }

    fn remove_kind(&self, id: SubscriptionId, kind: EventKind) -> bool {
        self.inner.lock(|cell| cell.borrow_mut().remove(id, Some(kind)))
    }

    /// Number of subscriptions of `kind`
    pub fn count(&self, kind: EventKind) -> usize {
        self.inner.lock(|cell| {
            cell.borrow()
                .entries
                .values()
                .filter(|handler| handler.kind() == kind)
                .count()
        })
    }

    /// Total number of subscriptions
    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().entries.len())
    }

    /// Whether nothing is subscribed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Handler> {
        self.inner.lock(|cell| {
            cell.borrow()
                .entries
                .values()
                .filter(|handler| handler.kind() == kind)
                .cloned()
                .collect()
        })
    }

    /// Invoke every join subscriber in registration order
    pub fn dispatch_joined(&self) {
        for handler in self.snapshot(EventKind::Joined) {
            if let Handler::Joined(f) = handler {
                f();
            }
        }
    }

    /// Invoke every downlink subscriber with `payload`
    pub fn dispatch_received(&self, payload: &[u8]) {
        for handler in self.snapshot(EventKind::DataReceived) {
            if let Handler::DataReceived(f) = handler {
                f(payload);
            }
        }
    }

    /// Invoke every duty-cycle subscriber with the new interval
    pub fn dispatch_duty_cycle(&self, secs: u32) {
        for handler in self.snapshot(EventKind::DutyCycleChanged) {
            if let Handler::DutyCycleChanged(f) = handler {
                f(secs);
            }
        }
    }

    /// Invoke every confirmation subscriber with the outcome
    pub fn dispatch_confirm(&self, acknowledged: bool) {
        for handler in self.snapshot(EventKind::ConfirmResult) {
            if let Handler::ConfirmResult(f) = handler {
                f(acknowledged);
            }
        }
    }

    /// Invoke every activity subscriber with `report`
    pub fn dispatch_activity(&self, report: &ActivityReport) {
        for handler in self.snapshot(EventKind::Activity) {
            if let Handler::Activity(f) = handler {
                f(report);
            }
        }
    }
}

impl<M: RawMutex> Default for EventRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
