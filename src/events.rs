//! Typed event bus used by every repository.
//!
//! Each repository owns one bus per event family. Listeners are registered
//! for an event *kind*; a kind may cover several events (`DataChange` is
//! both `Add` and `Update`). Delivery is synchronous and in registration
//! order.
//!
//! ```
//! use skyport::events::{CartEvent, CartEventKind, EventBus};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//!
//! let id = bus.listen(CartEventKind::CartChange, move |_: &CartEvent| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! bus.emit(&CartEvent::Clear);
//! assert!(bus.unlisten(id));
//! bus.emit(&CartEvent::Clear);
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use crate::entity::EntityId;
use crate::models::User;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An event that can be matched against listener kinds.
pub trait Event: Send + Sync {
    type Kind: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    /// True if a listener registered for `kind` should receive this event.
    fn matches(&self, kind: Self::Kind) -> bool;
}

/// Handle returned by [`EventBus::listen`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E: Event> {
    id: ListenerId,
    kind: E::Kind,
    callback: Callback<E>,
}

/// Synchronous publish/subscribe for one event family.
pub struct EventBus<E: Event> {
    listeners: RwLock<Vec<Listener<E>>>,
    next_id: AtomicU64,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        EventBus {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` for every event matching `kind`.
    pub fn listen<F>(&self, kind: E::Kind, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Listener {
            id,
            kind,
            callback: Arc::new(callback),
        });
        debug!("Registered listener {:?} for {:?}", id, kind);
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        before != listeners.len()
    }

    /// Deliver `event` to every matching listener.
    ///
    /// Listeners may register or remove listeners from inside the callback;
    /// such changes take effect from the next emission.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .listeners
            .read()
            .iter()
            .filter(|listener| event.matches(listener.kind))
            .map(|listener| Arc::clone(&listener.callback))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Event families
// ============================================================================

/// Lifecycle events of a generic repository.
#[derive(Clone, Debug, PartialEq)]
pub enum RepositoryEvent<M> {
    /// Cache loaded and default data seeded.
    Initialize,
    Add(M),
    Update(M),
    /// Cache reloaded from storage after a change in another tab,
    /// a corruption recovery, or a rollback.
    Reload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryEventKind {
    Initialize,
    Add,
    Update,
    /// `Add` or `Update`.
    DataChange,
    Reload,
}

impl<M: Send + Sync> Event for RepositoryEvent<M> {
    type Kind = RepositoryEventKind;

    fn matches(&self, kind: RepositoryEventKind) -> bool {
        use RepositoryEventKind as K;
        match self {
            RepositoryEvent::Initialize => kind == K::Initialize,
            RepositoryEvent::Add(_) => matches!(kind, K::Add | K::DataChange),
            RepositoryEvent::Update(_) => matches!(kind, K::Update | K::DataChange),
            RepositoryEvent::Reload => kind == K::Reload,
        }
    }
}

/// Cart mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartEvent {
    Add {
        product_id: EntityId,
        previous: u32,
        current: u32,
    },
    Remove {
        product_id: EntityId,
        previous: u32,
        current: u32,
    },
    Clear,
    /// Cart replaced by the version another tab stored, or stripped of
    /// products that no longer exist.
    Reload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CartEventKind {
    CartAdd,
    CartRemove,
    CartClear,
    /// Any cart mutation, including a reload.
    CartChange,
}

impl Event for CartEvent {
    type Kind = CartEventKind;

    fn matches(&self, kind: CartEventKind) -> bool {
        use CartEventKind as K;
        kind == K::CartChange
            || matches!(
                (self, kind),
                (CartEvent::Add { .. }, K::CartAdd)
                    | (CartEvent::Remove { .. }, K::CartRemove)
                    | (CartEvent::Clear, K::CartClear)
            )
    }
}

/// Authentication changes.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthEvent {
    Register(User),
    Login(User),
    Logout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEventKind {
    Register,
    Login,
    Logout,
    /// Any authentication change.
    AuthChange,
}

impl Event for AuthEvent {
    type Kind = AuthEventKind;

    fn matches(&self, kind: AuthEventKind) -> bool {
        use AuthEventKind as K;
        kind == K::AuthChange
            || matches!(
                (self, kind),
                (AuthEvent::Register(_), K::Register)
                    | (AuthEvent::Login(_), K::Login)
                    | (AuthEvent::Logout, K::Logout)
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_data_change_covers_add_and_update() {
        let bus: EventBus<RepositoryEvent<u8>> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.listen(RepositoryEventKind::DataChange, move |event| {
            sink.lock().push(event.clone());
        });

        bus.emit(&RepositoryEvent::Add(1));
        bus.emit(&RepositoryEvent::Update(2));
        bus.emit(&RepositoryEvent::Initialize);
        bus.emit(&RepositoryEvent::Reload);

        assert_eq!(
            *seen.lock(),
            vec![RepositoryEvent::Add(1), RepositoryEvent::Update(2)]
        );
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let bus: EventBus<CartEvent> = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            bus.listen(CartEventKind::CartClear, move |_| sink.lock().push(tag));
        }

        bus.emit(&CartEvent::Clear);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cart_kinds() {
        let add = CartEvent::Add {
            product_id: 1,
            previous: 0,
            current: 2,
        };
        assert!(add.matches(CartEventKind::CartAdd));
        assert!(add.matches(CartEventKind::CartChange));
        assert!(!add.matches(CartEventKind::CartRemove));
        assert!(!CartEvent::Clear.matches(CartEventKind::CartAdd));
    }

    #[test]
    fn test_auth_change_covers_logout() {
        assert!(AuthEvent::Logout.matches(AuthEventKind::AuthChange));
        assert!(AuthEvent::Logout.matches(AuthEventKind::Logout));
        assert!(!AuthEvent::Logout.matches(AuthEventKind::Login));
    }

    #[test]
    fn test_listener_added_during_emit_waits_for_next_emit() {
        let bus: Arc<EventBus<CartEvent>> = Arc::new(EventBus::new());
        let calls = Arc::new(Mutex::new(0));

        let inner_bus = Arc::clone(&bus);
        let inner_calls = Arc::clone(&calls);
        bus.listen(CartEventKind::CartClear, move |_| {
            let counter = Arc::clone(&inner_calls);
            inner_bus.listen(CartEventKind::CartClear, move |_| *counter.lock() += 1);
        });

        bus.emit(&CartEvent::Clear);
        assert_eq!(*calls.lock(), 0);

        bus.emit(&CartEvent::Clear);
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_unlisten_unknown_id() {
        let bus: EventBus<CartEvent> = EventBus::new();
        let id = bus.listen(CartEventKind::CartAdd, |_| {});
        assert!(bus.unlisten(id));
        assert!(!bus.unlisten(id));
        assert_eq!(bus.listener_count(), 0);
    }
}
