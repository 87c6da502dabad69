//! Message bus
//!
//! Fans decoded inbound messages out to a dynamic set of listeners. Delivery
//! is synchronous with the publisher and follows registration order. The
//! listener list is snapshotted before each publish, so callbacks may
//! subscribe or unsubscribe freely while a publish is in progress.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::message::Message;

/// Listener registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerMode {
    /// Removed after its first matching delivery
    OneShot,
    /// Stays until unsubscribed
    Persistent,
}

type Predicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;
type Callback = Box<dyn Fn(&Message) + Send + Sync>;

struct Listener {
    id: ListenerId,
    predicate: Predicate,
    callback: Callback,
    mode: ListenerMode,
    active: AtomicBool,
}

/// Pub/sub fan-out for inbound messages
pub struct MessageBus {
    listeners: Mutex<Vec<Arc<Listener>>>,
    next_id: AtomicU64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener
    pub fn subscribe<P, C>(&self, mode: ListenerMode, predicate: P, callback: C) -> ListenerId
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
        C: Fn(&Message) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener = Arc::new(Listener {
            id,
            predicate: Box::new(predicate),
            callback: Box::new(callback),
            mode,
            active: AtomicBool::new(true),
        });
        self.listeners.lock().push(listener);
        id
    }

    /// Register a persistent listener for one action name
    pub fn subscribe_action<C>(&self, action: &str, callback: C) -> ListenerId
    where
        C: Fn(&Message) + Send + Sync + 'static,
    {
        let action = action.to_string();
        self.subscribe(
            ListenerMode::Persistent,
            move |msg| msg.action == action,
            callback,
        )
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|l| l.id == id) {
            Some(index) => {
                let listener = listeners.remove(index);
                listener.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Deliver a message to every matching listener
    ///
    /// Returns the number of deliveries made.
    pub fn publish(&self, message: &Message) -> usize {
        let snapshot: Vec<Arc<Listener>> = self.listeners.lock().clone();
        let mut delivered = 0;

        for listener in snapshot {
            if !listener.active.load(Ordering::Acquire) || !(listener.predicate)(message) {
                continue;
            }

            if listener.mode == ListenerMode::OneShot {
                // Claim the single delivery; a concurrent publish may race us
                if listener
                    .active
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
                self.listeners.lock().retain(|l| l.id != listener.id);
            }

            (listener.callback)(message);
            delivered += 1;
        }

        delivered
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
