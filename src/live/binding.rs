//! Live Bindings
//!
//! A [`LiveBinding`] keeps a piece of local state current with one or more
//! server event channels. Incoming payloads either replace the state outright
//! or are folded into it by a reducer.
//!
//! ```rust,no_run
//! use vstartup::live::{ConnectionManager, LiveBinding, LiveOptions};
//! use serde_json::Value;
//!
//! # fn demo(manager: &ConnectionManager) {
//! let logs = LiveBinding::activate(
//!     manager,
//!     LiveOptions::reduced("activity_log", Vec::<Value>::new(), |log, logs| {
//!         let mut next = vec![log.clone()];
//!         next.extend(logs.iter().take(99).cloned());
//!         next
//!     }),
//! );
//! println!("{} entries", logs.with(|l| l.len()));
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::manager::{ConnectionManager, Subscription};

/// Pure merge of an incoming payload into the current state
pub type Reducer<T> = Arc<dyn Fn(&Value, &T) -> T + Send + Sync>;

type Decoder<T> = Arc<dyn Fn(&Value) -> Result<T, serde_json::Error> + Send + Sync>;

enum Merge<T> {
    /// Replace the state with the decoded payload
    Replace(Decoder<T>),
    /// Fold the payload into the state
    Reduce(Reducer<T>),
}

impl<T> Clone for Merge<T> {
    fn clone(&self) -> Self {
        match self {
            Merge::Replace(d) => Merge::Replace(Arc::clone(d)),
            Merge::Reduce(r) => Merge::Reduce(Arc::clone(r)),
        }
    }
}

/// Construction inputs for a [`LiveBinding`]
pub struct LiveOptions<T> {
    events: Vec<String>,
    initial: T,
    merge: Merge<T>,
    auto_connect: bool,
}

impl<T: DeserializeOwned + 'static> LiveOptions<T> {
    /// Bind `event`; each payload replaces the state
    pub fn new(event: impl Into<String>, initial: T) -> Self {
        Self {
            events: vec![event.into()],
            initial,
            merge: Merge::Replace(Arc::new(|v: &Value| T::deserialize(v))),
            auto_connect: true,
        }
    }
}

impl<T: 'static> LiveOptions<T> {
    /// Bind `event` with a reducer; `T` need not be deserializable
    pub fn reduced<F>(event: impl Into<String>, initial: T, reducer: F) -> Self
    where
        F: Fn(&Value, &T) -> T + Send + Sync + 'static,
    {
        Self {
            events: vec![event.into()],
            initial,
            merge: Merge::Reduce(Arc::new(reducer)),
            auto_connect: true,
        }
    }

    /// Also listen to `event`
    pub fn event(mut self, event: impl Into<String>) -> Self {
        let event = event.into();
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        self
    }

    /// Listen to every name in `events` as well
    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for event in events {
            self = self.event(event);
        }
        self
    }

    /// Use `reducer` instead of wholesale replacement
    pub fn reducer<F>(mut self, reducer: F) -> Self
    where
        F: Fn(&Value, &T) -> T + Send + Sync + 'static,
    {
        self.merge = Merge::Reduce(Arc::new(reducer));
        self
    }

    /// Whether activation calls `connect()` (default true)
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn event_names(&self) -> &[String] {
        &self.events
    }
}

/// Local state bound to server event channels.
///
/// Deactivated when dropped; all listeners and the connection observer are
/// released at that point.
pub struct LiveBinding<T> {
    manager: ConnectionManager,
    events: Vec<String>,
    state: Arc<watch::Sender<T>>,
    connected: Arc<AtomicBool>,
    subscriptions: Vec<Subscription>,
}

impl<T: Send + Sync + 'static> LiveBinding<T> {
    /// Register with `manager` and start tracking events
    pub fn activate(manager: &ConnectionManager, options: LiveOptions<T>) -> Self {
        let LiveOptions {
            events,
            initial,
            merge,
            auto_connect,
        } = options;

        if auto_connect {
            manager.connect();
        }

        let (state, _) = watch::channel(initial);
        let state = Arc::new(state);
        let connected = Arc::new(AtomicBool::new(false));
        let mut subscriptions = Vec::with_capacity(events.len() + 1);

        let flag = Arc::clone(&connected);
        subscriptions.push(manager.on_connection_change(move |s| {
            flag.store(s.is_connected(), Ordering::SeqCst);
        }));

        for event in &events {
            let state = Arc::clone(&state);
            let merge = merge.clone();
            let name = event.clone();
            subscriptions.push(manager.on(event, move |payload| match &merge {
                Merge::Reduce(reducer) => {
                    state.send_modify(|current| {
                        let next = reducer(payload, current);
                        *current = next;
                    });
                }
                Merge::Replace(decode) => match decode(payload) {
                    Ok(next) => {
                        state.send_replace(next);
                    }
                    Err(e) => {
                        tracing::warn!(event = %name, error = %e, "Payload does not match bound state, skipped");
                    }
                },
            }));
        }

        tracing::debug!(events = ?events, auto_connect, "Live binding activated");

        Self {
            manager: manager.clone(),
            events,
            state,
            connected,
            subscriptions,
        }
    }
}

impl<T> LiveBinding<T> {
    /// Current state (cloned)
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.state.borrow().clone()
    }

    /// Read the current state without cloning
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Replace the state locally, e.g. for optimistic updates
    pub fn set(&self, value: T) {
        self.state.send_replace(value);
    }

    /// Modify the state in place
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.state.send_modify(f);
    }

    /// Watch for state changes
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send an event upstream through the shared connection
    pub fn emit<P: Serialize>(&self, event: &str, payload: P) {
        self.manager.emit(event, payload);
    }

    /// Force the shared connection to reconnect
    pub fn reconnect(&self) {
        self.manager.reconnect();
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn is_active(&self) -> bool {
        self.subscriptions.iter().any(|s| s.is_active())
    }

    /// Release every subscription now
    pub fn deactivate(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        tracing::debug!(events = ?self.events, "Live binding deactivated");
    }
}
