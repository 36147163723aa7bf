//! Connection Manager
//!
//! Owns the single transport connection to the event server, broadcasts its
//! lifecycle to observers and multiplexes server events to listeners by name.
//!
//! ## State machine
//!
//! ```text
//!  Disconnected --connect()--> Connecting --open--> Connected
//!       ^                          |                    |
//!       +------handshake error-----+<---unexpected close+
//!       |              (bounded retry, fixed delay)
//!       +------------------disconnect()-----------------+
//! ```
//!
//! Every call to `connect()` that leaves the Disconnected state bumps a
//! generation counter and spawns one driver task for it. `disconnect()` and
//! `reconnect()` bump the generation again, so a stale driver can never touch
//! state after it has been cancelled.

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::messages::{CloseReason, ConnectionState, Envelope};
use super::registry::{EventRegistry, Registry, SubscriptionId};
use super::transport::{Connector, Inbound, Link};

/// Observer of connection state transitions
pub type StateCallback = dyn Fn(ConnectionState) + Send + Sync;

/// Listener for one named server event
pub type EventCallback = dyn Fn(&Value) + Send + Sync;

/// Automatic reconnection policy: fixed attempt count, fixed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 5;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(3000);

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub url: String,
    pub state: ConnectionState,
    pub reconnecting: bool,
    pub reconnect_attempt: u32,
    pub max_attempts: u32,
}

struct Inner {
    state: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Envelope>>,
    driver: Option<JoinHandle<()>>,
    attempt: u32,
}

struct Shared {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    /// Serializes transitions with their notifications. Reentrant so an
    /// observer may call back into the manager.
    order: ReentrantMutex<()>,
    inner: Mutex<Inner>,
    observers: Mutex<Registry<StateCallback>>,
    listeners: Mutex<EventRegistry<EventCallback>>,
}

/// Handle to the live connection.
///
/// Cloning is cheap and every clone drives the same transport. Build one per
/// application and pass it to whatever owns live bindings.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager; nothing is dialed until [`connect`](Self::connect)
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                policy,
                connector,
                order: ReentrantMutex::new(()),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    outbound: None,
                    driver: None,
                    attempt: 0,
                }),
                observers: Mutex::new(Registry::new()),
                listeners: Mutex::new(EventRegistry::new()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn status(&self) -> ConnectionStatus {
        let inner = self.shared.inner.lock();
        ConnectionStatus {
            url: self.shared.url.clone(),
            state: inner.state,
            reconnecting: inner.attempt > 0,
            reconnect_attempt: inner.attempt,
            max_attempts: self.shared.policy.max_attempts,
        }
    }

    /// Start the handshake unless already connected or connecting.
    ///
    /// Must be called from within a tokio runtime; outside one the call is
    /// logged and ignored.
    pub fn connect(&self) {
        let _order = self.shared.order.lock();
        let mut inner = self.shared.inner.lock();

        if inner.state != ConnectionState::Disconnected {
            tracing::trace!(state = %inner.state, "connect() ignored");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "connect() called outside a tokio runtime");
                return;
            }
        };

        tracing::info!(
            url = %self.shared.url,
            transport = self.shared.connector.name(),
            "Connecting to event server"
        );

        inner.generation += 1;
        inner.attempt = 0;
        inner.state = ConnectionState::Connecting;
        let generation = inner.generation;
        inner.driver = Some(runtime.spawn(drive(Arc::clone(&self.shared), generation)));
        drop(inner);

        self.shared.notify(ConnectionState::Connecting);
    }

    /// Close the transport and cancel any pending automatic retry
    pub fn disconnect(&self) {
        let _order = self.shared.order.lock();
        let mut inner = self.shared.inner.lock();

        inner.generation += 1;
        inner.attempt = 0;
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
        // Dropping the sender closes the link
        inner.outbound = None;

        let previous = inner.state;
        inner.state = ConnectionState::Disconnected;
        drop(inner);

        if previous != ConnectionState::Disconnected {
            tracing::info!(url = %self.shared.url, "Disconnected from event server");
            self.shared.notify(ConnectionState::Disconnected);
        }
    }

    /// Drop the current connection (or retry cycle) and start afresh
    pub fn reconnect(&self) {
        let _order = self.shared.order.lock();
        tracing::info!("Forcing reconnection");
        self.disconnect();
        self.connect();
    }

    /// Observe connection state.
    ///
    /// The callback runs immediately with the current state, then on every
    /// transition, until the returned subscription is dropped or unsubscribed.
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let _order = self.shared.order.lock();
        let callback: Arc<StateCallback> = Arc::new(callback);
        let id = self.shared.observers.lock().insert(Arc::clone(&callback));
        let current = self.shared.inner.lock().state;
        callback(current);
        Subscription::new(&self.shared, SubscriptionKind::Observer(id))
    }

    /// Listen for a named server event
    pub fn on<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.shared.listeners.lock().insert(event, Arc::new(callback));
        tracing::trace!(event = %event, id = id.value(), "Listener registered");
        Subscription::new(&self.shared, SubscriptionKind::Listener(id))
    }

    /// Send an event upstream.
    ///
    /// When not connected the payload is dropped with a warning.
    pub fn emit<P: Serialize>(&self, event: &str, payload: P) {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Cannot emit: payload not serializable");
                return;
            }
        };

        let inner = self.shared.inner.lock();
        match (&inner.state, &inner.outbound) {
            (ConnectionState::Connected, Some(outbound)) => {
                if outbound.send(Envelope::new(event, data)).is_err() {
                    tracing::warn!(event = %event, "Cannot emit: link already closed");
                } else {
                    tracing::debug!(event = %event, "Emitted event");
                }
            }
            _ => {
                tracing::warn!(event = %event, state = %inner.state, "Cannot emit: not connected");
            }
        }
    }

    /// Number of listeners registered for `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.listeners.lock().listener_count(event)
    }

    /// Number of registered connection observers
    pub fn observer_count(&self) -> usize {
        self.shared.observers.lock().len()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    /// Invoke observers outside the registry lock
    fn notify(&self, state: ConnectionState) {
        let observers = self.observers.lock().snapshot();
        for observer in observers {
            observer(state);
        }
    }

    /// Apply a transition on behalf of driver `generation`.
    ///
    /// Returns false if the driver has been superseded.
    fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let _order = self.order.lock();
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        let changed = inner.state != state;
        inner.state = state;
        if state != ConnectionState::Connected {
            inner.outbound = None;
        }
        drop(inner);

        if changed {
            self.notify(state);
        }
        true
    }

    fn opened(&self, generation: u64, outbound: mpsc::UnboundedSender<Envelope>) -> bool {
        let _order = self.order.lock();
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        if inner.attempt > 0 {
            tracing::info!(attempt = inner.attempt, "Reconnected to event server");
        } else {
            tracing::info!(url = %self.url, "Connected to event server");
        }
        inner.attempt = 0;
        inner.outbound = Some(outbound);
        inner.state = ConnectionState::Connected;
        drop(inner);

        self.notify(ConnectionState::Connected);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    /// Consume one retry; None when superseded or exhausted
    fn next_attempt(&self, generation: u64) -> Option<u32> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }
        if inner.attempt >= self.policy.max_attempts {
            tracing::error!(
                attempts = inner.attempt,
                "Reconnection failed - all attempts exhausted"
            );
            inner.driver = None;
            return None;
        }
        inner.attempt += 1;
        Some(inner.attempt)
    }

    fn dispatch(&self, envelope: &Envelope) {
        let listeners = self.listeners.lock().snapshot(&envelope.event);
        if listeners.is_empty() {
            tracing::trace!(event = %envelope.event, "No listeners for event");
            return;
        }
        for listener in listeners {
            listener(&envelope.data);
        }
    }

    fn remove(&self, kind: SubscriptionKind) {
        match kind {
            SubscriptionKind::Observer(id) => {
                self.observers.lock().remove(id);
            }
            SubscriptionKind::Listener(id) => {
                self.listeners.lock().remove(id);
            }
        }
    }
}

/// Driver task for one connection generation
async fn drive(shared: Arc<Shared>, generation: u64) {
    loop {
        if !shared.transition(generation, ConnectionState::Connecting) {
            return;
        }

        match shared.connector.connect(&shared.url).await {
            Ok(Link {
                outbound,
                mut inbound,
            }) => {
                if !shared.opened(generation, outbound) {
                    return;
                }

                let reason = loop {
                    match inbound.recv().await {
                        Some(Inbound::Event(envelope)) => {
                            if !shared.is_current(generation) {
                                return;
                            }
                            shared.dispatch(&envelope);
                        }
                        Some(Inbound::Closed(reason)) => break reason,
                        None => break CloseReason::Error("link dropped".to_string()),
                    }
                };

                tracing::warn!(reason = %reason, "Connection to event server lost");
                if !shared.transition(generation, ConnectionState::Disconnected) {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(url = %shared.url, error = %e, "Connection error");
                if !shared.transition(generation, ConnectionState::Disconnected) {
                    return;
                }
            }
        }

        let Some(attempt) = shared.next_attempt(generation) else {
            return;
        };
        tracing::info!(
            attempt,
            max_attempts = shared.policy.max_attempts,
            delay_ms = shared.policy.delay.as_millis() as u64,
            "Scheduling reconnection attempt"
        );
        tokio::time::sleep(shared.policy.delay).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum SubscriptionKind {
    Observer(SubscriptionId),
    Listener(SubscriptionId),
}

/// Registration guard for an observer or event listener.
///
/// Unsubscribes when dropped. [`unsubscribe`](Self::unsubscribe) may be
/// called any number of times.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    kind: SubscriptionKind,
    active: AtomicBool,
}

impl Subscription {
    fn new(shared: &Arc<Shared>, kind: SubscriptionKind) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            kind,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        match self.kind {
            SubscriptionKind::Observer(id) | SubscriptionKind::Listener(id) => id,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.kind);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
