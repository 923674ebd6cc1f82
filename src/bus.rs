//! Event fan-out: the global bus, instance-scoped listeners, and
//! managed-instance cleanup.
//!
//! Every inbound frame is dispatched in three directions: (1) listeners on
//! the global bus, (2) listeners scoped to the identity of each resource
//! instance the event promotes, (3) the managed-instance table, which strips
//! an identity's scoped listeners when its terminal event arrives.
//!
//! Listener tables are guarded by a mutex; callbacks always run with the
//! lock released, so a listener may freely register or remove listeners.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::client::ClientInner;
use crate::events::{AriEvent, EventResources};
use crate::resource::{ResourceHandle, ResourceType};

/// Opaque handle for a registered listener, used to remove it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The callable registered for an event: receives the event and the
/// promoted resources (absent when nothing promoted).
pub(crate) type EventCallback = Arc<dyn Fn(&AriEvent, Option<&EventResources>) + Send + Sync>;

struct GlobalListener {
    id: u64,
    once: bool,
    callback: EventCallback,
}

struct ScopedListener {
    id: u64,
    once: bool,
    kind: ResourceType,
    key: String,
    callback: EventCallback,
}

#[derive(Default)]
struct BusState {
    global: HashMap<String, Vec<GlobalListener>>,
    scoped: HashMap<String, Vec<ScopedListener>>,
    managed: HashSet<(ResourceType, String)>,
}

/// Listener registry and dispatch engine. One per client.
pub(crate) struct EventBus {
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id
            .fetch_add(1, Ordering::Relaxed)
    }

    /// Register a global listener. Listener count is unbounded.
    pub(crate) fn subscribe(&self, event: &str, once: bool, callback: EventCallback) -> ListenerId {
        let id = self.allocate_id();
        let mut state = self
            .state
            .lock()
            .unwrap();
        state
            .global
            .entry(event.to_string())
            .or_default()
            .push(GlobalListener { id, once, callback });
        ListenerId(id)
    }

    /// Register a listener scoped to one instance identity.
    pub(crate) fn subscribe_scoped(
        &self,
        event: &str,
        kind: ResourceType,
        key: &str,
        once: bool,
        callback: EventCallback,
    ) -> ListenerId {
        let id = self.allocate_id();
        let mut state = self
            .state
            .lock()
            .unwrap();
        state
            .scoped
            .entry(event.to_string())
            .or_default()
            .push(ScopedListener {
                id,
                once,
                kind,
                key: key.to_string(),
                callback,
            });
        ListenerId(id)
    }

    /// Remove one listener (global or scoped). Removing a listener that is
    /// not registered — including one already cleaned up — is a no-op.
    pub(crate) fn remove(&self, event: &str, id: ListenerId) {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if let Some(entries) = state
            .global
            .get_mut(event)
        {
            entries.retain(|entry| entry.id != id.0);
        }
        if let Some(entries) = state
            .scoped
            .get_mut(event)
        {
            entries.retain(|entry| entry.id != id.0);
        }
    }

    /// Remove every global listener for the named event.
    pub(crate) fn remove_all_global(&self, event: &str) {
        self.state
            .lock()
            .unwrap()
            .global
            .remove(event);
    }

    /// Remove every scoped listener one identity has for the named event.
    pub(crate) fn remove_scoped_for(&self, event: &str, kind: ResourceType, key: &str) {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if let Some(entries) = state
            .scoped
            .get_mut(event)
        {
            entries.retain(|entry| !(entry.kind == kind && entry.key == key));
        }
    }

    /// Add an identity to the managed set.
    pub(crate) fn manage(&self, kind: ResourceType, key: &str) {
        self.state
            .lock()
            .unwrap()
            .managed
            .insert((kind, key.to_string()));
    }

    pub(crate) fn is_managed(&self, kind: ResourceType, key: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .managed
            .contains(&(kind, key.to_string()))
    }

    /// Number of global listeners currently registered for an event.
    pub(crate) fn global_listener_count(&self, event: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .global
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Parse and dispatch one WebSocket text frame. Malformed frames are
    /// logged and skipped; they never take the transport down.
    pub(crate) fn dispatch_frame(&self, client: &Arc<ClientInner>, frame: &str) {
        match AriEvent::from_frame(frame) {
            Ok(event) => self.dispatch(client, &event),
            Err(e) => warn!("skipping bad event frame: {}", e),
        }
    }

    /// Fan an event out to global listeners, scoped listeners, and the
    /// managed-instance cleanup pass.
    pub(crate) fn dispatch(&self, client: &Arc<ClientInner>, event: &AriEvent) {
        let promoted = promote(client, event);

        let resources = match promoted.len() {
            0 => None,
            1 => Some(EventResources::Single(promoted[0].1.clone())),
            _ => Some(EventResources::Many(
                promoted
                    .iter()
                    .map(|(name, handle)| (name.clone(), handle.clone()))
                    .collect(),
            )),
        };

        debug!(
            event = event.name(),
            promoted = promoted.len(),
            "dispatching event"
        );

        // Global fan-out. Once-listeners are unregistered before their
        // callback runs so re-entrant emission cannot fire them twice.
        let callbacks = self.take_global(event.name());
        for callback in callbacks {
            callback(event, resources.as_ref());
        }

        // Scoped fan-out, at most once per promoted identity even when
        // several properties reference the same instance.
        let mut seen: HashSet<(ResourceType, String)> = HashSet::new();
        for (_, handle) in &promoted {
            if !seen.insert((handle.kind(), handle.id().to_string())) {
                continue;
            }
            let callbacks = self.take_scoped(event.name(), handle.kind(), handle.id());
            for callback in callbacks {
                callback(event, resources.as_ref());
            }
        }

        // Managed cleanup runs after delivery so scoped listeners still
        // observe the terminal event itself.
        if let Some(kind) = ResourceType::for_terminal_event(event.name()) {
            for (_, handle) in &promoted {
                if handle.kind() == kind {
                    self.cleanup_managed(kind, handle.id());
                }
            }
        }
    }

    /// Snapshot the global listeners for an event, dropping once-entries.
    fn take_global(&self, event: &str) -> Vec<EventCallback> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        let Some(entries) = state
            .global
            .get_mut(event)
        else {
            return Vec::new();
        };
        let callbacks: Vec<EventCallback> = entries
            .iter()
            .map(|entry| entry.callback.clone())
            .collect();
        entries.retain(|entry| !entry.once);
        callbacks
    }

    /// Snapshot the scoped listeners matching one identity, dropping
    /// once-entries.
    fn take_scoped(&self, event: &str, kind: ResourceType, key: &str) -> Vec<EventCallback> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        let Some(entries) = state
            .scoped
            .get_mut(event)
        else {
            return Vec::new();
        };
        let callbacks: Vec<EventCallback> = entries
            .iter()
            .filter(|entry| entry.kind == kind && entry.key == key)
            .map(|entry| entry.callback.clone())
            .collect();
        entries.retain(|entry| !(entry.once && entry.kind == kind && entry.key == key));
        callbacks
    }

    /// Drop an identity from the managed set along with every scoped
    /// listener it still has, across all event names.
    fn cleanup_managed(&self, kind: ResourceType, key: &str) {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if !state
            .managed
            .remove(&(kind, key.to_string()))
        {
            return;
        }
        debug!(kind = %kind, key, "cleaning up managed instance");
        for entries in state
            .scoped
            .values_mut()
        {
            entries.retain(|entry| !(entry.kind == kind && entry.key == key));
        }
    }
}

/// Construct instances for every promotable property present on the event,
/// in the order the event model declares them.
fn promote(client: &Arc<ClientInner>, event: &AriEvent) -> Vec<(String, ResourceHandle)> {
    let Some(model) = client
        .schema
        .event_model(event.name())
    else {
        return Vec::new();
    };

    let mut promoted = Vec::new();
    for property in &model.properties {
        let Some(kind) = property.promotes_to() else {
            continue;
        };
        let Some(value) = event.field(&property.name) else {
            continue;
        };
        if !value.is_object() {
            continue;
        }
        promoted.push((
            property.name.clone(),
            ResourceHandle::from_value(client.clone(), kind, value),
        ));
    }
    promoted
}
