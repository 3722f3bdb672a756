//! Connection Registry
//!
//! Owns every live connection and the bidirectional subscription index:
//!
//! ```text
//!   connections: ConnectionId -> { handle, alive, matches: {MatchId} }
//!   subscribers: MatchId      -> {ConnectionId}
//! ```
//!
//! Both views live behind one mutex, so a broadcast snapshot taken while a
//! connection is being torn down sees it either fully subscribed or fully
//! gone.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

use super::connection::{ConnectionHandle, ConnectionId, ConnectionStream, OUTBOUND_QUEUE_SIZE};
use crate::matches::MatchId;

struct Entry {
    handle: ConnectionHandle,
    alive: bool,
    matches: AHashSet<MatchId>,
}

#[derive(Default)]
struct RegistryState {
    connections: AHashMap<ConnectionId, Entry>,
    subscribers: AHashMap<MatchId, AHashSet<ConnectionId>>,
}

impl RegistryState {
    fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let entry = self.connections.remove(&id)?;
        for match_id in &entry.matches {
            if let Some(set) = self.subscribers.get_mut(match_id) {
                set.remove(&id);
                if set.is_empty() {
                    self.subscribers.remove(match_id);
                }
            }
        }
        Some(entry.handle)
    }
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub subscribed_matches: usize,
    pub subscriptions: usize,
    pub total_registered: u64,
    pub total_evicted: u64,
}

/// Connections found by one liveness sweep
#[derive(Debug, Default)]
pub struct Sweep {
    /// Missed the previous probe; already unregistered
    pub evicted: Vec<ConnectionHandle>,
    /// Marked not-alive and due a probe
    pub probed: Vec<ConnectionHandle>,
}

#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
    total_registered: AtomicU64,
    total_evicted: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle with a fresh id. The connection is not registered yet.
    pub fn open(&self) -> (ConnectionHandle, ConnectionStream) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        ConnectionHandle::new(id, OUTBOUND_QUEUE_SIZE)
    }

    /// Start tracking a connection. Registering a known id is a no-op.
    pub fn register(&self, handle: ConnectionHandle) -> bool {
        let mut state = self.state.lock();
        if state.connections.contains_key(&handle.id()) {
            return false;
        }
        state.connections.insert(
            handle.id(),
            Entry {
                handle,
                alive: true,
                matches: AHashSet::new(),
            },
        );
        self.total_registered.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop a connection and every subscription it holds
    pub fn unregister(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.state.lock().remove(id)
    }

    /// Idempotent; returns false only for an unknown connection
    pub fn subscribe(&self, match_id: MatchId, id: ConnectionId) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.connections.get_mut(&id) else {
            return false;
        };
        entry.matches.insert(match_id);
        state.subscribers.entry(match_id).or_default().insert(id);
        true
    }

    /// Returns whether a subscription was actually removed
    pub fn unsubscribe(&self, match_id: MatchId, id: ConnectionId) -> bool {
        let mut state = self.state.lock();
        let removed = match state.connections.get_mut(&id) {
            Some(entry) => entry.matches.remove(&match_id),
            None => false,
        };
        if !removed {
            return false;
        }
        if let Some(set) = state.subscribers.get_mut(&match_id) {
            set.remove(&id);
            if set.is_empty() {
                state.subscribers.remove(&match_id);
            }
        }
        true
    }

    /// Record a pong
    pub fn mark_alive(&self, id: ConnectionId) -> bool {
        match self.state.lock().connections.get_mut(&id) {
            Some(entry) => {
                entry.alive = true;
                true
            }
            None => false,
        }
    }

    /// One two-strike liveness pass.
    ///
    /// Connections still marked not-alive from the previous pass are removed;
    /// the rest are marked not-alive and returned for probing. Sending the
    /// probes and closing sockets is left to the caller, outside the lock.
    pub fn sweep(&self) -> Sweep {
        let mut state = self.state.lock();
        let mut sweep = Sweep::default();
        let mut dead = Vec::new();

        for (id, entry) in state.connections.iter_mut() {
            if entry.alive {
                entry.alive = false;
                sweep.probed.push(entry.handle.clone());
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            if let Some(handle) = state.remove(id) {
                sweep.evicted.push(handle);
            }
        }

        self.total_evicted
            .fetch_add(sweep.evicted.len() as u64, Ordering::Relaxed);
        sweep
    }

    /// Handles of every registered connection
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        let state = self.state.lock();
        state.connections.values().map(|e| e.handle.clone()).collect()
    }

    /// Handles subscribed to `match_id`, `None` when there are none
    pub fn subscribers(&self, match_id: MatchId) -> Option<Vec<ConnectionHandle>> {
        let state = self.state.lock();
        let ids = state.subscribers.get(&match_id)?;
        Some(
            ids.iter()
                .filter_map(|id| state.connections.get(id))
                .map(|e| e.handle.clone())
                .collect(),
        )
    }

    pub fn subscriptions_of(&self, id: ConnectionId) -> Vec<MatchId> {
        let state = self.state.lock();
        let mut out: Vec<MatchId> = state
            .connections
            .get(&id)
            .map(|e| e.matches.iter().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&id)
    }

    /// Remove every connection, returning their handles
    pub fn drain(&self) -> Vec<ConnectionHandle> {
        let mut state = self.state.lock();
        state.subscribers.clear();
        state.connections.drain().map(|(_, e)| e.handle).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            connections: state.connections.len(),
            subscribed_matches: state.subscribers.len(),
            subscriptions: state.subscribers.values().map(|s| s.len()).sum(),
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
        }
    }

    /// Both index views agree
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let state = self.state.lock();
        for (id, entry) in &state.connections {
            for match_id in &entry.matches {
                assert!(
                    state.subscribers.get(match_id).is_some_and(|s| s.contains(id)),
                    "connection {id} lists match {match_id} but is not a subscriber"
                );
            }
        }
        for (match_id, set) in &state.subscribers {
            assert!(!set.is_empty(), "empty subscriber set kept for match {match_id}");
            for id in set {
                assert!(
                    state
                        .connections
                        .get(id)
                        .is_some_and(|e| e.matches.contains(match_id)),
                    "match {match_id} lists connection {id} which does not mirror it"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(registry: &Registry) -> (ConnectionHandle, ConnectionStream) {
        let (handle, stream) = registry.open();
        assert!(registry.register(handle.clone()));
        (handle, stream)
    }

    #[test]
    fn test_subscribe_unsubscribe_round_trip() {
        let registry = Registry::new();
        let (a, _sa) = registered(&registry);
        let before = registry.stats();

        assert!(registry.subscribe(10, a.id()));
        assert!(registry.subscribe(10, a.id()));
        assert_eq!(registry.stats().subscriptions, 1);

        assert!(registry.unsubscribe(10, a.id()));
        let after = registry.stats();
        assert_eq!(after.subscribed_matches, before.subscribed_matches);
        assert_eq!(after.subscriptions, before.subscriptions);
        assert!(registry.subscribers(10).is_none());
        registry.assert_consistent();
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let registry = Registry::new();
        let (a, _sa) = registered(&registry);
        registry.subscribe(1, a.id());

        assert!(registry.unregister(999).is_none());
        assert!(!registry.unsubscribe(2, a.id()));
        assert!(!registry.unsubscribe(1, 999));
        assert!(!registry.subscribe(1, 999));
        assert!(!registry.register(a.clone()));

        assert_eq!(registry.subscriptions_of(a.id()), vec![1]);
        assert_eq!(registry.len(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn test_unregister_clears_both_views() {
        let registry = Registry::new();
        let (a, _sa) = registered(&registry);
        let (b, _sb) = registered(&registry);
        for m in [1, 2, 3] {
            registry.subscribe(m, a.id());
        }
        registry.subscribe(2, b.id());

        assert!(registry.unregister(a.id()).is_some());
        registry.assert_consistent();

        let stats = registry.stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.subscribed_matches, 1);
        assert!(registry.subscribers(1).is_none());
        assert_eq!(registry.subscribers(2).unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_is_two_strike() {
        let registry = Registry::new();
        let (a, _sa) = registered(&registry);
        let (b, _sb) = registered(&registry);
        registry.subscribe(5, a.id());
        registry.subscribe(5, b.id());

        let first = registry.sweep();
        assert!(first.evicted.is_empty());
        assert_eq!(first.probed.len(), 2);

        // only b answers
        registry.mark_alive(b.id());

        let second = registry.sweep();
        assert_eq!(second.evicted.len(), 1);
        assert_eq!(second.evicted[0].id(), a.id());
        assert!(!registry.contains(a.id()));
        assert_eq!(registry.subscriptions_of(a.id()), Vec::<MatchId>::new());
        assert_eq!(registry.subscribers(5).unwrap().len(), 1);
        assert_eq!(registry.stats().total_evicted, 1);
        registry.assert_consistent();
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = Registry::new();
        let (a, _sa) = registered(&registry);
        registry.subscribe(1, a.id());

        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().subscribed_matches, 0);
    }

    #[test]
    fn test_concurrent_unregister_never_tears() {
        use std::sync::Arc;

        let registry = Arc::new(Registry::new());
        let mut streams = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..64 {
            let (h, s) = registered(&registry);
            registry.subscribe(7, h.id());
            registry.subscribe(8, h.id());
            ids.push(h.id());
            streams.push(s);
        }

        let remover = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for id in ids {
                    registry.unregister(id);
                }
            })
        };
        for _ in 0..200 {
            let seven = registry.subscribers(7).map_or(0, |v| v.len());
            let eight = registry.subscribers(8).map_or(0, |v| v.len());
            assert!(seven <= 64 && eight <= 64);
            registry.assert_consistent();
        }
        remover.join().unwrap();
        assert!(registry.is_empty());
        registry.assert_consistent();
    }
}
