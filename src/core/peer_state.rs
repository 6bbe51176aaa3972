//! The single place known/available membership is mutated.
//!
//! Three views are reconciled here: `known` grows monotonically from
//! bootstrap results and multicast HELLOs and never shrinks; `available`
//! tracks what multicast currently believes is alive; `bootstrap` is a
//! record of the last registry snapshot for display. The raw sets are
//! never handed out for external mutation.

use log::info;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::core::protocol::PeerAddress;

#[derive(Default)]
struct Sets {
    known: HashSet<PeerAddress>,
    available: HashSet<PeerAddress>,
    bootstrap: Vec<PeerAddress>,
}

pub struct PeerState {
    local: PeerAddress,
    sets: Mutex<Sets>,
}

impl PeerState {
    pub fn new(local: PeerAddress) -> Self {
        Self {
            local,
            sets: Mutex::new(Sets::default()),
        }
    }

    pub fn local(&self) -> &PeerAddress {
        &self.local
    }

    /// A peer announced itself: known and available both gain it.
    pub fn mark_seen(&self, addr: &PeerAddress) {
        let mut sets = self.lock();
        sets.known.insert(addr.clone());
        sets.available.insert(addr.clone());
    }

    /// A peer announced departure: only available loses it. Staleness
    /// in `known` is tolerated by design.
    pub fn mark_left(&self, addr: &PeerAddress) {
        self.lock().available.remove(addr);
    }

    /// Merge a bootstrap registry snapshot. Every address except our
    /// own becomes known; availability is untouched because bootstrap
    /// only proves a peer once registered, not that it is live now.
    pub fn merge_bootstrap(&self, nodes: Vec<PeerAddress>) {
        let mut sets = self.lock();
        for node in &nodes {
            if *node != self.local && sets.known.insert(node.clone()) {
                info!("Known via bootstrap: {}", node);
            }
        }
        sets.bootstrap = nodes;
    }

    pub fn known(&self) -> Vec<PeerAddress> {
        let mut nodes: Vec<_> = self.lock().known.iter().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn available(&self) -> Vec<PeerAddress> {
        let mut nodes: Vec<_> = self.lock().available.iter().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn bootstrap_nodes(&self) -> Vec<PeerAddress> {
        self.lock().bootstrap.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sets> {
        self.sets.lock().expect("peer state lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> PeerAddress {
        PeerAddress::new("127.0.0.1", port)
    }

    #[test]
    fn test_seen_then_left_keeps_known() {
        let state = PeerState::new(addr(9001));

        state.mark_seen(&addr(9002));
        state.mark_left(&addr(9002));

        assert_eq!(state.known(), vec![addr(9002)]);
        assert!(state.available().is_empty());
    }

    #[test]
    fn test_merge_bootstrap_excludes_local_and_keeps_availability() {
        let state = PeerState::new(addr(9001));

        state.merge_bootstrap(vec![addr(9001), addr(9002), addr(9003)]);

        assert_eq!(state.known(), vec![addr(9002), addr(9003)]);
        assert!(state.available().is_empty());
        // The bootstrap view keeps the full snapshot, ourselves included.
        assert_eq!(state.bootstrap_nodes(), vec![addr(9001), addr(9002), addr(9003)]);
    }

    #[test]
    fn test_left_for_unknown_address_is_harmless() {
        let state = PeerState::new(addr(9001));
        state.mark_left(&addr(9009));
        assert!(state.known().is_empty());
    }
}
