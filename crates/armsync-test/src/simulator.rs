//! Session simulator for ARMSYNC protocol testing
//!
//! Runs any number of [`StateReplica`]s against one another without a
//! runtime. Every broadcast is encoded, pushed through a [`ChaosLink`] per
//! receiver and decoded again on delivery. [`SessionSimulator::step`]
//! delivers one payload from a randomly chosen non-idle link, so links
//! interleave arbitrarily while each one stays FIFO.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use armsync_core::PeerId;
use armsync_state::{PeerChange, Reaction, StateReplica};
use armsync_wire::{MessageCodec, WireFormat};

use crate::chaos::{ChaosLink, LinkChaos, LinkStats};

/// Simulator configuration
#[derive(Clone, Debug, Default)]
pub struct SimulatorConfig {
    /// Fault configuration for new links
    pub chaos: LinkChaos,
    /// Deliver a peer's broadcasts back to itself
    pub echo: bool,
    pub wire_format: WireFormat,
}

/// Simulated peer
#[derive(Debug)]
pub struct SimulatedPeer {
    pub replica: StateReplica,
    /// Every value shown by this peer's presentation
    pub renders: Vec<bool>,
}

/// Deterministic multi-peer session
pub struct SessionSimulator {
    config: SimulatorConfig,
    codec: MessageCodec,
    peers: BTreeMap<PeerId, SimulatedPeer>,
    /// Directed links keyed by (from, to)
    links: BTreeMap<(PeerId, PeerId), ChaosLink>,
    rng: StdRng,
    seed_counter: u64,
    delivered: u64,
    undecodable: u64,
}

impl SessionSimulator {
    pub fn new(config: SimulatorConfig, seed: u64) -> Self {
        SessionSimulator {
            codec: MessageCodec::new(config.wire_format),
            config,
            peers: BTreeMap::new(),
            links: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            seed_counter: seed,
            delivered: 0,
            undecodable: 0,
        }
    }

    /// Reliable links
    pub fn perfect(seed: u64) -> Self {
        Self::new(SimulatorConfig::default(), seed)
    }

    /// Session with `ids` joined in order, network drained in between
    pub fn with_peers(config: SimulatorConfig, seed: u64, ids: &[&str]) -> Self {
        let mut sim = Self::new(config, seed);
        for id in ids {
            sim.join(PeerId::new(*id));
            sim.run_until_quiet(10_000);
        }
        sim
    }

    /// A peer starts and joins the session
    ///
    /// Returns false if the id is already a member.
    pub fn join(&mut self, id: PeerId) -> bool {
        if self.peers.contains_key(&id) {
            return false;
        }

        let mut replica = StateReplica::new(id.clone());
        // Not in the session yet, so the start push goes nowhere
        let start = replica.start();
        let mut peer = SimulatedPeer {
            replica,
            renders: Vec::new(),
        };
        peer.renders.extend(start.render);
        self.peers.insert(id.clone(), peer);

        let existing: Vec<PeerId> = self.peers.keys().filter(|p| **p != id).cloned().collect();
        for other in &existing {
            self.open_link(other.clone(), id.clone());
            self.open_link(id.clone(), other.clone());
        }
        if self.config.echo {
            self.open_link(id.clone(), id.clone());
        }

        let members: Vec<PeerId> = self.peers.keys().cloned().collect();
        self.change_peer_set(&id, PeerChange::Snapshot(members));
        for other in existing {
            self.change_peer_set(&other, PeerChange::Joined(id.clone()));
        }
        true
    }

    /// A peer leaves; payloads still in flight to or from it are lost
    pub fn leave(&mut self, id: &PeerId) -> bool {
        if self.peers.remove(id).is_none() {
            return false;
        }
        self.links.retain(|(from, to), _| from != id && to != id);

        let remaining: Vec<PeerId> = self.peers.keys().cloned().collect();
        for other in remaining {
            self.change_peer_set(&other, PeerChange::Left(id.clone()));
        }
        true
    }

    /// The local user of `id` asks for a flip
    pub fn toggle(&mut self, id: &PeerId) -> bool {
        let Some(peer) = self.peers.get_mut(id) else {
            return false;
        };
        let reaction = peer.replica.request_toggle();
        self.dispatch(id, reaction);
        true
    }

    /// Deliver one payload; false when nothing is in flight
    pub fn step(&mut self) -> bool {
        let busy: Vec<(PeerId, PeerId)> = self
            .links
            .iter()
            .filter(|(_, link)| !link.is_idle())
            .map(|(key, _)| key.clone())
            .collect();
        if busy.is_empty() {
            return false;
        }

        let (from, to) = busy[self.rng.gen_range(0..busy.len())].clone();
        let Some(payload) = self.links.get_mut(&(from.clone(), to.clone())).and_then(|l| l.pop())
        else {
            return false;
        };
        self.delivered += 1;

        let msg = match self.codec.decode(&payload) {
            Ok(msg) => msg,
            Err(_) => {
                self.undecodable += 1;
                return true;
            }
        };
        if let Some(peer) = self.peers.get_mut(&to) {
            let reaction = peer.replica.handle_message(&from, msg);
            self.dispatch(&to, reaction);
        }
        true
    }

    /// Step until idle or `max_steps`; returns the steps taken
    pub fn run_until_quiet(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && self.step() {
            steps += 1;
        }
        steps
    }

    /// Replace the faults on one directed link
    pub fn set_link_chaos(&mut self, from: &PeerId, to: &PeerId, chaos: LinkChaos) {
        if let Some(link) = self.links.get_mut(&(from.clone(), to.clone())) {
            link.set_chaos(chaos);
        }
    }

    pub fn peer(&self, id: &PeerId) -> Option<&SimulatedPeer> {
        self.peers.get(id)
    }

    pub fn replica(&self, id: &PeerId) -> Option<&StateReplica> {
        self.peers.get(id).map(|p| &p.replica)
    }

    pub fn members(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    pub fn values(&self) -> BTreeMap<PeerId, bool> {
        self.peers
            .iter()
            .map(|(id, p)| (id.clone(), p.replica.armed()))
            .collect()
    }

    /// All members hold the same value
    pub fn converged(&self) -> bool {
        let mut values = self.peers.values().map(|p| p.replica.armed());
        match values.next() {
            Some(first) => values.all(|v| v == first),
            None => true,
        }
    }

    /// Members that currently consider themselves authority
    pub fn authorities(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, p)| p.replica.is_authority())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.links.values().map(ChaosLink::in_flight).sum()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn undecodable(&self) -> u64 {
        self.undecodable
    }

    pub fn link_stats(&self, from: &PeerId, to: &PeerId) -> Option<&LinkStats> {
        self.links.get(&(from.clone(), to.clone())).map(ChaosLink::stats)
    }

    fn open_link(&mut self, from: PeerId, to: PeerId) {
        let seed = self.seed_counter;
        self.seed_counter = self.seed_counter.wrapping_add(1);
        self.links
            .insert((from, to), ChaosLink::new(self.config.chaos.clone(), seed));
    }

    fn change_peer_set(&mut self, id: &PeerId, change: PeerChange) {
        if let Some(peer) = self.peers.get_mut(id) {
            let reaction = peer.replica.apply_peer_change(change);
            self.dispatch(id, reaction);
        }
    }

    fn dispatch(&mut self, from: &PeerId, reaction: Reaction) {
        if let Some(peer) = self.peers.get_mut(from) {
            peer.renders.extend(reaction.render);
        }

        let Some(msg) = reaction.broadcast else {
            return;
        };
        let Ok(payload) = self.codec.encode(&msg) else {
            return;
        };
        for ((link_from, _), link) in self.links.iter_mut() {
            if link_from == from {
                link.send(payload.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PeerId {
        PeerId::new(s)
    }

    #[test]
    fn test_join_resolves_single_authority() {
        let sim = SessionSimulator::with_peers(SimulatorConfig::default(), 1, &["c1", "b1", "a1"]);
        assert_eq!(sim.authorities(), vec![id("a1")]);
        for member in sim.members() {
            assert_eq!(sim.replica(&member).unwrap().authority(), Some(&id("a1")));
        }
    }

    #[test]
    fn test_toggle_from_non_authority_converges() {
        let mut sim = SessionSimulator::with_peers(SimulatorConfig::default(), 2, &["a1", "b1", "c1"]);
        sim.toggle(&id("c1"));

        // Nothing changes until the authority has answered
        assert!(!sim.replica(&id("c1")).unwrap().armed());

        sim.run_until_quiet(1_000);
        assert!(sim.converged());
        assert!(sim.values().values().all(|v| *v));
        assert_eq!(sim.peer(&id("c1")).unwrap().renders.last(), Some(&true));
    }

    #[test]
    fn test_leave_drops_links() {
        let mut sim = SessionSimulator::with_peers(SimulatorConfig::default(), 3, &["a1", "b1"]);
        sim.toggle(&id("a1"));
        assert!(sim.in_flight() > 0);

        sim.leave(&id("a1"));
        assert_eq!(sim.in_flight(), 0);
        assert!(sim.link_stats(&id("a1"), &id("b1")).is_none());
        assert_eq!(sim.authorities(), vec![id("b1")]);
    }

    #[test]
    fn test_echo_is_harmless() {
        let config = SimulatorConfig {
            echo: true,
            ..Default::default()
        };
        let mut sim = SessionSimulator::with_peers(config, 4, &["a1", "b1"]);
        sim.toggle(&id("a1"));
        sim.run_until_quiet(1_000);

        assert!(sim.values().values().all(|v| *v));
        assert_eq!(sim.replica(&id("a1")).unwrap().stats().requests_served, 0);
    }

    #[test]
    fn test_legacy_wire_format() {
        let config = SimulatorConfig {
            wire_format: WireFormat::Legacy,
            ..Default::default()
        };
        let mut sim = SessionSimulator::with_peers(config, 5, &["a1", "b1", "c1"]);
        sim.toggle(&id("b1"));
        sim.run_until_quiet(1_000);

        assert!(sim.converged());
        assert_eq!(sim.undecodable(), 0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |seed| {
            let config = SimulatorConfig {
                chaos: LinkChaos::lossy(),
                ..Default::default()
            };
            let mut sim = SessionSimulator::with_peers(config, seed, &["a1", "b1", "c1", "d1"]);
            for peer in ["d1", "c1", "b1", "c1", "d1"] {
                sim.toggle(&id(peer));
                sim.step();
            }
            sim.run_until_quiet(10_000);
            (sim.values(), sim.delivered())
        };
        assert_eq!(run(42), run(42));
    }
}
