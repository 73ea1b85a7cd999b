//! End-to-end scenario suite
//!
//! Drives a [`SessionSimulator`] through scripted or generated sessions and
//! checks the protocol's guarantees at quiet points:
//! - One authority, the smallest member id, agreed on by every member
//! - Every member holds the authority's value after a routed toggle
//! - Non-authority members never change the value on their own

use armsync_core::PeerId;

use crate::chaos::LinkChaos;
use crate::simulator::{SessionSimulator, SimulatorConfig};

/// One scripted event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScenarioOp {
    Toggle(usize),
    Join(String),
    Leave(usize),
    /// Deliver up to this many payloads
    Deliver(usize),
    /// Drain the network
    Settle,
}

/// Configuration for scenario runs
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub initial_peers: Vec<String>,
    pub chaos: LinkChaos,
    pub seed: u64,
    /// Step limit for each settle
    pub max_steps: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            initial_peers: vec!["a1".into(), "b1".into(), "c1".into()],
            chaos: LinkChaos::perfect(),
            seed: 0,
            max_steps: 100_000,
        }
    }
}

/// Outcome of a scenario run
#[derive(Clone, Debug)]
pub struct ScenarioResult {
    pub converged: bool,
    pub final_value: Option<bool>,
    pub authorities: Vec<PeerId>,
    pub members: Vec<PeerId>,
    pub payloads_delivered: u64,
    pub violations: Vec<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.converged && self.violations.is_empty()
    }
}

/// Scenario harness
pub struct ScenarioHarness {
    config: ScenarioConfig,
    sim: SessionSimulator,
    violations: Vec<String>,
}

impl ScenarioHarness {
    pub fn new(config: ScenarioConfig) -> Self {
        let ids: Vec<&str> = config.initial_peers.iter().map(String::as_str).collect();
        let sim = SessionSimulator::with_peers(
            SimulatorConfig {
                chaos: config.chaos.clone(),
                ..Default::default()
            },
            config.seed,
            &ids,
        );
        ScenarioHarness {
            config,
            sim,
            violations: Vec::new(),
        }
    }

    pub fn simulator(&self) -> &SessionSimulator {
        &self.sim
    }

    pub fn simulator_mut(&mut self) -> &mut SessionSimulator {
        &mut self.sim
    }

    /// Apply one event; peer indexes wrap around the current members
    pub fn apply(&mut self, op: &ScenarioOp) {
        let members = self.sim.members();
        let pick = |i: usize| members.get(i % members.len().max(1)).cloned();

        match op {
            ScenarioOp::Toggle(i) => {
                if let Some(peer) = pick(*i) {
                    self.toggle_checked(&peer);
                }
            }
            ScenarioOp::Join(id) => {
                self.settle();
                self.sim.join(PeerId::new(id.as_str()));
                self.check_authority("join");
            }
            ScenarioOp::Leave(i) => {
                // Keep at least one member
                if members.len() > 1 {
                    if let Some(peer) = pick(*i) {
                        self.settle();
                        self.sim.leave(&peer);
                        self.check_authority("leave");
                    }
                }
            }
            ScenarioOp::Deliver(n) => {
                for _ in 0..*n {
                    if !self.sim.step() {
                        break;
                    }
                }
            }
            ScenarioOp::Settle => self.settle(),
        }
    }

    /// Run all events, then one final routed toggle from the last member
    pub fn run(&mut self, ops: &[ScenarioOp]) -> ScenarioResult {
        for op in ops {
            self.apply(op);
        }
        self.settle();

        if let Some(last) = self.sim.members().last().cloned() {
            self.toggle_checked(&last);
            self.settle();
        }
        self.check_authority("end");
        self.result()
    }

    pub fn result(&self) -> ScenarioResult {
        let values = self.sim.values();
        let final_value = values.values().next().copied();
        ScenarioResult {
            converged: self.sim.converged(),
            final_value,
            authorities: self.sim.authorities(),
            members: self.sim.members(),
            payloads_delivered: self.sim.delivered(),
            violations: self.violations.clone(),
        }
    }

    fn settle(&mut self) {
        self.sim.run_until_quiet(self.config.max_steps);
    }

    /// Toggle and check that a non-authority did not mutate locally
    fn toggle_checked(&mut self, peer: &PeerId) {
        let before = self.sim.replica(peer).map(|r| (r.is_authority(), r.armed()));
        self.sim.toggle(peer);
        let after = self.sim.replica(peer).map(|r| r.armed());

        if let (Some((false, was)), Some(now)) = (before, after) {
            if was != now {
                self.violations
                    .push(format!("non-authority {} changed its value on toggle", peer));
            }
        }
    }

    fn check_authority(&mut self, when: &str) {
        let members = self.sim.members();
        let Some(expected) = members.first() else {
            return;
        };

        let authorities = self.sim.authorities();
        if authorities != [expected.clone()] {
            self.violations.push(format!(
                "after {}: expected sole authority {}, found {:?}",
                when, expected, authorities
            ));
        }
        for member in &members {
            let seen = self.sim.replica(member).and_then(|r| r.authority().cloned());
            if seen.as_ref() != Some(expected) {
                self.violations.push(format!(
                    "after {}: {} resolves {:?}, expected {}",
                    when, member, seen, expected
                ));
            }
        }
    }
}
