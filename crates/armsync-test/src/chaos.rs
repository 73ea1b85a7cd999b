//! Chaos links for ARMSYNC session simulation
//!
//! A link is one direction between two peers. It may lose or duplicate
//! payloads but never reorders them: the session fabric guarantees
//! per-sender FIFO delivery, and the protocol relies on it.

use std::collections::VecDeque;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link fault configuration
#[derive(Clone, Debug, PartialEq)]
pub struct LinkChaos {
    /// Payload loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Duplicate probability (0.0 - 1.0)
    pub duplicate_prob: f64,
}

impl Default for LinkChaos {
    fn default() -> Self {
        LinkChaos::perfect()
    }
}

impl LinkChaos {
    /// Reliable delivery
    pub fn perfect() -> Self {
        LinkChaos {
            loss_rate: 0.0,
            duplicate_prob: 0.0,
        }
    }

    /// Occasional loss and duplication
    pub fn lossy() -> Self {
        LinkChaos {
            loss_rate: 0.05,
            duplicate_prob: 0.02,
        }
    }

    /// Heavy loss
    pub fn hostile() -> Self {
        LinkChaos {
            loss_rate: 0.3,
            duplicate_prob: 0.1,
        }
    }

    /// Drops everything
    pub fn severed() -> Self {
        LinkChaos {
            loss_rate: 1.0,
            duplicate_prob: 0.0,
        }
    }
}

/// Chaos link statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub payloads_sent: u64,
    pub payloads_delivered: u64,
    pub payloads_lost: u64,
    pub payloads_duplicated: u64,
}

impl LinkStats {
    pub fn loss_rate(&self) -> f64 {
        if self.payloads_sent == 0 {
            0.0
        } else {
            self.payloads_lost as f64 / self.payloads_sent as f64
        }
    }
}

/// One directed FIFO link
#[derive(Debug)]
pub struct ChaosLink {
    chaos: LinkChaos,
    rng: StdRng,
    in_flight: VecDeque<Bytes>,
    stats: LinkStats,
}

impl ChaosLink {
    pub fn new(chaos: LinkChaos, seed: u64) -> Self {
        ChaosLink {
            chaos,
            rng: StdRng::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn chaos(&self) -> &LinkChaos {
        &self.chaos
    }

    /// Replace the fault configuration; payloads already in flight stay
    pub fn set_chaos(&mut self, chaos: LinkChaos) {
        self.chaos = chaos;
    }

    /// Queue a payload
    pub fn send(&mut self, payload: Bytes) {
        self.stats.payloads_sent += 1;

        if self.rng.gen::<f64>() < self.chaos.loss_rate {
            self.stats.payloads_lost += 1;
            return;
        }

        // A duplicate lands right behind the original
        if self.rng.gen::<f64>() < self.chaos.duplicate_prob {
            self.in_flight.push_back(payload.clone());
            self.stats.payloads_duplicated += 1;
        }
        self.in_flight.push_back(payload);
    }

    /// Deliver the oldest payload
    pub fn pop(&mut self) -> Option<Bytes> {
        let payload = self.in_flight.pop_front()?;
        self.stats.payloads_delivered += 1;
        Some(payload)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}
