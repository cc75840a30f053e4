//! Endpoint selection policies.
//!
//! # Design Decisions
//! - Policies are stateless or carry a single atomic; selection is safe
//!   under concurrent calls without locks
//! - The set passed in is an immutable snapshot, so index math cannot race
//!   with membership changes

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::SelectionKind;
use crate::discovery::endpoint::{Endpoint, EndpointSet};

/// Picks one endpoint out of the current set.
pub trait SelectionPolicy: Send + Sync {
    fn select<'a>(&self, endpoints: &'a EndpointSet) -> Option<&'a Endpoint>;
}

/// Build the policy configured for a route.
pub fn policy_for(kind: SelectionKind) -> Box<dyn SelectionPolicy> {
    match kind {
        SelectionKind::RoundRobin => Box::new(RoundRobin::new()),
        SelectionKind::Random => Box::new(Random),
        SelectionKind::Weighted => Box::new(Weighted),
    }
}

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RoundRobin {
    fn select<'a>(&self, endpoints: &'a EndpointSet) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        endpoints.get(index)
    }
}

/// Uniform random selector.
#[derive(Debug, Default)]
pub struct Random;

impl SelectionPolicy for Random {
    fn select<'a>(&self, endpoints: &'a EndpointSet) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }
        endpoints.get(rand::thread_rng().gen_range(0..endpoints.len()))
    }
}

/// Weight-proportional random selector.
/// Endpoints with weight 0 are never picked; if every weight is 0 the
/// selector falls back to a uniform draw.
#[derive(Debug, Default)]
pub struct Weighted;

impl SelectionPolicy for Weighted {
    fn select<'a>(&self, endpoints: &'a EndpointSet) -> Option<&'a Endpoint> {
        if endpoints.is_empty() {
            return None;
        }

        let total: u64 = endpoints.iter().map(|e| e.weight as u64).sum();
        if total == 0 {
            return endpoints.get(rand::thread_rng().gen_range(0..endpoints.len()));
        }

        let mut draw = rand::thread_rng().gen_range(0..total);
        for endpoint in endpoints.iter() {
            let weight = endpoint.weight as u64;
            if draw < weight {
                return Some(endpoint);
            }
            draw -= weight;
        }
        endpoints.get(endpoints.len() - 1)
    }
}
