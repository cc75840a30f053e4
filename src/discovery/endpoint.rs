//! Endpoint data model.
//!
//! # Responsibilities
//! - Represent a single backend network address with metadata
//! - Represent the immutable set of endpoints for one service
//! - Distinguish "no data yet" from "synced but empty"

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A single backend network address.
///
/// Immutable once observed; discovery updates replace the instance rather
/// than mutating it in place.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Endpoint {
    /// URL scheme used to reach the backend.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Host name or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Weight for weighted selection (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Free-form metadata tags attached by the registering instance.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_weight() -> u32 {
    1
}

impl Endpoint {
    /// Create an endpoint with default scheme, weight and no tags.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: default_scheme(),
            host: host.into(),
            port,
            weight: default_weight(),
            tags: HashMap::new(),
        }
    }

    /// `host:port` form used as a URI authority.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Immutable collection of endpoints for one service.
///
/// Cheap to clone; the underlying slice is shared. A set handed to a caller
/// never changes; discovery publishes a new set instead.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Arc<[Endpoint]>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints: endpoints.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub fn as_slice(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Published discovery state for one service.
///
/// `NotSynced` means no successful sync has happened yet; it is a distinct
/// state from a synced-but-empty set so that callers can tell "no data" from
/// "the service has zero instances".
#[derive(Debug, Clone)]
pub enum EndpointsSnapshot {
    NotSynced,
    Synced(EndpointSet),
}

impl EndpointsSnapshot {
    /// The synced set, if any sync has completed.
    pub fn synced(&self) -> Option<&EndpointSet> {
        match self {
            EndpointsSnapshot::NotSynced => None,
            EndpointsSnapshot::Synced(set) => Some(set),
        }
    }
}
