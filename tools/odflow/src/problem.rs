//! Input model
//!
//! One [`Problem`] describes a complete call: the network, the origin and
//! destination sides, optional limits and an optional interaction model. It is
//! plain serde data; [`crate::graph::PreparedNetwork`] validates it and builds
//! the relations the search needs.

use serde::{Deserialize, Serialize};

use odflow_common::{NodeId, ZoneId};

use crate::options::{DecayFunction, SearchOptions};

/// 2-D zone location
pub type Location = [f64; 2];

/// A value given once for all zones or once per zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneValues<T> {
    Uniform(T),
    PerZone(Vec<T>),
}

impl<T: Copy> ZoneValues<T> {
    /// Value for `zone`; per-zone data must have been length-checked
    #[inline]
    pub fn get(&self, zone: usize) -> T {
        match self {
            ZoneValues::Uniform(v) => *v,
            ZoneValues::PerZone(values) => values[zone],
        }
    }

    /// Number of values when given per zone
    pub fn per_zone_len(&self) -> Option<usize> {
        match self {
            ZoneValues::Uniform(_) => None,
            ZoneValues::PerZone(values) => Some(values.len()),
        }
    }

    pub fn values(&self) -> &[T] {
        match self {
            ZoneValues::Uniform(v) => std::slice::from_ref(v),
            ZoneValues::PerZone(values) => values,
        }
    }
}

/// Directed network with non-negative edge impedances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub nr_nodes: usize,
    pub edge_from: Vec<NodeId>,
    pub edge_to: Vec<NodeId>,
    pub impedance: Vec<f64>,
    /// Alternative per-edge weight summed along the shortest path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_impedance: Option<Vec<f64>>,
    /// Per-edge attribute summed along the shortest path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_attribute: Option<Vec<f64>>,
    /// Per-edge flag: the edge may also be traversed from `to` to `from`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<Vec<bool>>,
}

impl Network {
    pub fn nr_edges(&self) -> usize {
        self.impedance.len()
    }
}

/// Start points and origin zones, or end points and destination zones
///
/// Point `p` sits on node `nodes[p]` (node `p` when absent) and belongs to
/// zone `zones[p]`. The extra impedance of a point is added when the search
/// enters (start) or leaves (end) the network through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSide {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<ZoneId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impedance: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr_zones: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_locations: Option<Vec<Location>>,
}

/// Destination mass limit: stop an origin's search once the reached
/// destination mass meets the origin's limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassLimit {
    /// per origin zone
    pub org_limit: ZoneValues<f64>,
    /// per destination zone
    pub dst_mass: ZoneValues<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limits {
    /// Cutoff per origin zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_impedance: Option<ZoneValues<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_limit: Option<MassLimit>,
    /// Maximum straight-line distance between origin and destination zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub euclid_max_distance: Option<f64>,
}

impl Limits {
    /// A cutoff or mass limit makes most OD pairs unreachable
    pub fn bounded(&self) -> bool {
        self.max_impedance.is_some() || self.mass_limit.is_some()
    }
}

/// Gravity-model trip distribution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionModel {
    pub decay: DecayFunction,
    /// v_i, default 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_mass: Option<ZoneValues<f64>>,
    /// demand elasticity alpha, default 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_alpha: Option<ZoneValues<f64>>,
    /// w_j, default 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_mass: Option<ZoneValues<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_min_impedance: Option<ZoneValues<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_min_impedance: Option<ZoneValues<f64>>,
}

/// A complete computation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub network: Network,
    #[serde(default)]
    pub origins: ZoneSide,
    #[serde(default)]
    pub destinations: ZoneSide,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<InteractionModel>,
    #[serde(default)]
    pub options: SearchOptions,
}

impl Problem {
    /// Read a problem from a JSON string
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
