//! Validated network and zone relations
//!
//! Built once per call from a [`Problem`]. Every contract and data check runs
//! here, before any worker starts, so the search code can index without
//! re-checking.

use odflow_common::{EdgeId, Error, NodeId, Result, ZoneId, NONE};

use super::InvertedAdjacency;
use crate::options::{DecayFunction, SearchOptions};
use crate::problem::{InteractionModel, Limits, Location, Network, Problem, ZoneSide, ZoneValues};
use crate::search::DestinationView;

/// Point side (start or end points) with defaults resolved
#[derive(Debug, Clone)]
pub struct PointSet<'a> {
    /// point → node
    pub node: Vec<NodeId>,
    /// point → zone, NONE for points outside every zone
    pub zone: Vec<ZoneId>,
    /// extra impedance per point
    pub impedance: Option<&'a [f64]>,
    pub nr_zones: usize,
    pub zone_locations: Option<&'a [Location]>,
}

impl PointSet<'_> {
    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    #[inline]
    pub fn extra_impedance(&self, point: u32) -> f64 {
        self.impedance.map_or(0.0, |imp| imp[point as usize])
    }
}

pub struct PreparedNetwork<'a> {
    pub network: &'a Network,
    pub limits: &'a Limits,
    pub interaction: Option<&'a InteractionModel>,
    /// from-node → outgoing edges
    pub out_edges: InvertedAdjacency,
    /// to-node → edges also traversable backwards
    pub in_edges: Option<InvertedAdjacency>,
    pub start_points: PointSet<'a>,
    pub end_points: PointSet<'a>,
    /// origin zone → start points
    pub org_zone_start_points: InvertedAdjacency,
    /// node → end points
    pub node_end_points: InvertedAdjacency,
}

impl<'a> PreparedNetwork<'a> {
    /// Validate `problem` under `options` and build the search relations
    pub fn new(problem: &'a Problem, options: &SearchOptions) -> Result<Self> {
        options.check_legality(problem)?;

        let network = &problem.network;
        let nr_nodes = network.nr_nodes;
        let nr_edges = network.nr_edges();

        check_network(network)?;

        let start_points = resolve_points(
            &ORIGIN_ROLES,
            &problem.origins,
            nr_nodes,
            if options.od_matrix {
                ZoneDefault::PerPointUnlessOne
            } else {
                ZoneDefault::Single
            },
        )?;
        let end_points = resolve_points(
            &DESTINATION_ROLES,
            &problem.destinations,
            nr_nodes,
            ZoneDefault::PerPoint,
        )?;

        check_limits(&problem.limits, start_points.nr_zones, end_points.nr_zones)?;
        if let Some(model) = &problem.interaction {
            check_interaction(model, start_points.nr_zones, end_points.nr_zones)?;
        }

        if nr_nodes == 0 {
            tracing::warn!("no nodes in network");
        }
        if nr_edges == 0 {
            tracing::warn!("no edges in network");
        }
        if start_points.is_empty() {
            tracing::warn!("no start points");
        }
        if end_points.is_empty() {
            tracing::warn!("no end points");
        }

        let out_edges = InvertedAdjacency::build(&network.edge_from, nr_nodes);
        let in_edges = if options.bidirectional {
            Some(InvertedAdjacency::build(&network.edge_to, nr_nodes))
        } else {
            network.bidirectional.as_ref().map(|flags| {
                InvertedAdjacency::build_filtered(&network.edge_to, nr_nodes, |e| flags[e])
            })
        };

        let org_zone_start_points = if start_points.nr_zones == 1 && problem.origins.zones.is_none() {
            InvertedAdjacency::all_to_one(start_points.len())
        } else {
            InvertedAdjacency::build(&start_points.zone, start_points.nr_zones)
        };
        let node_end_points = InvertedAdjacency::build(&end_points.node, nr_nodes);

        tracing::debug!(
            nodes = nr_nodes,
            edges = nr_edges,
            start_points = start_points.len(),
            end_points = end_points.len(),
            org_zones = start_points.nr_zones,
            dst_zones = end_points.nr_zones,
            bidirectional = in_edges.is_some(),
            "prepared network"
        );

        Ok(Self {
            network,
            limits: &problem.limits,
            interaction: problem.interaction.as_ref(),
            out_edges,
            in_edges,
            start_points,
            end_points,
            org_zone_start_points,
            node_end_points,
        })
    }

    pub fn nr_nodes(&self) -> usize {
        self.network.nr_nodes
    }

    pub fn nr_edges(&self) -> usize {
        self.network.nr_edges()
    }

    pub fn nr_org_zones(&self) -> usize {
        self.start_points.nr_zones
    }

    pub fn nr_dst_zones(&self) -> usize {
        self.end_points.nr_zones
    }

    #[inline]
    pub fn edge_impedance(&self, edge: EdgeId) -> f64 {
        self.network.impedance[edge as usize]
    }

    /// Node at the other end of `edge` seen from `node`
    #[inline]
    pub fn opposite(&self, edge: EdgeId, node: NodeId) -> NodeId {
        let e = edge as usize;
        if self.network.edge_from[e] == node {
            self.network.edge_to[e]
        } else {
            self.network.edge_from[e]
        }
    }

    /// Cutoff of an origin zone
    #[inline]
    pub fn max_impedance(&self, org_zone: usize) -> f64 {
        self.limits
            .max_impedance
            .as_ref()
            .map_or(f64::INFINITY, |m| m.get(org_zone))
    }

    #[inline]
    pub fn org_location(&self, org_zone: usize) -> Option<Location> {
        self.start_points.zone_locations.map(|l| l[org_zone])
    }

    pub fn destinations(&self) -> DestinationView<'_> {
        DestinationView {
            nr_zones: self.end_points.nr_zones,
            end_point_zone: &self.end_points.zone,
            end_point_node: &self.end_points.node,
            zone_locations: self.end_points.zone_locations,
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum ZoneDefault {
    /// zone `p` for point `p`
    PerPoint,
    /// one zone holding every point when one zone is declared, else `PerPoint`
    PerPointUnlessOne,
    /// one zone holding every point
    Single,
}

fn check_len(role: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::LengthMismatch {
            role,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_indices(role: &'static str, indices: &[u32], count: usize, allow_none: bool) -> Result<()> {
    for (position, &index) in indices.iter().enumerate() {
        if allow_none && index == NONE {
            continue;
        }
        if index as usize >= count {
            return Err(Error::IndexOutOfRange {
                role,
                position,
                index: index as u64,
                count: count as u64,
            });
        }
    }
    Ok(())
}

/// Values must be non-negative and not NaN; infinity is allowed
fn check_non_negative(role: &'static str, values: &[f64]) -> Result<()> {
    for (position, &value) in values.iter().enumerate() {
        if value.is_nan() {
            return Err(Error::InvalidValue {
                role,
                position,
                value,
                reason: "not a number",
            });
        }
        if value < 0.0 {
            return Err(Error::InvalidValue {
                role,
                position,
                value,
                reason: "negative",
            });
        }
    }
    Ok(())
}

fn check_finite(role: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(position) => Err(Error::InvalidValue {
            role,
            position,
            value: values[position],
            reason: "not finite",
        }),
        None => Ok(()),
    }
}

fn check_zone_values(
    role: &'static str,
    values: &ZoneValues<f64>,
    nr_zones: usize,
) -> Result<()> {
    if let Some(len) = values.per_zone_len() {
        check_len(role, len, nr_zones)?;
    }
    check_non_negative(role, values.values())
}

fn check_network(network: &Network) -> Result<()> {
    let nr_edges = network.nr_edges();
    check_len("network.edge_from", network.edge_from.len(), nr_edges)?;
    check_len("network.edge_to", network.edge_to.len(), nr_edges)?;
    check_indices("network.edge_from", &network.edge_from, network.nr_nodes, false)?;
    check_indices("network.edge_to", &network.edge_to, network.nr_nodes, false)?;
    check_non_negative("network.impedance", &network.impedance)?;

    if let Some(alt) = &network.alt_impedance {
        check_len("network.alt_impedance", alt.len(), nr_edges)?;
        check_non_negative("network.alt_impedance", alt)?;
    }
    if let Some(attr) = &network.link_attribute {
        check_len("network.link_attribute", attr.len(), nr_edges)?;
        check_finite("network.link_attribute", attr)?;
    }
    if let Some(flags) = &network.bidirectional {
        check_len("network.bidirectional", flags.len(), nr_edges)?;
    }
    Ok(())
}

/// Input names of one side, for error messages
struct SideRoles {
    nodes: &'static str,
    zones: &'static str,
    impedance: &'static str,
    zone_locations: &'static str,
}

const ORIGIN_ROLES: SideRoles = SideRoles {
    nodes: "origins.nodes",
    zones: "origins.zones",
    impedance: "origins.impedance",
    zone_locations: "origins.zone_locations",
};

const DESTINATION_ROLES: SideRoles = SideRoles {
    nodes: "destinations.nodes",
    zones: "destinations.zones",
    impedance: "destinations.impedance",
    zone_locations: "destinations.zone_locations",
};

fn resolve_points<'a>(
    roles: &SideRoles,
    input: &'a ZoneSide,
    nr_nodes: usize,
    zone_default: ZoneDefault,
) -> Result<PointSet<'a>> {
    let node = match &input.nodes {
        Some(nodes) => {
            check_indices(roles.nodes, nodes, nr_nodes, false)?;
            nodes.clone()
        }
        None => (0..nr_nodes as NodeId).collect(),
    };
    let nr_points = node.len();

    if let Some(imp) = &input.impedance {
        check_len(roles.impedance, imp.len(), nr_points)?;
        check_non_negative(roles.impedance, imp)?;
    }

    let (zone, nr_zones) = match &input.zones {
        Some(zones) => {
            check_len(roles.zones, zones.len(), nr_points)?;
            let nr_zones = input.nr_zones.unwrap_or_else(|| {
                zones
                    .iter()
                    .filter(|&&z| z != NONE)
                    .max()
                    .map_or(0, |&z| z as usize + 1)
            });
            check_indices(roles.zones, zones, nr_zones, true)?;
            (zones.clone(), nr_zones)
        }
        None => {
            let single = zone_default == ZoneDefault::Single
                || (zone_default == ZoneDefault::PerPointUnlessOne && input.nr_zones == Some(1));
            if single {
                (vec![0; nr_points], 1)
            } else {
                if let Some(nr_zones) = input.nr_zones {
                    check_len(roles.zones, nr_points, nr_zones)?;
                }
                ((0..nr_points as ZoneId).collect(), nr_points)
            }
        }
    };

    if let Some(locations) = &input.zone_locations {
        check_len(roles.zone_locations, locations.len(), nr_zones)?;
        for (position, loc) in locations.iter().enumerate() {
            if let Some(&value) = loc.iter().find(|v| !v.is_finite()) {
                return Err(Error::InvalidValue {
                    role: roles.zone_locations,
                    position,
                    value,
                    reason: "not finite",
                });
            }
        }
    }

    Ok(PointSet {
        node,
        zone,
        impedance: input.impedance.as_deref(),
        nr_zones,
        zone_locations: input.zone_locations.as_deref(),
    })
}

fn check_limits(limits: &Limits, nr_org_zones: usize, nr_dst_zones: usize) -> Result<()> {
    if let Some(max) = &limits.max_impedance {
        check_zone_values("limits.max_impedance", max, nr_org_zones)?;
    }
    if let Some(mass) = &limits.mass_limit {
        check_zone_values("limits.mass_limit.org_limit", &mass.org_limit, nr_org_zones)?;
        check_zone_values("limits.mass_limit.dst_mass", &mass.dst_mass, nr_dst_zones)?;
    }
    if let Some(d) = limits.euclid_max_distance {
        check_non_negative("limits.euclid_max_distance", &[d])?;
    }
    Ok(())
}

fn check_interaction(model: &InteractionModel, nr_org_zones: usize, nr_dst_zones: usize) -> Result<()> {
    match model.decay {
        DecayFunction::Power { beta } => check_finite("interaction.decay.beta", &[beta])?,
        DecayFunction::Logit { alpha, beta, gamma } => {
            check_finite("interaction.decay", &[alpha, beta, gamma])?
        }
    }
    let per_org = [
        ("interaction.org_mass", &model.org_mass),
        ("interaction.org_alpha", &model.org_alpha),
        ("interaction.org_min_impedance", &model.org_min_impedance),
    ];
    for (role, values) in per_org {
        if let Some(values) = values {
            check_zone_values(role, values, nr_org_zones)?;
        }
    }
    let per_dst = [
        ("interaction.dst_mass", &model.dst_mass),
        ("interaction.dst_min_impedance", &model.dst_min_impedance),
    ];
    for (role, values) in per_dst {
        if let Some(values) = values {
            check_zone_values(role, values, nr_dst_zones)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Problem {
        serde_json::from_str(
            r#"{
                "network": {
                    "nr_nodes": 4,
                    "edge_from": [0, 0, 1, 1, 2],
                    "edge_to":   [1, 2, 2, 3, 3],
                    "impedance": [1, 4, 1, 5, 1]
                },
                "origins": { "nodes": [0] },
                "destinations": { "nodes": [3] }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_resolved() {
        let problem = diamond();
        let net = PreparedNetwork::new(&problem, &problem.options).unwrap();
        assert_eq!(net.nr_org_zones(), 1);
        assert_eq!(net.nr_dst_zones(), 1);
        assert_eq!(net.out_edges.iter(1).collect::<Vec<_>>(), vec![3, 2]);
        assert!(net.in_edges.is_none());
        assert_eq!(net.node_end_points.iter(3).collect::<Vec<_>>(), vec![0]);
        assert_eq!(net.opposite(2, 2), 1);
    }

    #[test]
    fn test_negative_impedance_rejected() {
        let mut problem = diamond();
        problem.network.impedance[3] = -1.0;
        let err = PreparedNetwork::new(&problem, &problem.options).err().unwrap();
        assert!(err.is_data_error());
        assert!(err.to_string().contains("network.impedance[3]"));
    }

    #[test]
    fn test_out_of_range_node_rejected() {
        let mut problem = diamond();
        problem.network.edge_to[0] = 9;
        assert!(matches!(
            PreparedNetwork::new(&problem, &problem.options),
            Err(Error::IndexOutOfRange { role: "network.edge_to", position: 0, .. })
        ));

        let mut problem = diamond();
        problem.destinations.nodes = Some(vec![4]);
        assert!(PreparedNetwork::new(&problem, &problem.options).is_err());
    }

    #[test]
    fn test_zone_value_length_checked() {
        let mut problem = diamond();
        problem.limits.max_impedance = Some(ZoneValues::PerZone(vec![1.0, 2.0]));
        assert!(matches!(
            PreparedNetwork::new(&problem, &problem.options),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_explicit_zones() {
        let mut problem = diamond();
        problem.origins.nodes = Some(vec![0, 1, 2]);
        problem.origins.zones = Some(vec![1, NONE, 1]);
        let net = PreparedNetwork::new(&problem, &problem.options).unwrap();
        assert_eq!(net.nr_org_zones(), 2);
        assert_eq!(net.org_zone_start_points.iter(1).collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(net.org_zone_start_points.first(0), None);
    }

    #[test]
    fn test_bidirectional_flags() {
        let mut problem = diamond();
        problem.network.bidirectional = Some(vec![false, false, true, false, false]);
        let net = PreparedNetwork::new(&problem, &problem.options).unwrap();
        let in_edges = net.in_edges.as_ref().unwrap();
        assert_eq!(in_edges.iter(2).collect::<Vec<_>>(), vec![2]);
        assert_eq!(in_edges.first(3), None);
    }
}
