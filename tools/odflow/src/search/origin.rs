//! One origin zone, end to end
//!
//! 1. Seed the frontier with the zone's start points (plus their extra
//!    impedance) and run a bounded Dijkstra.
//! 2. Every settled node commits its end points. End points with an extra
//!    impedance wait in a second min-heap until the frontier has passed their
//!    total impedance, which keeps commits in non-decreasing order.
//! 3. A mass limit lowers the cutoff to the impedance at which the reached
//!    destination mass meets the origin's limit. End points at that same
//!    impedance still commit; nodes and edges at the cutoff do not.
//! 4. Rows are written from the accumulator and the shortest-path forest;
//!    the trip distribution and the link flows run last.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use odflow_common::{defined, ZoneId, NONE};

use super::{BoundedSearchHeap, ResultAccumulator, ShortestPathTree};
use crate::distribution::{Reached, TripDistribution};
use crate::graph::PreparedNetwork;
use crate::options::{ResultLayout, SearchOptions};
use crate::output::{OriginRows, SharedAccumulators};

/// End point waiting for the frontier to pass its impedance
#[derive(Clone, Copy, Debug)]
struct PendingEndPoint {
    impedance: f64,
    end_point: u32,
}

impl PartialEq for PendingEndPoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingEndPoint {}

impl PartialOrd for PendingEndPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEndPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .impedance
            .total_cmp(&self.impedance)
            .then_with(|| other.end_point.cmp(&self.end_point))
    }
}

/// Reusable per-worker state
pub struct OriginScratch<'a> {
    pub heap: BoundedSearchHeap,
    pub tree: ShortestPathTree,
    pub accumulator: ResultAccumulator<'a>,
    pending: BinaryHeap<PendingEndPoint>,
    /// node → start point of its tree root; seeded for roots, filled top-down
    /// for the other nodes when start points are written
    node_start_point: Vec<u32>,
    /// node → alternative impedance from the root
    node_alt: Vec<f64>,
    /// node → link attribute sum from the root
    node_attr: Vec<f64>,
    /// node → flow passing through it
    node_flow: Vec<f64>,
    potentials: Vec<f64>,
    reached: Vec<Reached>,
    found_mass: f64,
}

/// Outcome of one origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginSummary {
    /// Rows of this origin
    pub result_count: usize,
    /// Destination zones reached
    pub connected: usize,
    pub settled: usize,
}

/// Read-only context shared by every unit of a call
pub struct OriginSearch<'n, 'a> {
    net: &'n PreparedNetwork<'a>,
    options: &'n SearchOptions,
    layout: ResultLayout,
    distribution: Option<TripDistribution<'a>>,
    /// sizing pass: search only, no outputs
    counting: bool,
}

impl<'n, 'a> OriginSearch<'n, 'a> {
    pub fn new(
        net: &'n PreparedNetwork<'a>,
        options: &'n SearchOptions,
        layout: ResultLayout,
        counting: bool,
    ) -> Self {
        let distribution = if counting || !options.produce.needs_interaction() {
            None
        } else {
            net.interaction.map(TripDistribution::new)
        };
        Self {
            net,
            options,
            layout,
            distribution,
            counting,
        }
    }

    pub fn layout(&self) -> ResultLayout {
        self.layout
    }

    fn uses_alt_impedance(&self) -> bool {
        !self.counting && self.options.produce.alt_impedance
    }

    fn uses_link_attribute(&self) -> bool {
        !self.counting && self.options.produce.link_attribute_sum
    }

    fn uses_start_point(&self) -> bool {
        !self.counting && self.options.produce.start_point
    }

    fn uses_link_flow(&self) -> bool {
        self.distribution.is_some() && self.options.produce.link_flow
    }

    pub fn make_scratch(&self) -> OriginScratch<'n> {
        let n = self.net.nr_nodes();
        let sized = |on: bool| if on { vec![0.0; n] } else { Vec::new() };
        // cleared heaps pay O(nodes) per origin; dense is the default layout
        // of unbounded searches, which settle every reachable node anyway
        let stamped = self.layout == ResultLayout::Sparse;
        OriginScratch {
            heap: BoundedSearchHeap::new(n, stamped),
            tree: ShortestPathTree::new(n),
            accumulator: ResultAccumulator::new(
                self.net.destinations(),
                self.layout,
                self.net.limits.euclid_max_distance,
            ),
            pending: BinaryHeap::new(),
            node_start_point: vec![NONE; n],
            node_alt: sized(self.uses_alt_impedance()),
            node_attr: sized(self.uses_link_attribute()),
            node_flow: sized(self.uses_link_flow()),
            potentials: Vec::new(),
            reached: Vec::new(),
            found_mass: 0.0,
        }
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Run the bounded search of `org_zone`, leaving the reached destinations
    /// in the scratch accumulator and the forest in the scratch tree
    pub fn search(&self, org_zone: usize, s: &mut OriginScratch<'n>) -> usize {
        let net = self.net;
        let verbose = self.options.verbose_logging;

        s.heap.reset_for_new_origin(net.max_impedance(org_zone));
        s.tree.reset();
        s.accumulator.reset_for_new_origin(net.org_location(org_zone));
        s.pending.clear();
        s.found_mass = 0.0;

        for x in net.org_zone_start_points.iter(org_zone as ZoneId) {
            let node = net.start_points.node[x as usize];
            let imp = net.start_points.extra_impedance(x);
            if s.heap.insert_or_improve(node, imp, None) {
                s.node_start_point[node as usize] = x;
                if verbose {
                    tracing::trace!(org_zone, start_point = x, node, impedance = imp, "seed");
                }
            }
        }

        let mut settled = 0usize;
        while let Some((node, imp)) = s.heap.pop_best() {
            // pops are non-decreasing, so everything left is past the cutoff
            if imp >= s.heap.max_impedance() {
                break;
            }
            if !s.heap.mark_final(node, imp) {
                continue;
            }
            settled += 1;

            match s.heap.back_edge(node) {
                None => s.tree.init_root(node),
                Some(edge) => s.tree.init_child(net.opposite(edge, node), node, edge),
            }
            if verbose {
                tracing::trace!(org_zone, node, impedance = imp, back_edge = ?s.heap.back_edge(node), "settled");
            }

            for y in net.node_end_points.iter(node) {
                if net.end_points.impedance.is_none() {
                    self.commit(org_zone, s, y, imp, false);
                } else {
                    let total = imp + net.end_points.extra_impedance(y);
                    if total < s.heap.max_impedance() {
                        s.pending.push(PendingEndPoint {
                            impedance: total,
                            end_point: y,
                        });
                    }
                }
            }
            self.flush_pending(org_zone, s, imp);

            for edge in net.out_edges.iter(node) {
                let to = net.network.edge_to[edge as usize];
                s.heap.insert_or_improve(to, imp + net.edge_impedance(edge), Some(edge));
            }
            if let Some(in_edges) = &net.in_edges {
                for edge in in_edges.iter(node) {
                    let from = net.network.edge_from[edge as usize];
                    s.heap.insert_or_improve(from, imp + net.edge_impedance(edge), Some(edge));
                }
            }
        }
        self.flush_remaining(org_zone, s);

        if verbose {
            let stats = s.heap.stats();
            tracing::debug!(
                org_zone,
                settled,
                connected = s.accumulator.connected_count(),
                pushes = stats.pushes,
                stale_pops = stats.stale_pops,
                "origin searched"
            );
        }
        settled
    }

    /// Commit waiting end points at or below the settled `frontier`
    fn flush_pending(&self, org_zone: usize, s: &mut OriginScratch<'n>, frontier: f64) {
        while let Some(top) = s.pending.peek().copied() {
            if top.impedance > frontier {
                break;
            }
            s.pending.pop();
            self.commit(org_zone, s, top.end_point, top.impedance, false);
        }
    }

    /// Commit what is still waiting once the frontier is exhausted, up to the
    /// (possibly lowered) cutoff
    fn flush_remaining(&self, org_zone: usize, s: &mut OriginScratch<'n>) {
        while let Some(top) = s.pending.pop() {
            if top.impedance >= s.heap.max_impedance() {
                break;
            }
            self.commit(org_zone, s, top.end_point, top.impedance, true);
        }
        s.pending.clear();
    }

    /// Record `end_point` at `impedance`; `bounded` commits must stay below the cutoff
    fn commit(&self, org_zone: usize, s: &mut OriginScratch<'n>, end_point: u32, impedance: f64, bounded: bool) {
        if bounded && impedance >= s.heap.max_impedance() {
            return;
        }
        if !s.accumulator.try_commit(end_point, impedance) {
            return;
        }
        if self.options.verbose_logging {
            tracing::trace!(org_zone, end_point, impedance, "commit");
        }

        let Some(mass) = &self.net.limits.mass_limit else {
            return;
        };
        let zone = self.net.end_points.zone[end_point as usize];
        s.found_mass += mass.dst_mass.get(zone as usize);
        if s.found_mass >= mass.org_limit.get(org_zone) {
            s.heap.set_max_impedance(impedance.min(s.heap.max_impedance()));
            if self.options.verbose_logging {
                tracing::trace!(org_zone, impedance, found_mass = s.found_mass, "mass limit reached");
            }
        }
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Search `org_zone` and write its outputs
    pub fn run(
        &self,
        org_zone: usize,
        s: &mut OriginScratch<'n>,
        rows: Option<OriginRows<'_>>,
        shared: &SharedAccumulators<'_>,
    ) -> OriginSummary {
        let settled = self.search(org_zone, s);
        let summary = OriginSummary {
            result_count: s.accumulator.result_count(),
            connected: s.accumulator.connected_count(),
            settled,
        };
        if self.counting {
            return summary;
        }

        self.accumulate_along_tree(s);
        if let Some(mut rows) = rows {
            debug_assert_eq!(rows.len, summary.result_count);
            self.write_rows(org_zone, s, &mut rows);
            self.distribute(org_zone, s, &mut rows, shared);
        }
        summary
    }

    /// Top-down sums of the alternative impedance and the link attribute, and
    /// the start point each node descends from
    fn accumulate_along_tree(&self, s: &mut OriginScratch<'n>) {
        if self.uses_start_point() {
            for node in s.tree.walk_top_down() {
                if let Some(parent) = s.tree.parent(node) {
                    s.node_start_point[node as usize] = s.node_start_point[parent as usize];
                }
            }
        }

        let network = self.net.network;
        let sums = [
            (self.uses_alt_impedance(), network.alt_impedance.as_deref(), &mut s.node_alt),
            (self.uses_link_attribute(), network.link_attribute.as_deref(), &mut s.node_attr),
        ];
        for (on, weights, values) in sums {
            let (true, Some(weights)) = (on, weights) else {
                continue;
            };
            for node in s.tree.walk_top_down() {
                values[node as usize] = match (s.tree.parent(node), s.tree.back_edge(node)) {
                    (Some(parent), Some(edge)) => values[parent as usize] + weights[edge as usize],
                    _ => 0.0,
                };
            }
        }
    }

    /// Impedance of a result row as seen by the trip distribution
    fn interaction_impedance(&self, s: &OriginScratch<'n>, result: usize) -> f64 {
        if self.uses_alt_impedance() {
            let y = s.accumulator.result_to_end_point(result);
            let node = s.accumulator.result_to_end_node(result);
            s.node_alt[node as usize] + self.net.end_points.extra_impedance(y)
        } else {
            s.accumulator.result_to_impedance(result)
        }
    }

    fn write_rows(&self, org_zone: usize, s: &OriginScratch<'n>, rows: &mut OriginRows<'_>) {
        let acc = &s.accumulator;
        let n = rows.len.min(acc.result_count());

        if let Some(col) = rows.org_zone.as_deref_mut() {
            col[..n].fill(org_zone as ZoneId);
        }
        if let Some(col) = rows.dst_zone.as_deref_mut() {
            for (r, cell) in col[..n].iter_mut().enumerate() {
                *cell = acc.result_to_dst_zone(r);
            }
        }

        for r in acc.connected_results().filter(|&r| r < n) {
            let y = acc.result_to_end_point(r);
            let end_node = acc.result_to_end_node(r);

            if let Some(col) = rows.impedance.as_deref_mut() {
                col[r] = Some(acc.result_to_impedance(r));
            }
            if let Some(col) = rows.alt_impedance.as_deref_mut() {
                col[r] = Some(s.node_alt[end_node as usize] + self.net.end_points.extra_impedance(y));
            }
            if let Some(col) = rows.link_attribute_sum.as_deref_mut() {
                col[r] = Some(s.node_attr[end_node as usize]);
            }
            if let Some(col) = rows.end_point.as_deref_mut() {
                col[r] = Some(y);
            }
            if let Some(col) = rows.start_point.as_deref_mut() {
                col[r] = defined(s.node_start_point[end_node as usize]);
            }
            if let Some(col) = rows.link_set.as_deref_mut() {
                let mut links = Vec::new();
                let mut node = end_node;
                while let (Some(edge), Some(parent)) = (s.tree.back_edge(node), s.tree.parent(node)) {
                    links.push(edge);
                    node = parent;
                }
                links.reverse();
                col[r] = links;
            }
        }

        if let Some(col) = rows.traceback.as_deref_mut() {
            for node in s.tree.walk_top_down() {
                col[node as usize] = s.tree.back_edge(node);
            }
        }
    }

    fn distribute(
        &self,
        org_zone: usize,
        s: &mut OriginScratch<'n>,
        rows: &mut OriginRows<'_>,
        shared: &SharedAccumulators<'_>,
    ) {
        s.reached.clear();
        for r in s.accumulator.connected_results() {
            let reached = Reached {
                result: r,
                zone: s.accumulator.result_to_dst_zone(r),
                impedance: self.interaction_impedance(s, r),
            };
            s.reached.push(reached);
        }

        let Some(dist) = &self.distribution else {
            if let Some(cell) = rows.org_max_impedance.as_deref_mut() {
                *cell = s.reached.iter().map(|r| r.impedance).fold(0.0, f64::max);
            }
            return;
        };

        let n = s.accumulator.result_count();
        s.potentials.resize(n, 0.0);
        let totals = dist.distribute(org_zone, &s.reached, &mut s.potentials[..n]);

        if let Some(cell) = rows.org_factor.as_deref_mut() {
            *cell = totals.factor;
        }
        if let Some(cell) = rows.org_demand.as_deref_mut() {
            *cell = totals.demand;
        }
        if let Some(cell) = rows.org_max_impedance.as_deref_mut() {
            *cell = totals.max_impedance;
        }
        if totals.factor <= 0.0 {
            return;
        }

        if shared.wants_destinations() {
            for r in &s.reached {
                let p = s.potentials[r.result];
                shared.add_destination(r.zone, p, p * dist.dst_mass(r.zone));
            }
        }

        if self.uses_link_flow() && shared.wants_link_flow() {
            self.spread_link_flow(s, dist, shared);
        }
    }

    /// Push the OD flows from the destinations up to the roots
    fn spread_link_flow(&self, s: &mut OriginScratch<'n>, dist: &TripDistribution<'_>, shared: &SharedAccumulators<'_>) {
        for node in s.tree.walk_top_down() {
            s.node_flow[node as usize] = 0.0;
        }
        for node in s.tree.walk_bottom_up() {
            let mut flow = s.node_flow[node as usize];
            for y in self.net.node_end_points.iter(node) {
                if let Some(r) = s.accumulator.end_point_to_result(y) {
                    let zone = s.accumulator.result_to_dst_zone(r);
                    flow += s.potentials[r] * dist.dst_mass(zone);
                }
            }
            if let (Some(parent), Some(edge)) = (s.tree.parent(node), s.tree.back_edge(node)) {
                s.node_flow[parent as usize] += flow;
                if flow != 0.0 {
                    shared.add_link_flow(edge, flow);
                }
            }
        }
    }
}
