//! Per-origin destination bookkeeping
//!
//! Records, for the origin being searched, the first (and therefore cheapest)
//! end point committed for every destination zone. Two layouts:
//!
//! - **Dense**: one slot per destination zone; the result index of a zone is
//!   the zone id. A reset clears all slots.
//! - **Sparse**: a zone is connected iff its last-committed tick equals the
//!   current tick; connected zones get contiguous result indices in commit
//!   order. A reset only clears the local result list.
//!
//! An optional Euclidean filter rejects destinations whose zone location is
//! further than a maximum distance from the origin location before any
//! bookkeeping happens.

use odflow_common::{defined, NodeId, ZoneId, NONE};

use crate::options::ResultLayout;
use crate::problem::Location;

/// Read-only destination side of the network
#[derive(Clone, Copy, Debug)]
pub struct DestinationView<'a> {
    pub nr_zones: usize,
    /// end point → destination zone (NONE for unassigned end points)
    pub end_point_zone: &'a [ZoneId],
    /// end point → network node
    pub end_point_node: &'a [NodeId],
    /// destination zone → location, required by the Euclidean filter
    pub zone_locations: Option<&'a [Location]>,
}

pub struct ResultAccumulator<'a> {
    dst: DestinationView<'a>,
    layout: ResultLayout,
    /// squared distance bound of the Euclidean filter
    max_sq_distance: Option<f64>,
    origin_location: Option<Location>,

    /// zone → committed impedance
    found_impedance: Vec<f64>,
    /// zone → committed end point (NONE when not connected in dense mode)
    found_end_point: Vec<u32>,

    // sparse-only state
    current_tick: u32,
    last_committed_tick: Vec<u32>,
    result_index: Vec<u32>,
    /// result index → zone, in commit order
    results: Vec<ZoneId>,
}

impl<'a> ResultAccumulator<'a> {
    pub fn new(dst: DestinationView<'a>, layout: ResultLayout, max_distance: Option<f64>) -> Self {
        let n = dst.nr_zones;
        let sparse = layout == ResultLayout::Sparse;
        Self {
            dst,
            layout,
            max_sq_distance: max_distance.map(|d| d * d),
            origin_location: None,
            found_impedance: vec![f64::INFINITY; n],
            found_end_point: vec![NONE; n],
            current_tick: 0,
            last_committed_tick: if sparse { vec![0; n] } else { Vec::new() },
            result_index: if sparse { vec![NONE; n] } else { Vec::new() },
            results: Vec::new(),
        }
    }

    pub fn layout(&self) -> ResultLayout {
        self.layout
    }

    /// Start bookkeeping for a new origin located at `origin_location`
    pub fn reset_for_new_origin(&mut self, origin_location: Option<Location>) {
        self.origin_location = origin_location;
        match self.layout {
            ResultLayout::Dense => {
                self.found_impedance.fill(f64::INFINITY);
                self.found_end_point.fill(NONE);
            }
            ResultLayout::Sparse => {
                self.results.clear();
                self.current_tick = self.current_tick.wrapping_add(1);
                if self.current_tick == 0 {
                    self.last_committed_tick.fill(0);
                    self.current_tick = 1;
                }
            }
        }
    }

    /// True when the Euclidean filter lets `zone` through
    #[inline]
    fn within_distance(&self, zone: ZoneId) -> bool {
        let (Some(max_sq), Some(origin), Some(locations)) =
            (self.max_sq_distance, self.origin_location, self.dst.zone_locations)
        else {
            return true;
        };
        let dest = locations[zone as usize];
        let dx = dest[0] - origin[0];
        let dy = dest[1] - origin[1];
        dx * dx + dy * dy <= max_sq
    }

    /// Commit `end_point` at `impedance`
    ///
    /// Returns false when the end point has no zone, when the Euclidean filter
    /// rejects it, or when its zone is already connected. Commits arrive in
    /// non-decreasing impedance order, so the first commit of a zone is final.
    pub fn try_commit(&mut self, end_point: u32, impedance: f64) -> bool {
        let Some(zone) = self
            .dst
            .end_point_zone
            .get(end_point as usize)
            .copied()
            .and_then(defined)
        else {
            return false;
        };
        if zone as usize >= self.dst.nr_zones || !self.within_distance(zone) {
            return false;
        }
        if self.is_connected(zone) {
            debug_assert!(
                impedance >= self.found_impedance[zone as usize],
                "commit below an earlier commit of the same zone"
            );
            return false;
        }

        let z = zone as usize;
        self.found_impedance[z] = impedance;
        self.found_end_point[z] = end_point;
        if self.layout == ResultLayout::Sparse {
            self.last_committed_tick[z] = self.current_tick;
            self.result_index[z] = self.results.len() as u32;
            self.results.push(zone);
        }
        true
    }

    /// Number of result rows of the current origin
    ///
    /// Dense results have a row per destination zone, sparse results a row per
    /// connected zone.
    pub fn result_count(&self) -> usize {
        match self.layout {
            ResultLayout::Dense => self.dst.nr_zones,
            ResultLayout::Sparse => self.results.len(),
        }
    }

    /// Number of destination zones connected to the current origin
    pub fn connected_count(&self) -> usize {
        match self.layout {
            ResultLayout::Dense => self.found_end_point.iter().filter(|&&y| y != NONE).count(),
            ResultLayout::Sparse => self.results.len(),
        }
    }

    #[inline]
    pub fn is_connected(&self, zone: ZoneId) -> bool {
        let z = zone as usize;
        match self.layout {
            ResultLayout::Dense => self.found_end_point.get(z).is_some_and(|&y| y != NONE),
            ResultLayout::Sparse => self
                .last_committed_tick
                .get(z)
                .is_some_and(|&t| t == self.current_tick),
        }
    }

    /// Result index of `zone` if it is connected
    #[inline]
    pub fn zone_to_result(&self, zone: ZoneId) -> Option<usize> {
        if !self.is_connected(zone) {
            return None;
        }
        Some(match self.layout {
            ResultLayout::Dense => zone as usize,
            ResultLayout::Sparse => self.result_index[zone as usize] as usize,
        })
    }

    /// Result index of `end_point` if it is the end point its zone was
    /// connected through
    pub fn end_point_to_result(&self, end_point: u32) -> Option<usize> {
        let zone = defined(*self.dst.end_point_zone.get(end_point as usize)?)?;
        if self.dst_zone_to_end_point(zone)? != end_point {
            return None;
        }
        self.zone_to_result(zone)
    }

    #[inline]
    pub fn result_to_dst_zone(&self, result: usize) -> ZoneId {
        match self.layout {
            ResultLayout::Dense => result as ZoneId,
            ResultLayout::Sparse => self.results[result],
        }
    }

    #[inline]
    pub fn result_to_end_point(&self, result: usize) -> u32 {
        let zone = self.result_to_dst_zone(result);
        debug_assert!(self.is_connected(zone));
        self.found_end_point[zone as usize]
    }

    #[inline]
    pub fn result_to_end_node(&self, result: usize) -> NodeId {
        self.dst.end_point_node[self.result_to_end_point(result) as usize]
    }

    #[inline]
    pub fn result_to_impedance(&self, result: usize) -> f64 {
        let zone = self.result_to_dst_zone(result);
        debug_assert!(self.is_connected(zone));
        self.found_impedance[zone as usize]
    }

    #[inline]
    pub fn dst_zone_to_end_point(&self, zone: ZoneId) -> Option<u32> {
        self.is_connected(zone)
            .then(|| self.found_end_point[zone as usize])
    }

    #[inline]
    pub fn dst_zone_to_end_node(&self, zone: ZoneId) -> Option<NodeId> {
        self.dst_zone_to_end_point(zone)
            .map(|y| self.dst.end_point_node[y as usize])
    }

    /// Result indices of all connected zones, in commit order for sparse
    /// results and zone order for dense ones
    pub fn connected_results(&self) -> impl Iterator<Item = usize> + '_ {
        let dense = self.layout == ResultLayout::Dense;
        let n = if dense { self.dst.nr_zones } else { self.results.len() };
        (0..n).filter(move |&r| !dense || self.found_end_point[r] != NONE)
    }
}
