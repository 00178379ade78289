//! Bounded Dijkstra frontier with version-stamped scratch
//!
//! A binary min-heap of `(impedance, node)` with lazy deletion: improving a
//! node pushes a second entry instead of decreasing a key, and the older entry
//! surfaces later as a stale pop which [`BoundedSearchHeap::mark_final`]
//! rejects.
//!
//! Per-node tentative impedance and backlink live in one flat array that is
//! reused across origins. In stamped mode every entry carries the version of
//! the origin that wrote it, so a reset is O(1); in cleared mode the array is
//! refilled with infinity on every reset, which is cheaper when almost every
//! node is reached anyway.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use odflow_common::{defined, EdgeId, NodeId, NONE};

// =============================================================================
// HEAP ITEM
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct HeapItem {
    impedance: f64,
    node: NodeId,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .impedance
            .total_cmp(&self.impedance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

// =============================================================================
// SEARCH STATE
// =============================================================================

/// Per-node tentative state with version stamp
#[derive(Clone, Copy, Debug)]
struct NodeEntry {
    impedance: f64,
    back_edge: EdgeId,
    version: u32,
}

const UNREACHED: NodeEntry = NodeEntry {
    impedance: f64::INFINITY,
    back_edge: NONE,
    version: 0,
};

/// Counters for profiling
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStats {
    pub pushes: usize,
    pub pops: usize,
    pub stale_pops: usize,
}

/// Reusable single-origin search frontier
pub struct BoundedSearchHeap {
    entries: Vec<NodeEntry>,
    current_version: u32,
    stamped: bool,
    heap: BinaryHeap<HeapItem>,
    max_impedance: f64,
    stats: HeapStats,
}

impl BoundedSearchHeap {
    /// Create scratch for `nr_nodes` nodes
    ///
    /// `stamped` selects O(1) resets through version stamps; otherwise every
    /// reset refills the node array.
    pub fn new(nr_nodes: usize, stamped: bool) -> Self {
        Self {
            entries: vec![UNREACHED; nr_nodes],
            current_version: 0,
            stamped,
            heap: BinaryHeap::new(),
            max_impedance: f64::INFINITY,
            stats: HeapStats::default(),
        }
    }

    /// Start a new origin: invalidate every tentative value and set the cutoff
    pub fn reset_for_new_origin(&mut self, max_impedance: f64) {
        self.heap.clear();
        self.max_impedance = max_impedance;

        if !self.stamped {
            self.current_version = 1;
            for e in &mut self.entries {
                *e = NodeEntry {
                    version: 1,
                    ..UNREACHED
                };
            }
            return;
        }

        self.current_version = self.current_version.wrapping_add(1);
        if self.current_version == 0 {
            // Version overflow - reset all entries
            for e in &mut self.entries {
                *e = UNREACHED;
            }
            self.current_version = 1;
        }
    }

    /// Lower (or raise) the cutoff of the running search
    #[inline]
    pub fn set_max_impedance(&mut self, max_impedance: f64) {
        self.max_impedance = max_impedance;
    }

    #[inline]
    pub fn max_impedance(&self) -> f64 {
        self.max_impedance
    }

    #[inline]
    fn current(&self, node: NodeId) -> Option<&NodeEntry> {
        let e = &self.entries[node as usize];
        (e.version == self.current_version && e.impedance < f64::INFINITY).then_some(e)
    }

    /// Offer `candidate` as a path to `node` arriving over `back_edge`
    ///
    /// Returns false when the candidate reaches the cutoff or does not improve
    /// on the node's current tentative value.
    #[inline]
    pub fn insert_or_improve(&mut self, node: NodeId, candidate: f64, back_edge: Option<EdgeId>) -> bool {
        if candidate >= self.max_impedance {
            return false;
        }
        if let Some(e) = self.current(node) {
            if e.impedance <= candidate {
                return false;
            }
        }

        self.entries[node as usize] = NodeEntry {
            impedance: candidate,
            back_edge: back_edge.unwrap_or(NONE),
            version: self.current_version,
        };
        self.heap.push(HeapItem {
            impedance: candidate,
            node,
        });
        self.stats.pushes += 1;
        true
    }

    /// Pop the smallest `(node, impedance)` entry; it may be stale
    #[inline]
    pub fn pop_best(&mut self) -> Option<(NodeId, f64)> {
        let item = self.heap.pop()?;
        self.stats.pops += 1;
        Some((item.node, item.impedance))
    }

    /// Accept a popped entry as the node's final value for this origin
    ///
    /// Returns false for a stale entry (the node has since been improved or
    /// already finalized at a lower impedance) and for entries at or beyond
    /// the current cutoff.
    #[inline]
    pub fn mark_final(&mut self, node: NodeId, impedance: f64) -> bool {
        let accepted = match self.current(node) {
            Some(e) => e.impedance >= impedance && impedance < self.max_impedance,
            None => false,
        };
        if !accepted {
            self.stats.stale_pops += 1;
        }
        accepted
    }

    /// Tentative (or final) impedance of `node` in the current origin
    #[inline]
    pub fn impedance(&self, node: NodeId) -> Option<f64> {
        self.current(node).map(|e| e.impedance)
    }

    /// Edge over which `node` was reached; `None` for start nodes and
    /// unreached nodes
    #[inline]
    pub fn back_edge(&self, node: NodeId) -> Option<EdgeId> {
        self.current(node).and_then(|e| defined(e.back_edge))
    }

    /// True when `node` has not been reached in the current origin
    #[inline]
    pub fn is_stale(&self, node: NodeId) -> bool {
        self.current(node).is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn nr_nodes(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }
}
