//! Inverted adjacency: "first / next incident element" links
//!
//! Built from an element→node array (edge→from-node, point→zone, ...) in one
//! ascending pass over the elements. Each node keeps the most recently inserted
//! element and each element links to the one inserted before it, so walking a
//! node yields its elements in descending index order without materialising
//! adjacency lists.
//!
//! The descending order decides which of several equal-impedance paths a
//! search settles on first. Callers must not rely on it beyond that.

use odflow_common::{defined, NONE};

/// Flat "first incident element per node" + "next element" links
#[derive(Clone, Debug, Default)]
pub struct InvertedAdjacency {
    /// node → most recently inserted element (NONE if none)
    first: Vec<u32>,
    /// element → previously inserted element of the same node (NONE at the end)
    next: Vec<u32>,
}

impl InvertedAdjacency {
    /// Build from an element→node relation
    ///
    /// Elements whose node is `>= nr_nodes` (including the [`NONE`] marker) are
    /// left out of every chain.
    pub fn build(endpoints: &[u32], nr_nodes: usize) -> Self {
        Self::build_filtered(endpoints, nr_nodes, |_| true)
    }

    /// Build from an element→node relation, keeping only elements for which
    /// `include(element)` holds
    pub fn build_filtered(
        endpoints: &[u32],
        nr_nodes: usize,
        include: impl Fn(usize) -> bool,
    ) -> Self {
        let mut first = vec![NONE; nr_nodes];
        let mut next = vec![NONE; endpoints.len()];

        for (element, &node) in endpoints.iter().enumerate() {
            let n = node as usize;
            if n >= nr_nodes || !include(element) {
                continue;
            }
            next[element] = first[n];
            first[n] = element as u32;
        }

        Self { first, next }
    }

    /// Relate every element to node 0 (one implicit zone owning everything)
    pub fn all_to_one(nr_elements: usize) -> Self {
        let mut next = vec![NONE; nr_elements];
        for element in 1..nr_elements {
            next[element] = (element - 1) as u32;
        }
        let first = vec![if nr_elements == 0 {
            NONE
        } else {
            (nr_elements - 1) as u32
        }];
        Self { first, next }
    }

    /// Relate element `i` to node `i`
    pub fn identity(n: usize) -> Self {
        Self {
            first: (0..n as u32).collect(),
            next: vec![NONE; n],
        }
    }

    /// First element incident to `node`, `None` when there is none or the node
    /// is out of range
    #[inline]
    pub fn first(&self, node: u32) -> Option<u32> {
        self.first.get(node as usize).copied().and_then(defined)
    }

    /// Element following `element` in its node's chain
    #[inline]
    pub fn next(&self, element: u32) -> Option<u32> {
        self.next.get(element as usize).copied().and_then(defined)
    }

    /// Iterate all elements incident to `node`
    #[inline]
    pub fn iter(&self, node: u32) -> Incident<'_> {
        Incident {
            adj: self,
            current: self.first(node),
        }
    }

    pub fn nr_nodes(&self) -> usize {
        self.first.len()
    }

    pub fn nr_elements(&self) -> usize {
        self.next.len()
    }
}

/// Iterator over the elements incident to one node
pub struct Incident<'a> {
    adj: &'a InvertedAdjacency,
    current: Option<u32>,
}

impl Iterator for Incident<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        let element = self.current?;
        self.current = self.adj.next(element);
        Some(element)
    }
}
