//! Shortest-path forest of one origin
//!
//! Index-based parent / first-child / next-sibling links over a flat array
//! with one slot per network node. Slots are overwritten when a node is
//! finalized, never freed, so the array is reused across origins: only nodes
//! linked in since the last [`ShortestPathTree::reset`] are reachable from the
//! roots.

use odflow_common::{defined, EdgeId, NodeId, NONE};

#[derive(Clone, Copy, Debug)]
struct TreeNode {
    parent: NodeId,
    first_child: NodeId,
    next_sibling: NodeId,
    back_edge: EdgeId,
}

const DETACHED: TreeNode = TreeNode {
    parent: NONE,
    first_child: NONE,
    next_sibling: NONE,
    back_edge: NONE,
};

pub struct ShortestPathTree {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
}

impl ShortestPathTree {
    pub fn new(nr_nodes: usize) -> Self {
        Self {
            nodes: vec![DETACHED; nr_nodes],
            roots: Vec::new(),
        }
    }

    /// Forget the roots of the previous origin
    pub fn reset(&mut self) {
        self.roots.clear();
    }

    /// Make `node` a root of the current origin's forest
    pub fn init_root(&mut self, node: NodeId) {
        self.nodes[node as usize] = DETACHED;
        self.roots.push(node);
    }

    /// Attach `child` under `parent`, reached over `back_edge`
    ///
    /// The child becomes the parent's first child.
    pub fn init_child(&mut self, parent: NodeId, child: NodeId, back_edge: EdgeId) {
        debug_assert_ne!(parent, child);
        let p = &mut self.nodes[parent as usize];
        let next_sibling = p.first_child;
        p.first_child = child;
        self.nodes[child as usize] = TreeNode {
            parent,
            first_child: NONE,
            next_sibling,
            back_edge,
        };
    }

    #[inline]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        defined(self.nodes[node as usize].parent)
    }

    #[inline]
    pub fn back_edge(&self, node: NodeId) -> Option<EdgeId> {
        defined(self.nodes[node as usize].back_edge)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[inline]
    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        defined(self.nodes[node as usize].first_child)
    }

    #[inline]
    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        defined(self.nodes[node as usize].next_sibling)
    }

    #[inline]
    fn most_down(&self, mut node: NodeId) -> NodeId {
        while let Some(child) = self.first_child(node) {
            node = child;
        }
        node
    }

    /// Every node of the forest, parents before their children
    pub fn walk_top_down(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().flat_map(move |&root| TopDown {
            tree: self,
            root,
            next: Some(root),
        })
    }

    /// Every node of the forest, children before their parents
    pub fn walk_bottom_up(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().flat_map(move |&root| BottomUp {
            tree: self,
            root,
            next: Some(self.most_down(root)),
        })
    }
}

/// Pre-order walk of one tree
struct TopDown<'a> {
    tree: &'a ShortestPathTree,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for TopDown<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.next?;
        self.next = match self.tree.first_child(node) {
            Some(child) => Some(child),
            None => {
                let mut n = node;
                loop {
                    if n == self.root {
                        break None;
                    }
                    if let Some(sibling) = self.tree.next_sibling(n) {
                        break Some(sibling);
                    }
                    match self.tree.parent(n) {
                        Some(p) => n = p,
                        None => break None,
                    }
                }
            }
        };
        Some(node)
    }
}

/// Post-order walk of one tree
struct BottomUp<'a> {
    tree: &'a ShortestPathTree,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for BottomUp<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.next?;
        self.next = if node == self.root {
            None
        } else if let Some(sibling) = self.tree.next_sibling(node) {
            Some(self.tree.most_down(sibling))
        } else {
            self.tree.parent(node)
        };
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //      0           5
    //    /   \
    //   1     2
    //  / \
    // 3   4
    fn sample() -> ShortestPathTree {
        let mut tree = ShortestPathTree::new(6);
        tree.reset();
        tree.init_root(0);
        tree.init_root(5);
        tree.init_child(0, 1, 10);
        tree.init_child(0, 2, 11);
        tree.init_child(1, 3, 12);
        tree.init_child(1, 4, 13);
        tree
    }

    fn position(order: &[NodeId], node: NodeId) -> usize {
        order.iter().position(|&n| n == node).unwrap()
    }

    #[test]
    fn test_top_down_visits_parents_first() {
        let tree = sample();
        let order: Vec<_> = tree.walk_top_down().collect();
        assert_eq!(order.len(), 6);
        for node in 1..5 {
            let parent = tree.parent(node).unwrap();
            assert!(position(&order, parent) < position(&order, node));
        }
    }

    #[test]
    fn test_bottom_up_visits_children_first() {
        let tree = sample();
        let order: Vec<_> = tree.walk_bottom_up().collect();
        assert_eq!(order.len(), 6);
        for node in 1..5 {
            let parent = tree.parent(node).unwrap();
            assert!(position(&order, node) < position(&order, parent));
        }
        assert_eq!(order.last(), Some(&5));
    }

    #[test]
    fn test_reroot_drops_previous_forest() {
        let mut tree = sample();
        tree.reset();
        tree.init_root(1);
        tree.init_child(1, 0, 20);
        assert_eq!(tree.walk_top_down().collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(tree.walk_bottom_up().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(tree.back_edge(0), Some(20));
        assert_eq!(tree.back_edge(1), None);
    }

    #[test]
    fn test_single_root() {
        let mut tree = ShortestPathTree::new(1);
        tree.reset();
        tree.init_root(0);
        assert_eq!(tree.walk_top_down().collect::<Vec<_>>(), vec![0]);
        assert_eq!(tree.walk_bottom_up().collect::<Vec<_>>(), vec![0]);
    }
}
