//! Single-origin search
//!
//! A bounded Dijkstra over the prepared network. [`heap`] holds the frontier,
//! [`accumulator`] records reached destinations, [`tree`] rebuilds the
//! shortest-path forest and [`origin`] runs one origin end to end.

pub mod accumulator;
pub mod heap;
pub mod origin;
pub mod tree;

pub use accumulator::{DestinationView, ResultAccumulator};
pub use heap::{BoundedSearchHeap, HeapStats};
pub use origin::{OriginScratch, OriginSearch, OriginSummary};
pub use tree::ShortestPathTree;
