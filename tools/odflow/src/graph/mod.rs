//! Network representation

pub mod inverted;
pub mod prepared;

pub use inverted::{Incident, InvertedAdjacency};
pub use prepared::{PointSet, PreparedNetwork};
