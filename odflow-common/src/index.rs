//! Index conventions shared by every odflow component
//!
//! Nodes, edges, points and zones are dense `u32` indices. Hot arrays store the
//! raw index with [`NONE`] as the "no element" marker; public accessors convert
//! to `Option`.

/// Dense node index
pub type NodeId = u32;
/// Dense edge (link) index
pub type EdgeId = u32;
/// Dense zone or point index
pub type ZoneId = u32;

/// Marker for "no element" in index arrays
pub const NONE: u32 = u32::MAX;

/// Convert a raw index-array cell to an `Option`
#[inline]
pub fn defined(raw: u32) -> Option<u32> {
    if raw == NONE {
        None
    } else {
        Some(raw)
    }
}
