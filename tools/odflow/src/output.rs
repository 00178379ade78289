//! Caller-owned result buffers
//!
//! Row columns are laid out origin by origin: the rows of origin `i` occupy
//! `row_offsets[i]..row_offsets[i + 1]`. Before scheduling, every buffer is
//! split into disjoint per-origin slices ([`OriginRows`]) so units write their
//! own rows without locking. Per-destination and per-edge accumulators are
//! shared by all units and sit behind one lock per buffer
//! ([`SharedAccumulators`]).

use parking_lot::Mutex;
use serde::Serialize;

use odflow_common::{EdgeId, ZoneId, NONE};

use crate::options::{Outputs, ResultLayout};

/// Every output column a call can produce; unrequested columns are `None`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputBuffers {
    // per OD row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impedance: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_impedance: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_attribute_sum: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_zone: Option<Vec<ZoneId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_zone: Option<Vec<ZoneId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_point: Option<Vec<Option<u32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_point: Option<Vec<Option<u32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_set: Option<Vec<Vec<EdgeId>>>,

    // per node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<Vec<Option<EdgeId>>>,

    // per origin zone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_factor: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_demand: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_max_impedance: Option<Vec<f64>>,

    // per destination zone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_factor: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_supply: Option<Vec<f64>>,

    // per edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_flow: Option<Vec<f64>>,
}

/// Sizes of the output domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    pub rows: usize,
    pub nodes: usize,
    pub edges: usize,
    pub org_zones: usize,
    pub dst_zones: usize,
}

impl OutputBuffers {
    /// Allocate the requested columns with every cell undefined or zero
    pub fn allocate(produce: &Outputs, shape: OutputShape) -> Self {
        fn col<T: Clone>(on: bool, len: usize, init: T) -> Option<Vec<T>> {
            on.then(|| vec![init; len])
        }

        Self {
            impedance: col(produce.impedance, shape.rows, None),
            alt_impedance: col(produce.alt_impedance, shape.rows, None),
            link_attribute_sum: col(produce.link_attribute_sum, shape.rows, None),
            org_zone: col(produce.org_zone, shape.rows, NONE),
            dst_zone: col(produce.dst_zone, shape.rows, NONE),
            start_point: col(produce.start_point, shape.rows, None),
            end_point: col(produce.end_point, shape.rows, None),
            link_set: col(produce.link_set, shape.rows, Vec::new()),
            traceback: col(produce.traceback, shape.nodes, None),
            org_factor: col(produce.org_factor, shape.org_zones, 0.0),
            org_demand: col(produce.org_demand, shape.org_zones, 0.0),
            org_max_impedance: col(produce.org_max_impedance, shape.org_zones, 0.0),
            dst_factor: col(produce.dst_factor, shape.dst_zones, 0.0),
            dst_supply: col(produce.dst_supply, shape.dst_zones, 0.0),
            link_flow: col(produce.link_flow, shape.edges, 0.0),
        }
    }

    /// Split into per-origin row slices and locked shared accumulators
    ///
    /// The per-node traceback goes to origin 0; it is only produced when a
    /// single search runs.
    pub fn split<'a>(
        &'a mut self,
        row_offsets: &[usize],
    ) -> (Vec<Mutex<Option<OriginRows<'a>>>>, SharedAccumulators<'a>) {
        let nr_origins = row_offsets.len().saturating_sub(1);

        let mut impedance = split_rows(self.impedance.as_mut(), row_offsets).into_iter();
        let mut alt_impedance = split_rows(self.alt_impedance.as_mut(), row_offsets).into_iter();
        let mut link_attribute_sum =
            split_rows(self.link_attribute_sum.as_mut(), row_offsets).into_iter();
        let mut org_zone = split_rows(self.org_zone.as_mut(), row_offsets).into_iter();
        let mut dst_zone = split_rows(self.dst_zone.as_mut(), row_offsets).into_iter();
        let mut start_point = split_rows(self.start_point.as_mut(), row_offsets).into_iter();
        let mut end_point = split_rows(self.end_point.as_mut(), row_offsets).into_iter();
        let mut link_set = split_rows(self.link_set.as_mut(), row_offsets).into_iter();
        let mut org_factor = split_cells(self.org_factor.as_mut(), nr_origins).into_iter();
        let mut org_demand = split_cells(self.org_demand.as_mut(), nr_origins).into_iter();
        let mut org_max_impedance =
            split_cells(self.org_max_impedance.as_mut(), nr_origins).into_iter();
        let mut traceback = self.traceback.as_deref_mut();

        let rows = (0..nr_origins)
            .map(|origin| {
                Mutex::new(Some(OriginRows {
                    len: row_offsets[origin + 1] - row_offsets[origin],
                    impedance: impedance.next().flatten(),
                    alt_impedance: alt_impedance.next().flatten(),
                    link_attribute_sum: link_attribute_sum.next().flatten(),
                    org_zone: org_zone.next().flatten(),
                    dst_zone: dst_zone.next().flatten(),
                    start_point: start_point.next().flatten(),
                    end_point: end_point.next().flatten(),
                    link_set: link_set.next().flatten(),
                    traceback: traceback.take(),
                    org_factor: org_factor.next().flatten(),
                    org_demand: org_demand.next().flatten(),
                    org_max_impedance: org_max_impedance.next().flatten(),
                }))
            })
            .collect();

        let shared = SharedAccumulators {
            dst_factor: self.dst_factor.as_deref_mut().map(Mutex::new),
            dst_supply: self.dst_supply.as_deref_mut().map(Mutex::new),
            link_flow: self.link_flow.as_deref_mut().map(Mutex::new),
        };
        (rows, shared)
    }
}

fn split_rows<'a, T>(buf: Option<&'a mut Vec<T>>, row_offsets: &[usize]) -> Vec<Option<&'a mut [T]>> {
    let nr_origins = row_offsets.len().saturating_sub(1);
    let Some(buf) = buf else {
        return (0..nr_origins).map(|_| None).collect();
    };
    let mut rest: &'a mut [T] = buf.as_mut_slice();
    let mut out = Vec::with_capacity(nr_origins);
    for origin in 0..nr_origins {
        let len = row_offsets[origin + 1] - row_offsets[origin];
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
        out.push(Some(head));
        rest = tail;
    }
    out
}

fn split_cells<T>(buf: Option<&mut Vec<T>>, nr_origins: usize) -> Vec<Option<&mut T>> {
    match buf {
        Some(buf) => buf.iter_mut().map(Some).collect(),
        None => (0..nr_origins).map(|_| None).collect(),
    }
}

/// The output cells owned by one origin
pub struct OriginRows<'a> {
    pub len: usize,
    pub impedance: Option<&'a mut [Option<f64>]>,
    pub alt_impedance: Option<&'a mut [Option<f64>]>,
    pub link_attribute_sum: Option<&'a mut [Option<f64>]>,
    pub org_zone: Option<&'a mut [ZoneId]>,
    pub dst_zone: Option<&'a mut [ZoneId]>,
    pub start_point: Option<&'a mut [Option<u32>]>,
    pub end_point: Option<&'a mut [Option<u32>]>,
    pub link_set: Option<&'a mut [Vec<EdgeId>]>,
    pub traceback: Option<&'a mut [Option<EdgeId>]>,
    pub org_factor: Option<&'a mut f64>,
    pub org_demand: Option<&'a mut f64>,
    pub org_max_impedance: Option<&'a mut f64>,
}

/// Accumulators written by every origin
pub struct SharedAccumulators<'a> {
    dst_factor: Option<Mutex<&'a mut [f64]>>,
    dst_supply: Option<Mutex<&'a mut [f64]>>,
    link_flow: Option<Mutex<&'a mut [f64]>>,
}

impl SharedAccumulators<'_> {
    /// Nothing shared is produced
    pub fn none() -> Self {
        Self {
            dst_factor: None,
            dst_supply: None,
            link_flow: None,
        }
    }

    pub fn wants_destinations(&self) -> bool {
        self.dst_factor.is_some() || self.dst_supply.is_some()
    }

    pub fn wants_link_flow(&self) -> bool {
        self.link_flow.is_some()
    }

    /// C_j += factor, S_j += supply
    #[inline]
    pub fn add_destination(&self, zone: ZoneId, factor: f64, supply: f64) {
        if let Some(buf) = &self.dst_factor {
            buf.lock()[zone as usize] += factor;
        }
        if let Some(buf) = &self.dst_supply {
            buf.lock()[zone as usize] += supply;
        }
    }

    #[inline]
    pub fn add_link_flow(&self, edge: EdgeId, flow: f64) {
        if let Some(buf) = &self.link_flow {
            buf.lock()[edge as usize] += flow;
        }
    }
}

/// Result of one call
#[derive(Debug, Clone, Serialize)]
pub struct OdResult {
    pub layout: ResultLayout,
    pub org_zones: usize,
    pub dst_zones: usize,
    /// Number of OD rows
    pub result_count: usize,
    /// `row_offsets[i]..row_offsets[i + 1]` are the rows of origin zone `i`
    pub row_offsets: Vec<usize>,
    #[serde(flatten)]
    pub buffers: OutputBuffers,
}

impl OdResult {
    /// Origin zone of every row, derived from the row offsets
    pub fn row_origins(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.row_offsets
            .windows(2)
            .enumerate()
            .flat_map(|(origin, w)| std::iter::repeat(origin as ZoneId).take(w[1] - w[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(rows: usize) -> OutputShape {
        OutputShape {
            rows,
            nodes: 3,
            edges: 2,
            org_zones: 2,
            dst_zones: 2,
        }
    }

    #[test]
    fn test_allocate_only_requested() {
        let produce = Outputs {
            impedance: true,
            link_flow: true,
            ..Outputs::default()
        };
        let buffers = OutputBuffers::allocate(&produce, shape(4));
        assert_eq!(buffers.impedance.as_ref().map(Vec::len), Some(4));
        assert_eq!(buffers.link_flow.as_ref().map(Vec::len), Some(2));
        assert!(buffers.dst_zone.is_none());
        assert!(buffers.traceback.is_none());
    }

    #[test]
    fn test_split_rows_are_disjoint() {
        let produce = Outputs {
            impedance: true,
            org_factor: true,
            traceback: true,
            ..Outputs::default()
        };
        let mut buffers = OutputBuffers::allocate(&produce, shape(5));
        {
            let (rows, _) = buffers.split(&[0, 2, 5]);
            assert_eq!(rows.len(), 2);
            for (origin, slot) in rows.iter().enumerate() {
                let mut r = slot.lock().take().unwrap();
                assert_eq!(r.len, if origin == 0 { 2 } else { 3 });
                assert_eq!(r.traceback.is_some(), origin == 0);
                for cell in r.impedance.as_deref_mut().unwrap() {
                    *cell = Some(origin as f64);
                }
                **r.org_factor.as_mut().unwrap() = 10.0 + origin as f64;
            }
        }
        assert_eq!(
            buffers.impedance.unwrap(),
            vec![Some(0.0), Some(0.0), Some(1.0), Some(1.0), Some(1.0)]
        );
        assert_eq!(buffers.org_factor.unwrap(), vec![10.0, 11.0]);
    }

    #[test]
    fn test_shared_accumulators() {
        let produce = Outputs {
            dst_supply: true,
            link_flow: true,
            ..Outputs::default()
        };
        let mut buffers = OutputBuffers::allocate(&produce, shape(0));
        {
            let (_, shared) = buffers.split(&[0, 0, 0]);
            assert!(shared.wants_destinations());
            shared.add_destination(1, 5.0, 2.0);
            shared.add_destination(1, 1.0, 0.5);
            shared.add_link_flow(0, 3.0);
        }
        assert_eq!(buffers.dst_supply.unwrap(), vec![0.0, 2.5]);
        assert!(buffers.dst_factor.is_none());
        assert_eq!(buffers.link_flow.unwrap(), vec![3.0, 0.0]);
    }

    #[test]
    fn test_row_origins() {
        let result = OdResult {
            layout: ResultLayout::Sparse,
            org_zones: 3,
            dst_zones: 2,
            result_count: 3,
            row_offsets: vec![0, 2, 2, 3],
            buffers: OutputBuffers::default(),
        };
        assert_eq!(result.row_origins().collect::<Vec<_>>(), vec![0, 0, 2]);
    }
}
