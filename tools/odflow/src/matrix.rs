//! OD matrix driver
//!
//! `compute` = validate → prepare → plan rows → allocate → fill.
//!
//! Dense results give every origin one row per destination zone. Sparse
//! results only hold reached pairs, so an extra counting pass runs the same
//! searches without outputs first and prefix-sums the per-origin counts into
//! row offsets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use odflow_common::{Error, Result};

use crate::config::SchedulerConfig;
use crate::graph::PreparedNetwork;
use crate::options::{ResultLayout, SearchOptions};
use crate::output::{OdResult, OutputBuffers, OutputShape, SharedAccumulators};
use crate::problem::Problem;
use crate::schedule::ParallelOriginScheduler;
use crate::search::OriginSearch;

/// Row layout of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPlan {
    pub layout: ResultLayout,
    /// `row_offsets[i]..row_offsets[i + 1]` are the rows of origin zone `i`
    pub row_offsets: Vec<usize>,
}

impl ResultPlan {
    pub fn rows(&self) -> usize {
        self.row_offsets.last().copied().unwrap_or(0)
    }

    pub fn shape(&self, net: &PreparedNetwork<'_>) -> OutputShape {
        OutputShape {
            rows: self.rows(),
            nodes: net.nr_nodes(),
            edges: net.nr_edges(),
            org_zones: net.nr_org_zones(),
            dst_zones: net.nr_dst_zones(),
        }
    }
}

/// Compute everything `options` asks for
///
/// Returns `Ok(None)` when `cancel` fires; no partial result is returned.
pub fn compute(
    problem: &Problem,
    options: &SearchOptions,
    config: &SchedulerConfig,
    cancel: &CancellationToken,
) -> Result<Option<OdResult>> {
    let started = Instant::now();
    let net = PreparedNetwork::new(problem, options)?;
    let scheduler = ParallelOriginScheduler::new(config)?;

    tracing::info!(
        org_zones = net.nr_org_zones(),
        dst_zones = net.nr_dst_zones(),
        nodes = net.nr_nodes(),
        edges = net.nr_edges(),
        workers = scheduler.worker_threads(),
        max_in_flight = scheduler.max_in_flight(),
        "computing OD matrix"
    );

    let Some(plan) = plan(&net, options, problem.limits.bounded(), &scheduler, cancel) else {
        return Ok(None);
    };
    let mut buffers = OutputBuffers::allocate(&options.produce, plan.shape(&net));
    let Some(result_count) = compute_into(&net, options, &scheduler, cancel, &plan, &mut buffers)? else {
        return Ok(None);
    };
    debug_assert_eq!(result_count, plan.rows());

    tracing::info!(
        layout = ?plan.layout,
        result_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "OD matrix computed"
    );

    Ok(Some(OdResult {
        layout: plan.layout,
        org_zones: net.nr_org_zones(),
        dst_zones: net.nr_dst_zones(),
        result_count,
        row_offsets: plan.row_offsets,
        buffers,
    }))
}

/// Choose the layout and the row offsets, running the counting pass for
/// sparse results; `None` on cancellation
pub fn plan(
    net: &PreparedNetwork<'_>,
    options: &SearchOptions,
    bounded: bool,
    scheduler: &ParallelOriginScheduler,
    cancel: &CancellationToken,
) -> Option<ResultPlan> {
    let layout = options.resolve_layout(bounded);
    let nr_org = net.nr_org_zones();
    let nr_dst = net.nr_dst_zones();

    let row_offsets = match layout {
        ResultLayout::Dense => (0..=nr_org).map(|i| i * nr_dst).collect(),
        ResultLayout::Sparse => {
            let counting_start = Instant::now();
            let search = OriginSearch::new(net, options, ResultLayout::Sparse, true);
            let counts: Vec<AtomicUsize> = (0..nr_org).map(|_| AtomicUsize::new(0)).collect();
            let shared = SharedAccumulators::none();

            let total = scheduler.run(nr_org, cancel, || search.make_scratch(), |org, s| {
                let n = search.run(org, s, None, &shared).result_count;
                counts[org].store(n, Ordering::Relaxed);
                n
            })?;

            let mut offsets = Vec::with_capacity(nr_org + 1);
            offsets.push(0);
            let mut acc = 0usize;
            for c in &counts {
                acc += c.load(Ordering::Relaxed);
                offsets.push(acc);
            }
            debug_assert_eq!(acc, total);
            tracing::debug!(
                rows = total,
                elapsed_ms = counting_start.elapsed().as_millis() as u64,
                "counting pass"
            );
            offsets
        }
    };

    Some(ResultPlan { layout, row_offsets })
}

/// Fill caller-owned `buffers` laid out by `plan`
///
/// Returns the number of rows written, or `Ok(None)` on cancellation. When
/// cancelled before any origin starts the buffers are left untouched;
/// otherwise their content is undefined.
pub fn compute_into(
    net: &PreparedNetwork<'_>,
    options: &SearchOptions,
    scheduler: &ParallelOriginScheduler,
    cancel: &CancellationToken,
    plan: &ResultPlan,
    buffers: &mut OutputBuffers,
) -> Result<Option<usize>> {
    check_buffers(buffers, &plan.shape(net))?;
    if plan.row_offsets.len() != net.nr_org_zones() + 1 {
        return Err(Error::LengthMismatch {
            role: "row_offsets",
            expected: net.nr_org_zones() + 1,
            actual: plan.row_offsets.len(),
        });
    }
    if options.produce.traceback && net.nr_org_zones() != 1 {
        return Err(Error::options("node traceback needs exactly one origin zone"));
    }
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let nr_org = net.nr_org_zones();
    let (rows, shared) = buffers.split(&plan.row_offsets);
    let search = OriginSearch::new(net, options, plan.layout, false);

    let total = scheduler.run(nr_org, cancel, || search.make_scratch(), |org, s| {
        let rows = rows[org].lock().take();
        let summary = search.run(org, s, rows, &shared);
        summary.result_count
    });
    Ok(total)
}

fn check_buffers(buffers: &OutputBuffers, shape: &OutputShape) -> Result<()> {
    fn check<T>(role: &'static str, col: &Option<Vec<T>>, expected: usize) -> Result<()> {
        match col {
            Some(v) if v.len() != expected => Err(Error::LengthMismatch {
                role,
                expected,
                actual: v.len(),
            }),
            _ => Ok(()),
        }
    }

    check("impedance", &buffers.impedance, shape.rows)?;
    check("alt_impedance", &buffers.alt_impedance, shape.rows)?;
    check("link_attribute_sum", &buffers.link_attribute_sum, shape.rows)?;
    check("org_zone", &buffers.org_zone, shape.rows)?;
    check("dst_zone", &buffers.dst_zone, shape.rows)?;
    check("start_point", &buffers.start_point, shape.rows)?;
    check("end_point", &buffers.end_point, shape.rows)?;
    check("link_set", &buffers.link_set, shape.rows)?;
    check("traceback", &buffers.traceback, shape.nodes)?;
    check("org_factor", &buffers.org_factor, shape.org_zones)?;
    check("org_demand", &buffers.org_demand, shape.org_zones)?;
    check("org_max_impedance", &buffers.org_max_impedance, shape.org_zones)?;
    check("dst_factor", &buffers.dst_factor, shape.dst_zones)?;
    check("dst_supply", &buffers.dst_supply, shape.dst_zones)?;
    check("link_flow", &buffers.link_flow, shape.edges)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Outputs;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            worker_threads: 2,
            max_in_flight: 2,
            progress_interval_secs: 5,
        }
    }

    fn grid_problem() -> Problem {
        // 0 -> 1 -> 2, each origin its own zone
        serde_json::from_str(
            r#"{
                "network": {
                    "nr_nodes": 3,
                    "edge_from": [0, 1],
                    "edge_to":   [1, 2],
                    "impedance": [1, 2]
                },
                "origins": { "nodes": [0, 1, 2] }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_dense_rows() {
        let problem = grid_problem();
        let mut options = SearchOptions::default();
        options.produce.dst_zone = true;
        let result = compute(&problem, &options, &config(), &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(result.layout, ResultLayout::Dense);
        assert_eq!(result.result_count, 9);
        assert_eq!(
            result.buffers.impedance.unwrap(),
            vec![Some(0.0), Some(1.0), Some(3.0), None, Some(0.0), Some(2.0), None, None, Some(0.0)]
        );
        assert_eq!(result.buffers.dst_zone.unwrap(), vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_sparse_rows_counted() {
        let mut problem = grid_problem();
        problem.limits.max_impedance = Some(crate::problem::ZoneValues::Uniform(2.5));
        let mut options = SearchOptions::default();
        options.produce.org_zone = true;
        let result = compute(&problem, &options, &config(), &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(result.layout, ResultLayout::Sparse);
        assert_eq!(result.row_offsets, vec![0, 2, 4, 5]);
        assert_eq!(result.buffers.org_zone.unwrap(), vec![0, 0, 1, 1, 2]);
        assert_eq!(
            result.buffers.impedance.unwrap(),
            vec![Some(0.0), Some(1.0), Some(0.0), Some(2.0), Some(0.0)]
        );
    }

    #[test]
    fn test_buffer_shape_checked() {
        let problem = grid_problem();
        let options = SearchOptions::default();
        let net = PreparedNetwork::new(&problem, &options).unwrap();
        let scheduler = ParallelOriginScheduler::new(&config()).unwrap();
        let cancel = CancellationToken::new();
        let plan = plan(&net, &options, false, &scheduler, &cancel).unwrap();

        let mut buffers = OutputBuffers::allocate(&Outputs::default(), plan.shape(&net));
        buffers.impedance = Some(vec![None; 2]);
        assert!(matches!(
            compute_into(&net, &options, &scheduler, &cancel, &plan, &mut buffers),
            Err(Error::LengthMismatch { role: "impedance", .. })
        ));
    }
}
