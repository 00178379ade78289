//! odflow - origin-destination impedance matrices and trip distribution
//!
//! Computes least-impedance paths from origin zones to destination zones over
//! a directed network, one bounded Dijkstra per origin zone on a worker pool,
//! and derives OD matrices, shortest-path trees and link sets, and
//! gravity-model trip distribution outputs (demand, supply, link flow).

pub mod config;
pub mod distribution;
pub mod graph;
pub mod matrix;
pub mod options;
pub mod output;
pub mod problem;
pub mod schedule;
pub mod search;

pub use config::SchedulerConfig;
pub use graph::{InvertedAdjacency, PreparedNetwork};
pub use matrix::{compute, compute_into, plan, ResultPlan};
pub use odflow_common::{Error, Result};
pub use options::{DecayFunction, Outputs, ResultLayout, SearchOptions};
pub use output::{OdResult, OutputBuffers};
pub use problem::{InteractionModel, Limits, MassLimit, Network, Problem, ZoneSide, ZoneValues};
pub use schedule::ParallelOriginScheduler;

/// Re-exported so callers can build tokens without naming tokio-util
pub use tokio_util::sync::CancellationToken;
