//! Search options and their legality checklist
//!
//! Every behaviour switch is a named field. [`SearchOptions::check_legality`]
//! validates the combination once, against the inputs actually supplied,
//! before any search starts.

use serde::{Deserialize, Serialize};

use odflow_common::{Error, Result};

use crate::problem::Problem;

/// Representation of the OD result rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultLayout {
    /// One row per (origin, destination zone); unreached pairs stay undefined
    Dense,
    /// One row per reached (origin, destination zone) pair
    Sparse,
}

/// Potential as a function of impedance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayFunction {
    /// t = d^-beta
    Power { beta: f64 },
    /// t = 1 / (1 + exp(alpha + beta ln d + gamma d))
    Logit { alpha: f64, beta: f64, gamma: f64 },
}

/// Which result columns to produce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outputs {
    pub impedance: bool,
    pub alt_impedance: bool,
    pub link_attribute_sum: bool,
    pub org_zone: bool,
    pub dst_zone: bool,
    pub start_point: bool,
    pub end_point: bool,
    pub link_set: bool,
    pub traceback: bool,
    pub org_factor: bool,
    pub org_demand: bool,
    pub org_max_impedance: bool,
    pub dst_factor: bool,
    pub dst_supply: bool,
    pub link_flow: bool,
}

impl Outputs {
    /// Outputs computed by the trip distribution
    pub fn needs_interaction(&self) -> bool {
        self.org_factor || self.org_demand || self.dst_factor || self.dst_supply || self.link_flow
    }

    /// Outputs that need the per-destination potentials of an origin
    pub fn needs_potentials(&self) -> bool {
        self.dst_factor || self.dst_supply || self.link_flow
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Traverse every edge in both directions
    pub bidirectional: bool,
    /// One search per origin zone, rows per (origin, destination) pair.
    /// When false a single search runs from all start points together.
    pub od_matrix: bool,
    /// Force a result layout; chosen from the limits when absent
    pub result_layout: Option<ResultLayout>,
    /// Trace every settled node and commit
    pub verbose_logging: bool,
    pub produce: Outputs,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            bidirectional: false,
            od_matrix: true,
            result_layout: None,
            verbose_logging: false,
            produce: Outputs {
                impedance: true,
                ..Outputs::default()
            },
        }
    }
}

impl SearchOptions {
    /// Check the option combination against the supplied inputs
    pub fn check_legality(&self, problem: &Problem) -> Result<()> {
        let produce = &self.produce;

        if self.od_matrix && produce.traceback {
            return Err(Error::options(
                "node traceback and OD matrix output are mutually exclusive",
            ));
        }
        if !self.od_matrix {
            if problem.origins.nodes.is_none() {
                return Err(Error::missing(
                    "origins.nodes",
                    "no OD matrix is produced",
                ));
            }
            if problem.origins.zones.is_some() {
                return Err(Error::options(
                    "an origin zone relation requires OD matrix mode",
                ));
            }
            if problem.origins.nr_zones.is_some_and(|n| n != 1) {
                return Err(Error::options(
                    "without OD matrix mode there is exactly one origin zone",
                ));
            }
        }
        if self.bidirectional && problem.network.bidirectional.is_some() {
            return Err(Error::options(
                "global bidirectional traversal excludes per-edge bidirectional flags",
            ));
        }
        if produce.alt_impedance && problem.network.alt_impedance.is_none() {
            return Err(Error::missing(
                "network.alt_impedance",
                "alternative impedance output is requested",
            ));
        }
        if produce.link_attribute_sum && problem.network.link_attribute.is_none() {
            return Err(Error::missing(
                "network.link_attribute",
                "link attribute sums are requested",
            ));
        }
        if produce.needs_interaction() && problem.interaction.is_none() {
            return Err(Error::missing(
                "interaction",
                "trip distribution outputs are requested",
            ));
        }
        if problem.limits.euclid_max_distance.is_some() {
            if problem.origins.zone_locations.is_none() {
                return Err(Error::missing(
                    "origins.zone_locations",
                    "the Euclidean filter is used",
                ));
            }
            if problem.destinations.zone_locations.is_none() {
                return Err(Error::missing(
                    "destinations.zone_locations",
                    "the Euclidean filter is used",
                ));
            }
        }
        if self.result_layout == Some(ResultLayout::Sparse) && !problem.limits.bounded() {
            return Err(Error::options(
                "a sparse result requires a cutoff or a mass limit",
            ));
        }
        Ok(())
    }

    /// Layout used for a call with the given limits
    pub fn resolve_layout(&self, bounded: bool) -> ResultLayout {
        match self.result_layout {
            Some(layout) => layout,
            None if self.od_matrix && bounded => ResultLayout::Sparse,
            None => ResultLayout::Dense,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Limits, Network, ZoneSide, ZoneValues};

    fn problem(options: SearchOptions) -> Problem {
        Problem {
            network: Network {
                nr_nodes: 2,
                edge_from: vec![0],
                edge_to: vec![1],
                impedance: vec![1.0],
                ..Network::default()
            },
            origins: ZoneSide {
                nodes: Some(vec![0]),
                ..ZoneSide::default()
            },
            destinations: ZoneSide::default(),
            limits: Limits::default(),
            interaction: None,
            options,
        }
    }

    fn check(p: &Problem) -> Result<()> {
        p.options.check_legality(p)
    }

    #[test]
    fn test_defaults_are_legal() {
        assert!(check(&problem(SearchOptions::default())).is_ok());
    }

    #[test]
    fn test_traceback_excludes_od() {
        let mut options = SearchOptions::default();
        options.produce.traceback = true;
        let err = check(&problem(options.clone())).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));

        options.od_matrix = false;
        assert!(check(&problem(options)).is_ok());
    }

    #[test]
    fn test_single_origin_mode_needs_start_nodes() {
        let options = SearchOptions {
            od_matrix: false,
            ..SearchOptions::default()
        };
        let mut p = problem(options);
        p.origins.nodes = None;
        assert!(matches!(check(&p), Err(Error::MissingInput { .. })));

        p.origins.nodes = Some(vec![0]);
        p.origins.zones = Some(vec![0]);
        assert!(matches!(check(&p), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_bidirectional_conflict() {
        let options = SearchOptions {
            bidirectional: true,
            ..SearchOptions::default()
        };
        let mut p = problem(options);
        p.network.bidirectional = Some(vec![true]);
        assert!(check(&p).is_err());
    }

    #[test]
    fn test_interaction_outputs_need_model() {
        let mut options = SearchOptions::default();
        options.produce.dst_supply = true;
        assert!(matches!(
            check(&problem(options)),
            Err(Error::MissingInput { role: "interaction", .. })
        ));
    }

    #[test]
    fn test_sparse_needs_bound() {
        let options = SearchOptions {
            result_layout: Some(ResultLayout::Sparse),
            ..SearchOptions::default()
        };
        let mut p = problem(options);
        assert!(check(&p).is_err());
        p.limits.max_impedance = Some(ZoneValues::Uniform(5.0));
        assert!(check(&p).is_ok());
    }

    #[test]
    fn test_euclid_needs_both_locations() {
        let mut p = problem(SearchOptions::default());
        p.limits.euclid_max_distance = Some(1.0);
        p.origins.zone_locations = Some(vec![[0.0, 0.0]]);
        assert!(check(&p).is_err());
        p.destinations.zone_locations = Some(vec![[0.0, 0.0], [1.0, 1.0]]);
        assert!(check(&p).is_ok());
    }

    #[test]
    fn test_resolve_layout() {
        let options = SearchOptions::default();
        assert_eq!(options.resolve_layout(false), ResultLayout::Dense);
        assert_eq!(options.resolve_layout(true), ResultLayout::Sparse);

        let single = SearchOptions {
            od_matrix: false,
            ..SearchOptions::default()
        };
        assert_eq!(single.resolve_layout(true), ResultLayout::Dense);
    }
}
