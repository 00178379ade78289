//! Gravity-model trip distribution
//!
//! For origin `i` and every reached destination `j` with impedance `d_ij`:
//!
//! ```text
//! t_ij = decay(d_ij)                    potential
//! D_i  = sum_j w_j * t_ij               origin factor
//! M_i  = v_i * D_i^alpha_i              origin demand (0 when D_i = 0)
//! p_ij = t_ij * M_i / D_i               balanced potential
//! C_j += p_ij                           destination factor
//! S_j += p_ij * w_j                     destination supply, also the OD flow
//! ```
//!
//! `d_ij` is first raised to the origin and destination minimum impedances
//! when those are given.

use odflow_common::ZoneId;

use crate::options::DecayFunction;
use crate::problem::{InteractionModel, ZoneValues};

/// Potential of a destination at impedance `d`
///
/// `None` means the destination does not take part in the distribution: a
/// power decay with non-zero beta is undefined at `d <= 0`.
#[inline]
pub fn potential(decay: DecayFunction, d: f64) -> Option<f64> {
    match decay {
        DecayFunction::Power { beta } => {
            if beta == 0.0 {
                Some(1.0)
            } else if d <= 0.0 {
                None
            } else if beta == 1.0 {
                Some(1.0 / d)
            } else {
                Some((d.ln() * -beta).exp())
            }
        }
        DecayFunction::Logit { alpha, beta, gamma } => {
            let t = if d > 0.0 {
                1.0 / (1.0 + (alpha + beta * d.ln() + gamma * d).exp())
            } else if beta == 0.0 {
                1.0 / (1.0 + alpha.exp())
            } else if beta < 0.0 {
                0.0
            } else {
                // beta * ln(d) tends to -inf
                1.0
            };
            Some(t)
        }
    }
}

/// Origin demand `v_i * D_i^alpha`
#[inline]
pub fn demand(org_mass: f64, org_alpha: f64, total_potential: f64) -> f64 {
    if total_potential == 0.0 {
        return 0.0;
    }
    if org_alpha == 0.0 {
        org_mass
    } else if org_alpha == 1.0 {
        org_mass * total_potential
    } else {
        org_mass * (total_potential.ln() * org_alpha).exp()
    }
}

/// Per-origin results of the distribution
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OriginTotals {
    /// D_i
    pub factor: f64,
    /// M_i
    pub demand: f64,
    /// largest (floored) impedance among the participating destinations
    pub max_impedance: f64,
}

/// A destination reached from the current origin
#[derive(Debug, Clone, Copy)]
pub struct Reached {
    pub result: usize,
    pub zone: ZoneId,
    pub impedance: f64,
}

/// Interaction parameters of one call
pub struct TripDistribution<'a> {
    decay: DecayFunction,
    org_mass: Option<&'a ZoneValues<f64>>,
    org_alpha: Option<&'a ZoneValues<f64>>,
    dst_mass: Option<&'a ZoneValues<f64>>,
    org_min_impedance: Option<&'a ZoneValues<f64>>,
    dst_min_impedance: Option<&'a ZoneValues<f64>>,
}

impl<'a> TripDistribution<'a> {
    pub fn new(model: &'a InteractionModel) -> Self {
        Self {
            decay: model.decay,
            org_mass: model.org_mass.as_ref(),
            org_alpha: model.org_alpha.as_ref(),
            dst_mass: model.dst_mass.as_ref(),
            org_min_impedance: model.org_min_impedance.as_ref(),
            dst_min_impedance: model.dst_min_impedance.as_ref(),
        }
    }

    /// w_j
    #[inline]
    pub fn dst_mass(&self, zone: ZoneId) -> f64 {
        self.dst_mass.map_or(1.0, |m| m.get(zone as usize))
    }

    /// `d` raised to the origin and destination minimum impedances
    #[inline]
    pub fn floor(&self, org_zone: usize, dst_zone: ZoneId, d: f64) -> f64 {
        let mut d = d;
        if let Some(min) = self.org_min_impedance {
            d = d.max(min.get(org_zone));
        }
        if let Some(min) = self.dst_min_impedance {
            d = d.max(min.get(dst_zone as usize));
        }
        d
    }

    /// Distribute origin `org_zone` over its reached destinations
    ///
    /// `potentials` is indexed by result row; rows of `reached` receive their
    /// balanced potential `p_ij`, every other row is zeroed.
    pub fn distribute(
        &self,
        org_zone: usize,
        reached: &[Reached],
        potentials: &mut [f64],
    ) -> OriginTotals {
        potentials.fill(0.0);

        let mut totals = OriginTotals::default();
        for r in reached {
            let d = self.floor(org_zone, r.zone, r.impedance);
            let Some(t) = potential(self.decay, d) else {
                continue;
            };
            totals.max_impedance = totals.max_impedance.max(d);
            potentials[r.result] = t;
            totals.factor += t * self.dst_mass(r.zone);
        }

        let org_mass = self.org_mass.map_or(1.0, |m| m.get(org_zone));
        let org_alpha = self.org_alpha.map_or(0.0, |a| a.get(org_zone));
        totals.demand = demand(org_mass, org_alpha, totals.factor);

        if totals.factor > 0.0 {
            let balancing = totals.demand / totals.factor;
            for r in reached {
                potentials[r.result] *= balancing;
            }
        }
        totals
    }
}
