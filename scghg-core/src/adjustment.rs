//! Marginal utility adjustment for Ramsey discounting
//!
//! Ramsey discount factors are already weighted by each draw's consumption
//! growth. To put draws on a common footing the discounted damages are
//! rescaled by the draw's marginal utility of per-capita consumption in the
//! pulse year, normalised so that the factors average to one.

use crate::errors::{ScghgError, ScghgResult};
use crate::labeled::{Label, LabeledArray, REGION_DIM, RUN_DIM, YEAR_DIM};
use tracing::debug;

/// Per-run adjustment factor `c^-eta / mean_runs(c^-eta)`.
///
/// `c` is per-capita consumption in `pulse_year`, i.e. the un-pulsed global
/// consumption path divided by world population. Both inputs must carry a
/// `year` dimension containing `pulse_year`; population must already be
/// reduced to a single aggregate region.
///
/// Non-positive or non-finite per-capita consumption is a
/// [`ScghgError::Domain`] error.
pub fn adjustment_factor(
    consumption_no_pulse: &LabeledArray,
    population: &LabeledArray,
    eta: f64,
    pulse_year: i64,
) -> ScghgResult<LabeledArray> {
    if population.has_dim(REGION_DIM) {
        return Err(ScghgError::Alignment(format!(
            "population {} still has a {} dimension; select the world aggregate first",
            population.name(),
            REGION_DIM
        )));
    }
    let year = Label::from(pulse_year);
    let consumption = consumption_no_pulse.sel(YEAR_DIM, &year)?;
    let population = population.sel(YEAR_DIM, &year)?;
    let per_capita = consumption.div_aligned(&population)?;

    if let Some(bad) = per_capita.values().find(|c| !c.is_finite() || *c <= 0.0) {
        return Err(ScghgError::Domain(format!(
            "per-capita consumption in {} must be positive and finite, found {}",
            pulse_year, bad
        )));
    }

    let utility = per_capita.mapv(|c| c.powf(-eta));
    let mean = utility.mean_over(RUN_DIM)?;
    if mean.values().any(|m| !m.is_finite() || m <= 0.0) {
        return Err(ScghgError::Domain(format!(
            "mean marginal utility in {} is not usable with eta={}",
            pulse_year, eta
        )));
    }
    debug!(eta, pulse_year, runs = utility.len(), "computed adjustment factor");
    Ok(utility.div_aligned(&mean)?.with_name("adjustment_factor"))
}
