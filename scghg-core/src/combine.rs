//! Reduction of marginal damages into SC-GHG values
//!
//! A cell's SC-GHG is the present value of the marginal damages of a one ton
//! pulse: damages are discounted, summed over years and restated in the
//! output currency year. Ramsey discounting additionally weights every draw
//! by its marginal utility adjustment factor.

use crate::config::Deflator;
use crate::engine::{DiscountingType, ValuationEngine, ValuationRequest};
use crate::errors::{ScghgError, ScghgResult};
use crate::labeled::{LabeledArray, RUN_DIM, YEAR_DIM};

/// How discounted damages are reduced over years
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReductionMode {
    /// `sum_year(md * df) * adjustment`
    RamseyWeighted,
    /// The engine's constant-rate discounting, summed over years
    ConstantDiscount,
}

impl ReductionMode {
    pub fn for_discounting(discounting: DiscountingType) -> Self {
        if discounting.is_ramsey() {
            ReductionMode::RamseyWeighted
        } else {
            ReductionMode::ConstantDiscount
        }
    }
}

/// Combines engine outputs into SC-GHG values for a single sweep cell.
pub struct Combiner<'a, E: ValuationEngine + ?Sized> {
    engine: &'a E,
    deflator: f64,
}

impl<'a, E: ValuationEngine + ?Sized> Combiner<'a, E> {
    pub fn new(engine: &'a E, deflator: &Deflator) -> Self {
        Self {
            engine,
            deflator: deflator.factor(),
        }
    }

    /// Reduce `marginal_damages` (runid, year, gas, region) to SC-GHG values.
    ///
    /// The result keeps every dimension except `year`; with `collapse` the
    /// runs are averaged as well. Discount factors must only use dimensions
    /// of the damages and carry the same labels on them. Ramsey weighting
    /// needs an adjustment factor; constant discounting ignores it.
    pub fn combine(
        &self,
        marginal_damages: &LabeledArray,
        discount_factors: &LabeledArray,
        adjustment: Option<&LabeledArray>,
        mode: ReductionMode,
        request: &ValuationRequest,
        collapse: bool,
    ) -> ScghgResult<LabeledArray> {
        for dim in [RUN_DIM, YEAR_DIM] {
            if !discount_factors.has_dim(dim) || !marginal_damages.has_dim(dim) {
                return Err(ScghgError::Alignment(format!(
                    "marginal damages {:?} and discount factors {:?} must both have a {} dimension",
                    marginal_damages.dims(),
                    discount_factors.dims(),
                    dim
                )));
            }
        }
        discount_factors.check_aligned_with(marginal_damages)?;

        let summed = match mode {
            ReductionMode::RamseyWeighted => {
                let adjustment = adjustment.ok_or_else(|| {
                    ScghgError::Configuration(format!(
                        "{} discounting for {} requires an adjustment factor",
                        request.discounting.as_str(),
                        request.sector
                    ))
                })?;
                marginal_damages
                    .mul_aligned(discount_factors)?
                    .sum_over(YEAR_DIM)?
                    .mul_aligned(adjustment)?
            }
            ReductionMode::ConstantDiscount => self
                .engine
                .discounted_damages(marginal_damages, discount_factors, request)?
                .sum_over(YEAR_DIM)?,
        };

        let scghg = summed.scale(self.deflator).with_name("scghg");
        if collapse {
            scghg.mean_over(RUN_DIM)
        } else {
            Ok(scghg)
        }
    }
}
