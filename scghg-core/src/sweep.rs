//! Parameter sweeps
//!
//! A sweep values every combination of recipe/discounting, pulse year,
//! discount-rate pair and sector. Cells are grouped by recipe/discounting and
//! pulse year: once all pairs and sectors of a group have run, the group's
//! cells are concatenated along their tags, collapsed over runs and written.
//!
//! Each cell is tagged with the scalar coordinates
//! `discount_rate`, `menu_option`, `sector` and `pulse_year`, which become
//! the leading dimensions of the concatenated group.

use crate::adjustment::adjustment_factor;
use crate::combine::{Combiner, ReductionMode};
use crate::config::{Config, DiscountRatePair};
use crate::engine::{RecipeDiscount, ValuationEngine, ValuationRequest, ValuationScope};
use crate::errors::{ScghgError, ScghgResult};
use crate::gases::{display_symbol, engine_id};
use crate::labeled::{combine_tagged, Label, LabeledArray, GAS_DIM, RUN_DIM};
use crate::output::OutputWriter;
use crate::provenance::{cell_attributes, ProvenanceRecord, RunContext};
use crate::sectors::short_name;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DISCOUNT_RATE_DIM: &str = "discount_rate";
pub const MENU_OPTION_DIM: &str = "menu_option";
pub const SECTOR_DIM: &str = "sector";
pub const PULSE_YEAR_DIM: &str = "pulse_year";

/// Tag dimensions in the order they lead a concatenated group
pub const TAG_DIMS: [&str; 4] = [DISCOUNT_RATE_DIM, MENU_OPTION_DIM, SECTOR_DIM, PULSE_YEAR_DIM];

/// Engine bookkeeping coordinate removed from every cell before tagging
pub const STRAY_COORD: &str = "simulation";

/// What to sweep over
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRequest {
    pub sectors: Vec<String>,
    pub scope: ValuationScope,
    pub discount_rates: Vec<DiscountRatePair>,
    pub recipe_discounts: Vec<RecipeDiscount>,
    pub pulse_years: Vec<i64>,
    /// Also write run-level results
    pub full_distribution: bool,
    /// Also write the un-pulsed consumption paths
    pub consumption_path: bool,
}

impl SweepRequest {
    /// A global sweep over `sectors` using the configured discount rates and
    /// pulse years and the default recipe.
    pub fn from_config(config: &Config, sectors: Vec<String>) -> Self {
        Self {
            sectors,
            scope: ValuationScope::Global,
            discount_rates: config.discount_rates.clone(),
            recipe_discounts: RecipeDiscount::default_combos(),
            pulse_years: config.pulse_years.clone(),
            full_distribution: false,
            consumption_path: false,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.sectors.len()
            * self.discount_rates.len()
            * self.recipe_discounts.len()
            * self.pulse_years.len()
    }
}

/// Results of one (recipe/discounting, pulse year) group
#[derive(Debug, Clone)]
pub struct GroupOutput {
    pub combo: RecipeDiscount,
    pub pulse_year: i64,
    /// Mean over runs
    pub collapsed: LabeledArray,
    /// Run-level results, kept when the full distribution was requested
    pub full: Option<LabeledArray>,
    pub consumption: Option<LabeledArray>,
    pub provenance: ProvenanceRecord,
    pub files: Vec<PathBuf>,
}

impl GroupOutput {
    /// Collapsed results for a gas display symbol such as `CO2`.
    pub fn gas(&self, symbol: &str) -> ScghgResult<LabeledArray> {
        self.collapsed
            .sel(GAS_DIM, &Label::from(engine_id(symbol)?))
    }
}

#[derive(Debug, Clone)]
pub struct SweepOutputs {
    pub groups: Vec<GroupOutput>,
    /// Provenance merged over every cell of the sweep
    pub provenance: ProvenanceRecord,
}

struct CellOutput {
    scghg: LabeledArray,
    consumption: LabeledArray,
    attrs: ProvenanceRecord,
}

/// Runs sweeps against a valuation engine.
///
/// The configuration is borrowed for the whole sweep and never re-read.
pub struct Sweep<'a, E: ValuationEngine + ?Sized> {
    config: &'a Config,
    engine: &'a E,
    population: Option<LabeledArray>,
    context: RunContext,
}

impl<'a, E: ValuationEngine + ?Sized> Sweep<'a, E> {
    pub fn new(config: &'a Config, engine: &'a E, context: RunContext) -> Self {
        Self {
            config,
            engine,
            population: None,
            context,
        }
    }

    /// World population (runid, year), required for Ramsey discounting.
    pub fn with_population(mut self, population: LabeledArray) -> Self {
        self.population = Some(population);
        self
    }

    /// Reject a request that cannot complete, before any engine call.
    pub fn check(&self, request: &SweepRequest) -> ScghgResult<()> {
        let empty = |what: &str| {
            Err(ScghgError::Configuration(format!(
                "no {} selected; choose at least one",
                what
            )))
        };
        if request.discount_rates.is_empty() {
            return empty("discount rate pairs");
        }
        if request.sectors.is_empty() {
            return empty("sectors");
        }
        if request.pulse_years.is_empty() {
            return empty("pulse years");
        }
        if request.recipe_discounts.is_empty() {
            return empty("recipe/discounting combinations");
        }
        for sector in &request.sectors {
            self.config.formula(sector)?;
        }
        for gas in &self.config.gases {
            display_symbol(gas)?;
        }

        let mut labels = HashSet::new();
        for pair in &request.discount_rates {
            if !labels.insert(pair.label()) {
                return Err(ScghgError::Configuration(format!(
                    "discount rate label {:?} is used twice",
                    pair.label()
                )));
            }
        }
        let mut years = HashSet::new();
        for year in &request.pulse_years {
            if !years.insert(*year) {
                return Err(ScghgError::Configuration(format!(
                    "pulse year {} is selected twice",
                    year
                )));
            }
        }
        let mut combos = HashSet::new();
        for combo in &request.recipe_discounts {
            if !combos.insert(*combo) {
                return Err(ScghgError::Configuration(format!(
                    "recipe/discounting {} is selected twice",
                    combo
                )));
            }
        }
        let mut shorts = HashSet::new();
        for sector in &request.sectors {
            let short = short_name(sector, &self.config.sector_display_names);
            if !shorts.insert(short.clone()) {
                return Err(ScghgError::Configuration(format!(
                    "sectors {:?} share the display name {}",
                    request.sectors, short
                )));
            }
        }

        if self.population.is_none()
            && request
                .recipe_discounts
                .iter()
                .any(|c| c.discounting.is_ramsey())
        {
            return Err(ScghgError::Configuration(
                "Ramsey discounting needs population data; set paths.population".to_string(),
            ));
        }
        Ok(())
    }

    pub fn run(&self, request: &SweepRequest) -> ScghgResult<SweepOutputs> {
        self.check(request)?;
        info!(
            cells = request.cell_count(),
            scope = %request.scope,
            output = %self.config.output_root.display(),
            "starting sweep"
        );

        let base_writer = OutputWriter::new(&self.config.output_root, request.scope);
        let qualify = request.recipe_discounts.len() > 1;
        let mut sweep_provenance = ProvenanceRecord::new();
        let mut groups = Vec::new();

        for &combo in &request.recipe_discounts {
            let writer = base_writer.clone().with_qualifier(qualify.then(|| {
                format!("{}-{}", combo.recipe.as_str(), combo.discounting.as_str())
            }));
            for &pulse_year in &request.pulse_years {
                let mut scghg_cells = Vec::new();
                let mut consumption_cells = Vec::new();
                let mut provenance = ProvenanceRecord::new();

                for pair in &request.discount_rates {
                    for sector in &request.sectors {
                        let cell = self
                            .run_cell(combo, pair, sector, pulse_year, request.scope)
                            .map_err(|e| ScghgError::Cell {
                                sector: sector.clone(),
                                eta: pair.eta,
                                rho: pair.rho,
                                pulse_year,
                                source: Box::new(e),
                            })?;
                        provenance.absorb(&cell.attrs);
                        sweep_provenance.absorb(&cell.attrs);
                        scghg_cells.push(cell.scghg);
                        if request.consumption_path {
                            consumption_cells.push(cell.consumption);
                        }
                    }
                }

                let full = combine_tagged("scghg", &scghg_cells, &TAG_DIMS)?;
                let collapsed = full.mean_over(RUN_DIM)?;

                let mut files = Vec::new();
                if request.full_distribution {
                    files.extend(writer.write_full_distribution(&full, pulse_year, &provenance)?);
                }
                files.extend(writer.write_collapsed(&collapsed, pulse_year, &provenance)?);

                let consumption = if request.consumption_path {
                    let consumption = combine_tagged(
                        "global_consumption_no_pulse",
                        &consumption_cells,
                        &TAG_DIMS,
                    )?;
                    files.push(writer.write_consumption(
                        &consumption,
                        combo,
                        pulse_year,
                        &provenance,
                    )?);
                    Some(consumption)
                } else {
                    None
                };

                info!(
                    combo = %combo,
                    pulse_year,
                    cells = scghg_cells.len(),
                    files = files.len(),
                    "wrote group"
                );
                groups.push(GroupOutput {
                    combo,
                    pulse_year,
                    collapsed,
                    full: request.full_distribution.then_some(full),
                    consumption,
                    provenance,
                    files,
                });
            }
        }

        Ok(SweepOutputs {
            groups,
            provenance: sweep_provenance,
        })
    }

    fn run_cell(
        &self,
        combo: RecipeDiscount,
        pair: &DiscountRatePair,
        sector: &str,
        pulse_year: i64,
        scope: ValuationScope,
    ) -> ScghgResult<CellOutput> {
        debug!(
            sector,
            eta = pair.eta,
            rho = pair.rho,
            pulse_year,
            combo = %combo,
            "valuing cell"
        );
        let global = ValuationRequest::global(self.config, sector, combo, pair, pulse_year)?;

        // Domestic damages are discounted with the global consumption path.
        let (request, marginal_damages, discount_factors, consumption, provenance) = match scope
        {
            ValuationScope::Global => {
                let out = self.engine.compute(&global)?;
                (
                    global,
                    out.marginal_damages,
                    out.discount_factors,
                    out.global_consumption_no_pulse,
                    out.provenance,
                )
            }
            ValuationScope::Domestic => {
                let domestic =
                    ValuationRequest::domestic(self.config, sector, combo, pair, pulse_year)?;
                let dom = self.engine.compute(&domestic)?;
                let glob = self.engine.compute(&global)?;
                (
                    domestic,
                    dom.marginal_damages,
                    glob.discount_factors,
                    glob.global_consumption_no_pulse,
                    dom.provenance,
                )
            }
        };

        let mode = ReductionMode::for_discounting(combo.discounting);
        let adjustment = match mode {
            ReductionMode::RamseyWeighted => {
                let population = self.population.as_ref().ok_or_else(|| {
                    ScghgError::Configuration(
                        "Ramsey discounting needs population data".to_string(),
                    )
                })?;
                Some(adjustment_factor(&consumption, population, pair.eta, pulse_year)?)
            }
            ReductionMode::ConstantDiscount => None,
        };

        let scghg = Combiner::new(self.engine, &self.config.deflator).combine(
            &marginal_damages,
            &discount_factors,
            adjustment.as_ref(),
            mode,
            &request,
            false,
        )?;

        let short = short_name(sector, &self.config.sector_display_names);
        let tag = |array: LabeledArray| -> ScghgResult<LabeledArray> {
            Ok(array
                .strip_coord(STRAY_COORD)?
                .with_scalar_coord(DISCOUNT_RATE_DIM, pair.label())
                .with_scalar_coord(MENU_OPTION_DIM, combo.recipe.as_str())
                .with_scalar_coord(SECTOR_DIM, short.as_str())
                .with_scalar_coord(PULSE_YEAR_DIM, pulse_year))
        };

        Ok(CellOutput {
            scghg: tag(scghg)?,
            consumption: tag(consumption)?,
            attrs: cell_attributes(&provenance, &self.context, &short)?,
        })
    }
}
