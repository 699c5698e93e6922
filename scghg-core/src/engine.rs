//! Valuation engine contract
//!
//! The engine turns a [`ValuationRequest`] into uncollapsed marginal damages,
//! discount factors and the un-pulsed consumption path. How it does that
//! (damage function estimation, recipe maths, climate emulation) is outside
//! this crate; the pipeline only relies on the [`ValuationEngine`] trait.
//!
//! [`ArchiveEngine`] is the implementation used by the command line tool: it
//! replays engine outputs previously exported into the damage function
//! library.

use crate::config::{ClimateInputs, Config, DiscountRatePair};
use crate::errors::{EngineError, ScghgError, ScghgResult};
use crate::labeled::LabeledArray;
use crate::provenance::MetaValue;
use crate::sectors::{base_sector, domestic_sector};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;

/// Whether damages are valued over the whole world or the US only
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationScope {
    Global,
    Domestic,
}

impl ValuationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationScope::Global => "global",
            ValuationScope::Domestic => "domestic",
        }
    }
}

impl fmt::Display for ValuationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Economic valuation recipe
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipe {
    AddingUp,
    RiskAversion,
    Equity,
}

impl Recipe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recipe::AddingUp => "adding_up",
            Recipe::RiskAversion => "risk_aversion",
            Recipe::Equity => "equity",
        }
    }
}

impl FromStr for Recipe {
    type Err = ScghgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adding_up" => Ok(Recipe::AddingUp),
            "risk_aversion" => Ok(Recipe::RiskAversion),
            "equity" => Ok(Recipe::Equity),
            other => Err(ScghgError::Configuration(format!(
                "unknown recipe {:?}; expected adding_up, risk_aversion or equity",
                other
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountingType {
    Constant,
    EulerRamsey,
}

impl DiscountingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountingType::Constant => "constant",
            DiscountingType::EulerRamsey => "euler_ramsey",
        }
    }

    pub fn is_ramsey(&self) -> bool {
        matches!(self, DiscountingType::EulerRamsey)
    }
}

impl FromStr for DiscountingType {
    type Err = ScghgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(DiscountingType::Constant),
            "euler_ramsey" => Ok(DiscountingType::EulerRamsey),
            other => Err(ScghgError::Configuration(format!(
                "unknown discounting type {:?}; expected constant or euler_ramsey",
                other
            ))),
        }
    }
}

/// A recipe paired with a discounting type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipeDiscount {
    pub recipe: Recipe,
    pub discounting: DiscountingType,
}

impl RecipeDiscount {
    pub fn new(recipe: Recipe, discounting: DiscountingType) -> Self {
        Self {
            recipe,
            discounting,
        }
    }

    /// Risk aversion with Ramsey discounting
    pub fn default_combos() -> Vec<Self> {
        vec![Self::new(Recipe::RiskAversion, DiscountingType::EulerRamsey)]
    }
}

impl fmt::Display for RecipeDiscount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.recipe.as_str(), self.discounting.as_str())
    }
}

/// Parses `recipe:discounting`, e.g. `risk_aversion:euler_ramsey`
impl FromStr for RecipeDiscount {
    type Err = ScghgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (recipe, discounting) = s.split_once(':').ok_or_else(|| {
            ScghgError::Configuration(format!(
                "expected recipe:discounting (e.g. risk_aversion:euler_ramsey), got {:?}",
                s
            ))
        })?;
        Ok(Self::new(recipe.parse()?, discounting.parse()?))
    }
}

/// Where the engine takes damage function coefficients from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoefficientSource {
    /// Pre-estimated coefficients stored in this directory
    FromFile(PathBuf),
    /// The engine estimates coefficients itself
    Computed,
}

/// Everything the engine needs to value one sweep cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRequest {
    pub sector: String,
    pub recipe: Recipe,
    pub discounting: DiscountingType,
    pub eta: f64,
    pub rho: f64,
    pub pulse_year: i64,
    pub scope: ValuationScope,
    pub socioeconomics_path: PathBuf,
    pub climate: ClimateInputs,
    pub formula: String,
    pub coefficient_source: CoefficientSource,
    pub gases: Vec<String>,
    pub fair_aggregation: Vec<String>,
    pub weitzman_parameters: Vec<f64>,
}

impl ValuationRequest {
    /// Request valuing damages over every region.
    pub fn global(
        config: &Config,
        sector: &str,
        combo: RecipeDiscount,
        pair: &DiscountRatePair,
        pulse_year: i64,
    ) -> ScghgResult<Self> {
        Self::build(
            config,
            base_sector(sector).to_string(),
            ValuationScope::Global,
            combo,
            pair,
            pulse_year,
        )
    }

    /// Request valuing damages over US regions only.
    ///
    /// Shares every field with [`ValuationRequest::global`] except the sector
    /// identifier, the socioeconomics file and the damage function directory.
    pub fn domestic(
        config: &Config,
        sector: &str,
        combo: RecipeDiscount,
        pair: &DiscountRatePair,
        pulse_year: i64,
    ) -> ScghgResult<Self> {
        Self::build(
            config,
            domestic_sector(sector),
            ValuationScope::Domestic,
            combo,
            pair,
            pulse_year,
        )
    }

    fn build(
        config: &Config,
        sector: String,
        scope: ValuationScope,
        combo: RecipeDiscount,
        pair: &DiscountRatePair,
        pulse_year: i64,
    ) -> ScghgResult<Self> {
        let formula = config.formula(&sector)?.to_string();
        let dir = config.damage_function_dir(&sector);
        let coefficient_source = if dir.is_dir() {
            CoefficientSource::FromFile(dir)
        } else {
            CoefficientSource::Computed
        };
        Ok(Self {
            sector,
            recipe: combo.recipe,
            discounting: combo.discounting,
            eta: pair.eta,
            rho: pair.rho,
            pulse_year,
            scope,
            socioeconomics_path: config.socioeconomics_path(scope).to_path_buf(),
            climate: config.climate.clone(),
            formula,
            coefficient_source,
            gases: config.gases.clone(),
            fair_aggregation: config.global_parameters.fair_aggregation.clone(),
            weitzman_parameters: config.global_parameters.weitzman_parameters.clone(),
        })
    }
}

/// Run parameters the engine reports about a computation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineProvenance {
    pub recipe: String,
    pub discounting_type: String,
    pub sector: String,
    pub eta: f64,
    pub rho: f64,
    pub pulse_year: i64,
    pub formula: String,
    #[serde(default)]
    pub base_period: Option<String>,
    #[serde(default)]
    pub socioeconomics_path: Option<PathBuf>,
    #[serde(default)]
    pub gases: Vec<String>,
    #[serde(default)]
    pub fair_aggregation: Vec<String>,
    #[serde(default)]
    pub weitzman_parameters: Vec<f64>,
    /// Engine specific attributes
    #[serde(default)]
    pub extra: IndexMap<String, MetaValue>,
}

impl EngineProvenance {
    /// The parameters declared by `request`.
    pub fn for_request(request: &ValuationRequest) -> Self {
        Self {
            recipe: request.recipe.as_str().to_string(),
            discounting_type: request.discounting.as_str().to_string(),
            sector: request.sector.clone(),
            eta: request.eta,
            rho: request.rho,
            pulse_year: request.pulse_year,
            formula: request.formula.clone(),
            base_period: None,
            socioeconomics_path: Some(request.socioeconomics_path.clone()),
            gases: request.gases.clone(),
            fair_aggregation: request.fair_aggregation.clone(),
            weitzman_parameters: request.weitzman_parameters.clone(),
            extra: IndexMap::new(),
        }
    }
}

/// The engine's answer for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationOutput {
    /// Dimensions (runid, year, gas, region)
    pub marginal_damages: LabeledArray,
    /// Dimensions (runid, year)
    pub discount_factors: LabeledArray,
    /// Dimensions (runid, year)
    pub global_consumption_no_pulse: LabeledArray,
    pub provenance: EngineProvenance,
}

pub trait ValuationEngine {
    fn compute(&self, request: &ValuationRequest) -> Result<ValuationOutput, EngineError>;

    /// Discount marginal damages at a constant rate.
    ///
    /// Engines with their own constant-rate routine override this; the
    /// default applies the discount factors directly.
    fn discounted_damages(
        &self,
        marginal_damages: &LabeledArray,
        discount_factors: &LabeledArray,
        _request: &ValuationRequest,
    ) -> ScghgResult<LabeledArray> {
        marginal_damages.mul_aligned(discount_factors)
    }
}

/// Replays engine outputs exported into the damage function library.
///
/// Each output is a JSON [`ValuationOutput`] stored under the request's
/// damage function directory as
/// `{recipe}-{discounting}-eta{eta}-rho{rho}-{pulse_year}.json`.
#[derive(Debug, Clone, Default)]
pub struct ArchiveEngine;

impl ArchiveEngine {
    pub fn file_name(request: &ValuationRequest) -> String {
        format!(
            "{}-{}-eta{}-rho{}-{}.json",
            request.recipe.as_str(),
            request.discounting.as_str(),
            request.eta,
            request.rho,
            request.pulse_year
        )
    }
}

impl ValuationEngine for ArchiveEngine {
    fn compute(&self, request: &ValuationRequest) -> Result<ValuationOutput, EngineError> {
        let dir = match &request.coefficient_source {
            CoefficientSource::FromFile(dir) => dir,
            CoefficientSource::Computed => {
                return Err(EngineError::CoefficientsUnavailable(request.sector.clone()))
            }
        };
        let path = dir.join(Self::file_name(request));
        if !path.is_file() {
            return Err(EngineError::MissingDamageFunction(path));
        }
        let file = File::open(&path).map_err(|e| EngineError::Input {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let output: ValuationOutput =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| EngineError::Input {
                path: path.clone(),
                message: e.to_string(),
            })?;
        for array in [
            &output.marginal_damages,
            &output.discount_factors,
            &output.global_consumption_no_pulse,
        ] {
            array.validate().map_err(|e| EngineError::Input {
                path: path.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(output)
    }
}
