//! Run configuration
//!
//! A [`Config`] is read once from a TOML file at start-up and then passed by
//! reference to every part of the pipeline that needs a path or a constant.
//! Nothing re-reads it mid-sweep.

use crate::engine::ValuationScope;
use crate::errors::{ScghgError, ScghgResult};
use crate::gases::default_gases;
use crate::labeled::{format_float, Label, LabeledArray, REGION_DIM};
use crate::sectors::{base_sector, default_display_names};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Price-index ratio used to restate results in the output currency year.
///
/// The pipeline multiplies every SC-GHG by `target_index / base_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deflator {
    /// Price index of the currency year the engine reports in.
    ///
    /// Default: 112.29
    pub base_index: f64,

    /// Price index of the output currency year.
    ///
    /// Default: 113.648
    pub target_index: f64,
}

impl Deflator {
    pub fn factor(&self) -> f64 {
        self.target_index / self.base_index
    }
}

impl Default for Deflator {
    fn default() -> Self {
        Self {
            base_index: 112.29,
            target_index: 113.648,
        }
    }
}

/// A Ramsey `(eta, rho)` discounting pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRatePair {
    /// Elasticity of marginal utility of consumption
    pub eta: f64,
    /// Pure rate of time preference
    pub rho: f64,
    /// Display label used to tag results; defaults to `"{eta}_{rho}"`
    #[serde(default)]
    pub label: Option<String>,
}

impl DiscountRatePair {
    pub fn new(eta: f64, rho: f64) -> Self {
        Self {
            eta,
            rho,
            label: None,
        }
    }

    pub fn labelled(eta: f64, rho: f64, label: &str) -> Self {
        Self {
            eta,
            rho,
            label: Some(label.to_string()),
        }
    }

    pub fn label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}_{}", format_float(self.eta), format_float(self.rho)))
    }
}

/// Ramsey pairs calibrated to 1.5%, 2.0%, 2.5% and 3.0% near-term rates
pub fn default_discount_rates() -> Vec<DiscountRatePair> {
    vec![
        DiscountRatePair::labelled(1.016010255, 9.149608e-05, "1.5% Ramsey"),
        DiscountRatePair::labelled(1.244459066, 0.00197263997, "2.0% Ramsey"),
        DiscountRatePair::labelled(1.421158116, 0.00461878399, "2.5% Ramsey"),
        DiscountRatePair::labelled(1.567899395, 0.00770271076, "3.0% Ramsey"),
    ]
}

fn default_pulse_years() -> Vec<i64> {
    vec![2020, 2030, 2040, 2050, 2060, 2070, 2080]
}

fn default_units() -> String {
    "Real 2020 USD per metric ton".to_string()
}

/// Input locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    /// Root of the per-sector damage function library
    pub damage_function_library: PathBuf,
    pub socioeconomics_global: PathBuf,
    pub socioeconomics_domestic: PathBuf,
    /// Population array with dimensions (runid, year[, region])
    pub population: PathBuf,
}

/// Climate inputs handed through to the valuation engine untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateInputs {
    pub gmst_path: Option<PathBuf>,
    pub gmsl_path: Option<PathBuf>,
    pub gmst_fair_path: Option<PathBuf>,
    pub gmsl_fair_path: Option<PathBuf>,
    pub damages_pulse_conversion_path: Option<PathBuf>,
    pub ecs_mask_path: Option<PathBuf>,
    pub emission_scenarios: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorConfig {
    /// Damage function formula, e.g. `damages ~ -1 + anomaly + np.power(anomaly, 2)`
    pub formula: String,
}

/// Parameters shared by every valuation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalParameters {
    /// Default: `["mean"]`
    pub fair_aggregation: Vec<String>,
    /// Default: `[0.5]`
    pub weitzman_parameters: Vec<f64>,
}

impl Default for GlobalParameters {
    fn default() -> Self {
        Self {
            fair_aggregation: vec!["mean".to_string()],
            weitzman_parameters: vec![0.5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub output_root: PathBuf,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default)]
    pub deflator: Deflator,
    #[serde(default = "default_gases")]
    pub gases: Vec<String>,
    #[serde(default = "default_pulse_years")]
    pub pulse_years: Vec<i64>,
    #[serde(default)]
    pub paths: InputPaths,
    #[serde(default)]
    pub climate: ClimateInputs,
    #[serde(default)]
    pub sectors: IndexMap<String, SectorConfig>,
    #[serde(default = "default_display_names")]
    pub sector_display_names: IndexMap<String, String>,
    #[serde(default = "default_discount_rates")]
    pub discount_rates: Vec<DiscountRatePair>,
    #[serde(default)]
    pub global_parameters: GlobalParameters,
}

impl Config {
    /// A configuration with every optional table at its default.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            units: default_units(),
            deflator: Deflator::default(),
            gases: default_gases(),
            pulse_years: default_pulse_years(),
            paths: InputPaths::default(),
            climate: ClimateInputs::default(),
            sectors: IndexMap::new(),
            sector_display_names: default_display_names(),
            discount_rates: default_discount_rates(),
            global_parameters: GlobalParameters::default(),
        }
    }

    pub fn from_toml_str(raw: &str) -> ScghgResult<Self> {
        toml::from_str(raw).map_err(|e| ScghgError::Configuration(format!("invalid config: {}", e)))
    }

    /// Read the configuration file at `path`.
    pub fn load(path: &Path) -> ScghgResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ScghgError::Configuration(format!(
                "could not read config file {} ({}); create it or pass its location with --config",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&raw).map_err(|e| {
            ScghgError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Damage function formula for a sector (domestic suffixes are ignored).
    pub fn formula(&self, sector: &str) -> ScghgResult<&str> {
        self.sectors
            .get(base_sector(sector))
            .map(|s| s.formula.as_str())
            .ok_or_else(|| {
                ScghgError::Configuration(format!(
                    "sector {} is not configured; known sectors are {:?}",
                    sector,
                    self.sectors.keys().collect::<Vec<_>>()
                ))
            })
    }

    pub fn socioeconomics_path(&self, scope: ValuationScope) -> &Path {
        match scope {
            ValuationScope::Global => &self.paths.socioeconomics_global,
            ValuationScope::Domestic => &self.paths.socioeconomics_domestic,
        }
    }

    /// Damage function directory for a sector identifier
    pub fn damage_function_dir(&self, sector: &str) -> PathBuf {
        self.paths.damage_function_library.join(sector)
    }

    /// Load world population, dropping the region dimension if present.
    pub fn load_population(&self) -> ScghgResult<LabeledArray> {
        let population = LabeledArray::read_json(&self.paths.population)?;
        if population.has_dim(REGION_DIM) {
            population.sel(REGION_DIM, &Label::from("world"))
        } else {
            Ok(population)
        }
    }
}
