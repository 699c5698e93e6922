//! Provenance records
//!
//! Every sweep cell reports the parameters it ran with. The records are
//! folded into a single [`ProvenanceRecord`] per output group: attributes
//! that agree across cells stay scalar, attributes that differ are widened
//! into a list holding each distinct value in the order it was first seen.
//!
//! The key set of a merged record is fixed by the first cell. Keys that only
//! appear in later cells are not added; a warning names them.

use crate::engine::EngineProvenance;
use crate::errors::ScghgResult;
use crate::gases::{display_symbol, parse_gas_list};
use crate::labeled::format_float;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use tracing::warn;

/// Keys dropped from per-cell attributes before merging.
///
/// These hold engine object references, resolved input paths or quantile
/// method parameters that do not serialise to a short text value.
pub const IRRELEVANT_KEYS: &[&str] = &[
    "econ_vars",
    "climate_vars",
    "ce_path",
    "save_path",
    "ssp_path",
    "rff_path",
    "ecs_mask_path",
    "ecs_mask_name",
    "quantreg_quantiles",
    "quantreg_weights",
    "full_uncertainty_quantiles",
    "extrap_formula",
    "fair_dims",
    "subset_dict",
    "save_files",
    "filename_suffix",
];

/// A provenance attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetaValue>),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(v) => write!(f, "{}", v),
            MetaValue::Int(v) => write!(f, "{}", v),
            MetaValue::Float(v) => f.write_str(&format_float(*v)),
            MetaValue::Text(v) => f.write_str(v),
            MetaValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl<T: Into<MetaValue>> From<Vec<T>> for MetaValue {
    fn from(values: Vec<T>) -> Self {
        MetaValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Ordered attribute map describing how a set of results was produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceRecord {
    attrs: IndexMap<String, MetaValue>,
}

impl ProvenanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.attrs.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fold `new_attrs` into this record and return it.
    pub fn merge(mut self, new_attrs: &ProvenanceRecord) -> Self {
        self.absorb(new_attrs);
        self
    }

    /// Fold `new_attrs` into this record in place.
    ///
    /// An empty record is seeded with `new_attrs` verbatim. Otherwise every
    /// existing key whose new value is not already contained in the text of
    /// the recorded value is widened into a list (or appended to).
    pub fn absorb(&mut self, new_attrs: &ProvenanceRecord) {
        if self.attrs.is_empty() {
            self.attrs = new_attrs.attrs.clone();
            return;
        }
        for (key, existing) in self.attrs.iter_mut() {
            let Some(value) = new_attrs.attrs.get(key) else {
                continue;
            };
            if existing.to_string().contains(&value.to_string()) {
                continue;
            }
            match existing {
                MetaValue::List(items) => items.push(value.clone()),
                scalar => {
                    let first = std::mem::replace(scalar, MetaValue::List(vec![]));
                    *scalar = MetaValue::List(vec![first, value.clone()]);
                }
            }
        }
        let dropped: Vec<&str> = new_attrs
            .keys()
            .filter(|k| !self.attrs.contains_key(*k))
            .collect();
        if !dropped.is_empty() {
            warn!(keys = ?dropped, "attributes missing from the first cell are not recorded");
        }
    }

    /// `key: value` lines
    pub fn to_text(&self) -> String {
        self.attrs
            .iter()
            .map(|(k, v)| format!("{}: {}\n", k, v))
            .collect()
    }
}

/// Where and when a sweep ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub author: String,
    pub machine: String,
    pub commit: Option<String>,
    pub created: String,
    pub units: String,
}

impl RunContext {
    /// Gather the context of the current process.
    pub fn detect(units: &str) -> Self {
        let machine = std::env::var("HOSTNAME")
            .ok()
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let commit = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string());
        Self {
            author: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            machine,
            commit,
            created: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            units: units.to_string(),
        }
    }
}

fn rename(attrs: &mut IndexMap<String, MetaValue>, from: &str, to: &str) {
    if let Some(value) = attrs.shift_remove(from) {
        attrs.insert(to.to_string(), value);
    }
}

fn gas_symbols(value: &MetaValue) -> ScghgResult<MetaValue> {
    let ids: Vec<String> = match value {
        MetaValue::List(items) => items.iter().map(|i| i.to_string()).collect(),
        other => parse_gas_list(&other.to_string()),
    };
    let symbols = ids
        .iter()
        .map(|id| display_symbol(id).map(MetaValue::from))
        .collect::<ScghgResult<Vec<_>>>()?;
    Ok(MetaValue::List(symbols))
}

/// Build the attribute set recorded for one sweep cell.
///
/// Irrelevant keys are dropped, `base_period` becomes
/// `{sector}_base_period`, `path` becomes `socioeconomics_path` and gas
/// identifiers are replaced by their display symbols.
pub fn cell_attributes(
    provenance: &EngineProvenance,
    context: &RunContext,
    sector_short: &str,
) -> ScghgResult<ProvenanceRecord> {
    let mut attrs: IndexMap<String, MetaValue> = IndexMap::new();
    attrs.insert("Author".into(), context.author.as_str().into());
    attrs.insert("Date Created".into(), context.created.as_str().into());
    attrs.insert("Units".into(), context.units.as_str().into());
    attrs.insert("machine".into(), context.machine.as_str().into());
    if let Some(commit) = &context.commit {
        attrs.insert("commit".into(), commit.as_str().into());
    }

    attrs.insert("menu_option".into(), provenance.recipe.as_str().into());
    attrs.insert(
        "discounting_type".into(),
        provenance.discounting_type.as_str().into(),
    );
    attrs.insert("sector".into(), provenance.sector.as_str().into());
    attrs.insert("eta".into(), provenance.eta.into());
    attrs.insert("rho".into(), provenance.rho.into());
    attrs.insert("pulse_year".into(), provenance.pulse_year.into());
    attrs.insert("formula".into(), provenance.formula.as_str().into());
    attrs.insert(
        "fair_aggregation".into(),
        provenance.fair_aggregation.clone().into(),
    );
    attrs.insert(
        "weitzman_parameter".into(),
        provenance.weitzman_parameters.clone().into(),
    );
    if let Some(base_period) = &provenance.base_period {
        attrs.insert("base_period".into(), base_period.as_str().into());
    }
    if let Some(path) = &provenance.socioeconomics_path {
        attrs.insert("path".into(), path.display().to_string().into());
    }
    if !provenance.gases.is_empty() {
        attrs.insert("gases".into(), provenance.gases.clone().into());
    }
    for (key, value) in &provenance.extra {
        attrs.entry(key.clone()).or_insert_with(|| value.clone());
    }

    for key in IRRELEVANT_KEYS {
        attrs.shift_remove(*key);
    }
    rename(&mut attrs, "base_period", &format!("{}_base_period", sector_short));
    rename(&mut attrs, "path", "socioeconomics_path");
    if let Some(gases) = attrs.get_mut("gases") {
        *gases = gas_symbols(gases)?;
    }

    Ok(ProvenanceRecord { attrs })
}
