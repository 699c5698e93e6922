//! Result files
//!
//! Every group of a sweep is written below `{output_root}/{scope}_scghgs/`:
//!
//! ```text
//! sc-{gas}-dscim-{sector}-{pulse_year}.csv
//! sc-dscim-{sector}-{pulse_year}-attributes.txt
//! full_distributions/{gas}/sc-{gas}-dscim-{sector}-{pulse_year}-n{runs}.csv
//! full_distributions/{gas}/sc-{gas}-dscim-{sector}-{pulse_year}-n{runs}-attributes.txt
//! consumption/global_consumption_no_pulse-{recipe}-{discounting}-{pulse_year}.nc4
//! ```
//!
//! When a sweep covers several recipe/discounting combinations the file
//! names carry a `{recipe}-{discounting}` qualifier before the pulse year so
//! groups do not overwrite each other.
//!
//! CSV files hold one row per element with a column per remaining dimension
//! followed by the value column.

use crate::engine::{RecipeDiscount, ValuationScope};
use crate::errors::{ScghgError, ScghgResult};
use crate::gases::display_symbol;
use crate::labeled::{Label, LabeledArray, GAS_DIM, RUN_DIM};
use crate::provenance::{MetaValue, ProvenanceRecord};
use crate::sweep::SECTOR_DIM;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const VALUE_COLUMN: &str = "scghg";

#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    qualifier: Option<String>,
}

impl OutputWriter {
    pub fn new(output_root: &Path, scope: ValuationScope) -> Self {
        Self {
            dir: output_root.join(format!("{}_scghgs", scope)),
            qualifier: None,
        }
    }

    /// Insert `qualifier` into every result file name.
    pub fn with_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(&self, prefix: &str, sector: &str, pulse_year: i64) -> String {
        match &self.qualifier {
            Some(q) => format!("{}-{}-{}-{}", prefix, sector, q, pulse_year),
            None => format!("{}-{}-{}", prefix, sector, pulse_year),
        }
    }

    pub fn collapsed_path(&self, gas: &str, sector: &str, pulse_year: i64) -> PathBuf {
        self.dir.join(format!(
            "{}.csv",
            self.stem(&format!("sc-{}-dscim", gas), sector, pulse_year)
        ))
    }

    pub fn sector_attributes_path(&self, sector: &str, pulse_year: i64) -> PathBuf {
        self.dir
            .join(format!("{}-attributes.txt", self.stem("sc-dscim", sector, pulse_year)))
    }

    pub fn full_distribution_path(
        &self,
        gas: &str,
        sector: &str,
        pulse_year: i64,
        runs: usize,
    ) -> PathBuf {
        self.dir.join("full_distributions").join(gas).join(format!(
            "{}-n{}.csv",
            self.stem(&format!("sc-{}-dscim", gas), sector, pulse_year),
            runs
        ))
    }

    pub fn consumption_path(&self, combo: RecipeDiscount, pulse_year: i64) -> PathBuf {
        self.dir.join("consumption").join(format!(
            "global_consumption_no_pulse-{}-{}-{}.nc4",
            combo.recipe.as_str(),
            combo.discounting.as_str(),
            pulse_year
        ))
    }

    /// Write mean-collapsed results, one CSV per gas and sector, plus a
    /// sector-level attributes file.
    pub fn write_collapsed(
        &self,
        collapsed: &LabeledArray,
        pulse_year: i64,
        attrs: &ProvenanceRecord,
    ) -> ScghgResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        let mut sectors_done = Vec::new();
        for (gas, sector, slice) in gas_sector_slices(collapsed)? {
            let path = self.collapsed_path(gas, &sector, pulse_year);
            write_csv(&path, &slice)?;
            written.push(path);
            if !sectors_done.contains(&sector) {
                let path = self.sector_attributes_path(&sector, pulse_year);
                write_text(&path, &attrs.to_text())?;
                written.push(path);
                sectors_done.push(sector);
            }
        }
        Ok(written)
    }

    /// Write run-level results, one CSV and attributes file per gas and sector.
    pub fn write_full_distribution(
        &self,
        full: &LabeledArray,
        pulse_year: i64,
        attrs: &ProvenanceRecord,
    ) -> ScghgResult<Vec<PathBuf>> {
        let runs = full
            .coord(RUN_DIM)
            .map(|c| c.len())
            .ok_or_else(|| {
                ScghgError::Alignment(format!(
                    "full distribution {} has no {} dimension",
                    full.name(),
                    RUN_DIM
                ))
            })?;
        let mut written = Vec::new();
        for (gas, sector, slice) in gas_sector_slices(full)? {
            let path = self.full_distribution_path(gas, &sector, pulse_year, runs);
            write_csv(&path, &slice)?;
            let attrs_path = path.with_file_name(format!(
                "{}-n{}-attributes.txt",
                self.stem(&format!("sc-{}-dscim", gas), &sector, pulse_year),
                runs
            ));
            write_text(&attrs_path, &attrs.to_text())?;
            written.push(path);
            written.push(attrs_path);
        }
        Ok(written)
    }

    /// Write the tagged consumption paths of a group as a NetCDF file with the
    /// provenance as global attributes.
    ///
    /// Integer-labelled dimensions get an `i64` coordinate variable. Text
    /// labels are stored as a `labels` attribute (joined with `|`) on an index
    /// variable.
    pub fn write_consumption(
        &self,
        consumption: &LabeledArray,
        combo: RecipeDiscount,
        pulse_year: i64,
        attrs: &ProvenanceRecord,
    ) -> ScghgResult<PathBuf> {
        let path = self.consumption_path(combo, pulse_year);
        ensure_parent(&path)?;
        let mut file = netcdf::create(&path).map_err(|e| nc_err(&path, e))?;
        for (key, value) in attrs.iter() {
            match value {
                MetaValue::Int(v) => file.add_attribute(key, *v),
                MetaValue::Float(v) => file.add_attribute(key, *v),
                other => file.add_attribute(key, other.to_string()),
            }
            .map_err(|e| nc_err(&path, e))?;
        }

        for coord in consumption.coords() {
            file.add_dimension(&coord.name, coord.len()).map_err(|e| nc_err(&path, e))?;
            let mut var = file
                .add_variable::<i64>(&coord.name, &[coord.name.as_str()])
                .map_err(|e| nc_err(&path, e))?;
            if coord.labels.iter().all(|l| matches!(l, Label::Int(_))) {
                let values: Vec<i64> = coord
                    .labels
                    .iter()
                    .filter_map(|l| match l {
                        Label::Int(v) => Some(*v),
                        Label::Text(_) => None,
                    })
                    .collect();
                var.put_values(&values, None, None).map_err(|e| nc_err(&path, e))?;
            } else {
                let index: Vec<i64> = (0..coord.len() as i64).collect();
                var.put_values(&index, None, None).map_err(|e| nc_err(&path, e))?;
                let labels: Vec<String> = coord.labels.iter().map(Label::to_string).collect();
                var.add_attribute("labels", labels.join("|")).map_err(|e| nc_err(&path, e))?;
            }
        }

        let dims = consumption.dims();
        let mut var = file
            .add_variable::<f64>(consumption.name(), &dims)
            .map_err(|e| nc_err(&path, e))?;
        let values: Vec<f64> = consumption.data().iter().copied().collect();
        var.put_values(&values, None, None).map_err(|e| nc_err(&path, e))?;
        for (name, label) in consumption.scalar_coords() {
            match label {
                Label::Int(v) => var.add_attribute(name, *v),
                Label::Text(v) => var.add_attribute(name, v.as_str()),
            }
            .map_err(|e| nc_err(&path, e))?;
        }

        debug!(path = %path.display(), "wrote consumption path");
        Ok(path)
    }
}

fn nc_err(path: &Path, e: impl fmt::Display) -> ScghgError {
    ScghgError::NetCdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Split `array` into one slice per gas and sector, gases renamed to their
/// display symbols.
fn gas_sector_slices(
    array: &LabeledArray,
) -> ScghgResult<Vec<(&'static str, String, LabeledArray)>> {
    let missing = |dim: &str| {
        ScghgError::Alignment(format!(
            "{} has no {} dimension (dimensions: {:?})",
            array.name(),
            dim,
            array.dims()
        ))
    };
    let gases = array.coord(GAS_DIM).ok_or_else(|| missing(GAS_DIM))?;
    let sectors = array.coord(SECTOR_DIM).ok_or_else(|| missing(SECTOR_DIM))?;

    let mut slices = Vec::with_capacity(gases.len() * sectors.len());
    for gas in &gases.labels {
        let symbol = display_symbol(&gas.to_string())?;
        for sector in &sectors.labels {
            let slice = array.select(&[(GAS_DIM, gas.clone()), (SECTOR_DIM, sector.clone())])?;
            slices.push((symbol, sector.to_string(), slice));
        }
    }
    Ok(slices)
}

fn ensure_parent(path: &Path) -> ScghgResult<()> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir).map_err(|e| ScghgError::io(dir, e)),
        None => Ok(()),
    }
}

fn csv_field(label: &Label) -> String {
    let text = label.to_string();
    if text.contains(',') || text.contains('"') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

fn write_csv(path: &Path, array: &LabeledArray) -> ScghgResult<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| ScghgError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let io_err = |e| ScghgError::io(path, e);

    let mut header: Vec<&str> = array.dims();
    header.push(VALUE_COLUMN);
    writeln!(out, "{}", header.join(",")).map_err(io_err)?;
    for (labels, value) in array.rows() {
        let mut fields: Vec<String> = labels.into_iter().map(csv_field).collect();
        fields.push(value.to_string());
        writeln!(out, "{}", fields.join(",")).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    debug!(path = %path.display(), rows = array.len(), "wrote csv");
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> ScghgResult<()> {
    ensure_parent(path)?;
    fs::write(path, contents).map_err(|e| ScghgError::io(path, e))
}
