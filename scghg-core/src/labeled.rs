//! Labeled n-dimensional arrays
//!
//! Every quantity flowing through the pipeline (marginal damages, discount
//! factors, consumption paths, SC-GHG cells) is a [`LabeledArray`]: an
//! `f64` array whose axes are named and carry one label per position, plus a
//! set of scalar (non-dimension) coordinates used to tag sweep cells.
//!
//! Arithmetic between arrays is aligned by dimension name. The operand on the
//! right must only use dimensions that are present on the left and must carry
//! exactly the same labels on them; anything else is an
//! [`ScghgError::Alignment`] rather than a silent broadcast.
//!
//! ```rust
//! use ndarray::array;
//! use scghg_core::labeled::{Coord, LabeledArray, RUN_DIM, YEAR_DIM};
//!
//! let damages = LabeledArray::new(
//!     "marginal_damages",
//!     vec![Coord::new(RUN_DIM, [1, 2]), Coord::new(YEAR_DIM, [2020, 2021])],
//!     array![[1.0, 2.0], [3.0, 4.0]].into_dyn(),
//! )
//! .unwrap();
//! let total = damages.sum_over(YEAR_DIM).unwrap();
//! assert_eq!(total.data().as_slice().unwrap(), &[3.0, 7.0]);
//! ```

use crate::errors::{ScghgError, ScghgResult};
use indexmap::IndexMap;
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Simulation draw (Monte-Carlo run) dimension
pub const RUN_DIM: &str = "runid";
pub const YEAR_DIM: &str = "year";
pub const GAS_DIM: &str = "gas";
pub const REGION_DIM: &str = "region";

/// Text for a float label or attribute.
///
/// Shortest round-trip digits, a trailing `.0` on whole numbers and exponent
/// notation (`9.149608e-05`, `1e+16`) outside `1e-4 <= |v| < 1e16`.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sci = format!("{:e}", v);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if v == 0.0 || (-4..16).contains(&exponent) {
        let fixed = v.to_string();
        if fixed.contains('.') {
            fixed
        } else {
            format!("{}.0", fixed)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

/// A single coordinate label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl Label {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Label::Int(v) => Some(*v),
            Label::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Label::Int(_) => None,
            Label::Text(v) => Some(v),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{}", v),
            Label::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<i32> for Label {
    fn from(value: i32) -> Self {
        Label::Int(value as i64)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Label::Text(value)
    }
}

/// A named dimension together with its labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub name: String,
    pub labels: Vec<Label>,
}

impl Coord {
    pub fn new<L: Into<Label>>(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = L>,
    ) -> Self {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Index of `label` along this dimension
    pub fn position(&self, label: &Label) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

/// An `f64` array with named, labeled dimensions.
///
/// The invariants (one coordinate per axis, coordinate length equal to the
/// axis length, unique dimension names, unique labels within a dimension) are
/// checked on construction and after deserialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledArray {
    name: String,
    coords: Vec<Coord>,
    #[serde(default)]
    scalar_coords: IndexMap<String, Label>,
    data: ArrayD<f64>,
}

impl LabeledArray {
    pub fn new(
        name: impl Into<String>,
        coords: Vec<Coord>,
        data: ArrayD<f64>,
    ) -> ScghgResult<Self> {
        let array = Self {
            name: name.into(),
            coords,
            scalar_coords: IndexMap::new(),
            data,
        };
        array.validate()?;
        Ok(array)
    }

    /// Build an array from values laid out in row-major order over `coords`.
    pub fn from_vec(
        name: impl Into<String>,
        coords: Vec<Coord>,
        values: Vec<f64>,
    ) -> ScghgResult<Self> {
        let name = name.into();
        let shape: Vec<usize> = coords.iter().map(Coord::len).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            ScghgError::Alignment(format!(
                "values for {} do not fit shape {:?}: {}",
                name, shape, e
            ))
        })?;
        Self::new(name, coords, data)
    }

    pub(crate) fn validate(&self) -> ScghgResult<()> {
        if self.coords.len() != self.data.ndim() {
            return Err(ScghgError::Alignment(format!(
                "{} has {} coordinates for {} dimensions",
                self.name,
                self.coords.len(),
                self.data.ndim()
            )));
        }
        let mut names = HashSet::new();
        for (axis, coord) in self.coords.iter().enumerate() {
            if !names.insert(coord.name.as_str()) {
                return Err(ScghgError::Alignment(format!(
                    "{} repeats dimension {}",
                    self.name, coord.name
                )));
            }
            if coord.len() != self.data.len_of(Axis(axis)) {
                return Err(ScghgError::Alignment(format!(
                    "coordinate {} of {} has {} labels but the axis has length {}",
                    coord.name,
                    self.name,
                    coord.len(),
                    self.data.len_of(Axis(axis))
                )));
            }
            let mut labels = HashSet::new();
            if let Some(dup) = coord.labels.iter().find(|l| !labels.insert(*l)) {
                return Err(ScghgError::Alignment(format!(
                    "coordinate {} of {} repeats label {}",
                    coord.name, self.name, dup
                )));
            }
        }
        if let Some(name) = self.scalar_coords.keys().find(|k| names.contains(k.as_str())) {
            return Err(ScghgError::Alignment(format!(
                "{} is both a dimension and a scalar coordinate of {}",
                name, self.name
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn coords(&self) -> &[Coord] {
        &self.coords
    }

    pub fn dims(&self) -> Vec<&str> {
        self.coords.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn coord(&self, dim: &str) -> Option<&Coord> {
        self.coords.iter().find(|c| c.name == dim)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.coord(dim).is_some()
    }

    pub fn scalar_coords(&self) -> &IndexMap<String, Label> {
        &self.scalar_coords
    }

    pub fn scalar_coord(&self, name: &str) -> Option<&Label> {
        self.scalar_coords.get(name)
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied()
    }

    /// The value of a zero-dimensional array
    pub fn scalar_value(&self) -> ScghgResult<f64> {
        match (self.data.ndim(), self.data.first()) {
            (0, Some(value)) => Ok(*value),
            _ => Err(ScghgError::Alignment(format!(
                "{} still has dimensions {:?}",
                self.name,
                self.dims()
            ))),
        }
    }

    fn axis_of(&self, dim: &str) -> ScghgResult<usize> {
        self.coords
            .iter()
            .position(|c| c.name == dim)
            .ok_or_else(|| {
                ScghgError::Alignment(format!(
                    "{} has no dimension {} (dimensions: {:?})",
                    self.name,
                    dim,
                    self.dims()
                ))
            })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a scalar (non-dimension) coordinate.
    pub fn with_scalar_coord(mut self, name: impl Into<String>, label: impl Into<Label>) -> Self {
        self.scalar_coords.insert(name.into(), label.into());
        self
    }

    /// Remove every trace of `name`.
    ///
    /// Scalar coordinates are dropped and length-1 dimensions are squeezed
    /// out. A dimension with more than one label cannot be stripped.
    pub fn strip_coord(mut self, name: &str) -> ScghgResult<Self> {
        self.scalar_coords.shift_remove(name);
        match self.coords.iter().position(|c| c.name == name) {
            None => Ok(self),
            Some(axis) if self.coords[axis].len() == 1 => {
                self.coords.remove(axis);
                self.data = self.data.index_axis_move(Axis(axis), 0);
                Ok(self)
            }
            Some(axis) => Err(ScghgError::Alignment(format!(
                "cannot strip dimension {} of {}: it has {} labels",
                name,
                self.name,
                self.coords[axis].len()
            ))),
        }
    }

    /// Select a single label along `dim`, dropping the dimension.
    pub fn sel(&self, dim: &str, label: &Label) -> ScghgResult<Self> {
        let axis = self.axis_of(dim)?;
        let index = self.coords[axis].position(label).ok_or_else(|| {
            ScghgError::Alignment(format!(
                "label {} not found on dimension {} of {}",
                label, dim, self.name
            ))
        })?;
        let mut coords = self.coords.clone();
        coords.remove(axis);
        Ok(Self {
            name: self.name.clone(),
            coords,
            scalar_coords: self.scalar_coords.clone(),
            data: self.data.index_axis(Axis(axis), index).to_owned(),
        })
    }

    /// Select several dimensions at once.
    pub fn select(&self, selection: &[(&str, Label)]) -> ScghgResult<Self> {
        let mut out = self.clone();
        for (dim, label) in selection {
            out = out.sel(dim, label)?;
        }
        Ok(out)
    }

    pub fn sum_over(&self, dim: &str) -> ScghgResult<Self> {
        let axis = self.axis_of(dim)?;
        Ok(self.reduced(axis, self.data.sum_axis(Axis(axis))))
    }

    pub fn mean_over(&self, dim: &str) -> ScghgResult<Self> {
        let axis = self.axis_of(dim)?;
        let data = self.data.mean_axis(Axis(axis)).ok_or_else(|| {
            ScghgError::Alignment(format!(
                "cannot average {} over empty dimension {}",
                self.name, dim
            ))
        })?;
        Ok(self.reduced(axis, data))
    }

    fn reduced(&self, axis: usize, data: ArrayD<f64>) -> Self {
        let mut coords = self.coords.clone();
        coords.remove(axis);
        Self {
            name: self.name.clone(),
            coords,
            scalar_coords: self.scalar_coords.clone(),
            data,
        }
    }

    pub fn mapv(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            name: self.name.clone(),
            coords: self.coords.clone(),
            scalar_coords: self.scalar_coords.clone(),
            data: self.data.mapv(f),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.mapv(|v| v * factor)
    }

    /// Elementwise product, `other` broadcast onto this array's dimensions.
    pub fn mul_aligned(&self, other: &LabeledArray) -> ScghgResult<Self> {
        self.zip_aligned(other, |a, b| a * b)
    }

    /// Elementwise quotient, `other` broadcast onto this array's dimensions.
    pub fn div_aligned(&self, other: &LabeledArray) -> ScghgResult<Self> {
        self.zip_aligned(other, |a, b| a / b)
    }

    fn zip_aligned(&self, other: &LabeledArray, f: impl Fn(f64, f64) -> f64) -> ScghgResult<Self> {
        let rhs = other.broadcast_onto(&self.coords)?;
        let mut data = self.data.clone();
        data.zip_mut_with(&rhs, |a, &b| *a = f(*a, b));
        Ok(Self {
            name: self.name.clone(),
            coords: self.coords.clone(),
            scalar_coords: self.scalar_coords.clone(),
            data,
        })
    }

    /// Check that every dimension of `self` appears in `target` with identical labels.
    pub fn check_aligned_with(&self, target: &LabeledArray) -> ScghgResult<()> {
        for coord in &self.coords {
            match target.coord(&coord.name) {
                None => {
                    return Err(ScghgError::Alignment(format!(
                        "dimension {} of {} is missing from {} (dimensions: {:?})",
                        coord.name,
                        self.name,
                        target.name,
                        target.dims()
                    )))
                }
                Some(other) if other.labels != coord.labels => {
                    return Err(ScghgError::Alignment(format!(
                        "coordinate {} differs between {} ({} labels) and {} ({} labels)",
                        coord.name,
                        self.name,
                        coord.len(),
                        target.name,
                        other.len()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn broadcast_onto(&self, target: &[Coord]) -> ScghgResult<ArrayD<f64>> {
        let mut placement = Vec::with_capacity(self.coords.len());
        for (axis, coord) in self.coords.iter().enumerate() {
            let target_axis = target
                .iter()
                .position(|t| t.name == coord.name)
                .ok_or_else(|| {
                    ScghgError::Alignment(format!(
                        "dimension {} of {} has no counterpart to align with",
                        coord.name, self.name
                    ))
                })?;
            if target[target_axis].labels != coord.labels {
                return Err(ScghgError::Alignment(format!(
                    "coordinate {} of {} does not match the labels it is aligned with",
                    coord.name, self.name
                )));
            }
            placement.push((target_axis, axis));
        }
        placement.sort_unstable();
        let order: Vec<usize> = placement.iter().map(|&(_, axis)| axis).collect();

        let mut view = self.data.view().permuted_axes(order);
        for (target_axis, coord) in target.iter().enumerate() {
            if !self.has_dim(&coord.name) {
                view = view.insert_axis(Axis(target_axis));
            }
        }
        let shape: Vec<usize> = target.iter().map(Coord::len).collect();
        let broadcast = view.broadcast(IxDyn(&shape)).ok_or_else(|| {
            ScghgError::Alignment(format!("{} cannot be broadcast to {:?}", self.name, shape))
        })?;
        Ok(broadcast.to_owned())
    }

    /// Replace the labels of `dim` one by one.
    pub fn relabel(
        &self,
        dim: &str,
        f: impl Fn(&Label) -> ScghgResult<Label>,
    ) -> ScghgResult<Self> {
        let axis = self.axis_of(dim)?;
        let mut coords = self.coords.clone();
        coords[axis].labels = coords[axis].labels.iter().map(f).collect::<ScghgResult<_>>()?;
        let out = Self {
            name: self.name.clone(),
            coords,
            scalar_coords: self.scalar_coords.clone(),
            data: self.data.clone(),
        };
        out.validate()?;
        Ok(out)
    }

    /// Iterate over every element with the labels addressing it.
    pub fn rows(&self) -> impl Iterator<Item = (Vec<&Label>, f64)> + '_ {
        self.data.indexed_iter().map(move |(index, value)| {
            let labels = self
                .coords
                .iter()
                .enumerate()
                .map(|(axis, coord)| &coord.labels[index[axis]])
                .collect();
            (labels, *value)
        })
    }

    pub fn read_json(path: &Path) -> ScghgResult<Self> {
        let file = File::open(path).map_err(|e| ScghgError::io(path, e))?;
        let array: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            ScghgError::Encoding {
                path: path.to_path_buf(),
                source,
            }
        })?;
        array.validate()?;
        Ok(array)
    }

    pub fn write_json(&self, path: &Path) -> ScghgResult<()> {
        let file = File::create(path).map_err(|e| ScghgError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|source| {
            ScghgError::Encoding {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

fn untagged_coords(array: &LabeledArray, tag_dims: &[&str]) -> IndexMap<String, Label> {
    array
        .scalar_coords
        .iter()
        .filter(|(name, _)| !tag_dims.contains(&name.as_str()))
        .map(|(name, label)| (name.clone(), label.clone()))
        .collect()
}

/// Concatenate tagged cells along their tag coordinates.
///
/// Each cell must carry a scalar coordinate for every entry of `tag_dims`;
/// the result has the tag dimensions first (labels in first-seen order)
/// followed by the cells' shared dimensions. Hypercube positions not covered
/// by any cell are NaN.
///
/// Fails with [`ScghgError::Alignment`] when two cells share a tag tuple,
/// when cells disagree on their dimensions, or when they carry conflicting
/// non-tag scalar coordinates.
pub fn combine_tagged(
    name: &str,
    cells: &[LabeledArray],
    tag_dims: &[&str],
) -> ScghgResult<LabeledArray> {
    let first = cells
        .first()
        .ok_or_else(|| ScghgError::Alignment(format!("no cells to combine into {}", name)))?;
    let inner = first.coords.clone();
    let shared = untagged_coords(first, tag_dims);

    let mut tag_coords: Vec<Coord> = tag_dims
        .iter()
        .map(|dim| Coord {
            name: dim.to_string(),
            labels: vec![],
        })
        .collect();
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(cells.len());

    for cell in cells {
        let mut key = Vec::with_capacity(tag_dims.len());
        for (dim, coord) in tag_dims.iter().zip(tag_coords.iter_mut()) {
            let label = cell.scalar_coord(dim).ok_or_else(|| {
                ScghgError::Alignment(format!(
                    "a cell of {} is missing tag coordinate {}",
                    name, dim
                ))
            })?;
            let index = match coord.position(label) {
                Some(index) => index,
                None => {
                    coord.labels.push(label.clone());
                    coord.labels.len() - 1
                }
            };
            key.push(index);
        }
        let tuple = describe_key(&tag_coords, &key);

        if cell.coords != inner {
            return Err(ScghgError::Alignment(format!(
                "cell {} of {} has dimensions {:?} that do not match the first cell",
                tuple,
                name,
                cell.dims()
            )));
        }
        if untagged_coords(cell, tag_dims) != shared {
            return Err(ScghgError::Alignment(format!(
                "cell {} of {} carries non-dimension coordinates {:?} that conflict with {:?}",
                tuple,
                name,
                untagged_coords(cell, tag_dims),
                shared
            )));
        }
        if !seen.insert(key.clone()) {
            return Err(ScghgError::Alignment(format!(
                "duplicate cell {} in {}",
                tuple, name
            )));
        }
        keys.push(key);
    }

    let coords: Vec<Coord> = tag_coords.into_iter().chain(inner).collect();
    let shape: Vec<usize> = coords.iter().map(Coord::len).collect();
    let mut data = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    for (cell, key) in cells.iter().zip(&keys) {
        let mut slot = data.view_mut();
        for &index in key {
            slot = slot.index_axis_move(Axis(0), index);
        }
        slot.assign(&cell.data);
    }

    let mut out = LabeledArray::new(name, coords, data)?;
    out.scalar_coords = shared;
    Ok(out)
}

fn describe_key(tag_coords: &[Coord], key: &[usize]) -> String {
    let parts: Vec<String> = tag_coords
        .iter()
        .zip(key)
        .map(|(coord, &index)| format!("{}={}", coord.name, coord.labels[index]))
        .collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn damages() -> LabeledArray {
        LabeledArray::new(
            "marginal_damages",
            vec![
                Coord::new(RUN_DIM, [1, 2]),
                Coord::new(YEAR_DIM, [2020, 2021, 2022]),
            ],
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn(),
        )
        .unwrap()
    }

    fn factors(years: [i64; 3]) -> LabeledArray {
        LabeledArray::new(
            "discount_factor",
            vec![Coord::new(YEAR_DIM, years)],
            array![1.0, 0.5, 0.25].into_dyn(),
        )
        .unwrap()
    }

    #[test]
    fn float_text() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(1.016010255), "1.016010255");
        assert_eq!(format_float(0.00461878399), "0.00461878399");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(9.149608e-05), "9.149608e-05");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(-2.5), "-2.5");
    }

    #[test]
    fn rejects_mismatched_shape() {
        let res = LabeledArray::new(
            "bad",
            vec![Coord::new(RUN_DIM, [1, 2, 3])],
            array![1.0, 2.0].into_dyn(),
        );
        assert!(matches!(res, Err(ScghgError::Alignment(_))));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let res = LabeledArray::from_vec("bad", vec![Coord::new(RUN_DIM, [1, 1])], vec![0.0, 0.0]);
        assert!(matches!(res, Err(ScghgError::Alignment(_))));
    }

    #[test]
    fn aligned_multiply_broadcasts_missing_dims() {
        let out = damages().mul_aligned(&factors([2020, 2021, 2022])).unwrap();
        assert_eq!(out.dims(), vec![RUN_DIM, YEAR_DIM]);
        assert_eq!(
            out.data(),
            &array![[1.0, 1.0, 0.75], [4.0, 2.5, 1.5]].into_dyn()
        );
    }

    #[test]
    fn aligned_multiply_handles_transposed_operand() {
        let transposed = LabeledArray::new(
            "t",
            vec![
                Coord::new(YEAR_DIM, [2020, 2021, 2022]),
                Coord::new(RUN_DIM, [1, 2]),
            ],
            array![[1.0, 10.0], [1.0, 10.0], [1.0, 10.0]].into_dyn(),
        )
        .unwrap();
        let out = damages().mul_aligned(&transposed).unwrap();
        assert_eq!(
            out.data(),
            &array![[1.0, 2.0, 3.0], [40.0, 50.0, 60.0]].into_dyn()
        );
    }

    #[test]
    fn aligned_multiply_rejects_label_mismatch() {
        let res = damages().mul_aligned(&factors([2021, 2022, 2023]));
        assert!(matches!(res, Err(ScghgError::Alignment(_))));
    }

    #[test]
    fn aligned_multiply_rejects_unknown_dim() {
        let other =
            LabeledArray::from_vec("x", vec![Coord::new(GAS_DIM, ["CH4"])], vec![1.0]).unwrap();
        assert!(damages().mul_aligned(&other).is_err());
    }

    #[test]
    fn reductions() {
        let summed = damages().sum_over(YEAR_DIM).unwrap();
        assert_eq!(summed.data(), &array![6.0, 15.0].into_dyn());
        let mean = damages().mean_over(RUN_DIM).unwrap();
        assert_eq!(mean.data(), &array![2.5, 3.5, 4.5].into_dyn());
        assert_eq!(mean.dims(), vec![YEAR_DIM]);
    }

    #[test]
    fn sel_drops_dimension() {
        let out = damages().sel(YEAR_DIM, &Label::Int(2021)).unwrap();
        assert_eq!(out.dims(), vec![RUN_DIM]);
        assert_eq!(out.data(), &array![2.0, 5.0].into_dyn());
        assert!(damages().sel(YEAR_DIM, &Label::Int(1999)).is_err());
    }

    #[test]
    fn strip_coord_squeezes_singletons() {
        let arr = LabeledArray::from_vec(
            "x",
            vec![Coord::new("simulation", [0]), Coord::new(RUN_DIM, [1, 2])],
            vec![1.0, 2.0],
        )
        .unwrap()
        .with_scalar_coord("model", "fair");
        let stripped = arr.strip_coord("simulation").unwrap().strip_coord("model").unwrap();
        assert_eq!(stripped.dims(), vec![RUN_DIM]);
        assert!(stripped.scalar_coords().is_empty());

        assert!(damages().strip_coord(RUN_DIM).is_err());
    }

    fn cell(label: &str, sector: &str, value: f64) -> LabeledArray {
        LabeledArray::from_vec(
            "scghg",
            vec![Coord::new(GAS_DIM, ["CH4", "N2O"])],
            vec![value, value * 2.0],
        )
        .unwrap()
        .with_scalar_coord("discount_rate", label)
        .with_scalar_coord("sector", sector)
    }

    #[test]
    fn combine_tagged_builds_hypercube() {
        let cells = vec![
            cell("2.0%", "combined", 1.0),
            cell("2.0%", "coastal", 2.0),
            cell("2.5%", "combined", 3.0),
            cell("2.5%", "coastal", 4.0),
        ];
        let out = combine_tagged("scghg", &cells, &["discount_rate", "sector"]).unwrap();
        assert_eq!(out.dims(), vec!["discount_rate", "sector", GAS_DIM]);
        let slice = out
            .select(&[("discount_rate", "2.5%".into()), ("sector", "coastal".into())])
            .unwrap();
        assert_eq!(slice.data(), &array![4.0, 8.0].into_dyn());
    }

    #[test]
    fn combine_tagged_rejects_duplicates() {
        let cells = vec![cell("2.0%", "combined", 1.0), cell("2.0%", "combined", 2.0)];
        let res = combine_tagged("scghg", &cells, &["discount_rate", "sector"]);
        assert!(matches!(res, Err(ScghgError::Alignment(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn combine_tagged_rejects_stray_coordinates() {
        let cells = vec![
            cell("2.0%", "combined", 1.0).with_scalar_coord("simulation", 1),
            cell("2.5%", "combined", 2.0).with_scalar_coord("simulation", 2),
        ];
        let res = combine_tagged("scghg", &cells, &["discount_rate", "sector"]);
        assert!(matches!(res, Err(ScghgError::Alignment(_))));
    }

    #[test]
    fn combine_tagged_fills_gaps_with_nan() {
        let cells = vec![cell("2.0%", "combined", 1.0), cell("2.5%", "coastal", 2.0)];
        let out = combine_tagged("scghg", &cells, &["discount_rate", "sector"]).unwrap();
        let gap = out
            .select(&[("discount_rate", "2.0%".into()), ("sector", "coastal".into())])
            .unwrap();
        assert!(gap.values().all(f64::is_nan));
    }

    #[test]
    fn json_roundtrip_preserves_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("damages.json");
        let arr = damages().with_scalar_coord("pulse_year", 2020);
        arr.write_json(&path).unwrap();
        assert_eq!(LabeledArray::read_json(&path).unwrap(), arr);
    }
}
