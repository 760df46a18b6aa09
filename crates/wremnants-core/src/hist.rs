use serde::{Deserialize, Serialize};

use crate::{
    utils::{get_bin_edges, get_bin_index, index_product},
    WremError, WremResult,
};

/// The binning of an [`Axis`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Binning {
    /// `bins` evenly spaced bins over `[lo, hi)`.
    Regular { bins: usize, lo: f64, hi: f64 },
    /// Bins given by strictly increasing edges.
    Variable { edges: Vec<f64> },
    /// One bin per integer in `[lo, hi)`.
    Integer { lo: i64, hi: i64 },
}

/// A named histogram axis with optional underflow and overflow bins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    name: String,
    binning: Binning,
    underflow: bool,
    overflow: bool,
}

impl Axis {
    /// A regular axis with `bins` bins between `lo` and `hi`, with underflow and overflow.
    pub fn regular(name: &str, bins: usize, lo: f64, hi: f64) -> WremResult<Self> {
        if bins == 0 || !(lo < hi) {
            return Err(WremError::InvalidAxis {
                name: name.to_string(),
                reason: format!("cannot build {bins} bins over [{lo}, {hi})"),
            });
        }
        Ok(Self {
            name: name.to_string(),
            binning: Binning::Regular { bins, lo, hi },
            underflow: true,
            overflow: true,
        })
    }

    /// A variable-width axis from bin edges, with underflow and overflow.
    pub fn variable(name: &str, edges: &[f64]) -> WremResult<Self> {
        if edges.len() < 2 || edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(WremError::InvalidAxis {
                name: name.to_string(),
                reason: "edges must be strictly increasing with at least two entries".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            binning: Binning::Variable {
                edges: edges.to_vec(),
            },
            underflow: true,
            overflow: true,
        })
    }

    /// An integer axis over `[lo, hi)`, with underflow and overflow.
    pub fn integer(name: &str, lo: i64, hi: i64) -> WremResult<Self> {
        if lo >= hi {
            return Err(WremError::InvalidAxis {
                name: name.to_string(),
                reason: format!("empty integer range [{lo}, {hi})"),
            });
        }
        if hi.checked_sub(lo).is_none() {
            return Err(WremError::InvalidAxis {
                name: name.to_string(),
                reason: format!("integer range [{lo}, {hi}) is too wide"),
            });
        }
        Ok(Self {
            name: name.to_string(),
            binning: Binning::Integer { lo, hi },
            underflow: true,
            overflow: true,
        })
    }

    pub fn with_underflow(mut self, underflow: bool) -> Self {
        self.underflow = underflow;
        self
    }

    pub fn with_overflow(mut self, overflow: bool) -> Self {
        self.overflow = overflow;
        self
    }

    /// Drop both flow bins.
    pub fn without_flow(self) -> Self {
        self.with_underflow(false).with_overflow(false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    pub fn has_underflow(&self) -> bool {
        self.underflow
    }

    pub fn has_overflow(&self) -> bool {
        self.overflow
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        match &self.binning {
            Binning::Regular { bins, .. } => *bins,
            Binning::Variable { edges } => edges.len() - 1,
            // the range fits in an i64, checked on construction
            Binning::Integer { lo, hi } => hi.abs_diff(*lo) as usize,
        }
    }

    /// Number of stored bins, including flow bins.
    pub fn extent(&self) -> usize {
        self.n_bins() + self.underflow as usize + self.overflow as usize
    }

    pub fn edges(&self) -> Vec<f64> {
        match &self.binning {
            Binning::Regular { bins, lo, hi } => get_bin_edges(*bins, (*lo, *hi)),
            Binning::Variable { edges } => edges.clone(),
            Binning::Integer { lo, hi } => (*lo..=*hi).map(|i| i as f64).collect(),
        }
    }

    /// The storage index of `value`, or `None` if it falls into a flow bin the axis does not
    /// have. NaN goes to the overflow bin.
    pub fn index(&self, value: f64) -> Option<usize> {
        let offset = self.underflow as usize;
        let n = self.n_bins();
        let (lo, hi) = match &self.binning {
            Binning::Regular { lo, hi, .. } => (*lo, *hi),
            Binning::Variable { edges } => (edges[0], edges[n]),
            Binning::Integer { lo, hi } => (*lo as f64, *hi as f64),
        };
        if value.is_nan() || value >= hi {
            return self.overflow.then_some(offset + n);
        }
        if value < lo {
            return self.underflow.then_some(0);
        }
        let bin = match &self.binning {
            Binning::Regular { bins, lo, hi } => get_bin_index(value, *bins, (*lo, *hi))?,
            Binning::Variable { edges } => edges.partition_point(|&e| e <= value) - 1,
            Binning::Integer { lo, .. } => {
                ((value.floor() as i64).saturating_sub(*lo) as usize).min(n - 1)
            }
        };
        Some(offset + bin)
    }

    /// Storage indices of the in-range bins.
    pub fn in_range(&self) -> std::ops::Range<usize> {
        let offset = self.underflow as usize;
        offset..offset + self.n_bins()
    }

    fn same_binning(&self, other: &Self) -> bool {
        self.binning == other.binning
            && self.underflow == other.underflow
            && self.overflow == other.overflow
    }
}

fn strides(extents: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; extents.len()];
    for i in (0..extents.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * extents[i + 1];
    }
    strides
}

fn unravel(mut flat: usize, extents: &[usize], out: &mut [usize]) {
    for i in (0..extents.len()).rev() {
        out[i] = flat % extents[i];
        flat /= extents[i];
    }
}

/// A weighted N-dimensional histogram.
///
/// Bin contents are stored row-major over all axes, including flow bins, together with the sum of
/// squared weights for each bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hist {
    name: String,
    axes: Vec<Axis>,
    values: Vec<f64>,
    variances: Vec<f64>,
}

impl Hist {
    pub fn new(name: &str, axes: Vec<Axis>) -> WremResult<Self> {
        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].iter().any(|a| a.name == axis.name) {
                return Err(WremError::InvalidAxis {
                    name: axis.name.clone(),
                    reason: format!("axis name repeated in histogram \"{name}\""),
                });
            }
        }
        let size = axes.iter().map(|a| a.extent()).product();
        Ok(Self {
            name: name.to_string(),
            axes,
            values: vec![0.0; size],
            variances: vec![0.0; size],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis_names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name()).collect()
    }

    pub fn axis_position(&self, name: &str) -> WremResult<usize> {
        self.axes
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| WremError::UnknownAxis {
                hist: self.name.clone(),
                axis: name.to_string(),
            })
    }

    pub fn axis(&self, name: &str) -> WremResult<&Axis> {
        Ok(&self.axes[self.axis_position(name)?])
    }

    fn extents(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.extent()).collect()
    }

    /// Flat storage index of a set of coordinates, or `None` if one of them is out of range.
    fn locate(&self, coords: &[f64]) -> Option<usize> {
        let mut flat = 0;
        for (axis, &value) in self.axes.iter().zip(coords) {
            flat = flat * axis.extent() + axis.index(value)?;
        }
        Some(flat)
    }

    fn check_arity(&self, n: usize) -> WremResult<()> {
        if n != self.axes.len() {
            return Err(WremError::LengthMismatch {
                context: format!("coordinates of \"{}\"", self.name),
                expected: self.axes.len(),
                actual: n,
            });
        }
        Ok(())
    }

    /// Add `weight` at `coords`. Values falling into missing flow bins are dropped.
    pub fn fill(&mut self, coords: &[f64], weight: f64) -> WremResult<()> {
        self.check_arity(coords.len())?;
        if let Some(i) = self.locate(coords) {
            self.values[i] += weight;
            self.variances[i] += weight * weight;
        }
        Ok(())
    }

    /// Fill the trailing tensor axes at once: `coords` gives the leading axes and `weights` holds one
    /// weight per bin of the trailing axes, in row-major order.
    pub fn fill_tensor(&mut self, coords: &[f64], weights: &[f64]) -> WremResult<()> {
        let n_lead = coords.len();
        if n_lead > self.axes.len() {
            return self.check_arity(n_lead);
        }
        let block: usize = self.axes[n_lead..].iter().map(|a| a.extent()).product();
        if weights.len() != block {
            return Err(WremError::LengthMismatch {
                context: format!("tensor weights of \"{}\"", self.name),
                expected: block,
                actual: weights.len(),
            });
        }
        let mut flat = 0;
        for (axis, &value) in self.axes[..n_lead].iter().zip(coords) {
            match axis.index(value) {
                Some(i) => flat = flat * axis.extent() + i,
                None => return Ok(()),
            }
        }
        let start = flat * block;
        for (k, &w) in weights.iter().enumerate() {
            self.values[start + k] += w;
            self.variances[start + k] += w * w;
        }
        Ok(())
    }

    /// All stored values, including flow bins.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Sum of all bins, optionally including flow bins.
    pub fn sum(&self, flow: bool) -> f64 {
        if flow {
            return self.values.iter().sum();
        }
        self.unrolled(false).iter().sum()
    }

    /// Values flattened row-major, optionally dropping flow bins.
    pub fn unrolled(&self, flow: bool) -> Vec<f64> {
        self.unrolled_storage(&self.values, flow)
    }

    pub fn unrolled_variances(&self, flow: bool) -> Vec<f64> {
        self.unrolled_storage(&self.variances, flow)
    }

    fn unrolled_storage(&self, storage: &[f64], flow: bool) -> Vec<f64> {
        if flow {
            return storage.to_vec();
        }
        let extents = self.extents();
        let mut idx = vec![0; extents.len()];
        storage
            .iter()
            .enumerate()
            .filter_map(|(flat, &v)| {
                unravel(flat, &extents, &mut idx);
                self.axes
                    .iter()
                    .zip(&idx)
                    .all(|(axis, i)| axis.in_range().contains(i))
                    .then_some(v)
            })
            .collect()
    }

    /// Multiply every bin by `factor` (variances by `factor²`).
    pub fn scale(&mut self, factor: f64) {
        self.values.iter_mut().for_each(|v| *v *= factor);
        self.variances
            .iter_mut()
            .for_each(|v| *v *= factor * factor);
    }

    fn check_compatible(&self, other: &Self) -> WremResult<()> {
        if self.axes.len() != other.axes.len()
            || self
                .axes
                .iter()
                .zip(&other.axes)
                .any(|(a, b)| a.name != b.name || !a.same_binning(b))
        {
            return Err(WremError::IncompatibleHistograms {
                left: self.name.clone(),
                right: other.name.clone(),
            });
        }
        Ok(())
    }

    /// Add the contents of `other`, which must have identical axes.
    pub fn add(&mut self, other: &Self) -> WremResult<()> {
        self.check_compatible(other)?;
        self.values
            .iter_mut()
            .zip(&other.values)
            .for_each(|(a, b)| *a += b);
        self.variances
            .iter_mut()
            .zip(&other.variances)
            .for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// Subtract the contents of `other`; variances still add.
    pub fn subtract(&mut self, other: &Self) -> WremResult<()> {
        self.check_compatible(other)?;
        self.values
            .iter_mut()
            .zip(&other.values)
            .for_each(|(a, b)| *a -= b);
        self.variances
            .iter_mut()
            .zip(&other.variances)
            .for_each(|(a, b)| *a += b);
        Ok(())
    }

    /// Sum over every axis not listed, keeping the listed axes in the given order.
    pub fn project(&self, names: &[&str]) -> WremResult<Self> {
        let keep: Vec<usize> = names
            .iter()
            .map(|n| self.axis_position(n))
            .collect::<WremResult<_>>()?;
        let axes: Vec<Axis> = keep.iter().map(|&i| self.axes[i].clone()).collect();
        let mut out = Hist::new(&self.name, axes)?;
        let out_extents = out.extents();
        let out_strides = strides(&out_extents);
        let extents = self.extents();
        let mut idx = vec![0; extents.len()];
        for flat in 0..self.values.len() {
            unravel(flat, &extents, &mut idx);
            let target: usize = keep
                .iter()
                .zip(&out_strides)
                .map(|(&axis, stride)| idx[axis] * stride)
                .sum();
            out.values[target] += self.values[flat];
            out.variances[target] += self.variances[flat];
        }
        Ok(out)
    }

    /// Fix the given axes to storage indices and drop them.
    pub fn slice(&self, fixed: &[(&str, usize)]) -> WremResult<Self> {
        let fixed: Vec<(usize, usize)> = fixed
            .iter()
            .map(|(name, i)| Ok((self.axis_position(name)?, *i)))
            .collect::<WremResult<_>>()?;
        let axes: Vec<Axis> = self
            .axes
            .iter()
            .enumerate()
            .filter(|(i, _)| !fixed.iter().any(|(f, _)| f == i))
            .map(|(_, a)| a.clone())
            .collect();
        let mut out = Hist::new(&self.name, axes)?;
        let extents = self.extents();
        let mut idx = vec![0; extents.len()];
        let mut target = 0;
        for flat in 0..self.values.len() {
            unravel(flat, &extents, &mut idx);
            if fixed.iter().all(|&(axis, i)| idx[axis] == i) {
                out.values[target] = self.values[flat];
                out.variances[target] = self.variances[flat];
                target += 1;
            }
        }
        Ok(out)
    }

    /// One histogram per combination of in-range bins of the given axes, in row-major order of
    /// those axes. Each histogram has the split axes removed.
    pub fn split_axes(&self, names: &[&str]) -> WremResult<Vec<(Vec<usize>, Hist)>> {
        let axes: Vec<&Axis> = names
            .iter()
            .map(|n| self.axis(n))
            .collect::<WremResult<_>>()?;
        let extents: Vec<usize> = axes.iter().map(|a| a.n_bins()).collect();
        index_product(&extents)
            .into_iter()
            .map(|combo| {
                let fixed: Vec<(&str, usize)> = names
                    .iter()
                    .zip(&axes)
                    .zip(&combo)
                    .map(|((name, axis), &i)| (*name, axis.in_range().start + i))
                    .collect();
                Ok((combo, self.slice(&fixed)?))
            })
            .collect()
    }

    /// Replicate this histogram along the axes of `target` it does not have.
    ///
    /// Every axis of `self` must appear in `target` with the same binning.
    pub fn broadcast_like(&self, target: &Hist) -> WremResult<Self> {
        let mut positions = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            let pos = target.axis_position(&axis.name)?;
            if !axis.same_binning(&target.axes[pos]) {
                return Err(WremError::IncompatibleHistograms {
                    left: self.name.clone(),
                    right: target.name.clone(),
                });
            }
            positions.push(pos);
        }
        let mut out = Hist::new(&self.name, target.axes.clone())?;
        let extents = out.extents();
        let own_strides = strides(&self.extents());
        let mut idx = vec![0; extents.len()];
        for flat in 0..out.values.len() {
            unravel(flat, &extents, &mut idx);
            let source: usize = positions
                .iter()
                .zip(&own_strides)
                .map(|(&pos, stride)| idx[pos] * stride)
                .sum();
            out.values[flat] = self.values[source];
            out.variances[flat] = self.variances[source];
        }
        Ok(out)
    }

    /// Reflect this variation about `nominal`: `2·nominal − self`.
    pub fn mirror(&self, nominal: &Hist) -> WremResult<Self> {
        let nominal = if nominal.axes.len() == self.axes.len() {
            nominal.clone()
        } else {
            nominal.broadcast_like(self)?
        };
        self.check_compatible(&nominal)?;
        let mut out = self.clone();
        out.values
            .iter_mut()
            .zip(&nominal.values)
            .for_each(|(v, n)| *v = 2.0 * n - *v);
        Ok(out)
    }
}
