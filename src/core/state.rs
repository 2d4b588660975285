// src/core/state.rs

use super::error::{QregError, RegisterId, Result};
use num_complex::Complex;
use num_traits::Zero;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Ordered list of the live registers, i.e. the columns of every branch
/// tuple, with a reverse index from register to column position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnIndex {
    ids: Vec<RegisterId>,
    positions: HashMap<RegisterId, usize>,
}

impl ColumnIndex {
    /// Builds an index with the given column order.
    pub fn from_ids(ids: &[RegisterId]) -> Self {
        let mut index = Self::default();
        for id in ids {
            index.push(*id);
        }
        index
    }

    /// Column position of `id`, if the register is live.
    pub fn position(&self, id: RegisterId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Live registers in column order.
    pub fn ids(&self) -> &[RegisterId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: RegisterId) -> bool {
        self.positions.contains_key(&id)
    }

    fn push(&mut self, id: RegisterId) {
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
    }

    fn remove(&mut self, id: RegisterId) -> Option<usize> {
        let pos = self.positions.remove(&id)?;
        self.ids.remove(pos);
        for later in &self.ids[pos..] {
            if let Some(p) = self.positions.get_mut(later) {
                *p -= 1;
            }
        }
        Some(pos)
    }
}

/// Read-only view of one branch: the value of every live register.
#[derive(Debug, Clone, Copy)]
pub struct BranchView<'a> {
    columns: &'a ColumnIndex,
    values: &'a [i64],
}

impl<'a> BranchView<'a> {
    pub fn new(columns: &'a ColumnIndex, values: &'a [i64]) -> Self {
        Self { columns, values }
    }

    /// Value held by register `id` in this branch.
    ///
    /// # Errors
    /// `QregError::InvalidOperation` if `id` is not a live register.
    pub fn value(&self, id: RegisterId) -> Result<i64> {
        self.columns
            .position(id)
            .map(|pos| self.values[pos])
            .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))
    }

    /// All values in column order.
    pub fn values(&self) -> &'a [i64] {
        self.values
    }

    pub fn columns(&self) -> &'a ColumnIndex {
        self.columns
    }
}

/// New branches produced from one controlled branch by a local transform.
pub type BranchImages = Vec<(Vec<i64>, Complex<f64>)>;

/// The joint quantum state of every live register.
///
/// Represented as a sparse map from the full assignment tuple (one value per
/// live register, in column order) to its complex amplitude. Assignments
/// that are absent have amplitude zero. The store starts as the single empty
/// assignment with amplitude 1.
///
/// Invariant: the squared amplitudes sum to 1, except transiently inside
/// postselection between projection and rescaling.
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeStore {
    columns: ColumnIndex,
    branches: BTreeMap<Vec<i64>, Complex<f64>>,
}

impl Default for AmplitudeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AmplitudeStore {
    /// Creates the state with no registers and amplitude 1.
    pub fn new() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(Vec::new(), Complex::new(1.0, 0.0));
        Self {
            columns: ColumnIndex::default(),
            branches,
        }
    }

    /// The live registers and their column order.
    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    /// Number of stored branches (non-zero amplitudes).
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Iterates over every branch with its amplitude, in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (BranchView<'_>, Complex<f64>)> {
        self.branches
            .iter()
            .map(move |(values, amp)| (BranchView::new(&self.columns, values), *amp))
    }

    /// Amplitude of the given full assignment (zero if absent).
    pub fn amplitude(&self, values: &[i64]) -> Complex<f64> {
        self.branches.get(values).copied().unwrap_or_else(Complex::zero)
    }

    /// Sum of squared magnitudes over all branches.
    pub fn norm_sqr(&self) -> f64 {
        self.branches.values().map(|a| a.norm_sqr()).sum()
    }

    /// Adds register `id` as a new column, tensoring the given distribution
    /// into every existing branch.
    ///
    /// The coefficients are normalized before use, so any non-zero
    /// distribution keeps the store normalized.
    ///
    /// # Errors
    /// * `QregError::Dimension` if the distribution is empty, repeats a value
    ///   or has zero norm.
    /// * `QregError::InvalidOperation` if `id` is already live.
    pub fn allocate(&mut self, id: RegisterId, distribution: &[(i64, Complex<f64>)]) -> Result<()> {
        if self.columns.contains(id) {
            return Err(QregError::invalid(format!("register {} is already allocated", id)));
        }
        let coefficients = normalized_distribution(distribution)?;

        let mut next = BTreeMap::new();
        for (values, amp) in &self.branches {
            for (value, c) in &coefficients {
                let weighted = amp * c;
                if weighted.is_zero() {
                    continue;
                }
                let mut extended = Vec::with_capacity(values.len() + 1);
                extended.extend_from_slice(values);
                extended.push(*value);
                next.insert(extended, weighted);
            }
        }
        self.columns.push(id);
        self.branches = next;
        Ok(())
    }

    /// Applies a local transform to every branch where `predicate` holds and
    /// copies every other branch unchanged.
    ///
    /// `transform` maps one branch to its images (new assignments with their
    /// amplitudes). Images landing on the same assignment are summed, which
    /// is where interference happens. Merged images whose modulus is at or
    /// below `prune_threshold` are dropped. Branches outside the predicate
    /// are moved across untouched, so their amplitudes stay bit-identical.
    ///
    /// With the `parallel` feature, branch evaluation is sharded over rayon
    /// once the store holds at least `parallel_threshold` branches. The merge
    /// is sequential, and nothing is committed unless every branch succeeds.
    pub fn apply_local<P, F>(
        &mut self,
        predicate: P,
        transform: F,
        prune_threshold: Option<f64>,
        parallel_threshold: usize,
    ) -> Result<()>
    where
        P: Fn(&BranchView<'_>) -> Result<bool> + Sync,
        F: Fn(&BranchView<'_>, Complex<f64>) -> Result<BranchImages> + Sync,
    {
        let columns = &self.columns;
        let map_one = |(values, amp): (&Vec<i64>, &Complex<f64>)| -> Result<Option<BranchImages>> {
            let view = BranchView::new(columns, values);
            if predicate(&view)? {
                Ok(Some(transform(&view, *amp)?))
            } else {
                Ok(None)
            }
        };

        let mapped: Vec<Option<BranchImages>> = shard_map(&self.branches, parallel_threshold, map_one)?;

        let mut next: BTreeMap<Vec<i64>, Complex<f64>> = BTreeMap::new();
        let mut touched: Vec<Vec<i64>> = Vec::new();
        let old = std::mem::take(&mut self.branches);
        for ((values, amp), images) in old.into_iter().zip(mapped) {
            match images {
                None => accumulate(&mut next, values, amp),
                Some(images) => {
                    for (image, image_amp) in images {
                        debug_assert_eq!(image.len(), self.columns.len());
                        if prune_threshold.is_some() {
                            touched.push(image.clone());
                        }
                        accumulate(&mut next, image, image_amp);
                    }
                }
            }
        }

        if let Some(threshold) = prune_threshold {
            for key in touched {
                if next.get(&key).is_some_and(|a| a.norm() <= threshold) {
                    next.remove(&key);
                }
            }
        }

        self.branches = next;
        Ok(())
    }

    /// Total probability of the branches satisfying `predicate`, in `[0, 1]`.
    pub fn total_probability<P>(&self, predicate: P) -> Result<f64>
    where
        P: Fn(&BranchView<'_>) -> Result<bool>,
    {
        let mut total = 0.0;
        for (values, amp) in &self.branches {
            if predicate(&BranchView::new(&self.columns, values))? {
                total += amp.norm_sqr();
            }
        }
        Ok(total.clamp(0.0, 1.0))
    }

    /// Drops every branch violating `predicate` and multiplies the survivors
    /// by `factor`.
    pub(crate) fn retain_scaled<P>(&mut self, predicate: P, factor: f64) -> Result<()>
    where
        P: Fn(&BranchView<'_>) -> Result<bool>,
    {
        let mut next = BTreeMap::new();
        for (values, amp) in &self.branches {
            if predicate(&BranchView::new(&self.columns, values))? {
                next.insert(values.clone(), amp * factor);
            }
        }
        self.branches = next;
        Ok(())
    }

    /// Removes register `id` after checking that it is redundant: within
    /// every group of branches that agree on the remaining registers, all
    /// branches with modulus above `tolerance` hold the same value for `id`.
    ///
    /// Negligible branches are discarded along with the column.
    ///
    /// # Errors
    /// `QregError::Entanglement` if the check fails, in which case the store
    /// is left unchanged. `QregError::InvalidOperation` if `id` is not live.
    pub fn dispose(&mut self, id: RegisterId, tolerance: f64) -> Result<()> {
        let pos = self
            .columns
            .position(id)
            .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))?;

        let mut next: BTreeMap<Vec<i64>, Complex<f64>> = BTreeMap::new();
        let mut seen: HashMap<Vec<i64>, i64> = HashMap::new();
        for (values, amp) in &self.branches {
            if amp.norm() <= tolerance {
                continue;
            }
            let mut rest = values.clone();
            let value = rest.remove(pos);
            // Full assignments are unique, so a repeated remainder always differs in `id`.
            if let Some(existing) = seen.insert(rest.clone(), value) {
                return Err(QregError::entanglement(
                    id,
                    format!(
                        "register holds both {} and {} for the same values of the remaining registers",
                        existing, value
                    ),
                ));
            }
            next.insert(rest, *amp);
        }

        self.columns.remove(id);
        self.branches = next;
        Ok(())
    }

    /// Resets register `id` to 0 in every branch where `predicate` holds.
    ///
    /// Controlled branches are grouped by their values for the other
    /// registers, and `reduce` maps each group (the branch view with `id` set
    /// to 0, plus the `(value, amplitude)` pairs of its members) to the
    /// amplitude left on the zero assignment, or `None` to drop it. The
    /// predicate must not read `id`. Other branches are copied unchanged.
    pub(crate) fn collapse_column<P, F>(&mut self, id: RegisterId, predicate: P, mut reduce: F) -> Result<()>
    where
        P: Fn(&BranchView<'_>) -> Result<bool>,
        F: FnMut(&BranchView<'_>, &[(i64, Complex<f64>)]) -> Result<Option<Complex<f64>>>,
    {
        self.regroup_column(id, predicate, |b, members| {
            Ok(reduce(b, members)?.map(|amp| (0, amp)).into_iter().collect())
        })
    }

    /// Groups the branches where `predicate` holds by their values for every
    /// register except `id`, and replaces each group by the `(value,
    /// amplitude)` pairs `rewrite` returns for it. Group keys carry 0 in the
    /// column of `id`.
    pub(crate) fn regroup_column<P, F>(&mut self, id: RegisterId, predicate: P, mut rewrite: F) -> Result<()>
    where
        P: Fn(&BranchView<'_>) -> Result<bool>,
        F: FnMut(&BranchView<'_>, &[(i64, Complex<f64>)]) -> Result<Vec<(i64, Complex<f64>)>>,
    {
        let pos = self
            .columns
            .position(id)
            .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))?;

        let mut next: BTreeMap<Vec<i64>, Complex<f64>> = BTreeMap::new();
        let mut groups: BTreeMap<Vec<i64>, Vec<(i64, Complex<f64>)>> = BTreeMap::new();
        for (values, amp) in &self.branches {
            if predicate(&BranchView::new(&self.columns, values))? {
                let mut key = values.clone();
                let value = std::mem::replace(&mut key[pos], 0);
                groups.entry(key).or_default().push((value, *amp));
            } else {
                next.insert(values.clone(), *amp);
            }
        }

        for (mut key, members) in groups {
            for (value, amp) in rewrite(&BranchView::new(&self.columns, &key), &members)? {
                if amp.is_zero() {
                    continue;
                }
                key[pos] = value;
                accumulate(&mut next, key.clone(), amp);
            }
        }

        self.branches = next;
        Ok(())
    }

    /// Every branch grouped as [`regroup_column`](Self::regroup_column) would
    /// group it, without changing the store.
    pub(crate) fn column_groups(&self, id: RegisterId) -> Result<BTreeMap<Vec<i64>, Vec<(i64, Complex<f64>)>>> {
        let pos = self
            .columns
            .position(id)
            .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))?;
        let mut groups: BTreeMap<Vec<i64>, Vec<(i64, Complex<f64>)>> = BTreeMap::new();
        for (values, amp) in &self.branches {
            let mut key = values.clone();
            let value = std::mem::replace(&mut key[pos], 0);
            groups.entry(key).or_default().push((value, *amp));
        }
        Ok(groups)
    }

    /// Removes register `id`, which must hold 0 in every branch whose
    /// modulus exceeds `tolerance`.
    ///
    /// # Errors
    /// `QregError::Entanglement` if some branch holds another value.
    pub(crate) fn release_zero(&mut self, id: RegisterId, tolerance: f64) -> Result<()> {
        let pos = self
            .columns
            .position(id)
            .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))?;
        if let Some(values) = self
            .branches
            .iter()
            .find(|(values, amp)| values[pos] != 0 && amp.norm() > tolerance)
            .map(|(values, _)| values)
        {
            return Err(QregError::entanglement(
                id,
                format!("register still holds {} in a branch with non-zero amplitude", values[pos]),
            ));
        }
        self.dispose(id, tolerance)
    }

    /// Marginal distribution of the given registers, summing out the rest.
    pub fn marginal(&self, ids: &[RegisterId]) -> Result<BTreeMap<Vec<i64>, f64>> {
        let positions = ids
            .iter()
            .map(|id| {
                self.columns
                    .position(*id)
                    .ok_or_else(|| QregError::invalid(format!("register {} is not live", id)))
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut out = BTreeMap::new();
        for (values, amp) in &self.branches {
            let key: Vec<i64> = positions.iter().map(|p| values[*p]).collect();
            *out.entry(key).or_insert(0.0) += amp.norm_sqr();
        }
        Ok(out)
    }

    /// Drops branches whose modulus is at or below `threshold`. Does not
    /// renormalize.
    pub fn prune(&mut self, threshold: f64) {
        self.branches.retain(|_, amp| amp.norm() > threshold);
    }
}

impl fmt::Display for AmplitudeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amplitudes[")?;
        for (i, (values, amp)) in self.branches.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "|")?;
            for (j, (id, v)) in self.columns.ids().iter().zip(values).enumerate() {
                write!(f, "{}{}={}", if j > 0 { " " } else { "" }, id, v)?;
            }
            write!(f, "> {:.4}", amp)?;
        }
        write!(f, "]")
    }
}

fn accumulate(map: &mut BTreeMap<Vec<i64>, Complex<f64>>, key: Vec<i64>, amp: Complex<f64>) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(amp);
        }
        Entry::Occupied(mut slot) => {
            *slot.get_mut() += amp;
        }
    }
}

#[cfg(feature = "parallel")]
fn shard_map<T, M>(branches: &BTreeMap<Vec<i64>, Complex<f64>>, threshold: usize, map_one: M) -> Result<Vec<T>>
where
    T: Send,
    M: Fn((&Vec<i64>, &Complex<f64>)) -> Result<T> + Sync,
{
    if branches.len() >= threshold {
        let entries: Vec<(&Vec<i64>, &Complex<f64>)> = branches.iter().collect();
        entries.into_par_iter().map(&map_one).collect()
    } else {
        branches.iter().map(map_one).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn shard_map<T, M>(branches: &BTreeMap<Vec<i64>, Complex<f64>>, _threshold: usize, map_one: M) -> Result<Vec<T>>
where
    M: Fn((&Vec<i64>, &Complex<f64>)) -> Result<T>,
{
    branches.iter().map(map_one).collect()
}

/// Validates a value distribution and scales it to unit norm.
pub(crate) fn normalized_distribution(distribution: &[(i64, Complex<f64>)]) -> Result<Vec<(i64, Complex<f64>)>> {
    if distribution.is_empty() {
        return Err(QregError::dimension("register distribution is empty"));
    }
    let mut seen = std::collections::HashSet::with_capacity(distribution.len());
    for (value, _) in distribution {
        if !seen.insert(*value) {
            return Err(QregError::dimension(format!("value {} appears more than once in the distribution", value)));
        }
    }
    let norm = distribution.iter().map(|(_, c)| c.norm_sqr()).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < f64::EPSILON {
        return Err(QregError::dimension(format!("distribution has norm {}", norm)));
    }
    Ok(distribution.iter().map(|(v, c)| (*v, c / norm)).collect())
}
