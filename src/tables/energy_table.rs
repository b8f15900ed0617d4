use ndarray::{ArrayD, IxDyn};

use crate::error::{MapError, MapResult};

// Strides for flat indexing with the last variable varying fastest
pub fn row_major_strides(cardinalities: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; cardinalities.len()];
    for index in (0..cardinalities.len().saturating_sub(1)).rev() {
        strides[index] = strides[index + 1] * cardinalities[index + 1];
    }
    strides
}

/// Dense table over all joint states of a factor scope.
///
/// Entries are stored in standard (row-major) layout: the flat index of a
/// labeling `(x_0, ..., x_{k-1})` is `sum_i x_i * stride_i`, so the last
/// scope variable varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyTable {
    values: ArrayD<f64>,
    strides: Vec<usize>,
}

impl EnergyTable {
    // Creates a table from values listed in row-major order
    pub fn from_vec(cardinalities: &[usize], values: Vec<f64>) -> MapResult<Self> {
        let expected: usize = cardinalities.iter().product();
        let actual = values.len();
        if actual != expected {
            return Err(MapError::Shape { expected, actual });
        }
        let values = ArrayD::from_shape_vec(IxDyn(cardinalities), values)
            .map_err(|_| MapError::Shape { expected, actual })?;

        Ok(EnergyTable {
            values,
            strides: row_major_strides(cardinalities),
        })
    }

    pub fn zeros(cardinalities: &[usize]) -> Self {
        EnergyTable {
            values: ArrayD::zeros(IxDyn(cardinalities)),
            strides: row_major_strides(cardinalities),
        }
    }

    pub fn cardinalities(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn arity(&self) -> usize {
        self.strides.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    // Value for a labeling given in scope order
    pub fn get(&self, states: &[usize]) -> f64 {
        self.values[IxDyn(states)]
    }

    // Value at a flat index
    pub fn at(&self, index: usize) -> Option<f64> {
        self.values
            .as_slice()
            .and_then(|values| values.get(index).copied())
    }

    // State of the variable at `position` within the labeling with flat index `index`
    pub fn state_of(&self, index: usize, position: usize) -> usize {
        (index / self.strides[position]) % self.values.shape()[position]
    }

    pub fn index_of(&self, states: &[usize]) -> usize {
        states
            .iter()
            .zip(self.strides.iter())
            .map(|(state, stride)| state * stride)
            .sum()
    }

    // Flat index of the labeling obtained from `index` by setting the variable at `position` to `state`
    pub fn index_with_state(&self, index: usize, position: usize, state: usize) -> usize {
        let stride = self.strides[position];
        index - self.state_of(index, position) * stride + state * stride
    }

    // Labeling with flat index `index`, in scope order
    pub fn states_of(&self, index: usize) -> Vec<usize> {
        (0..self.arity())
            .map(|position| self.state_of(index, position))
            .collect()
    }

    // Iterates over entries in flat-index order
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.values.iter_mut()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}
