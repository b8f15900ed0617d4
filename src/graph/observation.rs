use std::ops::Index;

use crate::error::{MapError, MapResult};

/// A full assignment of a factor graph's variables, together with the weight
/// each variable carries in the Hamming loss against other assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorGraphObservation {
    states: Vec<usize>,
    loss_weights: Vec<f64>, // indexed by variables
}

impl FactorGraphObservation {
    // Creates an observation with unit loss weights (plain Hamming loss)
    pub fn new(states: Vec<usize>) -> Self {
        let loss_weights = vec![1.0; states.len()];
        FactorGraphObservation {
            states,
            loss_weights,
        }
    }

    pub fn with_loss_weights(states: Vec<usize>, loss_weights: Vec<f64>) -> MapResult<Self> {
        if loss_weights.len() != states.len() {
            return Err(MapError::AssignmentMismatch {
                expected: states.len(),
                actual: loss_weights.len(),
            });
        }
        Ok(FactorGraphObservation {
            states,
            loss_weights,
        })
    }

    pub fn states(&self) -> &[usize] {
        &self.states
    }

    pub fn loss_weights(&self) -> &[f64] {
        &self.loss_weights
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn into_states(self) -> Vec<usize> {
        self.states
    }

    // Weighted number of variables on which `other` disagrees with this observation
    pub fn hamming_loss(&self, other: &[usize]) -> MapResult<f64> {
        if other.len() != self.states.len() {
            return Err(MapError::AssignmentMismatch {
                expected: self.states.len(),
                actual: other.len(),
            });
        }
        Ok(self
            .states
            .iter()
            .zip(other.iter())
            .zip(self.loss_weights.iter())
            .filter(|((truth, state), _)| truth != state)
            .map(|(_, weight)| weight)
            .sum())
    }
}

impl Index<usize> for FactorGraphObservation {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.states[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_weights() {
        let observation = FactorGraphObservation::new(vec![0, 1, 2]);
        assert_eq!(observation.len(), 3);
        assert_eq!(observation[2], 2);
        assert_eq!(observation.hamming_loss(&[0, 1, 2]), Ok(0.0));
        assert_eq!(observation.hamming_loss(&[1, 1, 0]), Ok(2.0));
    }

    #[test]
    fn weighted_loss() {
        let observation =
            FactorGraphObservation::with_loss_weights(vec![0, 0], vec![0.5, 0.25]).unwrap();
        assert_eq!(observation.hamming_loss(&[1, 0]), Ok(0.5));
        assert_eq!(observation.hamming_loss(&[1, 1]), Ok(0.75));
    }

    #[test]
    fn length_mismatch() {
        assert!(FactorGraphObservation::with_loss_weights(vec![0, 0], vec![1.0]).is_err());
        assert_eq!(
            FactorGraphObservation::new(vec![0]).hamming_loss(&[0, 0]),
            Err(MapError::AssignmentMismatch {
                expected: 1,
                actual: 2
            })
        );
    }
}
