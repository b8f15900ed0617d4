use std::sync::Arc;

use log::debug;

use crate::{
    error::{MapError, MapResult},
    tables::energy_table::EnergyTable,
};

use super::factor_type::{FactorData, FactorType};

/// A factor instance: a shared type applied to an ordered scope of variables.
#[derive(Debug, Clone)]
pub struct Factor {
    ftype: Arc<FactorType>,
    scope: Vec<usize>, // variables, in the order of the type's cardinalities
    data: FactorData,
    energies: Option<EnergyTable>, // None until compute_energies()
}

impl Factor {
    pub fn new(ftype: Arc<FactorType>, scope: Vec<usize>, data: FactorData) -> MapResult<Self> {
        if scope.len() != ftype.arity() {
            return Err(MapError::ScopeMismatch {
                scope_len: scope.len(),
                arity: ftype.arity(),
            });
        }
        for (position, variable) in scope.iter().enumerate() {
            if scope[..position].contains(variable) {
                return Err(MapError::RepeatedVariable(*variable));
            }
        }
        ftype.check_data(&data)?;

        Ok(Factor {
            ftype,
            scope,
            data,
            energies: None,
        })
    }

    pub fn factor_type(&self) -> &Arc<FactorType> {
        &self.ftype
    }

    pub fn scope(&self) -> &[usize] {
        &self.scope
    }

    pub fn arity(&self) -> usize {
        self.scope.len()
    }

    pub fn cardinalities(&self) -> &[usize] {
        self.ftype.cardinalities()
    }

    pub fn data(&self) -> &FactorData {
        &self.data
    }

    // Position of `variable` in the scope, if present
    pub fn position(&self, variable: usize) -> Option<usize> {
        self.scope.iter().position(|v| *v == variable)
    }

    // Table of the factor's energies over all joint states of its scope
    pub fn compute_energy_table(&self) -> MapResult<EnergyTable> {
        self.ftype.compute_energies(&self.data)
    }

    // Materializes the energy table unless it already exists
    pub fn compute_energies(&mut self) -> MapResult<()> {
        if self.energies.is_none() {
            self.recompute_energies()?;
        }
        Ok(())
    }

    // Rebuilds the energy table from the type and data, dropping any modification
    pub fn recompute_energies(&mut self) -> MapResult<()> {
        debug!(
            "In recompute_energies() for factor of type {} over {:?}",
            self.ftype.id(),
            self.scope
        );
        self.energies = Some(self.compute_energy_table()?);
        Ok(())
    }

    pub fn energies(&self) -> Option<&EnergyTable> {
        self.energies.as_ref()
    }

    pub fn energies_mut(&mut self) -> Option<&mut EnergyTable> {
        self.energies.as_mut()
    }

    // Energy of the factor under a full assignment of the graph's variables
    pub fn evaluate(&self, assignment: &[usize]) -> Option<f64> {
        let energies = self.energies.as_ref()?;
        let mut index = 0;
        for ((variable, stride), cardinality) in self
            .scope
            .iter()
            .zip(energies.strides())
            .zip(self.cardinalities())
        {
            let state = *assignment.get(*variable)?;
            if state >= *cardinality {
                return None;
            }
            index += state * stride;
        }
        energies.at(index)
    }

    // Energy for states given in scope order
    pub fn evaluate_states(&self, states: &[usize]) -> Option<f64> {
        let energies = self.energies.as_ref()?;
        if states.len() != self.scope.len()
            || states
                .iter()
                .zip(self.cardinalities())
                .any(|(state, cardinality)| state >= cardinality)
        {
            return None;
        }
        energies.at(energies.index_of(states))
    }
}
