use bitvec::{order::LocalBits, vec::BitVec};
use log::debug;
use petgraph::{
    algo::{connected_components, is_cyclic_undirected},
    graph::{NodeIndex, UnGraph},
};
use rayon::prelude::*;

use crate::{
    error::{MapError, MapResult},
    factor_types::factor::Factor,
};

use super::observation::FactorGraphObservation;

/// Facts derived from the bipartite variable/factor graph.
#[derive(Debug, Clone)]
pub struct GraphStructure {
    incidence: Vec<Vec<(usize, usize)>>, // indexed by variables, (factor, position in its scope)
    num_edges: usize,
    num_components: usize,
    is_acyclic: bool,
}

impl GraphStructure {
    // Variable `v` is node `v`, factor `f` is node `num_variables + f`
    fn new(num_variables: usize, factors: &[Factor]) -> Self {
        let num_edges = factors.iter().map(|factor| factor.arity()).sum();
        let mut graph = UnGraph::<(), ()>::with_capacity(num_variables + factors.len(), num_edges);
        let mut incidence = vec![Vec::new(); num_variables];
        for _ in 0..num_variables {
            graph.add_node(());
        }
        for (factor_index, factor) in factors.iter().enumerate() {
            let factor_node = graph.add_node(());
            for (position, variable) in factor.scope().iter().enumerate() {
                graph.add_edge(factor_node, NodeIndex::new(*variable), ());
                incidence[*variable].push((factor_index, position));
            }
        }

        GraphStructure {
            incidence,
            num_edges,
            num_components: connected_components(&graph),
            is_acyclic: !is_cyclic_undirected(&graph),
        }
    }

    // Factors whose scope contains `variable`, in insertion order, with the variable's position
    pub fn incident_factors(&self, variable: usize) -> &[(usize, usize)] {
        &self.incidence[variable]
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn is_acyclic(&self) -> bool {
        self.is_acyclic
    }
}

/// Variables with finite domains and the factors defined over them.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    cardinalities: Vec<usize>,         // indexed by variables
    factors: Vec<Factor>,              // in insertion order
    structure: Option<GraphStructure>, // None until connect_components()
}

impl FactorGraph {
    // Creates a graph with no factors
    pub fn new(cardinalities: Vec<usize>) -> MapResult<Self> {
        if let Some((variable, cardinality)) = cardinalities
            .iter()
            .enumerate()
            .find(|(_, cardinality)| **cardinality < 2)
        {
            return Err(MapError::InvalidCardinality {
                variable,
                cardinality: *cardinality,
                minimum: 2,
            });
        }

        Ok(FactorGraph {
            cardinalities,
            factors: Vec::new(),
            structure: None,
        })
    }

    pub fn add_factor(&mut self, factor: Factor) -> MapResult<()> {
        for (variable, cardinality) in factor.scope().iter().zip(factor.cardinalities()) {
            if *variable >= self.num_variables() {
                return Err(MapError::VariableOutOfRange {
                    variable: *variable,
                    num_variables: self.num_variables(),
                });
            }
            if self.cardinalities[*variable] != *cardinality {
                return Err(MapError::CardinalityMismatch {
                    variable: *variable,
                    expected: self.cardinalities[*variable],
                    actual: *cardinality,
                });
            }
        }

        debug!(
            "In add_factor() for factor {} over {:?}",
            self.factors.len(),
            factor.scope()
        );
        self.factors.push(factor);
        self.structure = None;
        Ok(())
    }

    // Analyses connectivity and cycles of the current set of factors
    pub fn connect_components(&mut self) {
        let structure = GraphStructure::new(self.num_variables(), &self.factors);
        debug!(
            "In connect_components(): {} edges, {} components, acyclic = {}",
            structure.num_edges(),
            structure.num_components(),
            structure.is_acyclic()
        );
        self.structure = Some(structure);
    }

    pub fn is_connected_components(&self) -> bool {
        self.structure.is_some()
    }

    pub fn structure(&self) -> Option<&GraphStructure> {
        self.structure.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.structure
            .as_ref()
            .map_or(false, |structure| structure.num_components() == 1)
    }

    pub fn is_acyclic(&self) -> bool {
        self.structure
            .as_ref()
            .map_or(false, |structure| structure.is_acyclic())
    }

    pub fn is_tree(&self) -> bool {
        self.is_acyclic() && self.is_connected()
    }

    pub fn num_edges(&self) -> usize {
        self.structure
            .as_ref()
            .map_or(0, |structure| structure.num_edges())
    }

    pub fn num_components(&self) -> usize {
        self.structure
            .as_ref()
            .map_or(0, |structure| structure.num_components())
    }

    pub fn num_variables(&self) -> usize {
        self.cardinalities.len()
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    pub fn cardinality(&self, variable: usize) -> usize {
        self.cardinalities[variable]
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    // Materializes every missing energy table
    pub fn compute_energies(&mut self) -> MapResult<()> {
        self.factors
            .par_iter_mut()
            .try_for_each(|factor| factor.compute_energies())
    }

    // Fails with the first factor whose table is missing
    pub fn check_energies(&self) -> MapResult<()> {
        match self
            .factors
            .iter()
            .position(|factor| factor.energies().is_none())
        {
            Some(factor_index) => Err(MapError::EnergiesNotComputed(factor_index)),
            None => Ok(()),
        }
    }

    pub fn check_assignment(&self, assignment: &[usize]) -> MapResult<()> {
        if assignment.len() != self.num_variables() {
            return Err(MapError::AssignmentMismatch {
                expected: self.num_variables(),
                actual: assignment.len(),
            });
        }
        for (variable, state) in assignment.iter().enumerate() {
            if *state >= self.cardinalities[variable] {
                return Err(MapError::StateOutOfRange {
                    variable,
                    state: *state,
                    cardinality: self.cardinalities[variable],
                });
            }
        }
        Ok(())
    }

    // Total energy of a full assignment
    pub fn evaluate_energy(&self, assignment: &[usize]) -> MapResult<f64> {
        self.check_assignment(assignment)?;
        self.factors
            .iter()
            .enumerate()
            .try_fold(0.0, |energy, (factor_index, factor)| {
                factor
                    .evaluate(assignment)
                    .map(|factor_energy| energy + factor_energy)
                    .ok_or(MapError::EnergiesNotComputed(factor_index))
            })
    }

    /// Folds the Hamming loss against `observation` into the energy tables, so
    /// that afterwards `E'(y) = E(y) - hamming_loss(observation, y)` for every
    /// assignment `y`. Each variable's loss goes into the first factor whose
    /// scope contains it.
    pub fn loss_augmentation(&mut self, observation: &FactorGraphObservation) -> MapResult<()> {
        self.check_assignment(observation.states())?;
        self.check_energies()?;

        let mut is_covered = BitVec::<usize, LocalBits>::repeat(false, self.num_variables());
        for factor in &self.factors {
            for variable in factor.scope() {
                is_covered.set(*variable, true);
            }
        }
        if let Some(variable) = is_covered.first_zero() {
            return Err(MapError::UncoveredVariable(variable));
        }

        let mut is_augmented = BitVec::<usize, LocalBits>::repeat(false, self.num_variables());
        for (factor_index, factor) in self.factors.iter_mut().enumerate() {
            let scope = factor.scope().to_vec();
            let positions: Vec<usize> = (0..scope.len())
                .filter(|position| !is_augmented[scope[*position]])
                .collect();
            if positions.is_empty() {
                continue;
            }

            let table = factor
                .energies_mut()
                .ok_or(MapError::EnergiesNotComputed(factor_index))?;
            let strides = table.strides().to_vec();
            let cardinalities = table.cardinalities().to_vec();
            for (index, energy) in table.iter_mut().enumerate() {
                for position in &positions {
                    let variable = scope[*position];
                    let state = (index / strides[*position]) % cardinalities[*position];
                    if state != observation[variable] {
                        *energy -= observation.loss_weights()[variable];
                    }
                }
            }

            for position in positions {
                is_augmented.set(scope[position], true);
            }
            debug!(
                "In loss_augmentation(): factor {} carries the loss of {:?}",
                factor_index, scope
            );
        }
        Ok(())
    }
}
