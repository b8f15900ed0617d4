use log::{debug, info, warn};

use crate::{
    error::{MapError, MapResult},
    graph::{factor_graph::FactorGraph, observation::FactorGraphObservation},
};

use super::{
    lp_relaxation::LpRelaxation,
    solver::{IterationStats, Solver, SolverOptions, SolverOutcome, Termination},
    tree_max_product::TreeMaxProduct,
};

// Largest disagreement tolerated between the solver's energy and the recomputed one
const ENERGY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceMethod {
    TreeMaxProduct,
    LpRelaxation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceState {
    Uninitialized,
    Running,
    Converged,
    MaxIterReached,
}

enum InferenceStrategy<'a> {
    TreeMaxProduct(TreeMaxProduct<'a>),
    LpRelaxation(LpRelaxation<'a>),
}

impl<'a> InferenceStrategy<'a> {
    fn init(graph: &'a FactorGraph, method: InferenceMethod) -> MapResult<Self> {
        Ok(match method {
            InferenceMethod::TreeMaxProduct => {
                InferenceStrategy::TreeMaxProduct(TreeMaxProduct::init(graph)?)
            }
            InferenceMethod::LpRelaxation => {
                InferenceStrategy::LpRelaxation(LpRelaxation::init(graph)?)
            }
        })
    }

    fn run(&mut self, options: &SolverOptions) -> MapResult<SolverOutcome> {
        match self {
            InferenceStrategy::TreeMaxProduct(solver) => solver.run(options),
            InferenceStrategy::LpRelaxation(solver) => solver.run(options),
        }
    }
}

/// Finds a minimum-energy assignment of a factor graph with the solver chosen
/// at construction, and keeps the result for later queries.
///
/// The graph must have been analysed with `connect_components()` and have all
/// its energy tables computed.
pub struct MapInference<'a> {
    graph: &'a FactorGraph,
    method: InferenceMethod,
    strategy: InferenceStrategy<'a>,
    options: SolverOptions,
    state: InferenceState,
    outcome: Option<SolverOutcome>,
    energy: Option<f64>, // energy of the outcome's assignment, evaluated on the graph
}

impl<'a> MapInference<'a> {
    pub fn new(
        graph: &'a FactorGraph,
        method: InferenceMethod,
        options: SolverOptions,
    ) -> MapResult<Self> {
        if !graph.is_connected_components() {
            return Err(MapError::NotConnected);
        }
        graph.check_energies()?;
        if method == InferenceMethod::TreeMaxProduct && !graph.is_acyclic() {
            return Err(MapError::UnsupportedGraph(method));
        }

        debug!("In MapInference::new() with {:?}, {:?}", method, options);
        Ok(MapInference {
            graph,
            method,
            strategy: InferenceStrategy::init(graph, method)?,
            options,
            state: InferenceState::Uninitialized,
            outcome: None,
            energy: None,
        })
    }

    // Runs the solver from scratch and returns the energy of the assignment found
    pub fn inference(&mut self) -> MapResult<f64> {
        info!(
            "Running {:?} on {} variables and {} factors",
            self.method,
            self.graph.num_variables(),
            self.graph.num_factors()
        );
        self.state = InferenceState::Running;
        self.outcome = None;
        self.energy = None;

        let outcome = match self.strategy.run(&self.options) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.state = InferenceState::Uninitialized;
                return Err(error);
            }
        };
        let energy = self.graph.evaluate_energy(&outcome.assignment)?;
        if (energy - outcome.solver_energy).abs() > ENERGY_TOLERANCE {
            warn!(
                "Solver reported energy {} but the assignment has energy {}",
                outcome.solver_energy, energy
            );
        }

        self.state = match outcome.termination {
            Termination::Converged => InferenceState::Converged,
            Termination::MaxIterReached => InferenceState::MaxIterReached,
        };
        self.outcome = Some(outcome);
        self.energy = Some(energy);
        Ok(energy)
    }

    pub fn method(&self) -> InferenceMethod {
        self.method
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn state(&self) -> InferenceState {
        self.state
    }

    pub fn assignment(&self) -> MapResult<&[usize]> {
        self.outcome
            .as_ref()
            .map(|outcome| outcome.assignment.as_slice())
            .ok_or(MapError::InferenceNotRun)
    }

    pub fn structured_outputs(&self) -> MapResult<FactorGraphObservation> {
        Ok(FactorGraphObservation::new(self.assignment()?.to_vec()))
    }

    pub fn energy(&self) -> MapResult<f64> {
        self.energy.ok_or(MapError::InferenceNotRun)
    }

    pub fn duality_gap(&self) -> Option<f64> {
        self.outcome
            .as_ref()
            .and_then(|outcome| outcome.duality_gap)
    }

    pub fn trace(&self) -> &[IterationStats] {
        self.outcome
            .as_ref()
            .map(|outcome| outcome.trace.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        factor_types::{
            factor::Factor,
            factor_type::{FactorData, FactorType},
        },
        graph::data_generator::{
            brute_force_minimum, multi_state_tree_graph, random_chain_graph, random_grid_graph,
            simple_chain_graph,
        },
    };

    fn construct_diagonal_graph() -> FactorGraph {
        // Potential table [[2, 0], [0, 2]], stored negated as energies
        let mut graph = FactorGraph::new(vec![2, 2]).unwrap();
        let ftype = Arc::new(FactorType::new(0, vec![2, 2], vec![-2.0, 0.0, 0.0, -2.0]).unwrap());
        graph
            .add_factor(Factor::new(ftype, vec![0, 1], FactorData::Empty).unwrap())
            .unwrap();
        graph.compute_energies().unwrap();
        graph.connect_components();
        graph
    }

    #[test]
    fn state_machine() {
        let graph = simple_chain_graph().unwrap();
        let mut inference =
            MapInference::new(&graph, InferenceMethod::TreeMaxProduct, SolverOptions::default())
                .unwrap();
        assert_eq!(inference.state(), InferenceState::Uninitialized);
        assert_eq!(inference.energy(), Err(MapError::InferenceNotRun));
        assert_eq!(
            inference.structured_outputs().unwrap_err(),
            MapError::InferenceNotRun
        );
        assert!(inference.trace().is_empty());

        let energy = inference.inference().unwrap();
        assert!((energy - 0.4).abs() < 1e-12);
        assert_eq!(inference.state(), InferenceState::Converged);
        assert_eq!(inference.energy(), Ok(energy));
        assert_eq!(inference.structured_outputs().unwrap().states(), &[0, 0]);
        assert_eq!(inference.duality_gap(), None);
        assert_eq!(inference.method(), InferenceMethod::TreeMaxProduct);
    }

    #[test]
    fn diagonal_potential() {
        let graph = construct_diagonal_graph();
        for method in [InferenceMethod::TreeMaxProduct, InferenceMethod::LpRelaxation] {
            let mut inference =
                MapInference::new(&graph, method, SolverOptions::default()).unwrap();
            assert_eq!(inference.inference(), Ok(-2.0));
            assert_eq!(inference.assignment().unwrap(), &[0, 0]);
        }
    }

    #[test]
    fn both_methods_agree_on_trees() {
        let graph = multi_state_tree_graph().unwrap();
        let mut tree =
            MapInference::new(&graph, InferenceMethod::TreeMaxProduct, SolverOptions::default())
                .unwrap();
        let mut lp =
            MapInference::new(&graph, InferenceMethod::LpRelaxation, SolverOptions::default())
                .unwrap();

        let tree_energy = tree.inference().unwrap();
        let lp_energy = lp.inference().unwrap();
        assert!((tree_energy + 3.8).abs() < 1e-12);
        assert!((lp_energy - tree_energy).abs() < 1e-9);
        assert_eq!(tree.assignment().unwrap(), lp.assignment().unwrap());
        assert_eq!(lp.state(), InferenceState::Converged);
        assert!(lp.duality_gap().unwrap() < 0.0002);
        assert!(!lp.trace().is_empty());
    }

    #[test]
    fn zero_energies_agree() {
        let mut graph = FactorGraph::new(vec![2, 2, 2]).unwrap();
        let ftype = Arc::new(FactorType::new(0, vec![2, 2], vec![0.0; 4]).unwrap());
        for scope in [vec![0, 1], vec![1, 2]] {
            graph
                .add_factor(Factor::new(ftype.clone(), scope, FactorData::Empty).unwrap())
                .unwrap();
        }
        graph.compute_energies().unwrap();
        graph.connect_components();

        let mut lp =
            MapInference::new(&graph, InferenceMethod::LpRelaxation, SolverOptions::default())
                .unwrap();
        assert_eq!(lp.inference(), Ok(0.0));
        assert_eq!(lp.state(), InferenceState::Converged);
        assert!(lp.duality_gap().unwrap() < lp.options().int_gap_thr());

        let mut tree =
            MapInference::new(&graph, InferenceMethod::TreeMaxProduct, SolverOptions::default())
                .unwrap();
        assert_eq!(tree.inference(), Ok(0.0));
    }

    #[test]
    fn tree_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(17);
        let (graph, _, expected) = random_chain_graph(&mut rng, 2).unwrap();
        let mut inference =
            MapInference::new(&graph, InferenceMethod::TreeMaxProduct, SolverOptions::default())
                .unwrap();
        let energy = inference.inference().unwrap();
        assert!((energy - expected).abs() < 1e-10);
    }

    #[test]
    fn loss_augmented_inference() {
        let mut graph = simple_chain_graph().unwrap();
        let observation = FactorGraphObservation::new(vec![0, 0]);
        graph.loss_augmentation(&observation).unwrap();

        // Disagreeing with the observation now pays off: E'(1, 1) = 1.3 - 2
        let (expected_assignment, expected_energy) = brute_force_minimum(&graph).unwrap();
        assert_eq!(expected_assignment, vec![1, 1]);

        let mut inference =
            MapInference::new(&graph, InferenceMethod::TreeMaxProduct, SolverOptions::default())
                .unwrap();
        let energy = inference.inference().unwrap();
        assert!((energy - expected_energy).abs() < 1e-12);
        assert!((energy + 0.7).abs() < 1e-12);
        assert_eq!(inference.assignment().unwrap(), &[1, 1]);
    }

    #[test]
    fn max_iterations_reached() {
        let mut rng = StdRng::seed_from_u64(5);
        let graph = random_grid_graph(&mut rng, 3, 3).unwrap();
        let mut options = SolverOptions::default();
        options
            .set_max_iterations(2)
            .set_int_gap_thr(f64::NEG_INFINITY)
            .set_obj_del_thr(f64::NEG_INFINITY);

        let mut inference =
            MapInference::new(&graph, InferenceMethod::LpRelaxation, options).unwrap();
        let energy = inference.inference().unwrap();
        assert_eq!(inference.state(), InferenceState::MaxIterReached);
        assert_eq!(inference.trace().len(), 2);
        assert!(inference.duality_gap().unwrap() >= -1e-9);
        assert_eq!(graph.evaluate_energy(inference.assignment().unwrap()), Ok(energy));
    }

    #[test]
    fn rerun_gives_same_result() {
        let mut rng = StdRng::seed_from_u64(5);
        let graph = random_grid_graph(&mut rng, 3, 3).unwrap();
        let mut inference =
            MapInference::new(&graph, InferenceMethod::LpRelaxation, SolverOptions::default())
                .unwrap();
        let first = inference.inference().unwrap();
        let first_assignment = inference.assignment().unwrap().to_vec();
        let second = inference.inference().unwrap();
        assert_eq!(first, second);
        assert_eq!(inference.assignment().unwrap(), first_assignment.as_slice());
    }

    #[test]
    fn construction_errors() {
        let mut graph = FactorGraph::new(vec![2, 2, 2]).unwrap();
        let ftype = Arc::new(FactorType::new(0, vec![2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap());
        for scope in [vec![0, 1], vec![1, 2], vec![2, 0]] {
            graph
                .add_factor(Factor::new(ftype.clone(), scope, FactorData::Empty).unwrap())
                .unwrap();
        }
        assert_eq!(
            MapInference::new(&graph, InferenceMethod::LpRelaxation, SolverOptions::default())
                .err(),
            Some(MapError::NotConnected)
        );

        graph.connect_components();
        assert_eq!(
            MapInference::new(&graph, InferenceMethod::LpRelaxation, SolverOptions::default())
                .err(),
            Some(MapError::EnergiesNotComputed(0))
        );

        graph.compute_energies().unwrap();
        assert_eq!(
            MapInference::new(&graph, InferenceMethod::TreeMaxProduct, SolverOptions::default())
                .err(),
            Some(MapError::UnsupportedGraph(InferenceMethod::TreeMaxProduct))
        );
        assert!(
            MapInference::new(&graph, InferenceMethod::LpRelaxation, SolverOptions::default())
                .is_ok()
        );
    }
}
