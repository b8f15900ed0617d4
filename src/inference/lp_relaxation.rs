use std::time::Instant;

use log::{debug, info, warn};

use crate::{
    error::{MapError, MapResult},
    graph::factor_graph::FactorGraph,
    message::region_messages::RegionMessages,
};

use super::solver::{IterationStats, Solver, SolverOptions, SolverOutcome, Termination};

/// Approximate MAP inference on graphs with cycles by block-coordinate
/// descent on the dual of the LP relaxation (generalized MPLP).
///
/// Each iteration updates the messages of every region once, decodes a
/// labeling from the beliefs and keeps the best labeling seen so far. The
/// dual objective bounds the maximum potential from above, so
/// `dual + best energy` is a certificate of how far the labeling can be from
/// optimal.
pub struct LpRelaxation<'a> {
    graph: &'a FactorGraph,
    messages: RegionMessages,
    sequence: Vec<usize>, // regions in update order
}

impl<'a> LpRelaxation<'a> {
    pub fn messages(&self) -> &RegionMessages {
        &self.messages
    }
}

impl<'a> Solver<'a> for LpRelaxation<'a> {
    fn init(graph: &'a FactorGraph) -> MapResult<Self> {
        if !graph.is_connected_components() {
            return Err(MapError::NotConnected);
        }
        graph.check_energies()?;

        let messages = RegionMessages::new(graph)?;
        let sequence = messages.region_sequence();
        debug!(
            "In LpRelaxation::init(): {} of {} regions exchange messages",
            sequence.len(),
            messages.regions().len()
        );

        Ok(LpRelaxation {
            graph,
            messages,
            sequence,
        })
    }

    fn run(&mut self, options: &SolverOptions) -> MapResult<SolverOutcome> {
        let start = Instant::now();
        self.messages.reset();

        let mut best_assignment = vec![0; self.graph.num_variables()];
        let mut best_energy = self.graph.evaluate_energy(&best_assignment)?;
        let mut previous_dual = f64::INFINITY;
        let mut duality_gap = None;
        let mut termination = Termination::MaxIterReached;
        let mut trace = Vec::new();

        for iteration in 0..options.max_iterations() {
            for region in &self.sequence {
                self.messages.update_region(*region);
            }
            let dual = self.messages.dual_objective();

            let assignment = self.messages.decode(self.graph.cardinalities());
            let energy = self.graph.evaluate_energy(&assignment)?;
            if energy < best_energy {
                best_energy = energy;
                best_assignment = assignment;
            }

            // The dual bounds the potential -E from above
            let gap = dual + best_energy;
            duality_gap = Some(gap);
            trace.push(IterationStats {
                iteration,
                dual_objective: dual,
                primal_energy: energy,
                best_energy,
                duality_gap: gap,
            });
            debug!(
                "Iteration {}: dual = {}, energy = {}, best energy = {}, gap = {}",
                iteration, dual, energy, best_energy, gap
            );

            if gap < options.int_gap_thr() {
                termination = Termination::Converged;
                break;
            }
            if iteration > 0 && previous_dual - dual < options.obj_del_thr() {
                termination = Termination::Converged;
                break;
            }
            previous_dual = dual;
        }

        match termination {
            Termination::Converged => info!(
                "LP relaxation converged after {} iterations in {:?}, energy {}",
                trace.len(),
                start.elapsed(),
                best_energy
            ),
            Termination::MaxIterReached => warn!(
                "LP relaxation stopped after {} iterations in {:?}, energy {}, gap {:?}",
                trace.len(),
                start.elapsed(),
                best_energy,
                duality_gap
            ),
        }

        Ok(SolverOutcome {
            assignment: best_assignment,
            solver_energy: best_energy,
            termination,
            duality_gap,
            trace,
        })
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

    fn solve(graph: &FactorGraph, options: &SolverOptions) -> SolverOutcome {
        let mut solver = LpRelaxation::init(graph).unwrap();
        solver.run(options).unwrap()
    }

    fn check_trace(graph: &FactorGraph, outcome: &SolverOutcome) {
        assert!(!outcome.trace.is_empty());
        for pair in outcome.trace.windows(2) {
            assert!(pair[1].dual_objective <= pair[0].dual_objective + 1e-9);
            assert!(pair[1].best_energy <= pair[0].best_energy);
        }
        for stats in &outcome.trace {
            assert!(stats.duality_gap >= -1e-9);
        }
        let energy = graph.evaluate_energy(&outcome.assignment).unwrap();
        assert_eq!(energy, outcome.solver_energy);
    }

    #[test]
    fn simple_chain_is_solved_in_one_iteration() {
        let graph = simple_chain_graph().unwrap();
        let outcome = solve(&graph, &SolverOptions::default());
        assert_eq!(outcome.assignment, vec![0, 0]);
        assert!((outcome.solver_energy - 0.4).abs() < 1e-12);
        assert_eq!(outcome.termination, Termination::Converged);
        assert_eq!(outcome.trace.len(), 1);
        assert!(outcome.duality_gap.unwrap().abs() < 1e-12);
    }

    #[test]
    fn multi_state_tree() {
        let graph = multi_state_tree_graph().unwrap();
        let outcome = solve(&graph, &SolverOptions::default());
        check_trace(&graph, &outcome);
        assert_eq!(outcome.assignment, vec![2, 0, 2]);
        assert!((outcome.solver_energy + 3.8).abs() < 1e-9);
    }

    #[test]
    fn zero_energies() {
        let mut graph = FactorGraph::new(vec![2, 2, 2]).unwrap();
        let ftype = Arc::new(FactorType::new(0, vec![2, 2], vec![0.0; 4]).unwrap());
        for scope in [vec![0, 1], vec![1, 2]] {
            graph
                .add_factor(Factor::new(ftype.clone(), scope, FactorData::Empty).unwrap())
                .unwrap();
        }
        graph.connect_components();
        graph.compute_energies().unwrap();

        let outcome = solve(&graph, &SolverOptions::default());
        assert_eq!(outcome.termination, Termination::Converged);
        assert_eq!(outcome.solver_energy, 0.0);
        assert_eq!(outcome.assignment, vec![0, 0, 0]);
    }

    #[test]
    fn attractive_triangle_is_tight() {
        // Potts pairwise terms on a cycle, unaries favouring state 1
        let mut graph = FactorGraph::new(vec![2, 2, 2]).unwrap();
        let potts = Arc::new(FactorType::new(0, vec![2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap());
        let unary = Arc::new(FactorType::data_dependent(1, vec![2]).unwrap());
        for scope in [vec![0, 1], vec![1, 2], vec![0, 2]] {
            graph
                .add_factor(Factor::new(potts.clone(), scope, FactorData::Empty).unwrap())
                .unwrap();
        }
        for (variable, energy) in [1.0, 0.8, 0.5].iter().enumerate() {
            graph
                .add_factor(
                    Factor::new(
                        unary.clone(),
                        vec![variable],
                        FactorData::Dense(vec![*energy, 0.0]),
                    )
                    .unwrap(),
                )
                .unwrap();
        }
        graph.connect_components();
        graph.compute_energies().unwrap();
        assert!(!graph.is_acyclic());

        let outcome = solve(&graph, &SolverOptions::default());
        check_trace(&graph, &outcome);
        assert_eq!(outcome.assignment, vec![1, 1, 1]);
        assert_eq!(outcome.solver_energy, 0.0);
        assert_eq!(outcome.termination, Termination::Converged);
        assert!(outcome.duality_gap.unwrap() < 0.0002);
    }

    #[test]
    fn random_chain_bound() {
        let mut rng = StdRng::seed_from_u64(17);
        let (graph, _, minimum) = random_chain_graph(&mut rng, 2).unwrap();
        let outcome = solve(&graph, &SolverOptions::default());
        check_trace(&graph, &outcome);

        // -dual is a lower bound on the minimum energy
        let last = outcome.trace.last().unwrap();
        assert!(-last.dual_objective <= minimum + 1e-9);
        assert!(outcome.solver_energy >= minimum - 1e-12);
    }

    #[test]
    fn random_grid_bound() {
        let mut rng = StdRng::seed_from_u64(5);
        let graph = random_grid_graph(&mut rng, 3, 3).unwrap();
        assert!(!graph.is_acyclic());
        let (_, minimum) = brute_force_minimum(&graph).unwrap();

        let outcome = solve(&graph, &SolverOptions::default());
        check_trace(&graph, &outcome);
        for stats in &outcome.trace {
            assert!(-stats.dual_objective <= minimum + 1e-9);
        }
        assert!(outcome.solver_energy >= minimum - 1e-12);
    }

    #[test]
    fn iteration_cap() {
        let mut rng = StdRng::seed_from_u64(5);
        let graph = random_grid_graph(&mut rng, 3, 3).unwrap();
        let mut options = SolverOptions::default();
        options
            .set_max_iterations(1)
            .set_int_gap_thr(f64::NEG_INFINITY);

        let outcome = solve(&graph, &options);
        assert_eq!(outcome.termination, Termination::MaxIterReached);
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(outcome.duality_gap, Some(outcome.trace[0].duality_gap));
    }

    #[test]
    fn no_iterations() {
        let graph = simple_chain_graph().unwrap();
        let mut options = SolverOptions::default();
        options.set_max_iterations(0);

        let outcome = solve(&graph, &options);
        assert_eq!(outcome.termination, Termination::MaxIterReached);
        assert!(outcome.trace.is_empty());
        assert_eq!(outcome.duality_gap, None);
        assert_eq!(outcome.assignment, vec![0, 0]);
    }

    #[test]
    fn rerun_starts_from_scratch() {
        let mut rng = StdRng::seed_from_u64(5);
        let graph = random_grid_graph(&mut rng, 3, 3).unwrap();
        let mut solver = LpRelaxation::init(&graph).unwrap();
        let first = solver.run(&SolverOptions::default()).unwrap();
        let second = solver.run(&SolverOptions::default()).unwrap();
        assert_eq!(first.assignment, second.assignment);
        assert_eq!(first.trace, second.trace);
        assert_eq!(solver.messages().regions().len(), graph.num_factors());
    }
}
