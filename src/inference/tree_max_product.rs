use std::time::Instant;

use bitvec::{order::LocalBits, vec::BitVec};
use log::{debug, info};

use crate::{
    error::{MapError, MapResult},
    graph::factor_graph::FactorGraph,
};

use super::{
    map_inference::InferenceMethod,
    solver::{Solver, SolverOptions, SolverOutcome, Termination},
};

// Node of the spanning forest, listed so that parents precede their children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeNode {
    Root(usize),
    Variable(usize),
    Factor {
        factor: usize,
        parent: usize,          // parent variable
        parent_position: usize, // position of the parent variable in the factor's scope
    },
}

/// Exact max-product dynamic programming on acyclic factor graphs.
///
/// Messages are passed from the leaves to one root per connected component,
/// keeping for every factor and parent state the table entry that achieves the
/// maximum. The optimal labeling is then read off from the roots downwards.
pub struct TreeMaxProduct<'a> {
    graph: &'a FactorGraph,
    order: Vec<TreeNode>,
}

impl<'a> TreeMaxProduct<'a> {
    // Lays out the forest, rooting each component at its lowest-index variable
    fn compute_order(graph: &FactorGraph) -> MapResult<Vec<TreeNode>> {
        let structure = graph.structure().ok_or(MapError::NotConnected)?;

        let mut is_visited_variable =
            BitVec::<usize, LocalBits>::repeat(false, graph.num_variables());
        let mut is_visited_factor = BitVec::<usize, LocalBits>::repeat(false, graph.num_factors());
        let mut order = Vec::with_capacity(graph.num_variables() + graph.num_factors());
        let mut stack = Vec::new();

        for root in 0..graph.num_variables() {
            if is_visited_variable[root] {
                continue;
            }
            is_visited_variable.set(root, true);
            stack.push(TreeNode::Root(root));

            while let Some(node) = stack.pop() {
                order.push(node);
                match node {
                    TreeNode::Root(variable) | TreeNode::Variable(variable) => {
                        for (factor, position) in structure.incident_factors(variable) {
                            if is_visited_factor[*factor] {
                                continue;
                            }
                            is_visited_factor.set(*factor, true);
                            stack.push(TreeNode::Factor {
                                factor: *factor,
                                parent: variable,
                                parent_position: *position,
                            });
                        }
                    }
                    TreeNode::Factor { factor, .. } => {
                        for variable in graph.factors()[factor].scope() {
                            if is_visited_variable[*variable] {
                                continue;
                            }
                            is_visited_variable.set(*variable, true);
                            stack.push(TreeNode::Variable(*variable));
                        }
                    }
                }
            }
        }

        Ok(order)
    }
}

impl<'a> Solver<'a> for TreeMaxProduct<'a> {
    fn init(graph: &'a FactorGraph) -> MapResult<Self> {
        if !graph.is_connected_components() {
            return Err(MapError::NotConnected);
        }
        if !graph.is_acyclic() {
            return Err(MapError::UnsupportedGraph(InferenceMethod::TreeMaxProduct));
        }
        graph.check_energies()?;

        let order = Self::compute_order(graph)?;
        debug!(
            "In TreeMaxProduct::init(): {} nodes in message order",
            order.len()
        );
        Ok(TreeMaxProduct { graph, order })
    }

    fn run(&mut self, _options: &SolverOptions) -> MapResult<SolverOutcome> {
        let start = Instant::now();
        let graph = self.graph;

        // Sum of the messages each variable receives from its child factors
        let mut beliefs: Vec<Vec<f64>> = graph
            .cardinalities()
            .iter()
            .map(|cardinality| vec![0.0; *cardinality])
            .collect();
        // For every factor and state of its parent, the best table entry
        let mut best_entries: Vec<Vec<usize>> = vec![Vec::new(); graph.num_factors()];

        // Upward pass, leaves first
        for node in self.order.iter().rev() {
            let TreeNode::Factor {
                factor,
                parent,
                parent_position,
            } = *node
            else {
                continue;
            };

            let scope = graph.factors()[factor].scope();
            let table = graph.factors()[factor]
                .energies()
                .ok_or(MapError::EnergiesNotComputed(factor))?;

            let mut message = vec![f64::NEG_INFINITY; graph.cardinality(parent)];
            let mut best_entry = vec![0; graph.cardinality(parent)];
            for (index, energy) in table.iter().enumerate() {
                let mut potential = -energy;
                for (position, variable) in scope.iter().enumerate() {
                    if position != parent_position {
                        potential += beliefs[*variable][table.state_of(index, position)];
                    }
                }

                let parent_state = table.state_of(index, parent_position);
                if potential > message[parent_state] {
                    message[parent_state] = potential;
                    best_entry[parent_state] = index;
                }
            }

            for (belief, value) in beliefs[parent].iter_mut().zip(message.iter()) {
                *belief += value;
            }
            best_entries[factor] = best_entry;
        }

        // Downward pass, roots first; every parent is labeled before its factor
        let mut assignment = vec![0; graph.num_variables()];
        let mut is_labeled = BitVec::<usize, LocalBits>::repeat(false, graph.num_variables());
        let mut max_potential = 0.0;
        for node in self.order.iter() {
            match *node {
                TreeNode::Root(variable) => {
                    let (state, potential) = beliefs[variable].iter().enumerate().fold(
                        (0, f64::NEG_INFINITY),
                        |(best_state, best_potential), (state, potential)| {
                            if *potential > best_potential {
                                (state, *potential)
                            } else {
                                (best_state, best_potential)
                            }
                        },
                    );
                    debug!(
                        "Component rooted at variable {} has maximum potential {}",
                        variable, potential
                    );
                    assignment[variable] = state;
                    is_labeled.set(variable, true);
                    max_potential += potential;
                }
                TreeNode::Variable(_) => {}
                TreeNode::Factor {
                    factor,
                    parent,
                    parent_position,
                } => {
                    debug_assert!(is_labeled[parent]);
                    let index = best_entries[factor][assignment[parent]];
                    let scope = graph.factors()[factor].scope();
                    let table = graph.factors()[factor]
                        .energies()
                        .ok_or(MapError::EnergiesNotComputed(factor))?;
                    for (position, variable) in scope.iter().enumerate() {
                        if position != parent_position {
                            assignment[*variable] = table.state_of(index, position);
                            is_labeled.set(*variable, true);
                        }
                    }
                }
            }
        }

        info!(
            "Tree max-product finished in {:?}, energy {}",
            start.elapsed(),
            -max_potential
        );
        debug!("Assignment: {:?}", assignment);
        debug_assert!(is_labeled.all());

        Ok(SolverOutcome {
            assignment,
            solver_energy: -max_potential,
            termination: Termination::Converged,
            duality_gap: None,
            trace: Vec::new(),
        })
    }
}
