//! Small reproducible factor graphs for exercising the solvers.

use std::sync::Arc;

use log::debug;
use rand::Rng;

use crate::{
    error::{MapError, MapResult},
    factor_types::{
        factor::Factor,
        factor_type::{FactorData, FactorType},
    },
};

use super::factor_graph::FactorGraph;

// Largest number of assignments brute_force_minimum() will enumerate
const MAX_SEARCH_SPACE: u128 = 1 << 20;

// Two binary variables, one pairwise factor and a unary factor on each; the minimum is 0.4 at (0, 0)
pub fn simple_chain_graph() -> MapResult<FactorGraph> {
    let pairwise = Arc::new(FactorType::new(0, vec![2, 2], vec![0.0, 0.2, 0.3, 0.0])?);
    let unary_first = Arc::new(FactorType::new(1, vec![2], vec![0.1, 0.7])?);
    let unary_second = Arc::new(FactorType::new(2, vec![2], vec![0.3, 0.6])?);

    let mut graph = FactorGraph::new(vec![2, 2])?;
    graph.add_factor(Factor::new(pairwise, vec![0, 1], FactorData::Empty)?)?;
    graph.add_factor(Factor::new(unary_first, vec![0], FactorData::Empty)?)?;
    graph.add_factor(Factor::new(unary_second, vec![1], FactorData::Empty)?)?;

    graph.compute_energies()?;
    graph.connect_components();
    Ok(graph)
}

// Chain of three ternary variables with unaries; the minimum is -3.8 at (2, 0, 2)
pub fn multi_state_tree_graph() -> MapResult<FactorGraph> {
    let pairwise = Arc::new(FactorType::new(
        0,
        vec![3, 3],
        vec![-0.1, -0.7, -0.9, -0.7, -0.1, 0.0, -0.9, 0.0, -0.1],
    )?);
    let unaries = [
        vec![-0.1, -0.7, -0.6],
        vec![-0.9, -0.1, -0.2],
        vec![-0.3, -0.4, -0.5],
    ];

    let mut graph = FactorGraph::new(vec![3; 3])?;
    for (variable, energies) in unaries.into_iter().enumerate() {
        let unary = Arc::new(FactorType::new(variable + 1, vec![3], energies)?);
        graph.add_factor(Factor::new(unary, vec![variable], FactorData::Empty)?)?;
    }
    graph.add_factor(Factor::new(pairwise.clone(), vec![0, 1], FactorData::Empty)?)?;
    graph.add_factor(Factor::new(pairwise, vec![1, 2], FactorData::Empty)?)?;

    graph.compute_energies()?;
    graph.connect_components();
    Ok(graph)
}

/// Makes the binary pairwise table `[[a, b], [c, d]]` submodular
/// (`a + d <= b + c`) by moving the excess from the diagonal to the
/// off-diagonal entries.
pub fn truncate_energy(a: &mut f64, b: &mut f64, c: &mut f64, d: &mut f64) {
    if *a + *d > *c + *b {
        let delta = *a + *d - *c - *b;
        let third = delta / 3.0;
        *a -= third;
        *c += third;
        *b += delta - 2.0 * third + 0.0001;
    }
}

// Random submodular binary pairwise table, row-major
fn random_pairwise_energies(rng: &mut impl Rng) -> Vec<f64> {
    let mut a = rng.gen::<f64>();
    let mut c = rng.gen::<f64>();
    let mut b = rng.gen::<f64>();
    let mut d = rng.gen::<f64>();
    truncate_energy(&mut a, &mut b, &mut c, &mut d);
    vec![a, b, c, d]
}

// Binary grid with random unaries and a pairwise factor wherever `keep_edge(x, y, horizontal)` holds
fn random_binary_grid(
    rng: &mut impl Rng,
    width: usize,
    height: usize,
    keep_edge: impl Fn(usize, usize, bool) -> bool,
) -> MapResult<FactorGraph> {
    let pairwise = Arc::new(FactorType::data_dependent(0, vec![2, 2])?);
    let unary = Arc::new(FactorType::data_dependent(1, vec![2])?);
    let index = |x: usize, y: usize| y * width + x;

    let mut graph = FactorGraph::new(vec![2; width * height])?;
    for y in 0..height {
        for x in 0..width {
            let data = vec![rng.gen::<f64>(), rng.gen::<f64>()];
            graph.add_factor(Factor::new(
                unary.clone(),
                vec![index(x, y)],
                FactorData::Dense(data),
            )?)?;
        }
    }
    for x in 0..width {
        for y in 0..height {
            if x > 0 && keep_edge(x, y, true) {
                let data = random_pairwise_energies(rng);
                graph.add_factor(Factor::new(
                    pairwise.clone(),
                    vec![index(x, y), index(x - 1, y)],
                    FactorData::Dense(data),
                )?)?;
            }
            if y > 0 && keep_edge(x, y, false) {
                let data = random_pairwise_energies(rng);
                graph.add_factor(Factor::new(
                    pairwise.clone(),
                    vec![index(x, y - 1), index(x, y)],
                    FactorData::Dense(data),
                )?)?;
            }
        }
    }

    graph.compute_energies()?;
    graph.connect_components();
    Ok(graph)
}

/// Random `n x n` binary comb: every row is a horizontal chain and the first
/// column links the rows, so the graph is a tree. Returns the graph with its
/// minimizing assignment and minimum energy found by exhaustive search.
pub fn random_chain_graph(
    rng: &mut impl Rng,
    n: usize,
) -> MapResult<(FactorGraph, Vec<usize>, f64)> {
    let graph = random_binary_grid(rng, n, n, |x, _, horizontal| horizontal || x == 0)?;
    let (assignment, energy) = brute_force_minimum(&graph)?;
    debug!(
        "In random_chain_graph(): minimum energy {} at {:?}",
        energy, assignment
    );
    Ok((graph, assignment, energy))
}

// Random binary 4-connected grid, which has cycles as soon as both sides exceed one
pub fn random_grid_graph(
    rng: &mut impl Rng,
    width: usize,
    height: usize,
) -> MapResult<FactorGraph> {
    random_binary_grid(rng, width, height, |_, _, _| true)
}

/// Exhaustive search for the minimum-energy assignment. Among equal minima
/// the first one in lexicographic order wins.
pub fn brute_force_minimum(graph: &FactorGraph) -> MapResult<(Vec<usize>, f64)> {
    let search_space = graph
        .cardinalities()
        .iter()
        .fold(1u128, |product, cardinality| {
            product.saturating_mul(*cardinality as u128)
        });
    if search_space > MAX_SEARCH_SPACE {
        return Err(MapError::SearchSpaceTooLarge(search_space));
    }

    let mut assignment = vec![0; graph.num_variables()];
    let mut best_assignment = assignment.clone();
    let mut best_energy = f64::INFINITY;
    for _ in 0..search_space {
        let energy = graph.evaluate_energy(&assignment)?;
        if energy < best_energy {
            best_energy = energy;
            best_assignment.copy_from_slice(&assignment);
        }

        // Advance to the next assignment
        for variable in (0..assignment.len()).rev() {
            assignment[variable] += 1;
            if assignment[variable] < graph.cardinality(variable) {
                break;
            }
            assignment[variable] = 0;
        }
    }

    Ok((best_assignment, best_energy))
}
