use std::time::Instant;

use factor_graph_map::{
    data_generator::{
        multi_state_tree_graph, random_chain_graph, random_grid_graph, simple_chain_graph,
    },
    FactorGraph, InferenceMethod, MapInference, MapResult, SolverOptions,
};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

fn solve_instance(name: &str, graph: &FactorGraph) -> MapResult<()> {
    info!(
        "Processing instance {}: {} variables, {} factors, tree = {}.",
        name,
        graph.num_variables(),
        graph.num_factors(),
        graph.is_tree()
    );

    let mut methods = vec![InferenceMethod::LpRelaxation];
    if graph.is_acyclic() {
        methods.insert(0, InferenceMethod::TreeMaxProduct);
    }

    for method in methods {
        let time_start = Instant::now();
        let mut inference = MapInference::new(graph, method, SolverOptions::default())?;
        let energy = inference.inference()?;
        info!(
            "{:?}: energy {} at {:?}, state {:?}, gap {:?}. Elapsed time {:?}.",
            method,
            energy,
            inference.assignment()?,
            inference.state(),
            inference.duality_gap(),
            time_start.elapsed()
        );
    }

    info!("Finished processing instance {}.\n", name);
    Ok(())
}

fn main() -> MapResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut rng = StdRng::seed_from_u64(17);

    solve_instance("simple chain", &simple_chain_graph()?)?;
    solve_instance("multi-state tree", &multi_state_tree_graph()?)?;

    let (graph, assignment, energy) = random_chain_graph(&mut rng, 3)?;
    info!("Random comb has minimum energy {} at {:?}.", energy, assignment);
    solve_instance("random comb", &graph)?;

    solve_instance("random grid", &random_grid_graph(&mut rng, 5, 5)?)?;
    Ok(())
}
