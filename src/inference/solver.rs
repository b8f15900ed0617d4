use crate::{error::MapResult, graph::factor_graph::FactorGraph};

#[derive(Debug, Clone)]
pub struct SolverOptions {
    max_iterations: usize,
    obj_del_thr: f64, // minimum decrease of the dual objective between iterations
    int_gap_thr: f64, // duality gap below which the solution is accepted
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: 1000,
            obj_del_thr: 0.0002,
            int_gap_thr: 0.0002,
        }
    }
}

impl SolverOptions {
    pub fn set_max_iterations(&mut self, value: usize) -> &mut Self {
        self.max_iterations = value;
        self
    }

    pub fn set_obj_del_thr(&mut self, value: f64) -> &mut Self {
        self.obj_del_thr = value;
        self
    }

    pub fn set_int_gap_thr(&mut self, value: f64) -> &mut Self {
        self.int_gap_thr = value;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn obj_del_thr(&self) -> f64 {
        self.obj_del_thr
    }

    pub fn int_gap_thr(&self) -> f64 {
        self.int_gap_thr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxIterReached,
}

// Progress of the LP relaxation after one sweep over all regions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats {
    pub iteration: usize,
    pub dual_objective: f64, // upper bound on the maximum potential, i.e. -lower bound on the energy
    pub primal_energy: f64,  // energy of the assignment decoded in this iteration
    pub best_energy: f64,    // lowest energy decoded so far
    pub duality_gap: f64,
}

#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub assignment: Vec<usize>,
    pub solver_energy: f64, // energy as tracked by the solver itself
    pub termination: Termination,
    pub duality_gap: Option<f64>,
    pub trace: Vec<IterationStats>,
}

pub trait Solver<'a>: Sized {
    fn init(graph: &'a FactorGraph) -> MapResult<Self>;
    fn run(&mut self, options: &SolverOptions) -> MapResult<SolverOutcome>;
}
