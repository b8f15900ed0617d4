pub mod error;

pub mod tables {
    pub mod alignment;
    pub mod energy_table;
}

pub mod factor_types {
    pub mod factor;
    pub mod factor_type;
}

pub mod graph {
    pub mod data_generator;
    pub mod factor_graph;
    pub mod observation;
}

pub mod message {
    pub mod region_messages;
}

pub mod inference {
    pub mod lp_relaxation;
    pub mod map_inference;
    pub mod solver;
    pub mod tree_max_product;
}

pub use error::{MapError, MapResult};
pub use factor_types::{
    factor::Factor,
    factor_type::{FactorData, FactorType},
};
pub use graph::{data_generator, factor_graph::FactorGraph, observation::FactorGraphObservation};
pub use inference::{
    map_inference::{InferenceMethod, InferenceState, MapInference},
    solver::{IterationStats, SolverOptions, Termination},
};
pub use tables::energy_table::EnergyTable;
