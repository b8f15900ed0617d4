use thiserror::Error;

use crate::inference::map_inference::InferenceMethod;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("Wrong table size: got {actual}, expected {expected}.")]
    Shape { expected: usize, actual: usize },
    #[error("Variable {variable} has cardinality {cardinality}, at least {minimum} is required.")]
    InvalidCardinality {
        variable: usize,
        cardinality: usize,
        minimum: usize,
    },
    #[error("Factor types need at least one variable.")]
    EmptyScope,
    #[error("Scope has {scope_len} variables but the factor type has arity {arity}.")]
    ScopeMismatch { scope_len: usize, arity: usize },
    #[error("Variable {0} appears more than once in a factor scope.")]
    RepeatedVariable(usize),
    #[error("Factor data does not match the factor type: {0}.")]
    DataMismatch(String),
    #[error("Variable {variable} is out of range for a graph with {num_variables} variables.")]
    VariableOutOfRange {
        variable: usize,
        num_variables: usize,
    },
    #[error("Variable {variable} has cardinality {expected} in the graph, got {actual} from the factor type.")]
    CardinalityMismatch {
        variable: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Graph structure is unknown, call connect_components() first.")]
    NotConnected,
    #[error("{0:?} cannot run on this graph: it contains cycles.")]
    UnsupportedGraph(InferenceMethod),
    #[error("Energy table of factor {0} has not been computed.")]
    EnergiesNotComputed(usize),
    #[error("Assignment has {actual} entries, expected {expected}.")]
    AssignmentMismatch { expected: usize, actual: usize },
    #[error("State {state} of variable {variable} exceeds its cardinality {cardinality}.")]
    StateOutOfRange {
        variable: usize,
        state: usize,
        cardinality: usize,
    },
    #[error("Variable {0} is not covered by any factor.")]
    UncoveredVariable(usize),
    #[error("No inference result available, call inference() first.")]
    InferenceNotRun,
    #[error("Search space of {0} assignments is too large for exhaustive search.")]
    SearchSpaceTooLarge(u128),
}

pub type MapResult<T> = Result<T, MapError>;
