use crate::{
    error::{MapError, MapResult},
    tables::energy_table::EnergyTable,
};

/// Per-factor observation the energy table is computed from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FactorData {
    #[default]
    Empty,
    Dense(Vec<f64>),
    Sparse(Vec<(usize, f64)>), // (feature index, value)
}

/// Shared description of a family of factors: the domain sizes of the
/// variables they range over and the weights their energies are built from.
///
/// For a weighted type with feature dimension `D`, the energy of table entry
/// `e` under feature vector `x` is `sum_d weights[e * D + d] * x[d]`. A
/// data-dependent type has no weights and takes its table verbatim from the
/// factor's data.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorType {
    id: usize,
    cardinalities: Vec<usize>,
    weights: Vec<f64>, // indexed by [state][feature], empty for data-dependent types
    feature_dim: usize,
}

impl FactorType {
    // Creates a table factor type: one weight per joint state
    pub fn new(id: usize, cardinalities: Vec<usize>, weights: Vec<f64>) -> MapResult<Self> {
        Self::with_features(id, cardinalities, 1, weights)
    }

    pub fn with_features(
        id: usize,
        cardinalities: Vec<usize>,
        feature_dim: usize,
        weights: Vec<f64>,
    ) -> MapResult<Self> {
        let num_states = Self::check_cardinalities(&cardinalities)?;
        if feature_dim == 0 || weights.len() != num_states * feature_dim {
            return Err(MapError::Shape {
                expected: num_states * feature_dim.max(1),
                actual: weights.len(),
            });
        }

        Ok(FactorType {
            id,
            cardinalities,
            weights,
            feature_dim,
        })
    }

    // Creates a type whose factors carry their whole energy table as data
    pub fn data_dependent(id: usize, cardinalities: Vec<usize>) -> MapResult<Self> {
        let num_states = Self::check_cardinalities(&cardinalities)?;
        Ok(FactorType {
            id,
            cardinalities,
            weights: Vec::new(),
            feature_dim: num_states,
        })
    }

    fn check_cardinalities(cardinalities: &[usize]) -> MapResult<usize> {
        if cardinalities.is_empty() {
            return Err(MapError::EmptyScope);
        }
        if let Some((position, cardinality)) = cardinalities
            .iter()
            .enumerate()
            .find(|(_, cardinality)| **cardinality == 0)
        {
            return Err(MapError::InvalidCardinality {
                variable: position,
                cardinality: *cardinality,
                minimum: 1,
            });
        }
        Ok(cardinalities.iter().product())
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    pub fn arity(&self) -> usize {
        self.cardinalities.len()
    }

    pub fn num_states(&self) -> usize {
        self.cardinalities.iter().product()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn is_data_dependent(&self) -> bool {
        self.weights.is_empty()
    }

    // Checks that `data` can be combined with this type
    pub fn check_data(&self, data: &FactorData) -> MapResult<()> {
        match data {
            FactorData::Empty if self.is_data_dependent() => Err(MapError::DataMismatch(format!(
                "type {} is data-dependent but the factor has no data",
                self.id
            ))),
            FactorData::Empty if self.feature_dim != 1 => Err(MapError::DataMismatch(format!(
                "type {} has {} features but the factor has no data",
                self.id, self.feature_dim
            ))),
            FactorData::Empty => Ok(()),
            FactorData::Dense(values) if values.len() != self.feature_dim => {
                Err(MapError::DataMismatch(format!(
                    "dense data has length {}, expected {}",
                    values.len(),
                    self.feature_dim
                )))
            }
            FactorData::Dense(_) => Ok(()),
            FactorData::Sparse(entries) => match entries
                .iter()
                .find(|(index, _)| *index >= self.feature_dim)
            {
                Some((index, _)) => Err(MapError::DataMismatch(format!(
                    "sparse entry {} exceeds feature dimension {}",
                    index, self.feature_dim
                ))),
                None => Ok(()),
            },
        }
    }

    // Evaluates the energy formula over every joint state, in row-major order
    pub fn compute_energies(&self, data: &FactorData) -> MapResult<EnergyTable> {
        self.check_data(data)?;

        let energies: Vec<f64> = if self.is_data_dependent() {
            match data {
                FactorData::Dense(values) => values.clone(),
                FactorData::Sparse(entries) => {
                    let mut values = vec![0.0; self.num_states()];
                    for (index, value) in entries {
                        values[*index] += value;
                    }
                    values
                }
                FactorData::Empty => vec![0.0; self.num_states()],
            }
        } else {
            self.weights
                .chunks(self.feature_dim)
                .map(|state_weights| match data {
                    FactorData::Empty => state_weights[0],
                    FactorData::Dense(values) => state_weights
                        .iter()
                        .zip(values.iter())
                        .map(|(weight, value)| weight * value)
                        .sum(),
                    FactorData::Sparse(entries) => entries
                        .iter()
                        .map(|(index, value)| state_weights[*index] * value)
                        .sum(),
                })
                .collect()
        };

        EnergyTable::from_vec(&self.cardinalities, energies)
    }
}
