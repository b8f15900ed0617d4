use super::energy_table::row_major_strides;

/// Projection of the entries of a table onto the entries of a table over a
/// subset of its variables.
///
/// `projection[index]` is the flat index, in the sub-table, of the labeling
/// obtained by restricting labeling `index` to the sub-scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeAlignment {
    projection: Vec<usize>,
    sub_len: usize,
}

impl ScopeAlignment {
    // `positions` lists, in sub-scope order, the positions of the sub-scope variables in the scope
    pub fn new(cardinalities: &[usize], positions: &[usize]) -> Self {
        let sub_cardinalities: Vec<usize> = positions
            .iter()
            .map(|position| cardinalities[*position])
            .collect();
        let sub_strides = row_major_strides(&sub_cardinalities);

        // How much the sub-table index changes when the state at a scope position increases by one
        let mut increments = vec![0; cardinalities.len()];
        for (sub_position, position) in positions.iter().enumerate() {
            increments[*position] = sub_strides[sub_position];
        }

        let len: usize = cardinalities.iter().product();
        let mut projection = Vec::with_capacity(len);
        let mut labeling = vec![0; cardinalities.len()];
        let mut sub_index = 0;
        for _ in 0..len {
            projection.push(sub_index);

            // Advance to the next labeling
            for position in (0..cardinalities.len()).rev() {
                labeling[position] += 1;
                sub_index += increments[position];
                if labeling[position] < cardinalities[position] {
                    break;
                }
                // Carry over
                sub_index -= increments[position] * cardinalities[position];
                labeling[position] = 0;
            }
        }

        ScopeAlignment {
            projection,
            sub_len: sub_cardinalities.iter().product(),
        }
    }

    pub fn len(&self) -> usize {
        self.projection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
    }

    pub fn sub_len(&self) -> usize {
        self.sub_len
    }

    pub fn project(&self, index: usize) -> usize {
        self.projection[index]
    }

    // Max over all entries projecting onto each sub-table entry
    pub fn max_marginal(&self, values: &[f64]) -> Vec<f64> {
        let mut marginal = vec![f64::NEG_INFINITY; self.sub_len];
        for (value, sub_index) in values.iter().zip(self.projection.iter()) {
            if *value > marginal[*sub_index] {
                marginal[*sub_index] = *value;
            }
        }
        marginal
    }

    // Adds `scale * sub_values[projection[index]]` to every entry
    pub fn add_projected(&self, values: &mut [f64], sub_values: &[f64], scale: f64) {
        for (value, sub_index) in values.iter_mut().zip(self.projection.iter()) {
            *value += scale * sub_values[*sub_index];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_on_last_variable() {
        let alignment = ScopeAlignment::new(&[2, 3], &[1]);
        assert_eq!(alignment.len(), 6);
        assert_eq!(alignment.sub_len(), 3);
        assert_eq!(alignment.projection, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn project_on_first_variable() {
        let alignment = ScopeAlignment::new(&[2, 3], &[0]);
        assert_eq!(alignment.projection, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn project_on_pair() {
        // Scope (a, b, c) with cardinalities (2, 2, 3), sub-scope (a, c)
        let alignment = ScopeAlignment::new(&[2, 2, 3], &[0, 2]);
        assert_eq!(alignment.sub_len(), 6);
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..3 {
                    let index = a * 6 + b * 3 + c;
                    assert_eq!(alignment.project(index), a * 3 + c);
                }
            }
        }
    }

    #[test]
    fn identity_and_empty_projection() {
        let identity = ScopeAlignment::new(&[2, 2], &[0, 1]);
        assert_eq!(identity.projection, vec![0, 1, 2, 3]);

        let constant = ScopeAlignment::new(&[2, 2], &[]);
        assert_eq!(constant.sub_len(), 1);
        assert_eq!(constant.projection, vec![0, 0, 0, 0]);
    }

    #[test]
    fn max_marginal_and_add() {
        let alignment = ScopeAlignment::new(&[2, 3], &[0]);
        let mut values = vec![0.5, 2.0, -1.0, 0.0, 0.0, 3.0];
        assert_eq!(alignment.max_marginal(&values), vec![2.0, 3.0]);

        alignment.add_projected(&mut values, &[1.0, -1.0], 2.0);
        assert_eq!(values, vec![2.5, 4.0, 1.0, -2.0, -2.0, 1.0]);
    }
}
