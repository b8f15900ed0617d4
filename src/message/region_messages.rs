use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::{
    error::{MapError, MapResult},
    graph::factor_graph::FactorGraph,
    tables::alignment::ScopeAlignment,
};

// Set of variables shared by at least two regions
#[derive(Debug, Clone)]
pub struct Intersection {
    variables: Vec<usize>, // sorted
    incoming: Vec<f64>,    // sum of the messages all regions send to this intersection
}

impl Intersection {
    pub fn variables(&self) -> &[usize] {
        &self.variables
    }

    pub fn incoming(&self) -> &[f64] {
        &self.incoming
    }
}

// Factor scope seen as a region of the LP relaxation, working with potentials (negated energies)
#[derive(Debug, Clone)]
pub struct Region {
    factor: usize,
    scope: Vec<usize>,
    potential: Vec<f64>,
    intersections: Vec<usize>,       // indices of the intersections within this region
    alignments: Vec<ScopeAlignment>, // one per intersection
    messages: Vec<Vec<f64>>,         // one per intersection, indexed by the intersection's labelings
    variable_alignments: Vec<ScopeAlignment>, // one per scope position
}

impl Region {
    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn intersections(&self) -> &[usize] {
        &self.intersections
    }

    pub fn messages(&self) -> &[Vec<f64>] {
        &self.messages
    }
}

/// Messages of the generalized MPLP dual: each region sends to each of its
/// intersections a vector over the intersection's joint states.
///
/// The dual objective is
/// `sum_s max incoming_s + sum_c max (potential_c - sum_{s in c} message_{c,s})`,
/// an upper bound on the maximum total potential of any labeling.
#[derive(Debug, Clone)]
pub struct RegionMessages {
    regions: Vec<Region>,
    intersections: Vec<Intersection>,
}

impl RegionMessages {
    pub fn new(graph: &FactorGraph) -> MapResult<Self> {
        let mut regions = Vec::with_capacity(graph.num_factors());
        for (factor_index, factor) in graph.factors().iter().enumerate() {
            let table = factor
                .energies()
                .ok_or(MapError::EnergiesNotComputed(factor_index))?;
            regions.push(Region {
                factor: factor_index,
                scope: factor.scope().to_vec(),
                potential: table.iter().map(|energy| -energy).collect(),
                intersections: Vec::new(),
                alignments: Vec::new(),
                messages: Vec::new(),
                variable_alignments: (0..factor.arity())
                    .map(|position| ScopeAlignment::new(factor.cardinalities(), &[position]))
                    .collect(),
            });
        }

        // Pairs of regions sharing at least one variable
        let mut incident = vec![Vec::new(); graph.num_variables()];
        for region in &regions {
            for variable in &region.scope {
                incident[*variable].push(region.factor);
            }
        }
        let mut pairs = BTreeSet::new();
        for factors in &incident {
            for (index, first) in factors.iter().enumerate() {
                for second in &factors[index + 1..] {
                    pairs.insert((*first, *second));
                }
            }
        }

        let mut intersections: Vec<Intersection> = Vec::new();
        let mut intersection_index: HashMap<Vec<usize>, usize> = HashMap::new();
        for (first, second) in pairs {
            let mut variables: Vec<usize> = regions[first]
                .scope
                .iter()
                .filter(|variable| regions[second].scope.contains(*variable))
                .copied()
                .collect();
            variables.sort_unstable();

            let index = *intersection_index
                .entry(variables.clone())
                .or_insert_with(|| {
                    let len = variables
                        .iter()
                        .map(|variable| graph.cardinality(*variable))
                        .product();
                    intersections.push(Intersection {
                        variables,
                        incoming: vec![0.0; len],
                    });
                    intersections.len() - 1
                });

            for region_index in [first, second] {
                if !regions[region_index].intersections.contains(&index) {
                    regions[region_index].intersections.push(index);
                }
            }
        }

        for (region, factor) in regions.iter_mut().zip(graph.factors()) {
            for intersection in &region.intersections {
                // Positions of the intersection's variables in the region's scope, in sorted variable order
                let positions: Vec<usize> = intersections[*intersection]
                    .variables
                    .iter()
                    .filter_map(|variable| region.scope.iter().position(|v| v == variable))
                    .collect();
                let alignment = ScopeAlignment::new(factor.cardinalities(), &positions);
                region.messages.push(vec![0.0; alignment.sub_len()]);
                region.alignments.push(alignment);
            }
        }

        debug!(
            "In RegionMessages::new(): {} regions, {} intersections",
            regions.len(),
            intersections.len()
        );
        Ok(RegionMessages {
            regions,
            intersections,
        })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    // Regions that exchange messages, in the order they are updated
    pub fn region_sequence(&self) -> Vec<usize> {
        (0..self.regions.len())
            .filter(|region| !self.regions[*region].intersections.is_empty())
            .collect()
    }

    // Sets every message back to zero
    pub fn reset(&mut self) {
        for region in &mut self.regions {
            region
                .messages
                .iter_mut()
                .for_each(|message| message.fill(0.0));
        }
        for intersection in &mut self.intersections {
            intersection.incoming.fill(0.0);
        }
    }

    // Region potential plus what the other regions send to its intersections
    pub fn belief(&self, region_index: usize) -> Vec<f64> {
        let region = &self.regions[region_index];
        let mut belief = region.potential.clone();
        for ((intersection, alignment), message) in region
            .intersections
            .iter()
            .zip(region.alignments.iter())
            .zip(region.messages.iter())
        {
            let others: Vec<f64> = self.intersections[*intersection]
                .incoming
                .iter()
                .zip(message.iter())
                .map(|(incoming, own)| incoming - own)
                .collect();
            alignment.add_projected(&mut belief, &others, 1.0);
        }
        belief
    }

    // Region potential minus the messages the region sends
    pub fn reparameterized(&self, region_index: usize) -> Vec<f64> {
        let region = &self.regions[region_index];
        let mut values = region.potential.clone();
        for (alignment, message) in region.alignments.iter().zip(region.messages.iter()) {
            alignment.add_projected(&mut values, message, -1.0);
        }
        values
    }

    /// Block-coordinate update of all messages leaving one region.
    ///
    /// With `n` intersections, every message becomes
    /// `max_marginal_s(belief) / n - (messages into s from other regions)`,
    /// which minimizes the dual objective over this region's messages.
    pub fn update_region(&mut self, region_index: usize) {
        let belief = self.belief(region_index);
        let region = &mut self.regions[region_index];
        let num_intersections = region.intersections.len();
        if num_intersections == 0 {
            return;
        }

        for ((intersection, alignment), message) in region
            .intersections
            .iter()
            .zip(region.alignments.iter())
            .zip(region.messages.iter_mut())
        {
            let incoming = &mut self.intersections[*intersection].incoming;
            let max_marginal = alignment.max_marginal(&belief);
            for ((total, own), max_value) in incoming
                .iter_mut()
                .zip(message.iter_mut())
                .zip(max_marginal.iter())
            {
                let others = *total - *own;
                let updated = max_value / num_intersections as f64 - others;
                *total = others + updated;
                *own = updated;
            }
        }
    }

    pub fn dual_objective(&self) -> f64 {
        let intersection_bound: f64 = self
            .intersections
            .iter()
            .map(|intersection| max_value(&intersection.incoming))
            .sum();
        let region_bound: f64 = (0..self.regions.len())
            .map(|region_index| max_value(&self.reparameterized(region_index)))
            .sum();
        intersection_bound + region_bound
    }

    /// Labeling maximizing, for every variable, the sum of the max-marginals
    /// of the beliefs of all regions containing it. Ties go to the lowest
    /// state, and variables outside every region get state 0.
    pub fn decode(&self, cardinalities: &[usize]) -> Vec<usize> {
        let mut scores: Vec<Vec<f64>> = cardinalities
            .iter()
            .map(|cardinality| vec![0.0; *cardinality])
            .collect();
        for region_index in 0..self.regions.len() {
            let region = &self.regions[region_index];
            let belief = self.belief(region_index);
            for (variable, alignment) in region.scope.iter().zip(region.variable_alignments.iter())
            {
                for (score, value) in scores[*variable]
                    .iter_mut()
                    .zip(alignment.max_marginal(&belief))
                {
                    *score += value;
                }
            }
        }

        scores.iter().map(|score| first_argmax(score)).collect()
    }
}

fn max_value(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

// Index of the first maximal value
fn first_argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}
