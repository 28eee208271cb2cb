//! The immutable compiled model produced by baking.

use std::ops::Range;

use hades_distributions::Symbol;
use ndarray::Array2;

use crate::error::ModelError;
use crate::state::State;

/// A baked hidden Markov model.
///
/// States are stored with emitting states first (`0..silent_start`) and
/// silent states after them in topological order: every edge between two
/// silent states goes from a lower to a higher index. Edges live in two
/// CSR-style stores (by source and by target) holding log probabilities
/// and training pseudocounts. The probability arrays change only through
/// the trainers; everything else is fixed at bake time.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) name: String,
    pub(crate) states: Vec<State>,
    pub(crate) silent_start: usize,
    pub(crate) start_index: usize,
    pub(crate) end_index: usize,
    pub(crate) finite: bool,

    pub(crate) out_offset: Vec<usize>,
    pub(crate) out_target: Vec<usize>,
    pub(crate) out_log_p: Vec<f64>,
    pub(crate) out_pseudocount: Vec<f64>,

    pub(crate) in_offset: Vec<usize>,
    pub(crate) in_source: Vec<usize>,
    pub(crate) in_log_p: Vec<f64>,
    pub(crate) in_pseudocount: Vec<f64>,

    /// Position of each out-edge in the in-edge store, so updates can be
    /// mirrored.
    pub(crate) out_to_in: Vec<usize>,

    pub(crate) tie_offset: Vec<usize>,
    pub(crate) tie_member: Vec<usize>,

    pub(crate) state_log_weight: Vec<f64>,
}

impl Model {
    /// The model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of states, silent states included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the model has no states. Baking never produces one, so
    /// this is always false; provided for completeness.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All states, emitting first.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// The state at `index`.
    pub fn state(&self, index: usize) -> &State {
        &self.states[index]
    }

    /// Index of the first silent state.
    pub fn silent_start(&self) -> usize {
        self.silent_start
    }

    /// Index of the distinguished start state.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Index of the distinguished end state.
    pub fn end_index(&self) -> usize {
        self.end_index
    }

    /// Whether the end state is reachable (sequences must terminate
    /// there). An infinite model may stop in any emitting state instead.
    pub fn is_finite(&self) -> bool {
        self.finite
    }

    /// The position of a state in the compiled order, by handle
    /// identity.
    pub fn state_index(&self, state: &State) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    /// Log probability of the `from -> to` transition, `-inf` when no
    /// such edge exists.
    pub fn transition_log_probability(&self, from: usize, to: usize) -> f64 {
        match self.find_out_edge(from, to) {
            Some(idx) => self.out_log_p[idx],
            None => f64::NEG_INFINITY,
        }
    }

    /// The dense `|S| x |S|` matrix of transition log probabilities
    /// (missing edges are `-inf`).
    pub fn dense_transition_matrix(&self) -> Array2<f64> {
        let m = self.len();
        let mut dense = Array2::from_elem((m, m), f64::NEG_INFINITY);
        for k in 0..m {
            for idx in self.out_edges(k) {
                dense[[k, self.out_target[idx]]] = self.out_log_p[idx];
            }
        }
        dense
    }

    /// The indices of the other emitting states tied to `index` (sharing
    /// its emission handle). Empty for untied states.
    pub fn tied_to(&self, index: usize) -> &[usize] {
        &self.tie_member[self.tie_offset[index]..self.tie_offset[index + 1]]
    }

    /// Tie equivalence classes over the emitting states, each sorted
    /// ascending. Untied states form singleton classes.
    pub fn tie_classes(&self) -> Vec<Vec<usize>> {
        let mut classes = Vec::new();
        let mut seen = vec![false; self.silent_start];
        for i in 0..self.silent_start {
            if seen[i] {
                continue;
            }
            let mut class = vec![i];
            class.extend_from_slice(self.tied_to(i));
            class.sort_unstable();
            for &j in &class {
                seen[j] = true;
            }
            classes.push(class);
        }
        classes
    }

    /// Checks the row-stochastic invariant: every state with outgoing
    /// edges (other than end) must have probabilities summing to 1
    /// within 1e-8.
    pub fn validate(&self) -> Result<(), ModelError> {
        for k in 0..self.len() {
            if k == self.end_index {
                continue;
            }
            let range = self.out_edges(k);
            if range.is_empty() {
                continue;
            }
            let sum: f64 = self.out_log_p[range].iter().map(|lp| lp.exp()).sum();
            if (sum - 1.0).abs() > 1e-8 {
                return Err(ModelError::NotRowStochastic {
                    name: self.states[k].name().to_string(),
                    sum,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn out_edges(&self, state: usize) -> Range<usize> {
        self.out_offset[state]..self.out_offset[state + 1]
    }

    pub(crate) fn in_edges(&self, state: usize) -> Range<usize> {
        self.in_offset[state]..self.in_offset[state + 1]
    }

    pub(crate) fn find_out_edge(&self, from: usize, to: usize) -> Option<usize> {
        self.out_edges(from).find(|&idx| self.out_target[idx] == to)
    }

    /// Scores every observation against every emitting state:
    /// `table[[t, i]] = log p(sequence[t] | state i)`.
    pub(crate) fn emission_table(&self, sequence: &[Symbol]) -> Array2<f64> {
        let mut table = Array2::zeros((sequence.len(), self.silent_start));
        for i in 0..self.silent_start {
            let emission = self.states[i]
                .emission()
                .expect("states before silent_start emit");
            for (t, symbol) in sequence.iter().enumerate() {
                table[[t, i]] = emission.log_probability(symbol);
            }
        }
        table
    }
}
