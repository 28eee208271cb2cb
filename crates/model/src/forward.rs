//! The forward algorithm.

use hades_stats::{log_sum_exp, log_sum_exp_slice};
use ndarray::Array2;

use hades_distributions::Symbol;

use crate::compiled::Model;
use crate::state::State;

impl Model {
    /// Runs the forward algorithm.
    ///
    /// Returns an `(n + 1) x |S|` matrix where `f[[t, i]]` is the log
    /// probability of emitting the first `t` observations and sitting in
    /// state `i`. Row 0 is the pre-emission row: 0 at start, with the
    /// probability relaxed along silent transitions. Internally each row
    /// is rescaled by its log-sum to keep magnitudes bounded; the scale
    /// column is added back before returning.
    pub fn forward(&self, sequence: &[Symbol]) -> Array2<f64> {
        let emissions = self.emission_table(sequence);
        self.forward_with(&emissions)
    }

    pub(crate) fn forward_with(&self, emissions: &Array2<f64>) -> Array2<f64> {
        let n = emissions.nrows();
        let m = self.len();
        let mut f = Array2::from_elem((n + 1, m), f64::NEG_INFINITY);
        let mut scales = vec![0.0; n + 1];

        // Row 0: probability mass flows from start along silent edges,
        // in topological order.
        f[[0, self.start_index]] = 0.0;
        for l in self.silent_start..m {
            if l == self.start_index {
                continue;
            }
            let mut acc = f64::NEG_INFINITY;
            for idx in self.in_edges(l) {
                let k = self.in_source[idx];
                if k >= self.silent_start && k < l {
                    acc = log_sum_exp(acc, f[[0, k]] + self.in_log_p[idx]);
                }
            }
            f[[0, l]] = acc;
        }

        for t in 0..n {
            // Emitting states pull from the whole previous row.
            for l in 0..self.silent_start {
                let mut acc = f64::NEG_INFINITY;
                for idx in self.in_edges(l) {
                    let k = self.in_source[idx];
                    acc = log_sum_exp(acc, f[[t, k]] + self.in_log_p[idx]);
                }
                f[[t + 1, l]] = acc + emissions[[t, l]];
            }
            // Silent states in two passes: first from the emitting states
            // of this row, then along the topological silent order.
            for l in self.silent_start..m {
                let mut acc = f64::NEG_INFINITY;
                for idx in self.in_edges(l) {
                    let k = self.in_source[idx];
                    if k < self.silent_start {
                        acc = log_sum_exp(acc, f[[t + 1, k]] + self.in_log_p[idx]);
                    }
                }
                f[[t + 1, l]] = acc;
            }
            for l in self.silent_start..m {
                let mut acc = f[[t + 1, l]];
                for idx in self.in_edges(l) {
                    let k = self.in_source[idx];
                    if k >= self.silent_start && k < l {
                        acc = log_sum_exp(acc, f[[t + 1, k]] + self.in_log_p[idx]);
                    }
                }
                f[[t + 1, l]] = acc;
            }

            let row = f.row(t + 1);
            let scale = log_sum_exp_slice(row.as_slice().expect("rows are contiguous"));
            // An all--inf row means the prefix is impossible; leave it.
            if scale.is_finite() {
                for l in 0..m {
                    f[[t + 1, l]] -= scale;
                }
                scales[t + 1] = scale;
            }
        }

        // Undo the rescaling so callers see true log probabilities.
        let mut cumulative = 0.0;
        for t in 1..=n {
            cumulative += scales[t];
            if cumulative != 0.0 {
                for l in 0..m {
                    f[[t, l]] += cumulative;
                }
            }
        }
        f
    }

    /// Log probability of a sequence: the forward mass at end (finite
    /// models) or summed over the emitting states (infinite models).
    /// `-inf` when the sequence is impossible.
    pub fn log_probability(&self, sequence: &[Symbol]) -> f64 {
        let f = self.forward(sequence);
        self.forward_log_probability(&f)
    }

    pub(crate) fn forward_log_probability(&self, f: &Array2<f64>) -> f64 {
        let n = f.nrows() - 1;
        if self.finite {
            f[[n, self.end_index]]
        } else {
            let mut acc = f64::NEG_INFINITY;
            for i in 0..self.silent_start {
                acc = log_sum_exp(acc, f[[n, i]]);
            }
            acc
        }
    }

    /// Summed log probability of several sequences; `-inf` as soon as
    /// any one of them is impossible.
    pub fn total_log_probability(&self, sequences: &[Vec<Symbol>]) -> f64 {
        sequences
            .iter()
            .map(|sequence| self.log_probability(sequence))
            .sum()
    }

    /// Scores a sequence along an explicit state path.
    ///
    /// The path lists the visited states, silent states included, in
    /// order; leading start and trailing end states may be included or
    /// left implicit. Emitting states consume the observations in order.
    /// Returns `-inf` when the path uses a missing transition, emits the
    /// wrong number of symbols, or visits a state outside the model.
    pub fn path_log_probability(&self, sequence: &[Symbol], path: &[State]) -> f64 {
        let mut indices = Vec::with_capacity(path.len());
        for state in path {
            match self.state_index(state) {
                Some(i) => indices.push(i),
                None => return f64::NEG_INFINITY,
            }
        }
        let trimmed: &[usize] = {
            let mut slice = indices.as_slice();
            if slice.first() == Some(&self.start_index) {
                slice = &slice[1..];
            }
            if slice.last() == Some(&self.end_index) {
                slice = &slice[..slice.len() - 1];
            }
            slice
        };

        let mut score = 0.0;
        let mut previous = self.start_index;
        let mut observations = sequence.iter();
        for &i in trimmed {
            score += self.transition_log_probability(previous, i);
            if i < self.silent_start {
                match observations.next() {
                    Some(symbol) => {
                        score += self.states[i]
                            .emission()
                            .expect("states before silent_start emit")
                            .log_probability(symbol);
                    }
                    None => return f64::NEG_INFINITY,
                }
            }
            previous = i;
        }
        if observations.next().is_some() {
            return f64::NEG_INFINITY;
        }
        if self.finite {
            score += self.transition_log_probability(previous, self.end_index);
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::MergePolicy;
    use crate::graph::ModelBuilder;
    use approx::assert_relative_eq;
    use hades_distributions::{Emission, Uniform};

    /// start -> a -> b -> end, with unit-density uniform emissions.
    fn chain() -> (Model, State, State) {
        let mut builder = ModelBuilder::new("m");
        let a = State::emitting("a", Emission::new(Uniform::new(0.0, 1.0).unwrap()));
        let b = State::emitting("b", Emission::new(Uniform::new(0.0, 1.0).unwrap()));
        builder.add_state(a.clone());
        builder.add_state(b.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &a, 1.0).unwrap();
        builder.add_transition(&a, &b, 1.0).unwrap();
        builder.add_transition(&b, &end, 1.0).unwrap();
        let model = builder.bake(MergePolicy::None).unwrap();
        (model, a, b)
    }

    #[test]
    fn forward_deterministic_chain() {
        let (model, a, b) = chain();
        let seq = Symbol::reals(&[0.5, 0.5]);
        let f = model.forward(&seq);
        let ia = model.state_index(&a).unwrap();
        let ib = model.state_index(&b).unwrap();
        assert_relative_eq!(f[[1, ia]], 0.0, epsilon = 1e-9);
        assert_eq!(f[[1, ib]], f64::NEG_INFINITY);
        assert_relative_eq!(f[[2, ib]], 0.0, epsilon = 1e-9);
        assert_relative_eq!(model.log_probability(&seq), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn forward_row_zero_relaxes_through_silent_states() {
        let (model, ..) = chain();
        let f = model.forward(&Symbol::reals(&[0.5]));
        assert_eq!(f[[0, model.start_index()]], 0.0);
        // End is unreachable without emitting.
        assert_eq!(f[[0, model.end_index()]], f64::NEG_INFINITY);
    }

    #[test]
    fn impossible_sequence_scores_neg_infinity() {
        let (model, ..) = chain();
        assert_eq!(
            model.log_probability(&Symbol::reals(&[0.5, 7.0])),
            f64::NEG_INFINITY
        );
        assert_eq!(
            model.log_probability(&Symbol::reals(&[0.5])),
            f64::NEG_INFINITY,
            "finite model must consume a path to end"
        );
    }

    #[test]
    fn rescaling_survives_long_sequences() {
        // A self-looping state with density 2 and loop probability 0.5:
        // each extra symbol multiplies P by exactly 1, so the log
        // probability stays 0 however long the sequence is.
        let mut builder = ModelBuilder::new("m");
        let s = State::emitting("s", Emission::new(Uniform::new(0.0, 0.5).unwrap()));
        builder.add_state(s.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &s, 1.0).unwrap();
        builder.add_transition(&s, &s, 0.5).unwrap();
        builder.add_transition(&s, &end, 0.5).unwrap();
        let model = builder.bake(MergePolicy::None).unwrap();

        let seq = Symbol::reals(&vec![0.25; 400]);
        assert_relative_eq!(model.log_probability(&seq), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn path_log_probability_matches_forward_on_unique_path() {
        let (model, a, b) = chain();
        let seq = Symbol::reals(&[0.5, 0.5]);
        let lp = model.path_log_probability(&seq, &[a.clone(), b.clone()]);
        assert_relative_eq!(lp, model.log_probability(&seq), epsilon = 1e-9);

        // Wrong emission count.
        assert_eq!(
            model.path_log_probability(&seq, &[a.clone()]),
            f64::NEG_INFINITY
        );
        // Illegal transition order.
        assert_eq!(
            model.path_log_probability(&seq, &[b, a]),
            f64::NEG_INFINITY
        );
    }
}
