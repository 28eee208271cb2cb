//! Forward-backward expectations and posterior (MAP) decoding.

use ndarray::Array2;

use hades_distributions::Symbol;

use crate::compiled::Model;
use crate::error::ModelError;
use crate::state::State;

impl Model {
    /// Runs forward and backward and combines them into `(E, W)`:
    ///
    /// - `E[[k, l]]` is the expected number of `k -> l` transitions
    ///   taken while generating the sequence;
    /// - `W[[t, i]]` is the posterior probability that emitting state
    ///   `i` produced observation `t`.
    ///
    /// With `tie` set, posterior weights are aggregated within each tie
    /// class: all members of a class share the summed class weight, so
    /// parameter-shared states see identical posteriors.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ImpossibleSequence`] when the sequence has
    /// zero probability.
    pub fn forward_backward(
        &self,
        sequence: &[Symbol],
        tie: bool,
    ) -> Result<(Array2<f64>, Array2<f64>), ModelError> {
        let emissions = self.emission_table(sequence);
        let f = self.forward_with(&emissions);
        let b = self.backward_with(&emissions);
        let log_probability = self.forward_log_probability(&f);
        if !log_probability.is_finite() {
            return Err(ModelError::ImpossibleSequence);
        }

        let n = sequence.len();
        let m = self.len();
        let mut expected = Array2::zeros((m, m));
        for k in 0..m {
            for idx in self.out_edges(k) {
                let l = self.out_target[idx];
                let w = self.out_log_p[idx];
                let mut count = 0.0;
                if l < self.silent_start {
                    for t in 0..n {
                        count += (f[[t, k]] + w + emissions[[t, l]] + b[[t + 1, l]]
                            - log_probability)
                            .exp();
                    }
                } else {
                    for t in 0..=n {
                        count += (f[[t, k]] + w + b[[t, l]] - log_probability).exp();
                    }
                }
                expected[[k, l]] += count;
            }
        }

        let mut weights = Array2::zeros((n, self.silent_start));
        for t in 0..n {
            for i in 0..self.silent_start {
                weights[[t, i]] = (f[[t + 1, i]] + b[[t + 1, i]] - log_probability).exp();
            }
        }
        if tie {
            self.aggregate_tied_weights(&mut weights);
        }

        Ok((expected, weights))
    }

    /// Sums posterior weights within each tie class and hands the sum to
    /// every member.
    pub(crate) fn aggregate_tied_weights(&self, weights: &mut Array2<f64>) {
        let classes = self.tie_classes();
        for t in 0..weights.nrows() {
            for class in &classes {
                if class.len() < 2 {
                    continue;
                }
                let total: f64 = class.iter().map(|&i| weights[[t, i]]).sum();
                for &i in class {
                    weights[[t, i]] = total;
                }
            }
        }
    }

    /// Posterior (maximum a posteriori) decoding.
    ///
    /// Labels each observation with the emitting state of highest
    /// posterior weight, bracketed by the start and end states. The
    /// returned score is the summed log posterior mass of the chosen
    /// labels. The label sequence maximizes each position independently
    /// and may use transitions the model does not have.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ImpossibleSequence`] when the sequence has
    /// zero probability.
    pub fn maximum_a_posteriori(
        &self,
        sequence: &[Symbol],
    ) -> Result<(f64, Vec<(usize, State)>), ModelError> {
        let (_, weights) = self.forward_backward(sequence, true)?;
        let n = sequence.len();

        let mut score = 0.0;
        let mut path = Vec::with_capacity(n + 2);
        path.push((0, self.states[self.start_index].clone()));
        for t in 0..n {
            let mut best = 0usize;
            for i in 1..self.silent_start {
                if weights[[t, i]] > weights[[t, best]] {
                    best = i;
                }
            }
            score += weights[[t, best]].ln();
            path.push((t + 1, self.states[best].clone()));
        }
        path.push((n, self.states[self.end_index].clone()));
        Ok((score, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::MergePolicy;
    use crate::graph::ModelBuilder;
    use approx::assert_relative_eq;
    use hades_distributions::{Emission, Normal, Uniform};

    fn two_state() -> (Model, State, State) {
        let mut builder = ModelBuilder::new("m");
        let a = State::emitting("a", Emission::new(Normal::new(0.0, 1.0).unwrap()));
        let b = State::emitting("b", Emission::new(Normal::new(4.0, 1.0).unwrap()));
        builder.add_state(a.clone());
        builder.add_state(b.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &a, 0.6).unwrap();
        builder.add_transition(&start, &b, 0.4).unwrap();
        builder.add_transition(&a, &a, 0.5).unwrap();
        builder.add_transition(&a, &b, 0.2).unwrap();
        builder.add_transition(&a, &end, 0.3).unwrap();
        builder.add_transition(&b, &b, 0.5).unwrap();
        builder.add_transition(&b, &a, 0.2).unwrap();
        builder.add_transition(&b, &end, 0.3).unwrap();
        (builder.bake(MergePolicy::None).unwrap(), a, b)
    }

    #[test]
    fn posterior_weights_sum_to_one_per_row() {
        let (model, ..) = two_state();
        let seq = Symbol::reals(&[0.2, 3.8, 4.1]);
        let (_, weights) = model.forward_backward(&seq, false).unwrap();
        for t in 0..seq.len() {
            let total: f64 = (0..model.silent_start()).map(|i| weights[[t, i]]).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn expected_transitions_out_of_start_sum_to_one() {
        let (model, ..) = two_state();
        let seq = Symbol::reals(&[0.2, 3.8, 4.1]);
        let (expected, _) = model.forward_backward(&seq, false).unwrap();
        let start = model.start_index();
        let total: f64 = (0..model.len()).map(|l| expected[[start, l]]).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        // A three-observation sequence takes exactly three emitting
        // transitions plus the exit to end.
        let grand: f64 = expected.iter().sum();
        assert_relative_eq!(grand, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn expected_transitions_into_end_sum_to_one() {
        let (model, ..) = two_state();
        let seq = Symbol::reals(&[0.2, 3.8]);
        let (expected, _) = model.forward_backward(&seq, false).unwrap();
        let end = model.end_index();
        let total: f64 = (0..model.len()).map(|k| expected[[k, end]]).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn tie_aggregation_equalizes_class_members() {
        let mut builder = ModelBuilder::new("m");
        let shared = Emission::new(Uniform::new(0.0, 1.0).unwrap());
        let a = State::emitting("a", shared.clone());
        let b = State::emitting("b", shared.clone());
        builder.add_state(a.clone());
        builder.add_state(b.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &a, 0.9).unwrap();
        builder.add_transition(&start, &b, 0.1).unwrap();
        builder.add_transition(&a, &end, 1.0).unwrap();
        builder.add_transition(&b, &end, 1.0).unwrap();
        let model = builder.bake(MergePolicy::None).unwrap();

        let seq = Symbol::reals(&[0.5]);
        let (_, raw) = model.forward_backward(&seq, false).unwrap();
        let ia = model.state_index(&a).unwrap();
        let ib = model.state_index(&b).unwrap();
        assert_relative_eq!(raw[[0, ia]], 0.9, epsilon = 1e-9);
        assert_relative_eq!(raw[[0, ib]], 0.1, epsilon = 1e-9);

        let (_, tied) = model.forward_backward(&seq, true).unwrap();
        assert_relative_eq!(tied[[0, ia]], tied[[0, ib]], epsilon = 1e-12);
        assert_relative_eq!(tied[[0, ia]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn impossible_sequence_is_an_error() {
        let mut builder = ModelBuilder::new("m");
        let a = State::emitting("a", Emission::new(Uniform::new(0.0, 1.0).unwrap()));
        builder.add_state(a.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &a, 1.0).unwrap();
        builder.add_transition(&a, &end, 1.0).unwrap();
        let model = builder.bake(MergePolicy::None).unwrap();

        assert!(matches!(
            model.forward_backward(&Symbol::reals(&[2.0]), false),
            Err(ModelError::ImpossibleSequence)
        ));
        assert!(matches!(
            model.maximum_a_posteriori(&Symbol::reals(&[2.0])),
            Err(ModelError::ImpossibleSequence)
        ));
    }

    #[test]
    fn map_decoding_labels_by_posterior() {
        let (model, ..) = two_state();
        let seq = Symbol::reals(&[0.1, 4.2, 3.9]);
        let (score, path) = model.maximum_a_posteriori(&seq).unwrap();
        assert!(score <= 0.0);
        let names: Vec<&str> = path.iter().map(|(_, s)| s.name()).collect();
        assert_eq!(names, vec!["m-start", "a", "b", "b", "m-end"]);
        let times: Vec<usize> = path.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![0, 1, 2, 3, 3]);
    }
}
