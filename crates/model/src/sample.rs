//! Generating observation sequences from a baked model.

use rand::Rng;

use hades_distributions::Symbol;

use crate::compiled::Model;
use crate::error::ModelError;
use crate::state::State;

impl Model {
    /// Generates an observation sequence.
    ///
    /// Starting at the start state, each step draws `u` in `[0, 1)` and
    /// walks the outgoing edges in storage order, transitioning at the
    /// first edge whose cumulative probability covers the draw (falling
    /// back to the last allowed edge on floating-point shortfall).
    /// Emitting states contribute one symbol per visit.
    ///
    /// For a finite model, generation stops at the end state; while
    /// fewer than `length` symbols are out, the edge into end is skipped
    /// unless it is the only outgoing edge. With `length` given,
    /// generation also stops once that many symbols are out (closing
    /// through end when a direct edge exists).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::LengthRequired`] when sampling an infinite
    /// model without a length bound, and surfaces
    /// [`DistributionError::NotSamplable`](hades_distributions::DistributionError::NotSamplable)
    /// from states carrying a custom distribution.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        length: Option<usize>,
    ) -> Result<Vec<Symbol>, ModelError> {
        self.sample_with_path(rng, length).map(|(seq, _)| seq)
    }

    /// As [`Model::sample`], also returning the visited states (silent
    /// visits included).
    pub fn sample_with_path<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        length: Option<usize>,
    ) -> Result<(Vec<Symbol>, Vec<State>), ModelError> {
        if !self.finite && length.is_none() {
            return Err(ModelError::LengthRequired);
        }

        let mut sequence = Vec::new();
        let mut path = vec![self.states[self.start_index].clone()];
        let mut current = self.start_index;

        loop {
            if self.finite && current == self.end_index {
                break;
            }
            if let Some(bound) = length {
                if sequence.len() >= bound {
                    // Close the path through end when a direct edge
                    // exists; otherwise stop where we are.
                    if self.finite && self.find_out_edge(current, self.end_index).is_some() {
                        path.push(self.states[self.end_index].clone());
                    }
                    break;
                }
            }

            let range = self.out_edges(current);
            if range.is_empty() {
                break;
            }
            let avoid_end = self.finite
                && length.is_some_and(|bound| sequence.len() < bound)
                && range.len() > 1;

            let u: f64 = rng.random();
            let mut cumulative = 0.0;
            let mut chosen = None;
            for idx in range {
                let target = self.out_target[idx];
                if avoid_end && target == self.end_index {
                    continue;
                }
                chosen = Some(target);
                cumulative += self.out_log_p[idx].exp();
                if cumulative >= u {
                    break;
                }
            }
            let Some(next) = chosen else {
                break;
            };

            current = next;
            path.push(self.states[current].clone());
            if current < self.silent_start {
                let symbol = self.states[current]
                    .emission()
                    .expect("states before silent_start emit")
                    .sample(rng)?;
                sequence.push(symbol);
            }
        }

        Ok((sequence, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bake::MergePolicy;
    use crate::graph::ModelBuilder;
    use hades_distributions::{Custom, Discrete, Emission, Uniform};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn finite_model() -> Model {
        let mut builder = ModelBuilder::new("m");
        let a = State::emitting("a", Emission::new(Uniform::new(0.0, 1.0).unwrap()));
        builder.add_state(a.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &a, 1.0).unwrap();
        builder.add_transition(&a, &a, 0.5).unwrap();
        builder.add_transition(&a, &end, 0.5).unwrap();
        builder.bake(MergePolicy::None).unwrap()
    }

    fn infinite_model() -> Model {
        let mut builder = ModelBuilder::new("m");
        let a = State::emitting("a", Emission::new(Discrete::new([("x", 1.0)]).unwrap()));
        builder.add_state(a.clone());
        let start = builder.start().clone();
        builder.add_transition(&start, &a, 1.0).unwrap();
        builder.add_transition(&a, &a, 1.0).unwrap();
        builder.bake(MergePolicy::None).unwrap()
    }

    #[test]
    fn infinite_model_requires_length() {
        let model = infinite_model();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            model.sample(&mut rng, None),
            Err(ModelError::LengthRequired)
        ));
    }

    #[test]
    fn infinite_model_emits_exactly_the_bound() {
        let model = infinite_model();
        let mut rng = StdRng::seed_from_u64(0);
        let seq = model.sample(&mut rng, Some(8)).unwrap();
        assert_eq!(seq.len(), 8);
        assert!(seq.iter().all(|s| s.as_token() == Some("x")));
    }

    #[test]
    fn sampling_is_deterministic_with_seed() {
        let model = finite_model();
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        let a = model.sample(&mut rng1, None).unwrap();
        let b = model.sample(&mut rng2, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn finite_model_terminates_at_end() {
        let model = finite_model();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (seq, path) = model.sample_with_path(&mut rng, None).unwrap();
            assert!(!seq.is_empty());
            assert_eq!(path.first().unwrap().name(), "m-start");
            assert_eq!(path.last().unwrap().name(), "m-end");
            // One emitting visit per symbol.
            let emitting = path.iter().filter(|s| !s.is_silent()).count();
            assert_eq!(emitting, seq.len());
        }
    }

    #[test]
    fn length_bound_avoids_the_end_edge() {
        let model = finite_model();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let seq = model.sample(&mut rng, Some(6)).unwrap();
            // The end edge shares its source with a self-loop, so it is
            // avoidable until the bound is reached.
            assert_eq!(seq.len(), 6);
        }
    }

    #[test]
    fn custom_emissions_are_not_samplable() {
        let mut builder = ModelBuilder::new("m");
        let a = State::emitting("a", Emission::new(Custom::new(|_| 0.0)));
        builder.add_state(a.clone());
        let start = builder.start().clone();
        let end = builder.end().clone();
        builder.add_transition(&start, &a, 1.0).unwrap();
        builder.add_transition(&a, &end, 1.0).unwrap();
        let model = builder.bake(MergePolicy::None).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            model.sample(&mut rng, None),
            Err(ModelError::Distribution(_))
        ));
    }
}
