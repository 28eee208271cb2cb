//! Parameter re-estimation: Baum-Welch, Viterbi hard EM, and labelled
//! training.
//!
//! All three algorithms share one update cycle: accumulate transition
//! counts (expected or exact) and per-tie-class weighted emission
//! samples across the inputs, then renormalize each state's outgoing
//! probabilities and refit each tie class once.

use std::time::Instant;

use ndarray::Array2;
use tracing::{info, warn};

use hades_distributions::Symbol;

use crate::compiled::Model;
use crate::config::{TrainAlgorithm, TrainConfig};
use crate::error::ModelError;
use crate::state::State;

/// Weighted emission samples pooled per tie class. Samples land on the
/// class representative (the lowest member index), so each shared
/// distribution is refitted exactly once.
struct ClassSamples {
    representative: Vec<usize>,
    samples: Vec<Vec<Symbol>>,
    weights: Vec<Vec<f64>>,
}

impl ClassSamples {
    fn new(model: &Model, classes: &[Vec<usize>]) -> Self {
        let mut representative = vec![0usize; model.silent_start()];
        for class in classes {
            for &i in class {
                representative[i] = class[0];
            }
        }
        Self {
            representative,
            samples: vec![Vec::new(); model.silent_start()],
            weights: vec![Vec::new(); model.silent_start()],
        }
    }

    fn push(&mut self, state: usize, symbol: Symbol, weight: f64) {
        let rep = self.representative[state];
        self.samples[rep].push(symbol);
        self.weights[rep].push(weight);
    }
}

impl Model {
    /// Re-estimates the transition probabilities and emission
    /// distributions from unlabelled sequences, using the algorithm
    /// selected in `config`.
    ///
    /// Iterates until the summed log-probability improvement drops to
    /// the stop threshold (after at least `min_iterations`), the
    /// iteration cap or wall-clock budget is reached, or the
    /// cancellation flag is raised; flag and budget are checked between
    /// iterations, so a finished iteration always commits. Sequences
    /// with zero probability are skipped with a diagnostic. Returns the
    /// total log-probability improvement.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for a bad configuration and
    /// surfaces distribution-fit failures.
    pub fn train(
        &mut self,
        sequences: &[Vec<Symbol>],
        config: &TrainConfig,
    ) -> Result<f64, ModelError> {
        config.validate()?;
        let deadline = config.max_duration().map(|budget| Instant::now() + budget);
        let initial = self.summed_log_probability(sequences.iter().map(Vec::as_slice));
        let mut last = initial;
        let mut iteration = 0usize;

        loop {
            if iteration >= config.max_iterations() {
                break;
            }
            if config.is_cancelled() {
                info!(iteration, "training cancelled");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!(iteration, "training wall-clock budget exhausted");
                break;
            }

            match config.algorithm() {
                TrainAlgorithm::BaumWelch => self.baum_welch_iteration(sequences, config)?,
                TrainAlgorithm::Viterbi => self.viterbi_iteration(sequences, config)?,
            }

            let current = self.summed_log_probability(sequences.iter().map(Vec::as_slice));
            let improvement = current - last;
            info!(
                iteration,
                improvement,
                log_probability = current,
                "training iteration finished"
            );
            last = current;
            iteration += 1;
            if iteration >= config.min_iterations() && improvement <= config.stop_threshold() {
                break;
            }
        }
        Ok(last - initial)
    }

    /// Re-estimates parameters from `(sequence, path)` pairs by exact
    /// counting along the labelled paths.
    ///
    /// Paths list the visited states in order, silent states included;
    /// the leading start and trailing end may be left implicit. A pair
    /// whose path visits a foreign state, uses a missing transition, or
    /// emits the wrong number of symbols is skipped with a diagnostic.
    /// Counting is exact, so re-running on the same pairs is idempotent.
    /// Returns the log-probability improvement over the pair sequences.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for a bad configuration and
    /// surfaces distribution-fit failures.
    pub fn train_labelled(
        &mut self,
        pairs: &[(Vec<Symbol>, Vec<State>)],
        config: &TrainConfig,
    ) -> Result<f64, ModelError> {
        config.validate()?;
        let initial =
            self.summed_log_probability(pairs.iter().map(|(sequence, _)| sequence.as_slice()));

        let m = self.len();
        let mut expected = Array2::zeros((m, m));
        let classes = self.tie_classes();
        let mut samples = ClassSamples::new(self, &classes);
        for (index, (sequence, path)) in pairs.iter().enumerate() {
            self.accumulate_path(index, sequence, path, &mut expected, &mut samples);
        }
        self.apply_edge_update(&expected, config);
        self.fit_classes(&classes, &samples)?;

        let current =
            self.summed_log_probability(pairs.iter().map(|(sequence, _)| sequence.as_slice()));
        Ok(current - initial)
    }

    fn summed_log_probability<'a>(&self, sequences: impl Iterator<Item = &'a [Symbol]>) -> f64 {
        sequences
            .map(|sequence| self.log_probability(sequence))
            .filter(|lp| lp.is_finite())
            .sum()
    }

    fn baum_welch_iteration(
        &mut self,
        sequences: &[Vec<Symbol>],
        config: &TrainConfig,
    ) -> Result<(), ModelError> {
        let m = self.len();
        let mut expected = Array2::zeros((m, m));
        let classes = self.tie_classes();
        let mut samples = ClassSamples::new(self, &classes);

        for (index, sequence) in sequences.iter().enumerate() {
            let (transitions, weights) = match self.forward_backward(sequence, true) {
                Ok(pair) => pair,
                Err(ModelError::ImpossibleSequence) => {
                    warn!(sequence = index, "skipping sequence with zero probability");
                    continue;
                }
                Err(other) => return Err(other),
            };
            expected += &transitions;
            // Tie aggregation already equalized class members, so the
            // representative's entry is the class posterior.
            for t in 0..sequence.len() {
                for class in &classes {
                    let weight = weights[[t, class[0]]];
                    if weight > config.emission_threshold() {
                        samples.push(class[0], sequence[t].clone(), weight);
                    }
                }
            }
        }

        self.apply_edge_update(&expected, config);
        self.fit_classes(&classes, &samples)
    }

    fn viterbi_iteration(
        &mut self,
        sequences: &[Vec<Symbol>],
        config: &TrainConfig,
    ) -> Result<(), ModelError> {
        let m = self.len();
        let mut expected = Array2::zeros((m, m));
        let classes = self.tie_classes();
        let mut samples = ClassSamples::new(self, &classes);

        for (index, sequence) in sequences.iter().enumerate() {
            let (_, path) = self.viterbi(sequence);
            let Some(path) = path else {
                warn!(sequence = index, "skipping sequence with zero probability");
                continue;
            };
            let states: Vec<State> = path.into_iter().map(|(_, state)| state).collect();
            self.accumulate_path(index, sequence, &states, &mut expected, &mut samples);
        }

        self.apply_edge_update(&expected, config);
        self.fit_classes(&classes, &samples)
    }

    /// Counts the transitions and emissions of one labelled path into
    /// the accumulators. The whole pair is dropped (with a diagnostic)
    /// when the path does not fit the model; a partial count would bias
    /// the update.
    fn accumulate_path(
        &self,
        index: usize,
        sequence: &[Symbol],
        path: &[State],
        expected: &mut Array2<f64>,
        samples: &mut ClassSamples,
    ) {
        let mut indices = Vec::with_capacity(path.len() + 2);
        indices.push(self.start_index);
        for state in path {
            match self.state_index(state) {
                Some(i) => indices.push(i),
                None => {
                    warn!(
                        sequence = index,
                        state = state.name(),
                        "skipping pair: path visits a state outside the model"
                    );
                    return;
                }
            }
        }
        // Tolerate an explicit leading start, and close through end for
        // finite models unless the path already did.
        if indices.len() > 1 && indices[1] == self.start_index {
            indices.remove(0);
        }
        if self.finite && *indices.last().expect("path starts at start") != self.end_index {
            indices.push(self.end_index);
        }

        let emitting: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.silent_start)
            .collect();
        if emitting.len() != sequence.len() {
            warn!(
                sequence = index,
                expected = sequence.len(),
                got = emitting.len(),
                "skipping pair: path emits the wrong number of symbols"
            );
            return;
        }
        for pair in indices.windows(2) {
            if self.find_out_edge(pair[0], pair[1]).is_none() {
                warn!(
                    sequence = index,
                    from = self.states[pair[0]].name(),
                    to = self.states[pair[1]].name(),
                    "skipping pair: path uses a transition the model does not have"
                );
                return;
            }
        }

        for pair in indices.windows(2) {
            expected[[pair[0], pair[1]]] += 1.0;
        }
        for (symbol, &state) in sequence.iter().zip(&emitting) {
            samples.push(state, symbol.clone(), 1.0);
        }
    }

    /// The shared edge update: per source, renormalize the accumulated
    /// counts (plus pseudocounts) and blend with the previous
    /// probability by the edge inertia. A row with zero accumulated mass
    /// is left unchanged.
    fn apply_edge_update(&mut self, expected: &Array2<f64>, config: &TrainConfig) {
        let flat = config.transition_pseudocount();
        let inertia = config.edge_inertia();
        for k in 0..self.len() {
            let range = self.out_edges(k);
            if range.is_empty() {
                continue;
            }
            let mut norm = 0.0;
            for idx in range.clone() {
                norm += expected[[k, self.out_target[idx]]] + flat + self.edge_pseudocount(idx, config);
            }
            if norm <= 0.0 {
                continue;
            }
            for idx in range {
                let contribution =
                    expected[[k, self.out_target[idx]]] + flat + self.edge_pseudocount(idx, config);
                let probability =
                    self.out_log_p[idx].exp() * inertia + (contribution / norm) * (1.0 - inertia);
                let log_p = probability.ln();
                self.out_log_p[idx] = log_p;
                self.in_log_p[self.out_to_in[idx]] = log_p;
            }
        }
    }

    fn edge_pseudocount(&self, idx: usize, config: &TrainConfig) -> f64 {
        if config.use_pseudocount() {
            self.out_pseudocount[idx]
        } else {
            0.0
        }
    }

    /// Refits each tie class once on its pooled weighted samples.
    /// Classes with no samples, zero pooled weight, or a frozen emission
    /// are left unchanged.
    fn fit_classes(
        &self,
        classes: &[Vec<usize>],
        samples: &ClassSamples,
    ) -> Result<(), ModelError> {
        for class in classes {
            let rep = class[0];
            let observed = &samples.samples[rep];
            let weights = &samples.weights[rep];
            if observed.is_empty() || weights.iter().sum::<f64>() == 0.0 {
                continue;
            }
            let emission = self.states[rep]
                .emission()
                .expect("states before silent_start emit");
            if emission.is_frozen() {
                continue;
            }
            emission.fit(observed, weights)?;
        }
        Ok(())
    }
}
