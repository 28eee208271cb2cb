//! Configuration for model training.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::ModelError;

/// Which re-estimation algorithm [`crate::Model::train`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainAlgorithm {
    /// Baum-Welch expectation-maximization over posterior expectations.
    #[default]
    BaumWelch,
    /// Hard EM over the Viterbi path of each sequence.
    Viterbi,
}

/// Configuration for the training loops.
///
/// Use the builder methods to customise parameters.
///
/// # Example
///
/// ```
/// use hades_model::TrainConfig;
///
/// let config = TrainConfig::new()
///     .with_max_iterations(50)
///     .with_transition_pseudocount(1.0)
///     .with_edge_inertia(0.1);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TrainConfig {
    algorithm: TrainAlgorithm,
    stop_threshold: f64,
    min_iterations: usize,
    max_iterations: usize,
    transition_pseudocount: f64,
    use_pseudocount: bool,
    edge_inertia: f64,
    emission_threshold: f64,
    max_duration: Option<Duration>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: Baum-Welch, `stop_threshold = 1e-9`,
    /// `min_iterations = 0`, `max_iterations = 1000`, no transition
    /// pseudocount, per-edge pseudocounts disabled, no edge inertia,
    /// no emission threshold, no deadline, no cancellation flag.
    pub fn new() -> Self {
        Self {
            algorithm: TrainAlgorithm::BaumWelch,
            stop_threshold: 1e-9,
            min_iterations: 0,
            max_iterations: 1000,
            transition_pseudocount: 0.0,
            use_pseudocount: false,
            edge_inertia: 0.0,
            emission_threshold: 0.0,
            max_duration: None,
            cancel_flag: None,
        }
    }

    /// Sets the re-estimation algorithm.
    pub fn with_algorithm(mut self, algorithm: TrainAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the improvement below which iteration stops.
    pub fn with_stop_threshold(mut self, threshold: f64) -> Self {
        self.stop_threshold = threshold;
        self
    }

    /// Sets the minimum number of iterations run before the stop
    /// threshold applies.
    pub fn with_min_iterations(mut self, iterations: usize) -> Self {
        self.min_iterations = iterations;
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the flat pseudocount added to every transition expectation.
    pub fn with_transition_pseudocount(mut self, pseudocount: f64) -> Self {
        self.transition_pseudocount = pseudocount;
        self
    }

    /// Enables the per-edge pseudocounts recorded at graph build time.
    pub fn with_use_pseudocount(mut self, use_pseudocount: bool) -> Self {
        self.use_pseudocount = use_pseudocount;
        self
    }

    /// Sets the fraction of the previous transition probability retained
    /// at each update (0 = replace, 1 = keep).
    pub fn with_edge_inertia(mut self, inertia: f64) -> Self {
        self.edge_inertia = inertia;
        self
    }

    /// Sets the minimum posterior weight an observation needs to enter
    /// a distribution fit.
    pub fn with_emission_threshold(mut self, threshold: f64) -> Self {
        self.emission_threshold = threshold;
        self
    }

    /// Sets a wall-clock budget, checked between iterations.
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Installs a cancellation flag, checked between iterations. Setting
    /// the flag stops training before the next iteration; the current
    /// iteration still commits.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    // --- Accessors ---

    /// Returns the re-estimation algorithm.
    pub fn algorithm(&self) -> TrainAlgorithm {
        self.algorithm
    }

    /// Returns the stop threshold.
    pub fn stop_threshold(&self) -> f64 {
        self.stop_threshold
    }

    /// Returns the minimum iteration count.
    pub fn min_iterations(&self) -> usize {
        self.min_iterations
    }

    /// Returns the iteration cap.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns the flat transition pseudocount.
    pub fn transition_pseudocount(&self) -> f64 {
        self.transition_pseudocount
    }

    /// Returns whether per-edge pseudocounts are applied.
    pub fn use_pseudocount(&self) -> bool {
        self.use_pseudocount
    }

    /// Returns the edge inertia.
    pub fn edge_inertia(&self) -> f64 {
        self.edge_inertia
    }

    /// Returns the emission weight threshold.
    pub fn emission_threshold(&self) -> f64 {
        self.emission_threshold
    }

    /// Returns the wall-clock budget, if any.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Returns whether the cancellation flag is set.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Validates this configuration.
    ///
    /// The stop threshold must not be NaN, pseudocounts and the emission
    /// threshold must be finite and non-negative, and the edge inertia
    /// must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.stop_threshold.is_nan() {
            return Err(ModelError::InvalidConfig {
                reason: "stop_threshold must not be NaN".to_string(),
            });
        }
        if !self.transition_pseudocount.is_finite() || self.transition_pseudocount < 0.0 {
            return Err(ModelError::InvalidConfig {
                reason: format!(
                    "transition_pseudocount must be finite and non-negative, got {}",
                    self.transition_pseudocount
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.edge_inertia) {
            return Err(ModelError::InvalidConfig {
                reason: format!("edge_inertia must lie in [0, 1], got {}", self.edge_inertia),
            });
        }
        if !self.emission_threshold.is_finite() || self.emission_threshold < 0.0 {
            return Err(ModelError::InvalidConfig {
                reason: format!(
                    "emission_threshold must be finite and non-negative, got {}",
                    self.emission_threshold
                ),
            });
        }
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::new()
    }
}
