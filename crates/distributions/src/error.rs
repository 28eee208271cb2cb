//! Error types for the hades-distributions crate.

/// Error type for all fallible operations in the hades-distributions crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DistributionError {
    /// Returned when a distribution parameter is outside its domain.
    #[error("invalid parameter {name}: {value} ({requirement})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The offending value.
        value: f64,
        /// What the parameter must satisfy.
        requirement: &'static str,
    },

    /// Returned when samples and weights differ in length.
    #[error("length mismatch: {samples} samples, {weights} weights")]
    WeightLengthMismatch {
        /// Number of samples provided.
        samples: usize,
        /// Number of weights provided.
        weights: usize,
    },

    /// Returned when a distribution is constructed with no support.
    #[error("distribution has no support: {reason}")]
    EmptySupport {
        /// Description of the problem.
        reason: &'static str,
    },

    /// Returned when sampling a custom (log-probability-only) distribution.
    #[error("custom distributions cannot be sampled")]
    NotSamplable,
}
