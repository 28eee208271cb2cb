//! Error types for the hades-model crate.

use hades_distributions::DistributionError;

/// Error type for all fallible operations in the hades-model crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Returned when baking leaves no emitting states.
    #[error("model has no emitting states after baking")]
    Empty,

    /// Returned when the silent states form a cycle.
    #[error("silent states form a cycle through: {names:?}")]
    SilentCycle {
        /// Names of the silent states left unordered by the topological
        /// sort.
        names: Vec<String>,
    },

    /// Returned when a transition probability is outside `[0, 1]`.
    #[error("transition probability {value} is outside [0, 1]")]
    InvalidProbability {
        /// The offending probability.
        value: f64,
    },

    /// Returned when a transition pseudocount is negative or non-finite.
    #[error("transition pseudocount {value} must be finite and non-negative")]
    InvalidPseudocount {
        /// The offending pseudocount.
        value: f64,
    },

    /// Returned when a state weight is non-positive or non-finite.
    #[error("state weight {value} of {name} must be finite and positive")]
    InvalidStateWeight {
        /// Name of the offending state.
        name: String,
        /// The offending weight.
        value: f64,
    },

    /// Returned when a transition references a state outside the graph.
    #[error("state {name} is not part of this model")]
    UnknownState {
        /// Name of the missing state.
        name: String,
    },

    /// Returned when a baked row of outgoing probabilities does not sum
    /// to one.
    #[error("outgoing probabilities of {name} sum to {sum}, expected ~1.0")]
    NotRowStochastic {
        /// Name of the offending state.
        name: String,
        /// The actual row sum.
        sum: f64,
    },

    /// Returned when a sequence has zero probability under the model.
    #[error("sequence has zero probability under this model")]
    ImpossibleSequence,

    /// Returned when sampling an infinite model without a length bound.
    #[error("sampling an infinite model requires a length bound")]
    LengthRequired,

    /// Returned when a training configuration fails validation.
    #[error("invalid training configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// A distribution-level failure surfaced through the model API.
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_empty() {
        assert_eq!(
            ModelError::Empty.to_string(),
            "model has no emitting states after baking"
        );
    }

    #[test]
    fn error_silent_cycle() {
        let e = ModelError::SilentCycle {
            names: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            e.to_string(),
            "silent states form a cycle through: [\"a\", \"b\"]"
        );
    }

    #[test]
    fn error_invalid_probability() {
        let e = ModelError::InvalidProbability { value: 1.5 };
        assert_eq!(e.to_string(), "transition probability 1.5 is outside [0, 1]");
    }

    #[test]
    fn error_unknown_state() {
        let e = ModelError::UnknownState { name: "s9".into() };
        assert_eq!(e.to_string(), "state s9 is not part of this model");
    }

    #[test]
    fn error_not_row_stochastic() {
        let e = ModelError::NotRowStochastic {
            name: "s1".into(),
            sum: 0.5,
        };
        assert_eq!(
            e.to_string(),
            "outgoing probabilities of s1 sum to 0.5, expected ~1.0"
        );
    }

    #[test]
    fn error_from_distribution() {
        let inner = DistributionError::NotSamplable;
        let e: ModelError = inner.into();
        assert_eq!(e.to_string(), "custom distributions cannot be sampled");
    }

    #[test]
    fn error_is_std_error_send_sync() {
        fn assert_impl<T: std::error::Error + Send + Sync>() {}
        assert_impl::<ModelError>();
    }
}
