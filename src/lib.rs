//! Hidden Markov models with heterogeneous emissions, silent states,
//! tied distributions, and sub-model composition.
//!
//! `hades` is a facade over the workspace crates:
//!
//! - [`hades_distributions`] — the observation type and the emission
//!   distribution algebra (parametric, discrete, kernel density,
//!   mixtures, custom), behind shared [`Emission`] handles;
//! - [`hades_model`] — the mutable [`ModelBuilder`] graph, the baked
//!   [`Model`] with its dynamic-programming kernels (forward, backward,
//!   Viterbi, forward-backward, posterior decoding), sampling, and the
//!   Baum-Welch / Viterbi / labelled trainers;
//! - [`hades_stats`] — the shared log-space numeric helpers.
//!
//! # Example
//!
//! ```rust
//! use hades::{
//!     Emission, MergePolicy, ModelBuilder, Normal, State, Symbol, TrainConfig,
//! };
//!
//! // A two-state model over real observations.
//! let mut builder = ModelBuilder::new("weather");
//! let cold = State::emitting("cold", Emission::new(Normal::new(0.0, 1.0)?));
//! let warm = State::emitting("warm", Emission::new(Normal::new(8.0, 2.0)?));
//! builder.add_state(cold.clone());
//! builder.add_state(warm.clone());
//! let start = builder.start().clone();
//! let end = builder.end().clone();
//! builder.add_transition(&start, &cold, 0.5)?;
//! builder.add_transition(&start, &warm, 0.5)?;
//! builder.add_transition(&cold, &cold, 0.6)?;
//! builder.add_transition(&cold, &warm, 0.2)?;
//! builder.add_transition(&cold, &end, 0.2)?;
//! builder.add_transition(&warm, &warm, 0.6)?;
//! builder.add_transition(&warm, &cold, 0.2)?;
//! builder.add_transition(&warm, &end, 0.2)?;
//! let mut model = builder.bake(MergePolicy::All)?;
//!
//! // Decode and train.
//! let sequence = Symbol::reals(&[0.3, 7.5, 8.8, -0.2]);
//! let (_, path) = model.viterbi(&sequence);
//! assert!(path.is_some());
//! let improvement = model.train(&[sequence], &TrainConfig::new())?;
//! assert!(improvement >= 0.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use hades_distributions::{
    Custom, DEFAULT_MIN_STD, Discrete, Distribution, DistributionError, Emission, Exponential,
    Gamma, InverseGamma, Kernel, KernelDensity, Mixture, Normal, Symbol, Uniform,
};
pub use hades_model::{
    MergePolicy, Model, ModelBuilder, ModelError, State, TrainAlgorithm, TrainConfig,
};
pub use hades_stats::{log_sum_exp, log_sum_exp_slice};
