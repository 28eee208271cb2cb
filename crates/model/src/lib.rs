//! Hidden Markov models with silent states, tied emissions, and
//! sub-model composition.
//!
//! Models are built in two phases: a mutable [`ModelBuilder`] graph
//! collects states and weighted transitions (including whole sub-models),
//! and [`ModelBuilder::bake`] compiles it into an immutable [`Model`] —
//! orphans pruned, probabilities normalized, redundant silent states
//! merged, silent states topologically ordered, and edges laid out as
//! index-based sparse arrays. The dynamic-programming kernels (forward,
//! backward, Viterbi, forward-backward, posterior decoding), sampling,
//! and the trainers all operate on the baked form.
//!
//! # Pipeline
//!
//! ```text
//!  ┌──────────────┐     ┌────────────────┐     ┌───────────────────────┐
//!  │ ModelBuilder  │────▶│     bake       │────▶│  Model: kernels,      │
//!  │ (edit graph)  │     │ (compile)      │     │  sampling, training   │
//!  └──────────────┘     └────────────────┘     └───────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use hades_distributions::{Emission, Normal, Symbol};
//! use hades_model::{MergePolicy, ModelBuilder, State};
//!
//! let mut builder = ModelBuilder::new("demo");
//! let rainy = State::emitting("rainy", Emission::new(Normal::new(5.0, 2.0)?));
//! let sunny = State::emitting("sunny", Emission::new(Normal::new(0.0, 1.0)?));
//! builder.add_state(rainy.clone());
//! builder.add_state(sunny.clone());
//! let start = builder.start().clone();
//! let end = builder.end().clone();
//! builder.add_transition(&start, &rainy, 0.5)?;
//! builder.add_transition(&start, &sunny, 0.5)?;
//! builder.add_transition(&rainy, &rainy, 0.6)?;
//! builder.add_transition(&rainy, &sunny, 0.2)?;
//! builder.add_transition(&rainy, &end, 0.2)?;
//! builder.add_transition(&sunny, &sunny, 0.6)?;
//! builder.add_transition(&sunny, &rainy, 0.2)?;
//! builder.add_transition(&sunny, &end, 0.2)?;
//!
//! let model = builder.bake(MergePolicy::All)?;
//! let sequence = Symbol::reals(&[0.2, 4.8, 5.5]);
//! let (score, path) = model.viterbi(&sequence);
//! assert!(score < model.log_probability(&sequence) + 1e-9);
//! assert!(path.is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bake;
mod backward;
pub mod compiled;
pub mod config;
pub mod error;
mod forward;
pub mod graph;
mod posterior;
mod sample;
pub mod state;
mod train;
mod viterbi;

pub use bake::MergePolicy;
pub use compiled::Model;
pub use config::{TrainAlgorithm, TrainConfig};
pub use error::ModelError;
pub use graph::ModelBuilder;
pub use state::State;
