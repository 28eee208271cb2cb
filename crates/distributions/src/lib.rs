//! Emission distributions for hidden Markov models.
//!
//! This crate provides the observation type ([`Symbol`]), a closed
//! algebra of emission distributions ([`Distribution`]) with a uniform
//! score/sample/fit contract, and the shared handle ([`Emission`]) that
//! model states hold — clones of one handle are *tied* and are refitted
//! together during training.
//!
//! # Quick start
//!
//! ```rust
//! use hades_distributions::{Emission, Normal, Symbol};
//!
//! let emission = Emission::new(Normal::new(0.0, 1.0)?);
//! let tied = emission.clone();        // shares parameters
//! let untied = emission.clone_untied(); // independent copy
//!
//! assert!(emission.ptr_eq(&tied));
//! assert!(!emission.ptr_eq(&untied));
//! assert!(emission.log_probability(&Symbol::Real(0.5)) < 0.0);
//! # Ok::<(), hades_distributions::DistributionError>(())
//! ```

pub mod custom;
pub mod discrete;
pub mod distribution;
pub mod emission;
pub mod error;
pub mod kernel;
pub mod mixture;
pub mod parametric;
pub mod symbol;

pub use custom::Custom;
pub use discrete::Discrete;
pub use distribution::Distribution;
pub use emission::Emission;
pub use error::DistributionError;
pub use kernel::{Kernel, KernelDensity};
pub use mixture::Mixture;
pub use parametric::{DEFAULT_MIN_STD, Exponential, Gamma, InverseGamma, Normal, Uniform};
pub use symbol::Symbol;
