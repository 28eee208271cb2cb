//! The closed set of emission distributions.

use rand::Rng;

use crate::custom::Custom;
use crate::discrete::Discrete;
use crate::error::DistributionError;
use crate::kernel::KernelDensity;
use crate::mixture::Mixture;
use crate::parametric::{Exponential, Gamma, InverseGamma, Normal, Uniform};
use crate::symbol::Symbol;

/// An emission distribution.
///
/// Every variant honours the same contract:
///
/// - `log_probability(x)` returns the log pdf/pmf, `-inf` where the
///   observation is disallowed (including a continuous distribution
///   scoring a token and vice versa);
/// - `sample(rng)` draws one observation;
/// - `fit(samples, weights)` replaces the parameters with the weighted
///   maximum-likelihood estimate, and is a no-op when the samples are
///   empty or carry zero total weight.
///
/// [`Distribution::Mixture`] and [`Distribution::Custom`] opt out of
/// parts of the contract: mixtures are not re-estimated, and custom
/// distributions can neither be sampled nor fitted.
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Continuous uniform on a closed interval.
    Uniform(Uniform),
    /// Normal (Gaussian).
    Normal(Normal),
    /// Exponential.
    Exponential(Exponential),
    /// Gamma (shape/rate).
    Gamma(Gamma),
    /// Inverse-gamma, delegating to a gamma on reciprocals.
    InverseGamma(InverseGamma),
    /// Finite pmf over tokens.
    Discrete(Discrete),
    /// Kernel density estimate (Gaussian, uniform, or triangular kernel).
    KernelDensity(KernelDensity),
    /// Convex combination of other distributions.
    Mixture(Mixture),
    /// User-supplied log-probability function.
    Custom(Custom),
}

impl Distribution {
    /// Log probability of an observation.
    pub fn log_probability(&self, x: &Symbol) -> f64 {
        match self {
            Distribution::Uniform(d) => real_score(x, |v| d.log_probability(v)),
            Distribution::Normal(d) => real_score(x, |v| d.log_probability(v)),
            Distribution::Exponential(d) => real_score(x, |v| d.log_probability(v)),
            Distribution::Gamma(d) => real_score(x, |v| d.log_probability(v)),
            Distribution::InverseGamma(d) => real_score(x, |v| d.log_probability(v)),
            Distribution::KernelDensity(d) => real_score(x, |v| d.log_probability(v)),
            Distribution::Discrete(d) => match x {
                Symbol::Token(t) => d.log_probability(t),
                Symbol::Real(_) => f64::NEG_INFINITY,
            },
            Distribution::Mixture(d) => d.log_probability(x),
            Distribution::Custom(d) => d.log_probability(x),
        }
    }

    /// Draws one observation.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::NotSamplable`] for
    /// [`Distribution::Custom`].
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Symbol, DistributionError> {
        match self {
            Distribution::Uniform(d) => Ok(Symbol::Real(d.sample(rng))),
            Distribution::Normal(d) => Ok(Symbol::Real(d.sample(rng))),
            Distribution::Exponential(d) => Ok(Symbol::Real(d.sample(rng))),
            Distribution::Gamma(d) => Ok(Symbol::Real(d.sample(rng))),
            Distribution::InverseGamma(d) => Ok(Symbol::Real(d.sample(rng))),
            Distribution::KernelDensity(d) => Ok(Symbol::Real(d.sample(rng))),
            Distribution::Discrete(d) => Ok(Symbol::Token(d.sample(rng))),
            Distribution::Mixture(d) => d.sample(rng),
            Distribution::Custom(_) => Err(DistributionError::NotSamplable),
        }
    }

    /// Replaces the parameters with the weighted maximum-likelihood
    /// estimate.
    ///
    /// Observations outside a variant's domain (tokens for a continuous
    /// distribution, reals for a discrete one) contribute nothing.
    /// A no-op when `samples` is empty or the weights sum to zero, and
    /// always a no-op for mixtures and custom distributions.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::WeightLengthMismatch`] when `samples`
    /// and `weights` differ in length.
    pub fn fit(&mut self, samples: &[Symbol], weights: &[f64]) -> Result<(), DistributionError> {
        if samples.len() != weights.len() {
            return Err(DistributionError::WeightLengthMismatch {
                samples: samples.len(),
                weights: weights.len(),
            });
        }
        if samples.is_empty() || weights.iter().sum::<f64>() == 0.0 {
            return Ok(());
        }
        match self {
            Distribution::Uniform(d) => {
                let (values, ws) = real_samples(samples, weights);
                d.fit(&values, &ws);
            }
            Distribution::Normal(d) => {
                let (values, ws) = real_samples(samples, weights);
                d.fit(&values, &ws);
            }
            Distribution::Exponential(d) => {
                let (values, ws) = real_samples(samples, weights);
                d.fit(&values, &ws);
            }
            Distribution::Gamma(d) => {
                let (values, ws) = real_samples(samples, weights);
                d.fit(&values, &ws);
            }
            Distribution::InverseGamma(d) => {
                let (values, ws) = real_samples(samples, weights);
                d.fit(&values, &ws);
            }
            Distribution::KernelDensity(d) => {
                let (values, ws) = real_samples(samples, weights);
                d.fit(&values, &ws);
            }
            Distribution::Discrete(d) => {
                d.fit(
                    samples
                        .iter()
                        .zip(weights)
                        .filter_map(|(s, &w)| s.as_token().map(|t| (t, w))),
                );
            }
            Distribution::Mixture(_) | Distribution::Custom(_) => {}
        }
        Ok(())
    }
}

fn real_score(x: &Symbol, score: impl Fn(f64) -> f64) -> f64 {
    match x.as_real() {
        Some(v) => score(v),
        None => f64::NEG_INFINITY,
    }
}

fn real_samples(samples: &[Symbol], weights: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut values = Vec::with_capacity(samples.len());
    let mut ws = Vec::with_capacity(samples.len());
    for (s, &w) in samples.iter().zip(weights) {
        if let Some(v) = s.as_real() {
            values.push(v);
            ws.push(w);
        }
    }
    (values, ws)
}

impl From<Uniform> for Distribution {
    fn from(d: Uniform) -> Self {
        Distribution::Uniform(d)
    }
}

impl From<Normal> for Distribution {
    fn from(d: Normal) -> Self {
        Distribution::Normal(d)
    }
}

impl From<Exponential> for Distribution {
    fn from(d: Exponential) -> Self {
        Distribution::Exponential(d)
    }
}

impl From<Gamma> for Distribution {
    fn from(d: Gamma) -> Self {
        Distribution::Gamma(d)
    }
}

impl From<InverseGamma> for Distribution {
    fn from(d: InverseGamma) -> Self {
        Distribution::InverseGamma(d)
    }
}

impl From<Discrete> for Distribution {
    fn from(d: Discrete) -> Self {
        Distribution::Discrete(d)
    }
}

impl From<KernelDensity> for Distribution {
    fn from(d: KernelDensity) -> Self {
        Distribution::KernelDensity(d)
    }
}

impl From<Mixture> for Distribution {
    fn from(d: Mixture) -> Self {
        Distribution::Mixture(d)
    }
}

impl From<Custom> for Distribution {
    fn from(d: Custom) -> Self {
        Distribution::Custom(d)
    }
}
