//! Weighted mixtures of emission distributions.

use hades_stats::log_sum_exp;
use rand::Rng;

use crate::distribution::Distribution;
use crate::error::DistributionError;
use crate::symbol::Symbol;

/// A convex combination of component distributions.
///
/// Scoring log-sums the weighted component scores; sampling selects a
/// component by weight and delegates. Mixtures are not re-estimated by
/// the trainers: `fit` is a no-op.
#[derive(Debug, Clone)]
pub struct Mixture {
    components: Vec<Distribution>,
    weights: Vec<f64>,
}

impl Mixture {
    /// Creates an equally weighted mixture.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::EmptySupport`] when `components` is
    /// empty.
    pub fn new(components: Vec<Distribution>) -> Result<Self, DistributionError> {
        let weights = vec![1.0; components.len()];
        Self::weighted(components, weights)
    }

    /// Creates a mixture with explicit component weights, normalized to
    /// sum to 1.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::EmptySupport`] when there are no
    /// components or all weights are zero,
    /// [`DistributionError::WeightLengthMismatch`] on a length mismatch,
    /// and [`DistributionError::InvalidParameter`] for a negative or
    /// non-finite weight.
    pub fn weighted(
        components: Vec<Distribution>,
        weights: Vec<f64>,
    ) -> Result<Self, DistributionError> {
        if components.is_empty() {
            return Err(DistributionError::EmptySupport {
                reason: "mixture has no components",
            });
        }
        if weights.len() != components.len() {
            return Err(DistributionError::WeightLengthMismatch {
                samples: components.len(),
                weights: weights.len(),
            });
        }
        for &w in &weights {
            if !w.is_finite() || w < 0.0 {
                return Err(DistributionError::InvalidParameter {
                    name: "weight",
                    value: w,
                    requirement: "must be finite and non-negative",
                });
            }
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(DistributionError::EmptySupport {
                reason: "all mixture weights are zero",
            });
        }
        let weights = weights.into_iter().map(|w| w / total).collect();
        Ok(Self {
            components,
            weights,
        })
    }

    /// Component distributions.
    pub fn components(&self) -> &[Distribution] {
        &self.components
    }

    /// Normalized component weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Log score: `log(Σ_j w_j · exp(component_j.log_probability(x)))`.
    pub fn log_probability(&self, x: &Symbol) -> f64 {
        let mut acc = f64::NEG_INFINITY;
        for (component, &w) in self.components.iter().zip(&self.weights) {
            if w == 0.0 {
                continue;
            }
            acc = log_sum_exp(acc, w.ln() + component.log_probability(x));
        }
        acc
    }

    /// Draws one variate: selects a component by cumulative weight (in
    /// storage order, falling back to the last component on rounding),
    /// then samples from it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Symbol, DistributionError> {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (component, &w) in self.components.iter().zip(&self.weights) {
            cumulative += w;
            if cumulative >= u {
                return component.sample(rng);
            }
        }
        self.components
            .last()
            .expect("components validated non-empty at construction")
            .sample(rng)
    }
}
