//! Discrete distribution over a finite token set.

use std::collections::BTreeMap;

use rand::Rng;

use crate::error::DistributionError;

/// Probability mass function over a finite set of tokens.
///
/// Tokens are kept in a sorted map so that sampling walks them in a
/// stable order. Unknown tokens score `-inf` unless an explicit unknown
/// log-probability is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrete {
    probabilities: BTreeMap<String, f64>,
    unknown_log_probability: f64,
}

impl Discrete {
    /// Creates a discrete distribution from `(token, weight)` pairs.
    ///
    /// Weights must be finite and non-negative; they are normalized to
    /// sum to 1. Duplicate tokens accumulate.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::EmptySupport`] when no pairs are
    /// given or all weights are zero, and
    /// [`DistributionError::InvalidParameter`] for a negative or
    /// non-finite weight.
    pub fn new<I, S>(probabilities: I) -> Result<Self, DistributionError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (token, p) in probabilities {
            if !p.is_finite() || p < 0.0 {
                return Err(DistributionError::InvalidParameter {
                    name: "probability",
                    value: p,
                    requirement: "must be finite and non-negative",
                });
            }
            *map.entry(token.into()).or_insert(0.0) += p;
        }
        if map.is_empty() {
            return Err(DistributionError::EmptySupport {
                reason: "no tokens given",
            });
        }
        let total: f64 = map.values().sum();
        if total <= 0.0 {
            return Err(DistributionError::EmptySupport {
                reason: "all token weights are zero",
            });
        }
        for p in map.values_mut() {
            *p /= total;
        }
        Ok(Self {
            probabilities: map,
            unknown_log_probability: f64::NEG_INFINITY,
        })
    }

    /// Sets the log-probability assigned to tokens outside the support
    /// (a pseudo-probability floor). Defaults to `-inf`.
    pub fn with_unknown_log_probability(mut self, log_probability: f64) -> Self {
        self.unknown_log_probability = log_probability;
        self
    }

    /// Returns the probability of a token (0.0 when unknown).
    pub fn probability(&self, token: &str) -> f64 {
        self.probabilities.get(token).copied().unwrap_or(0.0)
    }

    /// Returns the tokens and probabilities in sorted token order.
    pub fn probabilities(&self) -> impl Iterator<Item = (&str, f64)> {
        self.probabilities.iter().map(|(t, &p)| (t.as_str(), p))
    }

    /// Log probability of a token.
    pub fn log_probability(&self, token: &str) -> f64 {
        match self.probabilities.get(token) {
            Some(&p) => p.ln(),
            None => self.unknown_log_probability,
        }
    }

    /// Samples a token by walking the support in sorted order and
    /// accumulating probability until the draw is covered. Falls back to
    /// the last token if rounding leaves the draw uncovered.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (token, &p) in &self.probabilities {
            cumulative += p;
            if cumulative >= u {
                return token.clone();
            }
        }
        self.probabilities
            .keys()
            .next_back()
            .expect("support validated non-empty at construction")
            .clone()
    }

    /// Replaces the pmf with normalized per-token weight totals.
    /// Previously unseen tokens enter the support; a zero weight total
    /// leaves the distribution unchanged.
    pub fn fit<'a, I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        let mut total = 0.0;
        for (token, w) in samples {
            if w > 0.0 {
                *counts.entry(token.to_string()).or_insert(0.0) += w;
                total += w;
            }
        }
        if total == 0.0 {
            return;
        }
        for w in counts.values_mut() {
            *w /= total;
        }
        self.probabilities = counts;
    }
}
