//! Parametric continuous emission distributions.
//!
//! Each type exposes the same surface: a validating constructor,
//! `log_probability` over a real observation, `sample`, and a weighted
//! maximum-likelihood `fit` that leaves the parameters untouched when the
//! data carry no weight.

use hades_stats::{trigamma, weighted_variance};
use rand::Rng;
use rand_distr::Distribution as _;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::error::DistributionError;

/// Default lower bound on the standard deviation of a fitted [`Normal`].
pub const DEFAULT_MIN_STD: f64 = 0.01;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Continuous uniform distribution on the closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uniform {
    low: f64,
    high: f64,
}

impl Uniform {
    /// Creates a uniform distribution after validating `low <= high` and
    /// that both bounds are finite.
    pub fn new(low: f64, high: f64) -> Result<Self, DistributionError> {
        if !low.is_finite() {
            return Err(DistributionError::InvalidParameter {
                name: "low",
                value: low,
                requirement: "must be finite",
            });
        }
        if !high.is_finite() || high < low {
            return Err(DistributionError::InvalidParameter {
                name: "high",
                value: high,
                requirement: "must be finite and >= low",
            });
        }
        Ok(Self { low, high })
    }

    /// Lower bound.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper bound.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Log density at `x`: `-log(high - low)` inside the interval, `-inf`
    /// outside. A degenerate interval (`low == high`) is a point mass, so
    /// hitting it exactly scores 0.
    pub fn log_probability(&self, x: f64) -> f64 {
        if x < self.low || x > self.high {
            return f64::NEG_INFINITY;
        }
        if self.low == self.high {
            return 0.0;
        }
        -(self.high - self.low).ln()
    }

    /// Draws one variate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.low == self.high {
            return self.low;
        }
        rng.random_range(self.low..self.high)
    }

    /// Replaces the bounds with the min/max of the positively weighted
    /// samples. No-op when nothing carries positive weight.
    pub fn fit(&mut self, values: &[f64], weights: &[f64]) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for (&x, &w) in values.iter().zip(weights) {
            if w > 0.0 {
                lo = lo.min(x);
                hi = hi.max(x);
            }
        }
        if lo <= hi {
            self.low = lo;
            self.high = hi;
        }
    }
}

/// Normal (Gaussian) distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal {
    mean: f64,
    std: f64,
    min_std: f64,
}

impl Normal {
    /// Creates a normal distribution after validating that `mean` is
    /// finite and `std` is finite and non-negative.
    pub fn new(mean: f64, std: f64) -> Result<Self, DistributionError> {
        if !mean.is_finite() {
            return Err(DistributionError::InvalidParameter {
                name: "mean",
                value: mean,
                requirement: "must be finite",
            });
        }
        if !std.is_finite() || std < 0.0 {
            return Err(DistributionError::InvalidParameter {
                name: "std",
                value: std,
                requirement: "must be finite and non-negative",
            });
        }
        Ok(Self {
            mean,
            std,
            min_std: DEFAULT_MIN_STD,
        })
    }

    /// Sets the lower bound the standard deviation is clamped to when
    /// fitting. Defaults to [`DEFAULT_MIN_STD`].
    pub fn with_min_std(mut self, min_std: f64) -> Self {
        self.min_std = min_std;
        self
    }

    /// Mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Standard deviation.
    pub fn std(&self) -> f64 {
        self.std
    }

    /// Log density at `x`. A zero-std normal is a point mass: exactly the
    /// mean scores 0, everything else `-inf`.
    pub fn log_probability(&self, x: f64) -> f64 {
        if self.std == 0.0 {
            return if (x - self.mean).abs() < f64::EPSILON {
                0.0
            } else {
                f64::NEG_INFINITY
            };
        }
        let z = (x - self.mean) / self.std;
        -0.5 * z * z - self.std.ln() - 0.5 * LN_2PI
    }

    /// Draws one variate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.std == 0.0 {
            return self.mean;
        }
        rand_distr::Normal::new(self.mean, self.std)
            .expect("parameters validated at construction")
            .sample(rng)
    }

    /// Weighted MLE: mean always updates; the standard deviation updates
    /// only when at least two samples carry positive weight (via
    /// `E[x²] − μ²`), clamped to `min_std`. No-op for zero total weight.
    pub fn fit(&mut self, values: &[f64], weights: &[f64]) {
        let total: f64 = weights.iter().sum();
        if total == 0.0 {
            return;
        }
        let mean = values.iter().zip(weights).map(|(&x, &w)| x * w).sum::<f64>() / total;
        let supported = weights.iter().filter(|&&w| w > 0.0).count();
        if supported >= 2 {
            let var = weighted_variance(values, weights);
            self.std = var.sqrt().max(self.min_std);
        }
        self.mean = mean;
    }
}

/// Exponential distribution with rate `lambda`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    rate: f64,
}

impl Exponential {
    /// Creates an exponential distribution after validating `rate > 0`.
    pub fn new(rate: f64) -> Result<Self, DistributionError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DistributionError::InvalidParameter {
                name: "rate",
                value: rate,
                requirement: "must be finite and positive",
            });
        }
        Ok(Self { rate })
    }

    /// Rate parameter.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Log density: `log(rate) - rate * x` for `x >= 0`, `-inf` below.
    pub fn log_probability(&self, x: f64) -> f64 {
        if x < 0.0 {
            return f64::NEG_INFINITY;
        }
        self.rate.ln() - self.rate * x
    }

    /// Draws one variate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rand_distr::Exp::new(self.rate)
            .expect("parameters validated at construction")
            .sample(rng)
    }

    /// Weighted MLE: `rate = 1 / weighted mean`. No-op when the weighted
    /// mean is not positive.
    pub fn fit(&mut self, values: &[f64], weights: &[f64]) {
        let total: f64 = weights.iter().sum();
        if total == 0.0 {
            return;
        }
        let mean = values.iter().zip(weights).map(|(&x, &w)| x * w).sum::<f64>() / total;
        if mean > 0.0 && mean.is_finite() {
            self.rate = 1.0 / mean;
        }
    }
}

/// Gamma distribution in the shape/rate convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gamma {
    shape: f64,
    rate: f64,
}

impl Gamma {
    const NEWTON_TOLERANCE: f64 = 1e-9;
    const NEWTON_MAX_ITERATIONS: usize = 1000;

    /// Creates a gamma distribution after validating that both `shape`
    /// and `rate` are finite and positive.
    pub fn new(shape: f64, rate: f64) -> Result<Self, DistributionError> {
        if !shape.is_finite() || shape <= 0.0 {
            return Err(DistributionError::InvalidParameter {
                name: "shape",
                value: shape,
                requirement: "must be finite and positive",
            });
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DistributionError::InvalidParameter {
                name: "rate",
                value: rate,
                requirement: "must be finite and positive",
            });
        }
        Ok(Self { shape, rate })
    }

    /// Shape parameter (α).
    pub fn shape(&self) -> f64 {
        self.shape
    }

    /// Rate parameter (β).
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Log density for `x > 0`, `-inf` otherwise.
    pub fn log_probability(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        self.shape * self.rate.ln() - ln_gamma(self.shape) + (self.shape - 1.0) * x.ln()
            - self.rate * x
    }

    /// Draws one variate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rand_distr::Gamma::new(self.shape, 1.0 / self.rate)
            .expect("parameters validated at construction")
            .sample(rng)
    }

    /// Weighted MLE via Newton–Raphson on the shape.
    ///
    /// The sufficient statistic is `s = log(mean) - mean(log)`. The shape
    /// is seeded with the Minka closed form when `s > 0` (the previous
    /// shape otherwise) and iterated until the step drops below 1e-9 or
    /// 1000 iterations pass; a diverging iterate is reseeded uniformly in
    /// (0, 1). The rate is then the analytic `shape / weighted mean`.
    /// Only positively weighted samples with `x > 0` participate; the fit
    /// is a no-op when none remain.
    pub fn fit(&mut self, values: &[f64], weights: &[f64]) {
        let mut total_w = 0.0;
        let mut sum_xw = 0.0;
        let mut sum_logw = 0.0;
        for (&x, &w) in values.iter().zip(weights) {
            if w > 0.0 && x > 0.0 {
                total_w += w;
                sum_xw += x * w;
                sum_logw += x.ln() * w;
            }
        }
        if total_w == 0.0 || sum_xw <= 0.0 {
            return;
        }
        let mean = sum_xw / total_w;
        let mean_log = sum_logw / total_w;
        let s = mean.ln() - mean_log;

        let mut shape = if s > 0.0 {
            (3.0 - s + ((s - 3.0) * (s - 3.0) + 24.0 * s).sqrt()) / (12.0 * s)
        } else {
            self.shape
        };

        let mut rng = rand::rng();
        for _ in 0..Self::NEWTON_MAX_ITERATIONS {
            let step = (shape.ln() - digamma(shape) - s) / (1.0 / shape - trigamma(shape));
            let next = shape - step;
            if !next.is_finite() || next <= 0.0 {
                // Diverged; restart from a fresh point in (0, 1).
                shape = rng.random::<f64>().max(f64::MIN_POSITIVE);
                continue;
            }
            let converged = (next - shape).abs() < Self::NEWTON_TOLERANCE;
            shape = next;
            if converged {
                break;
            }
        }

        self.shape = shape;
        self.rate = shape / mean;
    }
}

/// Inverse-gamma distribution, expressed through the reciprocal of a
/// [`Gamma`]: scoring evaluates the gamma density at `1/x`, sampling
/// inverts a gamma draw, and fitting runs the gamma fit on reciprocals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseGamma {
    gamma: Gamma,
}

impl InverseGamma {
    /// Creates an inverse-gamma distribution; parameters are validated by
    /// the underlying [`Gamma`].
    pub fn new(shape: f64, rate: f64) -> Result<Self, DistributionError> {
        Ok(Self {
            gamma: Gamma::new(shape, rate)?,
        })
    }

    /// Shape parameter (α).
    pub fn shape(&self) -> f64 {
        self.gamma.shape()
    }

    /// Rate parameter (β).
    pub fn rate(&self) -> f64 {
        self.gamma.rate()
    }

    /// Log score at `x`: the gamma log density evaluated at `1/x`;
    /// `-inf` for `x <= 0`.
    pub fn log_probability(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        self.gamma.log_probability(1.0 / x)
    }

    /// Draws one variate as the reciprocal of a gamma draw.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        1.0 / self.gamma.sample(rng)
    }

    /// Fits the underlying gamma on the reciprocals of the positive
    /// samples.
    pub fn fit(&mut self, values: &[f64], weights: &[f64]) {
        let mut recip = Vec::with_capacity(values.len());
        let mut recip_w = Vec::with_capacity(values.len());
        for (&x, &w) in values.iter().zip(weights) {
            if x > 0.0 {
                recip.push(1.0 / x);
                recip_w.push(w);
            }
        }
        self.gamma.fit(&recip, &recip_w);
    }
}
