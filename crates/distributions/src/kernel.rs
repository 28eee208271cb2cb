//! Kernel density emission distributions.

use hades_stats::log_sum_exp;
use rand::Rng;
use rand_distr::Distribution as _;

use crate::error::DistributionError;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Kernel shape placed on each support point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Gaussian bump: `N(x; point, bandwidth)`.
    Gaussian,
    /// Box of contribution 1 within `bandwidth` of the point.
    Uniform,
    /// Tent of contribution `bandwidth - |x - point|`, clipped at zero.
    Triangle,
}

/// Non-parametric density: a weighted sum of kernels centred on the
/// stored points.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelDensity {
    kernel: Kernel,
    points: Vec<f64>,
    weights: Vec<f64>,
    bandwidth: f64,
}

impl KernelDensity {
    /// Creates an equally weighted kernel density estimate.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::EmptySupport`] when `points` is empty
    /// and [`DistributionError::InvalidParameter`] when the bandwidth is
    /// not finite and positive.
    pub fn new(kernel: Kernel, points: Vec<f64>, bandwidth: f64) -> Result<Self, DistributionError> {
        let weights = vec![1.0; points.len()];
        Self::weighted(kernel, points, bandwidth, weights)
    }

    /// Creates a kernel density estimate with per-point weights, which
    /// are normalized to sum to 1.
    ///
    /// # Errors
    ///
    /// As [`KernelDensity::new`], plus
    /// [`DistributionError::WeightLengthMismatch`] when the weight vector
    /// has the wrong length and [`DistributionError::EmptySupport`] when
    /// all weights are zero.
    pub fn weighted(
        kernel: Kernel,
        points: Vec<f64>,
        bandwidth: f64,
        weights: Vec<f64>,
    ) -> Result<Self, DistributionError> {
        if points.is_empty() {
            return Err(DistributionError::EmptySupport {
                reason: "no kernel points",
            });
        }
        if !bandwidth.is_finite() || bandwidth <= 0.0 {
            return Err(DistributionError::InvalidParameter {
                name: "bandwidth",
                value: bandwidth,
                requirement: "must be finite and positive",
            });
        }
        if weights.len() != points.len() {
            return Err(DistributionError::WeightLengthMismatch {
                samples: points.len(),
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
                reason: "all kernel weights are zero",
            });
        }
        let weights = weights.into_iter().map(|w| w / total).collect();
        Ok(Self {
            kernel,
            points,
            weights,
            bandwidth,
        })
    }

    /// Kernel shape.
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Support points.
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Normalized per-point weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Bandwidth.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Log score at `x`: the log of the weighted sum of per-point kernel
    /// contributions.
    pub fn log_probability(&self, x: f64) -> f64 {
        match self.kernel {
            Kernel::Gaussian => {
                let mut acc = f64::NEG_INFINITY;
                for (&p, &w) in self.points.iter().zip(&self.weights) {
                    if w == 0.0 {
                        continue;
                    }
                    let z = (x - p) / self.bandwidth;
                    let log_density = -0.5 * z * z - self.bandwidth.ln() - 0.5 * LN_2PI;
                    acc = log_sum_exp(acc, w.ln() + log_density);
                }
                acc
            }
            Kernel::Uniform => {
                let mass: f64 = self
                    .points
                    .iter()
                    .zip(&self.weights)
                    .filter(|&(&p, _)| (x - p).abs() <= self.bandwidth)
                    .map(|(_, &w)| w)
                    .sum();
                mass.ln()
            }
            Kernel::Triangle => {
                let mass: f64 = self
                    .points
                    .iter()
                    .zip(&self.weights)
                    .map(|(&p, &w)| w * (self.bandwidth - (x - p).abs()).max(0.0))
                    .sum();
                mass.ln()
            }
        }
    }

    /// Draws one variate: picks a point by weight, then perturbs it with
    /// the kernel shape.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        let mut point = *self.points.last().expect("points validated non-empty");
        for (&p, &w) in self.points.iter().zip(&self.weights) {
            cumulative += w;
            if cumulative >= u {
                point = p;
                break;
            }
        }
        match self.kernel {
            Kernel::Gaussian => rand_distr::Normal::new(point, self.bandwidth)
                .expect("bandwidth validated at construction")
                .sample(rng),
            Kernel::Uniform => rng.random_range(point - self.bandwidth..point + self.bandwidth),
            Kernel::Triangle => {
                rand_distr::Triangular::new(point - self.bandwidth, point + self.bandwidth, point)
                    .expect("bandwidth validated at construction")
                    .sample(rng)
            }
        }
    }

    /// Replaces the support with the positively weighted samples and
    /// renormalizes their weights; bandwidth and kernel are kept. No-op
    /// when nothing carries positive weight.
    pub fn fit(&mut self, values: &[f64], weights: &[f64]) {
        let mut points = Vec::new();
        let mut kept = Vec::new();
        let mut total = 0.0;
        for (&x, &w) in values.iter().zip(weights) {
            if w > 0.0 {
                points.push(x);
                kept.push(w);
                total += w;
            }
        }
        if total == 0.0 {
            return;
        }
        for w in &mut kept {
            *w /= total;
        }
        self.points = points;
        self.weights = kept;
    }
}
