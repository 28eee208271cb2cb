//! Numeric helper functions shared across the hades workspace.
//!
//! Everything here operates in plain `f64`: log-space accumulation
//! primitives used by the dynamic-programming kernels, weighted moments
//! used by the distribution fits, and the one special function
//! (`trigamma`) that statrs does not provide.

/// Adds two log-space values: `log(exp(x) + exp(y))`.
///
/// Conventions: `log_sum_exp(-inf, y) = y` and
/// `log_sum_exp(+inf, _) = +inf`. The computation shifts by the larger
/// argument so that no intermediate overflows.
pub fn log_sum_exp(x: f64, y: f64) -> f64 {
    if x == f64::INFINITY || y == f64::INFINITY {
        return f64::INFINITY;
    }
    if x == f64::NEG_INFINITY {
        return y;
    }
    if y == f64::NEG_INFINITY {
        return x;
    }
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    hi + (lo - hi).exp().ln_1p()
}

/// Log-space sum of a slice: `log(Σ exp(x_i))`.
///
/// Returns `-inf` for an empty slice.
pub fn log_sum_exp_slice(values: &[f64]) -> f64 {
    values.iter().fold(f64::NEG_INFINITY, |acc, &v| log_sum_exp(acc, v))
}

/// Trigamma function ψ′(x) for `x > 0`.
///
/// Uses the recurrence ψ′(x) = ψ′(x + 1) + 1/x² to push the argument
/// past 10, then the standard asymptotic series. Returns NaN outside
/// the positive domain.
pub fn trigamma(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    let mut x = x;
    let mut acc = 0.0;
    while x < 10.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let y = 1.0 / (x * x);
    acc + 1.0 / x
        + 0.5 * y
        + y / x * (1.0 / 6.0 - y * (1.0 / 30.0 - y * (1.0 / 42.0 - y / 30.0)))
}

/// Weighted arithmetic mean. Returns 0.0 if the total weight is zero.
///
/// # Panics
///
/// Panics if `values` and `weights` differ in length.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    assert_eq!(
        values.len(),
        weights.len(),
        "weighted_mean: values and weights must have equal length"
    );
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let sum: f64 = values.iter().zip(weights).map(|(&x, &w)| x * w).sum();
    sum / total
}

/// Weighted population variance via `E[x²] − μ²`, clamped at zero.
///
/// Returns 0.0 if the total weight is zero.
///
/// # Panics
///
/// Panics if `values` and `weights` differ in length.
pub fn weighted_variance(values: &[f64], weights: &[f64]) -> f64 {
    assert_eq!(
        values.len(),
        weights.len(),
        "weighted_variance: values and weights must have equal length"
    );
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let mean: f64 = values.iter().zip(weights).map(|(&x, &w)| x * w).sum::<f64>() / total;
    let sq: f64 = values.iter().zip(weights).map(|(&x, &w)| x * x * w).sum::<f64>() / total;
    (sq - mean * mean).max(0.0)
}
