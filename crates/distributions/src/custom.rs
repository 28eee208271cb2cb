//! User-supplied log-probability functions as emission distributions.

use std::fmt;
use std::sync::Arc;

use crate::symbol::Symbol;

/// An emission distribution defined only by a log-probability function.
///
/// Custom distributions cannot be sampled or fitted; the trainers leave
/// them untouched and model sampling fails on states that carry one.
#[derive(Clone)]
pub struct Custom {
    f: Arc<dyn Fn(&Symbol) -> f64 + Send + Sync>,
}

impl Custom {
    /// Wraps a log-probability function.
    pub fn new(f: impl Fn(&Symbol) -> f64 + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Evaluates the wrapped function.
    pub fn log_probability(&self, x: &Symbol) -> f64 {
        (self.f)(x)
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Custom(..)")
    }
}
