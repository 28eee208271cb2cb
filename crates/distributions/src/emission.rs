//! Shared-ownership emission handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;

use crate::distribution::Distribution;
use crate::error::DistributionError;
use crate::symbol::Symbol;

/// A shared handle to an emission distribution.
///
/// Cloning an `Emission` shares the underlying distribution: states
/// holding clones of one handle are *tied* and co-vary under training.
/// Handle identity ([`Emission::ptr_eq`]) is what the model compiler
/// uses to discover tie classes. Use [`Emission::clone_untied`] for an
/// independent copy.
///
/// A handle can be frozen, which turns every subsequent [`Emission::fit`]
/// into a no-op until it is thawed.
#[derive(Clone)]
pub struct Emission {
    inner: Arc<EmissionInner>,
}

struct EmissionInner {
    distribution: RwLock<Distribution>,
    frozen: AtomicBool,
}

impl Emission {
    /// Wraps a distribution in a fresh handle.
    pub fn new(distribution: impl Into<Distribution>) -> Self {
        Self {
            inner: Arc::new(EmissionInner {
                distribution: RwLock::new(distribution.into()),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Distribution> {
        self.inner
            .distribution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Distribution> {
        self.inner
            .distribution
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Log probability of an observation.
    pub fn log_probability(&self, x: &Symbol) -> f64 {
        self.read().log_probability(x)
    }

    /// Draws one observation.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Symbol, DistributionError> {
        self.read().sample(rng)
    }

    /// Refits the shared distribution on weighted samples. A no-op when
    /// the handle is frozen.
    pub fn fit(&self, samples: &[Symbol], weights: &[f64]) -> Result<(), DistributionError> {
        if self.is_frozen() {
            return Ok(());
        }
        self.write().fit(samples, weights)
    }

    /// Refits with unit weights.
    pub fn fit_unweighted(&self, samples: &[Symbol]) -> Result<(), DistributionError> {
        let weights = vec![1.0; samples.len()];
        self.fit(samples, &weights)
    }

    /// Returns a deep copy with independent parameters (and an untied
    /// identity). The frozen flag is carried over.
    pub fn clone_untied(&self) -> Emission {
        let copy = Emission::new(self.snapshot());
        copy.inner.frozen.store(self.is_frozen(), Ordering::Relaxed);
        copy
    }

    /// Stops training from updating this distribution.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Relaxed);
    }

    /// Re-enables training updates.
    pub fn thaw(&self) {
        self.inner.frozen.store(false, Ordering::Relaxed);
    }

    /// Whether the handle is currently frozen.
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Relaxed)
    }

    /// Whether two handles share one underlying distribution.
    pub fn ptr_eq(&self, other: &Emission) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// An opaque identity key, stable for the lifetime of the handle.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// A copy of the current parameters.
    pub fn snapshot(&self) -> Distribution {
        self.read().clone()
    }
}

impl fmt::Debug for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Emission").field(&*self.read()).finish()
    }
}
