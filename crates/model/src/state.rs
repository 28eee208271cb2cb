//! Model states: named nodes with optional emission distributions.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hades_distributions::Emission;

/// A node in a model graph.
///
/// `State` is a cheap handle: cloning shares the underlying node, and
/// equality is handle identity. Names are advisory labels and take no
/// part in equality.
///
/// A state without an emission distribution is *silent* — it takes part
/// in transitions but emits nothing. An emitting state emits exactly one
/// symbol per visit. The weight (default 1) biases Viterbi decoding
/// toward or away from the state without changing the generative
/// probability.
#[derive(Clone)]
pub struct State {
    inner: Arc<StateInner>,
}

struct StateInner {
    name: String,
    emission: Option<Emission>,
    weight: f64,
}

impl State {
    fn new(name: String, emission: Option<Emission>, weight: f64) -> Self {
        Self {
            inner: Arc::new(StateInner {
                name,
                emission,
                weight,
            }),
        }
    }

    /// Creates an emitting state with weight 1.
    pub fn emitting(name: impl Into<String>, emission: Emission) -> Self {
        Self::new(name.into(), Some(emission), 1.0)
    }

    /// Creates an emitting state with an explicit decoding weight.
    /// The weight must be finite and positive; baking validates it.
    pub fn emitting_weighted(name: impl Into<String>, emission: Emission, weight: f64) -> Self {
        Self::new(name.into(), Some(emission), weight)
    }

    /// Creates a silent state.
    pub fn silent(name: impl Into<String>) -> Self {
        Self::new(name.into(), None, 1.0)
    }

    /// The advisory name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The emission distribution, if any.
    pub fn emission(&self) -> Option<&Emission> {
        self.inner.emission.as_ref()
    }

    /// Whether this state emits nothing.
    pub fn is_silent(&self) -> bool {
        self.inner.emission.is_none()
    }

    /// The decoding weight.
    pub fn weight(&self) -> f64 {
        self.inner.weight
    }

    /// An opaque identity key, stable for the lifetime of the handle.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.inner.name)
            .field("silent", &self.is_silent())
            .finish()
    }
}
