//! Observation symbols scored by emission distributions.

use std::fmt;

/// A single observation: either a real value or a categorical token.
///
/// One model may mix continuous and categorical emission distributions,
/// so `Symbol` is the common observation type every distribution scores.
/// Continuous distributions assign `-inf` to tokens and discrete
/// distributions assign `-inf` to reals.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// A continuous observation.
    Real(f64),
    /// A categorical observation.
    Token(String),
}

impl Symbol {
    /// Returns the contained value if this is a [`Symbol::Real`].
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Symbol::Real(v) => Some(*v),
            Symbol::Token(_) => None,
        }
    }

    /// Returns the contained token if this is a [`Symbol::Token`].
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Symbol::Real(_) => None,
            Symbol::Token(t) => Some(t),
        }
    }

    /// Converts a slice of reals into an observation sequence.
    pub fn reals(values: &[f64]) -> Vec<Symbol> {
        values.iter().map(|&v| Symbol::Real(v)).collect()
    }

    /// Converts a slice of tokens into an observation sequence.
    pub fn tokens(values: &[&str]) -> Vec<Symbol> {
        values.iter().map(|&t| Symbol::Token(t.to_string())).collect()
    }
}

impl From<f64> for Symbol {
    fn from(value: f64) -> Self {
        Symbol::Real(value)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::Token(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol::Token(value)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Real(v) => write!(f, "{v}"),
            Symbol::Token(t) => write!(f, "{t}"),
        }
    }
}
