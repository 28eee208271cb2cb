//! Mutable model graphs assembled before baking.

use crate::bake::{self, MergePolicy};
use crate::compiled::Model;
use crate::error::ModelError;
use crate::state::State;

/// A weighted directed edge between two states.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub(crate) from: State,
    pub(crate) to: State,
    pub(crate) probability: f64,
    pub(crate) pseudocount: f64,
}

/// A mutable directed multigraph of states, edited freely and then
/// compiled with [`ModelBuilder::bake`].
///
/// Every builder carries distinguished silent `start` and `end` states.
/// Outgoing probabilities need not sum to one while editing; baking
/// normalizes them. Self-loops and parallel edges are accepted (parallel
/// edges are merged on bake).
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    start: State,
    end: State,
    states: Vec<State>,
    edges: Vec<Edge>,
}

impl ModelBuilder {
    /// Creates an empty graph named `name`, with fresh silent
    /// `<name>-start` and `<name>-end` states.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let start = State::silent(format!("{name}-start"));
        let end = State::silent(format!("{name}-end"));
        Self {
            name,
            start,
            end,
            states: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// The model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The distinguished start state.
    pub fn start(&self) -> &State {
        &self.start
    }

    /// The distinguished end state.
    pub fn end(&self) -> &State {
        &self.end
    }

    /// The ordinary (non-start/end) states added so far.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    fn contains(&self, state: &State) -> bool {
        *state == self.start || *state == self.end || self.states.contains(state)
    }

    /// Adds a state to the graph. Adding the same handle twice is a
    /// no-op.
    pub fn add_state(&mut self, state: State) {
        if !self.contains(&state) {
            self.states.push(state);
        }
    }

    /// Adds a transition with a pseudocount equal to its probability.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidProbability`] for a probability
    /// outside `[0, 1]` and [`ModelError::UnknownState`] when either
    /// endpoint has not been added to the graph.
    pub fn add_transition(
        &mut self,
        from: &State,
        to: &State,
        probability: f64,
    ) -> Result<(), ModelError> {
        self.add_transition_with_pseudocount(from, to, probability, probability)
    }

    /// Adds a transition with an explicit training pseudocount.
    ///
    /// # Errors
    ///
    /// As [`ModelBuilder::add_transition`], plus
    /// [`ModelError::InvalidPseudocount`] for a negative or non-finite
    /// pseudocount.
    pub fn add_transition_with_pseudocount(
        &mut self,
        from: &State,
        to: &State,
        probability: f64,
        pseudocount: f64,
    ) -> Result<(), ModelError> {
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ModelError::InvalidProbability { value: probability });
        }
        if !pseudocount.is_finite() || pseudocount < 0.0 {
            return Err(ModelError::InvalidPseudocount { value: pseudocount });
        }
        if !self.contains(from) {
            return Err(ModelError::UnknownState {
                name: from.name().to_string(),
            });
        }
        if !self.contains(to) {
            return Err(ModelError::UnknownState {
                name: to.name().to_string(),
            });
        }
        self.edges.push(Edge {
            from: from.clone(),
            to: to.clone(),
            probability,
            pseudocount,
        });
        Ok(())
    }

    /// Absorbs another graph as a disjoint union. The other graph's
    /// start and end become ordinary silent states here; connect them
    /// with explicit transitions afterwards.
    pub fn add_submodel(&mut self, other: ModelBuilder) {
        let ModelBuilder {
            start,
            end,
            states,
            edges,
            ..
        } = other;
        for state in states {
            self.add_state(state);
        }
        self.add_state(start);
        self.add_state(end);
        self.edges.extend(edges);
    }

    /// Appends another graph in series: a unit-probability transition is
    /// added from this graph's end to the other's start, and the other's
    /// end becomes this graph's end.
    pub fn concatenate(&mut self, other: ModelBuilder) {
        let old_end = self.end.clone();
        let other_start = other.start.clone();
        let other_end = other.end.clone();

        self.add_submodel(other);

        // The inherited end is distinguished again, not an ordinary state.
        self.states.retain(|s| *s != other_end);
        self.end = other_end;
        // The old end is demoted to an ordinary silent state.
        self.add_state(old_end.clone());

        self.edges.push(Edge {
            from: old_end,
            to: other_start,
            probability: 1.0,
            pseudocount: 1.0,
        });
    }

    pub(crate) fn into_parts(self) -> (String, State, State, Vec<State>, Vec<Edge>) {
        (self.name, self.start, self.end, self.states, self.edges)
    }

    /// Compiles the graph into an immutable [`Model`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Empty`] when pruning leaves no emitting
    /// state, [`ModelError::SilentCycle`] when the silent states are
    /// cyclic, and [`ModelError::InvalidStateWeight`] for a bad state
    /// weight.
    pub fn bake(self, merge: MergePolicy) -> Result<Model, ModelError> {
        bake::bake(self, merge)
    }
}
