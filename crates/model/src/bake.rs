//! Compilation of a mutable graph into the immutable model form.
//!
//! Baking is a deterministic pipeline: merge parallel edges, prune
//! orphans, normalize outgoing probabilities, merge redundant silent
//! states, order the states (emitting first, silent topologically), and
//! lay the survivors out as CSR arrays.

use std::collections::{BinaryHeap, HashMap};

use tracing::warn;

use crate::compiled::Model;
use crate::error::ModelError;
use crate::graph::ModelBuilder;
use crate::state::State;

/// Silent-state merging applied during baking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep every silent state.
    None,
    /// Remove a silent state whose unit-probability edge leads to
    /// another silent state, redirecting its incoming edges.
    Partial,
    /// As `Partial`, but the unit-probability edge may also lead to an
    /// emitting state.
    #[default]
    All,
}

#[derive(Debug, Clone)]
struct WorkEdge {
    from: State,
    to: State,
    probability: f64,
    pseudocount: f64,
}

/// Probabilities this close to 1 count as unit edges for silent merging.
const UNIT_EDGE_TOLERANCE: f64 = 1e-12;

pub(crate) fn bake(builder: ModelBuilder, merge: MergePolicy) -> Result<Model, ModelError> {
    let (name, start, end, ordinary, raw_edges) = builder.into_parts();

    let mut states: Vec<State> = ordinary;
    states.push(start.clone());
    states.push(end.clone());

    // Parallel edges collapse up front: probabilities add, the larger
    // pseudocount wins.
    let mut edges: Vec<WorkEdge> = Vec::with_capacity(raw_edges.len());
    for e in raw_edges {
        match edges
            .iter_mut()
            .find(|w| w.from == e.from && w.to == e.to)
        {
            Some(existing) => {
                existing.probability += e.probability;
                existing.pseudocount = existing.pseudocount.max(e.pseudocount);
            }
            None => edges.push(WorkEdge {
                from: e.from,
                to: e.to,
                probability: e.probability,
                pseudocount: e.pseudocount,
            }),
        }
    }

    prune_orphans(&mut states, &mut edges, &start, &end);
    normalize_outgoing(&mut edges, &states, &end);
    if merge != MergePolicy::None {
        merge_silent(&mut states, &mut edges, &start, &end, merge);
    }

    // Partition: emitting states keep insertion order, silent states are
    // scheduled topologically.
    let emitting: Vec<State> = states.iter().filter(|s| !s.is_silent()).cloned().collect();
    if emitting.is_empty() {
        return Err(ModelError::Empty);
    }
    let silent: Vec<State> = states.iter().filter(|s| s.is_silent()).cloned().collect();
    let ordered_silent = sort_silent(&silent, &edges)?;

    let mut final_states = emitting;
    final_states.extend(ordered_silent);
    let silent_start = final_states.iter().filter(|s| !s.is_silent()).count();

    let index: HashMap<usize, usize> = final_states
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id(), i))
        .collect();
    let start_index = index[&start.id()];
    let end_index = index[&end.id()];

    let mut state_log_weight = Vec::with_capacity(silent_start);
    for s in &final_states[..silent_start] {
        let w = s.weight();
        if !w.is_finite() || w <= 0.0 {
            return Err(ModelError::InvalidStateWeight {
                name: s.name().to_string(),
                value: w,
            });
        }
        state_log_weight.push(w.ln());
    }

    let (tie_offset, tie_member) = tie_table(&final_states[..silent_start]);

    // Edge CSRs. The out-edge order within a source is insertion order;
    // sampling and training walk edges in exactly this order.
    let mut indexed: Vec<(usize, usize, f64, f64)> = edges
        .iter()
        .map(|e| {
            (
                index[&e.from.id()],
                index[&e.to.id()],
                e.probability,
                e.pseudocount,
            )
        })
        .collect();
    indexed.sort_by_key(|&(from, ..)| from);

    let m = final_states.len();
    let n_edges = indexed.len();

    let mut out_offset = vec![0usize; m + 1];
    for &(from, ..) in &indexed {
        out_offset[from + 1] += 1;
    }
    for k in 0..m {
        out_offset[k + 1] += out_offset[k];
    }
    let out_target: Vec<usize> = indexed.iter().map(|&(_, to, ..)| to).collect();
    let out_log_p: Vec<f64> = indexed.iter().map(|&(_, _, p, _)| p.ln()).collect();
    let out_pseudocount: Vec<f64> = indexed.iter().map(|&(.., pc)| pc).collect();

    let mut in_order: Vec<usize> = (0..n_edges).collect();
    in_order.sort_by_key(|&e| indexed[e].1);

    let mut in_offset = vec![0usize; m + 1];
    for &(_, to, ..) in &indexed {
        in_offset[to + 1] += 1;
    }
    for k in 0..m {
        in_offset[k + 1] += in_offset[k];
    }
    let in_source: Vec<usize> = in_order.iter().map(|&e| indexed[e].0).collect();
    let in_log_p: Vec<f64> = in_order.iter().map(|&e| indexed[e].2.ln()).collect();
    let in_pseudocount: Vec<f64> = in_order.iter().map(|&e| indexed[e].3).collect();

    let mut out_to_in = vec![0usize; n_edges];
    for (in_pos, &e) in in_order.iter().enumerate() {
        out_to_in[e] = in_pos;
    }

    let finite = in_offset[end_index + 1] > in_offset[end_index];

    Ok(Model {
        name,
        states: final_states,
        silent_start,
        start_index,
        end_index,
        finite,
        out_offset,
        out_target,
        out_log_p,
        out_pseudocount,
        in_offset,
        in_source,
        in_log_p,
        in_pseudocount,
        out_to_in,
        tie_offset,
        tie_member,
        state_log_weight,
    })
}

/// Iteratively removes states (other than start/end) with no incoming
/// or no outgoing edges, until none remain.
fn prune_orphans(states: &mut Vec<State>, edges: &mut Vec<WorkEdge>, start: &State, end: &State) {
    loop {
        let mut in_degree: HashMap<usize, usize> = HashMap::new();
        let mut out_degree: HashMap<usize, usize> = HashMap::new();
        for e in edges.iter() {
            *out_degree.entry(e.from.id()).or_insert(0) += 1;
            *in_degree.entry(e.to.id()).or_insert(0) += 1;
        }
        let doomed: Vec<State> = states
            .iter()
            .filter(|s| {
                **s != *start
                    && **s != *end
                    && (in_degree.get(&s.id()).copied().unwrap_or(0) == 0
                        || out_degree.get(&s.id()).copied().unwrap_or(0) == 0)
            })
            .cloned()
            .collect();
        if doomed.is_empty() {
            return;
        }
        states.retain(|s| !doomed.contains(s));
        edges.retain(|e| !doomed.contains(&e.from) && !doomed.contains(&e.to));
    }
}

/// Rescales each state's outgoing probabilities to sum to 1. The sum is
/// first rounded to 8 decimal places so rows already at 1 within that
/// precision are left untouched.
fn normalize_outgoing(edges: &mut [WorkEdge], states: &[State], end: &State) {
    for s in states {
        if *s == *end {
            continue;
        }
        let sum: f64 = edges
            .iter()
            .filter(|e| e.from == *s)
            .map(|e| e.probability)
            .sum();
        if sum <= 0.0 {
            continue;
        }
        let rounded = (sum * 1e8).round() / 1e8;
        if rounded != 1.0 {
            for e in edges.iter_mut().filter(|e| e.from == *s) {
                e.probability /= sum;
            }
        }
    }
}

/// Removes silent states that forward all probability mass through a
/// single unit edge, redirecting their incoming edges, until no such
/// state remains.
fn merge_silent(
    states: &mut Vec<State>,
    edges: &mut Vec<WorkEdge>,
    start: &State,
    end: &State,
    policy: MergePolicy,
) {
    loop {
        let candidate = edges.iter().position(|e| {
            (1.0 - e.probability).abs() <= UNIT_EDGE_TOLERANCE
                && e.from.is_silent()
                && e.from != *start
                && e.from != *end
                && e.from != e.to
                && e.to != *end
                && (policy == MergePolicy::All || e.to.is_silent())
        });
        let Some(idx) = candidate else {
            return;
        };
        let unit = edges[idx].clone();
        let (a, b, unit_pc) = (unit.from, unit.to, unit.pseudocount);

        // Drop the merged state's outgoing edges, then reroute everything
        // that pointed at it.
        edges.retain(|e| e.from != a);
        let mut kept = Vec::with_capacity(edges.len());
        let mut redirected = Vec::new();
        for e in edges.drain(..) {
            if e.to == a {
                redirected.push(e);
            } else {
                kept.push(e);
            }
        }
        *edges = kept;
        for mut e in redirected {
            e.to = b.clone();
            e.pseudocount = e.pseudocount.max(unit_pc);
            match edges
                .iter_mut()
                .find(|w| w.from == e.from && w.to == e.to)
            {
                Some(existing) => {
                    existing.probability += e.probability;
                    existing.pseudocount = existing.pseudocount.max(e.pseudocount);
                }
                None => edges.push(e),
            }
        }
        states.retain(|s| *s != a);
    }
}

/// Topologically sorts the silent states (Kahn's algorithm over the
/// silent-to-silent subgraph), preferring lower insertion indices so the
/// schedule is deterministic.
fn sort_silent(silent: &[State], edges: &[WorkEdge]) -> Result<Vec<State>, ModelError> {
    use std::cmp::Reverse;

    let position: HashMap<usize, usize> = silent
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id(), i))
        .collect();
    let mut indegree = vec![0usize; silent.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); silent.len()];
    for e in edges {
        if e.from.is_silent() && e.to.is_silent() {
            let i = position[&e.from.id()];
            let j = position[&e.to.id()];
            successors[i].push(j);
            indegree[j] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..silent.len())
        .filter(|&i| indegree[i] == 0)
        .map(Reverse)
        .collect();
    let mut ordered = Vec::with_capacity(silent.len());
    let mut scheduled = vec![false; silent.len()];
    while let Some(Reverse(i)) = ready.pop() {
        scheduled[i] = true;
        ordered.push(silent[i].clone());
        for &j in &successors[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if ordered.len() != silent.len() {
        let names: Vec<String> = silent
            .iter()
            .enumerate()
            .filter(|(i, _)| !scheduled[*i])
            .map(|(_, s)| s.name().to_string())
            .collect();
        warn!(?names, "silent states form a cycle; model cannot be baked");
        return Err(ModelError::SilentCycle { names });
    }
    Ok(ordered)
}

/// Builds the tie CSR: for each emitting state, the indices of the other
/// states sharing its emission handle.
fn tie_table(emitting: &[State]) -> (Vec<usize>, Vec<usize>) {
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, s) in emitting.iter().enumerate() {
        let emission = s.emission().expect("states before silent_start emit");
        groups.entry(emission.id()).or_default().push(i);
    }
    let mut tie_offset = Vec::with_capacity(emitting.len() + 1);
    let mut tie_member = Vec::new();
    tie_offset.push(0);
    for (i, s) in emitting.iter().enumerate() {
        let emission = s.emission().expect("states before silent_start emit");
        for &j in &groups[&emission.id()] {
            if j != i {
                tie_member.push(j);
            }
        }
        tie_offset.push(tie_member.len());
    }
    (tie_offset, tie_member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hades_distributions::{Emission, Uniform};

    fn uniform_emission() -> Emission {
        Emission::new(Uniform::new(0.0, 1.0).unwrap())
    }

    fn emitting(name: &str) -> State {
        State::emitting(name, uniform_emission())
    }

    /// start -> s1 -> s2 -> end with an unnormalized branch at s1.
    fn chain() -> (ModelBuilder, State, State) {
        let mut b = ModelBuilder::new("m");
        let s1 = emitting("s1");
        let s2 = emitting("s2");
        b.add_state(s1.clone());
        b.add_state(s2.clone());
        let start = b.start().clone();
        let end = b.end().clone();
        b.add_transition(&start, &s1, 1.0).unwrap();
        b.add_transition(&s1, &s1, 0.25).unwrap();
        b.add_transition(&s1, &s2, 0.25).unwrap();
        b.add_transition(&s2, &end, 1.0).unwrap();
        (b, s1, s2)
    }

    #[test]
    fn bake_orders_emitting_before_silent() {
        let (b, ..) = chain();
        let model = b.bake(MergePolicy::None).unwrap();
        let ss = model.silent_start();
        for (i, s) in model.states().iter().enumerate() {
            assert_eq!(s.is_silent(), i >= ss);
        }
        assert!(model.start_index() >= ss);
        assert!(model.end_index() >= ss);
        assert!(model.is_finite());
    }

    #[test]
    fn bake_normalizes_outgoing_probabilities() {
        let (b, s1, s2) = chain();
        let model = b.bake(MergePolicy::None).unwrap();
        let i1 = model.state_index(&s1).unwrap();
        let i2 = model.state_index(&s2).unwrap();
        assert_relative_eq!(
            model.transition_log_probability(i1, i1),
            0.5f64.ln(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            model.transition_log_probability(i1, i2),
            0.5f64.ln(),
            epsilon = 1e-12
        );
        model.validate().unwrap();
    }

    #[test]
    fn bake_merges_parallel_edges() {
        let mut b = ModelBuilder::new("m");
        let s = emitting("s");
        b.add_state(s.clone());
        let start = b.start().clone();
        let end = b.end().clone();
        b.add_transition(&start, &s, 0.5).unwrap();
        b.add_transition(&start, &s, 0.5).unwrap();
        b.add_transition(&s, &end, 1.0).unwrap();
        let model = b.bake(MergePolicy::None).unwrap();
        let si = model.state_index(&s).unwrap();
        assert_relative_eq!(
            model.transition_log_probability(model.start_index(), si),
            0.0,
            epsilon = 1e-12
        );
        model.validate().unwrap();
    }

    #[test]
    fn bake_prunes_orphans() {
        let (mut b, s1, _) = chain();
        let orphan = emitting("orphan");
        b.add_state(orphan.clone());
        // Reachable but with no way out: also pruned, and pruning
        // cascades through its incoming edge only.
        let dead_end = emitting("dead-end");
        b.add_state(dead_end.clone());
        b.add_transition(&s1, &dead_end, 0.5).unwrap();

        let model = b.bake(MergePolicy::None).unwrap();
        assert!(model.state_index(&orphan).is_none());
        assert!(model.state_index(&dead_end).is_none());
        // Normalization ran after pruning, so s1's row still sums to 1.
        model.validate().unwrap();
    }

    #[test]
    fn bake_rejects_empty_models() {
        let b = ModelBuilder::new("m");
        assert!(matches!(b.bake(MergePolicy::None), Err(ModelError::Empty)));
    }

    #[test]
    fn bake_rejects_silent_cycles() {
        let mut b = ModelBuilder::new("m");
        let s = emitting("s");
        let g1 = State::silent("g1");
        let g2 = State::silent("g2");
        b.add_state(s.clone());
        b.add_state(g1.clone());
        b.add_state(g2.clone());
        let start = b.start().clone();
        let end = b.end().clone();
        b.add_transition(&start, &s, 1.0).unwrap();
        b.add_transition(&s, &g1, 1.0).unwrap();
        b.add_transition(&g1, &g2, 0.5).unwrap();
        b.add_transition(&g2, &g1, 1.0).unwrap();
        b.add_transition(&g1, &end, 0.5).unwrap();
        let err = b.bake(MergePolicy::None).unwrap_err();
        assert!(matches!(err, ModelError::SilentCycle { .. }));
    }

    #[test]
    fn partial_merge_removes_silent_unit_chains() {
        let mut b = ModelBuilder::new("m");
        let s = emitting("s");
        let gate = State::silent("gate");
        let gate2 = State::silent("gate2");
        b.add_state(s.clone());
        b.add_state(gate.clone());
        b.add_state(gate2.clone());
        let start = b.start().clone();
        let end = b.end().clone();
        b.add_transition(&start, &s, 1.0).unwrap();
        b.add_transition(&s, &gate, 1.0).unwrap();
        b.add_transition(&gate, &gate2, 1.0).unwrap();
        b.add_transition(&gate2, &end, 1.0).unwrap();

        let kept = b.clone().bake(MergePolicy::None).unwrap();
        assert!(kept.state_index(&gate).is_some());

        let merged = b.bake(MergePolicy::Partial).unwrap();
        // gate forwarded everything to gate2 and disappears.
        assert!(merged.state_index(&gate).is_none());
        assert!(merged.state_index(&gate2).is_some());
        let g2 = merged.state_index(&gate2).unwrap();
        let si = merged.state_index(&s).unwrap();
        assert_relative_eq!(
            merged.transition_log_probability(si, g2),
            0.0,
            epsilon = 1e-12
        );
        merged.validate().unwrap();
    }

    #[test]
    fn partial_merge_keeps_silent_to_emitting_units() {
        let mut b = ModelBuilder::new("m");
        let s = emitting("s");
        let gate = State::silent("gate");
        b.add_state(s.clone());
        b.add_state(gate.clone());
        let start = b.start().clone();
        let end = b.end().clone();
        b.add_transition(&start, &gate, 1.0).unwrap();
        b.add_transition(&gate, &s, 1.0).unwrap();
        b.add_transition(&s, &end, 1.0).unwrap();

        let partial = b.clone().bake(MergePolicy::Partial).unwrap();
        assert!(partial.state_index(&gate).is_some());

        let all = b.bake(MergePolicy::All).unwrap();
        assert!(all.state_index(&gate).is_none());
        let si = all.state_index(&s).unwrap();
        assert_relative_eq!(
            all.transition_log_probability(all.start_index(), si),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn tie_table_links_shared_emissions() {
        let mut b = ModelBuilder::new("m");
        let shared = uniform_emission();
        let s1 = State::emitting("s1", shared.clone());
        let s2 = State::emitting("s2", shared.clone());
        let s3 = emitting("s3");
        for s in [&s1, &s2, &s3] {
            b.add_state(s.clone());
        }
        let start = b.start().clone();
        let end = b.end().clone();
        b.add_transition(&start, &s1, 1.0).unwrap();
        b.add_transition(&s1, &s2, 1.0).unwrap();
        b.add_transition(&s2, &s3, 1.0).unwrap();
        b.add_transition(&s3, &end, 1.0).unwrap();
        let model = b.bake(MergePolicy::None).unwrap();

        let i1 = model.state_index(&s1).unwrap();
        let i2 = model.state_index(&s2).unwrap();
        let i3 = model.state_index(&s3).unwrap();
        assert_eq!(model.tied_to(i1), &[i2]);
        assert_eq!(model.tied_to(i2), &[i1]);
        assert_eq!(model.tied_to(i3), &[] as &[usize]);

        let classes = model.tie_classes();
        assert!(classes.contains(&vec![i1, i2]));
        assert!(classes.contains(&vec![i3]));
    }

    #[test]
    fn infinite_model_has_no_end_edges() {
        let mut b = ModelBuilder::new("m");
        let s = emitting("s");
        b.add_state(s.clone());
        let start = b.start().clone();
        b.add_transition(&start, &s, 1.0).unwrap();
        b.add_transition(&s, &s, 1.0).unwrap();
        let model = b.bake(MergePolicy::None).unwrap();
        assert!(!model.is_finite());
    }
}
