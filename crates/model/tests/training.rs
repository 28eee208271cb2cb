//! Training the composed fixture: Baum-Welch convergence, monotonicity,
//! tied-distribution propagation, and the Viterbi trainer.

use approx::assert_relative_eq;
use hades_distributions::{Distribution, Emission, Normal, Symbol, Uniform};
use hades_model::{MergePolicy, Model, ModelBuilder, State, TrainAlgorithm, TrainConfig};

/// The composed fixture from the decoding suite: s3 ~ U(-1, 1) feeding a
/// self-looping s1 ~ U(-2, 2) sub-model.
fn composed() -> Model {
    let mut inner = ModelBuilder::new("A");
    let s1 = State::emitting("s1", Emission::new(Uniform::new(-2.0, 2.0).unwrap()));
    inner.add_state(s1.clone());
    let inner_start = inner.start().clone();
    let inner_end = inner.end().clone();
    inner.add_transition(&inner_start, &s1, 1.0).unwrap();
    inner.add_transition(&s1, &s1, 0.5).unwrap();
    inner.add_transition(&s1, &inner_end, 0.5).unwrap();

    let mut outer = ModelBuilder::new("B");
    let s3 = State::emitting("s3", Emission::new(Uniform::new(-1.0, 1.0).unwrap()));
    outer.add_state(s3.clone());
    let outer_start = outer.start().clone();
    let outer_end = outer.end().clone();
    outer.add_submodel(inner);
    outer.add_transition(&outer_start, &s3, 1.0).unwrap();
    outer.add_transition(&s3, &inner_start, 1.0).unwrap();
    outer.add_transition(&inner_end, &outer_end, 1.0).unwrap();
    outer.bake(MergePolicy::Partial).unwrap()
}

fn training_sequences() -> Vec<Vec<Symbol>> {
    vec![
        Symbol::reals(&[-0.5, 0.2, 0.2]),
        Symbol::reals(&[-0.5, 0.2, 1.2, 0.8]),
    ]
}

// ---------------------------------------------------------------------------
// 1. baum_welch_converges_with_positive_improvement
// ---------------------------------------------------------------------------
#[test]
fn baum_welch_converges_with_positive_improvement() {
    let mut model = composed();
    let sequences = training_sequences();
    let before: f64 = sequences.iter().map(|s| model.log_probability(s)).sum();

    let config = TrainConfig::new().with_max_iterations(50);
    let improvement = model.train(&sequences, &config).unwrap();
    let after: f64 = sequences.iter().map(|s| model.log_probability(s)).sum();

    assert!(improvement > 0.0, "improvement: {improvement}");
    assert_relative_eq!(after - before, improvement, epsilon = 1e-9);
    model.validate().unwrap();
}

// ---------------------------------------------------------------------------
// 2. baum_welch_iterations_never_decrease_log_probability
// ---------------------------------------------------------------------------
#[test]
fn baum_welch_iterations_never_decrease_log_probability() {
    let mut model = composed();
    let sequences = training_sequences();
    // Step one EM iteration at a time and watch the likelihood.
    let config = TrainConfig::new()
        .with_max_iterations(1)
        .with_min_iterations(1);
    let mut last: f64 = sequences.iter().map(|s| model.log_probability(s)).sum();
    for _ in 0..5 {
        model.train(&sequences, &config).unwrap();
        let current: f64 = sequences.iter().map(|s| model.log_probability(s)).sum();
        assert!(
            current >= last - 1e-9,
            "EM iteration decreased the likelihood: {last} -> {current}"
        );
        last = current;
    }
}

// ---------------------------------------------------------------------------
// 3. baum_welch_with_pseudocounts_stays_normalized
// ---------------------------------------------------------------------------
#[test]
fn baum_welch_with_pseudocounts_stays_normalized() {
    let mut model = composed();
    let config = TrainConfig::new()
        .with_transition_pseudocount(1.0)
        .with_max_iterations(10);
    let improvement = model.train(&training_sequences(), &config).unwrap();
    assert!(improvement.is_finite());
    model.validate().unwrap();
}

// ---------------------------------------------------------------------------
// 4. emission_refit_tightens_the_supports
// ---------------------------------------------------------------------------
#[test]
fn emission_refit_tightens_the_supports() {
    let mut model = composed();
    let config = TrainConfig::new().with_max_iterations(5);
    model.train(&training_sequences(), &config).unwrap();

    // s3 only ever explains -0.5; its uniform support collapses there.
    let s3 = model
        .states()
        .iter()
        .find(|s| s.name() == "s3")
        .unwrap()
        .clone();
    if let Distribution::Uniform(u) = s3.emission().unwrap().snapshot() {
        assert_relative_eq!(u.low(), -0.5, epsilon = 1e-9);
        assert_relative_eq!(u.high(), -0.5, epsilon = 1e-9);
    } else {
        unreachable!();
    }
    // s1 sees everything after the first symbol.
    let s1 = model
        .states()
        .iter()
        .find(|s| s.name() == "s1")
        .unwrap()
        .clone();
    if let Distribution::Uniform(u) = s1.emission().unwrap().snapshot() {
        assert_relative_eq!(u.low(), 0.2, epsilon = 1e-9);
        assert_relative_eq!(u.high(), 1.2, epsilon = 1e-9);
    } else {
        unreachable!();
    }
}

// ---------------------------------------------------------------------------
// 5. viterbi_training_reaches_a_fixed_point
// ---------------------------------------------------------------------------
#[test]
fn viterbi_training_reaches_a_fixed_point() {
    let mut model = composed();
    let sequences = training_sequences();
    let config = TrainConfig::new()
        .with_algorithm(TrainAlgorithm::Viterbi)
        .with_max_iterations(10);
    let improvement = model.train(&sequences, &config).unwrap();
    assert!(improvement.is_finite());
    model.validate().unwrap();
    // Decoding still works on the trained model.
    let (score, path) = model.viterbi(&sequences[0]);
    assert!(score.is_finite());
    assert!(path.is_some());
}

// ---------------------------------------------------------------------------
// 6. tied_states_train_together
// ---------------------------------------------------------------------------
#[test]
fn tied_states_train_together() {
    // Two states share one normal distribution; a third is independent.
    let mut builder = ModelBuilder::new("tied");
    let shared = Emission::new(Normal::new(0.0, 1.0).unwrap());
    let a = State::emitting("a", shared.clone());
    let b = State::emitting("b", shared.clone());
    let c = State::emitting("c", Emission::new(Normal::new(0.0, 1.0).unwrap()));
    for s in [&a, &b, &c] {
        builder.add_state(s.clone());
    }
    let start = builder.start().clone();
    let end = builder.end().clone();
    builder.add_transition(&start, &a, 1.0).unwrap();
    builder.add_transition(&a, &b, 1.0).unwrap();
    builder.add_transition(&b, &c, 1.0).unwrap();
    builder.add_transition(&c, &end, 1.0).unwrap();
    let mut model = builder.bake(MergePolicy::None).unwrap();

    // Labels put 2.0 and 4.0 through the tied pair and 10.0 through c.
    let pairs = vec![(
        Symbol::reals(&[2.0, 4.0, 10.0]),
        vec![a.clone(), b.clone(), c.clone()],
    )];
    model.train_labelled(&pairs, &TrainConfig::new()).unwrap();

    // The tied pair fitted once on {2.0, 4.0}.
    if let Distribution::Normal(n) = a.emission().unwrap().snapshot() {
        assert_relative_eq!(n.mean(), 3.0, epsilon = 1e-9);
    } else {
        unreachable!();
    }
    assert!(a.emission().unwrap().ptr_eq(b.emission().unwrap()));
    // The independent state fitted on {10.0} alone.
    if let Distribution::Normal(n) = c.emission().unwrap().snapshot() {
        assert_relative_eq!(n.mean(), 10.0, epsilon = 1e-9);
    } else {
        unreachable!();
    }
}

// ---------------------------------------------------------------------------
// 7. tie_aggregated_posteriors_match_between_members
// ---------------------------------------------------------------------------
#[test]
fn tie_aggregated_posteriors_match_between_members() {
    let mut builder = ModelBuilder::new("tied");
    let shared = Emission::new(Uniform::new(0.0, 1.0).unwrap());
    let a = State::emitting("a", shared.clone());
    let b = State::emitting("b", shared.clone());
    builder.add_state(a.clone());
    builder.add_state(b.clone());
    let start = builder.start().clone();
    let end = builder.end().clone();
    builder.add_transition(&start, &a, 0.7).unwrap();
    builder.add_transition(&start, &b, 0.3).unwrap();
    builder.add_transition(&a, &a, 0.5).unwrap();
    builder.add_transition(&a, &end, 0.5).unwrap();
    builder.add_transition(&b, &b, 0.5).unwrap();
    builder.add_transition(&b, &end, 0.5).unwrap();
    let model = builder.bake(MergePolicy::None).unwrap();

    let seq = Symbol::reals(&[0.5, 0.5, 0.5]);
    let (_, weights) = model.forward_backward(&seq, true).unwrap();
    let ia = model.state_index(&a).unwrap();
    let ib = model.state_index(&b).unwrap();
    for t in 0..seq.len() {
        assert_relative_eq!(weights[[t, ia]], weights[[t, ib]], epsilon = 1e-12);
    }
}

// ---------------------------------------------------------------------------
// 8. training_composed_models_keeps_them_decodable
// ---------------------------------------------------------------------------
#[test]
fn training_composed_models_keeps_them_decodable() {
    let mut model = composed();
    let sequences = training_sequences();
    model
        .train(
            &sequences,
            &TrainConfig::new().with_max_iterations(20),
        )
        .unwrap();

    let (score, path) = model.viterbi(&sequences[0]);
    assert!(score.is_finite());
    let names: Vec<String> = path
        .unwrap()
        .into_iter()
        .map(|(_, s)| s.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["B-start", "s3", "A-start", "s1", "s1", "A-end", "B-end"]
    );
}
