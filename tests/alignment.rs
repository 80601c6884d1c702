use foodsec::{AlignError, FeatureAligner, FeatureInput, FeatureSchema, FeatureValue, align};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

const TRIALS: usize = 200;

fn random_schema(rng: &mut StdRng) -> FeatureSchema {
    let n = rng.gen_range(1..=20);
    let mut names: Vec<String> = (0..n).map(|i| format!("feature {i}")).collect();
    names.shuffle(rng);
    FeatureSchema::new(names).unwrap()
}

/// Inserts `values` in a random order together with keys the schema lacks.
fn shuffled_input(rng: &mut StdRng, schema: &FeatureSchema, values: &[f64]) -> FeatureInput {
    let mut pairs: Vec<(String, FeatureValue)> = schema
        .names()
        .iter()
        .cloned()
        .zip(values.iter().map(|v| FeatureValue::Number(*v)))
        .collect();
    for extra in 0..rng.gen_range(0..5) {
        pairs.push((format!("context {extra}"), FeatureValue::from("ignored")));
    }
    pairs.shuffle(rng);
    pairs.into_iter().collect()
}

#[test]
fn positions_follow_the_schema_whatever_the_insertion_order() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..TRIALS {
        let schema = random_schema(&mut rng);
        let values: Vec<f64> = (0..schema.len())
            .map(|_| rng.gen_range(-1e6..1e6))
            .collect();
        let input = shuffled_input(&mut rng, &schema, &values);

        let aligned = align(&input, &schema).unwrap();
        assert_eq!(aligned.as_slice(), values.as_slice());
    }
}

#[test]
fn missing_report_is_exactly_the_removed_names_in_schema_order() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..TRIALS {
        let schema = random_schema(&mut rng);
        let mut input: FeatureInput = schema
            .names()
            .iter()
            .map(|name| (name.clone(), 1.0))
            .collect();

        let removed: Vec<String> = schema
            .names()
            .iter()
            .filter(|_| rng.gen_bool(0.3))
            .cloned()
            .collect();
        if removed.is_empty() {
            continue;
        }
        let mut kept = FeatureInput::new();
        for key in input.keys() {
            if !removed.iter().any(|r| r == key) {
                kept.insert(key, 1.0);
            }
        }
        input = kept;
        input.insert("Area", "Laos");

        assert_eq!(
            align(&input, &schema),
            Err(AlignError::MissingFeatures { missing: removed })
        );
    }
}

#[test]
fn repeated_alignment_is_identical() {
    let mut rng = StdRng::seed_from_u64(3);
    let schema = random_schema(&mut rng);
    let values: Vec<f64> = (0..schema.len()).map(|_| rng.r#gen()).collect();
    let input = shuffled_input(&mut rng, &schema, &values);

    let first = align(&input, &schema);
    for _ in 0..10 {
        assert_eq!(align(&input, &schema), first);
    }
}

#[test]
fn one_aligner_serves_many_threads() {
    let schema = Arc::new(
        FeatureSchema::new(vec!["irrigation".to_string(), "water_access".to_string()]).unwrap(),
    );
    let aligner = FeatureAligner::new(schema);

    thread::scope(|scope| {
        for worker in 0..8 {
            let aligner = &aligner;
            scope.spawn(move || {
                for step in 0..100 {
                    let irrigation = (worker * 100 + step) as f64;
                    let input = FeatureInput::new()
                        .with("water_access", 60.0)
                        .with("irrigation", irrigation);
                    let aligned = aligner.align(&input).unwrap();
                    assert_eq!(aligned.as_slice(), &[irrigation, 60.0]);
                }
            });
        }
    });
}

#[test]
fn dashboard_form_payload_is_refused_by_the_trained_schema() {
    // The form submits short keys; the model was trained on the long names.
    let schema = FeatureSchema::new(vec![
        "Percent of arable land equipped for irrigation (percent) (3-year average)".to_string(),
        "water access".to_string(),
        "irrigation".to_string(),
    ])
    .unwrap();
    let form = FeatureInput::new()
        .with("irrigation", 50.0)
        .with("water_access", 60.0);

    match align(&form, &schema) {
        Err(AlignError::MissingFeatures { missing }) => {
            assert_eq!(
                missing,
                vec![
                    "Percent of arable land equipped for irrigation (percent) (3-year average)",
                    "water access",
                ]
            );
        }
        other => panic!("Expected MissingFeatures, got {other:?}"),
    }
}
